//! Propagated-transformation obfuscation passes for a basic block: X-OR
//! (rewrites XOR trees into positional-base digit-sum addition) and
//! Split-Bitwise-Op (splits a bitwise AND/OR/XOR into narrower parallel lane
//! operations). Both share the engine in [`engine`].

mod engine;
mod error;
mod forest;
mod params;
mod registry;
mod split_bitwise;
mod xor;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use midenc_obf_hir::{Block, Function};

pub use self::{
    engine::{Transform, run_on_block},
    error::{DiagnosticSink, LogDiagnostics, ObfError},
    forest::{Forest, Tree, build_forest},
    params::{max_base, required_bits, split_width_candidates, xor_min_base},
    registry::TransformRegistry,
    split_bitwise::SplitBitwiseOp,
    xor::XorObfuscation,
};

/// Caller-supplied knobs for constructing a pass instance. The only knob a
/// single-block, non-interactive engine needs is the seed for its private
/// RNG (spec.md §5).
#[derive(Debug, Clone, Copy)]
pub struct ObfuscationOptions {
    pub seed: u64,
}

impl Default for ObfuscationOptions {
    fn default() -> Self {
        Self { seed: 0 }
    }
}

/// A runnable obfuscation pass, bundling a [`Transform`] with the private RNG
/// and diagnostic sink it needs across repeated invocations on a function.
/// Mirrors spec.md §6's `run(basicBlock) -> modified?`: no `Result` crosses
/// this boundary, matching `midenc_obf_transform`'s "no error propagated to
/// the caller" design (spec.md §7).
pub trait ObfPass {
    /// Short, stable name used for diagnostics and registration.
    fn name(&self) -> &'static str;

    fn run(&mut self, func: &mut Function, block: Block) -> bool;
}

/// Runs the X-OR obfuscation, owning its own RNG and diagnostic sink across
/// calls to [`ObfPass::run`].
pub struct XorObfuscationPass {
    rng: ChaCha8Rng,
    diagnostics: LogDiagnostics,
}

impl XorObfuscationPass {
    pub fn new(options: ObfuscationOptions) -> Self {
        Self { rng: ChaCha8Rng::seed_from_u64(options.seed), diagnostics: LogDiagnostics }
    }
}

impl ObfPass for XorObfuscationPass {
    fn name(&self) -> &'static str {
        "xor"
    }

    fn run(&mut self, func: &mut Function, block: Block) -> bool {
        run_on_block(&XorObfuscation, func, block, &mut self.rng, &mut self.diagnostics)
    }
}

/// Runs the Split-Bitwise-Op obfuscation, owning its own RNG and diagnostic
/// sink across calls to [`ObfPass::run`].
pub struct SplitBitwiseOpPass {
    rng: ChaCha8Rng,
    diagnostics: LogDiagnostics,
}

impl SplitBitwiseOpPass {
    pub fn new(options: ObfuscationOptions) -> Self {
        Self { rng: ChaCha8Rng::seed_from_u64(options.seed), diagnostics: LogDiagnostics }
    }
}

impl ObfPass for SplitBitwiseOpPass {
    fn name(&self) -> &'static str {
        "split-bitwise-op"
    }

    fn run(&mut self, func: &mut Function, block: Block) -> bool {
        run_on_block(&SplitBitwiseOp, func, block, &mut self.rng, &mut self.diagnostics)
    }
}

/// A registered obfuscation pass, analogous to `hir2::pass::registry::PassInfo`
/// but scoped to this crate's much smaller surface: no pass manager, no
/// pipeline nesting, just a name, description, and a constructor.
pub struct ObfPassInfo {
    pub name: &'static str,
    pub description: &'static str,
    ctor: fn(ObfuscationOptions) -> Box<dyn ObfPass>,
}

impl ObfPassInfo {
    pub const fn new(
        name: &'static str,
        description: &'static str,
        ctor: fn(ObfuscationOptions) -> Box<dyn ObfPass>,
    ) -> Self {
        Self { name, description, ctor }
    }

    pub fn construct(&self, options: ObfuscationOptions) -> Box<dyn ObfPass> {
        (self.ctor)(options)
    }
}

inventory::collect!(ObfPassInfo);

inventory::submit! {
    ObfPassInfo::new("xor", "rewrite XOR trees as positional-base digit-sum addition", |opts| {
        Box::new(XorObfuscationPass::new(opts))
    })
}

inventory::submit! {
    ObfPassInfo::new(
        "split-bitwise-op",
        "split a bitwise AND/OR/XOR into narrower parallel lane operations",
        |opts| Box::new(SplitBitwiseOpPass::new(opts)),
    )
}

/// Iterates every pass registered via `inventory::submit!`, in whatever order
/// `inventory` discovers them (unordered across compilation units).
pub fn registered_passes() -> impl Iterator<Item = &'static ObfPassInfo> {
    inventory::iter::<ObfPassInfo>().into_iter()
}
