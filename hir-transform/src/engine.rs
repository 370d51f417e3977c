//! The shared recursive-transform engine (spec.md §4.6, §4.7).

use rand_chacha::ChaCha8Rng;
use smallvec::SmallVec;

use midenc_obf_hir::{Block, Builder, Function, Inst, Value};

use crate::{
    error::{DiagnosticSink, ObfError},
    forest::{Tree, build_forest},
    registry::TransformRegistry,
};

/// The four capabilities a concrete obfuscation plugs into the engine
/// (spec.md §9, "Dynamic dispatch"): which instructions it targets, how it
/// picks a tree-wide parameter, and its forward/combine/back transforms. The
/// engine holds no mutable state of its own beyond the registry and
/// parameter it threads through explicitly.
pub trait Transform {
    type Param: Copy + Eq + std::hash::Hash + std::fmt::Debug;

    fn is_eligible(&self, func: &Function, inst: Inst) -> bool;

    fn choose_param(&self, func: &Function, tree: &Tree, rng: &mut ChaCha8Rng) -> Option<Self::Param>;

    /// Forward-transforms a leaf operand's value into its obfuscated
    /// representation. Returns an empty sequence on failure.
    fn forward(
        &self,
        builder: &mut Builder<'_>,
        value: Value,
        param: Self::Param,
        rng: &mut ChaCha8Rng,
    ) -> SmallVec<[Value; 4]>;

    /// Combines `inst`'s (already forward/recursively transformed) operand
    /// sequences into the obfuscated result for `inst` itself. Returns an
    /// empty sequence on failure.
    fn combine(
        &self,
        builder: &mut Builder<'_>,
        inst: Inst,
        operands: &[SmallVec<[Value; 4]>],
        param: Self::Param,
    ) -> SmallVec<[Value; 4]>;

    /// Reconstructs the original `width`-bit value from an obfuscated
    /// sequence, for use at points where non-tree consumers read it.
    fn back(
        &self,
        builder: &mut Builder<'_>,
        seq: &[Value],
        param: Self::Param,
        width: u32,
        rng: &mut ChaCha8Rng,
    ) -> Value;
}

/// The per-tree lifecycle of spec.md §4.7. Purely observational bookkeeping
/// for logging — it carries no control flow of its own.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum TreeState {
    Discovered,
    Parameterized,
    Transforming,
    Completed,
    Aborted,
}

/// Runs `transform` over every eligible tree of `block`, returning whether
/// any IR was changed. Matches spec.md §6's `run(basicBlock) -> modified?`
/// exactly: no error is ever propagated to the caller.
pub fn run_on_block<T: Transform>(
    transform: &T,
    func: &mut Function,
    block: Block,
    rng: &mut ChaCha8Rng,
    diagnostics: &mut dyn DiagnosticSink,
) -> bool {
    let forest = build_forest(func, block, |f, i| transform.is_eligible(f, i));
    let mut modified = false;

    // One registry per block, not per tree: spec.md §3 scopes "forest, registry, tree-local
    // parameters" to the block's lifecycle, and §4.3/§8 require a (value, parameter) pair to
    // be forward-transformed at most once per block, even if the same leaf value is shared by
    // more than one tree.
    let mut registry = TransformRegistry::<T::Param>::new();

    for tree in forest.into_trees() {
        if tree.is_empty() {
            continue;
        }
        let mut state = TreeState::Discovered;
        log::trace!(target: "obf-engine", "tree discovered with {} node(s)", tree.len());

        let Some(param) = transform.choose_param(func, &tree, rng) else {
            diagnostics.report(ObfError::Infeasible);
            state = TreeState::Aborted;
            log::debug!(target: "obf-engine", "tree {state:?}: no feasible parameter");
            continue;
        };
        state = TreeState::Parameterized;
        log::trace!(target: "obf-engine", "tree {state:?} with parameter {param:?}");

        state = TreeState::Transforming;

        let mut aborted = false;
        for root in tree.roots() {
            if transform_root(transform, func, block, &tree, root, param, &mut registry, rng, diagnostics) {
                modified = true;
            } else {
                aborted = true;
                break;
            }
        }
        state = if aborted { TreeState::Aborted } else { TreeState::Completed };
        log::debug!(target: "obf-engine", "tree {state:?}");
    }

    modified
}

/// Transforms a single root bottom-up via an explicit post-order work-stack
/// (spec.md §9, "Recursion vs iteration") rather than native recursion, so
/// tree depth is bounded only by heap, not call-stack, space.
fn transform_root<T: Transform>(
    transform: &T,
    func: &mut Function,
    block: Block,
    tree: &Tree,
    root: Inst,
    param: T::Param,
    registry: &mut TransformRegistry<T::Param>,
    rng: &mut ChaCha8Rng,
    diagnostics: &mut dyn DiagnosticSink,
) -> bool {
    let mut stack: Vec<(Inst, bool)> = vec![(root, false)];

    while let Some((inst, operands_ready)) = stack.pop() {
        let result_value = func.result_value(inst);
        if registry.lookup(result_value, param).is_some() {
            continue;
        }

        if !operands_ready {
            stack.push((inst, true));
            for &operand in &func.inst(inst).operands.clone() {
                if let Some(op_inst) = func.defining_inst(operand)
                    && tree.contains(op_inst)
                    && registry.lookup(func.result_value(op_inst), param).is_none()
                {
                    stack.push((op_inst, false));
                }
            }
            continue;
        }

        let operands = func.inst(inst).operands.clone();
        let mut operand_seqs: SmallVec<[SmallVec<[Value; 4]>; 2]> = SmallVec::new();
        let mut failed = false;
        for operand in operands {
            let seq = match func.defining_inst(operand).filter(|&op_inst| tree.contains(op_inst)) {
                Some(op_inst) => registry
                    .lookup(func.result_value(op_inst), param)
                    .expect("in-tree operand transformed before its user")
                    .to_vec()
                    .into(),
                None => forward_or_lookup(transform, func, block, inst, operand, param, registry, rng),
            };
            if seq.is_empty() {
                failed = true;
                break;
            }
            operand_seqs.push(seq);
        }
        if failed {
            diagnostics.report(ObfError::TransformFailure);
            return false;
        }

        let mut builder = Builder::at(func, block, inst);
        let seq_n = transform.combine(&mut builder, inst, &operand_seqs, param);
        if seq_n.is_empty() {
            diagnostics.report(ObfError::TransformFailure);
            return false;
        }

        let width = func.inst(inst).ty;
        let mut builder = Builder::at(func, block, inst);
        let back_n = transform.back(&mut builder, &seq_n, param, width, rng);

        // Only uses outside the tree are rewritten to the back-transformed value; in-tree
        // users consume `seq_n` from the registry instead (spec.md §4.6 step 3).
        func.replace_uses_where(result_value, back_n, |owner| !tree.contains(owner));

        registry.store(result_value, param, seq_n);

        // Every use of this node's own result has now either moved to `back_n` (external)
        // or is read from the registry by its in-tree parent, never from this instruction's
        // own operands again — it is fully dead.
        func.remove_inst(inst);
    }

    true
}

fn forward_or_lookup<T: Transform>(
    transform: &T,
    func: &mut Function,
    block: Block,
    anchor: Inst,
    value: Value,
    param: T::Param,
    registry: &mut TransformRegistry<T::Param>,
    rng: &mut ChaCha8Rng,
) -> SmallVec<[Value; 4]> {
    if let Some(seq) = registry.lookup(value, param) {
        return seq.to_vec().into();
    }
    let mut builder = Builder::at(func, block, anchor);
    let seq = transform.forward(&mut builder, value, param, rng);
    if !seq.is_empty() {
        registry.store(value, param, seq.clone());
    }
    seq
}
