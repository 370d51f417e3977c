//! Parameter selection for both obfuscations (spec.md §4.2).

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashMap;

use midenc_obf_hir::{Function, Inst};

use crate::forest::Tree;

/// The headroom budget every obfuscated representation must fit within.
pub const MAX_BIT_BUDGET: u32 = 128;

/// The largest base B the X-OR transform can use for a W-bit tree without
/// exceeding [`MAX_BIT_BUDGET`], or `0` if W itself already exceeds it.
pub fn max_base(w: u32) -> u64 {
    if w >= MAX_BIT_BUDGET {
        return 0;
    }
    let shift = MAX_BIT_BUDGET / w;
    let machine_word_limit = u64::BITS - 1;
    if shift > machine_word_limit { machine_word_limit as u64 } else { 1u64 << shift }
}

/// Bits needed to store a W-bit value in base B, plus headroom for one
/// addition. Returns `0` if that exceeds [`MAX_BIT_BUDGET`].
pub fn required_bits(w: u32, b: u64) -> u32 {
    if b < 2 {
        return 0;
    }
    let log2_b = (b as f64).log2();
    let digits_needed = ((w as f64) * log2_b).ceil() as u32;
    let headroom = log2_b.floor() as u32 + 1;
    let bits = digits_needed.max(headroom);
    if bits > MAX_BIT_BUDGET { 0 } else { bits }
}

/// The minimum base a tree's digit-sums can use without a digit ever
/// overflowing during an addition: for each root, recursively sum the
/// minimum bases of its operand-nodes (an ineligible leaf contributes 1),
/// then take the maximum across roots and add one.
pub fn xor_min_base(func: &Function, tree: &Tree) -> u64 {
    let mut memo: FxHashMap<Inst, u64> = FxHashMap::default();
    let max_root_sum =
        tree.roots().into_iter().map(|root| min_base_sum(func, tree, root, &mut memo)).max().unwrap_or(0);
    max_root_sum.saturating_add(1)
}

fn min_base_sum(func: &Function, tree: &Tree, inst: Inst, memo: &mut FxHashMap<Inst, u64>) -> u64 {
    if let Some(&cached) = memo.get(&inst) {
        return cached;
    }
    let mut sum = 0u64;
    for &operand in &func.inst(inst).operands {
        let contribution = match func.defining_inst(operand) {
            Some(op_inst) if tree.contains(op_inst) => min_base_sum(func, tree, op_inst, memo),
            _ => 1,
        };
        sum = sum.saturating_add(contribution);
    }
    memo.insert(inst, sum);
    sum
}

/// The common integer bit-width of every node in `tree`. Trees are only ever
/// built from instructions whose result types all agree (an invariant the
/// host's own type system enforces on binary ops), so this takes the first
/// node's width as authoritative.
pub fn tree_bit_width(func: &Function, tree: &Tree) -> u32 {
    let first = tree.nodes().next().expect("parameter selection never runs on an empty tree");
    let width = func.inst(first).ty;
    debug_assert!(
        tree.nodes().all(|n| func.inst(n).ty == width),
        "tree contains nodes of differing bit-width"
    );
    width
}

/// Chooses the X-OR base B for `tree`, or `None` if no base satisfies
/// `3 <= MinBase <= B <= maxBase(W)`.
pub fn choose_xor_base(func: &Function, tree: &Tree, rng: &mut ChaCha8Rng) -> Option<u64> {
    let w = tree_bit_width(func, tree);
    let max_b = max_base(w);
    let min_b = xor_min_base(func, tree);
    if min_b < 3 || min_b > max_b {
        return None;
    }
    Some(rng.gen_range(min_b..=max_b))
}

/// The divisors of W, excluding 0 and W itself (so K = W/S is always >= 2).
pub fn split_width_candidates(w: u32) -> Vec<u32> {
    if w < 2 {
        return Vec::new();
    }
    (1..w).filter(|s| w % s == 0).collect()
}

/// Chooses the Split-Bitwise-Op lane width S for `tree`, or `None` if W has
/// no divisor other than itself (i.e. W < 2).
pub fn choose_split_width(func: &Function, tree: &Tree, rng: &mut ChaCha8Rng) -> Option<u32> {
    let w = tree_bit_width(func, tree);
    let candidates = split_width_candidates(w);
    if candidates.is_empty() {
        return None;
    }
    Some(candidates[rng.gen_range(0..candidates.len())])
}
