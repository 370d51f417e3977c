use std::hash::Hash;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use midenc_obf_hir::Value;

/// Caches the forward-transformed representation of a `(Value, parameter)`
/// pair so a value shared by several in-tree nodes — or by several trees —
/// is only transformed once per block (spec.md §4.3). Also doubles as the
/// memo table for in-tree nodes' own obfuscated results (spec.md §4.6 step
/// 4), keyed by the node's result value.
#[derive(Debug)]
pub struct TransformRegistry<P> {
    cache: FxHashMap<(Value, P), SmallVec<[Value; 4]>>,
}

impl<P> Default for TransformRegistry<P> {
    fn default() -> Self {
        Self { cache: FxHashMap::default() }
    }
}

impl<P: Copy + Eq + Hash> TransformRegistry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, value: Value, param: P) -> Option<&[Value]> {
        self.cache.get(&(value, param)).map(|seq| seq.as_slice())
    }

    /// Inserts the transformed sequence for `(value, param)`. Asserts `seq`
    /// is non-empty, and that this pair hasn't already been stored — the
    /// engine must never transform the same value twice under the same
    /// parameter within a block.
    pub fn store(&mut self, value: Value, param: P, seq: SmallVec<[Value; 4]>) {
        assert!(!seq.is_empty(), "transform registry: refusing to cache an empty sequence");
        let prev = self.cache.insert((value, param), seq);
        debug_assert!(prev.is_none(), "value was forward-transformed twice under one parameter");
    }
}
