use rustc_hash::{FxHashMap, FxHashSet};

use midenc_obf_hir::{Block, Function, Inst};

/// A maximal connected subgraph of eligible instructions whose intermediate
/// values flow only into each other (spec.md §3). `successors(u)` is `u`'s
/// eligible, in-block operand set — i.e. an edge `u -> v` iff `v` is an
/// operand of `u`, `v` names an instruction in the same block, and `v` is
/// eligible.
#[derive(Debug, Default)]
pub struct Tree {
    successors: FxHashMap<Inst, FxHashSet<Inst>>,
}

impl Tree {
    pub fn len(&self) -> usize {
        self.successors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    pub fn contains(&self, inst: Inst) -> bool {
        self.successors.contains_key(&inst)
    }

    pub fn nodes(&self) -> impl Iterator<Item = Inst> + '_ {
        self.successors.keys().copied()
    }

    pub fn successors(&self, inst: Inst) -> impl Iterator<Item = Inst> + '_ {
        self.successors.get(&inst).into_iter().flatten().copied()
    }

    /// The nodes that are not an in-tree successor of any other node — the
    /// outermost instructions of the tree's expression(s). Every non-empty
    /// tree has at least one root.
    pub fn roots(&self) -> Vec<Inst> {
        let mut has_predecessor: FxHashSet<Inst> = FxHashSet::default();
        for succs in self.successors.values() {
            has_predecessor.extend(succs.iter().copied());
        }
        let mut roots: Vec<Inst> =
            self.nodes().filter(|n| !has_predecessor.contains(n)).collect();
        roots.sort_by_key(|inst| format!("{inst:?}"));
        roots
    }
}

/// A forest: a partition of a block's eligible instructions into disjoint
/// [`Tree`]s.
#[derive(Debug, Default)]
pub struct Forest {
    trees: Vec<Tree>,
    index: FxHashMap<Inst, usize>,
}

impl Forest {
    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn into_trees(self) -> Vec<Tree> {
        self.trees
    }

    pub fn tree_of(&self, inst: Inst) -> Option<&Tree> {
        self.index.get(&inst).map(|&tid| &self.trees[tid])
    }
}

/// Builds the forest for `block`: every instruction for which `is_eligible`
/// returns true is assigned to exactly one tree, with two eligible
/// instructions reachable from each other via a path of operand/use edges
/// (undirected) always ending up in the same tree (spec.md §4.1).
///
/// Internally this unions nodes via a disjoint-set structure rather than the
/// source's "walk and absorb downstream users" recursion — both produce the
/// same equivalence classes (the contract is an undirected connectivity
/// partition), and a union-find sidesteps the bookkeeping of merging two
/// `Vec`-backed trees in place.
pub fn build_forest(
    func: &Function,
    block: Block,
    mut is_eligible: impl FnMut(&Function, Inst) -> bool,
) -> Forest {
    let insts = func.block_insts(block);
    let eligible: FxHashSet<Inst> =
        insts.iter().copied().filter(|&i| is_eligible(func, i)).collect();

    let mut parent: FxHashMap<Inst, Inst> = eligible.iter().map(|&i| (i, i)).collect();

    for &inst in &eligible {
        for &operand in &func.inst(inst).operands {
            if let Some(op_inst) = func.defining_inst(operand)
                && eligible.contains(&op_inst)
            {
                union(&mut parent, inst, op_inst);
            }
        }
    }

    let mut groups: FxHashMap<Inst, Vec<Inst>> = FxHashMap::default();
    for &inst in &eligible {
        let root = find(&mut parent, inst);
        groups.entry(root).or_default().push(inst);
    }

    let mut group_list: Vec<Vec<Inst>> = groups.into_values().collect();
    group_list.sort_by_key(|members| members.iter().map(|i| format!("{i:?}")).min());

    let mut trees = Vec::with_capacity(group_list.len());
    let mut index = FxHashMap::default();
    for (tid, members) in group_list.into_iter().enumerate() {
        let mut successors = FxHashMap::default();
        for &member in &members {
            let mut succ = FxHashSet::default();
            for &operand in &func.inst(member).operands {
                if let Some(op_inst) = func.defining_inst(operand)
                    && eligible.contains(&op_inst)
                {
                    succ.insert(op_inst);
                }
            }
            successors.insert(member, succ);
            index.insert(member, tid);
        }
        trees.push(Tree { successors });
    }

    Forest { trees, index }
}

fn find(parent: &mut FxHashMap<Inst, Inst>, x: Inst) -> Inst {
    let mut root = x;
    while parent[&root] != root {
        root = parent[&root];
    }
    let mut cur = x;
    while parent[&cur] != root {
        let next = parent[&cur];
        parent.insert(cur, root);
        cur = next;
    }
    root
}

fn union(parent: &mut FxHashMap<Inst, Inst>, a: Inst, b: Inst) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        parent.insert(ra, rb);
    }
}
