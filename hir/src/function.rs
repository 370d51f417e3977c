use cranelift_entity::{PrimaryMap, SecondaryMap};
use smallvec::SmallVec;

use crate::{Block, Inst, Value};

/// Opcodes this engine's transforms need to read or emit.
///
/// Deliberately a small subset of a real dialect's opcode set: integer
/// constants, zero extension/truncation, the three bitwise binary ops, the
/// two logical shifts, and the five integer arithmetic ops spec.md §6 lists
/// as the IR builder's required repertoire.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Opcode {
    Iconst,
    Zext,
    Trunc,
    Band,
    Bor,
    Bxor,
    Shl,
    Lshr,
    Add,
    Sub,
    Mul,
    Udiv,
    Urem,
}

impl Opcode {
    /// Opcodes eligible for X-OR.
    pub fn is_xor(&self) -> bool {
        matches!(self, Opcode::Bxor)
    }

    /// Opcodes eligible for Split-Bitwise-Op.
    pub fn is_bitwise(&self) -> bool {
        matches!(self, Opcode::Band | Opcode::Bor | Opcode::Bxor)
    }
}

#[derive(Debug, Clone)]
pub struct InstData {
    pub opcode: Opcode,
    /// Bit-width of the instruction's result type.
    pub ty: u32,
    pub operands: SmallVec<[Value; 2]>,
    /// The immediate payload of an `Iconst`; `None` for every other opcode.
    pub imm: Option<u128>,
    pub block: Block,
    result: Option<Value>,
}

impl InstData {
    pub fn result(&self) -> Value {
        self.result.expect("instruction has not been assigned a result yet")
    }
}

#[derive(Debug, Clone)]
pub enum ValueData {
    /// A function parameter of the given bit-width.
    Param { ty: u32 },
    /// An integer constant of the given bit-width.
    Const { ty: u32, value: u128 },
    /// The result of an instruction.
    InstResult(Inst),
}

/// An operand use site: the `index`-th operand of `inst`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Use {
    pub inst: Inst,
    pub index: usize,
}

#[derive(Debug, Default, Clone)]
struct BlockData {
    insts: Vec<Inst>,
}

/// A function body: a handful of basic blocks, each a flat, ordered
/// instruction list, with use-site tracking across the whole function.
///
/// There is intentionally no control-flow graph here — spec.md treats
/// cross-basic-block flow as out of scope, so a `Function` is just a bag of
/// independently-addressable blocks.
#[derive(Debug, Default)]
pub struct Function {
    insts: PrimaryMap<Inst, InstData>,
    values: PrimaryMap<Value, ValueData>,
    blocks: PrimaryMap<Block, BlockData>,
    uses: SecondaryMap<Value, Vec<Use>>,
}

impl Function {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_block(&mut self) -> Block {
        self.blocks.push(BlockData::default())
    }

    pub fn make_param(&mut self, ty: u32) -> Value {
        self.values.push(ValueData::Param { ty })
    }

    pub fn make_const(&mut self, ty: u32, value: u128) -> Value {
        self.values.push(ValueData::Const { ty, value })
    }

    pub fn block_insts(&self, block: Block) -> &[Inst] {
        &self.blocks[block].insts
    }

    pub fn inst(&self, inst: Inst) -> &InstData {
        &self.insts[inst]
    }

    pub fn value_data(&self, value: Value) -> &ValueData {
        &self.values[value]
    }

    pub fn value_ty(&self, value: Value) -> u32 {
        match &self.values[value] {
            ValueData::Param { ty } | ValueData::Const { ty, .. } => *ty,
            ValueData::InstResult(inst) => self.insts[*inst].ty,
        }
    }

    /// Returns the instruction defining `value`, if it is the result of one.
    pub fn defining_inst(&self, value: Value) -> Option<Inst> {
        match self.values[value] {
            ValueData::InstResult(inst) => Some(inst),
            _ => None,
        }
    }

    pub fn uses(&self, value: Value) -> &[Use] {
        self.uses.get(value).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Inserts a new instruction into `block`, before `before` in program
    /// order, registering use-sites for its operands. Returns the new
    /// instruction and its (single) result value.
    pub fn push_inst(
        &mut self,
        block: Block,
        before: Inst,
        opcode: Opcode,
        ty: u32,
        operands: SmallVec<[Value; 2]>,
        imm: Option<u128>,
    ) -> (Inst, Value) {
        let inst = self.insts.push(InstData {
            opcode,
            ty,
            operands: SmallVec::new(),
            imm,
            block,
            result: None,
        });
        self.insts[inst].operands = operands.clone();
        for (index, operand) in operands.iter().enumerate() {
            self.uses[*operand].push(Use { inst, index });
        }

        let result = self.values.push(ValueData::InstResult(inst));
        self.insts[inst].result = Some(result);

        let list = &mut self.blocks[block].insts;
        let pos = list.iter().position(|&i| i == before).expect("insertion anchor not in block");
        list.insert(pos, inst);

        (inst, result)
    }

    /// Appends a new instruction to the end of `block`. Used only to build
    /// up test fixtures; the engine itself always inserts anchored before a
    /// specific instruction.
    pub fn append_inst(
        &mut self,
        block: Block,
        opcode: Opcode,
        ty: u32,
        operands: SmallVec<[Value; 2]>,
        imm: Option<u128>,
    ) -> (Inst, Value) {
        let inst = self.insts.push(InstData {
            opcode,
            ty,
            operands: operands.clone(),
            imm,
            block,
            result: None,
        });
        for (index, operand) in operands.iter().enumerate() {
            self.uses[*operand].push(Use { inst, index });
        }
        let result = self.values.push(ValueData::InstResult(inst));
        self.insts[inst].result = Some(result);
        self.blocks[block].insts.push(inst);
        (inst, result)
    }

    pub fn result_value(&self, inst: Inst) -> Value {
        self.insts[inst].result()
    }

    /// Rewrites the `index`-th operand of `inst` to `new_value`, maintaining
    /// the use-list of both the old and new value.
    pub fn set_operand(&mut self, inst: Inst, index: usize, new_value: Value) {
        let old_value = self.insts[inst].operands[index];
        if old_value == new_value {
            return;
        }
        self.insts[inst].operands[index] = new_value;
        if let Some(uses) = self.uses.get_mut(old_value) {
            uses.retain(|u| !(u.inst == inst && u.index == index));
        }
        self.uses[new_value].push(Use { inst, index });
    }

    /// Replaces every use of `old` with `new`.
    pub fn replace_all_uses_with(&mut self, old: Value, new: Value) {
        let sites = self.uses(old).to_vec();
        for site in sites {
            self.set_operand(site.inst, site.index, new);
        }
    }

    /// Replaces uses of `old` with `new`, but only at use sites whose owning
    /// instruction satisfies `keep`. Used to rewrite only the uses of a tree
    /// node that live outside the tree (spec.md §4.6 step 3).
    pub fn replace_uses_where(&mut self, old: Value, new: Value, mut keep: impl FnMut(Inst) -> bool) {
        let sites = self.uses(old).to_vec();
        for site in sites {
            if keep(site.inst) {
                self.set_operand(site.inst, site.index, new);
            }
        }
    }

    /// Removes `inst` from its block's instruction list and unregisters its
    /// operand use-sites. `inst`'s `InstData` and result `Value` remain
    /// addressable through the arena — other tree nodes processed earlier in
    /// the same pass run may still reach it via `defining_inst` — but it is no
    /// longer visited by block iteration. Used once a tree node's own uses
    /// have all been redirected, so its original instruction is fully dead.
    pub fn remove_inst(&mut self, inst: Inst) {
        let block = self.insts[inst].block;
        let operands = self.insts[inst].operands.clone();
        for (index, operand) in operands.iter().enumerate() {
            if let Some(uses) = self.uses.get_mut(*operand) {
                uses.retain(|u| !(u.inst == inst && u.index == index));
            }
        }
        self.blocks[block].insts.retain(|&i| i != inst);
    }
}
