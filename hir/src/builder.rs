use smallvec::smallvec;

use crate::{Block, Function, Inst, Opcode, Value};

/// An IR builder anchored at a specific instruction: every instruction it
/// emits is inserted immediately before that anchor, in the order emitted,
/// so dominance is preserved (spec.md §4.6, "Ordering & anchors").
pub struct Builder<'f> {
    func: &'f mut Function,
    block: Block,
    before: Inst,
}

impl<'f> Builder<'f> {
    pub fn at(func: &'f mut Function, block: Block, before: Inst) -> Self {
        Self { func, block, before }
    }

    pub fn func(&self) -> &Function {
        self.func
    }

    pub fn iconst(&mut self, ty: u32, value: u128) -> Value {
        let (_, result) =
            self.func.push_inst(self.block, self.before, Opcode::Iconst, ty, smallvec![], Some(value));
        result
    }

    pub fn zext(&mut self, value: Value, ty: u32) -> Value {
        self.unary(Opcode::Zext, value, ty)
    }

    pub fn trunc(&mut self, value: Value, ty: u32) -> Value {
        self.unary(Opcode::Trunc, value, ty)
    }

    pub fn band(&mut self, lhs: Value, rhs: Value, ty: u32) -> Value {
        self.binary(Opcode::Band, lhs, rhs, ty)
    }

    pub fn bor(&mut self, lhs: Value, rhs: Value, ty: u32) -> Value {
        self.binary(Opcode::Bor, lhs, rhs, ty)
    }

    pub fn bxor(&mut self, lhs: Value, rhs: Value, ty: u32) -> Value {
        self.binary(Opcode::Bxor, lhs, rhs, ty)
    }

    pub fn shl(&mut self, lhs: Value, rhs: Value, ty: u32) -> Value {
        self.binary(Opcode::Shl, lhs, rhs, ty)
    }

    pub fn lshr(&mut self, lhs: Value, rhs: Value, ty: u32) -> Value {
        self.binary(Opcode::Lshr, lhs, rhs, ty)
    }

    pub fn add(&mut self, lhs: Value, rhs: Value, ty: u32) -> Value {
        self.binary(Opcode::Add, lhs, rhs, ty)
    }

    pub fn sub(&mut self, lhs: Value, rhs: Value, ty: u32) -> Value {
        self.binary(Opcode::Sub, lhs, rhs, ty)
    }

    pub fn mul(&mut self, lhs: Value, rhs: Value, ty: u32) -> Value {
        self.binary(Opcode::Mul, lhs, rhs, ty)
    }

    pub fn udiv(&mut self, lhs: Value, rhs: Value, ty: u32) -> Value {
        self.binary(Opcode::Udiv, lhs, rhs, ty)
    }

    pub fn urem(&mut self, lhs: Value, rhs: Value, ty: u32) -> Value {
        self.binary(Opcode::Urem, lhs, rhs, ty)
    }

    fn unary(&mut self, opcode: Opcode, value: Value, ty: u32) -> Value {
        let (_, result) = self.func.push_inst(self.block, self.before, opcode, ty, smallvec![value], None);
        result
    }

    fn binary(&mut self, opcode: Opcode, lhs: Value, rhs: Value, ty: u32) -> Value {
        let (_, result) =
            self.func.push_inst(self.block, self.before, opcode, ty, smallvec![lhs, rhs], None);
        result
    }
}
