//! A deliberately small SSA intermediate representation.
//!
//! `midenc-obf-transform` is written against exactly the capability set the
//! obfuscation passes need: integer-typed values, a flat per-block
//! instruction list in program order, use-site tracking, and an IR builder
//! anchored at an instruction. It does not model regions, control flow
//! between blocks, or non-integer types — those live in the real
//! `midenc-hir`/dialect crates and are out of scope for this engine.

mod builder;
mod entity;
mod eval;
mod function;

pub use self::{
    builder::Builder,
    entity::{Block, Inst, Value},
    eval::{EvalError, eval_block},
    function::{Function, InstData, Opcode, Use, ValueData},
};
