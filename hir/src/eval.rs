use std::collections::HashMap;

use crate::{Block, Function, Opcode, Value, ValueData};

/// Errors that can occur while interpreting a block.
///
/// This interpreter exists only so this crate's tests can check "universal
/// semantic equivalence" (spec.md §8) without a real host compiler to
/// compile obfuscated and unobfuscated programs through.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,
}

fn mask(value: u128, width: u32) -> u128 {
    if width >= 128 { value } else { value & ((1u128 << width) - 1) }
}

fn value_of(func: &Function, value: Value, results: &HashMap<Value, u128>) -> u128 {
    if let Some(v) = results.get(&value) {
        return *v;
    }
    match func.value_data(value) {
        ValueData::Const { value, .. } => *value,
        ValueData::Param { .. } => {
            panic!("no binding supplied for function parameter {value:?}")
        }
        ValueData::InstResult(_) => {
            unreachable!("instruction results are evaluated before their uses")
        }
    }
}

/// Evaluates every instruction of `block` in program order, given bindings
/// for its free parameters, and returns the computed value for every
/// instruction result in the block.
pub fn eval_block(
    func: &Function,
    block: Block,
    inputs: &HashMap<Value, u128>,
) -> Result<HashMap<Value, u128>, EvalError> {
    let mut results = inputs.clone();
    for &inst in func.block_insts(block) {
        let data = func.inst(inst);
        let ty = data.ty;
        let value = match data.opcode {
            Opcode::Iconst => data.imm.expect("Iconst without immediate"),
            Opcode::Zext | Opcode::Trunc => {
                let operand = value_of(func, data.operands[0], &results);
                mask(operand, ty)
            }
            Opcode::Band | Opcode::Bor | Opcode::Bxor | Opcode::Shl | Opcode::Lshr | Opcode::Add
            | Opcode::Sub | Opcode::Mul | Opcode::Udiv | Opcode::Urem => {
                let lhs = value_of(func, data.operands[0], &results);
                let rhs = value_of(func, data.operands[1], &results);
                match data.opcode {
                    Opcode::Band => mask(lhs & rhs, ty),
                    Opcode::Bor => mask(lhs | rhs, ty),
                    Opcode::Bxor => mask(lhs ^ rhs, ty),
                    Opcode::Shl => {
                        if rhs >= 128 {
                            0
                        } else {
                            mask(lhs.wrapping_shl(rhs as u32), ty)
                        }
                    }
                    Opcode::Lshr => {
                        if rhs >= 128 {
                            0
                        } else {
                            mask(lhs.wrapping_shr(rhs as u32), ty)
                        }
                    }
                    Opcode::Add => mask(lhs.wrapping_add(rhs), ty),
                    Opcode::Sub => mask(lhs.wrapping_sub(rhs), ty),
                    Opcode::Mul => mask(lhs.wrapping_mul(rhs), ty),
                    Opcode::Udiv => {
                        if rhs == 0 {
                            return Err(EvalError::DivisionByZero);
                        }
                        mask(lhs / rhs, ty)
                    }
                    Opcode::Urem => {
                        if rhs == 0 {
                            return Err(EvalError::DivisionByZero);
                        }
                        mask(lhs % rhs, ty)
                    }
                    _ => unreachable!(),
                }
            }
        };
        results.insert(func.result_value(inst), value);
    }
    Ok(results)
}
