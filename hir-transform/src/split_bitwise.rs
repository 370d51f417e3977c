//! Split-Bitwise-Op: rewrites a W-bit bitwise AND/OR/XOR into K parallel
//! S-bit lane operations (spec.md §4.5).

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use smallvec::SmallVec;

use midenc_obf_hir::{Builder, Function, Inst, Opcode, Value};

use crate::{engine::Transform, forest::Tree, params::choose_split_width};

fn full_mask(width: u32) -> u128 {
    if width >= 128 { u128::MAX } else { (1u128 << width) - 1 }
}

/// The Split-Bitwise-Op obfuscation: rewrites a W-bit AND/OR/XOR tree into K
/// = W/S parallel S-bit lane operations, reassembling the result only where
/// consumers outside the tree require it.
#[derive(Debug, Default, Copy, Clone)]
pub struct SplitBitwiseOp;

impl Transform for SplitBitwiseOp {
    type Param = u32;

    fn is_eligible(&self, func: &Function, inst: Inst) -> bool {
        func.inst(inst).opcode.is_bitwise()
    }

    fn choose_param(&self, func: &Function, tree: &Tree, rng: &mut ChaCha8Rng) -> Option<u32> {
        choose_split_width(func, tree, rng)
    }

    fn forward(
        &self,
        builder: &mut Builder<'_>,
        value: Value,
        s: u32,
        rng: &mut ChaCha8Rng,
    ) -> SmallVec<[Value; 4]> {
        let w = builder.func().value_ty(value);
        if w == 0 || w % s != 0 {
            return SmallVec::new();
        }
        let k = w / s;
        let base_mask = full_mask(w) >> (w - s);

        let mut order: Vec<u32> = (0..k).collect();
        order.shuffle(rng);

        let mut lanes: Vec<Option<Value>> = vec![None; k as usize];
        for i in order {
            let shift = i * s;
            let shift_const = builder.iconst(w, shift as u128);
            let mask_const = builder.iconst(w, base_mask);
            let shifted_mask = builder.shl(mask_const, shift_const, w);
            let masked = builder.band(shifted_mask, value, w);
            let lowered = builder.lshr(masked, shift_const, w);
            let lane = builder.trunc(lowered, s);
            lanes[i as usize] = Some(lane);
        }
        lanes.into_iter().map(|l| l.expect("every lane index is visited exactly once")).collect()
    }

    fn combine(
        &self,
        builder: &mut Builder<'_>,
        inst: Inst,
        operands: &[SmallVec<[Value; 4]>],
        _s: u32,
    ) -> SmallVec<[Value; 4]> {
        assert_eq!(operands.len(), 2, "split-bitwise-op is a binary operation");
        let lhs = &operands[0];
        let rhs = &operands[1];
        assert_eq!(lhs.len(), rhs.len(), "split-bitwise-op operand sequences must match in length");
        if lhs.is_empty() {
            return SmallVec::new();
        }

        let opcode = builder.func().inst(inst).opcode;
        let lane_ty = builder.func().value_ty(lhs[0]);
        let mut result = SmallVec::with_capacity(lhs.len());
        for (&l, &r) in lhs.iter().zip(rhs.iter()) {
            let lane = match opcode {
                Opcode::Band => builder.band(l, r, lane_ty),
                Opcode::Bor => builder.bor(l, r, lane_ty),
                Opcode::Bxor => builder.bxor(l, r, lane_ty),
                other => unreachable!("split-bitwise-op is never eligible for {other:?}"),
            };
            result.push(lane);
        }
        result
    }

    fn back(
        &self,
        builder: &mut Builder<'_>,
        seq: &[Value],
        s: u32,
        width: u32,
        rng: &mut ChaCha8Rng,
    ) -> Value {
        let k = seq.len() as u32;
        assert_eq!(k * s, width, "lane count * lane width must reconstruct the original width");

        let mut order: Vec<u32> = (0..k).collect();
        order.shuffle(rng);

        let mut accu = builder.iconst(width, 0);
        for i in order {
            let lane = seq[i as usize];
            let extended = builder.zext(lane, width);
            let shift_const = builder.iconst(width, (i * s) as u128);
            let shifted = builder.shl(extended, shift_const, width);
            accu = builder.bor(accu, shifted, width);
        }
        accu
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use midenc_obf_hir::eval_block;
    use rand::SeedableRng;

    use super::*;
    use crate::engine::run_on_block;
    use crate::error::LogDiagnostics;

    #[test]
    fn round_trip_identity_for_every_split_width() {
        let mut func = Function::new();
        let block = func.create_block();
        let anchor = func.append_inst(block, Opcode::Iconst, 8, Default::default(), Some(0)).0;
        let param = func.make_param(8);

        let split = SplitBitwiseOp;
        for &s in &[1u32, 2, 4] {
            for v in [0u128, 1, 0xAA, 0xFF] {
                let mut rng = ChaCha8Rng::seed_from_u64(s as u64 + 1);
                let mut builder = Builder::at(&mut func, block, anchor);
                let seq = split.forward(&mut builder, param, s, &mut rng);
                assert_eq!(seq.len() as u32, 8 / s);
                let mut builder = Builder::at(&mut func, block, anchor);
                let back = split.back(&mut builder, &seq, s, 8, &mut rng);

                let mut inputs = HashMap::new();
                inputs.insert(param, v);
                let results = eval_block(&func, block, &inputs).unwrap();
                assert_eq!(results[&back], v, "round trip failed for s={s}, v={v}");
            }
        }
    }

    #[test]
    fn xor_self_is_zero_and_lane_ops_outnumber_the_original() {
        let mut func = Function::new();
        let block = func.create_block();
        let anchor = func.append_inst(block, Opcode::Iconst, 64, Default::default(), Some(0)).0;
        let a = func.make_param(64);
        let (_i, v) = func.push_inst(block, anchor, Opcode::Bxor, 64, [a, a].into(), None);
        let zero = func.make_const(64, 0);
        let (_ext, external_use) = func.append_inst(block, Opcode::Add, 64, [v, zero].into(), None);

        let mut inputs = HashMap::new();
        inputs.insert(a, 0xffff_ffff_ffff_ffffu128);
        let before = eval_block(&func, block, &inputs).unwrap();
        assert_eq!(before[&external_use], 0);

        let original_bitwise_count =
            func.block_insts(block).iter().filter(|&&i| func.inst(i).opcode.is_bitwise()).count();

        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let split = SplitBitwiseOp;
        let mut diags = LogDiagnostics;
        let changed = run_on_block(&split, &mut func, block, &mut rng, &mut diags);
        assert!(changed);

        let rewritten_bitwise_count =
            func.block_insts(block).iter().filter(|&&i| func.inst(i).opcode.is_bitwise()).count();
        assert!(rewritten_bitwise_count > original_bitwise_count);

        let after = eval_block(&func, block, &inputs).unwrap();
        assert_eq!(after[&external_use], 0);
    }
}
