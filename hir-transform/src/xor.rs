//! X-OR: rewrites XOR into base-B digit-sum arithmetic (spec.md §4.4).

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use smallvec::{SmallVec, smallvec};

use midenc_obf_hir::{Builder, Function, Inst, Opcode, Value};

use crate::{
    engine::Transform,
    forest::Tree,
    params::{choose_xor_base, required_bits},
};

/// Precomputes `base^0, base^1, ..., base^(count-1)` mod 2^128, wrapping
/// rather than panicking on overflow — the values are only ever consumed as
/// N-bit constants, which are themselves reduced modulo 2^N at evaluation
/// time.
fn base_powers(base: u64, count: u32) -> Vec<u128> {
    let mut table = Vec::with_capacity(count as usize);
    let mut acc = 1u128;
    for _ in 0..count {
        table.push(acc);
        acc = acc.wrapping_mul(base as u128);
    }
    table
}

/// The X-OR obfuscation: rewrites a tree of `xor` instructions into addition
/// in a non-binary positional base, converting back to binary only at the
/// tree's boundary.
#[derive(Debug, Default, Copy, Clone)]
pub struct XorObfuscation;

impl Transform for XorObfuscation {
    type Param = u64;

    fn is_eligible(&self, func: &Function, inst: Inst) -> bool {
        func.inst(inst).opcode.is_xor()
    }

    fn choose_param(&self, func: &Function, tree: &Tree, rng: &mut ChaCha8Rng) -> Option<u64> {
        choose_xor_base(func, tree, rng)
    }

    fn forward(
        &self,
        builder: &mut Builder<'_>,
        value: Value,
        base: u64,
        rng: &mut ChaCha8Rng,
    ) -> SmallVec<[Value; 4]> {
        let w = builder.func().value_ty(value);
        let n = required_bits(w, base);
        if n == 0 {
            return SmallVec::new();
        }
        let table = base_powers(base, w);
        let mut order: Vec<u32> = (0..w).collect();
        order.shuffle(rng);

        let extended = builder.zext(value, n);
        let one = builder.iconst(n, 1);
        let mut accu = builder.iconst(n, 0);
        for i in order {
            let i_const = builder.iconst(n, i as u128);
            let shifted = builder.lshr(extended, i_const, n);
            let bit = builder.band(shifted, one, n);
            let pow_const = builder.iconst(n, table[i as usize]);
            let digit = builder.mul(bit, pow_const, n);
            accu = builder.add(accu, digit, n);
        }
        smallvec![accu]
    }

    fn combine(
        &self,
        builder: &mut Builder<'_>,
        inst: Inst,
        operands: &[SmallVec<[Value; 4]>],
        base: u64,
    ) -> SmallVec<[Value; 4]> {
        assert_eq!(operands.len(), 2, "xor is a binary operation");
        let lhs = &operands[0];
        let rhs = &operands[1];
        assert_eq!(lhs.len(), 1, "xor operand sequence must have length 1");
        assert_eq!(rhs.len(), 1, "xor operand sequence must have length 1");

        let w = builder.func().inst(inst).ty;
        let n = required_bits(w, base);
        if n == 0 {
            return SmallVec::new();
        }
        let sum = builder.add(lhs[0], rhs[0], n);
        smallvec![sum]
    }

    fn back(
        &self,
        builder: &mut Builder<'_>,
        seq: &[Value],
        base: u64,
        width: u32,
        rng: &mut ChaCha8Rng,
    ) -> Value {
        assert_eq!(seq.len(), 1, "xor back-transform expects a single obfuscated value");
        let obfuscated = seq[0];
        let n = builder.func().value_ty(obfuscated);

        let table = base_powers(base, width);
        let base_const = builder.iconst(n, base as u128);
        let two = builder.iconst(n, 2);
        let mut order: Vec<u32> = (0..width).collect();
        order.shuffle(rng);

        let mut accu = builder.iconst(width, 0);
        for i in order {
            let pow_const = builder.iconst(n, table[i as usize]);
            let divided = builder.udiv(obfuscated, pow_const, n);
            let rem = builder.urem(divided, base_const, n);
            let bit_n = builder.urem(rem, two, n);
            let bit_w = builder.trunc(bit_n, width);
            let i_const = builder.iconst(width, i as u128);
            let shifted = builder.shl(bit_w, i_const, width);
            accu = builder.bor(accu, shifted, width);
        }
        builder.trunc(accu, width)
    }
}
