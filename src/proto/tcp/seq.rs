//! Sequence-number comparisons modulo 2^32.
//!
//! `a` is before `b` when the signed distance from `b` to `a` is negative.

pub fn seq_lt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

pub fn seq_leq(a: u32, b: u32) -> bool {
    a == b || seq_lt(a, b)
}

pub fn seq_gt(a: u32, b: u32) -> bool {
    seq_lt(b, a)
}

pub fn seq_geq(a: u32, b: u32) -> bool {
    seq_leq(b, a)
}
