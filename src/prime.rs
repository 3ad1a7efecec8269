//! Prime-number utilities backing the key exchange: trial-division primality,
//! safe-prime generation, and modular exponentiation.
//!
//! Primes here top out around 33 bits, which keeps every value inside plain
//! integer types. That is far too small to be secure; it is sized for
//! watching the algorithm work.

use rand::Rng;

/// Trial-division primality test: `num` is prime iff nothing in
/// `[2, floor(sqrt(num)) + 1]` divides it.
///
/// Note the checked range deliberately includes `sqrt + 1`, so `is_prime(2)`
/// is false; the callers below only ever probe odd candidates.
pub fn is_prime(num: u64) -> bool {
    if num == 1 {
        return false;
    }
    let root = (num as f64).sqrt() as u64 + 1;
    for x in 2..=root {
        if num % x == 0 {
            return false;
        }
    }
    true
}

/// Find the next prime at or after `num`, stepping through odd numbers.
///
/// Runs over u32 on purpose: an overflow wraps past zero onto an odd value,
/// so the search keeps going instead of aborting.
pub fn next_prime(mut num: u32) -> u32 {
    if num % 2 == 0 {
        num = num.wrapping_add(1);
    }
    while !is_prime(num as u64) {
        num = num.wrapping_add(2);
    }
    num
}

/// Generate a Sophie Germain pair: a prime `q` and the safe prime
/// `p = 2q + 1`.
///
/// Draws a 32-bit starting point, walks to the next prime `q`, and re-rolls
/// whenever `2q + 1` is composite. Safe primes make generator selection
/// cheap: every quadratic non-residue generates the order-`q` subgroup.
pub fn generate<R: Rng>(rng: &mut R) -> (u64, u64) {
    loop {
        let q = next_prime(rng.gen::<u32>()) as u64;
        let p = q * 2 + 1;
        if is_prime(p) {
            return (p, q);
        }
    }
}

/// Modular exponentiation by square-and-multiply, exponent scanned low bit
/// first. Products are widened to u128 so the reduction is exact for any
/// 64-bit modulus.
pub fn raise(mut value: u64, mut exp: u64, modulus: u64) -> u64 {
    let mut ret: u64 = 1;
    value %= modulus;

    while exp > 0 {
        if exp & 1 != 0 {
            ret = mul_mod(ret, value, modulus);
        }
        exp >>= 1;
        value = mul_mod(value, value, modulus);
    }
    ret
}

#[inline]
fn mul_mod(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}
