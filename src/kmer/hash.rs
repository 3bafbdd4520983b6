//! Bob Jenkins' `lookup3`/`hashlittle` byte-array hash, ported from the
//! reference implementation's `Common/PackedSeq.cpp`. Only the
//! alignment-agnostic ("read the key one byte at a time") code path is
//! implemented: `hashlittle` is specified to return the same 32-bit value
//! for a given byte string regardless of which internal code path computed
//! it, so the byte-wise path is both portable and sufficient here — there
//! is no 32-bit-aligned buffer to exploit in a `&[u8]` slice anyway.
//!
//! The seed `131` matches `PackedSeq::getHashCode`'s call
//! `hashlittle(m_seq, getNumCodingBytes(m_length) - 1, 131)`.

const SEED: u32 = 131;

#[inline]
fn rot(x: u32, k: u32) -> u32 {
    x.rotate_left(k)
}

#[inline]
fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_sub(*c);
    *a ^= rot(*c, 4);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a);
    *b ^= rot(*a, 6);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b);
    *c ^= rot(*b, 8);
    *b = b.wrapping_add(*a);
    *a = a.wrapping_sub(*c);
    *a ^= rot(*c, 16);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a);
    *b ^= rot(*a, 19);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b);
    *c ^= rot(*b, 4);
    *b = b.wrapping_add(*a);
}

#[inline]
fn final_mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *c ^= *b;
    *c = c.wrapping_sub(rot(*b, 14));
    *a ^= *c;
    *a = a.wrapping_sub(rot(*c, 11));
    *b ^= *a;
    *b = b.wrapping_sub(rot(*a, 25));
    *c ^= *b;
    *c = c.wrapping_sub(rot(*b, 16));
    *a ^= *c;
    *a = a.wrapping_sub(rot(*c, 4));
    *b ^= *a;
    *b = b.wrapping_sub(rot(*a, 14));
    *c ^= *b;
    *c = c.wrapping_sub(rot(*b, 24));
}

fn hashlittle(key: &[u8], initval: u32) -> u32 {
    let length = key.len() as u32;
    let mut a: u32 = 0xdeadbeefu32.wrapping_add(length).wrapping_add(initval);
    let mut b = a;
    let mut c = a;

    let mut k = key;
    while k.len() > 12 {
        a = a.wrapping_add(k[0] as u32);
        a = a.wrapping_add((k[1] as u32) << 8);
        a = a.wrapping_add((k[2] as u32) << 16);
        a = a.wrapping_add((k[3] as u32) << 24);
        b = b.wrapping_add(k[4] as u32);
        b = b.wrapping_add((k[5] as u32) << 8);
        b = b.wrapping_add((k[6] as u32) << 16);
        b = b.wrapping_add((k[7] as u32) << 24);
        c = c.wrapping_add(k[8] as u32);
        c = c.wrapping_add((k[9] as u32) << 8);
        c = c.wrapping_add((k[10] as u32) << 16);
        c = c.wrapping_add((k[11] as u32) << 24);
        mix(&mut a, &mut b, &mut c);
        k = &k[12..];
    }

    let n = k.len();
    if n == 0 {
        return c;
    }
    macro_rules! byte {
        ($i:expr) => {
            k[$i] as u32
        };
    }
    if n >= 12 {
        c = c.wrapping_add(byte!(11) << 24);
    }
    if n >= 11 {
        c = c.wrapping_add(byte!(10) << 16);
    }
    if n >= 10 {
        c = c.wrapping_add(byte!(9) << 8);
    }
    if n >= 9 {
        c = c.wrapping_add(byte!(8));
    }
    if n >= 8 {
        b = b.wrapping_add(byte!(7) << 24);
    }
    if n >= 7 {
        b = b.wrapping_add(byte!(6) << 16);
    }
    if n >= 6 {
        b = b.wrapping_add(byte!(5) << 8);
    }
    if n >= 5 {
        b = b.wrapping_add(byte!(4));
    }
    if n >= 4 {
        a = a.wrapping_add(byte!(3) << 24);
    }
    if n >= 3 {
        a = a.wrapping_add(byte!(2) << 16);
    }
    if n >= 2 {
        a = a.wrapping_add(byte!(1) << 8);
    }
    a = a.wrapping_add(byte!(0));

    final_mix(&mut a, &mut b, &mut c);
    c
}

/// Hash `bytes` (already the "coding bytes minus one" slice `Kmer::hash`
/// selects) and fold the 32-bit `lookup3` result into a `u64` for use as a
/// Rust `Hash`/`HashMap` key. The fold is a pure widen, not a second
/// mixing round: the top 32 bits are always zero, which is fine since
/// every consumer (`HashMap`'s own `SipHash` of this value, or direct
/// bucket indexing in the sharded store) only needs good low-bit
/// dispersion, which `lookup3` already provides.
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    hashlittle(bytes, SEED) as u64
}

/// A `Hasher` that passes a single `write_u64` straight through.
///
/// `Kmer`'s `std::hash::Hash` impl already calls `hash_bytes` (the real
/// mixing work); wrapping that output in `SipHash` a second time would
/// just waste cycles on every vertex-store lookup. The vertex store
/// builds its map with `KmerBuildHasher` for this reason — the same
/// reason the reference implementation stores its hash set's bucket
/// index as `getHashCode() % numBuckets` rather than re-hashing.
#[derive(Default, Clone, Copy)]
pub struct PassthroughHasher(u64);

impl std::hash::Hasher for PassthroughHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        // Only ever called if something other than `Kmer::hash` feeds this
        // hasher; fall back to mixing the bytes so it stays well-defined.
        self.0 = hash_bytes(bytes);
    }

    fn write_u64(&mut self, i: u64) {
        self.0 = i;
    }
}

pub type KmerBuildHasher = std::hash::BuildHasherDefault<PassthroughHasher>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_returns_seed_derived_constant() {
        let h = hashlittle(&[], SEED);
        let h2 = hashlittle(&[], SEED);
        assert_eq!(h, h2);
    }

    #[test]
    fn distinct_inputs_usually_differ() {
        let a = hashlittle(b"ACGT", SEED);
        let b = hashlittle(b"ACGA", SEED);
        assert_ne!(a, b);
    }

    #[test]
    fn deterministic_across_lengths() {
        for len in 0..40 {
            let buf: Vec<u8> = (0..len).map(|i| (i * 7 + 3) as u8).collect();
            let h1 = hashlittle(&buf, SEED);
            let h2 = hashlittle(&buf, SEED);
            assert_eq!(h1, h2, "len={len}");
        }
    }
}
