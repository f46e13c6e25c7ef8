//! Incremental 32-bit MurmurHash3.
//!
//! Data may be fed in pieces of any length; the result equals the one-shot
//! MurmurHash3_x86_32 of the concatenation.

const C1: u32 = 0xcc9e_2d51;
const C2: u32 = 0x1b87_3593;

/// Running MurmurHash3 state: hash, carried tail bytes and total length.
#[derive(Debug, Clone)]
pub struct MurmurHasher32 {
    h: u32,
    carry: u32,
    carry_len: u32,
    total_len: u32,
}

impl MurmurHasher32 {
    /// Creates a hasher with the given seed.
    pub fn new(seed: u32) -> Self {
        Self {
            h: seed,
            carry: 0,
            carry_len: 0,
            total_len: 0,
        }
    }

    /// Feeds `data` into the hash.
    pub fn process(&mut self, data: &[u8]) {
        self.total_len = self.total_len.wrapping_add(data.len() as u32);
        let mut rest = data;

        // Complete a partially filled block first.
        while self.carry_len != 0 && !rest.is_empty() {
            self.push_carry(rest[0]);
            rest = &rest[1..];
        }

        let mut blocks = rest.chunks_exact(4);
        for block in &mut blocks {
            let k = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
            self.h = mix_h(self.h, mix_k(k));
        }
        for &byte in blocks.remainder() {
            self.push_carry(byte);
        }
    }

    /// Finalizes and returns the hash value.
    pub fn finish(&self) -> u32 {
        let mut h = self.h;
        if self.carry_len != 0 {
            h ^= mix_k(self.carry);
        }
        h ^= self.total_len;
        fmix32(h)
    }

    /// Number of bytes processed so far.
    pub fn total_len(&self) -> u32 {
        self.total_len
    }

    fn push_carry(&mut self, byte: u8) {
        self.carry |= (byte as u32) << (8 * self.carry_len);
        self.carry_len += 1;
        if self.carry_len == 4 {
            self.h = mix_h(self.h, mix_k(self.carry));
            self.carry = 0;
            self.carry_len = 0;
        }
    }
}

impl Default for MurmurHasher32 {
    fn default() -> Self {
        Self::new(0)
    }
}

/// One-shot MurmurHash3_x86_32.
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let mut hasher = MurmurHasher32::new(seed);
    hasher.process(data);
    hasher.finish()
}

fn mix_k(mut k: u32) -> u32 {
    k = k.wrapping_mul(C1);
    k = k.rotate_left(15);
    k.wrapping_mul(C2)
}

fn mix_h(mut h: u32, k: u32) -> u32 {
    h ^= k;
    h = h.rotate_left(13);
    h.wrapping_mul(5).wrapping_add(0xe654_6b64)
}

fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}
