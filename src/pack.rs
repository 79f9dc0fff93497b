//! MSB-first N-bit integer packing into 32-bit words.
//!
//! A sequence of `L` values of width `N` (1 ≤ N ≤ 31) occupies
//! `ceil(N·L/32)` words; the last word is zero-padded.  [`pack_bits_into32`]
//! dispatches on the width: the 8–15 and 16–31 ranges take gather-style fast
//! paths where one destination word is assembled from at most five
//! (respectively three) source values, the rest go through the general
//! scatter encoder.  [`unpack_bits_from32`] is the inverse.
//!
//! The packer is pure: no state, and the caller sizes the output with
//! [`pack32_len`].

const WORD_BITS: usize = 32;

/// Number of 32-bit words needed to hold `nelem` values of `nbit` bits.
#[inline]
pub fn pack32_len(nelem: usize, nbit: u32) -> usize {
    let nbit = nbit as usize;
    // split to avoid overflow on nbit * nelem for huge inputs
    let n = nelem / WORD_BITS;
    let rest = nelem - n * WORD_BITS;
    nbit * n + (nbit * rest + WORD_BITS - 1) / WORD_BITS
}

// ── Encoders ──────────────────────────────────────────────────────────────────

/// General encoder: scatter each value across one or two destination words.
fn pack_general(packed: &mut [u32], data: &[u32], nbit: u32) -> usize {
    let nbit = nbit as usize;
    let mask = (1u32 << nbit) - 1;
    let len = pack32_len(data.len(), nbit as u32);

    for w in packed[..len].iter_mut() {
        *w = 0;
    }

    let mut word = 0usize;
    let mut off = 0usize;
    for &v in data {
        if off > WORD_BITS {
            off -= WORD_BITS;
            word += 1;
        }
        let value = v & mask;
        if WORD_BITS < off + nbit {
            packed[word] |= value >> (off + nbit - WORD_BITS);
            packed[word + 1] |= value << (2 * WORD_BITS - off - nbit);
        } else {
            packed[word] |= value << (WORD_BITS - off - nbit);
        }
        off += nbit;
    }
    len
}

/// Fast path for widths 8–15: each destination word gathers at most five
/// source values.
fn pack_w8(packed: &mut [u32], data: &[u32], nbit: u32) -> usize {
    debug_assert!((8..16).contains(&nbit));
    let nbit = nbit as usize;
    let mask = (1u32 << nbit) - 1;
    let len = pack32_len(data.len(), nbit as u32);

    let pick = |m: usize| data.get(m).copied().unwrap_or(0) & mask;

    for (i, w) in packed[..len].iter_mut().enumerate() {
        let bit0 = WORD_BITS * i;
        let m = bit0 / nbit;
        let mut base = nbit - (bit0 - m * nbit);

        let mut acc = pick(m) << (WORD_BITS - base);
        for k in 1..5 {
            base += nbit;
            acc |= if base >= 2 * WORD_BITS {
                0
            } else if base > WORD_BITS {
                pick(m + k) >> (base - WORD_BITS)
            } else {
                pick(m + k) << (WORD_BITS - base)
            };
        }
        *w = acc;
    }
    len
}

/// Fast path for widths 16–31: each destination word gathers at most three
/// source values.
fn pack_w16(packed: &mut [u32], data: &[u32], nbit: u32) -> usize {
    debug_assert!((16..32).contains(&nbit));
    let nbit = nbit as usize;
    let mask = (1u32 << nbit) - 1;
    let len = pack32_len(data.len(), nbit as u32);

    let pick = |m: usize| data.get(m).copied().unwrap_or(0) & mask;

    for (i, w) in packed[..len].iter_mut().enumerate() {
        let bit0 = WORD_BITS * i;
        let m = bit0 / nbit;
        let mut base = nbit - (bit0 - m * nbit);

        let mut acc = pick(m) << (WORD_BITS - base);
        for k in 1..3 {
            base += nbit;
            acc |= if base >= 2 * WORD_BITS {
                0
            } else if base > WORD_BITS {
                pick(m + k) >> (base - WORD_BITS)
            } else {
                pick(m + k) << (WORD_BITS - base)
            };
        }
        *w = acc;
    }
    len
}

/// Pack `data` (each value `nbit` bits wide, 1 ≤ nbit ≤ 31) into `packed`,
/// MSB first.  Returns the number of words written; `packed` must hold at
/// least [`pack32_len`]`(data.len(), nbit)` words.
pub fn pack_bits_into32(packed: &mut [u32], data: &[u32], nbit: u32) -> usize {
    assert!(nbit > 0 && nbit < 32);
    match nbit {
        8..=15 => pack_w8(packed, data, nbit),
        16..=31 => pack_w16(packed, data, nbit),
        _ => pack_general(packed, data, nbit),
    }
}

/// Unpack `data.len()` values of `nbit` bits from `packed`.
pub fn unpack_bits_from32(data: &mut [u32], packed: &[u32], nbit: u32) {
    assert!(nbit > 0 && nbit < 32);
    let nbit = nbit as usize;
    let mask = (1u32 << nbit) - 1;

    for (i, out) in data.iter_mut().enumerate() {
        let i2 = i / WORD_BITS;
        let i3 = i % WORD_BITS;
        let pos = nbit * i2 + (nbit * i3) / WORD_BITS;
        let off = (nbit * i3) % WORD_BITS;

        *out = if off + nbit > WORD_BITS {
            ((packed[pos] << (off + nbit - WORD_BITS)) & mask)
                | ((packed[pos + 1] >> (2 * WORD_BITS - off - nbit)) & mask)
        } else {
            (packed[pos] >> (WORD_BITS - off - nbit)) & mask
        };
    }
}

/// Pack a flag per grid cell into a bitmap, MSB first.  Returns the number
/// of words written (`ceil(flags.len()/32)`).
pub fn pack_bools_into32(packed: &mut [u32], flags: &[bool]) -> usize {
    let len = pack32_len(flags.len(), 1);
    for w in packed[..len].iter_mut() {
        *w = 0;
    }
    for (i, &flag) in flags.iter().enumerate() {
        if flag {
            packed[i / WORD_BITS] |= 1u32 << (31 - (i % WORD_BITS));
        }
    }
    len
}

// ─── Tests ────────────────────────────────────────────────────────────────────
