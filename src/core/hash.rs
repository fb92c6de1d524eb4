/*!
 * Hash Engine
 *
 * Deterministic, non-cryptographic hashing for bucket placement and fast
 * equality on small fixed-size keys. Every process sharing a map must place
 * keys identically, so nothing here is randomized per process.
 */

const WORD: usize = std::mem::size_of::<u64>();

const PREFIX_MULT: u64 = 0x9e37_79b9_7f4a_7c15;
const WORD_MULT: u64 = 0xbf58_476d_1ce4_e5b9;
const TAIL_MULT: u64 = 0x94d0_49bb_1331_11eb;

/// Hash a byte buffer
///
/// Folds the buffer in three passes: the bytes before the first word-aligned
/// address, the run of whole native-endian words, and the trailing bytes. Each
/// pass uses its own odd multiplier. An empty buffer hashes to 0.
///
/// The split depends on where the buffer starts, so equal bytes at different
/// word alignments can hash differently. Runtime allocations are word aligned.
pub fn hash_bytes(buffer: &[u8]) -> u64 {
    if buffer.is_empty() {
        return 0;
    }

    // SAFETY: every bit pattern is a valid u64
    let (prefix, words, tail) = unsafe { buffer.align_to::<u64>() };

    let mut acc: u64 = 0;
    for &b in prefix {
        acc = acc.wrapping_add(u64::from(b).wrapping_mul(PREFIX_MULT));
    }
    for &w in words {
        acc = acc.wrapping_add(w.wrapping_mul(WORD_MULT));
    }
    for &b in tail {
        acc = acc.wrapping_add(u64::from(b).wrapping_mul(TAIL_MULT));
    }
    acc
}

/// splitmix64 finalizer
#[inline]
pub fn hash_u64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Byte-exact equality, compared a word at a time
pub fn bytes_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    if std::ptr::eq(a.as_ptr(), b.as_ptr()) {
        return true;
    }

    let mut lhs = a.chunks_exact(WORD);
    let mut rhs = b.chunks_exact(WORD);
    for (x, y) in lhs.by_ref().zip(rhs.by_ref()) {
        if load_word(x) != load_word(y) {
            return false;
        }
    }

    lhs.remainder() == rhs.remainder()
}

#[inline(always)]
fn load_word(chunk: &[u8]) -> u64 {
    let mut raw = [0u8; WORD];
    raw.copy_from_slice(chunk);
    u64::from_ne_bytes(raw)
}
