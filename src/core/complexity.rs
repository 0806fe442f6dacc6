//! Lempel–Ziv complexity of a post-perturbation tail.
//!
//! The tail is reduced to a bit string (did each component increase since the
//! previous tick?) and parsed with the exhaustive LZ76 factorisation. The
//! normalised phrase count `c * log2(n) / n` approaches the entropy rate of
//! the source for long strings: near zero for monotone or periodic tails,
//! near one for noise-like ones. An LZ4 compressed size is reported next to
//! it as a second, coarser compressibility reading.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::stabilizer::SymbolicLabel;

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ComplexityReport {
    /// LZ76 phrase count of the derivative-sign string.
    pub phrases: usize,
    /// Length of the derivative-sign string.
    pub symbols: usize,
    pub proxy: f64,
    /// Same proxy over the stabilizer's label sequence, when labels exist.
    pub label_proxy: Option<f64>,
    pub compressed_bytes: usize,
    pub raw_bytes: usize,
}

/// Number of phrases in the exhaustive LZ76 parse of `s`
/// (Kaspar & Schuster, 1987).
pub fn lz76_phrases<T: PartialEq>(s: &[T]) -> usize {
    let n = s.len();
    if n < 2 {
        return n;
    }
    let (mut c, mut l, mut i, mut k, mut k_max) = (1usize, 1usize, 0usize, 1usize, 1usize);
    loop {
        if s[i + k - 1] == s[l + k - 1] {
            k += 1;
            if l + k > n {
                c += 1;
                break;
            }
        } else {
            k_max = k_max.max(k);
            i += 1;
            if i == l {
                c += 1;
                l += k_max;
                if l + 1 > n {
                    break;
                }
                i = 0;
                k = 1;
                k_max = 1;
            } else {
                k = 1;
            }
        }
    }
    c
}

/// `c * log2(n) / n`; zero for strings too short to normalise.
pub fn normalized(phrases: usize, n: usize) -> f64 {
    if n < 2 {
        return 0.0;
    }
    let n = n as f64;
    phrases as f64 * n.log2() / n
}

/// One bit per component per tick transition: 1 when the value increased.
/// Tick-major, so all components of one transition are adjacent.
pub fn derivative_signs(states: &[Vec<f64>]) -> Vec<u8> {
    states
        .windows(2)
        .flat_map(|w| w[1].iter().zip(&w[0]).map(|(now, prev)| u8::from(now > prev)))
        .collect()
}

/// Complexity of a tail given as flattened states, oldest first, plus the
/// label sequence over the same ticks if the stabilizer ran.
pub fn analyze(states: &[Vec<f64>], labels: &[&SymbolicLabel]) -> ComplexityReport {
    let bits = derivative_signs(states);
    let phrases = lz76_phrases(&bits);
    let label_proxy = (!labels.is_empty()).then(|| normalized(lz76_phrases(labels), labels.len()));
    ComplexityReport {
        phrases,
        symbols: bits.len(),
        proxy: normalized(phrases, bits.len()),
        label_proxy,
        compressed_bytes: lz4_flex::compress(&bits).len(),
        raw_bytes: bits.len(),
    }
}
