//! Order-preserving encoding of floating point numbers.
//!
//! [`sortable_serialise`] converts an `f64` into a byte string whose
//! byte-wise ordering matches the numeric ordering of the inputs. It is what
//! number and date value ranges compare against, and what
//! [`ValueWeightPostingSource`](crate::ValueWeightPostingSource) decodes.
//!
//! Layout of the first byte (`Sm Se Le E E E E E`):
//!
//! - `Sm`: sign of the mantissa, 1 for positive.
//! - `Se`: sign of the exponent, relative to `Sm`.
//! - `Le`: exponent length, 3 bits when set relative to `Se`, else 11 bits.
//!
//! The mantissa follows in up to 7 bytes and trailing zero bytes are dropped.
//! Zero encodes as `0x80`, positive infinity as nine `0xff` bytes and
//! negative infinity as the empty string.

/// Split `value` into a mantissa in `[0.5, 1)` and a power of two.
fn frexp(value: f64) -> (f64, i32) {
    if value == 0.0 || !value.is_finite() {
        return (value, 0);
    }
    let bits = value.to_bits();
    let exp_bits = ((bits >> 52) & 0x7ff) as i32;
    if exp_bits == 0 {
        // Subnormal: normalise first.
        let (mantissa, exponent) = frexp(value * 2f64.powi(64));
        return (mantissa, exponent - 64);
    }
    let mantissa_bits = (bits & !(0x7ffu64 << 52)) | (1022u64 << 52);
    (f64::from_bits(mantissa_bits), exp_bits - 1022)
}

/// Multiply `mantissa` by `2^exponent` without intermediate overflow.
fn scalbn(mantissa: f64, exponent: i32) -> f64 {
    let half = exponent / 2;
    mantissa * 2f64.powi(half) * 2f64.powi(exponent - half)
}

/// Encode `value` so that byte-wise comparison matches numeric comparison.
pub fn sortable_serialise(value: f64) -> Vec<u8> {
    if value < -f64::MAX {
        return Vec::new();
    }

    let (mut mantissa, mut exponent) = frexp(value);

    if mantissa == 0.0 || mantissa.is_nan() || exponent < -2039 {
        return vec![0x80];
    }

    let negative = mantissa < 0.0;
    if negative {
        mantissa = -mantissa;
    }

    if value > f64::MAX || exponent > 2055 {
        return vec![0xff; 9];
    }

    let mut buf = Vec::with_capacity(9);
    let mut next: u8 = if negative { 0 } else { 0xe0 };

    // Bias so more small integers get the short exponent form.
    exponent -= 8;
    let exponent_negative = exponent < 0;
    if exponent_negative {
        exponent = -exponent;
        next ^= 0x60;
    }

    if exponent < 8 {
        next ^= 0x20;
        next |= (exponent << 2) as u8;
        if negative ^ exponent_negative {
            next ^= 0x1c;
        }
    } else {
        next |= (exponent >> 6) as u8;
        if negative ^ exponent_negative {
            next ^= 0x1f;
        }
        buf.push(next);
        next = ((exponent << 2) & 0xff) as u8;
        if negative ^ exponent_negative {
            next ^= 0xfc;
        }
    }

    mantissa *= f64::from(1u32 << if negative { 26 } else { 27 });
    let mut word1 = mantissa as u32;
    mantissa -= f64::from(word1);
    let mut word2 = (mantissa * 4_294_967_296.0) as u32;

    if negative {
        // Negate rather than flip so that larger magnitudes sort first.
        word1 = word1.wrapping_neg();
        if word2 != 0 {
            word1 = word1.wrapping_add(1);
        }
        word2 = word2.wrapping_neg();
    }

    word1 &= 0x03ff_ffff;
    next |= (word1 >> 24) as u8;
    buf.push(next);
    buf.push((word1 >> 16) as u8);
    buf.push((word1 >> 8) as u8);
    buf.push(word1 as u8);
    buf.extend_from_slice(&word2.to_be_bytes());

    while buf.last() == Some(&0) {
        buf.pop();
    }
    buf
}

/// Decode a value produced by [`sortable_serialise`].
///
/// Strings which were not produced by `sortable_serialise` decode to some
/// number without error.
pub fn sortable_unserialise(value: &[u8]) -> f64 {
    if value == [0x80] {
        return 0.0;
    }
    if value.len() == 9 && value.iter().all(|&b| b == 0xff) {
        return f64::INFINITY;
    }
    if value.is_empty() {
        return f64::NEG_INFINITY;
    }

    let at = |pos: usize| -> u8 { value.get(pos).copied().unwrap_or(0) };

    let mut first = at(0);
    let mut i = 0usize;
    first ^= (first & 0xc0) >> 1;
    let negative = first & 0x80 == 0;
    let exponent_negative = first & 0x40 != 0;
    let explen = first & 0x20 == 0;
    let mut exponent = i32::from(first & 0x1f);
    if !explen {
        exponent >>= 2;
        if negative ^ exponent_negative {
            exponent ^= 0x07;
        }
    } else {
        i += 1;
        first = at(i);
        exponent <<= 6;
        exponent |= i32::from(first >> 2);
        if negative ^ exponent_negative {
            exponent ^= 0x07ff;
        }
    }

    let mut word1 = u32::from(first & 0x03) << 24;
    i += 1;
    word1 |= u32::from(at(i)) << 16;
    i += 1;
    word1 |= u32::from(at(i)) << 8;
    i += 1;
    word1 |= u32::from(at(i));

    let mut word2 = 0u32;
    if i < value.len() {
        for _ in 0..4 {
            i += 1;
            word2 = (word2 << 8) | u32::from(at(i));
        }
    }

    if negative {
        word1 = word1.wrapping_neg();
        if word2 != 0 {
            word1 = word1.wrapping_add(1);
        }
        word2 = word2.wrapping_neg();
        word1 &= 0x03ff_ffff;
    } else {
        word1 |= 1 << 26;
    }

    let mut mantissa = 0.0;
    if word2 != 0 {
        mantissa = f64::from(word2) / 4_294_967_296.0;
    }
    mantissa += f64::from(word1);
    mantissa /= f64::from(1u32 << if negative { 26 } else { 27 });

    if exponent_negative {
        exponent = -exponent;
    }
    exponent += 8;
    if negative {
        mantissa = -mantissa;
    }
    scalbn(mantissa, exponent)
}
