//! Conversion of payload values to their ASCII record form.
//!
//! Every implementation upholds the record contract: an append either
//! succeeds in full or leaves the buffer byte-for-byte unchanged.

use crate::buffer::Buffer;

/// Free space a numeric conversion requires before it is attempted. Covers
/// the widest 64-bit integer with sign, and the widest 12-significant-digit
/// float rendering.
const NUMERIC_HEADROOM: usize = 32;

// Indexed by `9 + (value % 10)`, which keeps negative remainders working
// without negating the value; `i64::MIN` has no positive counterpart.
const DIGIT_TABLE: &[u8; 19] = b"9876543210123456789";

/// A payload value that can be appended to a log record in ASCII form.
pub trait Encode {
    /// Appends the value, returning `false` if the buffer refused it.
    fn encode(&self, buffer: &mut Buffer) -> bool;
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self, buffer: &mut Buffer) -> bool {
        (**self).encode(buffer)
    }
}

impl Encode for bool {
    fn encode(&self, buffer: &mut Buffer) -> bool {
        buffer.append(if *self { b"true" } else { b"false" })
    }
}

impl Encode for char {
    fn encode(&self, buffer: &mut Buffer) -> bool {
        let mut utf8 = [0_u8; 4];
        buffer.append(self.encode_utf8(&mut utf8).as_bytes())
    }
}

impl Encode for str {
    fn encode(&self, buffer: &mut Buffer) -> bool {
        buffer.append(self.as_bytes())
    }
}

impl Encode for String {
    fn encode(&self, buffer: &mut Buffer) -> bool {
        buffer.append(self.as_bytes())
    }
}

impl Encode for [u8] {
    fn encode(&self, buffer: &mut Buffer) -> bool {
        buffer.append(self)
    }
}

macro_rules! encode_signed {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Encode for $ty {
                fn encode(&self, buffer: &mut Buffer) -> bool {
                    encode_i64(buffer, i64::from(*self))
                }
            }
        )*
    };
}

macro_rules! encode_unsigned {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Encode for $ty {
                fn encode(&self, buffer: &mut Buffer) -> bool {
                    encode_u64(buffer, u64::from(*self))
                }
            }
        )*
    };
}

encode_signed!(i8, i16, i32);
encode_unsigned!(u8, u16, u32);

impl Encode for i64 {
    fn encode(&self, buffer: &mut Buffer) -> bool {
        encode_i64(buffer, *self)
    }
}

impl Encode for u64 {
    fn encode(&self, buffer: &mut Buffer) -> bool {
        encode_u64(buffer, *self)
    }
}

impl Encode for isize {
    fn encode(&self, buffer: &mut Buffer) -> bool {
        encode_i64(buffer, i64::try_from(*self).expect("isize fits into i64"))
    }
}

impl Encode for usize {
    fn encode(&self, buffer: &mut Buffer) -> bool {
        encode_u64(buffer, u64::try_from(*self).expect("usize fits into u64"))
    }
}

impl Encode for f32 {
    fn encode(&self, buffer: &mut Buffer) -> bool {
        encode_f64(buffer, f64::from(*self))
    }
}

impl Encode for f64 {
    fn encode(&self, buffer: &mut Buffer) -> bool {
        encode_f64(buffer, *self)
    }
}

fn encode_i64(buffer: &mut Buffer, mut value: i64) -> bool {
    if buffer.remaining() < NUMERIC_HEADROOM {
        return false;
    }
    if value == 0 {
        return buffer.append_byte(b'0');
    }

    let negative = value < 0;
    let mut digits = [0_u8; 19];
    let mut used = 0;
    while value != 0 {
        let index = usize::try_from(9 + value % 10).expect("remainder is within the digit table");
        digits[used] = DIGIT_TABLE[index];
        used += 1;
        value /= 10;
    }
    digits[..used].reverse();

    // The headroom check above guarantees both appends succeed.
    let mut ok = true;
    if negative {
        ok &= buffer.append_byte(b'-');
    }
    ok && buffer.append(&digits[..used])
}

fn encode_u64(buffer: &mut Buffer, mut value: u64) -> bool {
    if buffer.remaining() < NUMERIC_HEADROOM {
        return false;
    }
    if value == 0 {
        return buffer.append_byte(b'0');
    }

    let mut digits = [0_u8; 20];
    let mut used = 0;
    while value != 0 {
        digits[used] = b'0' + u8::try_from(value % 10).expect("remainder is a single digit");
        used += 1;
        value /= 10;
    }
    digits[..used].reverse();

    buffer.append(&digits[..used])
}

fn encode_f64(buffer: &mut Buffer, value: f64) -> bool {
    if buffer.remaining() < NUMERIC_HEADROOM {
        return false;
    }

    buffer.append(format_significant(value).as_bytes())
}

/// Renders `value` with 12 significant digits, trimming trailing zeros and
/// switching to exponent form outside `[1e-4, 1e12)`.
fn format_significant(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_owned();
    }
    if value.is_infinite() {
        return if value.is_sign_negative() { "-inf" } else { "inf" }.to_owned();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_owned();
    }

    // Normalize through scientific notation with 11 fractional digits, which
    // pins the significant-digit count at 12 and makes the exponent explicit.
    let scientific = format!("{value:.11e}");
    let (mantissa, exponent) = scientific
        .split_once('e')
        .expect("scientific notation always carries an exponent");
    let exponent: i32 = exponent.parse().expect("exponent is a small integer");

    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    debug_assert_eq!(digits.len(), 12);

    if (-4..12).contains(&exponent) {
        format_fixed(sign, &digits, exponent)
    } else {
        format_exponent(sign, &digits, exponent)
    }
}

fn format_fixed(sign: &str, digits: &str, exponent: i32) -> String {
    if exponent >= 0 {
        let split = usize::try_from(exponent).expect("non-negative exponent") + 1;
        let integer = &digits[..split];
        let fraction = digits[split..].trim_end_matches('0');
        if fraction.is_empty() {
            format!("{sign}{integer}")
        } else {
            format!("{sign}{integer}.{fraction}")
        }
    } else {
        let leading_zeros = usize::try_from(-exponent).expect("negative exponent") - 1;
        let fraction = digits.trim_end_matches('0');
        format!("{sign}0.{}{fraction}", "0".repeat(leading_zeros))
    }
}

fn format_exponent(sign: &str, digits: &str, exponent: i32) -> String {
    let fraction = digits[1..].trim_end_matches('0');
    let lead = &digits[..1];
    if fraction.is_empty() {
        format!("{sign}{lead}e{exponent:+03}")
    } else {
        format!("{sign}{lead}.{fraction}e{exponent:+03}")
    }
}
