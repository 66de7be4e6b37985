//! The numeric tower: fixed-width ints, big ints, rationals and floats.
//!
//! ```text
//!   Int(i64) ──overflow──▶ BigInt ──÷──▶ Rat ──any float operand──▶ Float
//!      ▲                     │            │
//!      └─────normalize───────┴────────────┘   (fits i64 / denominator 1)
//! ```
//!
//! Binary operations lift both operands to the higher of their two tiers
//! and normalize the result back down. Integer `+ - *` first try `i64`
//! arithmetic with explicit sign checks and only fall back to big-int math
//! when the check reports overflow; the fast path is observably identical to
//! always computing in big ints.

use std::cmp::Ordering;
use std::fmt;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{FromPrimitive, ToPrimitive, Zero};
use thiserror::Error;

/// Arithmetic and number-parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NumError {
    #[error("divisor must be nonzero")]
    DivideByZero,
    #[error("cannot parse as number: {0}")]
    Parse(String),
    #[error("{0} requires integer operands")]
    NotInteger(&'static str),
    #[error("{0} has no exact representation")]
    NotFinite(String),
}

/// A number.
#[derive(Debug, Clone, PartialEq)]
pub enum Num {
    Int(i64),
    BigInt(BigInt),
    Rat(BigRational),
    Float(f64),
}

/// Add two `i64`s, reporting whether the result is exact.
///
/// Overflow happens iff both operands share a sign and the wrapped sum's
/// sign differs from it.
pub fn safe_int_add(a: i64, b: i64) -> (i64, bool) {
    let sum = a.wrapping_add(b);
    let overflow = (a >= 0) == (b >= 0) && (sum >= 0) != (a >= 0);
    (sum, !overflow)
}

/// Subtract two `i64`s, reporting whether the result is exact.
pub fn safe_int_sub(a: i64, b: i64) -> (i64, bool) {
    let diff = a.wrapping_sub(b);
    let overflow = (a >= 0) != (b >= 0) && (diff >= 0) != (a >= 0);
    (diff, !overflow)
}

/// Multiply two `i64`s, reporting whether the result is exact.
///
/// The sign check runs before the division check, which also keeps
/// `MIN / -1` from ever being evaluated.
pub fn safe_int_mul(a: i64, b: i64) -> (i64, bool) {
    if a == 0 || b == 0 {
        return (0, true);
    }
    let product = a.wrapping_mul(b);
    if (product < 0) != ((a < 0) != (b < 0)) {
        return (product, false);
    }
    if product / b != a {
        return (product, false);
    }
    (product, true)
}

enum Lifted {
    Big(BigInt, BigInt),
    Rat(BigRational, BigRational),
    Float(f64, f64),
}

impl Num {
    fn tier(&self) -> u8 {
        match self {
            Num::Int(_) => 0,
            Num::BigInt(_) => 1,
            Num::Rat(_) => 2,
            Num::Float(_) => 3,
        }
    }

    /// Shrink to the smallest exact representation.
    pub fn normalize(self) -> Num {
        match self {
            Num::BigInt(b) => match b.to_i64() {
                Some(i) => Num::Int(i),
                None => Num::BigInt(b),
            },
            Num::Rat(r) if r.is_integer() => Num::BigInt(r.to_integer()).normalize(),
            n => n,
        }
    }

    fn as_big(&self) -> BigInt {
        match self {
            Num::Int(i) => BigInt::from(*i),
            Num::BigInt(b) => b.clone(),
            Num::Rat(r) => r.to_integer(),
            Num::Float(f) => BigInt::from_f64(*f).unwrap_or_default(),
        }
    }

    fn as_rat(&self) -> BigRational {
        match self {
            Num::Rat(r) => r.clone(),
            Num::Float(f) => BigRational::from_float(*f).unwrap_or_default(),
            n => BigRational::from_integer(n.as_big()),
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Num::Int(i) => *i as f64,
            Num::BigInt(b) => b.to_f64().unwrap_or(f64::NAN),
            Num::Rat(r) => r.to_f64().unwrap_or(f64::NAN),
            Num::Float(f) => *f,
        }
    }

    /// The value as an `i64`, if it is an integer that fits.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Num::Int(i) => Some(*i),
            Num::BigInt(b) => b.to_i64(),
            Num::Rat(r) if r.is_integer() => r.to_integer().to_i64(),
            Num::Float(f) if f.fract() == 0.0 && f.is_finite() => f.to_i64(),
            _ => None,
        }
    }

    pub fn is_exact(&self) -> bool {
        !matches!(self, Num::Float(_))
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Num::Int(i) => *i == 0,
            Num::BigInt(b) => b.is_zero(),
            Num::Rat(r) => r.is_zero(),
            Num::Float(f) => *f == 0.0,
        }
    }

    /// Convert a float to the exact rational it denotes.
    pub fn to_exact(&self) -> Result<Num, NumError> {
        match self {
            Num::Float(f) => BigRational::from_float(*f)
                .map(|r| Num::Rat(r).normalize())
                .ok_or_else(|| NumError::NotFinite(format_float(*f))),
            n => Ok(n.clone()),
        }
    }

    pub fn to_inexact(&self) -> Num {
        Num::Float(self.to_f64())
    }

    fn lift(a: &Num, b: &Num) -> Lifted {
        match a.tier().max(b.tier()) {
            0 | 1 => Lifted::Big(a.as_big(), b.as_big()),
            2 => Lifted::Rat(a.as_rat(), b.as_rat()),
            _ => Lifted::Float(a.to_f64(), b.to_f64()),
        }
    }

    pub fn add(&self, other: &Num) -> Num {
        if let (Num::Int(a), Num::Int(b)) = (self, other) {
            if let (sum, true) = safe_int_add(*a, *b) {
                return Num::Int(sum);
            }
        }
        match Num::lift(self, other) {
            Lifted::Big(a, b) => Num::BigInt(a + b).normalize(),
            Lifted::Rat(a, b) => Num::Rat(a + b).normalize(),
            Lifted::Float(a, b) => Num::Float(a + b),
        }
    }

    pub fn sub(&self, other: &Num) -> Num {
        if let (Num::Int(a), Num::Int(b)) = (self, other) {
            if let (diff, true) = safe_int_sub(*a, *b) {
                return Num::Int(diff);
            }
        }
        match Num::lift(self, other) {
            Lifted::Big(a, b) => Num::BigInt(a - b).normalize(),
            Lifted::Rat(a, b) => Num::Rat(a - b).normalize(),
            Lifted::Float(a, b) => Num::Float(a - b),
        }
    }

    pub fn mul(&self, other: &Num) -> Num {
        if let (Num::Int(a), Num::Int(b)) = (self, other) {
            if let (product, true) = safe_int_mul(*a, *b) {
                return Num::Int(product);
            }
        }
        match Num::lift(self, other) {
            Lifted::Big(a, b) => Num::BigInt(a * b).normalize(),
            Lifted::Rat(a, b) => Num::Rat(a * b).normalize(),
            Lifted::Float(a, b) => Num::Float(a * b),
        }
    }

    /// Division. Exact operands give an exact (possibly rational) result.
    pub fn div(&self, other: &Num) -> Result<Num, NumError> {
        match Num::lift(self, other) {
            Lifted::Float(a, b) => Ok(Num::Float(a / b)),
            Lifted::Big(a, b) => {
                if b.is_zero() {
                    return Err(NumError::DivideByZero);
                }
                Ok(Num::Rat(BigRational::new(a, b)).normalize())
            }
            Lifted::Rat(a, b) => {
                if b.is_zero() {
                    return Err(NumError::DivideByZero);
                }
                Ok(Num::Rat(a / b).normalize())
            }
        }
    }

    /// Truncated remainder of two integers.
    pub fn rem(&self, other: &Num) -> Result<Num, NumError> {
        if self.tier() > 1 || other.tier() > 1 {
            return Err(NumError::NotInteger("%"));
        }
        if other.is_zero() {
            return Err(NumError::DivideByZero);
        }
        if let (Num::Int(a), Num::Int(b)) = (self, other) {
            if let Some(r) = a.checked_rem(*b) {
                return Ok(Num::Int(r));
            }
        }
        Ok(Num::BigInt(self.as_big() % other.as_big()).normalize())
    }

    pub fn neg(&self) -> Num {
        match self {
            Num::Int(i) => match i.checked_neg() {
                Some(n) => Num::Int(n),
                None => Num::BigInt(-BigInt::from(*i)),
            },
            Num::BigInt(b) => Num::BigInt(-b).normalize(),
            Num::Rat(r) => Num::Rat(-r),
            Num::Float(f) => Num::Float(-f),
        }
    }

    /// Reciprocal, `1 / self`.
    pub fn recip(&self) -> Result<Num, NumError> {
        Num::Int(1).div(self)
    }

    /// Numeric ordering across tiers. `None` only when a NaN is involved.
    pub fn compare(&self, other: &Num) -> Option<Ordering> {
        if let (Num::Int(a), Num::Int(b)) = (self, other) {
            return Some(a.cmp(b));
        }
        match Num::lift(self, other) {
            Lifted::Big(a, b) => Some(a.cmp(&b)),
            Lifted::Rat(a, b) => Some(a.cmp(&b)),
            Lifted::Float(a, b) => a.partial_cmp(&b),
        }
    }

    /// Parse number syntax: integers (decimal, `0x`, `0o`, `0b`), `n/d`
    /// rationals, decimal or exponent floats, `inf` and `nan`.
    pub fn parse(text: &str) -> Result<Num, NumError> {
        let bad = || NumError::Parse(text.to_string());
        match text {
            "inf" | "+inf" | "Inf" | "+Inf" => return Ok(Num::Float(f64::INFINITY)),
            "-inf" | "-Inf" => return Ok(Num::Float(f64::NEG_INFINITY)),
            "nan" | "NaN" => return Ok(Num::Float(f64::NAN)),
            _ => {}
        }
        if let Some((n, d)) = text.split_once('/') {
            let n = parse_int(n).ok_or_else(bad)?;
            let d = parse_int(d).ok_or_else(bad)?;
            if d.is_zero() {
                return Err(NumError::DivideByZero);
            }
            return Ok(Num::Rat(BigRational::new(n, d)).normalize());
        }
        if let Some(i) = parse_int(text) {
            return Ok(Num::BigInt(i).normalize());
        }
        let looks_decimal = text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
            && text.chars().any(|c| c.is_ascii_digit());
        if looks_decimal {
            if let Ok(f) = text.parse::<f64>() {
                return Ok(Num::Float(f));
            }
        }
        Err(bad())
    }
}

fn parse_int(text: &str) -> Option<BigInt> {
    let (negative, body) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let (radix, digits) = match body.get(..2) {
        Some("0x") | Some("0X") => (16, &body[2..]),
        Some("0o") | Some("0O") => (8, &body[2..]),
        Some("0b") | Some("0B") => (2, &body[2..]),
        _ => (10, body),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    let magnitude = BigInt::parse_bytes(digits.as_bytes(), radix)?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Format a float the way numbers print: plain decimal in the everyday
/// range, exponent form outside it, always recognizably a float.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    let abs = f.abs();
    if abs == 0.0 || (1e-4..1e21).contains(&abs) {
        let s = format!("{f}");
        if s.contains('.') {
            s
        } else {
            format!("{s}.0")
        }
    } else {
        format!("{f:e}")
    }
}

impl fmt::Display for Num {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Num::Int(i) => write!(f, "{i}"),
            Num::BigInt(b) => write!(f, "{b}"),
            Num::Rat(r) => write!(f, "{}/{}", r.numer(), r.denom()),
            Num::Float(x) => f.write_str(&format_float(*x)),
        }
    }
}

impl From<i64> for Num {
    fn from(i: i64) -> Self {
        Num::Int(i)
    }
}

impl From<f64> for Num {
    fn from(f: f64) -> Self {
        Num::Float(f)
    }
}

impl From<BigInt> for Num {
    fn from(b: BigInt) -> Self {
        Num::BigInt(b).normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const BOUNDARY: &[i64] = &[
        i64::MIN,
        i64::MIN + 1,
        -3_037_000_500,
        -3_037_000_499,
        -(1 << 32),
        -(1 << 31),
        -2,
        -1,
        0,
        1,
        2,
        1 << 31,
        1 << 32,
        3_037_000_499,
        3_037_000_500,
        i64::MAX - 1,
        i64::MAX,
    ];

    /// Deterministic spread of values across the whole i64 range.
    fn sample() -> Vec<i64> {
        let mut out = BOUNDARY.to_vec();
        let mut x: u64 = 0x9E37_79B9_7F4A_7C15;
        for _ in 0..48 {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            out.push(x as i64);
            out.push((x >> 33) as i64);
        }
        out
    }

    fn promoted(a: i64, b: i64, op: fn(BigInt, BigInt) -> BigInt) -> Num {
        Num::BigInt(op(BigInt::from(a), BigInt::from(b))).normalize()
    }

    #[test]
    fn fast_path_matches_promotion() {
        let values = sample();
        for &a in &values {
            for &b in &values {
                let (x, y) = (Num::Int(a), Num::Int(b));
                assert_eq!(x.add(&y), promoted(a, b, |p, q| p + q), "{a} + {b}");
                assert_eq!(x.sub(&y), promoted(a, b, |p, q| p - q), "{a} - {b}");
                assert_eq!(x.mul(&y), promoted(a, b, |p, q| p * q), "{a} * {b}");
            }
        }
    }

    #[test]
    fn overflow_detected_iff_result_does_not_fit() {
        let values = sample();
        let fits = |v: i128| v >= i64::MIN as i128 && v <= i64::MAX as i128;
        for &a in &values {
            for &b in &values {
                let (wide_a, wide_b) = (a as i128, b as i128);
                assert_eq!(safe_int_add(a, b).1, fits(wide_a + wide_b), "{a} + {b}");
                assert_eq!(safe_int_sub(a, b).1, fits(wide_a - wide_b), "{a} - {b}");
                assert_eq!(safe_int_mul(a, b).1, fits(wide_a * wide_b), "{a} * {b}");
            }
        }
    }

    #[test]
    fn max_plus_one_is_big() {
        let sum = Num::Int(i64::MAX).add(&Num::Int(1));
        assert_eq!(sum, Num::BigInt(BigInt::from(i64::MAX) + 1));
        assert_eq!(sum.to_string(), "9223372036854775808");
        assert_eq!(Num::Int(i64::MIN).sub(&Num::Int(1)).to_string(), "-9223372036854775809");
        assert_eq!(Num::Int(i64::MAX).mul(&Num::Int(2)).to_string(), "18446744073709551614");
    }

    #[test]
    fn big_results_shrink_back() {
        let big = Num::Int(i64::MAX).add(&Num::Int(1));
        assert_eq!(big.sub(&Num::Int(1)), Num::Int(i64::MAX));
    }

    #[rstest]
    #[case(Num::Int(1), Num::parse("3/2").unwrap(), "5/2")]
    #[case(Num::Int(1), Num::Float(0.5), "1.5")]
    #[case(Num::parse("1/2").unwrap(), Num::parse("1/2").unwrap(), "1")]
    #[case(Num::parse("1/3").unwrap(), Num::Float(1.0), "1.3333333333333333")]
    fn promotion_on_add(#[case] a: Num, #[case] b: Num, #[case] want: &str) {
        assert_eq!(a.add(&b).to_string(), want);
    }

    #[test]
    fn division_is_exact_for_exact_operands() {
        assert_eq!(Num::Int(6).div(&Num::Int(3)).unwrap(), Num::Int(2));
        assert_eq!(Num::Int(1).div(&Num::Int(3)).unwrap().to_string(), "1/3");
        assert_eq!(Num::Int(1).div(&Num::Int(0)), Err(NumError::DivideByZero));
        assert_eq!(Num::Float(1.0).div(&Num::Int(0)).unwrap(), Num::Float(f64::INFINITY));
    }

    #[test]
    fn remainder() {
        assert_eq!(Num::Int(7).rem(&Num::Int(3)).unwrap(), Num::Int(1));
        assert_eq!(Num::Int(-7).rem(&Num::Int(3)).unwrap(), Num::Int(-1));
        assert_eq!(Num::Int(i64::MIN).rem(&Num::Int(-1)).unwrap(), Num::Int(0));
        assert_eq!(Num::Int(1).rem(&Num::Int(0)), Err(NumError::DivideByZero));
        assert_eq!(Num::Float(1.0).rem(&Num::Int(2)), Err(NumError::NotInteger("%")));
    }

    #[test]
    fn negation_at_min() {
        assert_eq!(Num::Int(i64::MIN).neg().to_string(), "9223372036854775808");
        assert_eq!(Num::Int(i64::MIN).neg().neg(), Num::Int(i64::MIN));
    }

    #[rstest]
    #[case("0", "0")]
    #[case("-12", "-12")]
    #[case("0x1F", "31")]
    #[case("-0b101", "-5")]
    #[case("0o17", "15")]
    #[case("99999999999999999999", "99999999999999999999")]
    #[case("6/4", "3/2")]
    #[case("4/2", "2")]
    #[case("1.5", "1.5")]
    #[case("1e3", "1000.0")]
    #[case("2.0", "2.0")]
    #[case("inf", "+Inf")]
    #[case("-Inf", "-Inf")]
    #[case("1e-7", "1e-7")]
    fn parse_and_print(#[case] text: &str, #[case] want: &str) {
        assert_eq!(Num::parse(text).unwrap().to_string(), want);
    }

    #[rstest]
    #[case("")]
    #[case("abc")]
    #[case("1x")]
    #[case("0x")]
    #[case("1/x")]
    #[case("e")]
    fn parse_rejects(#[case] text: &str) {
        assert!(matches!(Num::parse(text), Err(NumError::Parse(_))));
    }

    #[test]
    fn compare_across_tiers() {
        let half = Num::parse("1/2").unwrap();
        assert_eq!(half.compare(&Num::Float(0.5)), Some(Ordering::Equal));
        assert_eq!(Num::Int(1).compare(&half), Some(Ordering::Greater));
        let big = Num::parse("99999999999999999999").unwrap();
        assert_eq!(Num::Int(i64::MAX).compare(&big), Some(Ordering::Less));
        assert_eq!(Num::Float(f64::NAN).compare(&Num::Int(1)), None);
    }

    #[test]
    fn exactness() {
        assert_eq!(Num::Float(0.5).to_exact().unwrap().to_string(), "1/2");
        assert!(Num::Float(f64::INFINITY).to_exact().is_err());
        assert_eq!(Num::parse("1/4").unwrap().to_inexact(), Num::Float(0.25));
    }
}
