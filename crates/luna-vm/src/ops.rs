//! Value-level operator kernels: arithmetic, bitwise, comparison, concat.
//!
//! These implement the Lua 5.3 coercion matrix. `+ - *` stay integer when
//! both operands are integers (wrapping) and go float otherwise; `/` and `^`
//! always produce floats; `//` and `%` floor toward negative infinity.
//! String operands coerce through the numeric grammar. Every failure names
//! the offending value's type, the dispatch loop adds source positions.

use luna_core::{parse_number, LuaError, LuaValue};

fn rt(msg: impl Into<String>) -> LuaError {
    LuaError::Runtime(msg.into())
}

// ── Coercion ─────────────────────────────────────────────────────────────────

/// Numeric view of a value: numbers pass through, strings parse by the Lua
/// grammar, everything else is `None`.
pub(crate) fn coerce_number(v: &LuaValue) -> Option<LuaValue> {
    match v {
        LuaValue::Integer(_) | LuaValue::Float(_) => Some(v.clone()),
        LuaValue::LuaString(s) => parse_number(s),
        _ => None,
    }
}

/// Integer view for bitwise operands: floats only when they are exact
/// integers, strings through the numeric grammar first.
pub(crate) fn to_int(v: &LuaValue) -> Result<i64, LuaError> {
    match coerce_number(v) {
        Some(LuaValue::Integer(i)) => Ok(i),
        Some(LuaValue::Float(f)) => {
            let i = f as i64;
            if i as f64 == f {
                Ok(i)
            } else {
                Err(rt("number has no integer representation"))
            }
        }
        _ => Err(rt(format!(
            "attempt to perform bitwise operation on a {} value",
            v.type_name()
        ))),
    }
}

pub(crate) fn as_f64(v: &LuaValue) -> f64 {
    match v {
        LuaValue::Integer(i) => *i as f64,
        LuaValue::Float(f) => *f,
        _ => 0.0,
    }
}

fn arith_err(a: &LuaValue, b: &LuaValue) -> LuaError {
    let bad = if coerce_number(a).is_none() { a } else { b };
    rt(format!(
        "attempt to perform arithmetic on a {} value",
        bad.type_name()
    ))
}

// ── Integer floor division / modulo ──────────────────────────────────────────

/// Floored quotient: rounds toward negative infinity, unlike Rust's `/`.
/// `i64::MIN // -1` wraps, matching Lua's wrapping integer arithmetic.
pub(crate) fn floor_div(x: i64, y: i64) -> i64 {
    let q = x.wrapping_div(y);
    if x.wrapping_rem(y) != 0 && ((x < 0) != (y < 0)) {
        q - 1
    } else {
        q
    }
}

/// Floored remainder: result takes the sign of the divisor.
pub(crate) fn floor_mod(x: i64, y: i64) -> i64 {
    let m = x.wrapping_rem(y);
    if m != 0 && ((m < 0) != (y < 0)) {
        m + y
    } else {
        m
    }
}

// ── Shifts ───────────────────────────────────────────────────────────────────

/// Logical (zero-fill) left shift. Negative counts shift right; counts past
/// the word width yield 0.
pub(crate) fn shift_left(x: i64, n: i64) -> i64 {
    if n <= -64 || n >= 64 {
        0
    } else if n >= 0 {
        ((x as u64) << n) as i64
    } else {
        ((x as u64) >> -n) as i64
    }
}

pub(crate) fn shift_right(x: i64, n: i64) -> i64 {
    if n == i64::MIN {
        0
    } else {
        shift_left(x, -n)
    }
}

// ── Arithmetic ───────────────────────────────────────────────────────────────

pub(crate) fn arith_add(a: &LuaValue, b: &LuaValue) -> Result<LuaValue, LuaError> {
    match (coerce_number(a), coerce_number(b)) {
        (Some(LuaValue::Integer(x)), Some(LuaValue::Integer(y))) => {
            Ok(LuaValue::Integer(x.wrapping_add(y)))
        }
        (Some(x), Some(y)) => Ok(LuaValue::Float(as_f64(&x) + as_f64(&y))),
        _ => Err(arith_err(a, b)),
    }
}

pub(crate) fn arith_sub(a: &LuaValue, b: &LuaValue) -> Result<LuaValue, LuaError> {
    match (coerce_number(a), coerce_number(b)) {
        (Some(LuaValue::Integer(x)), Some(LuaValue::Integer(y))) => {
            Ok(LuaValue::Integer(x.wrapping_sub(y)))
        }
        (Some(x), Some(y)) => Ok(LuaValue::Float(as_f64(&x) - as_f64(&y))),
        _ => Err(arith_err(a, b)),
    }
}

pub(crate) fn arith_mul(a: &LuaValue, b: &LuaValue) -> Result<LuaValue, LuaError> {
    match (coerce_number(a), coerce_number(b)) {
        (Some(LuaValue::Integer(x)), Some(LuaValue::Integer(y))) => {
            Ok(LuaValue::Integer(x.wrapping_mul(y)))
        }
        (Some(x), Some(y)) => Ok(LuaValue::Float(as_f64(&x) * as_f64(&y))),
        _ => Err(arith_err(a, b)),
    }
}

/// `/` always divides as floats.
pub(crate) fn arith_div(a: &LuaValue, b: &LuaValue) -> Result<LuaValue, LuaError> {
    match (coerce_number(a), coerce_number(b)) {
        (Some(x), Some(y)) => Ok(LuaValue::Float(as_f64(&x) / as_f64(&y))),
        _ => Err(arith_err(a, b)),
    }
}

pub(crate) fn arith_idiv(a: &LuaValue, b: &LuaValue) -> Result<LuaValue, LuaError> {
    match (coerce_number(a), coerce_number(b)) {
        (Some(LuaValue::Integer(x)), Some(LuaValue::Integer(y))) => {
            if y == 0 {
                return Err(rt("attempt to perform 'n//0'"));
            }
            Ok(LuaValue::Integer(floor_div(x, y)))
        }
        (Some(x), Some(y)) => Ok(LuaValue::Float((as_f64(&x) / as_f64(&y)).floor())),
        _ => Err(arith_err(a, b)),
    }
}

pub(crate) fn arith_mod(a: &LuaValue, b: &LuaValue) -> Result<LuaValue, LuaError> {
    match (coerce_number(a), coerce_number(b)) {
        (Some(LuaValue::Integer(x)), Some(LuaValue::Integer(y))) => {
            if y == 0 {
                return Err(rt("attempt to perform 'n%0'"));
            }
            Ok(LuaValue::Integer(floor_mod(x, y)))
        }
        (Some(x), Some(y)) => {
            let (x, y) = (as_f64(&x), as_f64(&y));
            Ok(LuaValue::Float(x - (x / y).floor() * y))
        }
        _ => Err(arith_err(a, b)),
    }
}

/// `^` always exponentiates as floats.
pub(crate) fn arith_pow(a: &LuaValue, b: &LuaValue) -> Result<LuaValue, LuaError> {
    match (coerce_number(a), coerce_number(b)) {
        (Some(x), Some(y)) => Ok(LuaValue::Float(as_f64(&x).powf(as_f64(&y)))),
        _ => Err(arith_err(a, b)),
    }
}

pub(crate) fn arith_unm(a: &LuaValue) -> Result<LuaValue, LuaError> {
    match coerce_number(a) {
        Some(LuaValue::Integer(i)) => Ok(LuaValue::Integer(i.wrapping_neg())),
        Some(LuaValue::Float(f)) => Ok(LuaValue::Float(-f)),
        _ => Err(rt(format!(
            "attempt to perform arithmetic on a {} value",
            a.type_name()
        ))),
    }
}

// ── Comparison ───────────────────────────────────────────────────────────────

pub(crate) fn cmp_lt(a: &LuaValue, b: &LuaValue) -> Result<bool, LuaError> {
    match (a, b) {
        (LuaValue::Integer(x), LuaValue::Integer(y)) => Ok(x < y),
        (LuaValue::Float(x), LuaValue::Float(y)) => Ok(x < y),
        (LuaValue::Integer(x), LuaValue::Float(y)) => Ok((*x as f64) < *y),
        (LuaValue::Float(x), LuaValue::Integer(y)) => Ok(*x < (*y as f64)),
        (LuaValue::LuaString(x), LuaValue::LuaString(y)) => Ok(x < y),
        _ => Err(rt(format!(
            "attempt to compare {} with {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

pub(crate) fn cmp_le(a: &LuaValue, b: &LuaValue) -> Result<bool, LuaError> {
    match (a, b) {
        (LuaValue::Integer(x), LuaValue::Integer(y)) => Ok(x <= y),
        (LuaValue::Float(x), LuaValue::Float(y)) => Ok(x <= y),
        (LuaValue::Integer(x), LuaValue::Float(y)) => Ok((*x as f64) <= *y),
        (LuaValue::Float(x), LuaValue::Integer(y)) => Ok(*x <= (*y as f64)),
        (LuaValue::LuaString(x), LuaValue::LuaString(y)) => Ok(x <= y),
        _ => Err(rt(format!(
            "attempt to compare {} with {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

// ── Concatenation / length ───────────────────────────────────────────────────

/// One operand of `..`: strings pass through, numbers render as they print.
pub(crate) fn concat_piece(v: &LuaValue) -> Result<String, LuaError> {
    match v {
        LuaValue::LuaString(s) => Ok(s.clone()),
        LuaValue::Integer(_) | LuaValue::Float(_) => Ok(v.to_string()),
        _ => Err(rt(format!(
            "attempt to concatenate a {} value",
            v.type_name()
        ))),
    }
}

pub(crate) fn length_of(v: &LuaValue) -> Result<LuaValue, LuaError> {
    match v {
        LuaValue::LuaString(s) => Ok(LuaValue::Integer(s.len() as i64)),
        LuaValue::Table(t) => Ok(LuaValue::Integer(t.read().unwrap().length())),
        _ => Err(rt(format!(
            "attempt to get length of a {} value",
            v.type_name()
        ))),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> LuaValue {
        LuaValue::Integer(i)
    }

    fn float(f: f64) -> LuaValue {
        LuaValue::Float(f)
    }

    #[test]
    fn floor_division_rounds_toward_negative_infinity() {
        assert_eq!(floor_div(7, 2), 3);
        assert_eq!(floor_div(-7, 2), -4);
        assert_eq!(floor_div(7, -2), -4);
        assert_eq!(floor_div(-7, -2), 3);
        assert_eq!(floor_div(6, 2), 3);
        assert_eq!(floor_div(i64::MIN, -1), i64::MIN);
    }

    #[test]
    fn floor_mod_takes_the_divisor_sign() {
        assert_eq!(floor_mod(7, 2), 1);
        assert_eq!(floor_mod(-7, 2), 1);
        assert_eq!(floor_mod(7, -2), -1);
        assert_eq!(floor_mod(-7, -2), -1);
        assert_eq!(floor_mod(i64::MIN, -1), 0);
    }

    #[test]
    fn shifts_are_logical_not_arithmetic() {
        assert_eq!(shift_right(-1, 1), i64::MAX);
        assert_eq!(shift_left(1, 63), i64::MIN);
        assert_eq!(shift_left(1, 64), 0);
        assert_eq!(shift_right(1, 64), 0);
    }

    #[test]
    fn negative_shift_counts_reverse_direction() {
        assert_eq!(shift_left(4, -1), 2);
        assert_eq!(shift_right(4, -1), 8);
        assert_eq!(shift_left(1, i64::MIN), 0);
        assert_eq!(shift_right(1, i64::MIN), 0);
    }

    #[test]
    fn add_keeps_integers_and_wraps() {
        assert_eq!(arith_add(&int(1), &int(2)).unwrap(), int(3));
        assert_eq!(arith_add(&int(i64::MAX), &int(1)).unwrap(), int(i64::MIN));
        assert_eq!(arith_add(&int(1), &float(0.5)).unwrap(), float(1.5));
    }

    #[test]
    fn div_and_pow_always_go_float() {
        assert!(matches!(
            arith_div(&int(7), &int(2)).unwrap(),
            LuaValue::Float(f) if f == 3.5
        ));
        assert!(matches!(
            arith_pow(&int(2), &int(10)).unwrap(),
            LuaValue::Float(f) if f == 1024.0
        ));
    }

    #[test]
    fn integer_division_by_zero_is_an_error() {
        assert!(arith_idiv(&int(1), &int(0)).is_err());
        assert!(arith_mod(&int(1), &int(0)).is_err());
        // float path divides to infinity instead
        assert!(arith_idiv(&float(1.0), &int(0)).is_ok());
    }

    #[test]
    fn strings_coerce_through_the_numeric_grammar() {
        assert_eq!(
            arith_add(&LuaValue::LuaString("10".into()), &int(5)).unwrap(),
            int(15)
        );
        assert_eq!(
            arith_mul(&LuaValue::LuaString(" 0x10 ".into()), &int(2)).unwrap(),
            int(32)
        );
        assert!(arith_add(&LuaValue::LuaString("pear".into()), &int(1)).is_err());
    }

    #[test]
    fn to_int_requires_an_exact_integer() {
        assert_eq!(to_int(&int(5)).unwrap(), 5);
        assert_eq!(to_int(&float(2.0)).unwrap(), 2);
        assert!(to_int(&float(2.5)).is_err());
        assert!(to_int(&LuaValue::Boolean(true)).is_err());
    }

    #[test]
    fn unary_minus_wraps_integers() {
        assert_eq!(arith_unm(&int(i64::MIN)).unwrap(), int(i64::MIN));
        assert_eq!(arith_unm(&float(2.5)).unwrap(), float(-2.5));
        assert!(arith_unm(&LuaValue::Nil).is_err());
    }

    #[test]
    fn comparison_rejects_mixed_kinds() {
        assert!(cmp_lt(&int(1), &int(2)).unwrap());
        assert!(cmp_lt(&int(1), &float(1.5)).unwrap());
        assert!(cmp_le(&float(2.0), &int(2)).unwrap());
        assert!(
            cmp_lt(
                &LuaValue::LuaString("abc".into()),
                &LuaValue::LuaString("abd".into())
            )
            .unwrap()
        );
        assert!(cmp_lt(&int(1), &LuaValue::LuaString("2".into())).is_err());
    }

    #[test]
    fn concat_pieces_render_like_print() {
        assert_eq!(concat_piece(&int(1)).unwrap(), "1");
        assert_eq!(concat_piece(&float(2.0)).unwrap(), "2.0");
        assert_eq!(concat_piece(&LuaValue::LuaString("x".into())).unwrap(), "x");
        assert!(concat_piece(&LuaValue::Boolean(true)).is_err());
    }

    #[test]
    fn length_covers_strings_and_tables() {
        assert_eq!(
            length_of(&LuaValue::LuaString("hello".into())).unwrap(),
            int(5)
        );
        let t = LuaValue::new_table();
        if let LuaValue::Table(inner) = &t {
            inner.write().unwrap().push(int(1));
            inner.write().unwrap().push(int(2));
        }
        assert_eq!(length_of(&t).unwrap(), int(2));
        assert!(length_of(&int(1)).is_err());
    }
}
