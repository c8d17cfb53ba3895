use crate::closure::LuaClosure;
use crate::error::LuaError;
use crate::table::LuaTable;
use std::sync::{Arc, RwLock};

/// All Lua value types, mirroring the Lua 5.3 type system.
#[derive(Clone)]
pub enum LuaValue {
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    LuaString(String),
    /// A native Rust function callable from Lua.
    NativeFunction(fn(Vec<LuaValue>) -> Result<Vec<LuaValue>, LuaError>),
    /// A Lua closure (compiled function + captured upvalues).
    Closure(Arc<LuaClosure>),
    /// A Lua table (array + hash parts, reference-counted + interior mutability).
    Table(Arc<RwLock<LuaTable>>),
}

impl LuaValue {
    /// Returns the Lua type name string as per the reference manual.
    pub fn type_name(&self) -> &'static str {
        match self {
            LuaValue::Nil => "nil",
            LuaValue::Boolean(_) => "boolean",
            LuaValue::Integer(_) => "number",
            LuaValue::Float(_) => "number",
            LuaValue::LuaString(_) => "string",
            LuaValue::NativeFunction(_) => "function",
            LuaValue::Closure(_) => "function",
            LuaValue::Table(_) => "table",
        }
    }

    /// Returns `true` if the value is truthy in Lua's sense
    /// (everything except `nil` and `false` is truthy).
    pub fn is_truthy(&self) -> bool {
        !matches!(self, LuaValue::Nil | LuaValue::Boolean(false))
    }

    /// Create a new empty table value.
    pub fn new_table() -> Self {
        LuaValue::Table(Arc::new(RwLock::new(LuaTable::new())))
    }
}

// NativeFunction is a plain fn pointer which implements PartialEq via pointer equality.
impl PartialEq for LuaValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LuaValue::Nil, LuaValue::Nil) => true,
            (LuaValue::Boolean(a), LuaValue::Boolean(b)) => a == b,
            (LuaValue::Integer(a), LuaValue::Integer(b)) => a == b,
            (LuaValue::Float(a), LuaValue::Float(b)) => a == b,
            (LuaValue::Integer(a), LuaValue::Float(b)) => (*a as f64) == *b,
            (LuaValue::Float(a), LuaValue::Integer(b)) => *a == (*b as f64),
            (LuaValue::LuaString(a), LuaValue::LuaString(b)) => a == b,
            (LuaValue::NativeFunction(a), LuaValue::NativeFunction(b)) => {
                (*a as usize) == (*b as usize)
            }
            // Two closures are equal only if they are the exact same object
            (LuaValue::Closure(a), LuaValue::Closure(b)) => Arc::ptr_eq(a, b),
            // Two tables are equal only if they are the exact same object
            (LuaValue::Table(a), LuaValue::Table(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for LuaValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LuaValue::Nil => write!(f, "LuaValue::Nil"),
            LuaValue::Boolean(b) => write!(f, "LuaValue::Boolean({b})"),
            LuaValue::Integer(n) => write!(f, "LuaValue::Integer({n})"),
            LuaValue::Float(n) => write!(f, "LuaValue::Float({n})"),
            LuaValue::LuaString(s) => write!(f, "LuaValue::LuaString({s:?})"),
            LuaValue::NativeFunction(_) => write!(f, "LuaValue::NativeFunction(<fn>)"),
            LuaValue::Closure(c) => write!(f, "LuaValue::Closure({:p})", Arc::as_ptr(c)),
            LuaValue::Table(t) => write!(f, "LuaValue::Table({:p})", Arc::as_ptr(t)),
        }
    }
}

impl std::fmt::Display for LuaValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LuaValue::Nil => write!(f, "nil"),
            LuaValue::Boolean(b) => write!(f, "{b}"),
            LuaValue::Integer(n) => write!(f, "{n}"),
            LuaValue::Float(n) => {
                // Lua displays 1.0 as "1.0", not "1"
                if n.is_nan() {
                    write!(f, "nan")
                } else if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{n:.1}")
                } else {
                    write!(f, "{n}")
                }
            }
            LuaValue::LuaString(s) => write!(f, "{s}"),
            LuaValue::NativeFunction(_) => write!(f, "function: builtin"),
            LuaValue::Closure(c) => write!(f, "function: {:p}", Arc::as_ptr(c)),
            LuaValue::Table(t) => write!(f, "table: {:p}", Arc::as_ptr(t)),
        }
    }
}

// ── String → number coercion ──

/// Parse a string by Lua's numeric grammar: optional surrounding whitespace,
/// optional sign, then a decimal or `0x` hex literal. Decimal integers that
/// overflow degrade to floats; hex integers wrap. Returns `None` when the
/// string is not a number at all (coercion failures become errors upstream).
pub fn parse_number(s: &str) -> Option<LuaValue> {
    let s = s.trim_matches(|c: char| c.is_ascii_whitespace());
    if s.is_empty() {
        return None;
    }
    let (negate, digits) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    if digits.is_empty() {
        return None;
    }
    if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        return parse_hex_number(hex, negate);
    }
    if digits.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(u) = digits.parse::<u64>() {
            if negate && u == 1 << 63 {
                return Some(LuaValue::Integer(i64::MIN));
            }
            if u <= i64::MAX as u64 {
                let i = u as i64;
                return Some(LuaValue::Integer(if negate { -i } else { i }));
            }
        }
        // too large for an integer, fall through to float
    }
    if !is_decimal_float(digits) {
        return None;
    }
    let f: f64 = digits.parse().ok()?;
    Some(LuaValue::Float(if negate { -f } else { f }))
}

// Rust's float parser accepts "inf"/"nan", Lua's grammar does not, so the
// shape gets checked by hand first.
fn is_decimal_float(s: &str) -> bool {
    let b = s.as_bytes();
    let mut i = 0;
    let mut mantissa_digits = 0;
    while i < b.len() && b[i].is_ascii_digit() {
        i += 1;
        mantissa_digits += 1;
    }
    if i < b.len() && b[i] == b'.' {
        i += 1;
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
            mantissa_digits += 1;
        }
    }
    if mantissa_digits == 0 {
        return false;
    }
    if i < b.len() && (b[i] == b'e' || b[i] == b'E') {
        i += 1;
        if i < b.len() && (b[i] == b'+' || b[i] == b'-') {
            i += 1;
        }
        let mut exp_digits = 0;
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
            exp_digits += 1;
        }
        if exp_digits == 0 {
            return false;
        }
    }
    i == b.len()
}

fn parse_hex_number(hex: &str, negate: bool) -> Option<LuaValue> {
    let b = hex.as_bytes();
    if b.is_empty() {
        return None;
    }
    if b.iter().all(|c| c.is_ascii_hexdigit()) {
        let mut u: u64 = 0;
        for c in b {
            u = u.wrapping_mul(16).wrapping_add((*c as char).to_digit(16)? as u64);
        }
        let i = u as i64;
        return Some(LuaValue::Integer(if negate { i.wrapping_neg() } else { i }));
    }
    // hex float: hex mantissa with optional '.', optional binary exponent pN
    let mut i = 0;
    let mut mantissa = 0.0f64;
    let mut any_digit = false;
    while i < b.len() && b[i].is_ascii_hexdigit() {
        mantissa = mantissa * 16.0 + (b[i] as char).to_digit(16)? as f64;
        i += 1;
        any_digit = true;
    }
    if i < b.len() && b[i] == b'.' {
        i += 1;
        let mut scale = 1.0 / 16.0;
        while i < b.len() && b[i].is_ascii_hexdigit() {
            mantissa += (b[i] as char).to_digit(16)? as f64 * scale;
            scale /= 16.0;
            i += 1;
            any_digit = true;
        }
    }
    if !any_digit {
        return None;
    }
    let mut exp: i32 = 0;
    if i < b.len() && (b[i] == b'p' || b[i] == b'P') {
        i += 1;
        let mut exp_negate = false;
        if i < b.len() && (b[i] == b'+' || b[i] == b'-') {
            exp_negate = b[i] == b'-';
            i += 1;
        }
        let mut exp_digits = 0;
        while i < b.len() && b[i].is_ascii_digit() {
            exp = exp.saturating_mul(10).saturating_add((b[i] - b'0') as i32);
            i += 1;
            exp_digits += 1;
        }
        if exp_digits == 0 {
            return None;
        }
        if exp_negate {
            exp = -exp;
        }
    }
    if i != b.len() {
        return None;
    }
    let f = mantissa * (exp as f64).exp2();
    Some(LuaValue::Float(if negate { -f } else { f }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_is_falsy() {
        assert!(!LuaValue::Nil.is_truthy());
    }

    #[test]
    fn false_is_falsy() {
        assert!(!LuaValue::Boolean(false).is_truthy());
    }

    #[test]
    fn zero_integer_is_truthy() {
        // In Lua, 0 is truthy!
        assert!(LuaValue::Integer(0).is_truthy());
    }

    #[test]
    fn type_names() {
        assert_eq!(LuaValue::Nil.type_name(), "nil");
        assert_eq!(LuaValue::Boolean(true).type_name(), "boolean");
        assert_eq!(LuaValue::Integer(1).type_name(), "number");
        assert_eq!(LuaValue::Float(1.0).type_name(), "number");
        assert_eq!(LuaValue::LuaString("hi".into()).type_name(), "string");
        assert_eq!(LuaValue::new_table().type_name(), "table");
    }

    #[test]
    fn integer_float_cross_equality() {
        assert_eq!(LuaValue::Integer(1), LuaValue::Float(1.0));
        assert_ne!(LuaValue::Integer(1), LuaValue::Float(1.5));
        assert_ne!(LuaValue::Integer(1), LuaValue::LuaString("1".into()));
    }

    #[test]
    fn table_reference_equality() {
        let t1 = LuaValue::new_table();
        let t2 = LuaValue::new_table();
        assert_eq!(t1, t1.clone()); // same Arc → equal
        assert_ne!(t1, t2);         // different Arcs → not equal
    }

    #[test]
    fn float_display() {
        assert_eq!(LuaValue::Float(2.0).to_string(), "2.0");
        assert_eq!(LuaValue::Float(2.5).to_string(), "2.5");
        assert_eq!(LuaValue::Float(f64::NAN).to_string(), "nan");
        assert_eq!(LuaValue::Float(f64::INFINITY).to_string(), "inf");
    }

    #[test]
    fn parse_decimal() {
        assert_eq!(parse_number("42"), Some(LuaValue::Integer(42)));
        assert_eq!(parse_number("  -7  "), Some(LuaValue::Integer(-7)));
        assert_eq!(parse_number("3.5"), Some(LuaValue::Float(3.5)));
        assert_eq!(parse_number(".5"), Some(LuaValue::Float(0.5)));
        assert_eq!(parse_number("1e2"), Some(LuaValue::Float(100.0)));
    }

    #[test]
    fn parse_hex() {
        assert_eq!(parse_number("0xff"), Some(LuaValue::Integer(255)));
        assert_eq!(parse_number("-0x10"), Some(LuaValue::Integer(-16)));
        assert_eq!(parse_number("0x1.8"), Some(LuaValue::Float(1.5)));
        assert_eq!(parse_number("0x4p-1"), Some(LuaValue::Float(2.0)));
    }

    #[test]
    fn parse_overflow_degrades_to_float() {
        match parse_number("99999999999999999999") {
            Some(LuaValue::Float(f)) => assert!(f > 9.9e19),
            other => panic!("expected float, got {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_non_numbers() {
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("x"), None);
        assert_eq!(parse_number("1x"), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("nan"), None);
        assert_eq!(parse_number("1e"), None);
        assert_eq!(parse_number("0x"), None);
        assert_eq!(parse_number("- 1"), None);
    }
}
