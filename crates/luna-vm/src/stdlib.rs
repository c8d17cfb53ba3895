//! The baseline global functions every chunk can reach through `_ENV`.

use luna_core::{parse_number, LuaError, LuaTable, LuaValue};

pub fn register(globals: &mut LuaTable) {
    let set = |g: &mut LuaTable, name: &str, f| {
        g.set(
            LuaValue::LuaString(name.into()),
            LuaValue::NativeFunction(f),
        );
    };
    set(globals, "print", lua_print);
    set(globals, "type", lua_type);
    set(globals, "tostring", lua_tostring);
    set(globals, "tonumber", lua_tonumber);
    set(globals, "assert", lua_assert);
    set(globals, "error", lua_error);
    set(globals, "next", lua_next);
    set(globals, "pairs", lua_pairs);
    set(globals, "ipairs", lua_ipairs);
}

fn lua_print(args: Vec<LuaValue>) -> Result<Vec<LuaValue>, LuaError> {
    let parts: Vec<String> = args.iter().map(|v| v.to_string()).collect();
    println!("{}", parts.join("\t"));
    Ok(vec![])
}

fn lua_type(args: Vec<LuaValue>) -> Result<Vec<LuaValue>, LuaError> {
    let v = args.into_iter().next().unwrap_or(LuaValue::Nil);
    Ok(vec![LuaValue::LuaString(v.type_name().into())])
}

fn lua_tostring(args: Vec<LuaValue>) -> Result<Vec<LuaValue>, LuaError> {
    let v = args.into_iter().next().unwrap_or(LuaValue::Nil);
    Ok(vec![LuaValue::LuaString(v.to_string())])
}

fn lua_tonumber(args: Vec<LuaValue>) -> Result<Vec<LuaValue>, LuaError> {
    let mut it = args.into_iter();
    let v = it.next().unwrap_or(LuaValue::Nil);
    let base = it.next();

    let result = match base {
        None | Some(LuaValue::Nil) => match v {
            LuaValue::Integer(_) | LuaValue::Float(_) => v,
            LuaValue::LuaString(s) => parse_number(&s).unwrap_or(LuaValue::Nil),
            _ => LuaValue::Nil,
        },
        Some(b) => {
            let base = match b {
                LuaValue::Integer(n) if (2..=36).contains(&n) => n as u32,
                _ => {
                    return Err(LuaError::Runtime(
                        "bad argument #2 to 'tonumber' (base out of range)".into(),
                    ))
                }
            };
            let LuaValue::LuaString(s) = v else {
                return Err(LuaError::Runtime(format!(
                    "bad argument #1 to 'tonumber' (string expected, got {})",
                    v.type_name()
                )));
            };
            parse_in_base(s.trim(), base)
        }
    };
    Ok(vec![result])
}

/// Digits-only parse in an explicit base, with optional sign. Overflow wraps
/// like the rest of the integer arithmetic.
fn parse_in_base(s: &str, base: u32) -> LuaValue {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    if digits.is_empty() {
        return LuaValue::Nil;
    }
    let mut n: i64 = 0;
    for c in digits.chars() {
        match c.to_digit(base) {
            Some(d) => n = n.wrapping_mul(base as i64).wrapping_add(d as i64),
            None => return LuaValue::Nil,
        }
    }
    LuaValue::Integer(if negative { n.wrapping_neg() } else { n })
}

fn lua_assert(args: Vec<LuaValue>) -> Result<Vec<LuaValue>, LuaError> {
    match args.first() {
        Some(v) if v.is_truthy() => Ok(args),
        _ => {
            let msg = args
                .into_iter()
                .nth(1)
                .map(|m| m.to_string())
                .unwrap_or_else(|| "assertion failed!".into());
            Err(LuaError::Runtime(msg))
        }
    }
}

fn lua_error(args: Vec<LuaValue>) -> Result<Vec<LuaValue>, LuaError> {
    let msg = args.into_iter().next().unwrap_or(LuaValue::Nil).to_string();
    Err(LuaError::Runtime(msg))
}

fn lua_next(args: Vec<LuaValue>) -> Result<Vec<LuaValue>, LuaError> {
    let mut it = args.into_iter();
    let t = it.next().unwrap_or(LuaValue::Nil);
    let key = it.next().unwrap_or(LuaValue::Nil);
    let LuaValue::Table(t) = t else {
        return Err(LuaError::Runtime(format!(
            "bad argument #1 to 'next' (table expected, got {})",
            t.type_name()
        )));
    };
    let next = t.read().unwrap().next_key(&key)?;
    match next {
        Some((k, v)) => Ok(vec![k, v]),
        None => Ok(vec![LuaValue::Nil]),
    }
}

fn lua_pairs(args: Vec<LuaValue>) -> Result<Vec<LuaValue>, LuaError> {
    let t = args.into_iter().next().unwrap_or(LuaValue::Nil);
    if !matches!(t, LuaValue::Table(_)) {
        return Err(LuaError::Runtime(format!(
            "bad argument #1 to 'pairs' (table expected, got {})",
            t.type_name()
        )));
    }
    Ok(vec![LuaValue::NativeFunction(lua_next), t, LuaValue::Nil])
}

fn lua_ipairs(args: Vec<LuaValue>) -> Result<Vec<LuaValue>, LuaError> {
    let t = args.into_iter().next().unwrap_or(LuaValue::Nil);
    if !matches!(t, LuaValue::Table(_)) {
        return Err(LuaError::Runtime(format!(
            "bad argument #1 to 'ipairs' (table expected, got {})",
            t.type_name()
        )));
    }
    Ok(vec![
        LuaValue::NativeFunction(lua_ipairs_iter),
        t,
        LuaValue::Integer(0),
    ])
}

/// Stateless step for `ipairs`: `iter(t, i)` yields `i+1, t[i+1]` until the
/// first nil slot.
fn lua_ipairs_iter(args: Vec<LuaValue>) -> Result<Vec<LuaValue>, LuaError> {
    let mut it = args.into_iter();
    let t = it.next().unwrap_or(LuaValue::Nil);
    let i = match it.next() {
        Some(LuaValue::Integer(i)) => i,
        _ => 0,
    };
    let LuaValue::Table(t) = t else {
        return Ok(vec![LuaValue::Nil]);
    };
    let next = i.wrapping_add(1);
    let v = t.read().unwrap().get(&LuaValue::Integer(next));
    if matches!(v, LuaValue::Nil) {
        Ok(vec![LuaValue::Nil])
    } else {
        Ok(vec![LuaValue::Integer(next), v])
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
