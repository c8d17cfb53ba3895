use crate::error::LuaError;
use crate::value::LuaValue;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// A Lua table: an associative array keyed by any non-nil, non-NaN value.
///
/// Stores integer keys 1..n in a compact `array` part for fast sequential
/// access; everything else goes into the `hash` part. Erasing a hash entry
/// leaves a nil placeholder in its spot so an in-flight `next` traversal can
/// still find its position; fresh inserts sweep the placeholders out once
/// they dominate the map.
#[derive(Debug, Clone, Default)]
pub struct LuaTable {
    pub array: Vec<LuaValue>, // 1-indexed: array[i-1] = t[i]
    pub hash: FxHashMap<HashKey, LuaValue>,
    dead: usize, // nil-valued placeholders currently in `hash`
}

/// Keys that can be stored in the hash part of a table.
///
/// Floats with an exact integer value collapse into `Int`; other floats key
/// by bit pattern. Tables and functions key by identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Int(i64),
    Float(u64),
    Str(String),
    Bool(bool),
    Ref(RefKey),
}

/// An identity key: compared and hashed by allocation address alone. Holds
/// the value itself so the address stays pinned and `next` can hand the
/// original key back.
#[derive(Debug, Clone)]
pub struct RefKey {
    addr: usize,
    value: LuaValue,
}

impl PartialEq for RefKey {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl Eq for RefKey {}

impl std::hash::Hash for RefKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

impl HashKey {
    /// The hash key for `v`, or `None` for the two unkeyable values
    /// (nil and NaN).
    pub fn from_value(v: &LuaValue) -> Option<HashKey> {
        if let Some(i) = int_key(v) {
            return Some(HashKey::Int(i));
        }
        match v {
            LuaValue::Float(f) if !f.is_nan() => {
                // fold -0.0 into 0.0 so both spellings land on one entry
                let f = if *f == 0.0 { 0.0 } else { *f };
                Some(HashKey::Float(f.to_bits()))
            }
            LuaValue::LuaString(s) => Some(HashKey::Str(s.clone())),
            LuaValue::Boolean(b) => Some(HashKey::Bool(*b)),
            LuaValue::Table(t) => Some(HashKey::Ref(RefKey {
                addr: Arc::as_ptr(t) as usize,
                value: v.clone(),
            })),
            LuaValue::Closure(c) => Some(HashKey::Ref(RefKey {
                addr: Arc::as_ptr(c) as usize,
                value: v.clone(),
            })),
            LuaValue::NativeFunction(f) => Some(HashKey::Ref(RefKey {
                addr: *f as usize,
                value: v.clone(),
            })),
            _ => None,
        }
    }

    pub fn to_value(&self) -> LuaValue {
        match self {
            HashKey::Int(n) => LuaValue::Integer(*n),
            HashKey::Float(bits) => LuaValue::Float(f64::from_bits(*bits)),
            HashKey::Str(s) => LuaValue::LuaString(s.clone()),
            HashKey::Bool(b) => LuaValue::Boolean(*b),
            HashKey::Ref(r) => r.value.clone(),
        }
    }
}

/// Integer view of a key: integers as-is, floats only when integral and in range.
fn int_key(key: &LuaValue) -> Option<i64> {
    match key {
        LuaValue::Integer(i) => Some(*i),
        LuaValue::Float(f) => {
            let f = *f;
            let i = f as i64;
            if f >= -9223372036854775808.0 && f < 9223372036854775808.0 && i as f64 == f {
                Some(i)
            } else {
                None
            }
        }
        _ => None,
    }
}

impl LuaTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `t[key]`. Returns `LuaValue::Nil` for missing keys.
    pub fn get(&self, key: &LuaValue) -> LuaValue {
        // Integer keys 1..array.len() go to the array part
        if let Some(i) = int_key(key) {
            if i >= 1 && i as usize <= self.array.len() {
                return self.array[(i - 1) as usize].clone();
            }
        }
        HashKey::from_value(key)
            .and_then(|hk| self.hash.get(&hk))
            .cloned()
            .unwrap_or(LuaValue::Nil)
    }

    /// Write `t[key] = val`. Assigning nil erases the entry: array slots
    /// blank in place and hash entries become dead placeholders, so the
    /// traversal position of an in-flight `next` survives the erase.
    pub fn set(&mut self, key: LuaValue, val: LuaValue) {
        if let Some(i) = int_key(&key) {
            if i >= 1 {
                let idx = (i - 1) as usize;
                if idx < self.array.len() {
                    self.array[idx] = val;
                    return;
                } else if idx == self.array.len() {
                    if matches!(val, LuaValue::Nil) {
                        return;
                    }
                    self.array.push(val);
                    // Drain consecutive integer keys from hash into array
                    self.rehash_sequence();
                    return;
                }
            }
            self.set_hash(HashKey::Int(i), val);
            return;
        }
        if let Some(hk) = HashKey::from_value(&key) {
            self.set_hash(hk, val);
        }
    }

    fn set_hash(&mut self, key: HashKey, val: LuaValue) {
        if matches!(val, LuaValue::Nil) {
            if let Some(slot) = self.hash.get_mut(&key) {
                if !matches!(slot, LuaValue::Nil) {
                    *slot = LuaValue::Nil;
                    self.dead += 1;
                }
            }
            return;
        }
        if let Some(slot) = self.hash.get_mut(&key) {
            if matches!(slot, LuaValue::Nil) {
                self.dead -= 1;
            }
            *slot = val;
            return;
        }
        // Fresh key: sweep the dead placeholders once they dominate.
        if self.dead * 2 > self.hash.len() {
            self.hash.retain(|_, v| !matches!(v, LuaValue::Nil));
            self.dead = 0;
        }
        self.hash.insert(key, val);
    }

    // Drain hash entries that now extend the array sequence. A dead
    // placeholder ends the drain and keeps its spot.
    fn rehash_sequence(&mut self) {
        loop {
            let next = HashKey::Int(self.array.len() as i64 + 1);
            let live = matches!(self.hash.get(&next), Some(v) if !matches!(v, LuaValue::Nil));
            if !live {
                break;
            }
            if let Some(v) = self.hash.remove(&next) {
                self.array.push(v);
            }
        }
    }

    /// Lua-style length: the border of the array sequence (largest n where t[n] ~= nil).
    pub fn length(&self) -> i64 {
        let mut n = self.array.len();
        while n > 0 && matches!(self.array[n - 1], LuaValue::Nil) {
            n -= 1;
        }
        n as i64
    }

    /// Append `val` right past the border (equivalent to `t[#t+1] = val`).
    pub fn push(&mut self, val: LuaValue) {
        let next = self.length() + 1;
        self.set(LuaValue::Integer(next), val);
    }

    /// Traversal step for `next`: the pair following `key`, or the first pair
    /// for a nil key, or `None` once the table is exhausted. Array entries come
    /// first in index order, then the hash part in map order. Erased entries
    /// are stepped over, so clearing the current key mid-walk is fine.
    pub fn next_key(&self, key: &LuaValue) -> Result<Option<(LuaValue, LuaValue)>, LuaError> {
        let array_pos = match key {
            LuaValue::Nil => Some(0),
            _ => match int_key(key) {
                Some(i) if i >= 1 && i as usize <= self.array.len() => Some(i as usize),
                _ => None,
            },
        };
        if let Some(start) = array_pos {
            for (idx, v) in self.array.iter().enumerate().skip(start) {
                if !matches!(v, LuaValue::Nil) {
                    return Ok(Some((LuaValue::Integer(idx as i64 + 1), v.clone())));
                }
            }
            return Ok(first_live(self.hash.iter()));
        }
        let hk = HashKey::from_value(key)
            .ok_or_else(|| LuaError::Runtime("invalid key to 'next'".into()))?;
        let mut entries = self.hash.iter();
        for (k, _) in entries.by_ref() {
            if *k == hk {
                return Ok(first_live(entries));
            }
        }
        Err(LuaError::Runtime("invalid key to 'next'".into()))
    }
}

fn first_live<'a>(
    mut entries: impl Iterator<Item = (&'a HashKey, &'a LuaValue)>,
) -> Option<(LuaValue, LuaValue)> {
    entries
        .find(|(_, v)| !matches!(v, LuaValue::Nil))
        .map(|(k, v)| (k.to_value(), v.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> LuaValue {
        LuaValue::Integer(i)
    }

    fn s(v: &str) -> LuaValue {
        LuaValue::LuaString(v.into())
    }

    #[test]
    fn array_part_round_trip() {
        let mut t = LuaTable::new();
        t.set(int(1), s("a"));
        t.set(int(2), s("b"));
        assert_eq!(t.get(&int(1)), s("a"));
        assert_eq!(t.get(&int(2)), s("b"));
        assert_eq!(t.get(&int(3)), LuaValue::Nil);
        assert_eq!(t.length(), 2);
    }

    #[test]
    fn float_keys_normalize_to_integers() {
        let mut t = LuaTable::new();
        t.set(LuaValue::Float(1.0), s("one"));
        assert_eq!(t.get(&int(1)), s("one"));
        assert_eq!(t.get(&LuaValue::Float(1.0)), s("one"));
    }

    #[test]
    fn non_integral_float_keys_round_trip() {
        let mut t = LuaTable::new();
        t.set(LuaValue::Float(1.5), s("x"));
        assert_eq!(t.get(&LuaValue::Float(1.5)), s("x"));
        assert_eq!(t.get(&int(1)), LuaValue::Nil);
        assert_eq!(t.get(&int(2)), LuaValue::Nil);
        t.set(LuaValue::Float(1.5), LuaValue::Nil);
        assert_eq!(t.get(&LuaValue::Float(1.5)), LuaValue::Nil);
    }

    #[test]
    fn tables_key_by_identity() {
        let mut t = LuaTable::new();
        let k1 = LuaValue::new_table();
        let k2 = LuaValue::new_table();
        t.set(k1.clone(), int(1));
        t.set(k2.clone(), int(2));
        assert_eq!(t.get(&k1), int(1));
        assert_eq!(t.get(&k2), int(2));
        assert_eq!(t.get(&LuaValue::new_table()), LuaValue::Nil);
    }

    #[test]
    fn nil_assignment_removes() {
        let mut t = LuaTable::new();
        t.set(s("k"), int(5));
        t.set(s("k"), LuaValue::Nil);
        assert_eq!(t.get(&s("k")), LuaValue::Nil);
        assert_eq!(t.next_key(&LuaValue::Nil).unwrap(), None);
    }

    #[test]
    fn nil_tail_shrinks_border() {
        let mut t = LuaTable::new();
        t.set(int(1), s("a"));
        t.set(int(2), s("b"));
        t.set(int(2), LuaValue::Nil);
        assert_eq!(t.length(), 1);
    }

    #[test]
    fn sparse_keys_rehash_when_gap_fills() {
        let mut t = LuaTable::new();
        t.set(int(2), s("b"));
        t.set(int(3), s("c"));
        assert_eq!(t.length(), 0);
        t.set(int(1), s("a"));
        // 2 and 3 migrate out of the hash part
        assert_eq!(t.length(), 3);
        assert_eq!(t.get(&int(3)), s("c"));
        assert!(t.hash.is_empty());
    }

    #[test]
    fn next_visits_every_pair_once() {
        let mut t = LuaTable::new();
        t.set(int(1), s("a"));
        t.set(int(2), s("b"));
        t.set(s("x"), int(10));
        t.set(s("y"), int(20));

        let mut seen = Vec::new();
        let mut key = LuaValue::Nil;
        while let Some((k, _)) = t.next_key(&key).unwrap() {
            seen.push(k.clone());
            key = k;
        }
        assert_eq!(seen.len(), 4);
        assert!(seen.contains(&int(1)));
        assert!(seen.contains(&int(2)));
        assert!(seen.contains(&s("x")));
        assert!(seen.contains(&s("y")));
    }

    #[test]
    fn next_survives_erasing_the_current_key() {
        let mut t = LuaTable::new();
        t.set(int(1), s("a"));
        t.set(int(2), s("b"));
        t.set(s("x"), int(10));
        t.set(s("y"), int(20));

        let mut seen = 0;
        let mut key = LuaValue::Nil;
        while let Some((k, _)) = t.next_key(&key).unwrap() {
            seen += 1;
            t.set(k.clone(), LuaValue::Nil);
            key = k;
        }
        assert_eq!(seen, 4);
        assert_eq!(t.length(), 0);
        assert_eq!(t.next_key(&LuaValue::Nil).unwrap(), None);
    }

    #[test]
    fn dead_entries_are_swept_by_fresh_inserts() {
        let mut t = LuaTable::new();
        for i in 0..16 {
            t.set(s(&format!("k{i}")), int(i));
        }
        for i in 0..16 {
            t.set(s(&format!("k{i}")), LuaValue::Nil);
        }
        t.set(s("fresh"), int(99));
        assert_eq!(t.get(&s("fresh")), int(99));
        assert!(t.hash.len() < 16);
    }

    #[test]
    fn next_on_missing_key_is_an_error() {
        let mut t = LuaTable::new();
        t.set(s("x"), int(1));
        assert!(t.next_key(&s("zzz")).is_err());
        assert!(t.next_key(&LuaValue::new_table()).is_err());
    }

    #[test]
    fn next_on_empty_table() {
        let t = LuaTable::new();
        assert_eq!(t.next_key(&LuaValue::Nil).unwrap(), None);
    }
}
