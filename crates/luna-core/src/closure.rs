//! Runtime closures and upvalue cells.

use crate::prototype::Prototype;
use crate::value::LuaValue;
use std::sync::{Arc, RwLock};

// ── Upvalue cells ─────────────────────────────────────────────────────────────

/// A shared, mutable upvalue cell.
///
/// While the captured local is still on the register stack (`Open`), the cell
/// holds its absolute register index. When the defining scope exits, the
/// runtime migrates the value into the cell (`Closed`) exactly once; every
/// closure holding the cell keeps reading and writing through it either way.
#[derive(Debug, Clone)]
pub struct Upvalue(pub Arc<RwLock<UpvalueInner>>);

impl Upvalue {
    /// Create an open upvalue aliasing absolute register `reg`.
    pub fn open(reg: usize) -> Self {
        Self(Arc::new(RwLock::new(UpvalueInner::Open(reg))))
    }

    /// Create a closed (heap-allocated) upvalue with the given initial value.
    pub fn closed(val: LuaValue) -> Self {
        Self(Arc::new(RwLock::new(UpvalueInner::Closed(val))))
    }
}

/// Interior state of an upvalue cell.
#[derive(Debug, Clone)]
pub enum UpvalueInner {
    /// The value is still alive in the register stack at this absolute index.
    Open(usize),
    /// The defining scope exited; the value was migrated here.
    Closed(LuaValue),
}

// ── Lua closure ───────────────────────────────────────────────────────────────

/// A runtime closure: a `Prototype` paired with its captured upvalue cells.
#[derive(Debug)]
pub struct LuaClosure {
    /// The compiled function body.
    pub proto: Arc<Prototype>,
    /// Upvalue cells, one per `proto.upvalues` entry.
    pub upvalues: Vec<Upvalue>,
}

impl LuaClosure {
    pub fn new(proto: Arc<Prototype>, upvalues: Vec<Upvalue>) -> Self {
        Self { proto, upvalues }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_are_shared_through_clones() {
        let cell = Upvalue::closed(LuaValue::Integer(1));
        let alias = cell.clone();
        *cell.0.write().unwrap() = UpvalueInner::Closed(LuaValue::Integer(2));
        let seen = alias.0.read().unwrap();
        match &*seen {
            UpvalueInner::Closed(LuaValue::Integer(2)) => {}
            other => panic!("write not visible through alias: {other:?}"),
        }
    }
}
