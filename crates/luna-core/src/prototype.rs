//! Compiled function prototypes.

use crate::instruction::Instruction;
use crate::value::LuaValue;
use std::sync::Arc;

/// A compiled function — immutable after code generation.
///
/// Every Lua function (top-level chunk or nested definition) compiles to one
/// `Prototype`. Closures share a prototype via `Arc`; upvalue cells are
/// per-instance. Nested prototypes are owned by their parent and referenced
/// by index from CLOSURE instructions.
#[derive(Debug)]
pub struct Prototype {
    /// Debug: source name (file path, or a label like `=stdin`).
    pub source: String,
    /// First and last source line of the function definition (0 for a chunk).
    pub line_defined: u32,
    pub last_line_defined: u32,
    /// Number of fixed parameters.
    pub num_params: u8,
    /// Whether the function accepts varargs (`...`).
    pub is_vararg: bool,
    /// Registers the VM must reserve for a call frame.
    pub max_stack_size: u8,
    /// Bytecode.
    pub code: Vec<Instruction>,
    /// Constant pool (nils never appear; booleans, numbers, strings do).
    pub constants: Vec<LuaValue>,
    /// How to obtain each upvalue when a closure is instantiated.
    pub upvalues: Vec<UpvalueDesc>,
    /// Nested function prototypes referenced by CLOSURE instructions.
    pub protos: Vec<Arc<Prototype>>,
    /// Debug: source line per instruction, same length as `code` (or empty).
    pub line_info: Vec<u32>,
    /// Debug: named locals with their live pc ranges.
    pub loc_vars: Vec<LocVar>,
    /// Debug: one name per `upvalues` entry (or empty).
    pub upvalue_names: Vec<String>,
}

impl Prototype {
    /// Source line for the instruction at `pc`, 0 when debug info is absent.
    pub fn line_at(&self, pc: usize) -> u32 {
        self.line_info.get(pc).copied().unwrap_or(0)
    }
}

/// Describes where a closure finds one upvalue at instantiation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpvalueDesc {
    /// Capture the local at register `reg` of the **immediately enclosing** frame.
    Stack(u8),
    /// Re-use upvalue `idx` of the **enclosing** closure.
    Upvalue(u8),
}

/// Debug record: the pc range over which a register holds a named local.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocVar {
    pub name: String,
    pub start_pc: u32,
    pub end_pc: u32,
}
