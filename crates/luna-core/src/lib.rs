//! `luna-core` — foundational types shared across the entire luna workspace.
//!
//! This crate defines:
//! - [`LuaValue`]: the dynamically-typed Lua value enum
//! - [`LuaTable`]: the array + hash table representation
//! - [`LuaError`]: the unified error type
//! - [`Instruction`] / [`OpCode`]: the 32-bit encoded instruction set
//! - [`Prototype`] and the runtime closure/upvalue types

pub mod closure;
pub mod error;
pub mod instruction;
pub mod opcode;
pub mod prototype;
pub mod table;
pub mod value;

pub use closure::{LuaClosure, Upvalue, UpvalueInner};
pub use error::LuaError;
pub use instruction::{
    fb2int, int2fb, is_rk_const, rk_const, rk_index, Instruction, BITRK, MAXARG_A, MAXARG_AX,
    MAXARG_B, MAXARG_BX, MAXARG_C, MAXARG_SBX, MAXINDEXRK,
};
pub use opcode::{OpArg, OpCode, OpMode};
pub use prototype::{LocVar, Prototype, UpvalueDesc};
pub use table::{HashKey, LuaTable, RefKey};
pub use value::{parse_number, LuaValue};
