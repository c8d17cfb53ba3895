//! `luna-compiler` — compiles a Lua AST to bytecode chunks.
//!
//! The entry point is [`Compiler::compile`], which walks a parsed
//! [`Block`](luna_parser::ast::Block) and produces a [`Chunk`] holding the
//! main function prototype; [`compile`] goes straight from source text.
//! `encode`/`decode` serialize chunks to and from the binary format;
//! `disasm` renders a listing for inspection.

pub mod chunk;
pub mod compiler;
pub mod decode;
pub mod disasm;
pub mod encode;

mod expr;
mod funcinfo;
mod stat;

pub use chunk::{compile, Chunk};
pub use compiler::Compiler;
pub use decode::decode_chunk;
pub use disasm::disassemble;
pub use encode::{encode_chunk, MAGIC};
