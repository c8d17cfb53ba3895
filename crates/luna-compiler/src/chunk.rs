use crate::compiler::Compiler;
use luna_core::{LuaError, Prototype};
use luna_parser::Parser;
use std::sync::Arc;

/// A compiled top-level chunk — thin wrapper around the root [`Prototype`].
///
/// This is the artifact produced by [`Compiler::compile`] and consumed by the
/// VM's loader.
///
/// [`Compiler::compile`]: crate::Compiler::compile
#[derive(Debug)]
pub struct Chunk {
    /// The root function prototype.
    pub proto: Arc<Prototype>,
}

impl Chunk {
    pub fn new(proto: Prototype) -> Self {
        Self {
            proto: Arc::new(proto),
        }
    }
}

/// Compile Lua source text into an executable [`Chunk`] in one step:
/// lex, parse, then generate code for the file body as a vararg main
/// function. `chunk_name` becomes the source name in error positions.
pub fn compile(src: &str, chunk_name: &str) -> Result<Chunk, LuaError> {
    let block = Parser::new(src)?.parse()?;
    Compiler::new(chunk_name).compile(&block)
}
