use thiserror::Error;

/// All errors that can surface from compiling or running luna code.
#[derive(Debug, Error, PartialEq)]
pub enum LuaError {
    /// Lexical, syntax or code-generation error. Fatal to the chunk.
    #[error("compile error at line {line}: {message}")]
    Compile { line: u32, message: String },

    /// Malformed binary chunk. Nothing from a bad chunk reaches the VM.
    #[error("load error: {0}")]
    Load(String),

    /// Runtime failure: type errors, failed coercions, `error()` calls.
    /// The message carries a `source:line:` prefix where debug info allows.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Implementation bug (allocator discipline, bad dispatch state).
    /// Should never surface from well-formed input.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LuaError {
    /// Shorthand for compile errors, which get built all over the front end.
    pub fn compile(line: u32, message: impl Into<String>) -> LuaError {
        LuaError::Compile {
            line,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_line() {
        let err = LuaError::compile(7, "unexpected symbol");
        assert_eq!(err.to_string(), "compile error at line 7: unexpected symbol");
    }

    #[test]
    fn runtime_display() {
        let err = LuaError::Runtime("attempt to call a nil value".into());
        assert_eq!(
            err.to_string(),
            "runtime error: attempt to call a nil value"
        );
    }
}
