//! Binary decoder: `&[u8]` → `Chunk`.
//!
//! Mirrors the encoding in `encode.rs` exactly. All failures come back as
//! [`LuaError::Load`]; foreign or corrupt bytecode never reaches the VM.

use std::sync::Arc;

use luna_core::{Instruction, LocVar, LuaError, LuaValue, Prototype, UpvalueDesc};

use crate::chunk::Chunk;
use crate::encode::MAGIC;

fn load_err(msg: impl Into<String>) -> LuaError {
    LuaError::Load(msg.into())
}

// ── Cursor reader ────────────────────────────────────────────────────────────

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], LuaError> {
        if self.remaining() < n {
            return Err(load_err(format!(
                "unexpected end of data: need {n} bytes at offset {}",
                self.pos
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, LuaError> {
        let b = self.read_bytes(1)?;
        Ok(b[0])
    }

    fn read_u32_le(&mut self) -> Result<u32, LuaError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_i64_le(&mut self) -> Result<i64, LuaError> {
        let b = self.read_bytes(8)?;
        Ok(i64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn read_f64_le(&mut self) -> Result<f64, LuaError> {
        let b = self.read_bytes(8)?;
        Ok(f64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn read_str(&mut self) -> Result<String, LuaError> {
        let len = self.read_u32_le()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| load_err(format!("invalid UTF-8: {e}")))
    }
}

// ── Prototype decoder ────────────────────────────────────────────────────────

fn decode_proto(r: &mut Reader<'_>) -> Result<Prototype, LuaError> {
    let source = r.read_str()?;
    let line_defined = r.read_u32_le()?;
    let last_line_defined = r.read_u32_le()?;
    let num_params = r.read_u8()?;
    let is_vararg = r.read_u8()? != 0;
    let max_stack_size = r.read_u8()?;

    let const_count = r.read_u32_le()? as usize;
    let mut constants = Vec::with_capacity(const_count.min(1 << 16));
    for _ in 0..const_count {
        constants.push(decode_constant(r)?);
    }

    let upval_count = r.read_u32_le()? as usize;
    let mut upvalues = Vec::with_capacity(upval_count.min(1 << 16));
    for _ in 0..upval_count {
        let tag = r.read_u8()?;
        let val = r.read_u8()?;
        let desc = match tag {
            0 => UpvalueDesc::Stack(val),
            1 => UpvalueDesc::Upvalue(val),
            t => return Err(load_err(format!("unknown upvalue tag: {t}"))),
        };
        upvalues.push(desc);
    }

    let proto_count = r.read_u32_le()? as usize;
    let mut protos = Vec::with_capacity(proto_count.min(1 << 16));
    for _ in 0..proto_count {
        protos.push(Arc::new(decode_proto(r)?));
    }

    let code_count = r.read_u32_le()? as usize;
    let mut code = Vec::with_capacity(code_count.min(1 << 16));
    for _ in 0..code_count {
        let inst = Instruction(r.read_u32_le()?);
        if inst.opcode().is_none() {
            return Err(load_err(format!(
                "bad instruction {:#010x} at pc {}",
                inst.0,
                code.len()
            )));
        }
        code.push(inst);
    }

    // debug sections: may be empty, never absent
    let line_count = r.read_u32_le()? as usize;
    let mut line_info = Vec::with_capacity(line_count.min(1 << 16));
    for _ in 0..line_count {
        line_info.push(r.read_u32_le()?);
    }

    let loc_count = r.read_u32_le()? as usize;
    let mut loc_vars = Vec::with_capacity(loc_count.min(1 << 16));
    for _ in 0..loc_count {
        let name = r.read_str()?;
        let start_pc = r.read_u32_le()?;
        let end_pc = r.read_u32_le()?;
        loc_vars.push(LocVar {
            name,
            start_pc,
            end_pc,
        });
    }

    let upname_count = r.read_u32_le()? as usize;
    let mut upvalue_names = Vec::with_capacity(upname_count.min(1 << 16));
    for _ in 0..upname_count {
        upvalue_names.push(r.read_str()?);
    }

    Ok(Prototype {
        source,
        line_defined,
        last_line_defined,
        num_params,
        is_vararg,
        max_stack_size,
        code,
        constants,
        upvalues,
        protos,
        line_info,
        loc_vars,
        upvalue_names,
    })
}

fn decode_constant(r: &mut Reader<'_>) -> Result<LuaValue, LuaError> {
    let tag = r.read_u8()?;
    match tag {
        0 => Ok(LuaValue::Nil),
        1 => Ok(LuaValue::Boolean(r.read_u8()? != 0)),
        2 => Ok(LuaValue::Integer(r.read_i64_le()?)),
        3 => Ok(LuaValue::Float(r.read_f64_le()?)),
        4 => Ok(LuaValue::LuaString(r.read_str()?)),
        t => Err(load_err(format!("unknown constant tag: {t}"))),
    }
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Decode a byte slice (previously produced by `encode_chunk`) back into a
/// `Chunk`.
pub fn decode_chunk(bytes: &[u8]) -> Result<Chunk, LuaError> {
    if !bytes.starts_with(MAGIC) {
        return Err(load_err("not a luna chunk (bad magic)"));
    }
    let mut r = Reader::new(&bytes[MAGIC.len()..]);
    let proto = decode_proto(&mut r)?;
    Ok(Chunk::new(proto))
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::encode::encode_chunk;
    use luna_parser::Parser;

    fn compile(src: &str) -> Chunk {
        let block = Parser::new(src).unwrap().parse().unwrap();
        Compiler::new("@test").compile(&block).unwrap()
    }

    const SAMPLE: &str = "\
local pi = 3.14
local n = 42
local s = 'hello'
local function scale(x)
  return x * pi
end
return scale(n), s
";

    #[test]
    fn round_trip_is_byte_identical() {
        let chunk = compile(SAMPLE);
        let bytes = encode_chunk(&chunk);
        let decoded = decode_chunk(&bytes).unwrap();
        assert_eq!(encode_chunk(&decoded), bytes);
    }

    #[test]
    fn round_trip_preserves_proto_fields() {
        let chunk = compile(SAMPLE);
        let decoded = decode_chunk(&encode_chunk(&chunk)).unwrap();
        let (a, b) = (&chunk.proto, &decoded.proto);

        assert_eq!(a.source, b.source);
        assert_eq!(a.num_params, b.num_params);
        assert_eq!(a.is_vararg, b.is_vararg);
        assert_eq!(a.max_stack_size, b.max_stack_size);
        assert_eq!(a.code, b.code);
        assert_eq!(a.line_info, b.line_info);
        assert_eq!(a.loc_vars, b.loc_vars);
        assert_eq!(a.upvalue_names, b.upvalue_names);
        assert_eq!(a.protos.len(), b.protos.len());

        // nested proto captured `pi`: descriptor and debug name survive
        let nested = &b.protos[0];
        assert_eq!(nested.num_params, 1);
        assert!(nested.upvalues.contains(&UpvalueDesc::Stack(0)));
        assert!(nested.upvalue_names.contains(&"pi".to_owned()));
    }

    #[test]
    fn hello_world_survives_a_round_trip() {
        let chunk = compile("print(\"Hello, World!\")");
        let decoded = decode_chunk(&encode_chunk(&chunk)).unwrap();
        let p = &decoded.proto;
        assert_eq!(p.constants.len(), 2);
        assert_eq!(p.upvalues.len(), 1);
        assert_eq!(p.upvalue_names, vec!["_ENV"]);
        assert!(p.is_vararg);
        assert_eq!(p.code.len(), 4);
        assert_eq!(p.line_info.len(), p.code.len());
    }

    #[test]
    fn float_and_integer_constants_survive_exactly() {
        let chunk = compile("return 1, 1.0, -0.5, 9007199254740993");
        let decoded = decode_chunk(&encode_chunk(&chunk)).unwrap();
        assert_eq!(chunk.proto.constants.len(), decoded.proto.constants.len());
        for (a, b) in chunk
            .proto
            .constants
            .iter()
            .zip(decoded.proto.constants.iter())
        {
            match (a, b) {
                (LuaValue::Integer(x), LuaValue::Integer(y)) => assert_eq!(x, y),
                (LuaValue::Float(x), LuaValue::Float(y)) => {
                    assert_eq!(x.to_bits(), y.to_bits());
                }
                other => panic!("constant kind changed: {other:?}"),
            }
        }
    }

    #[test]
    fn bad_magic_is_a_load_error() {
        let err = decode_chunk(b"\x1bLua\x53whatever").unwrap_err();
        assert!(matches!(err, LuaError::Load(_)));
    }

    #[test]
    fn truncated_data_is_a_load_error() {
        let bytes = encode_chunk(&compile(SAMPLE));
        for cut in [MAGIC.len(), bytes.len() / 2, bytes.len() - 1] {
            let err = decode_chunk(&bytes[..cut]).unwrap_err();
            assert!(matches!(err, LuaError::Load(_)), "cut at {cut}");
        }
    }

    #[test]
    fn garbage_instruction_word_is_rejected() {
        let proto = Prototype {
            source: "@bad".into(),
            line_defined: 0,
            last_line_defined: 0,
            num_params: 0,
            is_vararg: true,
            max_stack_size: 2,
            code: vec![Instruction(0xffff_ffff)],
            constants: vec![],
            upvalues: vec![],
            protos: vec![],
            line_info: vec![1],
            loc_vars: vec![],
            upvalue_names: vec![],
        };
        let err = decode_chunk(&encode_chunk(&Chunk::new(proto))).unwrap_err();
        assert!(matches!(err, LuaError::Load(_)));
    }
}
