//! Binary encoder: `Chunk` → `Vec<u8>`.
//!
//! Format: MAGIC (6 bytes) followed by a recursive prototype encoding.
//! Everything is little-endian; strings carry a u32 length prefix plus UTF-8
//! bytes; instructions are stored as their raw 32-bit words. The debug
//! sections (line info, local names, upvalue names) are always written, even
//! when empty.

use luna_core::{LuaValue, Prototype, UpvalueDesc};

use crate::chunk::Chunk;

/// Magic bytes that identify a compiled luna bytecode file.
pub const MAGIC: &[u8] = b"\x1bLuna\x01";

// ── Low-level write helpers ──────────────────────────────────────────────────

fn push_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

fn push_u32_le(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn push_i64_le(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn push_f64_le(buf: &mut Vec<u8>, v: f64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn push_str(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    push_u32_le(buf, bytes.len() as u32);
    buf.extend_from_slice(bytes);
}

// ── Prototype encoder ────────────────────────────────────────────────────────

fn encode_proto(proto: &Prototype, buf: &mut Vec<u8>) {
    push_str(buf, &proto.source);
    push_u32_le(buf, proto.line_defined);
    push_u32_le(buf, proto.last_line_defined);
    push_u8(buf, proto.num_params);
    push_u8(buf, proto.is_vararg as u8);
    push_u8(buf, proto.max_stack_size);

    // constants
    push_u32_le(buf, proto.constants.len() as u32);
    for c in &proto.constants {
        encode_constant(c, buf);
    }

    // upvalue descriptors
    push_u32_le(buf, proto.upvalues.len() as u32);
    for desc in &proto.upvalues {
        match desc {
            UpvalueDesc::Stack(reg) => {
                push_u8(buf, 0);
                push_u8(buf, *reg);
            }
            UpvalueDesc::Upvalue(idx) => {
                push_u8(buf, 1);
                push_u8(buf, *idx);
            }
        }
    }

    // nested prototypes
    push_u32_le(buf, proto.protos.len() as u32);
    for p in &proto.protos {
        encode_proto(p, buf);
    }

    // code: raw instruction words
    push_u32_le(buf, proto.code.len() as u32);
    for inst in &proto.code {
        push_u32_le(buf, inst.0);
    }

    // debug sections
    push_u32_le(buf, proto.line_info.len() as u32);
    for line in &proto.line_info {
        push_u32_le(buf, *line);
    }

    push_u32_le(buf, proto.loc_vars.len() as u32);
    for lv in &proto.loc_vars {
        push_str(buf, &lv.name);
        push_u32_le(buf, lv.start_pc);
        push_u32_le(buf, lv.end_pc);
    }

    push_u32_le(buf, proto.upvalue_names.len() as u32);
    for name in &proto.upvalue_names {
        push_str(buf, name);
    }
}

fn encode_constant(val: &LuaValue, buf: &mut Vec<u8>) {
    match val {
        LuaValue::Nil => {
            push_u8(buf, 0);
        }
        LuaValue::Boolean(b) => {
            push_u8(buf, 1);
            push_u8(buf, *b as u8);
        }
        LuaValue::Integer(n) => {
            push_u8(buf, 2);
            push_i64_le(buf, *n);
        }
        LuaValue::Float(f) => {
            push_u8(buf, 3);
            push_f64_le(buf, *f);
        }
        LuaValue::LuaString(s) => {
            push_u8(buf, 4);
            push_str(buf, s);
        }
        // Reference types never appear in a constant pool, but we emit a
        // placeholder to avoid panicking.
        _ => {
            push_u8(buf, 0); // treat as Nil
        }
    }
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Encode a compiled `Chunk` to a byte vector suitable for writing to a
/// `.luac` file.
pub fn encode_chunk(chunk: &Chunk) -> Vec<u8> {
    let mut buf = MAGIC.to_vec();
    encode_proto(&chunk.proto, &mut buf);
    buf
}
