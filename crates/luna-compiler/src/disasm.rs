use luna_core::{is_rk_const, rk_index, Instruction, LuaValue, OpArg, OpMode, Prototype, UpvalueDesc};

/// Disassemble a [`Prototype`] into a human-readable listing.
///
/// Recursively disassembles any nested `protos[]` so you see the full picture.
pub fn disassemble(proto: &Prototype) -> String {
    let mut out = String::new();
    disasm_proto(proto, &mut out);
    out
}

fn disasm_proto(proto: &Prototype, out: &mut String) {
    let name = if proto.source.is_empty() {
        "<?>".to_string()
    } else {
        proto.source.clone()
    };
    out.push_str(&format!(
        "== {} ==  (params={}, vararg={}, stack={})\n",
        name, proto.num_params, proto.is_vararg, proto.max_stack_size
    ));

    if !proto.constants.is_empty() {
        out.push_str("constants:\n");
        for (i, c) in proto.constants.iter().enumerate() {
            out.push_str(&format!("  [K{i}]  {}\n", fmt_value(c)));
        }
    }

    if !proto.upvalues.is_empty() {
        out.push_str("upvalues:\n");
        for (i, uv) in proto.upvalues.iter().enumerate() {
            let name = proto
                .upvalue_names
                .get(i)
                .map(String::as_str)
                .unwrap_or("?");
            let desc = match uv {
                UpvalueDesc::Stack(reg) => format!("stack reg={reg}"),
                UpvalueDesc::Upvalue(idx) => format!("upvalue idx={idx}"),
            };
            out.push_str(&format!("  [U{i}]  {name}  {desc}\n"));
        }
    }

    if !proto.loc_vars.is_empty() {
        out.push_str("locals:\n");
        for (i, lv) in proto.loc_vars.iter().enumerate() {
            out.push_str(&format!(
                "  [L{i}]  {}  pc {}..{}\n",
                lv.name, lv.start_pc, lv.end_pc
            ));
        }
    }

    out.push_str("instructions:\n");
    for (pc, inst) in proto.code.iter().enumerate() {
        out.push_str(&format!("  {}\n", fmt_instruction(pc, *inst, proto)));
    }

    for (i, sub) in proto.protos.iter().enumerate() {
        out.push('\n');
        out.push_str(&format!("-- sub-proto {i} (of {}) --\n", proto.source));
        disasm_proto(sub, out);
    }
}

fn fmt_value(v: &LuaValue) -> String {
    match v {
        LuaValue::Nil => "nil".to_string(),
        LuaValue::Boolean(b) => b.to_string(),
        LuaValue::Integer(n) => n.to_string(),
        LuaValue::Float(f) => {
            if f.fract() == 0.0 && f.is_finite() {
                format!("{f:.1}")
            } else {
                f.to_string()
            }
        }
        LuaValue::LuaString(s) => format!("{s:?}"),
        _ => format!("{v:?}"),
    }
}

/// A B or C operand: registers print bare, RK constants as `K{i}` with the
/// pool value inlined.
fn fmt_rk(arg: u32, mode: OpArg, proto: &Prototype) -> String {
    match mode {
        OpArg::K if is_rk_const(arg) => {
            let idx = rk_index(arg) as usize;
            let val = proto
                .constants
                .get(idx)
                .map(fmt_value)
                .unwrap_or_else(|| "?".to_string());
            format!("K{idx}({val})")
        }
        _ => arg.to_string(),
    }
}

fn fmt_instruction(pc: usize, inst: Instruction, proto: &Prototype) -> String {
    let line = proto.line_at(pc);
    let prefix = format!("{pc:04}  [{line:>3}]");

    let Some(op) = inst.opcode() else {
        return format!("{prefix}  ??? {:#010x}", inst.0);
    };
    let name = format!("{:<10}", op.name());

    match op.mode() {
        OpMode::IABC => {
            let mut s = format!("{prefix}  {name} {}", inst.a());
            if op.b_mode() != OpArg::N {
                s.push(' ');
                s.push_str(&fmt_rk(inst.b(), op.b_mode(), proto));
            }
            if op.c_mode() != OpArg::N {
                s.push(' ');
                s.push_str(&fmt_rk(inst.c(), op.c_mode(), proto));
            }
            s
        }
        OpMode::IABx => {
            let bx = inst.bx();
            if op.b_mode() == OpArg::K {
                let val = proto
                    .constants
                    .get(bx as usize)
                    .map(fmt_value)
                    .unwrap_or_else(|| "?".to_string());
                format!("{prefix}  {name} {} K{bx}({val})", inst.a())
            } else {
                format!("{prefix}  {name} {} {bx}", inst.a())
            }
        }
        OpMode::IAsBx => {
            let sbx = inst.sbx();
            let target = pc as i64 + 1 + sbx as i64;
            format!("{prefix}  {name} {} {sbx:+}  -> {target:04}", inst.a())
        }
        OpMode::IAx => format!("{prefix}  {name} {}", inst.ax()),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use luna_parser::Parser;

    fn listing(src: &str) -> String {
        let block = Parser::new(src).unwrap().parse().unwrap();
        let chunk = Compiler::new("@test").compile(&block).unwrap();
        disassemble(&chunk.proto)
    }

    #[test]
    fn header_names_the_source() {
        let out = listing("return 1");
        assert!(out.starts_with("== @test =="));
        assert!(out.contains("vararg=true"));
    }

    #[test]
    fn constants_are_listed_with_indices() {
        let out = listing("return 'hi', 42");
        assert!(out.contains("[K0]  \"hi\""));
        assert!(out.contains("[K1]  42"));
    }

    #[test]
    fn rk_operands_inline_the_constant() {
        let out = listing("local x = 1 + 2");
        assert!(out.contains("ADD"));
        assert!(out.contains("K0(1)"));
        assert!(out.contains("K1(2)"));
    }

    #[test]
    fn jumps_print_their_target() {
        let out = listing("while true do end");
        assert!(out.contains("JMP"));
        assert!(out.contains("-> 00"));
    }

    #[test]
    fn nested_protos_recurse() {
        let out = listing("local function f() return 1 end");
        assert!(out.contains("-- sub-proto 0 (of @test) --"));
        assert!(out.contains("[L0]  f"));
    }

    #[test]
    fn float_constants_keep_a_decimal_point() {
        let out = listing("return 1.0");
        assert!(out.contains("[K0]  1.0"));
    }
}
