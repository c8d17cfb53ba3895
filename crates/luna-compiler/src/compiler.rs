//! AST → bytecode translation.
//!
//! A [`Compiler`] keeps a stack of [`FuncInfo`]s, one per function body being
//! compiled, innermost last. Name resolution walks that stack outward: local
//! slot first, then upvalue capture through every enclosing function, and
//! finally `_ENV` table access for free names.
//!
//! The chunk itself compiles as a vararg function nested inside a synthetic
//! enclosing function whose only local is `_ENV`. That makes the main chunk's
//! `_ENV` a plain captured upvalue and keeps globals on the same code path as
//! every other outer-scope name.

use crate::chunk::Chunk;
use crate::funcinfo::FuncInfo;
use luna_core::{LuaError, Prototype, UpvalueDesc};
use luna_parser::ast::{Block, Expr, FuncBody};
use std::sync::Arc;

pub struct Compiler {
    /// Function bodies under compilation, innermost last.
    pub(crate) fns: Vec<FuncInfo>,
    source: String,
}

impl Compiler {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            fns: Vec::new(),
            source: source.into(),
        }
    }

    /// Compile a parsed chunk into an executable [`Chunk`].
    pub fn compile(mut self, block: &Block) -> Result<Chunk, LuaError> {
        // Synthetic enclosing function that owns `_ENV` in slot 0.
        self.fns.push(FuncInfo::new(0, true, 0, 0));
        self.fi().add_loc_var("_ENV", 0)?;
        let main = self.compile_main(block)?;
        Ok(Chunk::new(main))
    }

    fn compile_main(&mut self, block: &Block) -> Result<Prototype, LuaError> {
        self.fns.push(FuncInfo::new(0, true, 0, 0));
        self.compile_block(block)?;
        let end = self.fi().pc() + 2;
        self.fi().exit_scope(end)?;
        self.fi().emit_return(block.last_line, 0, 0);
        let fi = self.fns.pop().unwrap();
        Ok(fi.into_proto(&self.source))
    }

    /// The function currently being compiled.
    pub(crate) fn fi(&mut self) -> &mut FuncInfo {
        self.fns.last_mut().unwrap()
    }

    // ── Blocks ───────────────────────────────────────────────────────────────

    pub(crate) fn compile_block(&mut self, block: &Block) -> Result<(), LuaError> {
        for stmt in &block.stmts {
            self.compile_stmt(stmt)?;
        }
        if let Some(ret) = &block.ret {
            self.compile_ret(&ret.values, block.last_line)?;
        }
        Ok(())
    }

    fn compile_ret(&mut self, exps: &[Expr], last_line: u32) -> Result<(), LuaError> {
        if exps.is_empty() {
            self.fi().emit_return(last_line, 0, 0);
            return Ok(());
        }

        if exps.len() == 1 {
            // `return x` for a local x returns straight from its slot.
            if let Expr::Name(name, _) = &exps[0] {
                if let Some(r) = self.fi().slot_of_loc_var(name) {
                    self.fi().emit_return(last_line, r, 1);
                    return Ok(());
                }
            }
            // `return f(...)` becomes a tail call.
            if matches!(exps[0], Expr::FnCall { .. } | Expr::MethodCall { .. }) {
                let r = self.fi().alloc_reg()?;
                self.compile_tail_call(&exps[0], r)?;
                self.fi().free_reg()?;
                self.fi().emit_return(last_line, r, -1);
                return Ok(());
            }
        }

        let n_exps = exps.len() as i32;
        let mult_ret = exps[exps.len() - 1].is_multivalue();
        for (i, exp) in exps.iter().enumerate() {
            let r = self.fi().alloc_reg()?;
            if i as i32 == n_exps - 1 && mult_ret {
                self.compile_exp(exp, r, -1)?;
            } else {
                self.compile_exp(exp, r, 1)?;
            }
        }
        self.fi().free_regs(n_exps)?;

        let a = self.fi().used_regs;
        if mult_ret {
            self.fi().emit_return(last_line, a, -1);
        } else {
            self.fi().emit_return(last_line, a, n_exps);
        }
        Ok(())
    }

    // ── Function bodies ──────────────────────────────────────────────────────

    /// Compile a function body into a nested prototype and emit the CLOSURE
    /// instruction that instantiates it into register `a`.
    pub(crate) fn compile_func_def(&mut self, body: &FuncBody, a: i32) -> Result<(), LuaError> {
        let line_defined = body.line;
        let last_line = body.body.last_line;
        self.fns.push(FuncInfo::new(
            body.params.len() as u8,
            body.vararg,
            line_defined,
            last_line,
        ));
        for param in &body.params {
            self.fi().add_loc_var(param, 0)?;
        }
        self.compile_block(&body.body)?;
        let end = self.fi().pc() + 2;
        self.fi().exit_scope(end)?;
        self.fi().emit_return(last_line, 0, 0);

        let child = self.fns.pop().unwrap();
        let proto = Arc::new(child.into_proto(&self.source));
        let fi = self.fi();
        fi.sub_protos.push(proto);
        let bx = fi.sub_protos.len() as i32 - 1;
        fi.emit_closure(line_defined, a, bx);
        Ok(())
    }

    // ── Upvalue resolution ───────────────────────────────────────────────────

    /// Resolve `name` as an upvalue of the current function, adding capture
    /// entries through every enclosing function on the way.
    pub(crate) fn resolve_upvalue(&mut self, name: &str) -> Result<Option<i32>, LuaError> {
        let level = self.fns.len() - 1;
        self.resolve_upvalue_at(level, name)
    }

    fn resolve_upvalue_at(&mut self, level: usize, name: &str) -> Result<Option<i32>, LuaError> {
        if let Some(idx) = self.fns[level].upvalue_index(name) {
            return Ok(Some(idx));
        }
        if level == 0 {
            return Ok(None);
        }

        let parent = level - 1;
        if let Some(binding) = self.fns[parent].active_binding(name) {
            self.fns[parent].mark_captured(binding);
            let slot = self.fns[parent].loc_vars[binding].slot;
            let idx = self.fns[level].add_upvalue(name, UpvalueDesc::Stack(slot))?;
            return Ok(Some(idx));
        }
        if let Some(parent_idx) = self.resolve_upvalue_at(parent, name)? {
            let idx = self.fns[level].add_upvalue(name, UpvalueDesc::Upvalue(parent_idx as u8))?;
            return Ok(Some(idx));
        }
        Ok(None)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use luna_core::{LuaValue, OpCode};
    use luna_parser::Parser;

    fn compile(src: &str) -> Chunk {
        let block = Parser::new(src).unwrap().parse().unwrap();
        Compiler::new("@test").compile(&block).unwrap()
    }

    fn compile_err(src: &str) -> LuaError {
        let block = Parser::new(src).unwrap().parse().unwrap();
        Compiler::new("@test").compile(&block).unwrap_err()
    }

    fn opcodes(chunk: &Chunk) -> Vec<&'static str> {
        chunk
            .proto
            .code
            .iter()
            .map(|i| i.opcode().map(|op| op.name()).unwrap_or("?"))
            .collect()
    }

    #[test]
    fn hello_world_chunk_shape() {
        let chunk = compile("print(\"Hello, world!\")");
        let proto = &chunk.proto;

        assert_eq!(opcodes(&chunk), vec!["GETTABUP", "LOADK", "CALL", "RETURN"]);
        let call = proto.code[2];
        assert_eq!((call.a(), call.b(), call.c()), (0, 2, 1));
        let ret = proto.code[3];
        assert_eq!((ret.a(), ret.b()), (0, 1));

        assert_eq!(proto.constants.len(), 2);
        assert!(matches!(&proto.constants[0], LuaValue::LuaString(s) if s == "print"));
        assert!(matches!(&proto.constants[1], LuaValue::LuaString(s) if s == "Hello, world!"));

        assert!(matches!(proto.upvalues[..], [UpvalueDesc::Stack(0)]));
        assert_eq!(proto.upvalue_names, vec!["_ENV"]);
        assert!(proto.is_vararg);
        assert_eq!(proto.num_params, 0);
        assert_eq!(proto.max_stack_size, 2);
        assert_eq!(proto.line_info.len(), proto.code.len());
        assert!(proto.line_info.iter().all(|&l| l == 1));
    }

    #[test]
    fn integer_and_float_constants_stay_distinct() {
        let chunk = compile("local a = 1 local b = 1.0 local c = 1");
        let consts = &chunk.proto.constants;
        assert_eq!(consts.len(), 2);
        assert!(matches!(consts[0], LuaValue::Integer(1)));
        assert!(matches!(consts[1], LuaValue::Float(f) if f == 1.0));
    }

    #[test]
    fn block_locals_release_their_registers() {
        let chunk = compile("do local a = 1 end do local b = 2 end");
        assert_eq!(chunk.proto.max_stack_size, 2);
    }

    #[test]
    fn too_many_locals_is_rejected() {
        let src: String = (0..300).map(|i| format!("local x{} = 0\n", i)).collect();
        let err = compile_err(&src);
        assert!(err.to_string().contains("too many registers"));
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        let err = compile_err("break");
        assert!(err.to_string().contains("break outside a loop"));
    }

    #[test]
    fn goto_is_rejected() {
        let err = compile_err("goto done ::done::");
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn and_uses_testset_with_jump() {
        let chunk = compile("local a, b = 1, 2 local c = a and b");
        let ops = opcodes(&chunk);
        assert!(ops.contains(&"TESTSET"));
        assert!(ops.contains(&"JMP"));
    }

    #[test]
    fn comparison_materializes_booleans() {
        let chunk = compile("return 1 < 2");
        assert_eq!(
            opcodes(&chunk),
            vec!["LT", "JMP", "LOADBOOL", "LOADBOOL", "RETURN", "RETURN"]
        );
        let lt = chunk.proto.code[0];
        assert_eq!((lt.a(), lt.b(), lt.c()), (1, 0x100, 0x101));
        // skip-one jump, then false/true loaders
        assert_eq!(chunk.proto.code[1].sbx(), 1);
        let load_false = chunk.proto.code[2];
        assert_eq!((load_false.b(), load_false.c()), (0, 1));
    }

    #[test]
    fn while_loop_jumps_back_to_condition() {
        let chunk = compile("while true do end");
        assert_eq!(
            opcodes(&chunk),
            vec!["LOADBOOL", "TEST", "JMP", "JMP", "RETURN"]
        );
        // exit jump skips the loop-back jump
        assert_eq!(chunk.proto.code[2].sbx(), 1);
        // loop-back jump re-runs the condition
        assert_eq!(chunk.proto.code[3].sbx(), -4);
    }

    #[test]
    fn numeric_for_emits_prep_and_loop() {
        let chunk = compile("for i = 1, 3 do end");
        assert_eq!(
            opcodes(&chunk),
            vec!["LOADK", "LOADK", "LOADK", "FORPREP", "FORLOOP", "RETURN"]
        );
        assert_eq!(chunk.proto.code[3].sbx(), 0);
        assert_eq!(chunk.proto.code[4].sbx(), -1);
        // implicit step 1 shares the constant with the start value
        assert_eq!(chunk.proto.constants.len(), 2);

        let names: Vec<&str> = chunk
            .proto
            .loc_vars
            .iter()
            .map(|l| l.name.as_str())
            .collect();
        assert_eq!(names, vec!["(for index)", "(for limit)", "(for step)", "i"]);
    }

    #[test]
    fn generic_for_emits_tforcall_and_tforloop() {
        let chunk = compile("for k, v in pairs({}) do end");
        let ops = opcodes(&chunk);
        assert!(ops.contains(&"TFORCALL"));
        assert!(ops.contains(&"TFORLOOP"));
        let names: Vec<&str> = chunk
            .proto
            .loc_vars
            .iter()
            .map(|l| l.name.as_str())
            .collect();
        assert!(names.contains(&"(for generator)"));
        assert!(names.contains(&"(for state)"));
        assert!(names.contains(&"(for control)"));
    }

    #[test]
    fn closure_captures_enclosing_local() {
        let chunk = compile("local a\nreturn function() return a end");
        let inner = &chunk.proto.protos[0];
        assert!(matches!(inner.upvalues[..], [UpvalueDesc::Stack(0)]));
        assert_eq!(inner.upvalue_names, vec!["a"]);
        assert_eq!(opcodes(&chunk)[1], "CLOSURE");
    }

    #[test]
    fn capture_free_function_has_no_upvalues() {
        let chunk = compile("return function() local a, b, c = 1, 2, 3 return a + b + c end");
        let inner = &chunk.proto.protos[0];
        assert!(inner.upvalues.is_empty());
        assert!(inner.upvalue_names.is_empty());
        assert!(inner.max_stack_size >= 3);
    }

    #[test]
    fn capture_chains_through_intermediate_function() {
        let chunk = compile("local a\nreturn function()\n  return function() return a end\nend");
        let middle = &chunk.proto.protos[0];
        let inner = &middle.protos[0];
        assert!(matches!(middle.upvalues[..], [UpvalueDesc::Stack(0)]));
        assert!(matches!(inner.upvalues[..], [UpvalueDesc::Upvalue(0)]));
    }

    #[test]
    fn method_call_uses_self_opcode() {
        let chunk = compile("local t\nt:m(1)");
        let ops = opcodes(&chunk);
        assert!(ops.contains(&"SELF"));
    }

    #[test]
    fn return_call_becomes_tail_call() {
        let chunk = compile("local f\nreturn f()");
        assert_eq!(
            opcodes(&chunk),
            vec!["LOADNIL", "MOVE", "TAILCALL", "RETURN", "RETURN"]
        );
        let ret = chunk.proto.code[3];
        assert_eq!(ret.b(), 0);
    }

    #[test]
    fn parenthesised_call_is_truncated_not_tail_called() {
        let chunk = compile("local f\nreturn (f())");
        let ops = opcodes(&chunk);
        assert!(!ops.contains(&"TAILCALL"));
        let call = chunk.proto.code[2];
        assert_eq!(call.opcode(), Some(OpCode::Call));
        // exactly one result requested
        assert_eq!(call.c(), 2);
    }

    #[test]
    fn multi_assignment_spreads_call_results() {
        let chunk = compile("local a, b = f()");
        let call = chunk.proto.code[1];
        assert_eq!(call.opcode(), Some(OpCode::Call));
        assert_eq!(call.c(), 3);
    }

    #[test]
    fn long_array_constructor_flushes_in_batches() {
        let elems = vec!["0"; 60].join(", ");
        let chunk = compile(&format!("local t = {{{}}}", elems));
        let flushes: Vec<_> = chunk
            .proto
            .code
            .iter()
            .filter(|i| i.opcode() == Some(OpCode::SetList))
            .collect();
        assert_eq!(flushes.len(), 2);
        assert_eq!((flushes[0].b(), flushes[0].c()), (50, 1));
        assert_eq!((flushes[1].b(), flushes[1].c()), (10, 2));
    }

    #[test]
    fn vararg_in_main_chunk_is_allowed() {
        let chunk = compile("return ...");
        assert_eq!(opcodes(&chunk), vec!["VARARG", "RETURN", "RETURN"]);
        // all values flow through
        assert_eq!(chunk.proto.code[0].b(), 0);
        assert_eq!(chunk.proto.code[1].b(), 0);
    }

    #[test]
    fn vararg_outside_vararg_function_is_rejected() {
        let err = compile_err("return function() return ... end");
        assert!(err.to_string().contains("outside a vararg function"));
    }

    #[test]
    fn global_assignment_goes_through_env() {
        let chunk = compile("x = 1");
        assert_eq!(opcodes(&chunk), vec!["LOADK", "SETTABUP", "RETURN"]);
        let set = chunk.proto.code[1];
        assert_eq!(set.a(), 0);
        assert_eq!(set.b(), 0x100);
    }

    #[test]
    fn local_function_sees_itself_as_upvalue() {
        let chunk = compile("local function f() return f() end");
        let inner = &chunk.proto.protos[0];
        assert_eq!(inner.upvalue_names, vec!["f"]);
        assert!(matches!(inner.upvalues[..], [UpvalueDesc::Stack(0)]));
        let inner_ops: Vec<_> = inner.code.iter().map(|i| i.opcode()).collect();
        assert!(inner_ops.contains(&Some(OpCode::TailCall)));
    }

    #[test]
    fn if_chain_tests_each_condition() {
        let chunk = compile("if a then x = 1 elseif b then x = 2 else x = 3 end");
        let ops = opcodes(&chunk);
        let tests = ops.iter().filter(|&&o| o == "TEST").count();
        // the else arm tests a synthesized `true`
        assert_eq!(tests, 3);
    }

    #[test]
    fn repeat_condition_sees_block_locals() {
        let chunk = compile("repeat local done = true until done");
        let ops = opcodes(&chunk);
        assert!(!ops.contains(&"GETTABUP"));
        assert!(ops.contains(&"TEST"));
    }

    #[test]
    fn dotted_function_stmt_assigns_table_field() {
        let chunk = compile("function a.b() end");
        assert_eq!(
            opcodes(&chunk),
            vec!["GETTABUP", "LOADK", "CLOSURE", "SETTABLE", "RETURN"]
        );
    }

    #[test]
    fn method_definition_gets_implicit_self() {
        let chunk = compile("function a:m() return self end");
        let inner = &chunk.proto.protos[0];
        assert_eq!(inner.num_params, 1);
        assert_eq!(inner.loc_vars[0].name, "self");
    }

    #[test]
    fn empty_chunk_compiles_to_bare_return() {
        let chunk = compile("");
        assert_eq!(opcodes(&chunk), vec!["RETURN"]);
        assert_eq!(chunk.proto.max_stack_size, 2);
    }
}
