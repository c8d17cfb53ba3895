//! Statement lowering.
//!
//! Loop and scope shapes follow the classic Lua 5.3 layout: `while` tests
//! before a forward exit jump, `repeat` shares the block scope with its
//! condition, numeric and generic `for` hide their control state in
//! parenthesised local names so user code can never touch it.

use crate::compiler::Compiler;
use crate::expr::ARG_REG;
use luna_core::{rk_const, LuaError, LuaValue, MAXINDEXRK};
use luna_parser::ast::{Block, Expr, FuncBody, FuncName, Stmt};

/// Trailing `nil` literals fold into the LOADNIL padding the target list
/// gets anyway.
fn strip_tail_nils(exps: &[Expr]) -> &[Expr] {
    let mut n = exps.len();
    while n > 0 && matches!(exps[n - 1], Expr::Nil(_)) {
        n -= 1;
    }
    &exps[..n]
}

impl Compiler {
    pub(crate) fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), LuaError> {
        match stmt {
            Stmt::FnCall(call) => self.compile_call_stmt(call),
            Stmt::Break(line) => self.compile_break(*line),
            Stmt::Do(block) => self.compile_do(block),
            Stmt::While { cond, body, .. } => self.compile_while(cond, body),
            Stmt::Repeat { body, cond, .. } => self.compile_repeat(body, cond),
            Stmt::If {
                cond,
                then,
                elseifs,
                else_,
                ..
            } => self.compile_if(cond, then, elseifs, else_.as_ref()),
            Stmt::NumericFor {
                var,
                start,
                limit,
                step,
                body,
                line,
            } => self.compile_numeric_for(var, start, limit, step.as_ref(), body, *line),
            Stmt::GenericFor {
                vars,
                iterators,
                body,
                line,
            } => self.compile_generic_for(vars, iterators, body, *line),
            Stmt::Assign {
                targets,
                values,
                line,
            } => self.compile_assign(targets, values, *line),
            Stmt::Local {
                names,
                values,
                line,
            } => self.compile_local(names, values, *line),
            Stmt::LocalFn { name, body, .. } => self.compile_local_fn(name, body),
            Stmt::FnDef { name, body, line } => self.compile_fn_def(name, body, *line),
            Stmt::Goto { line, .. } | Stmt::Label { line, .. } => {
                Err(LuaError::compile(*line, "goto and labels are not supported"))
            }
        }
    }

    /// A call in statement position discards every result.
    fn compile_call_stmt(&mut self, call: &Expr) -> Result<(), LuaError> {
        let r = self.fi().alloc_reg()?;
        self.compile_exp(call, r, 0)?;
        self.fi().free_reg()
    }

    fn compile_break(&mut self, line: u32) -> Result<(), LuaError> {
        let pc = self.fi().emit_jmp(line, 0, 0);
        self.fi().add_break_jmp(pc, line)
    }

    fn compile_do(&mut self, block: &Block) -> Result<(), LuaError> {
        self.fi().enter_scope(false);
        self.compile_block(block)?;
        self.fi().close_open_upvals(block.last_line);
        let end = self.fi().pc() + 1;
        self.fi().exit_scope(end)
    }

    fn compile_while(&mut self, cond: &Expr, body: &Block) -> Result<(), LuaError> {
        let pc_before_cond = self.fi().pc();

        let old_regs = self.fi().used_regs;
        let (a, _) = self.exp_to_op_arg(cond, ARG_REG)?;
        self.fi().used_regs = old_regs;

        let line = cond.line();
        self.fi().emit_test(line, a, 0);
        let pc_jmp_to_end = self.fi().emit_jmp(line, 0, 0);

        self.fi().enter_scope(true);
        self.compile_block(body)?;
        self.fi().close_open_upvals(body.last_line);
        let back = pc_before_cond - self.fi().pc() - 1;
        self.fi().emit_jmp(body.last_line, 0, back);
        let end = self.fi().pc();
        self.fi().exit_scope(end)?;

        let sbx = self.fi().pc() - pc_jmp_to_end;
        self.fi().fix_sbx(pc_jmp_to_end, sbx)
    }

    /// `repeat` keeps the block scope open while compiling the condition, so
    /// `until` can see the block's locals.
    fn compile_repeat(&mut self, body: &Block, cond: &Expr) -> Result<(), LuaError> {
        self.fi().enter_scope(true);

        let pc_before_block = self.fi().pc();
        self.compile_block(body)?;

        let old_regs = self.fi().used_regs;
        let (a, _) = self.exp_to_op_arg(cond, ARG_REG)?;
        self.fi().used_regs = old_regs;

        let line = cond.line();
        self.fi().emit_test(line, a, 0);
        let arg_a = self.fi().jmp_arg_a();
        let back = pc_before_block - self.fi().pc() - 1;
        self.fi().emit_jmp(line, arg_a, back);
        self.fi().close_open_upvals(line);

        let end = self.fi().pc() + 1;
        self.fi().exit_scope(end)
    }

    fn compile_if(
        &mut self,
        cond: &Expr,
        then: &Block,
        elseifs: &[(Expr, Block)],
        else_: Option<&Block>,
    ) -> Result<(), LuaError> {
        let else_cond;
        let mut arms: Vec<(&Expr, &Block)> = Vec::with_capacity(2 + elseifs.len());
        arms.push((cond, then));
        for (c, b) in elseifs {
            arms.push((c, b));
        }
        if let Some(b) = else_ {
            // `else` behaves as `elseif true`
            else_cond = Expr::True(b.line);
            arms.push((&else_cond, b));
        }

        let mut pc_jmp_to_ends = Vec::with_capacity(arms.len());
        let mut pc_jmp_to_next = -1;

        for (i, &(exp, block)) in arms.iter().enumerate() {
            if pc_jmp_to_next >= 0 {
                let sbx = self.fi().pc() - pc_jmp_to_next;
                self.fi().fix_sbx(pc_jmp_to_next, sbx)?;
            }

            let old_regs = self.fi().used_regs;
            let (a, _) = self.exp_to_op_arg(exp, ARG_REG)?;
            self.fi().used_regs = old_regs;

            let line = exp.line();
            self.fi().emit_test(line, a, 0);
            pc_jmp_to_next = self.fi().emit_jmp(line, 0, 0);

            self.fi().enter_scope(false);
            self.compile_block(block)?;
            self.fi().close_open_upvals(block.last_line);
            let end = self.fi().pc() + 1;
            self.fi().exit_scope(end)?;
            if i < arms.len() - 1 {
                pc_jmp_to_ends.push(self.fi().emit_jmp(block.last_line, 0, 0));
            } else {
                // the last arm's fall-through doubles as its end jump
                pc_jmp_to_ends.push(pc_jmp_to_next);
            }
        }

        for pc in pc_jmp_to_ends {
            let sbx = self.fi().pc() - pc;
            self.fi().fix_sbx(pc, sbx)?;
        }
        Ok(())
    }

    fn compile_numeric_for(
        &mut self,
        var: &str,
        start: &Expr,
        limit: &Expr,
        step: Option<&Expr>,
        body: &Block,
        line: u32,
    ) -> Result<(), LuaError> {
        self.fi().enter_scope(true);

        let default_step;
        let step = match step {
            Some(e) => e,
            None => {
                default_step = Expr::Integer(1, line);
                &default_step
            }
        };
        self.compile_local_decl(
            &["(for index)", "(for limit)", "(for step)"],
            &[start, limit, step],
            line,
        )?;
        let start_pc = self.fi().pc() + 2;
        self.fi().add_loc_var(var, start_pc)?;

        let a = self.fi().used_regs - 4;
        let pc_for_prep = self.fi().emit_for_prep(line, a, 0);
        self.compile_block(body)?;
        self.fi().close_open_upvals(body.last_line);
        let pc_for_loop = self.fi().emit_for_loop(line, a, 0);

        self.fi().fix_sbx(pc_for_prep, pc_for_loop - pc_for_prep - 1)?;
        self.fi().fix_sbx(pc_for_loop, pc_for_prep - pc_for_loop)?;

        let end = self.fi().pc();
        self.fi().exit_scope(end)?;
        self.fi().fix_end_pc("(for index)", 1);
        self.fi().fix_end_pc("(for limit)", 1);
        self.fi().fix_end_pc("(for step)", 1);
        Ok(())
    }

    fn compile_generic_for(
        &mut self,
        vars: &[String],
        iterators: &[Expr],
        body: &Block,
        line: u32,
    ) -> Result<(), LuaError> {
        self.fi().enter_scope(true);

        let r_generator = self.fi().used_regs;
        let values: Vec<&Expr> = iterators.iter().collect();
        self.compile_local_decl(
            &["(for generator)", "(for state)", "(for control)"],
            &values,
            line,
        )?;
        for var in vars {
            let start_pc = self.fi().pc() + 2;
            self.fi().add_loc_var(var, start_pc)?;
        }

        let pc_jmp_to_tfc = self.fi().emit_jmp(line, 0, 0);
        self.compile_block(body)?;
        self.fi().close_open_upvals(body.last_line);
        let sbx = self.fi().pc() - pc_jmp_to_tfc;
        self.fi().fix_sbx(pc_jmp_to_tfc, sbx)?;

        let iter_line = iterators[0].line();
        self.fi()
            .emit_t_for_call(iter_line, r_generator, vars.len() as i32);
        let back = pc_jmp_to_tfc - self.fi().pc() - 1;
        self.fi().emit_t_for_loop(iter_line, r_generator + 2, back);

        let end = self.fi().pc() - 1;
        self.fi().exit_scope(end)?;
        self.fi().fix_end_pc("(for generator)", 2);
        self.fi().fix_end_pc("(for state)", 2);
        self.fi().fix_end_pc("(for control)", 2);
        Ok(())
    }

    // ── Declarations & assignment ────────────────────────────────────────────

    fn compile_local(&mut self, names: &[String], values: &[Expr], line: u32) -> Result<(), LuaError> {
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let values: Vec<&Expr> = strip_tail_nils(values).iter().collect();
        self.compile_local_decl(&names, &values, line)
    }

    /// Evaluate `exps` into fresh registers, pad or truncate to `names.len()`
    /// values, then rebind those registers as the named locals.
    pub(crate) fn compile_local_decl(
        &mut self,
        names: &[&str],
        exps: &[&Expr],
        line: u32,
    ) -> Result<(), LuaError> {
        let n_exps = exps.len() as i32;
        let n_names = names.len() as i32;

        let old_regs = self.fi().used_regs;
        if n_exps == n_names {
            for exp in exps {
                let a = self.fi().alloc_reg()?;
                self.compile_exp(exp, a, 1)?;
            }
        } else if n_exps > n_names {
            for (i, exp) in exps.iter().enumerate() {
                let a = self.fi().alloc_reg()?;
                if i as i32 == n_exps - 1 && exp.is_multivalue() {
                    self.compile_exp(exp, a, 0)?;
                } else {
                    self.compile_exp(exp, a, 1)?;
                }
            }
        } else {
            let mut mult_ret = false;
            for (i, exp) in exps.iter().enumerate() {
                let a = self.fi().alloc_reg()?;
                if i as i32 == n_exps - 1 && exp.is_multivalue() {
                    mult_ret = true;
                    let n = n_names - n_exps + 1;
                    self.compile_exp(exp, a, n)?;
                    self.fi().alloc_regs(n - 1)?;
                } else {
                    self.compile_exp(exp, a, 1)?;
                }
            }
            if !mult_ret {
                let n = n_names - n_exps;
                let a = self.fi().alloc_reg()?;
                self.fi().alloc_regs(n - 1)?;
                self.fi().emit_load_nil(line, a, n);
            }
        }

        // rebind the value registers under the declared names
        self.fi().used_regs = old_regs;
        let start_pc = self.fi().pc() + 1;
        for name in names {
            self.fi().add_loc_var(name, start_pc)?;
        }
        Ok(())
    }

    pub(crate) fn compile_assign(
        &mut self,
        targets: &[Expr],
        values: &[Expr],
        line: u32,
    ) -> Result<(), LuaError> {
        let exps = strip_tail_nils(values);
        let n_exps = exps.len() as i32;
        let n_vars = targets.len() as i32;

        let mut t_regs = vec![-1i32; targets.len()];
        let mut k_regs = vec![-1i32; targets.len()];
        let mut v_regs = vec![0i32; targets.len()];
        let old_regs = self.fi().used_regs;

        // evaluate target tables and keys before any right-hand side
        for (i, target) in targets.iter().enumerate() {
            match target {
                Expr::Index { table, key, .. } => {
                    t_regs[i] = self.fi().alloc_reg()?;
                    self.compile_exp(table, t_regs[i], 1)?;
                    k_regs[i] = self.fi().alloc_reg()?;
                    self.compile_exp(key, k_regs[i], 1)?;
                }
                Expr::Field {
                    table,
                    field,
                    line: field_line,
                } => {
                    t_regs[i] = self.fi().alloc_reg()?;
                    self.compile_exp(table, t_regs[i], 1)?;
                    k_regs[i] = self.fi().alloc_reg()?;
                    let k = LuaValue::LuaString(field.clone());
                    self.fi().emit_load_k(*field_line, k_regs[i], &k);
                }
                Expr::Name(name, name_line) => {
                    if self.fi().slot_of_loc_var(name).is_none()
                        && self.resolve_upvalue(name)?.is_none()
                    {
                        // global: spill the key when its constant index does
                        // not fit an RK operand
                        let k = LuaValue::LuaString(name.clone());
                        if self.fi().index_of_constant(&k) as u32 > MAXINDEXRK {
                            k_regs[i] = self.fi().alloc_reg()?;
                            self.fi().emit_load_k(*name_line, k_regs[i], &k);
                        }
                    }
                }
                _ => {
                    return Err(LuaError::compile(line, "cannot assign to this expression"));
                }
            }
        }
        for i in 0..targets.len() {
            v_regs[i] = self.fi().used_regs + i as i32;
        }

        if n_exps >= n_vars {
            for (i, exp) in exps.iter().enumerate() {
                let a = self.fi().alloc_reg()?;
                if i as i32 >= n_vars && i as i32 == n_exps - 1 && exp.is_multivalue() {
                    self.compile_exp(exp, a, 0)?;
                } else {
                    self.compile_exp(exp, a, 1)?;
                }
            }
        } else {
            let mut mult_ret = false;
            for (i, exp) in exps.iter().enumerate() {
                let a = self.fi().alloc_reg()?;
                if i as i32 == n_exps - 1 && exp.is_multivalue() {
                    mult_ret = true;
                    let n = n_vars - n_exps + 1;
                    self.compile_exp(exp, a, n)?;
                    self.fi().alloc_regs(n - 1)?;
                } else {
                    self.compile_exp(exp, a, 1)?;
                }
            }
            if !mult_ret {
                let n = n_vars - n_exps;
                let a = self.fi().alloc_reg()?;
                self.fi().alloc_regs(n - 1)?;
                self.fi().emit_load_nil(line, a, n);
            }
        }

        for (i, target) in targets.iter().enumerate() {
            match target {
                Expr::Name(name, _) => {
                    if let Some(a) = self.fi().slot_of_loc_var(name) {
                        self.fi().emit_move(line, a, v_regs[i]);
                    } else if let Some(b) = self.resolve_upvalue(name)? {
                        self.fi().emit_set_upval(line, v_regs[i], b);
                    } else if let Some(a) = self.fi().slot_of_loc_var("_ENV") {
                        // a local named _ENV shadows the chunk environment
                        if k_regs[i] < 0 {
                            let k = LuaValue::LuaString(name.clone());
                            let b = rk_const(self.fi().index_of_constant(&k) as u32) as i32;
                            self.fi().emit_set_table(line, a, b, v_regs[i]);
                        } else {
                            self.fi().emit_set_table(line, a, k_regs[i], v_regs[i]);
                        }
                    } else {
                        let a = self.resolve_upvalue("_ENV")?.unwrap_or(0);
                        if k_regs[i] < 0 {
                            let k = LuaValue::LuaString(name.clone());
                            let b = rk_const(self.fi().index_of_constant(&k) as u32) as i32;
                            self.fi().emit_set_tab_up(line, a, b, v_regs[i]);
                        } else {
                            self.fi().emit_set_tab_up(line, a, k_regs[i], v_regs[i]);
                        }
                    }
                }
                _ => {
                    self.fi().emit_set_table(line, t_regs[i], k_regs[i], v_regs[i]);
                }
            }
        }

        self.fi().used_regs = old_regs;
        Ok(())
    }

    fn compile_local_fn(&mut self, name: &str, body: &FuncBody) -> Result<(), LuaError> {
        // the name binds before the body compiles, so the function can
        // capture itself for recursion
        let start_pc = self.fi().pc() + 2;
        let r = self.fi().add_loc_var(name, start_pc)?;
        self.compile_func_def(body, r)
    }

    /// `function a.b.c:m() ... end` assigns a closure to `a.b.c.m`.
    fn compile_fn_def(&mut self, name: &FuncName, body: &FuncBody, line: u32) -> Result<(), LuaError> {
        let mut target = Expr::Name(name.parts[0].clone(), line);
        for part in &name.parts[1..] {
            target = Expr::Field {
                table: Box::new(target),
                field: part.clone(),
                line,
            };
        }
        if let Some(method) = &name.method {
            target = Expr::Field {
                table: Box::new(target),
                field: method.clone(),
                line,
            };
        }
        let value = Expr::FnDef(body.clone());
        self.compile_assign(&[target], &[value], line)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use crate::chunk::Chunk;
    use crate::compiler::Compiler;
    use luna_core::OpCode;
    use luna_parser::Parser;

    fn compile(src: &str) -> Chunk {
        let block = Parser::new(src).unwrap().parse().unwrap();
        Compiler::new("@test").compile(&block).unwrap()
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
    fn swap_assignment_goes_through_temporaries() {
        let chunk = compile("local a, b\na, b = b, a");
        assert_eq!(
            opcodes(&chunk),
            vec!["LOADNIL", "MOVE", "MOVE", "MOVE", "MOVE", "RETURN"]
        );
        // rhs into temps r2/r3, then temps into the locals
        let store_a = chunk.proto.code[3];
        assert_eq!((store_a.a(), store_a.b()), (0, 2));
        let store_b = chunk.proto.code[4];
        assert_eq!((store_b.a(), store_b.b()), (1, 3));
    }

    #[test]
    fn short_value_list_pads_with_loadnil() {
        let chunk = compile("local a, b, c = 1");
        assert_eq!(opcodes(&chunk), vec!["LOADK", "LOADNIL", "RETURN"]);
        let pad = chunk.proto.code[1];
        // two nils starting at register 1
        assert_eq!((pad.a(), pad.b()), (1, 1));
    }

    #[test]
    fn extra_values_are_evaluated_then_dropped() {
        let chunk = compile("local a = 1, f()");
        let call = chunk
            .proto
            .code
            .iter()
            .find(|i| i.opcode() == Some(OpCode::Call))
            .copied()
            .unwrap();
        // zero results requested
        assert_eq!(call.c(), 1);
    }

    #[test]
    fn trailing_nils_fold_into_the_padding() {
        let chunk = compile("local a, b = nil, nil");
        assert_eq!(opcodes(&chunk), vec!["LOADNIL", "RETURN"]);
        assert_eq!(chunk.proto.code[0].b(), 1);
    }

    #[test]
    fn index_assignment_emits_settable() {
        let chunk = compile("local t\nt[1] = 2");
        let ops = opcodes(&chunk);
        assert!(ops.contains(&"SETTABLE"));
    }

    #[test]
    fn upvalue_assignment_emits_setupval() {
        let chunk = compile("local a\nreturn function() a = 1 end");
        let inner = &chunk.proto.protos[0];
        let inner_ops: Vec<_> = inner.code.iter().map(|i| i.opcode()).collect();
        assert!(inner_ops.contains(&Some(OpCode::SetUpval)));
    }

    #[test]
    fn break_jumps_past_the_loop_back_edge() {
        let chunk = compile("while x do break end");
        // GETTABUP TEST JMP(exit) JMP(break) JMP(back) RETURN
        assert_eq!(
            opcodes(&chunk),
            vec!["GETTABUP", "TEST", "JMP", "JMP", "JMP", "RETURN"]
        );
        assert_eq!(chunk.proto.code[3].sbx(), 1);
    }

    #[test]
    fn do_block_with_captured_local_closes_upvalues() {
        let chunk = compile("local f\ndo local x\nf = function() return x end\nend");
        let close = chunk
            .proto
            .code
            .iter()
            .filter(|i| i.opcode() == Some(OpCode::Jmp))
            .find(|i| i.a() > 0)
            .copied()
            .unwrap();
        // x lives in register 1, so the close jump carries A = 2
        assert_eq!(close.a(), 2);
        assert_eq!(close.sbx(), 0);
    }

    #[test]
    fn negative_step_is_computed_at_runtime() {
        let chunk = compile("for i = 10, 1, -1 do end");
        let ops = opcodes(&chunk);
        assert!(ops.contains(&"UNM"));
        assert!(ops.contains(&"FORPREP"));
    }

    #[test]
    fn nested_breaks_bind_to_their_own_loops() {
        let chunk = compile(
            "while a do\n  while b do break end\n  break\nend",
        );
        // compiles cleanly with both loops patched
        assert!(opcodes(&chunk).contains(&"JMP"));
    }

    #[test]
    fn repeat_loops_back_to_block_start() {
        let chunk = compile("repeat f() until done");
        let ops = opcodes(&chunk);
        assert!(ops.contains(&"TEST"));
        let back = chunk
            .proto
            .code
            .iter()
            .filter(|i| i.opcode() == Some(OpCode::Jmp))
            .find(|i| i.sbx() < 0)
            .copied()
            .unwrap();
        assert!(back.sbx() < 0);
    }

    #[test]
    fn generic_for_reserves_three_hidden_slots() {
        let chunk = compile("for k in next, t do end");
        let tfc = chunk
            .proto
            .code
            .iter()
            .find(|i| i.opcode() == Some(OpCode::TForCall))
            .copied()
            .unwrap();
        assert_eq!(tfc.a(), 0);
        assert_eq!(tfc.c(), 1);
    }
}
