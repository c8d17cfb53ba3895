//! Expression lowering.
//!
//! `compile_exp` evaluates an expression into register `a`. The `n` argument
//! only matters for the multi-value forms (calls, `...`, bare `nil`): -1
//! requests every available value, 0 discards them all.
//!
//! `exp_to_op_arg` is the operand packer: where an instruction accepts an RK
//! operand or an upvalue index, it avoids materializing the value in a fresh
//! register.

use crate::compiler::Compiler;
use luna_core::{rk_const, LuaError, LuaValue, OpCode, MAXINDEXRK};
use luna_parser::ast::{BinOp, CallArgs, Expr, Field, UnOp};

// Operand kinds `exp_to_op_arg` may produce, combinable as a bitmask.
pub(crate) const ARG_CONST: u8 = 1;
pub(crate) const ARG_REG: u8 = 2;
pub(crate) const ARG_UPVAL: u8 = 4;
pub(crate) const ARG_RK: u8 = ARG_REG | ARG_CONST;
pub(crate) const ARG_RU: u8 = ARG_REG | ARG_UPVAL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArgKind {
    Const,
    Reg,
    Upval,
}

fn arith_opcode(op: BinOp) -> OpCode {
    match op {
        BinOp::Add => OpCode::Add,
        BinOp::Sub => OpCode::Sub,
        BinOp::Mul => OpCode::Mul,
        BinOp::Div => OpCode::Div,
        BinOp::IDiv => OpCode::IDiv,
        BinOp::Mod => OpCode::Mod,
        BinOp::Pow => OpCode::Pow,
        BinOp::BitAnd => OpCode::BAnd,
        BinOp::BitOr => OpCode::BOr,
        BinOp::BitXor => OpCode::BXor,
        BinOp::Shl => OpCode::Shl,
        BinOp::Shr => OpCode::Shr,
        // comparison, logical and concat forms never reach here
        _ => OpCode::Add,
    }
}

/// Collect the leaves of a `..` chain so one CONCAT covers them all.
fn flatten_concat<'e>(e: &'e Expr, out: &mut Vec<&'e Expr>) {
    if let Expr::BinOp {
        op: BinOp::Concat,
        lhs,
        rhs,
        ..
    } = e
    {
        flatten_concat(lhs, out);
        flatten_concat(rhs, out);
    } else {
        out.push(e);
    }
}

impl Compiler {
    pub(crate) fn compile_exp(&mut self, e: &Expr, a: i32, n: i32) -> Result<(), LuaError> {
        match e {
            Expr::Nil(line) => {
                self.fi().emit_load_nil(*line, a, n);
                Ok(())
            }
            Expr::False(line) => {
                self.fi().emit_load_bool(*line, a, 0, 0);
                Ok(())
            }
            Expr::True(line) => {
                self.fi().emit_load_bool(*line, a, 1, 0);
                Ok(())
            }
            Expr::Integer(v, line) => {
                self.fi().emit_load_k(*line, a, &LuaValue::Integer(*v));
                Ok(())
            }
            Expr::Float(v, line) => {
                self.fi().emit_load_k(*line, a, &LuaValue::Float(*v));
                Ok(())
            }
            Expr::LuaString(s, line) => {
                let k = LuaValue::LuaString(s.clone());
                self.fi().emit_load_k(*line, a, &k);
                Ok(())
            }
            // parentheses pin the expression to exactly one value
            Expr::Paren(inner, _) => self.compile_exp(inner, a, 1),
            Expr::Vararg(line) => self.compile_vararg(*line, a, n),
            Expr::FnDef(body) => self.compile_func_def(body, a),
            Expr::Name(name, line) => self.compile_name(name, *line, a),
            Expr::BinOp { op, lhs, rhs, line } => self.compile_binop(*op, lhs, rhs, *line, a),
            Expr::UnOp { op, operand, line } => self.compile_unop(*op, operand, *line, a),
            Expr::Index { table, key, line } => self.compile_table_access(table, key, a, *line),
            Expr::Field { table, field, line } => {
                let key = Expr::LuaString(field.clone(), *line);
                self.compile_table_access(table, &key, a, *line)
            }
            Expr::FnCall { func, args, line } => {
                let n_args = self.prep_func_call(func, None, args, *line, a)?;
                self.fi().emit_call(*line, a, n_args, n);
                Ok(())
            }
            Expr::MethodCall {
                obj,
                method,
                args,
                line,
            } => {
                let n_args = self.prep_func_call(obj, Some(method), args, *line, a)?;
                self.fi().emit_call(*line, a, n_args, n);
                Ok(())
            }
            Expr::Table(fields, line) => self.compile_table_constructor(fields, a, *line),
        }
    }

    fn compile_vararg(&mut self, line: u32, a: i32, n: i32) -> Result<(), LuaError> {
        if !self.fi().is_vararg {
            return Err(LuaError::compile(
                line,
                "cannot use '...' outside a vararg function",
            ));
        }
        self.fi().emit_vararg(line, a, n);
        Ok(())
    }

    fn compile_name(&mut self, name: &str, line: u32, a: i32) -> Result<(), LuaError> {
        if let Some(r) = self.fi().slot_of_loc_var(name) {
            if r != a {
                self.fi().emit_move(line, a, r);
            }
            return Ok(());
        }
        if let Some(idx) = self.resolve_upvalue(name)? {
            self.fi().emit_get_upval(line, a, idx);
            return Ok(());
        }
        // free name: sugar for _ENV[name]
        let env = Expr::Name("_ENV".into(), line);
        let key = Expr::LuaString(name.to_owned(), line);
        self.compile_table_access(&env, &key, a, line)
    }

    pub(crate) fn compile_table_access(
        &mut self,
        table: &Expr,
        key: &Expr,
        a: i32,
        line: u32,
    ) -> Result<(), LuaError> {
        let old_regs = self.fi().used_regs;
        let (b, kind_b) = self.exp_to_op_arg(table, ARG_RU)?;
        let (c, _) = self.exp_to_op_arg(key, ARG_RK)?;
        self.fi().used_regs = old_regs;

        if kind_b == ArgKind::Upval {
            self.fi().emit_get_tab_up(line, a, b, c);
        } else {
            self.fi().emit_get_table(line, a, b, c);
        }
        Ok(())
    }

    fn compile_binop(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        line: u32,
        a: i32,
    ) -> Result<(), LuaError> {
        match op {
            BinOp::And | BinOp::Or => {
                let old_regs = self.fi().used_regs;
                let (b, _) = self.exp_to_op_arg(lhs, ARG_REG)?;
                self.fi().used_regs = old_regs;
                let c = if op == BinOp::And { 0 } else { 1 };
                if b == a {
                    self.fi().emit_test(line, a, c);
                } else {
                    self.fi().emit_test_set(line, a, b, c);
                }
                let pc_jmp = self.fi().emit_jmp(line, 0, 0);

                let (b, _) = self.exp_to_op_arg(rhs, ARG_REG)?;
                self.fi().used_regs = old_regs;
                self.fi().emit_move(line, a, b);
                let sbx = self.fi().pc() - pc_jmp;
                self.fi().fix_sbx(pc_jmp, sbx)
            }
            BinOp::Eq | BinOp::NotEq | BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq => {
                let old_regs = self.fi().used_regs;
                let (b, _) = self.exp_to_op_arg(lhs, ARG_RK)?;
                let (c, _) = self.exp_to_op_arg(rhs, ARG_RK)?;
                self.fi().used_regs = old_regs;

                // `>` and `>=` compile as `<` and `<=` with swapped operands
                let (opcode, b, c) = match op {
                    BinOp::Eq | BinOp::NotEq => (OpCode::Eq, b, c),
                    BinOp::Lt => (OpCode::Lt, b, c),
                    BinOp::LtEq => (OpCode::Le, b, c),
                    BinOp::Gt => (OpCode::Lt, c, b),
                    _ => (OpCode::Le, c, b),
                };
                let flag = if op == BinOp::NotEq { 0 } else { 1 };
                self.fi().emit_abc(line, opcode, flag, b, c);
                self.fi().emit_jmp(line, 0, 1);
                self.fi().emit_load_bool(line, a, 0, 1);
                self.fi().emit_load_bool(line, a, 1, 0);
                Ok(())
            }
            BinOp::Concat => self.compile_concat(lhs, rhs, line, a),
            _ => {
                let old_regs = self.fi().used_regs;
                let (b, _) = self.exp_to_op_arg(lhs, ARG_RK)?;
                let (c, _) = self.exp_to_op_arg(rhs, ARG_RK)?;
                self.fi().used_regs = old_regs;
                self.fi().emit_abc(line, arith_opcode(op), a, b, c);
                Ok(())
            }
        }
    }

    /// CONCAT takes a contiguous register range, so the whole `..` chain
    /// evaluates into consecutive temporaries first.
    fn compile_concat(
        &mut self,
        lhs: &Expr,
        rhs: &Expr,
        line: u32,
        a: i32,
    ) -> Result<(), LuaError> {
        let mut parts = Vec::new();
        flatten_concat(lhs, &mut parts);
        flatten_concat(rhs, &mut parts);

        for part in &parts {
            let r = self.fi().alloc_reg()?;
            self.compile_exp(part, r, 1)?;
        }
        let c = self.fi().used_regs - 1;
        let b = c - parts.len() as i32 + 1;
        self.fi().free_regs(parts.len() as i32)?;
        self.fi().emit_abc(line, OpCode::Concat, a, b, c);
        Ok(())
    }

    fn compile_unop(
        &mut self,
        op: UnOp,
        operand: &Expr,
        line: u32,
        a: i32,
    ) -> Result<(), LuaError> {
        let old_regs = self.fi().used_regs;
        let (b, _) = self.exp_to_op_arg(operand, ARG_REG)?;
        self.fi().used_regs = old_regs;
        let opcode = match op {
            UnOp::Neg => OpCode::Unm,
            UnOp::Not => OpCode::Not,
            UnOp::Len => OpCode::Len,
            UnOp::BitNot => OpCode::BNot,
        };
        self.fi().emit_abc(line, opcode, a, b, 0);
        Ok(())
    }

    // ── Calls ────────────────────────────────────────────────────────────────

    /// Evaluate callee (and receiver for method calls) into `a`, arguments
    /// into the registers above it. Returns the argument count, -1 when the
    /// last argument expands to all its values.
    fn prep_func_call(
        &mut self,
        func: &Expr,
        method: Option<&str>,
        args: &CallArgs,
        line: u32,
        a: i32,
    ) -> Result<i32, LuaError> {
        self.compile_exp(func, a, 1)?;

        let is_method = method.is_some();
        if let Some(name) = method {
            // reserve the slot SELF fills with the receiver
            self.fi().alloc_reg()?;
            let k = LuaValue::LuaString(name.to_owned());
            let idx = self.fi().index_of_constant(&k);
            if idx as u32 <= MAXINDEXRK {
                let c = rk_const(idx as u32) as i32;
                self.fi().emit_self(line, a, a, c);
            } else {
                let tmp = self.fi().alloc_reg()?;
                self.fi().emit_load_k(line, tmp, &k);
                self.fi().emit_self(line, a, a, tmp);
                self.fi().free_reg()?;
            }
        }

        let mut n_args;
        let mut last_is_multi = false;
        match args {
            CallArgs::Exprs(exprs) => {
                n_args = exprs.len() as i32;
                for (i, arg) in exprs.iter().enumerate() {
                    let tmp = self.fi().alloc_reg()?;
                    if i as i32 == n_args - 1 && arg.is_multivalue() {
                        last_is_multi = true;
                        self.compile_exp(arg, tmp, -1)?;
                    } else {
                        self.compile_exp(arg, tmp, 1)?;
                    }
                }
                self.fi().free_regs(n_args)?;
            }
            CallArgs::Table(fields) => {
                n_args = 1;
                let tmp = self.fi().alloc_reg()?;
                self.compile_table_constructor(fields, tmp, line)?;
                self.fi().free_reg()?;
            }
            CallArgs::String(s) => {
                n_args = 1;
                let tmp = self.fi().alloc_reg()?;
                let k = LuaValue::LuaString(s.clone());
                self.fi().emit_load_k(line, tmp, &k);
                self.fi().free_reg()?;
            }
        }

        if is_method {
            self.fi().free_reg()?;
            n_args += 1;
        }
        if last_is_multi {
            n_args = -1;
        }
        Ok(n_args)
    }

    pub(crate) fn compile_tail_call(&mut self, e: &Expr, a: i32) -> Result<(), LuaError> {
        match e {
            Expr::FnCall { func, args, line } => {
                let n_args = self.prep_func_call(func, None, args, *line, a)?;
                self.fi().emit_tail_call(*line, a, n_args);
                Ok(())
            }
            Expr::MethodCall {
                obj,
                method,
                args,
                line,
            } => {
                let n_args = self.prep_func_call(obj, Some(method), args, *line, a)?;
                self.fi().emit_tail_call(*line, a, n_args);
                Ok(())
            }
            // only call expressions are routed here
            _ => self.compile_exp(e, a, 1),
        }
    }

    // ── Table constructors ───────────────────────────────────────────────────

    pub(crate) fn compile_table_constructor(
        &mut self,
        fields: &[Field],
        a: i32,
        line: u32,
    ) -> Result<(), LuaError> {
        let n_arr = fields
            .iter()
            .filter(|f| matches!(f, Field::Positional(_)))
            .count() as i32;
        let mult_ret = matches!(fields.last(), Some(Field::Positional(e)) if e.is_multivalue());

        self.fi()
            .emit_new_table(line, a, n_arr, fields.len() as i32 - n_arr);

        let mut arr_idx = 0i32;
        for (i, field) in fields.iter().enumerate() {
            match field {
                Field::Positional(val) => {
                    arr_idx += 1;
                    let tmp = self.fi().alloc_reg()?;
                    let is_last = i == fields.len() - 1;
                    if is_last && mult_ret {
                        self.compile_exp(val, tmp, -1)?;
                    } else {
                        self.compile_exp(val, tmp, 1)?;
                    }

                    // flush full batches of 50 and the final partial batch
                    if arr_idx % 50 == 0 || arr_idx == n_arr {
                        let mut n = arr_idx % 50;
                        if n == 0 {
                            n = 50;
                        }
                        self.fi().free_regs(n)?;
                        let c = (arr_idx - 1) / 50 + 1;
                        let val_line = val.line();
                        if is_last && mult_ret {
                            self.fi().emit_set_list(val_line, a, 0, c);
                        } else {
                            self.fi().emit_set_list(val_line, a, n, c);
                        }
                    }
                }
                Field::Named(name, val) => {
                    let b = self.fi().alloc_reg()?;
                    let k = LuaValue::LuaString(name.clone());
                    self.fi().emit_load_k(line, b, &k);
                    let c = self.fi().alloc_reg()?;
                    self.compile_exp(val, c, 1)?;
                    self.fi().free_regs(2)?;
                    self.fi().emit_set_table(val.line(), a, b, c);
                }
                Field::Index(key, val) => {
                    let b = self.fi().alloc_reg()?;
                    self.compile_exp(key, b, 1)?;
                    let c = self.fi().alloc_reg()?;
                    self.compile_exp(val, c, 1)?;
                    self.fi().free_regs(2)?;
                    self.fi().emit_set_table(val.line(), a, b, c);
                }
            }
        }
        Ok(())
    }

    // ── Operand packing ──────────────────────────────────────────────────────

    /// Turn `e` into an instruction operand of one of the `kinds`. Falls back
    /// to evaluating into a fresh register, which the caller releases by
    /// restoring `used_regs`.
    pub(crate) fn exp_to_op_arg(
        &mut self,
        e: &Expr,
        kinds: u8,
    ) -> Result<(i32, ArgKind), LuaError> {
        if kinds & ARG_CONST != 0 {
            let k = match e {
                Expr::Nil(_) => Some(LuaValue::Nil),
                Expr::True(_) => Some(LuaValue::Boolean(true)),
                Expr::False(_) => Some(LuaValue::Boolean(false)),
                Expr::Integer(v, _) => Some(LuaValue::Integer(*v)),
                Expr::Float(v, _) => Some(LuaValue::Float(*v)),
                Expr::LuaString(s, _) => Some(LuaValue::LuaString(s.clone())),
                _ => None,
            };
            if let Some(k) = k {
                let idx = self.fi().index_of_constant(&k);
                if idx as u32 <= MAXINDEXRK {
                    return Ok((rk_const(idx as u32) as i32, ArgKind::Const));
                }
            }
        }

        if let Expr::Name(name, _) = e {
            if kinds & ARG_REG != 0 {
                if let Some(r) = self.fi().slot_of_loc_var(name) {
                    return Ok((r, ArgKind::Reg));
                }
            }
            if kinds & ARG_UPVAL != 0 {
                if let Some(idx) = self.resolve_upvalue(name)? {
                    return Ok((idx, ArgKind::Upval));
                }
            }
        }

        let a = self.fi().alloc_reg()?;
        self.compile_exp(e, a, 1)?;
        Ok((a, ArgKind::Reg))
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

    fn find(chunk: &Chunk, op: OpCode) -> luna_core::Instruction {
        chunk
            .proto
            .code
            .iter()
            .find(|i| i.opcode() == Some(op))
            .copied()
            .unwrap()
    }

    #[test]
    fn concat_chain_collapses_into_one_instruction() {
        let chunk = compile("local s = \"a\" .. \"b\" .. \"c\"");
        let concats = opcodes(&chunk)
            .iter()
            .filter(|&&o| o == "CONCAT")
            .count();
        assert_eq!(concats, 1);
        let cat = find(&chunk, OpCode::Concat);
        assert_eq!((cat.a(), cat.b(), cat.c()), (0, 1, 3));
    }

    #[test]
    fn arithmetic_packs_constants_as_rk_operands() {
        let chunk = compile("local x = 1 + 2");
        let add = find(&chunk, OpCode::Add);
        assert_eq!((add.b(), add.c()), (0x100, 0x101));
    }

    #[test]
    fn greater_than_swaps_into_less_than() {
        let chunk = compile("return 2 > 1");
        let lt = find(&chunk, OpCode::Lt);
        // operands swapped: `2 > 1` tests `1 < 2`
        assert_eq!((lt.a(), lt.b(), lt.c()), (1, 0x101, 0x100));
    }

    #[test]
    fn not_equal_inverts_the_test_flag() {
        let chunk = compile("return 1 ~= 2");
        let eq = find(&chunk, OpCode::Eq);
        assert_eq!(eq.a(), 0);
    }

    #[test]
    fn unary_operators_map_to_their_opcodes() {
        let chunk = compile("local a\nlocal b = -a\nlocal c = not a\nlocal d = #a\nlocal e = ~a");
        let ops = opcodes(&chunk);
        assert!(ops.contains(&"UNM"));
        assert!(ops.contains(&"NOT"));
        assert!(ops.contains(&"LEN"));
        assert!(ops.contains(&"BNOT"));
    }

    #[test]
    fn field_access_uses_a_constant_key() {
        let chunk = compile("local t\nlocal x = t.name");
        let get = find(&chunk, OpCode::GetTable);
        assert_eq!(get.b(), 0);
        assert_eq!(get.c(), 0x100);
    }

    #[test]
    fn global_read_goes_through_env() {
        let chunk = compile("return x");
        assert_eq!(opcodes(&chunk), vec!["GETTABUP", "RETURN", "RETURN"]);
        let get = chunk.proto.code[0];
        assert_eq!((get.a(), get.b(), get.c()), (0, 0, 0x100));
    }

    #[test]
    fn or_expression_sets_testset_flag() {
        let chunk = compile("local a, b\nlocal c = a or b");
        let ts = find(&chunk, OpCode::TestSet);
        assert_eq!(ts.c(), 1);
    }

    #[test]
    fn table_call_sugar_builds_the_table_argument() {
        let chunk = compile("f{1}");
        let ops = opcodes(&chunk);
        assert!(ops.contains(&"NEWTABLE"));
        assert!(ops.contains(&"SETLIST"));
        let call = find(&chunk, OpCode::Call);
        assert_eq!(call.b(), 2);
    }

    #[test]
    fn string_call_sugar_loads_the_string_argument() {
        let chunk = compile("f\"hi\"");
        let call = find(&chunk, OpCode::Call);
        assert_eq!(call.b(), 2);
        let ops = opcodes(&chunk);
        assert!(ops.contains(&"LOADK"));
    }

    #[test]
    fn inner_call_expands_into_outer_argument_list() {
        let chunk = compile("f(g())");
        let calls: Vec<_> = chunk
            .proto
            .code
            .iter()
            .filter(|i| i.opcode() == Some(OpCode::Call))
            .collect();
        assert_eq!(calls.len(), 2);
        // inner g() keeps all results, outer f consumes them all
        assert_eq!(calls[0].c(), 0);
        assert_eq!(calls[1].b(), 0);
    }

    #[test]
    fn method_name_lands_in_the_constant_pool() {
        let chunk = compile("local t\nt:m()");
        let self_op = find(&chunk, OpCode::SelfOp);
        assert_eq!(self_op.c(), 0x100);
    }

    #[test]
    fn vararg_in_value_list_is_pinned_to_one() {
        let chunk = compile("local a, b = ..., 1");
        let va = find(&chunk, OpCode::VarArg);
        // exactly one value
        assert_eq!(va.b(), 2);
    }

    #[test]
    fn keyed_fields_emit_settable() {
        let chunk = compile("local t = { x = 1, [2] = 3 }");
        let sets = chunk
            .proto
            .code
            .iter()
            .filter(|i| i.opcode() == Some(OpCode::SetTable))
            .count();
        assert_eq!(sets, 2);
    }

    #[test]
    fn trailing_call_in_constructor_expands() {
        let chunk = compile("local t = { 1, f() }");
        let sl = find(&chunk, OpCode::SetList);
        // B = 0: every value up to the stack top
        assert_eq!(sl.b(), 0);
    }

    #[test]
    fn nested_constructor_allocates_nested_tables() {
        let chunk = compile("local t = { inner = {} }");
        let news = chunk
            .proto
            .code
            .iter()
            .filter(|i| i.opcode() == Some(OpCode::NewTable))
            .count();
        assert_eq!(news, 2);
    }

    #[test]
    fn generated_moves_never_copy_in_place() {
        let chunk = compile("local a = 1 local b = a a = b b = a return a, b");
        for inst in &chunk.proto.code {
            if inst.opcode() == Some(OpCode::Move) {
                assert_ne!(inst.a(), inst.b());
            }
        }
    }
}
