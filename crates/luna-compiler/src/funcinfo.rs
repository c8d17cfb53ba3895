//! Per-function code generation state: registers, scopes, locals, constants,
//! upvalues and the growing instruction list.

use luna_core::{int2fb, Instruction, LocVar, LuaError, LuaValue, OpCode, Prototype, UpvalueDesc};
use luna_core::{MAXARG_C, MAXARG_SBX};
use rustc_hash::FxHashMap;
use std::sync::Arc;

// ── Local variables ──────────────────────────────────────────────────────────

/// One declared local. Bindings for the same name chain through `prev` so
/// shadowing restores the older binding on scope exit.
pub(crate) struct LocVarInfo {
    pub name: String,
    pub prev: Option<usize>,
    pub scope_lv: i32,
    pub slot: u8,
    pub start_pc: u32,
    pub end_pc: u32,
    pub captured: bool,
}

/// An upvalue of the function being compiled, in slot order.
pub(crate) struct UpvalInfo {
    pub name: String,
    pub desc: UpvalueDesc,
}

// ── Constant pool keys ───────────────────────────────────────────────────────

/// Hash key for constant deduplication. Integers and floats are distinct
/// subtypes, so `1` and `1.0` occupy separate pool slots.
#[derive(Hash, PartialEq, Eq)]
enum ConstKey {
    Nil,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(String),
}

impl ConstKey {
    fn of(v: &LuaValue) -> ConstKey {
        match v {
            LuaValue::Nil => ConstKey::Nil,
            LuaValue::Boolean(b) => ConstKey::Bool(*b),
            LuaValue::Integer(i) => ConstKey::Int(*i),
            LuaValue::Float(f) => {
                // -0.0 shares a slot with 0.0
                let f = if *f == 0.0 { 0.0 } else { *f };
                ConstKey::Float(f.to_bits())
            }
            LuaValue::LuaString(s) => ConstKey::Str(s.clone()),
            // Reference types never reach the constant pool; key them as nil.
            _ => ConstKey::Nil,
        }
    }
}

// ── FuncInfo ─────────────────────────────────────────────────────────────────

/// Code generation state for a single function body.
pub(crate) struct FuncInfo {
    pub used_regs: i32,
    pub max_regs: i32,
    scope_lv: i32,
    /// Every local ever declared, in declaration order (becomes debug info).
    pub loc_vars: Vec<LocVarInfo>,
    /// Name → index of the binding currently in scope.
    loc_names: FxHashMap<String, usize>,
    /// Per scope level: pending break-jump pcs, `None` for unbreakable scopes.
    breaks: Vec<Option<Vec<i32>>>,
    pub constants: Vec<LuaValue>,
    const_index: FxHashMap<ConstKey, usize>,
    pub upvalues: Vec<UpvalInfo>,
    pub insts: Vec<Instruction>,
    pub line_info: Vec<u32>,
    pub sub_protos: Vec<Arc<Prototype>>,
    pub num_params: u8,
    pub is_vararg: bool,
    line_defined: u32,
    last_line_defined: u32,
}

impl FuncInfo {
    pub fn new(num_params: u8, is_vararg: bool, line_defined: u32, last_line_defined: u32) -> Self {
        Self {
            used_regs: 0,
            max_regs: 0,
            scope_lv: 0,
            loc_vars: Vec::new(),
            loc_names: FxHashMap::default(),
            breaks: vec![None],
            constants: Vec::new(),
            const_index: FxHashMap::default(),
            upvalues: Vec::new(),
            insts: Vec::new(),
            line_info: Vec::new(),
            sub_protos: Vec::new(),
            num_params,
            is_vararg,
            line_defined,
            last_line_defined,
        }
    }

    /// Approximate source position for errors raised outside any statement.
    fn cur_line(&self) -> u32 {
        self.line_info.last().copied().unwrap_or(0)
    }

    // ── Registers ────────────────────────────────────────────────────────────

    pub fn alloc_reg(&mut self) -> Result<i32, LuaError> {
        self.used_regs += 1;
        if self.used_regs > 255 {
            return Err(LuaError::compile(
                self.cur_line(),
                "function or expression needs too many registers",
            ));
        }
        if self.used_regs > self.max_regs {
            self.max_regs = self.used_regs;
        }
        Ok(self.used_regs - 1)
    }

    pub fn free_reg(&mut self) -> Result<(), LuaError> {
        self.used_regs -= 1;
        if self.used_regs < 0 {
            return Err(LuaError::Internal("register pool underflow".into()));
        }
        Ok(())
    }

    /// Allocate `n` consecutive registers and return the first index.
    pub fn alloc_regs(&mut self, n: i32) -> Result<i32, LuaError> {
        for _ in 0..n {
            self.alloc_reg()?;
        }
        Ok(self.used_regs - n)
    }

    pub fn free_regs(&mut self, n: i32) -> Result<(), LuaError> {
        for _ in 0..n {
            self.free_reg()?;
        }
        Ok(())
    }

    // ── Scopes & locals ──────────────────────────────────────────────────────

    pub fn enter_scope(&mut self, breakable: bool) {
        self.scope_lv += 1;
        self.breaks.push(if breakable { Some(Vec::new()) } else { None });
    }

    /// Leave the current scope: patch pending breaks, retire the scope's
    /// locals (newest registers first) and stamp their end pc.
    pub fn exit_scope(&mut self, end_pc: i32) -> Result<(), LuaError> {
        let pending = self.breaks.pop().unwrap_or(None);
        if let Some(jmps) = pending {
            let a = self.jmp_arg_a();
            for pc in jmps {
                let sbx = self.pc() - pc;
                self.insts[pc as usize] = Instruction::asbx(OpCode::Jmp, a as u32, sbx);
            }
        }

        self.scope_lv -= 1;
        let dead: Vec<usize> = self
            .loc_names
            .values()
            .copied()
            .filter(|&i| self.loc_vars[i].scope_lv > self.scope_lv)
            .collect();
        for idx in dead {
            self.loc_vars[idx].end_pc = end_pc.max(0) as u32;
            self.remove_loc_var(idx)?;
        }
        Ok(())
    }

    fn remove_loc_var(&mut self, idx: usize) -> Result<(), LuaError> {
        self.free_reg()?;
        let (name, scope_lv, prev) = {
            let lv = &self.loc_vars[idx];
            (lv.name.clone(), lv.scope_lv, lv.prev)
        };
        match prev {
            None => {
                self.loc_names.remove(&name);
            }
            // A same-scope shadowed binding holds its own register; retire it too.
            Some(p) if self.loc_vars[p].scope_lv == scope_lv => {
                self.remove_loc_var(p)?;
            }
            Some(p) => {
                self.loc_names.insert(name, p);
            }
        }
        Ok(())
    }

    /// Bind `name` to a fresh register, shadowing any visible binding.
    pub fn add_loc_var(&mut self, name: &str, start_pc: i32) -> Result<i32, LuaError> {
        let slot = self.alloc_reg()?;
        let idx = self.loc_vars.len();
        self.loc_vars.push(LocVarInfo {
            name: name.to_owned(),
            prev: self.loc_names.get(name).copied(),
            scope_lv: self.scope_lv,
            slot: slot as u8,
            start_pc: start_pc.max(0) as u32,
            end_pc: 0,
            captured: false,
        });
        self.loc_names.insert(name.to_owned(), idx);
        Ok(slot)
    }

    pub fn slot_of_loc_var(&self, name: &str) -> Option<i32> {
        self.loc_names.get(name).map(|&i| self.loc_vars[i].slot as i32)
    }

    /// Index into `loc_vars` of the binding currently visible under `name`.
    pub fn active_binding(&self, name: &str) -> Option<usize> {
        self.loc_names.get(name).copied()
    }

    pub fn mark_captured(&mut self, idx: usize) {
        self.loc_vars[idx].captured = true;
    }

    /// Extend the recorded lifetime of the most recent local named `name`.
    pub fn fix_end_pc(&mut self, name: &str, delta: u32) {
        for lv in self.loc_vars.iter_mut().rev() {
            if lv.name == name {
                lv.end_pc += delta;
                return;
            }
        }
    }

    // ── Break jumps ──────────────────────────────────────────────────────────

    /// Register a pending break jump with the innermost breakable scope.
    pub fn add_break_jmp(&mut self, pc: i32, line: u32) -> Result<(), LuaError> {
        for slot in self.breaks.iter_mut().rev() {
            if let Some(list) = slot {
                list.push(pc);
                return Ok(());
            }
        }
        Err(LuaError::compile(line, "break outside a loop"))
    }

    /// JMP argument A for jumps leaving the current scope: index+1 of the
    /// lowest named local slot if any local here was captured, else 0.
    pub fn jmp_arg_a(&self) -> i32 {
        let mut has_captured = false;
        let mut min_slot = self.max_regs;
        for &idx in self.loc_names.values() {
            if self.loc_vars[idx].scope_lv != self.scope_lv {
                continue;
            }
            let mut v = Some(idx);
            while let Some(i) = v {
                let lv = &self.loc_vars[i];
                if lv.scope_lv != self.scope_lv {
                    break;
                }
                if lv.captured {
                    has_captured = true;
                }
                if (lv.slot as i32) < min_slot && !lv.name.starts_with('(') {
                    min_slot = lv.slot as i32;
                }
                v = lv.prev;
            }
        }
        if has_captured {
            min_slot + 1
        } else {
            0
        }
    }

    /// Emit a close-upvalues JMP if the current scope captured any locals.
    /// Returns the pc of the emitted jump, or -1 if none was needed.
    pub fn close_open_upvals(&mut self, line: u32) -> i32 {
        let a = self.jmp_arg_a();
        if a > 0 {
            self.emit_jmp(line, a, 0)
        } else {
            -1
        }
    }

    // ── Constants ────────────────────────────────────────────────────────────

    pub fn index_of_constant(&mut self, v: &LuaValue) -> usize {
        let key = ConstKey::of(v);
        if let Some(&idx) = self.const_index.get(&key) {
            return idx;
        }
        let idx = self.constants.len();
        self.constants.push(v.clone());
        self.const_index.insert(key, idx);
        idx
    }

    // ── Upvalues ─────────────────────────────────────────────────────────────

    pub fn upvalue_index(&self, name: &str) -> Option<i32> {
        self.upvalues
            .iter()
            .position(|u| u.name == name)
            .map(|i| i as i32)
    }

    pub fn add_upvalue(&mut self, name: &str, desc: UpvalueDesc) -> Result<i32, LuaError> {
        if self.upvalues.len() >= 255 {
            return Err(LuaError::compile(self.cur_line(), "too many upvalues"));
        }
        self.upvalues.push(UpvalInfo {
            name: name.to_owned(),
            desc,
        });
        Ok(self.upvalues.len() as i32 - 1)
    }

    // ── Instruction emission ─────────────────────────────────────────────────

    /// Index of the last emitted instruction (-1 while empty).
    pub fn pc(&self) -> i32 {
        self.insts.len() as i32 - 1
    }

    fn emit(&mut self, line: u32, inst: Instruction) {
        self.insts.push(inst);
        self.line_info.push(line);
    }

    pub fn emit_abc(&mut self, line: u32, op: OpCode, a: i32, b: i32, c: i32) {
        self.emit(line, Instruction::abc(op, a as u32, b as u32, c as u32));
    }

    pub fn emit_abx(&mut self, line: u32, op: OpCode, a: i32, bx: i32) {
        self.emit(line, Instruction::abx(op, a as u32, bx as u32));
    }

    pub fn emit_asbx(&mut self, line: u32, op: OpCode, a: i32, sbx: i32) {
        self.emit(line, Instruction::asbx(op, a as u32, sbx));
    }

    pub fn emit_ax(&mut self, line: u32, op: OpCode, ax: i32) {
        self.emit(line, Instruction::iax(op, ax as u32));
    }

    /// Rewrite the sBx field of the jump at `pc` once its target is known.
    pub fn fix_sbx(&mut self, pc: i32, sbx: i32) -> Result<(), LuaError> {
        if !(-MAXARG_SBX..=MAXARG_SBX).contains(&sbx) {
            return Err(LuaError::compile(
                self.line_info.get(pc as usize).copied().unwrap_or(0),
                "control structure too long",
            ));
        }
        self.insts[pc as usize].set_sbx(sbx);
        Ok(())
    }

    pub fn emit_move(&mut self, line: u32, a: i32, b: i32) {
        self.emit_abc(line, OpCode::Move, a, b, 0);
    }

    /// Load `n` nils starting at register `a`.
    pub fn emit_load_nil(&mut self, line: u32, a: i32, n: i32) {
        self.emit_abc(line, OpCode::LoadNil, a, n - 1, 0);
    }

    pub fn emit_load_bool(&mut self, line: u32, a: i32, b: i32, c: i32) {
        self.emit_abc(line, OpCode::LoadBool, a, b, c);
    }

    /// Load constant `k`, falling back to LOADKX + EXTRAARG for pool indices
    /// beyond the 18-bit Bx range.
    pub fn emit_load_k(&mut self, line: u32, a: i32, k: &LuaValue) {
        let idx = self.index_of_constant(k);
        if idx < (1 << 18) {
            self.emit_abx(line, OpCode::LoadK, a, idx as i32);
        } else {
            self.emit_abx(line, OpCode::LoadKx, a, 0);
            self.emit_ax(line, OpCode::ExtraArg, idx as i32);
        }
    }

    pub fn emit_vararg(&mut self, line: u32, a: i32, n: i32) {
        self.emit_abc(line, OpCode::VarArg, a, n + 1, 0);
    }

    pub fn emit_closure(&mut self, line: u32, a: i32, bx: i32) {
        self.emit_abx(line, OpCode::Closure, a, bx);
    }

    pub fn emit_new_table(&mut self, line: u32, a: i32, n_arr: i32, n_rec: i32) {
        self.emit_abc(
            line,
            OpCode::NewTable,
            a,
            int2fb(n_arr as u32) as i32,
            int2fb(n_rec as u32) as i32,
        );
    }

    /// Flush a SETLIST batch; a batch number past the C width goes into a
    /// following EXTRAARG with C left zero.
    pub fn emit_set_list(&mut self, line: u32, a: i32, b: i32, c: i32) {
        if c as u32 <= MAXARG_C {
            self.emit_abc(line, OpCode::SetList, a, b, c);
        } else {
            self.emit_abc(line, OpCode::SetList, a, b, 0);
            self.emit_ax(line, OpCode::ExtraArg, c);
        }
    }

    pub fn emit_get_table(&mut self, line: u32, a: i32, b: i32, c: i32) {
        self.emit_abc(line, OpCode::GetTable, a, b, c);
    }

    pub fn emit_set_table(&mut self, line: u32, a: i32, b: i32, c: i32) {
        self.emit_abc(line, OpCode::SetTable, a, b, c);
    }

    pub fn emit_get_tab_up(&mut self, line: u32, a: i32, b: i32, c: i32) {
        self.emit_abc(line, OpCode::GetTabUp, a, b, c);
    }

    pub fn emit_set_tab_up(&mut self, line: u32, a: i32, b: i32, c: i32) {
        self.emit_abc(line, OpCode::SetTabUp, a, b, c);
    }

    pub fn emit_get_upval(&mut self, line: u32, a: i32, b: i32) {
        self.emit_abc(line, OpCode::GetUpval, a, b, 0);
    }

    /// `UpValue[b] := R(a)`
    pub fn emit_set_upval(&mut self, line: u32, a: i32, b: i32) {
        self.emit_abc(line, OpCode::SetUpval, a, b, 0);
    }

    pub fn emit_self(&mut self, line: u32, a: i32, b: i32, c: i32) {
        self.emit_abc(line, OpCode::SelfOp, a, b, c);
    }

    pub fn emit_test(&mut self, line: u32, a: i32, c: i32) {
        self.emit_abc(line, OpCode::Test, a, 0, c);
    }

    pub fn emit_test_set(&mut self, line: u32, a: i32, b: i32, c: i32) {
        self.emit_abc(line, OpCode::TestSet, a, b, c);
    }

    pub fn emit_for_prep(&mut self, line: u32, a: i32, sbx: i32) -> i32 {
        self.emit_asbx(line, OpCode::ForPrep, a, sbx);
        self.pc()
    }

    pub fn emit_for_loop(&mut self, line: u32, a: i32, sbx: i32) -> i32 {
        self.emit_asbx(line, OpCode::ForLoop, a, sbx);
        self.pc()
    }

    pub fn emit_t_for_call(&mut self, line: u32, a: i32, c: i32) {
        self.emit_abc(line, OpCode::TForCall, a, 0, c);
    }

    pub fn emit_t_for_loop(&mut self, line: u32, a: i32, sbx: i32) {
        self.emit_asbx(line, OpCode::TForLoop, a, sbx);
    }

    pub fn emit_jmp(&mut self, line: u32, a: i32, sbx: i32) -> i32 {
        self.emit_asbx(line, OpCode::Jmp, a, sbx);
        self.pc()
    }

    /// `n_args` / `n_ret` use -1 for "all available".
    pub fn emit_call(&mut self, line: u32, a: i32, n_args: i32, n_ret: i32) {
        self.emit_abc(line, OpCode::Call, a, n_args + 1, n_ret + 1);
    }

    pub fn emit_tail_call(&mut self, line: u32, a: i32, n_args: i32) {
        self.emit_abc(line, OpCode::TailCall, a, n_args + 1, 0);
    }

    pub fn emit_return(&mut self, line: u32, a: i32, n: i32) {
        self.emit_abc(line, OpCode::Return, a, n + 1, 0);
    }

    // ── Finishing ────────────────────────────────────────────────────────────

    /// Freeze this function into an immutable [`Prototype`].
    pub fn into_proto(self, source: &str) -> Prototype {
        let mut upvalue_descs = Vec::with_capacity(self.upvalues.len());
        let mut upvalue_names = Vec::with_capacity(self.upvalues.len());
        for u in self.upvalues {
            upvalue_descs.push(u.desc);
            upvalue_names.push(u.name);
        }
        Prototype {
            source: source.to_owned(),
            line_defined: self.line_defined,
            last_line_defined: if self.line_defined == 0 {
                0
            } else {
                self.last_line_defined
            },
            num_params: self.num_params,
            is_vararg: self.is_vararg,
            // Call frames always reserve at least two slots.
            max_stack_size: self.max_regs.max(2) as u8,
            code: self.insts,
            constants: self.constants,
            upvalues: upvalue_descs,
            protos: self.sub_protos,
            line_info: self.line_info,
            loc_vars: self
                .loc_vars
                .into_iter()
                .map(|lv| LocVar {
                    name: lv.name,
                    start_pc: lv.start_pc,
                    end_pc: lv.end_pc,
                })
                .collect(),
            upvalue_names,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn fi() -> FuncInfo {
        FuncInfo::new(0, false, 0, 0)
    }

    #[test]
    fn alloc_and_free_track_high_water_mark() {
        let mut f = fi();
        assert_eq!(f.alloc_reg().unwrap(), 0);
        assert_eq!(f.alloc_reg().unwrap(), 1);
        f.free_reg().unwrap();
        assert_eq!(f.alloc_reg().unwrap(), 1);
        assert_eq!(f.used_regs, 2);
        assert_eq!(f.max_regs, 2);
    }

    #[test]
    fn alloc_past_register_limit_is_an_error() {
        let mut f = fi();
        for _ in 0..255 {
            f.alloc_reg().unwrap();
        }
        let err = f.alloc_reg().unwrap_err();
        assert!(matches!(err, LuaError::Compile { .. }));
        assert!(err.to_string().contains("too many registers"));
    }

    #[test]
    fn free_below_zero_is_an_internal_error() {
        let mut f = fi();
        assert!(matches!(f.free_reg(), Err(LuaError::Internal(_))));
    }

    #[test]
    fn scope_exit_frees_locals_and_restores_shadowed_binding() {
        let mut f = fi();
        f.enter_scope(false);
        let outer = f.add_loc_var("x", 0).unwrap();
        f.enter_scope(false);
        let inner = f.add_loc_var("x", 0).unwrap();
        assert_ne!(outer, inner);
        assert_eq!(f.slot_of_loc_var("x"), Some(inner));
        f.exit_scope(0).unwrap();
        assert_eq!(f.slot_of_loc_var("x"), Some(outer));
        assert_eq!(f.used_regs, 1);
    }

    #[test]
    fn same_scope_shadowing_frees_both_registers() {
        let mut f = fi();
        f.enter_scope(false);
        f.add_loc_var("x", 0).unwrap();
        f.add_loc_var("x", 0).unwrap();
        assert_eq!(f.used_regs, 2);
        f.exit_scope(0).unwrap();
        assert_eq!(f.used_regs, 0);
        assert_eq!(f.slot_of_loc_var("x"), None);
    }

    #[test]
    fn constants_deduplicate_by_subtype() {
        let mut f = fi();
        let a = f.index_of_constant(&LuaValue::Integer(1));
        let b = f.index_of_constant(&LuaValue::Float(1.0));
        let c = f.index_of_constant(&LuaValue::Integer(1));
        assert_ne!(a, b);
        assert_eq!(a, c);
        assert_eq!(f.constants.len(), 2);
    }

    #[test]
    fn string_constants_deduplicate() {
        let mut f = fi();
        let a = f.index_of_constant(&LuaValue::LuaString("k".into()));
        let b = f.index_of_constant(&LuaValue::LuaString("k".into()));
        assert_eq!(a, b);
    }

    #[test]
    fn break_jump_is_patched_on_scope_exit() {
        let mut f = fi();
        f.enter_scope(true);
        let pc = f.emit_jmp(1, 0, 0);
        f.add_break_jmp(pc, 1).unwrap();
        f.emit_move(1, 0, 0);
        f.emit_move(1, 0, 0);
        f.exit_scope(f.pc()).unwrap();
        // break lands just past the last emitted instruction
        assert_eq!(f.insts[pc as usize].sbx(), 2);
    }

    #[test]
    fn break_outside_loop_is_an_error() {
        let mut f = fi();
        f.enter_scope(false);
        let err = f.add_break_jmp(0, 7).unwrap_err();
        assert_eq!(
            err,
            LuaError::Compile {
                line: 7,
                message: "break outside a loop".into()
            }
        );
    }

    #[test]
    fn jmp_arg_a_reflects_captured_locals() {
        let mut f = fi();
        f.enter_scope(false);
        f.add_loc_var("a", 0).unwrap();
        let idx = f.active_binding("b_placeholder");
        assert!(idx.is_none());
        assert_eq!(f.jmp_arg_a(), 0);
        let b = f.active_binding("a").unwrap();
        f.mark_captured(b);
        assert_eq!(f.jmp_arg_a(), 1);
    }

    #[test]
    fn hidden_loop_vars_do_not_lower_jmp_arg_a() {
        let mut f = fi();
        f.enter_scope(true);
        f.add_loc_var("(for index)", 0).unwrap();
        f.add_loc_var("i", 0).unwrap();
        let b = f.active_binding("i").unwrap();
        f.mark_captured(b);
        assert_eq!(f.jmp_arg_a(), 2);
    }

    #[test]
    fn load_k_switches_to_loadkx_past_bx_range() {
        let mut f = fi();
        for i in 0..(1 << 18) {
            f.index_of_constant(&LuaValue::Integer(i));
        }
        f.emit_load_k(1, 0, &LuaValue::Integer(1 << 18));
        let n = f.insts.len();
        assert_eq!(f.insts[n - 2].opcode(), Some(OpCode::LoadKx));
        assert_eq!(f.insts[n - 1].opcode(), Some(OpCode::ExtraArg));
        assert_eq!(f.insts[n - 1].ax(), 1 << 18);
    }

    #[test]
    fn set_list_spills_large_batch_numbers_into_extraarg() {
        let mut f = fi();
        f.emit_set_list(1, 0, 50, MAXARG_C as i32);
        assert_eq!(f.insts.len(), 1);
        assert_eq!(f.insts[0].c(), MAXARG_C);

        f.emit_set_list(1, 0, 50, MAXARG_C as i32 + 1);
        let n = f.insts.len();
        assert_eq!(f.insts[n - 2].opcode(), Some(OpCode::SetList));
        assert_eq!(f.insts[n - 2].c(), 0);
        assert_eq!(f.insts[n - 1].opcode(), Some(OpCode::ExtraArg));
        assert_eq!(f.insts[n - 1].ax(), MAXARG_C + 1);
    }

    #[test]
    fn fix_sbx_rejects_overlong_jumps() {
        let mut f = fi();
        let pc = f.emit_jmp(1, 0, 0);
        assert!(f.fix_sbx(pc, MAXARG_SBX).is_ok());
        assert!(f.fix_sbx(pc, MAXARG_SBX + 1).is_err());
    }

    #[test]
    fn into_proto_reserves_two_stack_slots_minimum() {
        let f = fi();
        let proto = f.into_proto("@t");
        assert_eq!(proto.max_stack_size, 2);
        assert_eq!(proto.last_line_defined, 0);
    }
}
