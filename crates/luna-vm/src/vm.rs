//! The register-window interpreter.
//!
//! One flat register file backs every activation. A frame owns the window
//! starting at its `base`; a callee's window begins right past its caller's
//! declared `max_stack_size`. Arguments are collected into a `Vec` before the
//! callee frame is pushed, so transient window overlap from multi-value
//! spills can never alias live data.
//!
//! Multi-value sequences use a water mark: an all-results `CALL` or `VARARG`
//! records one past the last written register in `top`, and the immediately
//! following `B=0`/`C=0` consumer reads it back. The code generator
//! guarantees producer and consumer are adjacent.

use std::sync::{Arc, RwLock};

use luna_compiler::{compile, Chunk};
use luna_core::{
    fb2int, is_rk_const, rk_index, LuaClosure, LuaError, LuaTable, LuaValue, OpCode, Prototype,
    Upvalue, UpvalueDesc, UpvalueInner,
};

use crate::ops;

/// Frames deeper than this raise "stack overflow".
const MAX_CALL_DEPTH: usize = 200;

/// Array batch size for SETLIST, fixed by the code generator.
const FIELDS_PER_FLUSH: usize = 50;

/// Registers reserved past a frame's base. Covers the farthest in-window
/// access an instruction word can name — an A operand (≤ 255) plus a
/// B-counted run (≤ 511), as in LOADNIL — so indexing never goes out of
/// bounds even for hand-built chunks.
const WINDOW_SLACK: usize = 768;

/// One activation record. `ret_reg` and `want` say where the caller expects
/// results and how many (-1 for all).
struct Frame {
    closure: Arc<LuaClosure>,
    ip: usize,
    base: usize,
    ret_reg: usize,
    want: i32,
    varargs: Vec<LuaValue>,
}

/// An interpreter instance: a global table plus the machinery to run
/// compiled chunks against it.
pub struct Vm {
    globals: Arc<RwLock<LuaTable>>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// A fresh machine with the base library already in its globals.
    pub fn new() -> Self {
        let mut table = LuaTable::new();
        crate::stdlib::register(&mut table);
        Vm {
            globals: Arc::new(RwLock::new(table)),
        }
    }

    /// Wraps a compiled chunk as a callable closure whose `_ENV` upvalue is
    /// this machine's global table.
    pub fn load(&self, chunk: &Chunk) -> LuaValue {
        let env = Upvalue::closed(LuaValue::Table(self.globals.clone()));
        LuaValue::Closure(Arc::new(LuaClosure::new(chunk.proto.clone(), vec![env])))
    }

    /// Compiles and runs `src` in one step. `name` becomes the chunk source
    /// shown in error positions.
    pub fn run_source(&mut self, src: &str, name: &str) -> Result<Vec<LuaValue>, LuaError> {
        let chunk = compile(src, name)?;
        let f = self.load(&chunk);
        self.call(f, Vec::new())
    }

    /// Calls any callable value with the given arguments.
    pub fn call(&mut self, f: LuaValue, args: Vec<LuaValue>) -> Result<Vec<LuaValue>, LuaError> {
        match f {
            LuaValue::NativeFunction(nf) => nf(args),
            LuaValue::Closure(c) => self.run(c, args),
            v => Err(LuaError::Runtime(format!(
                "attempt to call a {} value",
                v.type_name()
            ))),
        }
    }

    fn run(&mut self, root: Arc<LuaClosure>, args: Vec<LuaValue>) -> Result<Vec<LuaValue>, LuaError> {
        let mut regs: Vec<LuaValue> = Vec::new();
        let mut frames: Vec<Frame> = Vec::new();
        let mut open: Vec<(usize, Upvalue)> = Vec::new();
        let mut top: usize = 0;

        push_frame(root, args, 0, -1, &mut frames, &mut regs)?;
        let result = execute(&mut regs, &mut frames, &mut open, &mut top);
        if result.is_err() {
            // Escaped closures must not keep aliasing a dead register file.
            close_upvalues_from(&mut open, 0, &regs);
        }
        result
    }
}

// ── Dispatch loop ────────────────────────────────────────────────────────────

fn execute(
    regs: &mut Vec<LuaValue>,
    frames: &mut Vec<Frame>,
    open: &mut Vec<(usize, Upvalue)>,
    top: &mut usize,
) -> Result<Vec<LuaValue>, LuaError> {
    loop {
        // Fetch under a short borrow; the arms re-borrow the frame stack.
        let (closure, pc, base) = {
            let frame = frames.last_mut().unwrap();
            let pc = frame.ip;
            frame.ip += 1;
            (frame.closure.clone(), pc, frame.base)
        };
        let proto = &closure.proto;
        let inst = match proto.code.get(pc) {
            Some(i) => *i,
            None => {
                return Err(LuaError::Internal(format!(
                    "instruction fetch past the end of {}",
                    proto.source
                )))
            }
        };
        let Some(op) = inst.opcode() else {
            return Err(LuaError::Internal(format!(
                "bad instruction {:#010x} at pc {pc}",
                inst.0
            )));
        };
        let a = inst.a() as usize;

        match op {
            OpCode::Move => {
                regs[base + a] = regs[base + inst.b() as usize].clone();
            }
            OpCode::LoadK => {
                regs[base + a] = constant(proto, inst.bx() as usize);
            }
            OpCode::LoadKx => {
                let ax = proto.code.get(pc + 1).map(|i| i.ax()).unwrap_or(0);
                regs[base + a] = constant(proto, ax as usize);
                frames.last_mut().unwrap().ip += 1;
            }
            OpCode::LoadBool => {
                regs[base + a] = LuaValue::Boolean(inst.b() != 0);
                if inst.c() != 0 {
                    frames.last_mut().unwrap().ip += 1;
                }
            }
            OpCode::LoadNil => {
                for i in 0..=inst.b() as usize {
                    regs[base + a + i] = LuaValue::Nil;
                }
            }
            OpCode::GetUpval => {
                regs[base + a] = read_upvalue(&closure, inst.b() as usize, regs);
            }
            OpCode::GetTabUp => {
                let t = read_upvalue(&closure, inst.b() as usize, regs);
                let key = rk_value(regs, base, proto, inst.c());
                regs[base + a] = index_value(&t, &key).map_err(|e| with_pos(e, proto, pc))?;
            }
            OpCode::GetTable => {
                let t = regs[base + inst.b() as usize].clone();
                let key = rk_value(regs, base, proto, inst.c());
                regs[base + a] = index_value(&t, &key).map_err(|e| with_pos(e, proto, pc))?;
            }
            OpCode::SetTabUp => {
                let t = read_upvalue(&closure, a, regs);
                let key = rk_value(regs, base, proto, inst.b());
                let val = rk_value(regs, base, proto, inst.c());
                store_value(&t, key, val).map_err(|e| with_pos(e, proto, pc))?;
            }
            OpCode::SetUpval => {
                let val = regs[base + a].clone();
                write_upvalue(&closure, inst.b() as usize, regs, val);
            }
            OpCode::SetTable => {
                let t = regs[base + a].clone();
                let key = rk_value(regs, base, proto, inst.b());
                let val = rk_value(regs, base, proto, inst.c());
                store_value(&t, key, val).map_err(|e| with_pos(e, proto, pc))?;
            }
            OpCode::NewTable => {
                let mut table = LuaTable::new();
                table.array.reserve(fb2int(inst.b()) as usize);
                table.hash.reserve(fb2int(inst.c()) as usize);
                regs[base + a] = LuaValue::Table(Arc::new(RwLock::new(table)));
            }
            OpCode::SelfOp => {
                let obj = regs[base + inst.b() as usize].clone();
                let key = rk_value(regs, base, proto, inst.c());
                regs[base + a + 1] = obj.clone();
                regs[base + a] = index_value(&obj, &key).map_err(|e| with_pos(e, proto, pc))?;
            }
            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Mod
            | OpCode::Pow
            | OpCode::Div
            | OpCode::IDiv
            | OpCode::BAnd
            | OpCode::BOr
            | OpCode::BXor
            | OpCode::Shl
            | OpCode::Shr => {
                let x = rk_value(regs, base, proto, inst.b());
                let y = rk_value(regs, base, proto, inst.c());
                regs[base + a] = binary_op(op, &x, &y).map_err(|e| with_pos(e, proto, pc))?;
            }
            OpCode::Unm => {
                let x = regs[base + inst.b() as usize].clone();
                regs[base + a] = ops::arith_unm(&x).map_err(|e| with_pos(e, proto, pc))?;
            }
            OpCode::BNot => {
                let x = regs[base + inst.b() as usize].clone();
                let i = ops::to_int(&x).map_err(|e| with_pos(e, proto, pc))?;
                regs[base + a] = LuaValue::Integer(!i);
            }
            OpCode::Not => {
                let truthy = regs[base + inst.b() as usize].is_truthy();
                regs[base + a] = LuaValue::Boolean(!truthy);
            }
            OpCode::Len => {
                let x = regs[base + inst.b() as usize].clone();
                regs[base + a] = ops::length_of(&x).map_err(|e| with_pos(e, proto, pc))?;
            }
            OpCode::Concat => {
                let mut s = String::new();
                for i in inst.b() as usize..=inst.c() as usize {
                    let piece =
                        ops::concat_piece(&regs[base + i]).map_err(|e| with_pos(e, proto, pc))?;
                    s.push_str(&piece);
                }
                regs[base + a] = LuaValue::LuaString(s);
            }
            OpCode::Jmp => {
                if a > 0 {
                    close_upvalues_from(open, base + a - 1, regs);
                }
                jump(frames, inst.sbx());
            }
            OpCode::Eq => {
                let x = rk_value(regs, base, proto, inst.b());
                let y = rk_value(regs, base, proto, inst.c());
                if (x == y) != (a != 0) {
                    frames.last_mut().unwrap().ip += 1;
                }
            }
            OpCode::Lt => {
                let x = rk_value(regs, base, proto, inst.b());
                let y = rk_value(regs, base, proto, inst.c());
                let res = ops::cmp_lt(&x, &y).map_err(|e| with_pos(e, proto, pc))?;
                if res != (a != 0) {
                    frames.last_mut().unwrap().ip += 1;
                }
            }
            OpCode::Le => {
                let x = rk_value(regs, base, proto, inst.b());
                let y = rk_value(regs, base, proto, inst.c());
                let res = ops::cmp_le(&x, &y).map_err(|e| with_pos(e, proto, pc))?;
                if res != (a != 0) {
                    frames.last_mut().unwrap().ip += 1;
                }
            }
            OpCode::Test => {
                if regs[base + a].is_truthy() != (inst.c() != 0) {
                    frames.last_mut().unwrap().ip += 1;
                }
            }
            OpCode::TestSet => {
                let b_val = regs[base + inst.b() as usize].clone();
                if b_val.is_truthy() == (inst.c() != 0) {
                    regs[base + a] = b_val;
                } else {
                    frames.last_mut().unwrap().ip += 1;
                }
            }
            OpCode::Call => {
                let a_abs = base + a;
                let f = regs[a_abs].clone();
                let n_args = if inst.b() == 0 {
                    top.saturating_sub(a_abs + 1)
                } else {
                    (inst.b() - 1) as usize
                };
                let args = collect(regs, a_abs + 1, n_args);
                let want = if inst.c() == 0 { -1 } else { inst.c() as i32 - 1 };
                call_value(f, args, a_abs, want, frames, regs, top)
                    .map_err(|e| with_pos(e, proto, pc))?;
            }
            OpCode::TailCall => {
                // All-results mode; the RETURN that follows forwards them.
                let a_abs = base + a;
                let f = regs[a_abs].clone();
                let n_args = if inst.b() == 0 {
                    top.saturating_sub(a_abs + 1)
                } else {
                    (inst.b() - 1) as usize
                };
                let args = collect(regs, a_abs + 1, n_args);
                call_value(f, args, a_abs, -1, frames, regs, top)
                    .map_err(|e| with_pos(e, proto, pc))?;
            }
            OpCode::Return => {
                let a_abs = base + a;
                let n = if inst.b() == 0 {
                    top.saturating_sub(a_abs)
                } else {
                    (inst.b() - 1) as usize
                };
                let vals = collect(regs, a_abs, n);
                let frame = frames.pop().unwrap();
                close_upvalues_from(open, frame.base, regs);
                if frames.is_empty() {
                    return Ok(vals);
                }
                write_results(regs, frame.ret_reg, frame.want, vals, top);
            }
            OpCode::ForLoop => {
                let a_abs = base + a;
                if for_step(regs, a_abs)? {
                    jump(frames, inst.sbx());
                }
            }
            OpCode::ForPrep => {
                let a_abs = base + a;
                for_prepare(regs, a_abs).map_err(|e| with_pos(e, proto, pc))?;
                jump(frames, inst.sbx());
            }
            OpCode::TForCall => {
                let a_abs = base + a;
                let f = regs[a_abs].clone();
                let args = vec![regs[a_abs + 1].clone(), regs[a_abs + 2].clone()];
                call_value(f, args, a_abs + 3, inst.c() as i32, frames, regs, top)
                    .map_err(|e| with_pos(e, proto, pc))?;
            }
            OpCode::TForLoop => {
                let a_abs = base + a;
                if !matches!(regs[a_abs + 1], LuaValue::Nil) {
                    regs[a_abs] = regs[a_abs + 1].clone();
                    jump(frames, inst.sbx());
                }
            }
            OpCode::SetList => {
                let a_abs = base + a;
                let n = if inst.b() == 0 {
                    top.saturating_sub(a_abs + 1)
                } else {
                    inst.b() as usize
                };
                let batch = if inst.c() == 0 {
                    let ax = proto.code.get(pc + 1).map(|i| i.ax()).unwrap_or(0);
                    frames.last_mut().unwrap().ip += 1;
                    ax as usize
                } else {
                    inst.c() as usize
                };
                let LuaValue::Table(t) = regs[a_abs].clone() else {
                    return Err(LuaError::Internal(format!(
                        "SETLIST into a {} value at pc {pc}",
                        regs[a_abs].type_name()
                    )));
                };
                let start = batch.saturating_sub(1) * FIELDS_PER_FLUSH;
                let mut table = t.write().unwrap();
                for i in 1..=n {
                    let v = regs.get(a_abs + i).cloned().unwrap_or(LuaValue::Nil);
                    table.set(LuaValue::Integer((start + i) as i64), v);
                }
            }
            OpCode::Closure => {
                let bx = inst.bx() as usize;
                let Some(child) = proto.protos.get(bx).cloned() else {
                    return Err(LuaError::Internal(format!(
                        "closure prototype {bx} out of range in {}",
                        proto.source
                    )));
                };
                let upvals = instantiate_upvalues(&child, &closure, base, open);
                regs[base + a] = LuaValue::Closure(Arc::new(LuaClosure::new(child, upvals)));
            }
            OpCode::VarArg => {
                let a_abs = base + a;
                let varargs = frames.last().unwrap().varargs.clone();
                let b = inst.b() as usize;
                if b == 0 {
                    let n = varargs.len();
                    ensure_regs(regs, a_abs + n);
                    for (i, v) in varargs.into_iter().enumerate() {
                        regs[a_abs + i] = v;
                    }
                    *top = a_abs + n;
                } else {
                    for i in 0..b - 1 {
                        regs[a_abs + i] = varargs.get(i).cloned().unwrap_or(LuaValue::Nil);
                    }
                }
            }
            // Operand word for LOADKX and SETLIST; those consume it during
            // their own dispatch, so reaching one directly does nothing.
            OpCode::ExtraArg => {}
        }
    }
}

// ── Calls and frames ─────────────────────────────────────────────────────────

fn call_value(
    f: LuaValue,
    args: Vec<LuaValue>,
    ret_reg: usize,
    want: i32,
    frames: &mut Vec<Frame>,
    regs: &mut Vec<LuaValue>,
    top: &mut usize,
) -> Result<(), LuaError> {
    match f {
        LuaValue::Closure(closure) => push_frame(closure, args, ret_reg, want, frames, regs),
        LuaValue::NativeFunction(nf) => {
            let vals = nf(args)?;
            write_results(regs, ret_reg, want, vals, top);
            Ok(())
        }
        v => Err(LuaError::Runtime(format!(
            "attempt to call a {} value",
            v.type_name()
        ))),
    }
}

fn push_frame(
    closure: Arc<LuaClosure>,
    args: Vec<LuaValue>,
    ret_reg: usize,
    want: i32,
    frames: &mut Vec<Frame>,
    regs: &mut Vec<LuaValue>,
) -> Result<(), LuaError> {
    if frames.len() >= MAX_CALL_DEPTH {
        return Err(LuaError::Runtime("stack overflow".into()));
    }
    let base = frames
        .last()
        .map(|f| f.base + f.closure.proto.max_stack_size as usize)
        .unwrap_or(0);
    ensure_regs(regs, base + WINDOW_SLACK);

    let num_params = closure.proto.num_params as usize;
    let is_vararg = closure.proto.is_vararg;
    let mut it = args.into_iter();
    for i in 0..num_params {
        regs[base + i] = it.next().unwrap_or(LuaValue::Nil);
    }
    let varargs = if is_vararg { it.collect() } else { Vec::new() };

    frames.push(Frame {
        closure,
        ip: 0,
        base,
        ret_reg,
        want,
        varargs,
    });
    Ok(())
}

/// Deliver call results: a fixed `want` pads or truncates, `-1` writes all
/// and records the water mark.
fn write_results(
    regs: &mut Vec<LuaValue>,
    ret_reg: usize,
    want: i32,
    vals: Vec<LuaValue>,
    top: &mut usize,
) {
    if want < 0 {
        let n = vals.len();
        ensure_regs(regs, ret_reg + n);
        for (i, v) in vals.into_iter().enumerate() {
            regs[ret_reg + i] = v;
        }
        *top = ret_reg + n;
    } else {
        ensure_regs(regs, ret_reg + want as usize);
        let mut it = vals.into_iter();
        for i in 0..want as usize {
            regs[ret_reg + i] = it.next().unwrap_or(LuaValue::Nil);
        }
    }
}

fn jump(frames: &mut [Frame], sbx: i32) {
    let frame = frames.last_mut().unwrap();
    frame.ip = (frame.ip as i64 + sbx as i64) as usize;
}

fn ensure_regs(regs: &mut Vec<LuaValue>, len: usize) {
    if regs.len() < len {
        regs.resize(len, LuaValue::Nil);
    }
}

fn collect(regs: &[LuaValue], from: usize, n: usize) -> Vec<LuaValue> {
    (0..n)
        .map(|i| regs.get(from + i).cloned().unwrap_or(LuaValue::Nil))
        .collect()
}

// ── Upvalue cells ────────────────────────────────────────────────────────────

fn read_upvalue(closure: &LuaClosure, idx: usize, regs: &[LuaValue]) -> LuaValue {
    match closure.upvalues.get(idx) {
        Some(uv) => match &*uv.0.read().unwrap() {
            UpvalueInner::Open(abs) => regs.get(*abs).cloned().unwrap_or(LuaValue::Nil),
            UpvalueInner::Closed(v) => v.clone(),
        },
        None => LuaValue::Nil,
    }
}

fn write_upvalue(closure: &LuaClosure, idx: usize, regs: &mut Vec<LuaValue>, val: LuaValue) {
    let Some(uv) = closure.upvalues.get(idx) else {
        return;
    };
    let mut inner = uv.0.write().unwrap();
    match &mut *inner {
        UpvalueInner::Open(abs) => {
            let abs = *abs;
            drop(inner);
            ensure_regs(regs, abs + 1);
            regs[abs] = val;
        }
        UpvalueInner::Closed(slot) => *slot = val,
    }
}

/// Build the upvalue cells for a closure instantiated at `base`. Stack
/// captures reuse the open cell for that register when one exists, so
/// sibling closures share state.
fn instantiate_upvalues(
    child: &Prototype,
    enclosing: &LuaClosure,
    base: usize,
    open: &mut Vec<(usize, Upvalue)>,
) -> Vec<Upvalue> {
    child
        .upvalues
        .iter()
        .map(|desc| match *desc {
            UpvalueDesc::Stack(reg) => {
                let abs = base + reg as usize;
                match open.iter().find(|(r, _)| *r == abs) {
                    Some((_, uv)) => uv.clone(),
                    None => {
                        let uv = Upvalue::open(abs);
                        open.push((abs, uv.clone()));
                        uv
                    }
                }
            }
            UpvalueDesc::Upvalue(idx) => enclosing
                .upvalues
                .get(idx as usize)
                .cloned()
                .unwrap_or_else(|| Upvalue::closed(LuaValue::Nil)),
        })
        .collect()
}

/// Migrate every open cell at or above `from_abs` into its own heap slot.
fn close_upvalues_from(open: &mut Vec<(usize, Upvalue)>, from_abs: usize, regs: &[LuaValue]) {
    for (abs, uv) in open.iter().filter(|(abs, _)| *abs >= from_abs) {
        let val = regs.get(*abs).cloned().unwrap_or(LuaValue::Nil);
        *uv.0.write().unwrap() = UpvalueInner::Closed(val);
    }
    open.retain(|(abs, _)| *abs < from_abs);
}

// ── Operand access and table plumbing ────────────────────────────────────────

fn constant(proto: &Prototype, idx: usize) -> LuaValue {
    proto.constants.get(idx).cloned().unwrap_or(LuaValue::Nil)
}

fn rk_value(regs: &[LuaValue], base: usize, proto: &Prototype, arg: u32) -> LuaValue {
    if is_rk_const(arg) {
        constant(proto, rk_index(arg) as usize)
    } else {
        regs.get(base + arg as usize)
            .cloned()
            .unwrap_or(LuaValue::Nil)
    }
}

fn index_value(v: &LuaValue, key: &LuaValue) -> Result<LuaValue, LuaError> {
    match v {
        LuaValue::Table(t) => Ok(t.read().unwrap().get(key)),
        _ => Err(LuaError::Runtime(format!(
            "attempt to index a {} value",
            v.type_name()
        ))),
    }
}

fn store_value(v: &LuaValue, key: LuaValue, val: LuaValue) -> Result<(), LuaError> {
    let LuaValue::Table(t) = v else {
        return Err(LuaError::Runtime(format!(
            "attempt to index a {} value",
            v.type_name()
        )));
    };
    match &key {
        LuaValue::Nil => return Err(LuaError::Runtime("table index is nil".into())),
        LuaValue::Float(f) if f.is_nan() => {
            return Err(LuaError::Runtime("table index is NaN".into()))
        }
        _ => {}
    }
    t.write().unwrap().set(key, val);
    Ok(())
}

fn binary_op(op: OpCode, x: &LuaValue, y: &LuaValue) -> Result<LuaValue, LuaError> {
    match op {
        OpCode::Add => ops::arith_add(x, y),
        OpCode::Sub => ops::arith_sub(x, y),
        OpCode::Mul => ops::arith_mul(x, y),
        OpCode::Mod => ops::arith_mod(x, y),
        OpCode::Pow => ops::arith_pow(x, y),
        OpCode::Div => ops::arith_div(x, y),
        OpCode::IDiv => ops::arith_idiv(x, y),
        OpCode::BAnd => Ok(LuaValue::Integer(ops::to_int(x)? & ops::to_int(y)?)),
        OpCode::BOr => Ok(LuaValue::Integer(ops::to_int(x)? | ops::to_int(y)?)),
        OpCode::BXor => Ok(LuaValue::Integer(ops::to_int(x)? ^ ops::to_int(y)?)),
        OpCode::Shl => Ok(LuaValue::Integer(ops::shift_left(
            ops::to_int(x)?,
            ops::to_int(y)?,
        ))),
        OpCode::Shr => Ok(LuaValue::Integer(ops::shift_right(
            ops::to_int(x)?,
            ops::to_int(y)?,
        ))),
        _ => Err(LuaError::Internal(format!(
            "{} is not a binary operator",
            op.name()
        ))),
    }
}

// ── Numeric for ──────────────────────────────────────────────────────────────

/// FORPREP: coerce the three control registers and back the index off by one
/// step. An all-integer triple keeps the loop in integers.
fn for_prepare(regs: &mut [LuaValue], a_abs: usize) -> Result<(), LuaError> {
    let init = ops::coerce_number(&regs[a_abs])
        .ok_or_else(|| LuaError::Runtime("'for' initial value must be a number".into()))?;
    let limit = ops::coerce_number(&regs[a_abs + 1])
        .ok_or_else(|| LuaError::Runtime("'for' limit must be a number".into()))?;
    let step = ops::coerce_number(&regs[a_abs + 2])
        .ok_or_else(|| LuaError::Runtime("'for' step must be a number".into()))?;

    match (&init, &limit, &step) {
        (LuaValue::Integer(i), LuaValue::Integer(l), LuaValue::Integer(s)) => {
            regs[a_abs] = LuaValue::Integer(i.wrapping_sub(*s));
            regs[a_abs + 1] = LuaValue::Integer(*l);
            regs[a_abs + 2] = LuaValue::Integer(*s);
        }
        _ => {
            let (i, l, s) = (ops::as_f64(&init), ops::as_f64(&limit), ops::as_f64(&step));
            regs[a_abs] = LuaValue::Float(i - s);
            regs[a_abs + 1] = LuaValue::Float(l);
            regs[a_abs + 2] = LuaValue::Float(s);
        }
    }
    Ok(())
}

/// FORLOOP: advance the index and report whether the loop continues. On
/// continue, the user-visible variable at `a_abs + 3` gets the new index.
fn for_step(regs: &mut [LuaValue], a_abs: usize) -> Result<bool, LuaError> {
    match (
        regs[a_abs].clone(),
        regs[a_abs + 1].clone(),
        regs[a_abs + 2].clone(),
    ) {
        (LuaValue::Integer(i), LuaValue::Integer(l), LuaValue::Integer(s)) => {
            let idx = i.wrapping_add(s);
            let keep = if s >= 0 { idx <= l } else { idx >= l };
            if keep {
                regs[a_abs] = LuaValue::Integer(idx);
                regs[a_abs + 3] = LuaValue::Integer(idx);
            }
            Ok(keep)
        }
        (LuaValue::Float(i), LuaValue::Float(l), LuaValue::Float(s)) => {
            let idx = i + s;
            let keep = if s >= 0.0 { idx <= l } else { idx >= l };
            if keep {
                regs[a_abs] = LuaValue::Float(idx);
                regs[a_abs + 3] = LuaValue::Float(idx);
            }
            Ok(keep)
        }
        _ => Err(LuaError::Internal(
            "'for' control registers out of sync".into(),
        )),
    }
}

// ── Error positions ──────────────────────────────────────────────────────────

/// Prefix a runtime message with `source:line:` from the debug line table.
fn with_pos(err: LuaError, proto: &Prototype, pc: usize) -> LuaError {
    match err {
        LuaError::Runtime(msg) => {
            LuaError::Runtime(format!("{}:{}: {}", proto.source, proto.line_at(pc), msg))
        }
        other => other,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
