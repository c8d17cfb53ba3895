use crate::opcode::OpCode;

// Field layout of a 32-bit instruction word, low bit first:
//
//   iABC:  | B: 9 | C: 9 | A: 8 | opcode: 6 |
//   iABx:  |    Bx: 18   | A: 8 | opcode: 6 |
//   iAsBx: |   sBx: 18   | A: 8 | opcode: 6 |
//   iAx:   |        Ax: 26      | opcode: 6 |
//
// sBx is stored excess-K: the raw Bx field minus `MAXARG_SBX`.

const SIZE_OP: u32 = 6;
const SIZE_A: u32 = 8;
const SIZE_B: u32 = 9;
const SIZE_C: u32 = 9;
const SIZE_BX: u32 = SIZE_B + SIZE_C;
const SIZE_AX: u32 = SIZE_A + SIZE_B + SIZE_C;

const POS_OP: u32 = 0;
const POS_A: u32 = POS_OP + SIZE_OP;
const POS_C: u32 = POS_A + SIZE_A;
const POS_B: u32 = POS_C + SIZE_C;
const POS_BX: u32 = POS_C;
const POS_AX: u32 = POS_A;

pub const MAXARG_A: u32 = (1 << SIZE_A) - 1;
pub const MAXARG_B: u32 = (1 << SIZE_B) - 1;
pub const MAXARG_C: u32 = (1 << SIZE_C) - 1;
pub const MAXARG_BX: u32 = (1 << SIZE_BX) - 1;
pub const MAXARG_SBX: i32 = (MAXARG_BX >> 1) as i32;
pub const MAXARG_AX: u32 = (1 << SIZE_AX) - 1;

/// High bit marking a B/C operand as a constant-table index instead of a register.
pub const BITRK: u32 = 1 << (SIZE_B - 1);
/// Largest constant index addressable through an RK operand.
pub const MAXINDEXRK: u32 = BITRK - 1;

/// One encoded VM instruction.
///
/// The opcode (low 6 bits) selects which of the four operand layouts applies;
/// accessors just extract fields and callers must pick the right ones for the
/// opcode's declared [`OpMode`](crate::opcode::OpMode).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Instruction(pub u32);

impl Instruction {
    pub fn abc(op: OpCode, a: u32, b: u32, c: u32) -> Instruction {
        Instruction((op as u32) << POS_OP | a << POS_A | b << POS_B | c << POS_C)
    }

    pub fn abx(op: OpCode, a: u32, bx: u32) -> Instruction {
        Instruction((op as u32) << POS_OP | a << POS_A | bx << POS_BX)
    }

    pub fn asbx(op: OpCode, a: u32, sbx: i32) -> Instruction {
        Self::abx(op, a, (sbx + MAXARG_SBX) as u32)
    }

    pub fn iax(op: OpCode, ax: u32) -> Instruction {
        Instruction((op as u32) << POS_OP | ax << POS_AX)
    }

    /// The raw opcode field; not guaranteed to name a valid [`OpCode`].
    pub fn opcode_raw(self) -> u8 {
        (self.0 >> POS_OP & ((1 << SIZE_OP) - 1)) as u8
    }

    pub fn opcode(self) -> Option<OpCode> {
        OpCode::from_u8(self.opcode_raw())
    }

    pub fn a(self) -> u32 {
        self.0 >> POS_A & MAXARG_A
    }

    pub fn b(self) -> u32 {
        self.0 >> POS_B & MAXARG_B
    }

    pub fn c(self) -> u32 {
        self.0 >> POS_C & MAXARG_C
    }

    pub fn bx(self) -> u32 {
        self.0 >> POS_BX & MAXARG_BX
    }

    pub fn sbx(self) -> i32 {
        self.bx() as i32 - MAXARG_SBX
    }

    pub fn ax(self) -> u32 {
        self.0 >> POS_AX & MAXARG_AX
    }

    /// Rewrite the sBx field in place, leaving opcode and A untouched.
    pub fn set_sbx(&mut self, sbx: i32) {
        let bx = (sbx + MAXARG_SBX) as u32;
        self.0 = self.0 & !(MAXARG_BX << POS_BX) | bx << POS_BX;
    }
}

impl std::fmt::Debug for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.opcode() {
            Some(op) => write!(
                f,
                "{}(a={} b={} c={} bx={})",
                op.name(),
                self.a(),
                self.b(),
                self.c(),
                self.bx()
            ),
            None => write!(f, "Instruction({:#010x})", self.0),
        }
    }
}

// ── RK operands ──

/// Is this B/C operand a constant-table reference?
pub fn is_rk_const(arg: u32) -> bool {
    arg & BITRK != 0
}

/// Strip the constant marker, leaving the constant-table index.
pub fn rk_index(arg: u32) -> u32 {
    arg & !BITRK
}

/// Mark a constant-table index as an RK constant operand.
pub fn rk_const(index: u32) -> u32 {
    index | BITRK
}

// ── Floating-point byte ──

// Table size hints travel in a compact `eeeeexxx` form: `(1xxx) * 2^(eeeee-1)`
// when the exponent is nonzero, the literal value otherwise.

/// Round `x` up into floating-point-byte form.
pub fn int2fb(mut x: u32) -> u32 {
    if x < 8 {
        return x;
    }
    let mut e = 0;
    while x >= 8 << 4 {
        x = (x + 0xf) >> 4;
        e += 4;
    }
    while x >= 8 << 1 {
        x = (x + 1) >> 1;
        e += 1;
    }
    ((e + 1) << 3) | (x - 8)
}

/// Expand a floating-point byte back to the (possibly rounded-up) integer.
pub fn fb2int(x: u32) -> u32 {
    if x < 8 {
        x
    } else {
        ((x & 7) + 8) << ((x >> 3) - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abc_fields_round_trip() {
        let i = Instruction::abc(OpCode::Add, 3, 250, rk_const(7));
        assert_eq!(i.opcode(), Some(OpCode::Add));
        assert_eq!(i.a(), 3);
        assert_eq!(i.b(), 250);
        assert_eq!(i.c(), rk_const(7));
    }

    #[test]
    fn abx_fields_round_trip() {
        let i = Instruction::abx(OpCode::LoadK, 200, MAXARG_BX);
        assert_eq!(i.opcode(), Some(OpCode::LoadK));
        assert_eq!(i.a(), 200);
        assert_eq!(i.bx(), MAXARG_BX);
    }

    #[test]
    fn sbx_is_signed() {
        let fwd = Instruction::asbx(OpCode::Jmp, 0, 5);
        let back = Instruction::asbx(OpCode::Jmp, 0, -5);
        assert_eq!(fwd.sbx(), 5);
        assert_eq!(back.sbx(), -5);
        assert_eq!(Instruction::asbx(OpCode::Jmp, 0, 0).sbx(), 0);
    }

    #[test]
    fn set_sbx_preserves_other_fields() {
        let mut i = Instruction::asbx(OpCode::ForLoop, 9, 0);
        i.set_sbx(-42);
        assert_eq!(i.opcode(), Some(OpCode::ForLoop));
        assert_eq!(i.a(), 9);
        assert_eq!(i.sbx(), -42);
    }

    #[test]
    fn ax_round_trip() {
        let i = Instruction::iax(OpCode::ExtraArg, MAXARG_AX);
        assert_eq!(i.opcode(), Some(OpCode::ExtraArg));
        assert_eq!(i.ax(), MAXARG_AX);
    }

    #[test]
    fn rk_marking() {
        assert!(!is_rk_const(42));
        assert!(is_rk_const(rk_const(42)));
        assert_eq!(rk_index(rk_const(42)), 42);
    }

    #[test]
    fn fb_small_values_are_exact() {
        for x in 0..8 {
            assert_eq!(int2fb(x), x);
            assert_eq!(fb2int(x), x);
        }
    }

    #[test]
    fn fb_rounds_up() {
        // fb2int(int2fb(x)) never shrinks below x
        for x in [8, 9, 17, 50, 100, 1000, 65536] {
            assert!(fb2int(int2fb(x)) >= x, "shrank at {x}");
        }
        assert_eq!(fb2int(int2fb(50)), 52);
    }
}
