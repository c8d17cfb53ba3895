/// Bytecode operations for the luna virtual machine.
///
/// This is the Lua 5.3 register-based instruction set: 47 opcodes, each a
/// single 32-bit word in one of four operand layouts. The numeric order here
/// is the encoded order and part of the chunk format, so it must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Move = 0,
    LoadK,
    LoadKx,
    LoadBool,
    LoadNil,
    GetUpval,
    GetTabUp,
    GetTable,
    SetTabUp,
    SetUpval,
    SetTable,
    NewTable,
    SelfOp,
    Add,
    Sub,
    Mul,
    Mod,
    Pow,
    Div,
    IDiv,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
    Unm,
    BNot,
    Not,
    Len,
    Concat,
    Jmp,
    Eq,
    Lt,
    Le,
    Test,
    TestSet,
    Call,
    TailCall,
    Return,
    ForLoop,
    ForPrep,
    TForCall,
    TForLoop,
    SetList,
    Closure,
    VarArg,
    ExtraArg,
}

/// Operand layout of an instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpMode {
    IABC,
    IABx,
    IAsBx,
    IAx,
}

/// How an instruction uses its B or C field (drives the disassembly listing).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpArg {
    /// Not used.
    N,
    /// Used as-is (a count, a flag, an immediate).
    U,
    /// A register index or jump offset.
    R,
    /// A constant index or RK operand.
    K,
}

impl OpCode {
    pub const COUNT: usize = 47;

    const ALL: [OpCode; OpCode::COUNT] = [
        OpCode::Move,
        OpCode::LoadK,
        OpCode::LoadKx,
        OpCode::LoadBool,
        OpCode::LoadNil,
        OpCode::GetUpval,
        OpCode::GetTabUp,
        OpCode::GetTable,
        OpCode::SetTabUp,
        OpCode::SetUpval,
        OpCode::SetTable,
        OpCode::NewTable,
        OpCode::SelfOp,
        OpCode::Add,
        OpCode::Sub,
        OpCode::Mul,
        OpCode::Mod,
        OpCode::Pow,
        OpCode::Div,
        OpCode::IDiv,
        OpCode::BAnd,
        OpCode::BOr,
        OpCode::BXor,
        OpCode::Shl,
        OpCode::Shr,
        OpCode::Unm,
        OpCode::BNot,
        OpCode::Not,
        OpCode::Len,
        OpCode::Concat,
        OpCode::Jmp,
        OpCode::Eq,
        OpCode::Lt,
        OpCode::Le,
        OpCode::Test,
        OpCode::TestSet,
        OpCode::Call,
        OpCode::TailCall,
        OpCode::Return,
        OpCode::ForLoop,
        OpCode::ForPrep,
        OpCode::TForCall,
        OpCode::TForLoop,
        OpCode::SetList,
        OpCode::Closure,
        OpCode::VarArg,
        OpCode::ExtraArg,
    ];

    /// Decode an opcode byte; `None` for anything past the defined set.
    pub fn from_u8(b: u8) -> Option<OpCode> {
        OpCode::ALL.get(b as usize).copied()
    }

    pub fn mode(self) -> OpMode {
        match self {
            OpCode::LoadK | OpCode::LoadKx | OpCode::Closure => OpMode::IABx,
            OpCode::Jmp | OpCode::ForLoop | OpCode::ForPrep | OpCode::TForLoop => OpMode::IAsBx,
            OpCode::ExtraArg => OpMode::IAx,
            _ => OpMode::IABC,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OpCode::Move => "MOVE",
            OpCode::LoadK => "LOADK",
            OpCode::LoadKx => "LOADKX",
            OpCode::LoadBool => "LOADBOOL",
            OpCode::LoadNil => "LOADNIL",
            OpCode::GetUpval => "GETUPVAL",
            OpCode::GetTabUp => "GETTABUP",
            OpCode::GetTable => "GETTABLE",
            OpCode::SetTabUp => "SETTABUP",
            OpCode::SetUpval => "SETUPVAL",
            OpCode::SetTable => "SETTABLE",
            OpCode::NewTable => "NEWTABLE",
            OpCode::SelfOp => "SELF",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Mod => "MOD",
            OpCode::Pow => "POW",
            OpCode::Div => "DIV",
            OpCode::IDiv => "IDIV",
            OpCode::BAnd => "BAND",
            OpCode::BOr => "BOR",
            OpCode::BXor => "BXOR",
            OpCode::Shl => "SHL",
            OpCode::Shr => "SHR",
            OpCode::Unm => "UNM",
            OpCode::BNot => "BNOT",
            OpCode::Not => "NOT",
            OpCode::Len => "LEN",
            OpCode::Concat => "CONCAT",
            OpCode::Jmp => "JMP",
            OpCode::Eq => "EQ",
            OpCode::Lt => "LT",
            OpCode::Le => "LE",
            OpCode::Test => "TEST",
            OpCode::TestSet => "TESTSET",
            OpCode::Call => "CALL",
            OpCode::TailCall => "TAILCALL",
            OpCode::Return => "RETURN",
            OpCode::ForLoop => "FORLOOP",
            OpCode::ForPrep => "FORPREP",
            OpCode::TForCall => "TFORCALL",
            OpCode::TForLoop => "TFORLOOP",
            OpCode::SetList => "SETLIST",
            OpCode::Closure => "CLOSURE",
            OpCode::VarArg => "VARARG",
            OpCode::ExtraArg => "EXTRAARG",
        }
    }

    pub fn b_mode(self) -> OpArg {
        match self {
            OpCode::Move
            | OpCode::GetTable
            | OpCode::SelfOp
            | OpCode::Unm
            | OpCode::BNot
            | OpCode::Not
            | OpCode::Len
            | OpCode::Concat
            | OpCode::Jmp
            | OpCode::TestSet
            | OpCode::ForLoop
            | OpCode::ForPrep
            | OpCode::TForLoop => OpArg::R,
            OpCode::LoadK | OpCode::SetTabUp | OpCode::SetTable => OpArg::K,
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
            | OpCode::Shr
            | OpCode::Eq
            | OpCode::Lt
            | OpCode::Le => OpArg::K,
            OpCode::LoadKx | OpCode::Test | OpCode::TForCall => OpArg::N,
            _ => OpArg::U,
        }
    }

    pub fn c_mode(self) -> OpArg {
        match self {
            OpCode::GetTabUp
            | OpCode::GetTable
            | OpCode::SetTabUp
            | OpCode::SetTable
            | OpCode::SelfOp
            | OpCode::Add
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
            | OpCode::Shr
            | OpCode::Eq
            | OpCode::Lt
            | OpCode::Le => OpArg::K,
            OpCode::Concat => OpArg::R,
            OpCode::LoadBool
            | OpCode::NewTable
            | OpCode::Test
            | OpCode::TestSet
            | OpCode::Call
            | OpCode::TailCall
            | OpCode::TForCall
            | OpCode::SetList
            | OpCode::ExtraArg => OpArg::U,
            _ => OpArg::N,
        }
    }
}
