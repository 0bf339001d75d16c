//! Instruction set.
//!
//! Opcode values are fixed by the container format: `End` must be 0
//! because a zero byte terminates every instruction stream.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
    End = 0,
    StoreSimple = 1,
    LoadSimple = 2,
    StoreDynamic = 3,
    LoadDynamic = 4,
    PushString = 5,
    PushChar = 6,
    PushI16 = 7,
    PushI32 = 8,
    PushI64 = 9,
    ListBegin = 10,
    ListEnd = 11,
    ListExpand = 12,
    RemoveDynamic = 13,
    Add = 14,
    Sub = 15,
    Div = 16,
    Mul = 17,
    Pop = 18,
    Dup = 19,
    Jump = 20,
    JumpIf = 21,
    JumpIfNot = 22,
    Return = 23,
    Call = 24,
    PushNull = 25,
    Equals = 26,
    StoreGlobal = 27,
    LoadGlobal = 28,
    LoadFunction = 29,
}

impl Op {
    pub fn from_u8(byte: u8) -> Option<Op> {
        Some(match byte {
            0 => Op::End,
            1 => Op::StoreSimple,
            2 => Op::LoadSimple,
            3 => Op::StoreDynamic,
            4 => Op::LoadDynamic,
            5 => Op::PushString,
            6 => Op::PushChar,
            7 => Op::PushI16,
            8 => Op::PushI32,
            9 => Op::PushI64,
            10 => Op::ListBegin,
            11 => Op::ListEnd,
            12 => Op::ListExpand,
            13 => Op::RemoveDynamic,
            14 => Op::Add,
            15 => Op::Sub,
            16 => Op::Div,
            17 => Op::Mul,
            18 => Op::Pop,
            19 => Op::Dup,
            20 => Op::Jump,
            21 => Op::JumpIf,
            22 => Op::JumpIfNot,
            23 => Op::Return,
            24 => Op::Call,
            25 => Op::PushNull,
            26 => Op::Equals,
            27 => Op::StoreGlobal,
            28 => Op::LoadGlobal,
            29 => Op::LoadFunction,
            _ => return None,
        })
    }
}
