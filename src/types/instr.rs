// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! WebAssembly instruction opcodes and their static typing.

use num_enum::TryFromPrimitive;

use super::ValType;

/// The operand-stack effect of an opcode, as far as it can be described
/// without looking at immediates or at the surrounding control frames.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Typing {
    /// Needs dedicated handling: control flow, variables, calls, constants
    /// and the memory size operators.
    Structured,
    /// `[t] -> [t]`
    Unary(ValType),
    /// `[t t] -> [t]`
    Binary(ValType),
    /// `[t] -> [i32]`
    Test(ValType),
    /// `[t t] -> [i32]`
    Compare(ValType),
    /// `[from] -> [to]`
    Convert { from: ValType, to: ValType },
    /// `[i32] -> [ty]`, accessing `size` bytes.
    Load { ty: ValType, size: u32 },
    /// `[i32 ty] -> []`, accessing `size` bytes.
    Store { ty: ValType, size: u32 },
}

// Opcode-indexed typing table.
pub(crate) const OPCODE_TYPING: [Typing; 256] = {
    let mut table = [Typing::Structured; 256];

    macro_rules! set {
        ($typing:expr => $($op:ident),+ $(,)?) => {
            $(table[Opcode::$op as usize] = $typing;)+
        };
    }

    const I32: ValType = ValType::I32;
    const I64: ValType = ValType::I64;
    const F32: ValType = ValType::F32;
    const F64: ValType = ValType::F64;

    set!(Typing::Load { ty: I32, size: 4 } => I32Load);
    set!(Typing::Load { ty: I64, size: 8 } => I64Load);
    set!(Typing::Load { ty: F32, size: 4 } => F32Load);
    set!(Typing::Load { ty: F64, size: 8 } => F64Load);
    set!(Typing::Load { ty: I32, size: 1 } => I32Load8S, I32Load8U);
    set!(Typing::Load { ty: I32, size: 2 } => I32Load16S, I32Load16U);
    set!(Typing::Load { ty: I64, size: 1 } => I64Load8S, I64Load8U);
    set!(Typing::Load { ty: I64, size: 2 } => I64Load16S, I64Load16U);
    set!(Typing::Load { ty: I64, size: 4 } => I64Load32S, I64Load32U);

    set!(Typing::Store { ty: I32, size: 4 } => I32Store);
    set!(Typing::Store { ty: I64, size: 8 } => I64Store);
    set!(Typing::Store { ty: F32, size: 4 } => F32Store);
    set!(Typing::Store { ty: F64, size: 8 } => F64Store);
    set!(Typing::Store { ty: I32, size: 1 } => I32Store8);
    set!(Typing::Store { ty: I32, size: 2 } => I32Store16);
    set!(Typing::Store { ty: I64, size: 1 } => I64Store8);
    set!(Typing::Store { ty: I64, size: 2 } => I64Store16);
    set!(Typing::Store { ty: I64, size: 4 } => I64Store32);

    set!(Typing::Test(I32) => I32Eqz);
    set!(Typing::Test(I64) => I64Eqz);

    set!(Typing::Compare(I32) =>
        I32Eq, I32Ne, I32LtS, I32LtU, I32GtS, I32GtU, I32LeS, I32LeU, I32GeS, I32GeU);
    set!(Typing::Compare(I64) =>
        I64Eq, I64Ne, I64LtS, I64LtU, I64GtS, I64GtU, I64LeS, I64LeU, I64GeS, I64GeU);
    set!(Typing::Compare(F32) => F32Eq, F32Ne, F32Lt, F32Gt, F32Le, F32Ge);
    set!(Typing::Compare(F64) => F64Eq, F64Ne, F64Lt, F64Gt, F64Le, F64Ge);

    set!(Typing::Unary(I32) => I32Clz, I32Ctz, I32Popcnt);
    set!(Typing::Unary(I64) => I64Clz, I64Ctz, I64Popcnt);
    set!(Typing::Unary(F32) =>
        F32Abs, F32Neg, F32Ceil, F32Floor, F32Trunc, F32Nearest, F32Sqrt);
    set!(Typing::Unary(F64) =>
        F64Abs, F64Neg, F64Ceil, F64Floor, F64Trunc, F64Nearest, F64Sqrt);

    set!(Typing::Binary(I32) =>
        I32Add, I32Sub, I32Mul, I32DivS, I32DivU, I32RemS, I32RemU,
        I32And, I32Or, I32Xor, I32Shl, I32ShrS, I32ShrU, I32Rotl, I32Rotr);
    set!(Typing::Binary(I64) =>
        I64Add, I64Sub, I64Mul, I64DivS, I64DivU, I64RemS, I64RemU,
        I64And, I64Or, I64Xor, I64Shl, I64ShrS, I64ShrU, I64Rotl, I64Rotr);
    set!(Typing::Binary(F32) => F32Add, F32Sub, F32Mul, F32Div, F32Min, F32Max, F32Copysign);
    set!(Typing::Binary(F64) => F64Add, F64Sub, F64Mul, F64Div, F64Min, F64Max, F64Copysign);

    set!(Typing::Convert { from: I64, to: I32 } => I32WrapI64);
    set!(Typing::Convert { from: F32, to: I32 } => I32TruncF32S, I32TruncF32U, I32ReinterpretF32);
    set!(Typing::Convert { from: F64, to: I32 } => I32TruncF64S, I32TruncF64U);
    set!(Typing::Convert { from: I32, to: I64 } => I64ExtendI32S, I64ExtendI32U);
    set!(Typing::Convert { from: F32, to: I64 } => I64TruncF32S, I64TruncF32U);
    set!(Typing::Convert { from: F64, to: I64 } => I64TruncF64S, I64TruncF64U, I64ReinterpretF64);
    set!(Typing::Convert { from: I32, to: F32 } => F32ConvertI32S, F32ConvertI32U, F32ReinterpretI32);
    set!(Typing::Convert { from: I64, to: F32 } => F32ConvertI64S, F32ConvertI64U);
    set!(Typing::Convert { from: F64, to: F32 } => F32DemoteF64);
    set!(Typing::Convert { from: I32, to: F64 } => F64ConvertI32S, F64ConvertI32U);
    set!(Typing::Convert { from: I64, to: F64 } => F64ConvertI64S, F64ConvertI64U, F64ReinterpretI64);
    set!(Typing::Convert { from: F32, to: F64 } => F64PromoteF32);

    table
};

/// Immediate of the load and store instructions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MemArg {
    /// Alignment hint, as a power of two.
    pub align: u32,
    pub offset: u32,
}

/// WebAssembly instruction opcode.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
pub enum Opcode {
    // Control
    Unreachable = 0x00,
    Nop = 0x01,
    Block = 0x02,
    Loop = 0x03,
    If = 0x04,
    Else = 0x05,
    End = 0x0b,
    Br = 0x0c,
    BrIf = 0x0d,
    BrTable = 0x0e,
    Return = 0x0f,
    Call = 0x10,
    CallIndirect = 0x11,

    // Parametric
    Drop = 0x1a,
    Select = 0x1b,

    // Variable
    LocalGet = 0x20,
    LocalSet = 0x21,
    LocalTee = 0x22,
    GlobalGet = 0x23,
    GlobalSet = 0x24,

    // Memory
    I32Load = 0x28,
    I64Load = 0x29,
    F32Load = 0x2a,
    F64Load = 0x2b,
    I32Load8S = 0x2c,
    I32Load8U = 0x2d,
    I32Load16S = 0x2e,
    I32Load16U = 0x2f,
    I64Load8S = 0x30,
    I64Load8U = 0x31,
    I64Load16S = 0x32,
    I64Load16U = 0x33,
    I64Load32S = 0x34,
    I64Load32U = 0x35,
    I32Store = 0x36,
    I64Store = 0x37,
    F32Store = 0x38,
    F64Store = 0x39,
    I32Store8 = 0x3a,
    I32Store16 = 0x3b,
    I64Store8 = 0x3c,
    I64Store16 = 0x3d,
    I64Store32 = 0x3e,
    MemorySize = 0x3f,
    MemoryGrow = 0x40,

    // Numeric
    I32Const = 0x41,
    I64Const = 0x42,
    F32Const = 0x43,
    F64Const = 0x44,
    I32Eqz = 0x45,
    I32Eq = 0x46,
    I32Ne = 0x47,
    I32LtS = 0x48,
    I32LtU = 0x49,
    I32GtS = 0x4a,
    I32GtU = 0x4b,
    I32LeS = 0x4c,
    I32LeU = 0x4d,
    I32GeS = 0x4e,
    I32GeU = 0x4f,
    I64Eqz = 0x50,
    I64Eq = 0x51,
    I64Ne = 0x52,
    I64LtS = 0x53,
    I64LtU = 0x54,
    I64GtS = 0x55,
    I64GtU = 0x56,
    I64LeS = 0x57,
    I64LeU = 0x58,
    I64GeS = 0x59,
    I64GeU = 0x5a,
    F32Eq = 0x5b,
    F32Ne = 0x5c,
    F32Lt = 0x5d,
    F32Gt = 0x5e,
    F32Le = 0x5f,
    F32Ge = 0x60,
    F64Eq = 0x61,
    F64Ne = 0x62,
    F64Lt = 0x63,
    F64Gt = 0x64,
    F64Le = 0x65,
    F64Ge = 0x66,
    I32Clz = 0x67,
    I32Ctz = 0x68,
    I32Popcnt = 0x69,
    I32Add = 0x6a,
    I32Sub = 0x6b,
    I32Mul = 0x6c,
    I32DivS = 0x6d,
    I32DivU = 0x6e,
    I32RemS = 0x6f,
    I32RemU = 0x70,
    I32And = 0x71,
    I32Or = 0x72,
    I32Xor = 0x73,
    I32Shl = 0x74,
    I32ShrS = 0x75,
    I32ShrU = 0x76,
    I32Rotl = 0x77,
    I32Rotr = 0x78,
    I64Clz = 0x79,
    I64Ctz = 0x7a,
    I64Popcnt = 0x7b,
    I64Add = 0x7c,
    I64Sub = 0x7d,
    I64Mul = 0x7e,
    I64DivS = 0x7f,
    I64DivU = 0x80,
    I64RemS = 0x81,
    I64RemU = 0x82,
    I64And = 0x83,
    I64Or = 0x84,
    I64Xor = 0x85,
    I64Shl = 0x86,
    I64ShrS = 0x87,
    I64ShrU = 0x88,
    I64Rotl = 0x89,
    I64Rotr = 0x8a,
    F32Abs = 0x8b,
    F32Neg = 0x8c,
    F32Ceil = 0x8d,
    F32Floor = 0x8e,
    F32Trunc = 0x8f,
    F32Nearest = 0x90,
    F32Sqrt = 0x91,
    F32Add = 0x92,
    F32Sub = 0x93,
    F32Mul = 0x94,
    F32Div = 0x95,
    F32Min = 0x96,
    F32Max = 0x97,
    F32Copysign = 0x98,
    F64Abs = 0x99,
    F64Neg = 0x9a,
    F64Ceil = 0x9b,
    F64Floor = 0x9c,
    F64Trunc = 0x9d,
    F64Nearest = 0x9e,
    F64Sqrt = 0x9f,
    F64Add = 0xa0,
    F64Sub = 0xa1,
    F64Mul = 0xa2,
    F64Div = 0xa3,
    F64Min = 0xa4,
    F64Max = 0xa5,
    F64Copysign = 0xa6,
    I32WrapI64 = 0xa7,
    I32TruncF32S = 0xa8,
    I32TruncF32U = 0xa9,
    I32TruncF64S = 0xaa,
    I32TruncF64U = 0xab,
    I64ExtendI32S = 0xac,
    I64ExtendI32U = 0xad,
    I64TruncF32S = 0xae,
    I64TruncF32U = 0xaf,
    I64TruncF64S = 0xb0,
    I64TruncF64U = 0xb1,
    F32ConvertI32S = 0xb2,
    F32ConvertI32U = 0xb3,
    F32ConvertI64S = 0xb4,
    F32ConvertI64U = 0xb5,
    F32DemoteF64 = 0xb6,
    F64ConvertI32S = 0xb7,
    F64ConvertI32U = 0xb8,
    F64ConvertI64S = 0xb9,
    F64ConvertI64U = 0xba,
    F64PromoteF32 = 0xbb,
    I32ReinterpretF32 = 0xbc,
    I64ReinterpretF64 = 0xbd,
    F32ReinterpretI32 = 0xbe,
    F64ReinterpretI64 = 0xbf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typing(byte: u8) -> Option<Typing> {
        Opcode::try_from(byte)
            .ok()
            .map(|op| OPCODE_TYPING[op as usize])
    }

    #[test]
    fn every_numeric_opcode_is_typed() {
        for byte in 0x45..=0xbf {
            let typing = typing(byte).unwrap();
            assert_ne!(typing, Typing::Structured, "opcode {byte:#x}");
        }
    }

    #[test]
    fn memory_accesses_are_typed() {
        for byte in 0x28..=0x35 {
            assert!(matches!(typing(byte), Some(Typing::Load { .. })), "opcode {byte:#x}");
        }
        for byte in 0x36..=0x3e {
            assert!(matches!(typing(byte), Some(Typing::Store { .. })), "opcode {byte:#x}");
        }
    }

    #[test]
    fn control_opcodes_are_structured() {
        for op in [
            Opcode::Block,
            Opcode::Loop,
            Opcode::If,
            Opcode::BrTable,
            Opcode::CallIndirect,
            Opcode::Select,
            Opcode::GlobalSet,
            Opcode::MemoryGrow,
            Opcode::I32Const,
            Opcode::F64Const,
        ] {
            assert_eq!(OPCODE_TYPING[op as usize], Typing::Structured, "{op:?}");
        }
    }

    #[test]
    fn unassigned_bytes_are_not_opcodes() {
        for byte in [0x06, 0x0a, 0x12, 0x19, 0x1c, 0x25, 0x27, 0xc0, 0xfc, 0xff] {
            assert!(Opcode::try_from(byte).is_err(), "byte {byte:#x}");
        }
    }

    #[test]
    fn conversions() {
        assert_eq!(
            OPCODE_TYPING[Opcode::I32WrapI64 as usize],
            Typing::Convert {
                from: ValType::I64,
                to: ValType::I32
            }
        );
        assert_eq!(
            OPCODE_TYPING[Opcode::F64PromoteF32 as usize],
            Typing::Convert {
                from: ValType::F32,
                to: ValType::F64
            }
        );
        assert_eq!(
            OPCODE_TYPING[Opcode::I64Load32U as usize],
            Typing::Load {
                ty: ValType::I64,
                size: 4
            }
        );
    }
}
