// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Decode trait implementations for WebAssembly wire types.

use num_enum::TryFromPrimitive;

use crate::Allocator;
use crate::core_compat::Vec;
use crate::types::*;

use super::{ContextId, Contextual, Decode, DecodeIn, Decoder, Error, Magic, check_count};

macro_rules! impl_contextual {
    ($type:ident<A: Allocator>, $id:path) => {
        impl<A: Allocator> Contextual for $type<A> {
            const ID: ContextId = $id;
        }
    };
    ($type:ty, $id:path) => {
        impl Contextual for $type {
            const ID: ContextId = $id;
        }
    };
}

macro_rules! impl_decode_for_u8_enum {
    ($type:ty) => {
        impl_decode_for_u8_enum!($type, Error::InvalidToken);
    };
    ($type:ty, $make_err:path) => {
        impl Decode for $type {
            fn decode(decoder: &mut Decoder<'_>) -> Result<Self, Error> {
                let byte = decoder.read_byte_raw()?;
                Self::try_from(byte).map_err(|_| $make_err(byte))
            }
        }
    };
}

macro_rules! impl_decode_for_le_u32_enum {
    ($type:ty, $make_err:path) => {
        impl Decode for $type {
            fn decode(decoder: &mut Decoder<'_>) -> Result<Self, Error> {
                let val = u32::from_le_bytes(decoder.cursor.read_array()?);
                Self::try_from(val).map_err(|_| $make_err(val))
            }
        }
    };
}

macro_rules! impl_decode_for_index {
    ($($type:ident),+ $(,)?) => {
        $(
            impl Decode for $type {
                fn decode(decoder: &mut Decoder<'_>) -> Result<Self, Error> {
                    Ok(Self::new(decoder.read_leb128_raw()?))
                }
            }
        )+
    };
}

// Single-valued tokens and flag bytes that only matter on the wire.

#[repr(u8)]
#[derive(Clone, Copy, Debug, TryFromPrimitive)]
enum FuncTypeToken {
    Value = 0x60,
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, TryFromPrimitive)]
enum LimitsToken {
    Initial = 0x00,
    InitialAndMaximum = 0x01,
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, TryFromPrimitive)]
enum MutabilityToken {
    Const = 0x00,
    Var = 0x01,
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, TryFromPrimitive)]
enum ExternalKindToken {
    Function = 0x00,
    Table = 0x01,
    Memory = 0x02,
    Global = 0x03,
}

impl_contextual!(u8, ContextId::Byte);
impl_contextual!(u32, ContextId::U32);
impl_contextual!(i32, ContextId::I32);
impl_contextual!(i64, ContextId::I64);
impl_contextual!(f32, ContextId::F32);
impl_contextual!(f64, ContextId::F64);
impl_contextual!(Magic, ContextId::Magic);
impl_contextual!(Version, ContextId::Version);
impl_contextual!(ValType, ContextId::ValType);
impl_contextual!(ResultType, ContextId::BlockType);
impl_contextual!(ElemType, ContextId::ElemType);
impl_contextual!(FuncTypeToken, ContextId::FuncType);
impl_contextual!(LimitsToken, ContextId::Limits);
impl_contextual!(MutabilityToken, ContextId::Mut);
impl_contextual!(ExternalKindToken, ContextId::Byte);
impl_contextual!(Limits, ContextId::Limits);
impl_contextual!(GlobalType, ContextId::GlobalType);
impl_contextual!(ImportKind, ContextId::ImportKind);
impl_contextual!(ExportKind, ContextId::ExportKind);
impl_contextual!(MemArg, ContextId::MemArg);
impl_contextual!(TypeIdx, ContextId::TypeIdx);
impl_contextual!(FuncIdx, ContextId::FuncIdx);
impl_contextual!(TableIdx, ContextId::TableIdx);
impl_contextual!(MemIdx, ContextId::MemIdx);
impl_contextual!(GlobalIdx, ContextId::GlobalIdx);
impl_contextual!(LocalIdx, ContextId::LocalIdx);
impl_contextual!(LabelIdx, ContextId::LabelIdx);
impl_contextual!(Name<A: Allocator>, ContextId::Name);
impl_contextual!(Signature<A: Allocator>, ContextId::FuncType);

impl_decode_for_u8_enum!(ElemType);
impl_decode_for_u8_enum!(FuncTypeToken);
impl_decode_for_u8_enum!(LimitsToken);
impl_decode_for_u8_enum!(MutabilityToken);
impl_decode_for_u8_enum!(ExternalKindToken);
impl_decode_for_u8_enum!(ValType, Error::InvalidValType);
impl_decode_for_u8_enum!(Opcode, Error::UnrecognizedOpcode);

impl_decode_for_le_u32_enum!(Magic, Error::InvalidMagic);
impl_decode_for_le_u32_enum!(Version, Error::UnknownVersion);

impl_decode_for_index!(TypeIdx, FuncIdx, TableIdx, MemIdx, GlobalIdx, LocalIdx, LabelIdx);

impl Decode for u8 {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, Error> {
        decoder.read_byte_raw()
    }
}

impl Decode for u32 {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, Error> {
        decoder.read_leb128_raw()
    }
}

impl Decode for i32 {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, Error> {
        decoder.read_leb128_raw()
    }
}

impl Decode for i64 {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, Error> {
        decoder.read_leb128_raw()
    }
}

impl Decode for f32 {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, Error> {
        Ok(f32::from_le_bytes(decoder.cursor.read_array()?))
    }
}

impl Decode for f64 {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, Error> {
        Ok(f64::from_le_bytes(decoder.cursor.read_array()?))
    }
}

impl Decode for ResultType {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, Error> {
        let byte = decoder.read_byte_raw()?;
        if byte == ResultType::VOID_ENCODING {
            return Ok(ResultType::Void);
        }
        ValType::try_from(byte)
            .map(ResultType::Value)
            .map_err(|_| Error::InvalidValType(byte))
    }
}

impl Decode for Limits {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, Error> {
        let token: LimitsToken = decoder.read()?;
        let initial = decoder.read()?;
        let maximum = match token {
            LimitsToken::Initial => None,
            LimitsToken::InitialAndMaximum => Some(decoder.read()?),
        };
        Ok(Self { initial, maximum })
    }
}

impl Decode for GlobalType {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, Error> {
        let ty = decoder.read()?;
        let mutable = match decoder.read::<MutabilityToken>()? {
            MutabilityToken::Const => false,
            MutabilityToken::Var => true,
        };
        Ok(Self { ty, mutable })
    }
}

impl Decode for ImportKind {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, Error> {
        Ok(match decoder.read::<ExternalKindToken>()? {
            ExternalKindToken::Function => ImportKind::Function(decoder.read()?),
            ExternalKindToken::Table => {
                decoder.read::<ElemType>()?;
                ImportKind::Table(decoder.read()?)
            }
            ExternalKindToken::Memory => ImportKind::Memory(decoder.read()?),
            ExternalKindToken::Global => ImportKind::Global(decoder.read()?),
        })
    }
}

impl Decode for ExportKind {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, Error> {
        Ok(match decoder.read::<ExternalKindToken>()? {
            ExternalKindToken::Function => ExportKind::Function(decoder.read()?),
            ExternalKindToken::Table => ExportKind::Table(decoder.read()?),
            ExternalKindToken::Memory => ExportKind::Memory(decoder.read()?),
            ExternalKindToken::Global => ExportKind::Global(decoder.read()?),
        })
    }
}

impl Decode for MemArg {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, Error> {
        Ok(Self {
            align: decoder.read()?,
            offset: decoder.read()?,
        })
    }
}

impl<A: Allocator> DecodeIn<A> for Name<A> {
    fn decode_in(decoder: &mut Decoder<'_>, alloc: &A) -> Result<Self, Error> {
        let name = decoder.read_name_str()?;
        Ok(Name::copy_in(name, alloc)?)
    }
}

impl<A: Allocator> DecodeIn<A> for Signature<A> {
    fn decode_in(decoder: &mut Decoder<'_>, alloc: &A) -> Result<Self, Error> {
        decoder.read::<FuncTypeToken>()?;

        let num_params = decoder.read_count(Cardinality::Params, MAX_PARAMS)?;
        let mut params = Vec::new_in(alloc.clone());
        params.try_reserve_exact(num_params as usize)?;
        for _ in 0..num_params {
            params.push(decoder.read()?);
        }

        let num_results: u32 = decoder.read()?;
        check_count(Cardinality::Results, u64::from(num_results), 1)?;
        let result = if num_results == 0 {
            ResultType::Void
        } else {
            ResultType::Value(decoder.read()?)
        };
        Ok(Self { params, result })
    }
}

// Decodes the local declarations at the start of a function body, returning
// the full list of locals with the parameters first.
pub(crate) fn decode_locals<A: Allocator>(
    decoder: &mut Decoder<'_>,
    params: &[ValType],
    alloc: &A,
) -> Result<Vec<ValType, A>, Error> {
    decoder.with_context(ContextId::Locals, |decoder| {
        let mut locals = Vec::new_in(alloc.clone());
        locals.try_reserve_exact(params.len())?;
        locals.extend_from_slice(params);

        let num_groups: u32 = decoder.read()?;
        for _ in 0..num_groups {
            let count: u32 = decoder.read()?;
            let ty: ValType = decoder.read()?;
            let total = locals.len() as u64 + u64::from(count);
            check_count(Cardinality::Locals, total, MAX_LOCALS)?;
            locals.try_reserve_exact(count as usize)?;
            locals.resize(total as usize, ty); // No allocation with previous reservation.
        }
        Ok(locals)
    })
}
