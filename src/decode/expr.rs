// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Decoding of constant initializer expressions, as used by global
//! definitions and segment offsets.

use crate::Allocator;
use crate::types::{GlobalIdx, IndexSpace, InitExpr, Opcode, ValType};
use crate::validate::Environment;

use super::{ContextId, Decoder, Error};

/// Decodes an initializer expression of type `expected`: a single constant
/// or `global.get` of an immutable imported global, followed by `end`.
pub(crate) fn decode_init_expr<A: Allocator>(
    decoder: &mut Decoder<'_>,
    env: &Environment<A>,
    expected: ValType,
) -> Result<InitExpr, Error> {
    decoder.with_context(ContextId::InitExpr, |decoder| {
        let opcode: u8 = decoder.read()?;
        let expr = match Opcode::try_from(opcode) {
            Ok(Opcode::I32Const) => InitExpr::I32(decoder.read()?),
            Ok(Opcode::I64Const) => InitExpr::I64(decoder.read()?),
            Ok(Opcode::F32Const) => InitExpr::F32(decoder.read()?),
            Ok(Opcode::F64Const) => InitExpr::F64(decoder.read()?),
            Ok(Opcode::GlobalGet) => {
                let index: GlobalIdx = decoder.read()?;
                let global = env.global(index).ok_or(Error::IndexOutOfBounds {
                    space: IndexSpace::Global,
                    index: *index,
                    capacity: env.num_globals(),
                })?;
                if !global.is_import() || global.is_mutable() {
                    return Err(Error::InvalidInitializerGlobal(index));
                }
                InitExpr::GetGlobal {
                    index,
                    ty: global.ty.ty,
                }
            }
            _ => return Err(Error::InvalidInitializerOpcode(opcode)),
        };

        let end: u8 = decoder.read()?;
        if end != Opcode::End as u8 {
            return Err(Error::UnterminatedInitializer(end));
        }
        if expr.ty() != expected {
            return Err(Error::InitializerTypeMismatch {
                expected,
                actual: expr.ty(),
            });
        }
        Ok(expr)
    })
}
