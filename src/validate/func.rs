// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Function body validation.
//!
//! Bodies are checked in a single forward pass over their instructions,
//! abstractly interpreting them over a stack of operand types and a stack of
//! control frames.

use crate::Allocator;
use crate::core_compat::{Vec, boxed_slice_in};
use crate::decode::{ContextId, Decode, Decoder, Error, ErrorWithContext, decode_locals};
use crate::types::*;

use super::Environment;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum FrameKind {
    Function,
    Block,
    Loop,
    If,
    Else,
}

#[derive(Clone, Copy, Debug)]
struct ControlFrame {
    kind: FrameKind,
    result: ResultType,
    // Operand stack height on entry.
    height: usize,
    // Whether the rest of the frame is dead code, after which the operand
    // stack is polymorphic down to `height`.
    unreachable: bool,
}

impl ControlFrame {
    // The values carried by a branch to this frame.
    fn label_type(&self) -> ResultType {
        match self.kind {
            FrameKind::Loop => ResultType::Void,
            _ => self.result,
        }
    }
}

// An operand type. Operands popped past the frame base in unreachable code
// are of unknown type and match anything.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Operand {
    Known(ValType),
    Unknown,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Action {
    Continue,
    End,
}

struct FunctionValidator<'v, A: Allocator> {
    env: &'v Environment<A>,
    locals: &'v [ValType],
    operands: Vec<Operand, A>,
    // The outermost frame, implicitly ended by the final `end`.
    function: ControlFrame,
    blocks: Vec<ControlFrame, A>,
}

impl<'v, A: Allocator> FunctionValidator<'v, A> {
    fn new(env: &'v Environment<A>, locals: &'v [ValType], result: ResultType) -> Self {
        let alloc = env.allocator();
        Self {
            env,
            locals,
            operands: Vec::new_in(alloc.clone()),
            function: ControlFrame {
                kind: FrameKind::Function,
                result,
                height: 0,
                unreachable: false,
            },
            blocks: Vec::new_in(alloc.clone()),
        }
    }

    fn current(&self) -> &ControlFrame {
        self.blocks.last().unwrap_or(&self.function)
    }

    fn current_mut(&mut self) -> &mut ControlFrame {
        match self.blocks.last_mut() {
            Some(frame) => frame,
            None => &mut self.function,
        }
    }

    fn label(&self, depth: LabelIdx) -> Result<ResultType, Error> {
        let depth = *depth as usize;
        let num_blocks = self.blocks.len();
        let frame = if depth < num_blocks {
            &self.blocks[num_blocks - 1 - depth]
        } else if depth == num_blocks {
            &self.function
        } else {
            return Err(Error::IndexOutOfBounds {
                space: IndexSpace::Label,
                index: depth as u32,
                capacity: num_blocks as u32 + 1,
            });
        };
        Ok(frame.label_type())
    }

    fn push(&mut self, operand: Operand) -> Result<(), Error> {
        self.operands.try_reserve(1)?;
        self.operands.push(operand);
        Ok(())
    }

    fn push_val(&mut self, ty: ValType) -> Result<(), Error> {
        self.push(Operand::Known(ty))
    }

    fn push_result(&mut self, result: ResultType) -> Result<(), Error> {
        match result {
            ResultType::Void => Ok(()),
            ResultType::Value(ty) => self.push_val(ty),
        }
    }

    fn pop_any(&mut self) -> Result<Operand, Error> {
        let frame = self.current();
        if self.operands.len() == frame.height {
            return if frame.unreachable {
                Ok(Operand::Unknown)
            } else {
                Err(Error::StackUnderflow)
            };
        }
        Ok(self.operands.pop().unwrap_or(Operand::Unknown))
    }

    fn pop(&mut self, expected: ValType) -> Result<(), Error> {
        match self.pop_any()? {
            Operand::Known(actual) if actual != expected => {
                Err(Error::TypeMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }

    fn pop_result(&mut self, result: ResultType) -> Result<(), Error> {
        match result {
            ResultType::Void => Ok(()),
            ResultType::Value(ty) => self.pop(ty),
        }
    }

    fn pop_params(&mut self, params: &[ValType]) -> Result<(), Error> {
        for &param in params.iter().rev() {
            self.pop(param)?;
        }
        Ok(())
    }

    fn set_unreachable(&mut self) {
        let height = self.current().height;
        self.operands.truncate(height);
        self.current_mut().unreachable = true;
    }

    fn push_block(&mut self, kind: FrameKind, result: ResultType) -> Result<(), Error> {
        self.blocks.try_reserve(1)?;
        self.blocks.push(ControlFrame {
            kind,
            result,
            height: self.operands.len(),
            unreachable: false,
        });
        Ok(())
    }

    // Checks that the current frame's operands are exactly its result,
    // leaving the operand stack at the frame's entry height.
    fn check_block_end(&mut self) -> Result<ControlFrame, Error> {
        let frame = *self.current();
        let arity = frame.result.arity();
        let available = self.operands.len() - frame.height;
        if available > arity || (!frame.unreachable && available < arity) {
            return Err(Error::ArityMismatch {
                expected: arity as u32,
                actual: available as u32,
            });
        }
        self.pop_result(frame.result)?;
        Ok(frame)
    }

    fn on_else(&mut self) -> Result<(), Error> {
        if self.current().kind != FrameKind::If {
            return Err(Error::UnexpectedElse);
        }
        self.check_block_end()?;
        let frame = self.current_mut();
        frame.kind = FrameKind::Else;
        frame.unreachable = false;
        Ok(())
    }

    fn on_end(&mut self) -> Result<Action, Error> {
        let frame = *self.current();
        if frame.kind == FrameKind::If && frame.result != ResultType::Void {
            return Err(Error::IfWithoutElse);
        }
        self.check_block_end()?;
        if self.blocks.pop().is_none() {
            return Ok(Action::End);
        }
        self.push_result(frame.result)?;
        Ok(Action::Continue)
    }

    fn on_br_table(&mut self, decoder: &mut Decoder<'_>) -> Result<(), Error> {
        let (expected, default) = decoder.with_context(ContextId::BrTable, |decoder| {
            let count = decoder.read_count(Cardinality::BrTableTargets, MAX_BR_TABLE_ELEMS)?;
            let mut expected = None;
            for _ in 0..count {
                let ty = self.label(decoder.read()?)?;
                match expected {
                    None => expected = Some(ty),
                    Some(expected) if expected != ty => {
                        return Err(Error::BrTableTypeMismatch {
                            expected,
                            actual: ty,
                        });
                    }
                    Some(_) => {}
                }
            }
            let default = self.label(decoder.read()?)?;
            Ok((expected, default))
        })?;
        if let Some(expected) = expected
            && expected != default
        {
            return Err(Error::BrTableTypeMismatch {
                expected,
                actual: default,
            });
        }
        self.pop(ValType::I32)?;
        self.pop_result(default)?;
        self.set_unreachable();
        Ok(())
    }

    fn local(&self, idx: LocalIdx) -> Result<ValType, Error> {
        self.locals
            .get(*idx as usize)
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                space: IndexSpace::Local,
                index: *idx,
                capacity: self.locals.len() as u32,
            })
    }

    fn global(&self, idx: GlobalIdx) -> Result<&'v GlobalDesc, Error> {
        let env = self.env;
        env.validate(&idx)?;
        env.global(idx).ok_or(Error::IndexOutOfBounds {
            space: IndexSpace::Global,
            index: *idx,
            capacity: env.num_globals(),
        })
    }

    fn require_memory(&self) -> Result<(), Error> {
        if self.env.memory().is_some() {
            Ok(())
        } else {
            Err(Error::MissingMemory)
        }
    }

    fn read_memarg(&self, decoder: &mut Decoder<'_>, size: u32) -> Result<MemArg, Error> {
        self.require_memory()?;
        let memarg: MemArg = decoder.read()?;
        let natural = size.trailing_zeros();
        if memarg.align > natural {
            return Err(Error::MisalignedAccess {
                align: memarg.align,
                natural,
            });
        }
        Ok(memarg)
    }

    fn step(&mut self, decoder: &mut Decoder<'_>, opcode: Opcode) -> Result<Action, Error> {
        match OPCODE_TYPING[opcode as usize] {
            Typing::Structured => return self.step_structured(decoder, opcode),
            Typing::Unary(ty) => {
                self.pop(ty)?;
                self.push_val(ty)?;
            }
            Typing::Binary(ty) => {
                self.pop(ty)?;
                self.pop(ty)?;
                self.push_val(ty)?;
            }
            Typing::Test(ty) => {
                self.pop(ty)?;
                self.push_val(ValType::I32)?;
            }
            Typing::Compare(ty) => {
                self.pop(ty)?;
                self.pop(ty)?;
                self.push_val(ValType::I32)?;
            }
            Typing::Convert { from, to } => {
                self.pop(from)?;
                self.push_val(to)?;
            }
            Typing::Load { ty, size } => {
                self.read_memarg(decoder, size)?;
                self.pop(ValType::I32)?;
                self.push_val(ty)?;
            }
            Typing::Store { ty, size } => {
                self.read_memarg(decoder, size)?;
                self.pop(ty)?;
                self.pop(ValType::I32)?;
            }
        }
        Ok(Action::Continue)
    }

    fn step_structured(&mut self, decoder: &mut Decoder<'_>, opcode: Opcode) -> Result<Action, Error> {
        let env = self.env;
        match opcode {
            Opcode::Unreachable => self.set_unreachable(),
            Opcode::Nop => {}
            Opcode::Block => {
                let result = decoder.read()?;
                self.push_block(FrameKind::Block, result)?;
            }
            Opcode::Loop => {
                let result = decoder.read()?;
                self.push_block(FrameKind::Loop, result)?;
            }
            Opcode::If => {
                let result = decoder.read()?;
                self.pop(ValType::I32)?;
                self.push_block(FrameKind::If, result)?;
            }
            Opcode::Else => self.on_else()?,
            Opcode::End => return self.on_end(),
            Opcode::Br => {
                let ty = self.label(decoder.read()?)?;
                self.pop_result(ty)?;
                self.set_unreachable();
            }
            Opcode::BrIf => {
                let ty = self.label(decoder.read()?)?;
                self.pop(ValType::I32)?;
                self.pop_result(ty)?;
                self.push_result(ty)?;
            }
            Opcode::BrTable => self.on_br_table(decoder)?,
            Opcode::Return => {
                let result = self.function.result;
                self.pop_result(result)?;
                self.set_unreachable();
            }
            Opcode::Call => {
                let func: FuncIdx = decoder.read()?;
                env.validate(&func)?;
                let sig = env.func_signature(func).ok_or(Error::IndexOutOfBounds {
                    space: IndexSpace::Function,
                    index: *func,
                    capacity: env.num_funcs(),
                })?;
                self.pop_params(&sig.params)?;
                self.push_result(sig.result)?;
            }
            Opcode::CallIndirect => {
                if env.table().is_none() {
                    return Err(Error::MissingTable);
                }
                let type_idx: TypeIdx = decoder.read()?;
                env.validate(&type_idx)?;
                decoder.read_zero_byte()?;
                let sig = env.signature(type_idx).ok_or(Error::IndexOutOfBounds {
                    space: IndexSpace::Type,
                    index: *type_idx,
                    capacity: env.num_sigs(),
                })?;
                self.pop(ValType::I32)?;
                self.pop_params(&sig.params)?;
                self.push_result(sig.result)?;
            }
            Opcode::Drop => {
                self.pop_any()?;
            }
            Opcode::Select => {
                self.pop(ValType::I32)?;
                let first = self.pop_any()?;
                let operand = match first {
                    Operand::Known(ty) => {
                        self.pop(ty)?;
                        first
                    }
                    Operand::Unknown => self.pop_any()?,
                };
                self.push(operand)?;
            }
            Opcode::LocalGet => {
                let ty = self.local(decoder.read()?)?;
                self.push_val(ty)?;
            }
            Opcode::LocalSet => {
                let ty = self.local(decoder.read()?)?;
                self.pop(ty)?;
            }
            Opcode::LocalTee => {
                let ty = self.local(decoder.read()?)?;
                self.pop(ty)?;
                self.push_val(ty)?;
            }
            Opcode::GlobalGet => {
                let global = self.global(decoder.read()?)?;
                self.push_val(global.ty.ty)?;
            }
            Opcode::GlobalSet => {
                let idx: GlobalIdx = decoder.read()?;
                let global = self.global(idx)?;
                if !global.is_mutable() {
                    return Err(Error::ImmutableGlobalWrite(idx));
                }
                self.pop(global.ty.ty)?;
            }
            Opcode::MemorySize => {
                self.require_memory()?;
                decoder.read_zero_byte()?;
                self.push_val(ValType::I32)?;
            }
            Opcode::MemoryGrow => {
                self.require_memory()?;
                decoder.read_zero_byte()?;
                self.pop(ValType::I32)?;
                self.push_val(ValType::I32)?;
            }
            Opcode::I32Const => {
                decoder.read::<i32>()?;
                self.push_val(ValType::I32)?;
            }
            Opcode::I64Const => {
                decoder.read::<i64>()?;
                self.push_val(ValType::I64)?;
            }
            Opcode::F32Const => {
                decoder.read::<f32>()?;
                self.push_val(ValType::F32)?;
            }
            Opcode::F64Const => {
                decoder.read::<f64>()?;
                self.push_val(ValType::F64)?;
            }
            _ => unreachable!("{opcode:?} has a typing table entry"),
        }
        Ok(Action::Continue)
    }

    fn validate(&mut self, decoder: &mut Decoder<'_>) -> Result<(), Error> {
        loop {
            let action = decoder.with_context(ContextId::Instr, |decoder| {
                let opcode = Opcode::decode(decoder)?;
                self.step(decoder, opcode)
            })?;
            if action == Action::End {
                return Ok(());
            }
        }
    }
}

// Decodes the locals and validates the instructions of `func`'s body,
// returning its locals (parameters first). The decoder is left after the
// final `end`.
fn validate_body<A: Allocator>(
    decoder: &mut Decoder<'_>,
    env: &Environment<A>,
    func: FuncIdx,
) -> Result<Vec<ValType, A>, Error> {
    env.validate(&func)?;
    let sig = env.func_signature(func).ok_or(Error::IndexOutOfBounds {
        space: IndexSpace::Function,
        index: *func,
        capacity: env.num_funcs(),
    })?;
    let locals = decode_locals(decoder, &sig.params, env.allocator())?;
    FunctionValidator::new(env, &locals, sig.result).validate(decoder)?;
    Ok(locals)
}

// Decodes and validates a size-prefixed function body from the code section.
pub(crate) fn decode_function_body<A: Allocator>(
    decoder: &mut Decoder<'_>,
    env: &Environment<A>,
    func: FuncIdx,
) -> Result<FunctionBody<A>, Error> {
    decoder.with_context(ContextId::Func, |decoder| {
        let size: u32 = decoder.read()?;
        if size as usize > decoder.remaining() {
            return Err(Error::UnexpectedEof);
        }
        let start = decoder.offset();
        let locals = validate_body(decoder, env, func)?;
        let actual = decoder.offset() - start;
        if actual != size as usize {
            return Err(Error::InvalidFunctionLength {
                expected: size,
                actual: actual as u32,
            });
        }
        let code = boxed_slice_in(decoder.consumed(start, decoder.offset()), env.allocator().clone())?;
        Ok(FunctionBody {
            func,
            locals,
            code,
            bytecode_offset: start as u32,
        })
    })
}

/// Validates the body of a defined function against a fully decoded
/// environment.
///
/// `body` holds the body bytes without their size prefix, and
/// `bytecode_offset` is where they sit in the module bytes. Bodies only
/// depend on the environment, so they can be validated independently of each
/// other and in any order.
pub fn validate_function_body<A: Allocator>(
    env: &Environment<A>,
    func: FuncIdx,
    body: &[u8],
    bytecode_offset: u32,
) -> Result<FunctionBody<A>, ErrorWithContext> {
    let mut decoder = Decoder::new(body);
    let result = decoder.with_context(ContextId::Func, |decoder| {
        let locals = validate_body(decoder, env, func)?;
        if !decoder.done() {
            return Err(Error::InvalidFunctionLength {
                expected: body.len() as u32,
                actual: decoder.offset() as u32,
            });
        }
        let code = boxed_slice_in(body, env.allocator().clone())?;
        Ok(FunctionBody {
            func,
            locals,
            code,
            bytecode_offset,
        })
    });
    result.map_err(|error| decoder.into_error(error))
}
