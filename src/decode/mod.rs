// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! WebAssembly binary format decoding.
//!
//! Decoding and validation happen in the same pass: every section decoder
//! checks what it reads against the index spaces decoded so far, and the code
//! section hands each function body to the validator in [`crate::validate`].

mod cursor;
mod decodable_impls;
mod expr;
mod leb128;
mod sections;

pub(crate) use cursor::Cursor;
pub(crate) use decodable_impls::decode_locals;
pub(crate) use expr::decode_init_expr;
pub(crate) use sections::decode_module;

use core::fmt;

use num_enum::TryFromPrimitive;

use leb128::Leb128;

use crate::Allocator;
use crate::builder::Rejection;
use crate::core_compat::TryReserveError;
use crate::types::{Cardinality, FuncIdx, GlobalIdx, IndexSpace, Limits, ResultType, SectionId, ValType};

// The maximum nesting of decoding context tracked for error reporting.
const MAX_DEPTH: usize = 8;

// We represent this as an enum with one value to leverage existing "decode this
// u32 enum" machinery to check for a valid magic value.
#[derive(Clone, Copy, Debug, TryFromPrimitive)]
#[repr(u32)]
enum Magic {
    Value = 0x6d_73_61_00, // '\0asm'
}

// Represents decoding context.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(u8)]
pub(crate) enum ContextId {
    #[default]
    Invalid,
    BlockType,
    BrTable,
    Byte,
    CodeSec,
    CustomSec,
    Data,
    DataSec,
    Elem,
    ElemSec,
    ElemType,
    Export,
    ExportKind,
    ExportSec,
    F32,
    F64,
    Func,
    FuncIdx,
    FuncName,
    FuncSec,
    FuncType,
    Global,
    GlobalIdx,
    GlobalSec,
    GlobalType,
    I32,
    I64,
    Import,
    ImportKind,
    ImportSec,
    InitExpr,
    Instr,
    LabelIdx,
    Limits,
    LocalIdx,
    LocalName,
    Locals,
    Magic,
    MemArg,
    MemIdx,
    MemorySec,
    Mut,
    Name,
    NameSec,
    ReadingBytes,
    SectionSize,
    SkippingBytes,
    StartSec,
    TableIdx,
    TableSec,
    TypeIdx,
    TypeSec,
    U32,
    UnknownSec,
    ValType,
    Version,
}

impl From<ContextId> for &'static str {
    fn from(id: ContextId) -> Self {
        match id {
            ContextId::Invalid => unreachable!("invalid context somehow reached!?"),
            ContextId::BlockType => "blocktype",
            ContextId::BrTable => "br_table targets",
            ContextId::Byte => "byte",
            ContextId::CodeSec => "codesec",
            ContextId::CustomSec => "customsec",
            ContextId::Data => "data",
            ContextId::DataSec => "datasec",
            ContextId::Elem => "elem",
            ContextId::ElemSec => "elemsec",
            ContextId::ElemType => "elemtype",
            ContextId::Export => "export",
            ContextId::ExportKind => "export kind",
            ContextId::ExportSec => "exportsec",
            ContextId::F32 => "f32",
            ContextId::F64 => "f64",
            ContextId::Func => "func",
            ContextId::FuncIdx => "funcidx",
            ContextId::FuncName => "function name",
            ContextId::FuncSec => "funcsec",
            ContextId::FuncType => "functype",
            ContextId::Global => "global",
            ContextId::GlobalIdx => "globalidx",
            ContextId::GlobalSec => "globalsec",
            ContextId::GlobalType => "globaltype",
            ContextId::I32 => "i32",
            ContextId::I64 => "i64",
            ContextId::Import => "import",
            ContextId::ImportKind => "import kind",
            ContextId::ImportSec => "importsec",
            ContextId::InitExpr => "initializer expression",
            ContextId::Instr => "instr",
            ContextId::LabelIdx => "labelidx",
            ContextId::Limits => "limits",
            ContextId::LocalIdx => "localidx",
            ContextId::LocalName => "local name",
            ContextId::Locals => "locals",
            ContextId::Magic => "magic",
            ContextId::MemArg => "memarg",
            ContextId::MemIdx => "memidx",
            ContextId::MemorySec => "memsec",
            ContextId::Mut => "mut",
            ContextId::Name => "name",
            ContextId::NameSec => "namesec",
            ContextId::ReadingBytes => "reading bytes",
            ContextId::SectionSize => "section size",
            ContextId::SkippingBytes => "skipping bytes",
            ContextId::StartSec => "startsec",
            ContextId::TableIdx => "tableidx",
            ContextId::TableSec => "tablesec",
            ContextId::TypeIdx => "typeidx",
            ContextId::TypeSec => "typesec",
            ContextId::U32 => "u32",
            ContextId::UnknownSec => "unknown section",
            ContextId::ValType => "valtype",
            ContextId::Version => "version",
        }
    }
}

pub(crate) trait Contextual {
    const ID: ContextId;
}

// A frame of decoding context.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct ContextFrame {
    // A description of what is being decoded.
    context: &'static str,

    // Byte offset where this context was entered.
    offset: usize,
}

/// Stack for tracking decoding context during error reporting.
#[derive(Clone, Debug, Default)]
pub(crate) struct ContextStack {
    offsets: [usize; MAX_DEPTH],
    ids: [ContextId; MAX_DEPTH],
    depth: u8,
}

impl ContextStack {
    // Pushes a new context frame, returning true if successful.
    fn push(&mut self, id: ContextId, offset: usize) -> bool {
        let depth = self.depth as usize;
        if depth >= MAX_DEPTH {
            return false;
        }
        self.offsets[depth] = offset;
        self.ids[depth] = id;
        self.depth += 1;
        true
    }

    fn pop(&mut self) {
        debug_assert!(self.depth > 0, "{self:#?}");
        self.depth -= 1;
    }

    fn depth(&self) -> u8 {
        self.depth
    }

    // Drops any frames left behind by a failure that was recovered from.
    fn truncate(&mut self, depth: u8) {
        self.depth = self.depth.min(depth);
    }

    // Returns an iterator over frames in "pushed" order (outermost to
    // innermost).
    fn iter(&self) -> impl Iterator<Item = ContextFrame> + '_ {
        self.offsets
            .iter()
            .zip(&self.ids)
            .take(self.depth as usize)
            .map(|(&offset, &id)| ContextFrame {
                context: id.into(),
                offset,
            })
    }
}

/// A decoding error with additional context around what hierarchy of things
/// were being decoded at the time.
#[derive(Clone)]
pub struct ErrorWithContext {
    /// The underlying error.
    pub error: Error,
    pub(crate) context: ContextStack,
}

impl ErrorWithContext {
    /// The broad category of the failure.
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    /// Byte offset of the innermost thing being decoded, if known.
    pub fn offset(&self) -> Option<usize> {
        self.context.iter().last().map(|frame| frame.offset)
    }
}

impl fmt::Debug for ErrorWithContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        for (i, frame) in self.context.iter().enumerate() {
            write!(f, "\n{:#x}: ", frame.offset)?;
            for _ in 0..i {
                write!(f, "  ")?;
            }
            write!(f, "{}", frame.context)?;
        }
        Ok(())
    }
}

impl fmt::Display for ErrorWithContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.context.iter().last() {
            Some(frame) => write!(f, "at {:#x} ({}): {}", frame.offset, frame.context, self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

impl core::error::Error for ErrorWithContext {}

/// The broad categories of decoding failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The bytes do not follow the binary encoding.
    MalformedEncoding,
    /// Sections, counts, or indices are inconsistent with each other.
    StructuralViolation,
    /// An instruction sequence or initializer is not well-typed.
    TypeViolation,
    /// Something is used that the module does not declare, or the module
    /// builder refused it.
    SemanticPrecondition,
    /// Allocation failed.
    OutOfMemory,
}

/// Represents errors that can arise while decoding and validating a module.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// Failed memory allocation.
    AllocError,
    /// The operand stack does not hold exactly the values a block yields.
    ArityMismatch { expected: u32, actual: u32 },
    /// The targets of a `br_table` disagree on the values they carry.
    BrTableTypeMismatch {
        expected: ResultType,
        actual: ResultType,
    },
    /// A data section was given without a memory.
    DataWithoutMemory,
    /// An export name appears more than once; the index is that of the
    /// second occurrence.
    DuplicateExportName { index: u32 },
    /// A given section appears more than once in the module.
    DuplicateSection(SectionId),
    /// Decoder context stack exceeded its maximum depth.
    ExcessiveParsingDepth {
        context: &'static str,
        offset: usize,
    },
    /// The code section and the function section disagree on the number of
    /// defined functions.
    FunctionAndCodeSectionMismatch {
        funcsec_size: u32,
        codesec_size: u32,
    },
    /// An `if` without `else` yields a value.
    IfWithoutElse,
    /// `global.set` on an immutable global.
    ImmutableGlobalWrite(GlobalIdx),
    /// An index exceeds the size of the index space it refers to.
    IndexOutOfBounds {
        space: IndexSpace,
        index: u32,
        capacity: u32,
    },
    /// An initializer expression does not produce the expected type.
    InitializerTypeMismatch { expected: ValType, actual: ValType },
    /// Function body length doesn't match the declared length.
    InvalidFunctionLength { expected: u32, actual: u32 },
    /// An initializer reads a global that is not an immutable import.
    InvalidInitializerGlobal(GlobalIdx),
    /// An initializer contains an opcode other than a constant or
    /// `global.get`.
    InvalidInitializerOpcode(u8),
    /// Invalid LEB128 encoding encountered.
    InvalidLeb128,
    /// Limits are out of range, or the maximum is below the initial size.
    InvalidLimits(Limits),
    /// Invalid WebAssembly magic number.
    InvalidMagic(u32),
    /// Section length doesn't match the declared length.
    InvalidSectionLength {
        id: SectionId,
        expected: u32,
        actual: u32,
    },
    /// The start function takes parameters or returns a value.
    InvalidStartFunction(FuncIdx),
    /// Invalid byte token encountered.
    InvalidToken(u8),
    /// Invalid UTF-8 encoding in a name.
    InvalidUtf8,
    /// Invalid value type encoding encountered.
    InvalidValType(u8),
    /// A memory access claims more alignment than its natural alignment
    /// (both as powers of two).
    MisalignedAccess { align: u32, natural: u32 },
    /// A memory instruction in a module without memory.
    MissingMemory,
    /// `call_indirect` in a module without a table.
    MissingTable,
    /// More than one memory was imported or defined.
    MultipleMemories,
    /// More than one table was imported or defined.
    MultipleTables,
    /// (Non-custom) sections appear in the wrong order.
    OutOfOrderSection { before: SectionId, after: SectionId },
    /// The module builder refused a declaration.
    Rejected(&'static str),
    /// An instruction pops more values than its block has available.
    StackUnderflow,
    /// The table section does not declare exactly one table.
    TableCount(u32),
    /// An implementation limit was exceeded.
    TooMany { what: Cardinality, count: u64 },
    /// An operand has the wrong type.
    TypeMismatch { expected: ValType, actual: ValType },
    /// An `else` outside of an `if`, or a second `else`.
    UnexpectedElse,
    /// The bytes ended before the thing being decoded did.
    UnexpectedEof,
    /// Unsupported WebAssembly version number.
    UnknownVersion(u32),
    /// An unrecognized opcode.
    UnrecognizedOpcode(u8),
    /// An initializer expression is not followed by `end`.
    UnterminatedInitializer(u8),
}

impl Error {
    /// The broad category of the failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ExcessiveParsingDepth { .. }
            | Error::InvalidInitializerOpcode(_)
            | Error::InvalidLeb128
            | Error::InvalidMagic(_)
            | Error::InvalidToken(_)
            | Error::InvalidUtf8
            | Error::InvalidValType(_)
            | Error::UnexpectedEof
            | Error::UnknownVersion(_)
            | Error::UnrecognizedOpcode(_)
            | Error::UnterminatedInitializer(_) => ErrorKind::MalformedEncoding,

            Error::DuplicateExportName { .. }
            | Error::DuplicateSection(_)
            | Error::FunctionAndCodeSectionMismatch { .. }
            | Error::IndexOutOfBounds { .. }
            | Error::InvalidFunctionLength { .. }
            | Error::InvalidInitializerGlobal(_)
            | Error::InvalidLimits(_)
            | Error::InvalidSectionLength { .. }
            | Error::MultipleMemories
            | Error::MultipleTables
            | Error::OutOfOrderSection { .. }
            | Error::TableCount(_)
            | Error::TooMany { .. } => ErrorKind::StructuralViolation,

            Error::ArityMismatch { .. }
            | Error::BrTableTypeMismatch { .. }
            | Error::IfWithoutElse
            | Error::ImmutableGlobalWrite(_)
            | Error::InitializerTypeMismatch { .. }
            | Error::InvalidStartFunction(_)
            | Error::MisalignedAccess { .. }
            | Error::StackUnderflow
            | Error::TypeMismatch { .. }
            | Error::UnexpectedElse => ErrorKind::TypeViolation,

            Error::DataWithoutMemory
            | Error::MissingMemory
            | Error::MissingTable
            | Error::Rejected(_) => ErrorKind::SemanticPrecondition,

            Error::AllocError => ErrorKind::OutOfMemory,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AllocError => write!(f, "allocation failure"),
            Error::ArityMismatch { expected, actual } => write!(
                f,
                "block yields {actual} value(s) where {expected} are expected"
            ),
            Error::BrTableTypeMismatch { expected, actual } => write!(
                f,
                "br_table targets disagree: {actual:?} where {expected:?} is carried elsewhere"
            ),
            Error::DataWithoutMemory => write!(f, "data section requires a memory section"),
            Error::DuplicateExportName { index } => {
                write!(f, "duplicate export name (export {index})")
            }
            Error::DuplicateSection(id) => write!(f, "duplicate of section ({id:?})"),
            Error::ExcessiveParsingDepth { context, offset } => {
                write!(f, "unexpected frame at {offset:#x}: {context}")
            }
            Error::FunctionAndCodeSectionMismatch {
                funcsec_size,
                codesec_size,
            } => write!(
                f,
                "{funcsec_size} function(s) declared but {codesec_size} bodies given"
            ),
            Error::IfWithoutElse => write!(f, "if without else cannot yield a value"),
            Error::ImmutableGlobalWrite(idx) => {
                write!(f, "can't write immutable global {}", **idx)
            }
            Error::IndexOutOfBounds {
                space,
                index,
                capacity,
            } => write!(
                f,
                "{space:?} index {index} out of bounds (capacity {capacity})"
            ),
            Error::InitializerTypeMismatch { expected, actual } => write!(
                f,
                "initializer expression has type {actual:?}; expected {expected:?}"
            ),
            Error::InvalidFunctionLength { expected, actual } => write!(
                f,
                "invalid func length: expected {expected:#x}; got {actual:#x}"
            ),
            Error::InvalidInitializerGlobal(idx) => write!(
                f,
                "initializer expression must reference an immutable imported global (got {})",
                **idx
            ),
            Error::InvalidInitializerOpcode(op) => {
                write!(f, "unrecognized initializer opcode ({op:#x})")
            }
            Error::InvalidLeb128 => write!(f, "invalid LEB128-encoding"),
            Error::InvalidLimits(limits) => write!(f, "invalid limits ({limits:?})"),
            Error::InvalidMagic(magic) => write!(f, "invalid magic ({magic:#x})"),
            Error::InvalidSectionLength {
                id,
                expected,
                actual,
            } => write!(
                f,
                "invalid section length for {id:?}: expected {expected:#x}; got {actual:#x}"
            ),
            Error::InvalidStartFunction(idx) => write!(
                f,
                "start function {} must take no arguments and return nothing",
                **idx
            ),
            Error::InvalidToken(token) => write!(f, "invalid byte token ({token:#x})"),
            Error::InvalidUtf8 => write!(f, "invalid UTF-8"),
            Error::InvalidValType(valtype) => write!(f, "invalid valtype ({valtype:#x})"),
            Error::MisalignedAccess { align, natural } => write!(
                f,
                "alignment 2^{align} exceeds natural alignment 2^{natural}"
            ),
            Error::MissingMemory => write!(f, "can't touch memory without memory"),
            Error::MissingTable => write!(f, "can't call_indirect without a table"),
            Error::MultipleMemories => write!(f, "already have default memory"),
            Error::MultipleTables => write!(f, "already have default table"),
            Error::OutOfOrderSection { before, after } => {
                write!(f, "out-of-order sections: {before:?} before {after:?}")
            }
            Error::Rejected(reason) => write!(f, "{reason}"),
            Error::StackUnderflow => write!(f, "popping value from empty stack"),
            Error::TableCount(count) => {
                write!(f, "the number of tables must be exactly one (got {count})")
            }
            Error::TooMany { what, count } => write!(f, "too many {what:?}: {count}"),
            Error::TypeMismatch { expected, actual } => {
                write!(f, "type mismatch: expected {expected:?}; got {actual:?}")
            }
            Error::UnexpectedElse => write!(f, "else does not match an if"),
            Error::UnexpectedEof => write!(f, "unexpected end of bytes"),
            Error::UnknownVersion(version) => write!(f, "unknown version ({version:#x})"),
            Error::UnrecognizedOpcode(op) => write!(f, "unrecognized opcode ({op:#x})"),
            Error::UnterminatedInitializer(op) => write!(
                f,
                "initializer expression not terminated by end (got {op:#x})"
            ),
        }
    }
}

impl From<Rejection> for Error {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::Unsupported(reason) => Error::Rejected(reason),
            Rejection::OutOfMemory => Error::AllocError,
        }
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Error::AllocError
    }
}

// Checks that `count` does not exceed `max`.
pub(crate) fn check_count(what: Cardinality, count: u64, max: u32) -> Result<(), Error> {
    if count > u64::from(max) {
        Err(Error::TooMany { what, count })
    } else {
        Ok(())
    }
}

// A section that has been started but not yet finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SectionFrame {
    id: SectionId,
    // Offset of the first byte after the size.
    start: usize,
    size: u32,
}

impl SectionFrame {
    fn end(&self) -> usize {
        self.start + self.size as usize
    }
}

pub(crate) struct Decoder<'a> {
    cursor: Cursor<'a>,
    context: ContextStack,

    // Known sections decoded so far, as a bitmask of IDs, and the last one.
    seen: u16,
    last: Option<SectionId>,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
            context: ContextStack::default(),
            seen: 0,
            last: None,
        }
    }

    // Packages an error with the context it was raised in.
    pub(crate) fn into_error(self, error: Error) -> ErrorWithContext {
        ErrorWithContext {
            error,
            context: self.context,
        }
    }

    // Pushes a context frame before a call, popping it if successful.
    pub(crate) fn with_context<F, R>(&mut self, id: ContextId, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut Self) -> Result<R, Error>,
    {
        let offset = self.cursor.offset();
        if !self.context.push(id, offset) {
            return Err(Error::ExcessiveParsingDepth {
                context: id.into(),
                offset,
            });
        }
        let val = f(self)?;
        self.context.pop();
        Ok(val)
    }

    pub(crate) fn offset(&self) -> usize {
        self.cursor.offset()
    }

    pub(crate) fn done(&self) -> bool {
        self.cursor.done()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    // The bytes between two offsets already consumed.
    pub(crate) fn consumed(&self, start: usize, end: usize) -> &'a [u8] {
        &self.cursor.buffer()[start..end]
    }

    fn read_byte_raw(&mut self) -> Result<u8, Error> {
        self.cursor.read_byte()
    }

    fn read_leb128_raw<T: Leb128>(&mut self) -> Result<T, Error> {
        let cursor = &mut self.cursor;
        leb128::read(|| cursor.read_byte())
    }

    pub(crate) fn read_zero_byte(&mut self) -> Result<(), Error> {
        self.with_context(ContextId::Byte, |decoder| {
            let byte = decoder.read_byte_raw()?;
            if byte == 0 {
                Ok(())
            } else {
                Err(Error::InvalidToken(byte))
            }
        })
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], Error> {
        self.with_context(ContextId::ReadingBytes, |decoder| {
            decoder.cursor.read_slice(len)
        })
    }

    pub(crate) fn skip_bytes(&mut self, len: usize) -> Result<(), Error> {
        self.with_context(ContextId::SkippingBytes, |decoder| decoder.cursor.skip(len))
    }

    // Reads a length-prefixed UTF-8 name without copying it.
    pub(crate) fn read_name_str(&mut self) -> Result<&'a str, Error> {
        self.with_context(ContextId::Name, |decoder| {
            let len: u32 = decoder.read()?;
            let bytes = decoder.read_bytes(len as usize)?;
            core::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
        })
    }

    // Reads the length of a vector whose elements take at least a byte each.
    pub(crate) fn read_count(&mut self, what: Cardinality, max: u32) -> Result<u32, Error> {
        let count: u32 = self.read()?;
        check_count(what, u64::from(count), max)?;
        if count as usize > self.remaining() {
            return Err(Error::UnexpectedEof);
        }
        Ok(count)
    }

    pub(crate) fn read<T: Decode + Contextual>(&mut self) -> Result<T, Error> {
        self.with_context(T::ID, T::decode)
    }

    pub(crate) fn read_in<A: Allocator, T: DecodeIn<A> + Contextual>(
        &mut self,
        alloc: &A,
    ) -> Result<T, Error> {
        self.with_context(T::ID, |decoder| T::decode_in(decoder, alloc))
    }

    fn read_section_header(&mut self) -> Result<(u8, u32), Error> {
        let id = self.read_byte_raw()?;
        let size: u32 = self.with_context(ContextId::SectionSize, |decoder| {
            decoder.read_leb128_raw()
        })?;
        if size as usize > self.remaining() {
            return Err(Error::UnexpectedEof);
        }
        Ok((id, size))
    }

    // Skips a custom or unknown section.
    fn skip_section(&mut self) -> Result<(), Error> {
        let is_custom = self.cursor.peek_byte() == Some(SectionId::Custom as u8);
        let id = if is_custom {
            ContextId::CustomSec
        } else {
            ContextId::UnknownSec
        };
        self.with_context(id, |decoder| {
            let (_, size) = decoder.read_section_header()?;
            log::trace!("skipping {size} bytes of {}", <&str>::from(id));
            decoder.skip_bytes(size as usize)
        })
    }

    // Begins the section with the given ID if it is next, skipping over any
    // custom and unknown sections in between. If it is not next, the position
    // is left untouched and None is returned.
    pub(crate) fn start_section(&mut self, expected: SectionId) -> Result<Option<SectionFrame>, Error> {
        let before = self.offset();
        loop {
            let Some(byte) = self.cursor.peek_byte() else {
                self.cursor.rewind(before);
                return Ok(None);
            };
            match SectionId::try_from(byte) {
                Ok(SectionId::Custom) | Err(_) => self.skip_section()?,
                Ok(id) if id == expected => {
                    let (_, size) = self.read_section_header()?;
                    self.seen |= 1 << (id as u8);
                    self.last = Some(id);
                    log::trace!("decoding {id:?} section ({size} bytes)");
                    return Ok(Some(SectionFrame {
                        id,
                        start: self.offset(),
                        size,
                    }));
                }
                Ok(_) => {
                    self.cursor.rewind(before);
                    return Ok(None);
                }
            }
        }
    }

    pub(crate) fn finish_section(&mut self, frame: SectionFrame) -> Result<(), Error> {
        let actual = self.offset() - frame.start;
        if actual == frame.size as usize {
            Ok(())
        } else {
            Err(Error::InvalidSectionLength {
                id: frame.id,
                expected: frame.size,
                actual: actual as u32,
            })
        }
    }

    // Begins the first custom section with the given name among the custom
    // sections that come next, leaving the position after the name. If there
    // is none, the position is left untouched and None is returned. Custom
    // sections whose name cannot be read are not a match, and are skipped.
    pub(crate) fn start_custom_section(&mut self, name: &str) -> Result<Option<SectionFrame>, Error> {
        let before = self.offset();
        loop {
            match self.cursor.peek_byte().map(SectionId::try_from) {
                Some(Ok(SectionId::Custom)) => {}
                Some(Err(_)) => {
                    self.skip_section()?;
                    continue;
                }
                Some(Ok(_)) | None => {
                    self.cursor.rewind(before);
                    return Ok(None);
                }
            }

            let (frame, found) = self.with_context(ContextId::CustomSec, |decoder| {
                let (_, size) = decoder.read_section_header()?;
                let frame = SectionFrame {
                    id: SectionId::Custom,
                    start: decoder.offset(),
                    size,
                };
                let depth = decoder.context.depth();
                let end = decoder.cursor.limit(size as usize)?;
                let found = match decoder.read::<u32>() {
                    Ok(len) => decoder.read_bytes(len as usize),
                    Err(error) => Err(error),
                };
                decoder.context.truncate(depth);
                decoder.cursor.set_end(end);
                Ok((frame, found.is_ok_and(|found| found == name.as_bytes())))
            })?;
            if found {
                return Ok(Some(frame));
            }
            self.cursor.seek(frame.end())?;
        }
    }

    // Runs `f` over the rest of a custom section, with reads bounded by its
    // end; whatever `f` returns, the position ends up at the end of the
    // section.
    pub(crate) fn within_custom_section<R>(
        &mut self,
        frame: SectionFrame,
        f: impl FnOnce(&mut Self) -> Result<R, Error>,
    ) -> Result<Result<R, Error>, Error> {
        let depth = self.context.depth();
        let end = self.cursor.limit(frame.end() - self.offset())?;
        let result = f(self);
        self.context.truncate(depth);
        self.cursor.set_end(end);
        self.cursor.seek(frame.end())?;
        Ok(result)
    }

    // Skips whatever custom and unknown sections remain. A known section
    // at this point is either a duplicate or out of order.
    pub(crate) fn skip_remaining_sections(&mut self) -> Result<(), Error> {
        while let Some(byte) = self.cursor.peek_byte() {
            match SectionId::try_from(byte) {
                Ok(SectionId::Custom) | Err(_) => self.skip_section()?,
                Ok(id) if self.seen & (1 << byte) != 0 => {
                    return Err(Error::DuplicateSection(id));
                }
                Ok(id) => {
                    return Err(match self.last {
                        Some(before) => Error::OutOfOrderSection { before, after: id },
                        None => Error::DuplicateSection(id),
                    });
                }
            }
        }
        Ok(())
    }
}

// Types that can be decoded with allocation.
pub(crate) trait DecodeIn<A: Allocator>: Sized {
    fn decode_in(decoder: &mut Decoder<'_>, alloc: &A) -> Result<Self, Error>;
}

// Types that can be decoded without allocation.
pub(crate) trait Decode: Sized + Copy {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, Error>;
}

impl<T: Decode, A: Allocator> DecodeIn<A> for T {
    fn decode_in(decoder: &mut Decoder<'_>, _: &A) -> Result<Self, Error> {
        <Self as Decode>::decode(decoder)
    }
}
