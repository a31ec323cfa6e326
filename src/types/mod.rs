// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! WebAssembly type definitions.
//!
//! These are the entities a validated module is made of: value types,
//! signatures, the descriptors of each index space, segments, and retained
//! function bodies. Anything handed out by the decoder has already passed
//! validation.

mod instr;
pub use instr::*;

use core::str;

use num_enum::TryFromPrimitive;

use crate::Allocator;
use crate::core_compat::{Box, Vec};

/// Maximum number of signatures in the type section.
pub const MAX_TYPES: u32 = 4 * 1024;
/// Maximum number of functions, imported and defined.
pub const MAX_FUNCS: u32 = 512 * 1024;
/// Maximum number of imports.
pub const MAX_IMPORTS: u32 = 64 * 1024;
/// Maximum number of exports.
pub const MAX_EXPORTS: u32 = 64 * 1024;
/// Maximum number of globals, imported and defined.
pub const MAX_GLOBALS: u32 = 4 * 1024;
/// Maximum number of locals in a function, parameters included.
pub const MAX_LOCALS: u32 = 64 * 1024;
/// Maximum number of parameters of a signature.
pub const MAX_PARAMS: u32 = 4 * 1024;
/// Maximum initial size of a table, and of an element segment.
pub const MAX_TABLE_ELEMS: u32 = 1024 * 1024;
/// Maximum size of a linear memory in pages.
pub const MAX_MEMORY_PAGES: u32 = 64 * 1024;
/// Maximum number of element segments.
pub const MAX_ELEM_SEGMENTS: u32 = 64 * 1024;
/// Maximum number of data segments.
pub const MAX_DATA_SEGMENTS: u32 = 64 * 1024;
/// Maximum number of non-default targets of a `br_table`.
pub const MAX_BR_TABLE_ELEMS: u32 = 4 * 1024 * 1024;

// Defines a public newtype without public mutable access to the underlying
// type, along with Deref and AsRef.
macro_rules! newtype {
    (
        $(#[$meta:meta])*
        pub struct $type:ident<A: Allocator>($underlying:ty);
    ) => {
        $(#[$meta])*
        pub struct $type<A: Allocator>($underlying);

        newtype!(@impl [A: Allocator], $type<A>, $underlying);
    };
    (
        $(#[$meta:meta])*
        pub struct $type:ident($underlying:ty);
    ) => {
        $(#[$meta])*
        pub struct $type($underlying);

        newtype!(@impl [], $type, $underlying);
    };
    (@impl [$($generic_params:tt)*], $qualified_type:ty, $underlying:ty) => {
        impl<$($generic_params)*> $qualified_type {
            pub fn new(value: $underlying) -> Self {
                Self(value)
            }
        }

        impl<$($generic_params)*> ::core::ops::Deref for $qualified_type {
            type Target = $underlying;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl<$($generic_params)*> AsRef<$underlying> for $qualified_type {
            fn as_ref(&self) -> &$underlying {
                &self.0
            }
        }
    };
}

/// WebAssembly binary format version.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum Version {
    V1 = 1,
}

newtype!(
    /// A UTF-8 name (of a module, field, or export).
    #[derive(Debug, Eq, PartialEq)]
    pub struct Name<A: Allocator>(Box<str, A>);
);

impl<A: Allocator> Name<A> {
    /// Copies a validated string into the given allocator.
    pub(crate) fn copy_in(
        name: &str,
        alloc: &A,
    ) -> Result<Self, crate::core_compat::TryReserveError> {
        let bytes = crate::core_compat::boxed_slice_in(name.as_bytes(), alloc.clone())?;
        let ptr = Box::into_raw(bytes);

        // Safety: str and [u8] share a layout, and the bytes were copied from
        // a str.
        let name = unsafe { Box::from_raw_in(ptr as *mut str, alloc.clone()) };
        Ok(Self::new(name))
    }
}

/// Value types classify the values that WebAssembly code computes with and
/// that locals and globals hold.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum ValType {
    /// 32-bit integer.
    I32 = 0x7f,
    /// 64-bit integer.
    I64 = 0x7e,
    /// 32-bit IEEE 754 float.
    F32 = 0x7d,
    /// 64-bit IEEE 754 float.
    F64 = 0x7c,
}

/// The result of a function or block: nothing, or a single value.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ResultType {
    #[default]
    Void,
    Value(ValType),
}

impl ResultType {
    /// Binary encoding of the empty block type.
    pub const VOID_ENCODING: u8 = 0x40;

    /// Number of values produced.
    pub const fn arity(self) -> usize {
        match self {
            ResultType::Void => 0,
            ResultType::Value(_) => 1,
        }
    }
}

/// A function signature.
#[derive(Debug, PartialEq)]
pub struct Signature<A: Allocator> {
    pub params: Vec<ValType, A>,
    pub result: ResultType,
}

/// The element type of a table. Only function references exist here.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum ElemType {
    FuncRef = 0x70,
}

/// The size range of a table (in elements) or memory (in pages).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Limits {
    pub initial: u32,
    /// `None` means unbounded.
    pub maximum: Option<u32>,
}

/// The module's table, imported or defined.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TableDesc {
    pub limits: Limits,
    pub imported: bool,
}

/// The module's linear memory, imported or defined.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MemoryDesc {
    pub limits: Limits,
    pub imported: bool,
}

/// The value type and mutability of a global.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GlobalType {
    pub ty: ValType,
    pub mutable: bool,
}

/// A constant initializer expression.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InitExpr {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    /// The value of an immutable imported global.
    GetGlobal { index: GlobalIdx, ty: ValType },
}

impl InitExpr {
    /// The type of the value the expression produces.
    pub const fn ty(&self) -> ValType {
        match self {
            InitExpr::I32(_) => ValType::I32,
            InitExpr::I64(_) => ValType::I64,
            InitExpr::F32(_) => ValType::F32,
            InitExpr::F64(_) => ValType::F64,
            InitExpr::GetGlobal { ty, .. } => *ty,
        }
    }
}

/// How a global gets its value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GlobalInit {
    Import,
    Constant(InitExpr),
}

/// An entry of the global index space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlobalDesc {
    pub ty: GlobalType,
    pub init: GlobalInit,
}

impl GlobalDesc {
    pub const fn is_import(&self) -> bool {
        matches!(self.init, GlobalInit::Import)
    }

    pub const fn is_mutable(&self) -> bool {
        self.ty.mutable
    }
}

/// What an import provides.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImportKind {
    Function(TypeIdx),
    Table(Limits),
    Memory(Limits),
    Global(GlobalType),
}

/// An import declaration.
#[derive(Debug, PartialEq)]
pub struct Import<A: Allocator> {
    pub module: Name<A>,
    pub field: Name<A>,
    pub kind: ImportKind,
}

/// What an export refers to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExportKind {
    Function(FuncIdx),
    Table(TableIdx),
    Memory(MemIdx),
    Global(GlobalIdx),
}

/// An export declaration. Export names are unique within a module.
#[derive(Debug, PartialEq)]
pub struct Export<A: Allocator> {
    pub field: Name<A>,
    pub kind: ExportKind,
}

/// An element segment, initializing a range of the table with functions.
#[derive(Debug, PartialEq)]
pub struct ElemSegment<A: Allocator> {
    pub table: TableIdx,
    /// Always of type i32.
    pub offset: InitExpr,
    pub funcs: Vec<FuncIdx, A>,
}

/// A data segment, initializing a range of linear memory.
///
/// The payload is not copied out of the module bytes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DataSegment {
    pub memory: MemIdx,
    /// Always of type i32.
    pub offset: InitExpr,
    /// Offset of the payload in the module bytes.
    pub bytecode_offset: u32,
    pub length: u32,
}

impl DataSegment {
    /// Returns the payload, given the bytes the module was decoded from.
    pub fn bytes<'a>(&self, bytecode: &'a [u8]) -> Option<&'a [u8]> {
        let start = self.bytecode_offset as usize;
        bytecode.get(start..start + self.length as usize)
    }
}

/// A validated function body.
#[derive(Debug, PartialEq)]
pub struct FunctionBody<A: Allocator> {
    pub func: FuncIdx,
    /// Parameters followed by declared locals.
    pub locals: Vec<ValType, A>,
    /// The body bytes, local declarations included, exactly as they appeared
    /// in the module.
    pub code: Box<[u8], A>,
    /// Offset of `code` in the module bytes.
    pub bytecode_offset: u32,
}

/// A name stored as a byte range of the module bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NameInBytecode {
    pub offset: u32,
    pub length: u32,
}

impl NameInBytecode {
    /// Returns the name, given the bytes the module was decoded from.
    pub fn resolve<'a>(&self, bytecode: &'a [u8]) -> Option<&'a str> {
        let start = self.offset as usize;
        let bytes = bytecode.get(start..start + self.length as usize)?;
        str::from_utf8(bytes).ok()
    }
}

newtype!(
    /// An index into the type index space.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct TypeIdx(u32);
);

newtype!(
    /// An index into the function index space (imports first).
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct FuncIdx(u32);
);

newtype!(
    /// An index into the table index space.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct TableIdx(u32);
);

newtype!(
    /// An index into the memory index space.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct MemIdx(u32);
);

newtype!(
    /// An index into the global index space (imports first).
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct GlobalIdx(u32);
);

newtype!(
    /// An index into a function's locals.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct LocalIdx(u32);
);

newtype!(
    /// A relative depth into the enclosing control frames.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct LabelIdx(u32);
);

/// The index spaces that instructions and declarations refer into.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IndexSpace {
    Type,
    Function,
    Table,
    Memory,
    Global,
    Local,
    Label,
}

/// Things whose number is bounded by an implementation limit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Cardinality {
    Types,
    Params,
    Results,
    Imports,
    Functions,
    Globals,
    Exports,
    ElemSegments,
    TableElems,
    DataSegments,
    Locals,
    BrTableTargets,
    FunctionNames,
}

/// Section identifier within a module.
///
/// For non-custom sections, the derived ordering is the order in which the
/// sections must appear.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, TryFromPrimitive)]
#[repr(u8)]
pub enum SectionId {
    Custom = 0,
    Type = 1,
    Import = 2,
    Function = 3,
    Table = 4,
    Memory = 5,
    Global = 6,
    Export = 7,
    Start = 8,
    Element = 9,
    Code = 10,
    Data = 11,
}
