// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! The interface through which decoded declarations reach whatever is being
//! built from the module.

use core::fmt;

use crate::Allocator;
use crate::core_compat::{TryReserveError, Vec};
use crate::types::{DataSegment, ElemSegment, Export, FuncIdx, FunctionBody, Import, NameInBytecode};
use crate::validate::Environment;

/// Why a builder refused a declaration. Either way, the compilation is
/// aborted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Rejection {
    /// The declaration is valid WebAssembly but unsupported by the builder.
    /// Reported as [`crate::decode::Error::Rejected`].
    Unsupported(&'static str),
    /// The builder failed to allocate.
    OutOfMemory,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Unsupported(reason) => f.write_str(reason),
            Rejection::OutOfMemory => f.write_str("allocation failure"),
        }
    }
}

impl From<TryReserveError> for Rejection {
    fn from(_: TryReserveError) -> Self {
        Rejection::OutOfMemory
    }
}

/// Scripted location that requested the compilation, used for diagnostics.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ScriptedCaller<'a> {
    pub filename: &'a str,
    pub line: u32,
    pub column: u32,
}

/// Parameters of a compilation that do not come from the module bytes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CompileArgs<'a> {
    /// Whether to skip optimized compilation of the resulting module
    /// entirely, e.g. because a debugger is attached.
    pub always_baseline: bool,
    pub scripted_caller: ScriptedCaller<'a>,
    /// Identifies the build that is doing the compiling.
    pub build_id: &'a [u8],
}

/// Accumulates a decoded module.
///
/// The declarations that make up the [`Environment`] arrive all at once in
/// [`ModuleBuilder::init`]; everything after the global section is handed
/// over piecemeal, in module order and only once validated. Any rejection
/// fails the compilation.
pub trait ModuleBuilder<A: Allocator>: Sized {
    /// What a successful compilation produces.
    type Artifact;

    fn init(
        env: Environment<A>,
        imports: Vec<Import<A>, A>,
        args: &CompileArgs<'_>,
    ) -> Result<Self, Rejection>;

    fn env(&self) -> &Environment<A>;

    /// Export names are guaranteed to be unique and the index to be in range.
    fn add_export(&mut self, export: Export<A>) -> Result<(), Rejection>;

    fn set_start_function(&mut self, func: FuncIdx) -> Result<(), Rejection>;

    fn add_elem_segment(&mut self, segment: ElemSegment<A>) -> Result<(), Rejection>;

    /// Bodies arrive in function index order.
    fn add_function_body(&mut self, body: FunctionBody<A>) -> Result<(), Rejection>;

    fn add_data_segment(&mut self, segment: DataSegment) -> Result<(), Rejection>;

    /// Called at most once, with names indexed by function; only if the name
    /// section was present and well-formed.
    fn set_function_names(&mut self, names: Vec<NameInBytecode, A>);

    fn finish(self, bytecode: &[u8]) -> Result<Self::Artifact, Rejection>;
}
