// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Single-pass WebAssembly module decoding and validation.
//!
//! [`compile`] decodes a binary module and validates it as it goes, handing
//! each validated declaration to a [`ModuleBuilder`]. Only well-typed modules
//! make it through; anything else fails with the first error found, along
//! with the context it was found in. [`Module`] is a builder that simply
//! keeps everything.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![cfg_attr(nightly, feature(allocator_api))]

#[cfg(nightly)]
extern crate alloc;

pub mod builder;
pub mod core_compat;
pub mod decode;
pub mod types;
pub mod validate;

use core::fmt;

pub use builder::{CompileArgs, ModuleBuilder, Rejection, ScriptedCaller};
use core_compat::Vec;
use decode::{Decoder, ErrorWithContext, decode_module};
use types::{
    DataSegment, ElemSegment, Export, ExportKind, FuncIdx, FunctionBody, GlobalType, Import,
    ImportKind, NameInBytecode, ValType,
};
use validate::Environment;

/// A convenience trait that captures the required allocation-related trait
/// bounds.
pub trait Allocator: core_compat::Allocator + fmt::Debug + Clone {}

impl<A> Allocator for A where A: core_compat::Allocator + fmt::Debug + Clone {}

/// Decodes and validates `bytecode`, building the result with a `B`.
///
/// Everything retained is allocated with `alloc`.
pub fn compile<A: Allocator, B: ModuleBuilder<A>>(
    bytecode: &[u8],
    args: &CompileArgs<'_>,
    alloc: A,
) -> Result<B::Artifact, ErrorWithContext> {
    let mut decoder = Decoder::new(bytecode);
    decode_module::<A, B>(&mut decoder, args, alloc).map_err(|error| decoder.into_error(error))
}

/// A validated WebAssembly module.
#[derive(Debug)]
pub struct Module<A: Allocator> {
    /// Signatures, and the function, table, memory, and global index spaces.
    pub env: Environment<A>,
    pub imports: Vec<Import<A>, A>,
    pub exports: Vec<Export<A>, A>,
    pub start: Option<FuncIdx>,
    pub elems: Vec<ElemSegment<A>, A>,
    /// One per defined function, in function index order.
    pub bodies: Vec<FunctionBody<A>, A>,
    pub data: Vec<DataSegment, A>,
    /// Function names from the "name" section, indexed by function, if it was
    /// present and well-formed.
    pub func_names: Option<Vec<NameInBytecode, A>>,
    pub always_baseline: bool,
}

impl<A: Allocator> Module<A> {
    /// Decodes and validates a module with default compilation arguments.
    pub fn decode(bytecode: &[u8], alloc: A) -> Result<Self, ErrorWithContext> {
        compile::<A, Self>(bytecode, &CompileArgs::default(), alloc)
    }

    /// Looks up an export by name.
    pub fn export(&self, name: &str) -> Option<&Export<A>> {
        self.exports.iter().find(|export| &**export.field == name)
    }

    /// The body of a defined function.
    pub fn body(&self, func: FuncIdx) -> Option<&FunctionBody<A>> {
        let index = func.checked_sub(self.env.num_func_imports())?;
        self.bodies.get(index as usize)
    }

    /// The name of a function, given the bytes the module was decoded from.
    pub fn func_name<'a>(&self, func: FuncIdx, bytecode: &'a [u8]) -> Option<&'a str> {
        self.func_names.as_ref()?.get(*func as usize)?.resolve(bytecode)
    }
}

// Globals crossing the module boundary must be representable by the host.
fn check_host_global(ty: GlobalType) -> Result<(), Rejection> {
    if ty.ty == ValType::I64 {
        return Err(Rejection::Unsupported("can't import or export an i64 global"));
    }
    if ty.mutable {
        return Err(Rejection::Unsupported("can't import or export a mutable global"));
    }
    Ok(())
}

fn push<T, A: Allocator>(vec: &mut Vec<T, A>, value: T) -> Result<(), Rejection> {
    vec.try_reserve(1)?;
    vec.push(value);
    Ok(())
}

impl<A: Allocator> ModuleBuilder<A> for Module<A> {
    type Artifact = Self;

    fn init(
        env: Environment<A>,
        imports: Vec<Import<A>, A>,
        args: &CompileArgs<'_>,
    ) -> Result<Self, Rejection> {
        for import in &imports {
            if let ImportKind::Global(ty) = import.kind {
                check_host_global(ty)?;
            }
        }
        let alloc = env.allocator().clone();
        let mut bodies = Vec::new_in(alloc.clone());
        bodies.try_reserve_exact(env.num_func_defs() as usize)?;
        Ok(Self {
            imports,
            exports: Vec::new_in(alloc.clone()),
            start: None,
            elems: Vec::new_in(alloc.clone()),
            bodies,
            data: Vec::new_in(alloc),
            func_names: None,
            always_baseline: args.always_baseline,
            env,
        })
    }

    fn env(&self) -> &Environment<A> {
        &self.env
    }

    fn add_export(&mut self, export: Export<A>) -> Result<(), Rejection> {
        if let ExportKind::Global(idx) = export.kind
            && let Some(global) = self.env.global(idx)
        {
            check_host_global(global.ty)?;
        }
        push(&mut self.exports, export)
    }

    fn set_start_function(&mut self, func: FuncIdx) -> Result<(), Rejection> {
        self.start = Some(func);
        Ok(())
    }

    fn add_elem_segment(&mut self, segment: ElemSegment<A>) -> Result<(), Rejection> {
        push(&mut self.elems, segment)
    }

    fn add_function_body(&mut self, body: FunctionBody<A>) -> Result<(), Rejection> {
        push(&mut self.bodies, body)
    }

    fn add_data_segment(&mut self, segment: DataSegment) -> Result<(), Rejection> {
        push(&mut self.data, segment)
    }

    fn set_function_names(&mut self, names: Vec<NameInBytecode, A>) {
        self.func_names = Some(names);
    }

    fn finish(self, _bytecode: &[u8]) -> Result<Self, Rejection> {
        Ok(self)
    }
}
