// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Module-level index spaces and the checks made against them.

mod func;
mod validate_impls;

pub use func::validate_function_body;
pub(crate) use func::decode_function_body;
pub(crate) use validate_impls::validate_start_function;

use crate::Allocator;
use crate::core_compat::Vec;
use crate::decode::{Error, check_count};
use crate::types::{
    Cardinality, FuncIdx, GlobalDesc, GlobalIdx, MAX_FUNCS, MAX_GLOBALS, MAX_TYPES, MemoryDesc,
    Signature, TableDesc, TypeIdx,
};

use validate_impls::{validate_memory_limits, validate_table_limits};

/// The index spaces declared by the type, import, function, table, memory,
/// and global sections.
///
/// Once the global section has been decoded the environment is frozen:
/// everything after it, function bodies included, only reads from it.
#[derive(Debug)]
pub struct Environment<A: Allocator> {
    alloc: A,
    sigs: Vec<Signature<A>, A>,
    // Signature of each function, imports first.
    funcs: Vec<TypeIdx, A>,
    num_func_imports: u32,
    table: Option<TableDesc>,
    memory: Option<MemoryDesc>,
    // Imports first.
    globals: Vec<GlobalDesc, A>,
}

impl<A: Allocator> Environment<A> {
    pub(crate) fn new(alloc: A) -> Self {
        Self {
            sigs: Vec::new_in(alloc.clone()),
            funcs: Vec::new_in(alloc.clone()),
            num_func_imports: 0,
            table: None,
            memory: None,
            globals: Vec::new_in(alloc.clone()),
            alloc,
        }
    }

    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    pub fn signatures(&self) -> &[Signature<A>] {
        &self.sigs
    }

    pub fn signature(&self, idx: TypeIdx) -> Option<&Signature<A>> {
        self.sigs.get(*idx as usize)
    }

    pub fn num_sigs(&self) -> u32 {
        self.sigs.len() as u32
    }

    /// Number of functions, imported and defined.
    pub fn num_funcs(&self) -> u32 {
        self.funcs.len() as u32
    }

    pub fn num_func_imports(&self) -> u32 {
        self.num_func_imports
    }

    /// Number of functions the module defines a body for.
    pub fn num_func_defs(&self) -> u32 {
        self.num_funcs() - self.num_func_imports
    }

    pub fn func_type_index(&self, idx: FuncIdx) -> Option<TypeIdx> {
        self.funcs.get(*idx as usize).copied()
    }

    pub fn func_signature(&self, idx: FuncIdx) -> Option<&Signature<A>> {
        self.func_type_index(idx)
            .and_then(|type_idx| self.signature(type_idx))
    }

    pub fn table(&self) -> Option<TableDesc> {
        self.table
    }

    pub fn num_tables(&self) -> u32 {
        u32::from(self.table.is_some())
    }

    pub fn memory(&self) -> Option<MemoryDesc> {
        self.memory
    }

    pub fn num_memories(&self) -> u32 {
        u32::from(self.memory.is_some())
    }

    pub fn globals(&self) -> &[GlobalDesc] {
        &self.globals
    }

    pub fn global(&self, idx: GlobalIdx) -> Option<&GlobalDesc> {
        self.globals.get(*idx as usize)
    }

    pub fn num_globals(&self) -> u32 {
        self.globals.len() as u32
    }

    pub(crate) fn add_signature(&mut self, sig: Signature<A>) -> Result<(), Error> {
        check_count(Cardinality::Types, self.sigs.len() as u64 + 1, MAX_TYPES)?;
        self.sigs.try_reserve(1)?;
        self.sigs.push(sig);
        Ok(())
    }

    // Function imports must all be added before any defined function.
    pub(crate) fn add_function(&mut self, sig: TypeIdx, imported: bool) -> Result<(), Error> {
        debug_assert!(!imported || self.num_func_defs() == 0);
        self.validate(&sig)?;
        check_count(Cardinality::Functions, self.funcs.len() as u64 + 1, MAX_FUNCS)?;
        self.funcs.try_reserve(1)?;
        self.funcs.push(sig);
        if imported {
            self.num_func_imports += 1;
        }
        Ok(())
    }

    pub(crate) fn set_table(&mut self, table: TableDesc) -> Result<(), Error> {
        if self.table.is_some() {
            return Err(Error::MultipleTables);
        }
        validate_table_limits(table.limits)?;
        self.table = Some(table);
        Ok(())
    }

    pub(crate) fn set_memory(&mut self, memory: MemoryDesc) -> Result<(), Error> {
        if self.memory.is_some() {
            return Err(Error::MultipleMemories);
        }
        validate_memory_limits(memory.limits)?;
        self.memory = Some(memory);
        Ok(())
    }

    // Global imports must all be added before any defined global.
    pub(crate) fn add_global(&mut self, global: GlobalDesc) -> Result<(), Error> {
        check_count(Cardinality::Globals, self.globals.len() as u64 + 1, MAX_GLOBALS)?;
        self.globals.try_reserve(1)?;
        self.globals.push(global);
        Ok(())
    }

    pub(crate) fn validate<T: Validate<A>>(&self, value: &T) -> Result<(), Error> {
        value.validate(self)
    }
}

// Declarations that are checked against the index spaces.
pub(crate) trait Validate<A: Allocator> {
    fn validate(&self, env: &Environment<A>) -> Result<(), Error>;
}
