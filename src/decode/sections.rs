// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Module section decoding, in module order.

use crate::Allocator;
use crate::builder::{CompileArgs, ModuleBuilder};
use crate::core_compat::Vec;
use crate::types::*;
use crate::validate::{Environment, decode_function_body, validate_start_function};

use super::{ContextId, Decoder, Error, Magic, decode_init_expr};

// Decodes the section with the given ID with `f`, if present.
fn decode_section<'a, R>(
    decoder: &mut Decoder<'a>,
    id: SectionId,
    context: ContextId,
    f: impl FnOnce(&mut Decoder<'a>) -> Result<R, Error>,
) -> Result<Option<R>, Error> {
    let Some(frame) = decoder.start_section(id)? else {
        return Ok(None);
    };
    let result = decoder.with_context(context, f)?;
    decoder.finish_section(frame)?;
    Ok(Some(result))
}

fn decode_type_section<A: Allocator>(
    decoder: &mut Decoder<'_>,
    env: &mut Environment<A>,
) -> Result<(), Error> {
    let alloc = env.allocator().clone();
    decode_section(decoder, SectionId::Type, ContextId::TypeSec, |decoder| {
        let count = decoder.read_count(Cardinality::Types, MAX_TYPES)?;
        for _ in 0..count {
            let sig = decoder.read_in(&alloc)?;
            env.add_signature(sig)?;
        }
        Ok(())
    })?;
    Ok(())
}

fn decode_import_section<A: Allocator>(
    decoder: &mut Decoder<'_>,
    env: &mut Environment<A>,
) -> Result<Vec<Import<A>, A>, Error> {
    let alloc = env.allocator().clone();
    let mut imports = Vec::new_in(alloc.clone());
    decode_section(decoder, SectionId::Import, ContextId::ImportSec, |decoder| {
        let count = decoder.read_count(Cardinality::Imports, MAX_IMPORTS)?;
        imports.try_reserve_exact(count as usize)?;
        for _ in 0..count {
            let import = decoder.with_context(ContextId::Import, |decoder| {
                let module = decoder.read_in(&alloc)?;
                let field = decoder.read_in(&alloc)?;
                let kind: ImportKind = decoder.read()?;
                match kind {
                    ImportKind::Function(sig) => env.add_function(sig, true)?,
                    ImportKind::Table(limits) => env.set_table(TableDesc {
                        limits,
                        imported: true,
                    })?,
                    ImportKind::Memory(limits) => env.set_memory(MemoryDesc {
                        limits,
                        imported: true,
                    })?,
                    ImportKind::Global(ty) => env.add_global(GlobalDesc {
                        ty,
                        init: GlobalInit::Import,
                    })?,
                }
                Ok(Import {
                    module,
                    field,
                    kind,
                })
            })?;
            imports.push(import);
        }
        Ok(())
    })?;
    Ok(imports)
}

fn decode_function_section<A: Allocator>(
    decoder: &mut Decoder<'_>,
    env: &mut Environment<A>,
) -> Result<(), Error> {
    decode_section(decoder, SectionId::Function, ContextId::FuncSec, |decoder| {
        let count = decoder.read_count(Cardinality::Functions, MAX_FUNCS)?;
        for _ in 0..count {
            let sig: TypeIdx = decoder.read()?;
            env.add_function(sig, false)?;
        }
        Ok(())
    })?;
    Ok(())
}

fn decode_table_section<A: Allocator>(
    decoder: &mut Decoder<'_>,
    env: &mut Environment<A>,
) -> Result<(), Error> {
    decode_section(decoder, SectionId::Table, ContextId::TableSec, |decoder| {
        let count: u32 = decoder.read()?;
        if count != 1 {
            return Err(Error::TableCount(count));
        }
        if env.table().is_some() {
            return Err(Error::MultipleTables);
        }
        decoder.read::<ElemType>()?;
        let limits = decoder.read()?;
        env.set_table(TableDesc {
            limits,
            imported: false,
        })
    })?;
    Ok(())
}

fn decode_memory_section<A: Allocator>(
    decoder: &mut Decoder<'_>,
    env: &mut Environment<A>,
) -> Result<(), Error> {
    decode_section(decoder, SectionId::Memory, ContextId::MemorySec, |decoder| {
        let count: u32 = decoder.read()?;
        if count > 1 {
            return Err(Error::MultipleMemories);
        }
        for _ in 0..count {
            let limits = decoder.read()?;
            env.set_memory(MemoryDesc {
                limits,
                imported: false,
            })?;
        }
        Ok(())
    })?;
    Ok(())
}

fn decode_global_section<A: Allocator>(
    decoder: &mut Decoder<'_>,
    env: &mut Environment<A>,
) -> Result<(), Error> {
    decode_section(decoder, SectionId::Global, ContextId::GlobalSec, |decoder| {
        let count = decoder.read_count(Cardinality::Globals, MAX_GLOBALS)?;
        for _ in 0..count {
            decoder.with_context(ContextId::Global, |decoder| {
                let ty: GlobalType = decoder.read()?;
                let init = decode_init_expr(decoder, env, ty.ty)?;
                env.add_global(GlobalDesc {
                    ty,
                    init: GlobalInit::Constant(init),
                })
            })?;
        }
        Ok(())
    })?;
    Ok(())
}

fn decode_export_section<A: Allocator, B: ModuleBuilder<A>>(
    decoder: &mut Decoder<'_>,
    builder: &mut B,
) -> Result<(), Error> {
    let alloc = builder.env().allocator().clone();
    decode_section(decoder, SectionId::Export, ContextId::ExportSec, |decoder| {
        let count = decoder.read_count(Cardinality::Exports, MAX_EXPORTS)?;
        let mut exports = Vec::new_in(alloc.clone());
        exports.try_reserve_exact(count as usize)?;
        let mut names = Vec::new_in(alloc.clone());
        names.try_reserve_exact(count as usize)?;

        for index in 0..count {
            let export = decoder.with_context(ContextId::Export, |decoder| {
                let name = decoder.read_name_str()?;
                let kind: ExportKind = decoder.read()?;
                builder.env().validate(&kind)?;
                names.push((name, index));
                Ok(Export {
                    field: Name::copy_in(name, &alloc)?,
                    kind,
                })
            })?;
            exports.push(export);
        }

        // Export names must be distinct. Once ordered by name, duplicates are
        // neighbours; the one reported is the earliest repeat in module order.
        names.sort_unstable();
        let duplicate = names
            .windows(2)
            .filter(|pair| pair[0].0 == pair[1].0)
            .map(|pair| pair[1].1)
            .min();
        if let Some(index) = duplicate {
            return Err(Error::DuplicateExportName { index });
        }

        for export in exports {
            builder.add_export(export)?;
        }
        Ok(())
    })?;
    Ok(())
}

fn decode_start_section<A: Allocator, B: ModuleBuilder<A>>(
    decoder: &mut Decoder<'_>,
    builder: &mut B,
) -> Result<(), Error> {
    decode_section(decoder, SectionId::Start, ContextId::StartSec, |decoder| {
        let func: FuncIdx = decoder.read()?;
        validate_start_function(builder.env(), func)?;
        builder.set_start_function(func)?;
        Ok(())
    })?;
    Ok(())
}

fn decode_elem_section<A: Allocator, B: ModuleBuilder<A>>(
    decoder: &mut Decoder<'_>,
    builder: &mut B,
) -> Result<(), Error> {
    decode_section(decoder, SectionId::Element, ContextId::ElemSec, |decoder| {
        let count = decoder.read_count(Cardinality::ElemSegments, MAX_ELEM_SEGMENTS)?;
        for _ in 0..count {
            let segment = decoder.with_context(ContextId::Elem, |decoder| {
                let env = builder.env();
                let table: TableIdx = decoder.read()?;
                env.validate(&table)?;
                let offset = decode_init_expr(decoder, env, ValType::I32)?;

                let num_funcs = decoder.read_count(Cardinality::TableElems, MAX_TABLE_ELEMS)?;
                let mut funcs = Vec::new_in(env.allocator().clone());
                funcs.try_reserve_exact(num_funcs as usize)?;
                for _ in 0..num_funcs {
                    let func: FuncIdx = decoder.read()?;
                    env.validate(&func)?;
                    funcs.push(func);
                }
                Ok(ElemSegment {
                    table,
                    offset,
                    funcs,
                })
            })?;
            builder.add_elem_segment(segment)?;
        }
        Ok(())
    })?;
    Ok(())
}

fn decode_code_section<A: Allocator, B: ModuleBuilder<A>>(
    decoder: &mut Decoder<'_>,
    builder: &mut B,
) -> Result<(), Error> {
    let num_imports = builder.env().num_func_imports();
    let num_defs = builder.env().num_func_defs();
    let mismatch = |codesec_size| Error::FunctionAndCodeSectionMismatch {
        funcsec_size: num_defs,
        codesec_size,
    };

    let decoded = decode_section(decoder, SectionId::Code, ContextId::CodeSec, |decoder| {
        let count: u32 = decoder.read()?;
        if count != num_defs {
            return Err(mismatch(count));
        }
        for i in 0..count {
            let func = FuncIdx::new(num_imports + i);
            let body = decode_function_body(decoder, builder.env(), func)?;
            builder.add_function_body(body)?;
        }
        Ok(())
    })?;
    if decoded.is_none() && num_defs != 0 {
        return Err(mismatch(0));
    }
    Ok(())
}

fn decode_data_section<A: Allocator, B: ModuleBuilder<A>>(
    decoder: &mut Decoder<'_>,
    builder: &mut B,
) -> Result<(), Error> {
    decode_section(decoder, SectionId::Data, ContextId::DataSec, |decoder| {
        if builder.env().memory().is_none() {
            return Err(Error::DataWithoutMemory);
        }
        let count = decoder.read_count(Cardinality::DataSegments, MAX_DATA_SEGMENTS)?;
        for _ in 0..count {
            let segment = decoder.with_context(ContextId::Data, |decoder| {
                let env = builder.env();
                let memory: MemIdx = decoder.read()?;
                env.validate(&memory)?;
                let offset = decode_init_expr(decoder, env, ValType::I32)?;
                let length: u32 = decoder.read()?;
                let bytecode_offset = decoder.offset() as u32;
                decoder.skip_bytes(length as usize)?;
                Ok(DataSegment {
                    memory,
                    offset,
                    bytecode_offset,
                    length,
                })
            })?;
            builder.add_data_segment(segment)?;
        }
        Ok(())
    })?;
    Ok(())
}

// Decodes the function names of the "name" section, if present. Names are
// advisory: a malformed section is skipped over rather than failing the
// module.
fn decode_name_section<A: Allocator, B: ModuleBuilder<A>>(
    decoder: &mut Decoder<'_>,
    builder: &mut B,
) -> Result<(), Error> {
    let Some(frame) = decoder.start_custom_section("name")? else {
        return Ok(());
    };
    let alloc = builder.env().allocator().clone();
    let names = decoder.within_custom_section(frame, |decoder| {
        decoder.with_context(ContextId::NameSec, |decoder| {
            let count = decoder.read_count(Cardinality::FunctionNames, MAX_FUNCS)?;
            let mut names = Vec::new_in(alloc);
            names.try_reserve_exact(count as usize)?;
            for _ in 0..count {
                let name = decoder.with_context(ContextId::FuncName, |decoder| {
                    let length: u32 = decoder.read()?;
                    let offset = decoder.offset() as u32;
                    decoder.skip_bytes(length as usize)?;
                    Ok(NameInBytecode { offset, length })
                })?;
                names.push(name);

                let num_locals: u32 = decoder.read()?;
                for _ in 0..num_locals {
                    decoder.with_context(ContextId::LocalName, |decoder| {
                        let length: u32 = decoder.read()?;
                        decoder.skip_bytes(length as usize)
                    })?;
                }
            }
            Ok(names)
        })
    })?;

    match names {
        Ok(names) => builder.set_function_names(names),
        Err(error) => log::debug!("discarding malformed name section: {error}"),
    }
    Ok(())
}

// Decodes and validates a whole module, feeding it to a builder of type `B`.
pub(crate) fn decode_module<A: Allocator, B: ModuleBuilder<A>>(
    decoder: &mut Decoder<'_>,
    args: &CompileArgs<'_>,
    alloc: A,
) -> Result<B::Artifact, Error> {
    log::debug!("decoding module ({} bytes)", decoder.remaining());

    decoder.read::<Magic>()?;
    decoder.read::<Version>()?;

    let mut env = Environment::new(alloc);
    decode_type_section(decoder, &mut env)?;
    let imports = decode_import_section(decoder, &mut env)?;
    decode_function_section(decoder, &mut env)?;
    decode_table_section(decoder, &mut env)?;
    decode_memory_section(decoder, &mut env)?;
    decode_global_section(decoder, &mut env)?;

    let mut builder = B::init(env, imports, args)?;
    decode_export_section(decoder, &mut builder)?;
    decode_start_section(decoder, &mut builder)?;
    decode_elem_section(decoder, &mut builder)?;
    decode_code_section(decoder, &mut builder)?;
    decode_data_section(decoder, &mut builder)?;
    decode_name_section(decoder, &mut builder)?;
    decoder.skip_remaining_sections()?;

    let bytecode = decoder.consumed(0, decoder.offset());
    let artifact = builder.finish(bytecode)?;
    log::debug!("decoded module ({} bytes)", bytecode.len());
    Ok(artifact)
}
