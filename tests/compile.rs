// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

use std::thread;

use intake::core_compat::Global;
use intake::decode::{Error, ErrorKind, ErrorWithContext};
use intake::types::*;
use intake::validate::validate_function_body;
use intake::{CompileArgs, Module, compile};

fn decode(bytes: &[u8]) -> Result<Module<Global>, ErrorWithContext> {
    Module::decode(bytes, Global)
}

fn decode_wat(text: &str) -> Result<Module<Global>, ErrorWithContext> {
    decode(&wat::parse_str(text).unwrap())
}

macro_rules! assert_error {
    ($result:expr, $expected:expr, $kind:expr) => {
        match $result {
            Ok(_) => panic!("unexpected success; expected {:?}", $expected),
            Err(error) => {
                assert_eq!(error.error, $expected, "unexpected error: {error:?}");
                assert_eq!(error.kind(), $kind, "unexpected error kind: {error:?}");
            }
        }
    };
}

//
// Byte-level module construction, for inputs that are malformed in exact
// ways.
//

const PREAMBLE: [u8; 8] = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

fn leb128(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn section(id: u8, payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![id];
    leb128(&mut bytes, payload.len() as u32);
    bytes.extend_from_slice(payload);
    bytes
}

fn custom(name: &str, payload: &[u8]) -> Vec<u8> {
    let mut contents = Vec::new();
    leb128(&mut contents, name.len() as u32);
    contents.extend_from_slice(name.as_bytes());
    contents.extend_from_slice(payload);
    section(0, &contents)
}

fn module(sections: &[Vec<u8>]) -> Vec<u8> {
    let mut bytes = PREAMBLE.to_vec();
    for section in sections {
        bytes.extend_from_slice(section);
    }
    bytes
}

// A code section entry: no locals, then `instrs`.
fn body(instrs: &[u8]) -> Vec<u8> {
    let mut contents = vec![0x00];
    contents.extend_from_slice(instrs);
    let mut entry = Vec::new();
    leb128(&mut entry, contents.len() as u32);
    entry.extend(contents);
    entry
}

// Type section with the single signature `[] -> []`.
fn void_type() -> Vec<u8> {
    section(1, &[0x01, 0x60, 0x00, 0x00])
}

// Function section declaring `count` functions of type 0.
fn funcs(count: u8) -> Vec<u8> {
    let mut payload = vec![count];
    payload.resize(1 + count as usize, 0x00);
    section(3, &payload)
}

fn code(bodies: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = vec![bodies.len() as u8];
    for body in bodies {
        payload.extend_from_slice(body);
    }
    section(10, &payload)
}

//
// Tests.
//

const WELL_FORMED: &str = r#"
(module
  (type (func (param i32) (result i32)))
  (type (func))
  (import "env" "f" (func (type 0)))
  (import "env" "g" (global i32))
  (table 2 funcref)
  (memory 1 2)
  (global (mut i32) (global.get 0))
  (global f64 (f64.const 1.5))
  (func (type 0) (local i64)
    local.get 0
    call 0
    global.get 1
    i32.add)
  (func (type 1)
    i32.const 0
    i32.const 0
    i32.load
    i32.store
    i32.const 7
    i32.const 1
    call_indirect (type 0)
    drop)
  (export "add" (func 1))
  (export "mem" (memory 0))
  (export "tbl" (table 0))
  (start 2)
  (elem (i32.const 0) 1 2)
  (data (i32.const 8) "hello"))
"#;

#[test]
fn well_formed_module() {
    let bytes = wat::parse_str(WELL_FORMED).unwrap();
    let module = decode(&bytes).unwrap();
    let env = &module.env;

    assert_eq!(env.num_sigs(), 2);
    assert_eq!(env.num_funcs(), 3);
    assert_eq!(env.num_func_imports(), 1);
    assert_eq!(env.num_globals(), 3);
    assert_eq!(
        env.table().map(|table| table.limits),
        Some(Limits {
            initial: 2,
            maximum: None
        })
    );
    assert_eq!(
        env.memory().map(|memory| memory.limits),
        Some(Limits {
            initial: 1,
            maximum: Some(2)
        })
    );
    assert_eq!(
        env.global(GlobalIdx::new(1)).map(|global| global.init),
        Some(GlobalInit::Constant(InitExpr::GetGlobal {
            index: GlobalIdx::new(0),
            ty: ValType::I32
        }))
    );

    assert_eq!(module.imports.len(), 2);
    assert_eq!(&**module.imports[0].module, "env");
    assert_eq!(&**module.imports[1].field, "g");

    assert_eq!(module.exports.len(), 3);
    assert_eq!(
        module.export("add").map(|export| export.kind),
        Some(ExportKind::Function(FuncIdx::new(1)))
    );
    assert_eq!(
        module.export("mem").map(|export| export.kind),
        Some(ExportKind::Memory(MemIdx::new(0)))
    );
    assert!(module.export("missing").is_none());

    assert_eq!(module.start, Some(FuncIdx::new(2)));

    assert_eq!(module.elems.len(), 1);
    assert_eq!(module.elems[0].offset, InitExpr::I32(0));
    assert_eq!(&module.elems[0].funcs[..], &[FuncIdx::new(1), FuncIdx::new(2)]);

    assert_eq!(module.data.len(), 1);
    assert_eq!(module.data[0].offset, InitExpr::I32(8));
    assert_eq!(module.data[0].bytes(&bytes), Some(&b"hello"[..]));

    assert_eq!(module.bodies.len(), 2);
    let first = module.body(FuncIdx::new(1)).unwrap();
    assert_eq!(first.func, FuncIdx::new(1));
    assert_eq!(&first.locals[..], &[ValType::I32, ValType::I64]);
    assert!(module.body(FuncIdx::new(0)).is_none());

    // Every reference resolves.
    for body in module.bodies.iter() {
        assert!(*body.func < env.num_funcs());
        let start = body.bytecode_offset as usize;
        assert_eq!(&bytes[start..start + body.code.len()], &body.code[..]);
    }
    for func in module.elems.iter().flat_map(|elem| elem.funcs.iter()) {
        assert!(**func < env.num_funcs());
    }
}

#[test]
fn decoding_is_deterministic() {
    let bytes = wat::parse_str(WELL_FORMED).unwrap();
    let first = decode(&bytes).unwrap();
    let second = decode(&bytes).unwrap();
    assert_eq!(format!("{first:?}"), format!("{second:?}"));
}

#[test]
fn bodies_validate_independently() {
    let bytes = wat::parse_str(WELL_FORMED).unwrap();
    let module = decode(&bytes).unwrap();

    thread::scope(|scope| {
        let handles: Vec<_> = module
            .bodies
            .iter()
            .map(|body| {
                let env = &module.env;
                scope.spawn(move || {
                    validate_function_body(env, body.func, &body.code, body.bytecode_offset)
                })
            })
            .collect();

        for (handle, body) in handles.into_iter().zip(module.bodies.iter()) {
            let validated = handle.join().unwrap().unwrap();
            assert_eq!(validated.func, body.func);
            assert_eq!(&validated.locals[..], &body.locals[..]);
            assert_eq!(&validated.code[..], &body.code[..]);
        }
    });
}

#[test]
fn compile_args_reach_the_builder() {
    let bytes = module(&[]);
    let args = CompileArgs {
        always_baseline: true,
        ..CompileArgs::default()
    };
    let module = compile::<_, Module<_>>(&bytes, &args, Global).unwrap();
    assert!(module.always_baseline);
}

#[test]
fn preamble() {
    assert!(decode(&module(&[])).is_ok());
    assert_error!(
        decode(&[0x00, 0x61, 0x73, 0x6e, 0x01, 0x00, 0x00, 0x00]),
        Error::InvalidMagic(0x6e_73_61_00),
        ErrorKind::MalformedEncoding
    );
    assert_error!(
        decode(&[0x00, 0x61, 0x73, 0x6d, 0x02, 0x00, 0x00, 0x00]),
        Error::UnknownVersion(2),
        ErrorKind::MalformedEncoding
    );
    assert_error!(
        decode(&PREAMBLE[..6]),
        Error::UnexpectedEof,
        ErrorKind::MalformedEncoding
    );
}

#[test]
fn section_length_mismatch() {
    // Declares five bytes but only four are consumed.
    let bytes = module(&[vec![0x01, 0x05, 0x01, 0x60, 0x00, 0x00, 0x00]]);
    assert_error!(
        decode(&bytes),
        Error::InvalidSectionLength {
            id: SectionId::Type,
            expected: 5,
            actual: 4
        },
        ErrorKind::StructuralViolation
    );

    // Declares three bytes but four are consumed.
    let bytes = module(&[vec![0x01, 0x03, 0x01, 0x60, 0x00, 0x00]]);
    assert_error!(
        decode(&bytes),
        Error::InvalidSectionLength {
            id: SectionId::Type,
            expected: 3,
            actual: 4
        },
        ErrorKind::StructuralViolation
    );
}

#[test]
fn function_length_mismatch() {
    // The body is `end; nop`, declared as four bytes.
    let mut code_payload = vec![0x01, 0x03, 0x00, 0x0b, 0x01];
    let bytes = module(&[void_type(), funcs(1), section(10, &code_payload)]);
    assert_error!(
        decode(&bytes),
        Error::InvalidFunctionLength {
            expected: 3,
            actual: 2
        },
        ErrorKind::StructuralViolation
    );

    // A declared body size past the end of the module.
    code_payload[1] = 0x7f;
    let bytes = module(&[void_type(), funcs(1), section(10, &code_payload)]);
    assert_error!(
        decode(&bytes),
        Error::UnexpectedEof,
        ErrorKind::MalformedEncoding
    );
}

#[test]
fn section_order() {
    let bytes = module(&[section(3, &[0x00]), section(1, &[0x00])]);
    assert_error!(
        decode(&bytes),
        Error::OutOfOrderSection {
            before: SectionId::Function,
            after: SectionId::Type
        },
        ErrorKind::StructuralViolation
    );

    let bytes = module(&[section(1, &[0x00]), section(1, &[0x00])]);
    assert_error!(
        decode(&bytes),
        Error::DuplicateSection(SectionId::Type),
        ErrorKind::StructuralViolation
    );
}

#[test]
fn custom_and_unknown_sections_are_transparent() {
    let bytes = module(&[
        custom("a", &[1, 2, 3]),
        void_type(),
        section(0x42, &[0xff, 0xff]),
        custom("b", &[]),
        funcs(1),
        code(&[body(&[0x0b])]),
        section(0x20, &[]),
    ]);
    let module = decode(&bytes).unwrap();
    assert_eq!(module.bodies.len(), 1);
}

#[test]
fn end_requires_declared_arity() {
    assert_error!(
        decode_wat("(module (func (result i32)))"),
        Error::ArityMismatch {
            expected: 1,
            actual: 0
        },
        ErrorKind::TypeViolation
    );
    assert_error!(
        decode_wat("(module (func (result i32) (block (result i32) nop) ))"),
        Error::ArityMismatch {
            expected: 1,
            actual: 0
        },
        ErrorKind::TypeViolation
    );
    assert_error!(
        decode_wat("(module (func i32.const 1))"),
        Error::ArityMismatch {
            expected: 0,
            actual: 1
        },
        ErrorKind::TypeViolation
    );
}

#[test]
fn errors_carry_context() {
    let error = decode_wat("(module (func (result i32)))").unwrap_err();
    let trace = format!("{error:?}");
    assert!(trace.contains("codesec"), "{trace}");
    assert!(trace.contains("func"), "{trace}");
    assert!(trace.contains("instr"), "{trace}");
    assert!(error.offset().is_some());
    assert!(format!("{error}").contains("(instr)"), "{error}");
}

#[test]
fn dead_code_is_polymorphic() {
    let module = decode_wat(
        r#"
        (module
          (func (result i32)
            (block
              br 0
              i32.add
              drop
              f64.neg
              drop
              select
              i64.eqz
              br_if 0)
            i32.const 1))
        "#,
    );
    assert!(module.is_ok(), "{module:?}");

    // The same sequence, reachable.
    assert_error!(
        decode_wat("(module (func (block i32.add drop)))"),
        Error::StackUnderflow,
        ErrorKind::TypeViolation
    );
}

#[test]
fn typed_if_requires_else() {
    assert_error!(
        decode_wat("(module (func (result i32) (if (result i32) (i32.const 1) (then (i32.const 2)))))"),
        Error::IfWithoutElse,
        ErrorKind::TypeViolation
    );
    assert!(
        decode_wat(
            "(module (func (result i32) (if (result i32) (i32.const 1) (then (i32.const 2)) (else (i32.const 3)))))"
        )
        .is_ok()
    );
}

#[test]
fn br_table_targets_agree() {
    assert_error!(
        decode_wat(
            r#"
            (module
              (func
                (block
                  (block (result i32)
                    i32.const 0
                    i32.const 0
                    br_table 0 1)
                  drop)))
            "#
        ),
        Error::BrTableTypeMismatch {
            expected: ResultType::Value(ValType::I32),
            actual: ResultType::Void
        },
        ErrorKind::TypeViolation
    );
}

#[test]
fn duplicate_export_names() {
    assert_error!(
        decode_wat(
            r#"
            (module
              (func)
              (global i32 (i32.const 0))
              (export "foo" (func 0))
              (export "foo" (global 0)))
            "#
        ),
        Error::DuplicateExportName { index: 1 },
        ErrorKind::StructuralViolation
    );
}

#[test]
fn export_indices_in_range() {
    assert_error!(
        decode_wat(r#"(module (func) (export "f" (func 1)))"#),
        Error::IndexOutOfBounds {
            space: IndexSpace::Function,
            index: 1,
            capacity: 1
        },
        ErrorKind::StructuralViolation
    );
    assert_error!(
        decode_wat(r#"(module (export "m" (memory 0)))"#),
        Error::IndexOutOfBounds {
            space: IndexSpace::Memory,
            index: 0,
            capacity: 0
        },
        ErrorKind::StructuralViolation
    );
}

#[test]
fn host_incompatible_globals() {
    assert_error!(
        decode_wat(r#"(module (global (mut i32) (i32.const 0)) (export "g" (global 0)))"#),
        Error::Rejected("can't import or export a mutable global"),
        ErrorKind::SemanticPrecondition
    );
    assert_error!(
        decode_wat(r#"(module (global i64 (i64.const 0)) (export "g" (global 0)))"#),
        Error::Rejected("can't import or export an i64 global"),
        ErrorKind::SemanticPrecondition
    );
    assert_error!(
        decode_wat(r#"(module (import "env" "g" (global i64)))"#),
        Error::Rejected("can't import or export an i64 global"),
        ErrorKind::SemanticPrecondition
    );
    // Not exported, so not a concern.
    assert!(decode_wat("(module (global (mut i64) (i64.const 0)))").is_ok());
}

#[test]
fn call_indirect_requires_table() {
    let bytes = module(&[
        void_type(),
        funcs(1),
        code(&[body(&[0x41, 0x00, 0x11, 0x00, 0x00, 0x0b])]),
    ]);
    assert_error!(
        decode(&bytes),
        Error::MissingTable,
        ErrorKind::SemanticPrecondition
    );
}

#[test]
fn memory_instructions_require_memory() {
    assert_error!(
        decode_wat("(module (func (drop (memory.size))))"),
        Error::MissingMemory,
        ErrorKind::SemanticPrecondition
    );

    let data = section(11, &[0x01, 0x00, 0x41, 0x00, 0x0b, 0x01, b'x']);
    assert_error!(
        decode(&module(&[data])),
        Error::DataWithoutMemory,
        ErrorKind::SemanticPrecondition
    );
}

#[test]
fn start_function_signature() {
    assert_error!(
        decode_wat("(module (func (param i32)) (start 0))"),
        Error::InvalidStartFunction(FuncIdx::new(0)),
        ErrorKind::TypeViolation
    );
    assert_error!(
        decode_wat("(module (func (result i32) i32.const 0) (start 0))"),
        Error::InvalidStartFunction(FuncIdx::new(0)),
        ErrorKind::TypeViolation
    );
    assert_error!(
        decode_wat("(module (func) (start 1))"),
        Error::IndexOutOfBounds {
            space: IndexSpace::Function,
            index: 1,
            capacity: 1
        },
        ErrorKind::StructuralViolation
    );
}

#[test]
fn code_count_must_match_function_count() {
    // The second entry is garbage; the count mismatch is reported first.
    let bytes = module(&[
        void_type(),
        funcs(1),
        code(&[body(&[0x0b]), vec![0x05, 0xff, 0xff]]),
    ]);
    assert_error!(
        decode(&bytes),
        Error::FunctionAndCodeSectionMismatch {
            funcsec_size: 1,
            codesec_size: 2
        },
        ErrorKind::StructuralViolation
    );

    let bytes = module(&[void_type(), funcs(1)]);
    assert_error!(
        decode(&bytes),
        Error::FunctionAndCodeSectionMismatch {
            funcsec_size: 1,
            codesec_size: 0
        },
        ErrorKind::StructuralViolation
    );
}

#[test]
fn one_table_and_one_memory() {
    assert_error!(
        decode_wat(r#"(module (import "env" "m" (memory 1)) (memory 1))"#),
        Error::MultipleMemories,
        ErrorKind::StructuralViolation
    );
    assert_error!(
        decode_wat(r#"(module (import "env" "t" (table 1 funcref)) (table 1 funcref))"#),
        Error::MultipleTables,
        ErrorKind::StructuralViolation
    );
    assert_error!(
        decode(&module(&[section(5, &[0x01, 0x01, 0x02, 0x01])])),
        Error::InvalidLimits(Limits {
            initial: 2,
            maximum: Some(1)
        }),
        ErrorKind::StructuralViolation
    );
}

#[test]
fn initializer_expressions() {
    assert_error!(
        decode_wat("(module (global i32 (i64.const 0)))"),
        Error::InitializerTypeMismatch {
            expected: ValType::I32,
            actual: ValType::I64
        },
        ErrorKind::TypeViolation
    );
    assert_error!(
        decode_wat("(module (global i32 (i32.const 0)) (global i32 (global.get 0)))"),
        Error::InvalidInitializerGlobal(GlobalIdx::new(0)),
        ErrorKind::StructuralViolation
    );
    // No forward references, even within the global section.
    assert_error!(
        decode_wat("(module (global i32 (global.get 1)) (global i32 (i32.const 0)))"),
        Error::IndexOutOfBounds {
            space: IndexSpace::Global,
            index: 1,
            capacity: 0
        },
        ErrorKind::StructuralViolation
    );
}

#[test]
fn name_section() {
    // One function named "main" with one local named "x".
    let names = custom("name", &[0x01, 0x04, b'm', b'a', b'i', b'n', 0x01, 0x01, b'x']);
    let bytes = module(&[void_type(), funcs(1), code(&[body(&[0x0b])]), names]);
    let module = decode(&bytes).unwrap();
    assert_eq!(module.func_name(FuncIdx::new(0), &bytes), Some("main"));
    assert_eq!(module.func_name(FuncIdx::new(1), &bytes), None);
}

#[test]
fn malformed_name_section_is_discarded() {
    let bytes_with = |names: Vec<u8>| module(&[void_type(), funcs(1), code(&[body(&[0x0b])]), names]);

    // Claims two names but holds one.
    let bytes = bytes_with(custom("name", &[0x02, 0x01, b'f', 0x00]));
    let module = decode(&bytes).unwrap();
    assert!(module.func_names.is_none());
    assert_eq!(module.bodies.len(), 1);

    // A name running past the end of the section.
    let bytes = bytes_with(custom("name", &[0x01, 0x09, b'f']));
    assert!(decode(&bytes).unwrap().func_names.is_none());

    // Other custom sections after it are still fine.
    let mut bytes = bytes_with(custom("name", &[0x01, 0x09, b'f']));
    bytes.extend(custom("trailer", &[0x00]));
    assert!(decode(&bytes).is_ok());
}

#[test]
fn custom_sections_are_transparent_anywhere() {
    // A name that is not UTF-8, and one that runs past its section.
    let unreadable = section(0, &[0x01, 0xff, 0x00]);
    let truncated = section(0, &[0x05, b'n']);
    let names = custom("name", &[0x01, 0x01, b'f', 0x00]);

    let layouts = [
        vec![unreadable.clone(), truncated.clone(), void_type(), funcs(1), code(&[body(&[0x0b])])],
        vec![void_type(), unreadable.clone(), funcs(1), truncated.clone(), code(&[body(&[0x0b])])],
        vec![void_type(), funcs(1), code(&[body(&[0x0b])]), unreadable.clone(), truncated.clone()],
        vec![void_type(), funcs(1), code(&[body(&[0x0b])]), unreadable, truncated, names],
    ];
    for sections in &layouts {
        let bytes = module(sections);
        let result = decode(&bytes);
        assert!(result.is_ok(), "{result:?}");
    }

    // The name section is still found behind the unreadable ones.
    let bytes = module(&layouts[3]);
    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded.func_name(FuncIdx::new(0), &bytes), Some("f"));
}

// A module with one `[] -> []` function and a table, with `elems` as its
// element section.
fn with_table(elems: &[u8]) -> Vec<u8> {
    module(&[
        void_type(),
        funcs(1),
        section(4, &[0x01, 0x70, 0x00, 0x01]),
        section(9, elems),
        code(&[body(&[0x0b])]),
    ])
}

#[test]
fn element_segments() {
    assert!(decode(&with_table(&[0x01, 0x00, 0x41, 0x00, 0x0b, 0x01, 0x00])).is_ok());

    // No table to initialize.
    let bytes = module(&[
        void_type(),
        funcs(1),
        section(9, &[0x01, 0x00, 0x41, 0x00, 0x0b, 0x01, 0x00]),
        code(&[body(&[0x0b])]),
    ]);
    assert_error!(
        decode(&bytes),
        Error::IndexOutOfBounds {
            space: IndexSpace::Table,
            index: 0,
            capacity: 0
        },
        ErrorKind::StructuralViolation
    );

    // Function 1 of 1.
    assert_error!(
        decode(&with_table(&[0x01, 0x00, 0x41, 0x00, 0x0b, 0x01, 0x01])),
        Error::IndexOutOfBounds {
            space: IndexSpace::Function,
            index: 1,
            capacity: 1
        },
        ErrorKind::StructuralViolation
    );

    // i64.const 0
    assert_error!(
        decode(&with_table(&[0x01, 0x00, 0x42, 0x00, 0x0b, 0x00])),
        Error::InitializerTypeMismatch {
            expected: ValType::I32,
            actual: ValType::I64
        },
        ErrorKind::TypeViolation
    );
}

#[test]
fn implementation_limits() {
    // MAX_TYPES + 1 signatures declared.
    let mut payload = Vec::new();
    leb128(&mut payload, MAX_TYPES + 1);
    assert_error!(
        decode(&module(&[section(1, &payload)])),
        Error::TooMany {
            what: Cardinality::Types,
            count: u64::from(MAX_TYPES) + 1
        },
        ErrorKind::StructuralViolation
    );

    // A signature with two results.
    assert_error!(
        decode(&module(&[section(1, &[0x01, 0x60, 0x00, 0x02, 0x7f, 0x7f])])),
        Error::TooMany {
            what: Cardinality::Results,
            count: 2
        },
        ErrorKind::StructuralViolation
    );

    // A body declaring `count` i32 locals.
    let locals = |count: u32| {
        let mut contents = vec![0x01];
        leb128(&mut contents, count);
        contents.extend_from_slice(&[0x7f, 0x0b]);
        let mut entry = Vec::new();
        leb128(&mut entry, contents.len() as u32);
        entry.extend(contents);
        module(&[void_type(), funcs(1), code(&[entry])])
    };
    let decoded = decode(&locals(MAX_LOCALS)).unwrap();
    assert_eq!(decoded.bodies[0].locals.len(), MAX_LOCALS as usize);
    assert_error!(
        decode(&locals(MAX_LOCALS + 1)),
        Error::TooMany {
            what: Cardinality::Locals,
            count: u64::from(MAX_LOCALS) + 1
        },
        ErrorKind::StructuralViolation
    );
}

#[test]
fn earliest_duplicate_export_is_reported() {
    assert_error!(
        decode_wat(
            r#"
            (module
              (func)
              (export "b" (func 0))
              (export "a" (func 0))
              (export "c" (func 0))
              (export "a" (func 0))
              (export "b" (func 0)))
            "#
        ),
        Error::DuplicateExportName { index: 3 },
        ErrorKind::StructuralViolation
    );

    // Many exports in descending order, all distinct.
    let count = 1024_u32;
    let mut payload = Vec::new();
    leb128(&mut payload, count);
    for i in (0..count).rev() {
        let name = format!("e{i:04}");
        leb128(&mut payload, name.len() as u32);
        payload.extend_from_slice(name.as_bytes());
        payload.extend_from_slice(&[0x00, 0x00]);
    }
    let bytes = module(&[void_type(), funcs(1), section(7, &payload), code(&[body(&[0x0b])])]);
    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded.exports.len(), count as usize);
    assert_eq!(&**decoded.exports[0].field, "e1023");
}
