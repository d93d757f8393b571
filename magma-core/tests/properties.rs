use magma_core::{CoreError, compile, run};
use pretty_assertions::assert_eq;

const HEADER: &str = "#include <stdint.h>\n";

fn body(source: &str) -> String {
    let out = compile(source).unwrap_or_else(|err| panic!("{source}: {err}"));
    out.lines().filter(|l| !l.starts_with("#include")).collect()
}

#[test]
fn suffixed_literals_strip_their_suffix() {
    let cases = [
        ("I8", "int8_t", "127"),
        ("I16", "int16_t", "32767"),
        ("I32", "int32_t", "100"),
        ("I64", "int64_t", "9000000000"),
        ("U8", "uint8_t", "255"),
        ("U16", "uint16_t", "65535"),
        ("U32", "uint32_t", "4294967295"),
        ("U64", "uint64_t", "42"),
    ];
    for (suffix, c_type, value) in cases {
        let source = format!("let x = {value}{suffix};");
        assert_eq!(body(&source), format!("{c_type} x = {value};"), "{source}");
    }
}

#[test]
fn negated_suffixed_literals_reach_the_minimum() {
    let cases = [
        ("I8", "int8_t", "128"),
        ("I16", "int16_t", "32768"),
        ("I32", "int32_t", "2147483648"),
    ];
    for (suffix, c_type, magnitude) in cases {
        let source = format!("let x = -{magnitude}{suffix};");
        assert_eq!(body(&source), format!("{c_type} x = -{magnitude};"), "{source}");
    }
}

#[test]
fn extreme_64_bit_literals_use_c_safe_spellings() {
    assert_eq!(
        body("let x = -9223372036854775808I64;"),
        "int64_t x = (-9223372036854775807 - 1);"
    );
    assert_eq!(
        body("let x = 18446744073709551615U64;"),
        "uint64_t x = 18446744073709551615ULL;"
    );
}

#[test]
fn function_with_struct_literal_body() {
    let out = compile("struct P { x : I32 } fn mk() => P { x : 1 }; let p = mk();").unwrap();
    assert!(out.contains("struct P mk(void) { return (struct P){ 1 }; }"), "{out}");
    assert!(out.contains("struct P p = mk();"), "{out}");
}

#[test]
fn forward_struct_references_keep_source_order() {
    assert_eq!(
        body("struct A { b : *B } struct B { a : *A }"),
        "struct A { struct B* b; }; struct B { struct A* a; };"
    );
}

#[test]
fn out_of_range_suffix_is_a_range_error() {
    assert!(matches!(compile("let x = 256U8;"), Err(CoreError::Range { .. })));
    assert!(matches!(compile("let x = 128I8;"), Err(CoreError::Range { .. })));
}

#[test]
fn mixed_signedness_is_rejected() {
    let err = compile("let x : I32 = 5; let y : I64 = 10; let z = x + y;").unwrap_err();
    assert!(matches!(err, CoreError::Type { .. }), "{err}");
}

#[test]
fn generic_struct_specialized_once() {
    let out = compile(
        "struct Wrapper<T> { value : T } \
         let a = Wrapper<I32> { value : 1 }; \
         let b = Wrapper<I32> { value : 2 }; \
         let c = Wrapper<Bool> { value : true };",
    )
    .unwrap();
    assert_eq!(out.matches("struct Wrapper_I32 {").count(), 1);
    assert_eq!(out.matches("struct Wrapper_Bool {").count(), 1);
    assert!(out.contains("struct Wrapper_I32 a = { 1 };"));
    assert!(out.contains("struct Wrapper_I32 b = { 2 };"));
}

#[test]
fn block_scope_does_not_leak() {
    let err = compile("{let x = readInt();} x").unwrap_err();
    assert!(matches!(err, CoreError::Scope { .. }), "{err}");
    assert!(err.message().contains("x"));
}

#[test]
fn mutable_borrows_are_exclusive() {
    let err = compile("let mut x = 0; let y = &mut x; let z = &mut x;").unwrap_err();
    assert!(matches!(err, CoreError::Borrow { .. }), "{err}");

    let source = "let mut x = 0; let y = &mut x; *y = 1; x";
    assert!(compile(source).is_ok());
    assert_eq!(run(source, &[]).unwrap().exit_code, 1);
}

#[test]
fn empty_struct_scenario() {
    assert_eq!(
        compile("struct Empty {} let value : Empty = Empty {};").unwrap(),
        format!("{HEADER}struct Empty {{}}; struct Empty value = {{}};")
    );
}

#[test]
fn array_scenario() {
    assert_eq!(
        compile("let array = [1, 2, 3]; let value = array[0];").unwrap(),
        format!("{HEADER}uint8_t array[3] = {{ 1, 2, 3 }}; uint8_t value = array[0];")
    );
}

#[test]
fn bool_scenario() {
    assert_eq!(
        body("let x : Bool = true == false;"),
        "bool x = true == false;"
    );
}

#[test]
fn redeclaration_is_a_scope_error() {
    let err = compile("let x = 1; let x = 2;").unwrap_err();
    assert!(matches!(err, CoreError::Scope { .. }), "{err}");
}

#[test]
fn deref_of_non_pointer_is_a_borrow_error() {
    let err = compile("let x = 1; let y = *x;").unwrap_err();
    assert!(matches!(err, CoreError::Borrow { .. }), "{err}");
}

#[test]
fn array_count_mismatch_is_an_array_error() {
    let err = compile("let a : [I32; 3] = [1, 2];").unwrap_err();
    assert!(matches!(err, CoreError::Array { .. }), "{err}");
    let err = compile("let s : [U8; 2] = \"\\q\";").unwrap_err();
    assert!(matches!(err, CoreError::Array { .. }), "{err}");
}

#[test]
fn wrong_type_argument_count() {
    let err = compile("struct Wrapper<T> { value : T } let a = Wrapper<I32, I32> { value : 1 };")
        .unwrap_err();
    assert!(matches!(err, CoreError::Type { .. }), "{err}");
}

#[test]
fn errors_report_a_byte_position() {
    let err = compile("let x = 1;\nlet y : Bool = x;").unwrap_err();
    match err {
        CoreError::Type { position, .. } => assert!(position >= 11, "position {position}"),
        other => panic!("unexpected {other}"),
    }
}
