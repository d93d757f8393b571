use magma_core::{CoreError, compile_program, run};

const GCD: &str = "\
fn gcd(a : I32, b : I32) : I32 => {
    let mut x = a;
    let mut y = b;
    while (y != 0) {
        let t = x % y;
        x = y;
        y = t;
    }
    x
}
let a = readInt();
let b = readInt();
printInt(gcd(a, b));
0";

const COUNTER: &str = "\
struct Counter {
    count : I32,
    mut fn bump() => { this.count = this.count + 1; }
    fn get() => this.count;
}
let mut c = Counter { count : 0 };
c.bump();
c.bump();
c.bump();
c.get()";

const VARIADIC: &str = "\
fn sum<Length : USize>(...xs : [I32; Length]) : I32 => {
    let mut total = 0;
    let mut i = 0USize;
    while (i < Length) {
        total = total + xs[i];
        i = i + 1USize;
    }
    total
}
sum(1, 2, 3) + sum(10, 20)";

#[test]
fn gcd_program() {
    let outcome = run(GCD, &[84, 36]).unwrap();
    assert_eq!(outcome.stdout(), "12\n");
    assert_eq!(outcome.exit_code, 0);

    let c = compile_program(GCD).unwrap();
    assert!(c.starts_with("#include <stdint.h>\n#include <stdbool.h>\n#include <stdio.h>\n"));
    assert!(c.contains("int32_t gcd(int32_t a, int32_t b) {"));
    assert!(c.contains("while (y != 0) {"));
    assert!(c.contains("int main(void) {"));
    assert!(c.contains("return 0; }"));
}

#[test]
fn mutating_methods() {
    assert_eq!(run(COUNTER, &[]).unwrap().exit_code, 3);

    let c = compile_program(COUNTER).unwrap();
    assert!(c.contains("void bump_Counter(struct Counter* this) { this->count = this->count + 1; }"));
    assert!(c.contains("bump_Counter(&c);"));
    assert!(c.contains("return get_Counter(&c); }"));
}

#[test]
fn mutating_method_needs_mutable_receiver() {
    let source = COUNTER.replace("let mut c", "let c");
    assert!(run(&source, &[]).is_err());
}

#[test]
fn variadic_specializations() {
    assert_eq!(run(VARIADIC, &[]).unwrap().exit_code, 36);

    let c = compile_program(VARIADIC).unwrap();
    assert!(c.contains("int32_t sum_3(int32_t xs_0, int32_t xs_1, int32_t xs_2)"));
    assert!(c.contains("int32_t sum_2(int32_t xs_0, int32_t xs_1)"));
    assert!(c.contains("return sum_3(1, 2, 3) + sum_2(10, 20); }"));
}

#[test]
fn function_values() {
    let source = "fn double(x : I32) => x * 2; \
                  fn apply(f : (I32) => I32, x : I32) : I32 => f(x); \
                  apply(double, 21)";
    assert_eq!(run(source, &[]).unwrap().exit_code, 42);
    let c = compile_program(source).unwrap();
    assert!(c.contains("int32_t apply(int32_t (*f)(int32_t), int32_t x) { return f(x); }"));
}

#[test]
fn runtime_faults_are_reported() {
    let err = run("let a = [1, 2]; a[readInt()]", &[5]).unwrap_err();
    assert!(matches!(err, CoreError::Runtime(_)));
    let err = run("let x = readInt(); 1 / x", &[0]).unwrap_err();
    assert!(matches!(err, CoreError::Runtime(_)));
}

#[test]
fn foreign_functions_compile_but_do_not_run() {
    let source = "extern fn abs(x : I32) : I32; abs(-3)";
    assert!(compile_program(source).unwrap().contains("extern int32_t abs(int32_t);"));
    assert!(matches!(run(source, &[]), Err(CoreError::Runtime(_))));
}
