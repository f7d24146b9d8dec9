use mani_core::value::Value;
use mani_vm::error::VmError;
use mani_vm::vm::Vm;

/// Compile and execute source, returning the chunk result and the VM (for
/// string and heap assertions).
pub fn run(source: &str) -> (Value, Vm) {
    let (chunk, strings) =
        mani_compiler::compile(source).unwrap_or_else(|e| panic!("compile error: {e}"));
    let mut vm = Vm::new();
    let result = vm
        .execute(&chunk, strings)
        .unwrap_or_else(|e| panic!("runtime error: {e}"));
    (result, vm)
}

/// Compile and execute source, expecting a VM fault.
pub fn run_fault(source: &str) -> VmError {
    let (chunk, strings) =
        mani_compiler::compile(source).unwrap_or_else(|e| panic!("compile error: {e}"));
    let mut vm = Vm::new();
    match vm.execute(&chunk, strings) {
        Err(e) => e,
        Ok(v) => panic!("expected fault, got {v:?}"),
    }
}

pub fn run_number(source: &str) -> f64 {
    let (value, _) = run(source);
    match value {
        Value::Number(n) => n,
        other => panic!("expected number result, got {other:?}"),
    }
}

pub fn run_boolean(source: &str) -> bool {
    let (value, _) = run(source);
    match value {
        Value::Boolean(b) => b,
        other => panic!("expected boolean result, got {other:?}"),
    }
}

pub fn assert_number(source: &str, expected: f64) {
    let got = run_number(source);
    assert!(
        (got - expected).abs() < 1e-9,
        "{source:?} => {got}, expected {expected}"
    );
}

pub fn assert_boolean(source: &str, expected: bool) {
    assert_eq!(run_boolean(source), expected, "{source:?}");
}

pub fn assert_nil(source: &str) {
    let (value, _) = run(source);
    assert!(value.is_nil(), "{source:?} => {value:?}, expected nil");
}

pub fn assert_str(source: &str, expected: &str) {
    let (value, vm) = run(source);
    match value {
        Value::Str(id) => {
            let got = vm.strings.get_lossy(id).into_owned();
            assert_eq!(got, expected, "{source:?}");
        }
        other => panic!("{source:?} => {other:?}, expected string {expected:?}"),
    }
}
