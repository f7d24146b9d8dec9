use super::helpers::*;
use mani_vm::error::VmErrorKind;

#[test]
fn test_calling_a_non_closure_faults() {
    let err = run_fault("local x = 5 return x()");
    assert_eq!(err.kind, VmErrorKind::TypeMismatch);
    assert!(err.message.contains("call"));
}

#[test]
fn test_calling_nil_global_faults() {
    let err = run_fault("return missing()");
    assert_eq!(err.kind, VmErrorKind::TypeMismatch);
}

#[test]
fn test_arithmetic_on_wrong_kind_faults() {
    let err = run_fault("return 1 + true");
    assert_eq!(err.kind, VmErrorKind::TypeMismatch);
    let err = run_fault(r#"return "a" + 1"#);
    assert_eq!(err.kind, VmErrorKind::TypeMismatch);
}

#[test]
fn test_ordering_non_numbers_faults() {
    let err = run_fault(r#"return "a" < "b""#);
    assert_eq!(err.kind, VmErrorKind::TypeMismatch);
}

#[test]
fn test_concat_non_strings_faults() {
    let err = run_fault("return 1 .. 2");
    assert_eq!(err.kind, VmErrorKind::TypeMismatch);
}

#[test]
fn test_non_boolean_condition_faults() {
    let err = run_fault("if 1 then return 1 end");
    assert_eq!(err.kind, VmErrorKind::TypeMismatch);
}

#[test]
fn test_modulo_by_zero_faults() {
    let err = run_fault("return 1 % 0");
    assert_eq!(err.kind, VmErrorKind::Arithmetic);
}

#[test]
fn test_length_of_number_faults() {
    let err = run_fault("return #5");
    assert_eq!(err.kind, VmErrorKind::TypeMismatch);
    assert!(err.message.contains("length"));
}

#[test]
fn test_indexing_non_table_faults() {
    let err = run_fault("local n = 3 return n[1]");
    assert_eq!(err.kind, VmErrorKind::TypeMismatch);
}

#[test]
fn test_nil_table_key_faults() {
    let err = run_fault("local t = {} t[nil] = 1");
    assert_eq!(err.kind, VmErrorKind::TypeMismatch);
    assert!(err.message.contains("nil"));
}

#[test]
fn test_fault_trace_is_populated() {
    let err = run_fault("return 1 + true");
    assert!(err.trace.pc > 0);
    assert!(err.trace.code_len > 0);
    assert_eq!(err.trace.call_depth, 1, "root frame still active at fault");
}

#[test]
fn test_faults_stop_execution() {
    // The global write after the fault must not happen; a second program
    // checks nothing leaked into a fresh VM anyway.
    let err = run_fault(
        "local t = {}
         local x = t.missing + 1
         marker = true",
    );
    assert_eq!(err.kind, VmErrorKind::TypeMismatch);
}
