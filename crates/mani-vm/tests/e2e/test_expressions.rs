use super::helpers::*;

// ---- Arithmetic ----

#[test]
fn test_precedence() {
    assert_number("return 1 + 2 * 3", 7.0);
    assert_number("return (1 + 2) * 3", 9.0);
    assert_number("return 10 - 4 - 3", 3.0);
}

#[test]
fn test_division() {
    assert_number("return 7 / 2", 3.5);
}

#[test]
fn test_modulo() {
    assert_number("return 10 % 3", 1.0);
    assert_number("return 7.9 % 3.2", 1.0);
}

#[test]
fn test_power_right_associative() {
    assert_number("return 2 ^ 3 ^ 2", 512.0);
    assert_number("return 2 ^ 10", 1024.0);
    assert_number("return 4 ^ 0.5", 2.0);
}

#[test]
fn test_unary_minus() {
    assert_number("return -(3 + 4)", -7.0);
    assert_number("return -2 ^ 2", -4.0);
}

#[test]
fn test_number_bases() {
    assert_number("return 0xff + 0o10 + 0b11", 255.0 + 8.0 + 3.0);
    assert_number("return 1e2 + 2.5e-1", 100.25);
}

// ---- Strings ----

#[test]
fn test_concat() {
    assert_str(r#"local s = "a" .. "b" return s"#, "ab");
    assert_str(r#"return "x" .. "y" .. "z""#, "xyz");
}

#[test]
fn test_string_escapes() {
    assert_str(r#"return "a\nb""#, "a\nb");
    assert_str(r#"return 'it\'s'"#, "it's");
}

#[test]
fn test_string_length() {
    assert_number(r#"return #"hello""#, 5.0);
    assert_number(r#"return #("a" .. "b")"#, 2.0);
}

// ---- Comparison ----

#[test]
fn test_number_comparison() {
    assert_boolean("return 1 < 2", true);
    assert_boolean("return 2 <= 2", true);
    assert_boolean("return 3 > 4", false);
    assert_boolean("return 4 >= 5", false);
}

#[test]
fn test_equality() {
    assert_boolean("return 1 == 1", true);
    assert_boolean("return 1 ~= 2", true);
    assert_boolean(r#"return "a" == "a""#, true);
    assert_boolean("return nil == nil", true);
    // Different kinds never compare equal
    assert_boolean("return 1 == true", false);
    assert_boolean(r#"return "1" == 1"#, false);
}

#[test]
fn test_reference_equality() {
    assert_boolean("local t = {} local u = t return t == u", true);
    assert_boolean("return {} == {}", false);
}

// ---- Logic ----

#[test]
fn test_not() {
    assert_boolean("return not true", false);
    assert_boolean("return not (1 > 2)", true);
}

#[test]
fn test_and_or_values() {
    assert_boolean("return true and false", false);
    assert_boolean("return false or true", true);
    // The deciding operand must be a boolean; the result may be any value
    assert_number("return true and 5", 5.0);
    assert_number("return false or 6", 6.0);
}

#[test]
fn test_short_circuit_right_operand_skipped() {
    // The untaken operand would fault (calling nil); short-circuiting
    // must not evaluate it.
    assert_boolean("return false and missing()", false);
    assert_boolean("return true or missing()", true);
}

// ---- Misc ----

#[test]
fn test_nil_literal() {
    assert_nil("return nil");
    assert_nil("return");
}

#[test]
fn test_multi_return_keeps_first() {
    assert_number("return 1, 2, 3", 1.0);
}

#[test]
fn test_parenthesised_nesting() {
    assert_number("return ((((5))))", 5.0);
}
