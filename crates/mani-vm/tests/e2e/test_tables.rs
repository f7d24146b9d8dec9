use super::helpers::*;

#[test]
fn test_constructor_and_length() {
    assert_number("local t = {1, 2, 3} return #t", 3.0);
    assert_number("local t = {} return #t", 0.0);
}

#[test]
fn test_constructor_field_kinds() {
    assert_number(
        "local t = {5, x = 6, [10] = 7}
         return t[1] + t.x + t[10]",
        18.0,
    );
}

#[test]
fn test_positional_keys_count_from_one() {
    assert_number("local t = {9, 8, 7} return t[1] * 100 + t[2] * 10 + t[3]", 987.0);
}

#[test]
fn test_index_and_field_assignment() {
    assert_number(
        "local t = {}
         t[1] = 10
         t.x = 20
         t['y'] = 30
         return t[1] + t.x + t.y",
        60.0,
    );
}

#[test]
fn test_missing_key_reads_nil() {
    assert_nil("local t = {} return t.missing");
    assert_nil("local t = {1} return t[2]");
}

#[test]
fn test_set_overwrites() {
    assert_number(
        "local t = {}
         t.x = 1
         t.x = 2
         return t.x + #t",
        3.0,
    );
}

#[test]
fn test_length_counts_distinct_keys() {
    assert_number(
        "local t = {x = 1}
         t.x = 2
         t.y = 3
         return #t",
        2.0,
    );
}

#[test]
fn test_nested_tables() {
    assert_number(
        "local t = {inner = {value = 42}}
         return t.inner.value",
        42.0,
    );
}

#[test]
fn test_tables_are_references() {
    assert_number(
        "local t = {n = 1}
         local u = t
         u.n = 5
         return t.n",
        5.0,
    );
}

#[test]
fn test_mixed_key_kinds() {
    assert_number(
        "local t = {}
         t[1] = 100
         t['1'] = 200
         t[true] = 300
         return t[1] + t['1'] + t[true]",
        600.0,
    );
}

#[test]
fn test_table_values_can_be_tables_and_functions() {
    assert_number(
        "local dispatch = {
             double = function(n) return n * 2 end,
             triple = function(n) return n * 3 end,
         }
         return dispatch.double(4) + dispatch.triple(5)",
        23.0,
    );
}

#[test]
fn test_table_as_key() {
    assert_number(
        "local k = {}
         local t = {}
         t[k] = 11
         return t[k]",
        11.0,
    );
}

#[test]
fn test_string_keys_by_content() {
    assert_number(
        "local t = {}
         t['ab'] = 1
         local key = 'a' .. 'b'
         return t[key]",
        1.0,
    );
}
