use super::helpers::*;

#[test]
fn test_call_and_return() {
    assert_number(
        "local function add(a, b) return a + b end
         return add(2, 3)",
        5.0,
    );
}

#[test]
fn test_function_without_return_yields_nil() {
    assert_nil("local function noop() end return noop()");
}

#[test]
fn test_missing_arguments_are_nil() {
    assert_boolean(
        "local function second(a, b) return b == nil end
         return second(1)",
        true,
    );
}

#[test]
fn test_extra_arguments_dropped() {
    assert_number(
        "local function first(a) return a end
         return first(7, 8, 9)",
        7.0,
    );
}

#[test]
fn test_recursion() {
    assert_number(
        "local function fib(n)
             if n < 2 then return n end
             return fib(n - 1) + fib(n - 2)
         end
         return fib(10)",
        55.0,
    );
}

#[test]
fn test_mutual_recursion_through_globals() {
    assert_boolean(
        "function even(n)
             if n == 0 then return true end
             return odd(n - 1)
         end
         function odd(n)
             if n == 0 then return false end
             return even(n - 1)
         end
         return even(10)",
        true,
    );
}

#[test]
fn test_first_class_functions() {
    assert_number(
        "local function apply(f, x) return f(x) end
         local function double(n) return n * 2 end
         return apply(double, 21)",
        42.0,
    );
}

#[test]
fn test_chained_calls() {
    assert_number(
        "local function adder(n)
             return function(m) return n + m end
         end
         return adder(1)(2)",
        3.0,
    );
}

#[test]
fn test_function_def_in_table() {
    assert_number(
        "local t = {}
         function t.area(w, h) return w * h end
         return t.area(3, 4)",
        12.0,
    );
}

#[test]
fn test_method_call_binds_receiver() {
    assert_number(
        "local counter = {count = 10}
         function counter:bump(n)
             self.count = self.count + n
             return self.count
         end
         return counter:bump(5)",
        15.0,
    );
}

#[test]
fn test_nested_method_path() {
    assert_number(
        "local app = {math = {}}
         function app.math.square(n) return n * n end
         return app.math.square(6)",
        36.0,
    );
}

#[test]
fn test_varargs_collected() {
    assert_number(
        "local function count(...)
             local extras = ...
             return #extras
         end
         return count(1, 2, 3)",
        3.0,
    );
}

#[test]
fn test_varargs_after_params() {
    assert_number(
        "local function tail(first, ...)
             local rest = ...
             return first + #rest
         end
         return tail(10, 'a', 'b')",
        12.0,
    );
}

#[test]
fn test_call_arguments_evaluated_left_to_right() {
    assert_number(
        "local order = 0
         local function mark(expected)
             order = order + 1
             return order == expected
         end
         local function all(a, b, c)
             if a and b and c then return 1 end
             return 0
         end
         return all(mark(1), mark(2), mark(3))",
        1.0,
    );
}

#[test]
fn test_deep_recursion_overflows_cleanly() {
    let err = run_fault(
        "local function dive(n) return dive(n + 1) end
         return dive(0)",
    );
    assert_eq!(err.kind, mani_vm::error::VmErrorKind::StackFlow);
    assert!(err.message.contains("call stack"));
}
