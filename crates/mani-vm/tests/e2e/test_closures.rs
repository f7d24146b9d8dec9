use super::helpers::*;

// ---- Capture of live locals ----

#[test]
fn test_capture_local() {
    assert_number(
        "local x = 10
         local function f() return x end
         return f()",
        10.0,
    );
}

#[test]
fn test_upvalue_mutation_visible_to_frame() {
    assert_number(
        "local x = 0
         local function inc() x = x + 1 end
         inc()
         inc()
         return x",
        2.0,
    );
}

#[test]
fn test_upvalue_shared_between_closures() {
    assert_number(
        "local x = 0
         local function inc() x = x + 1 end
         local function get() return x end
         inc()
         inc()
         inc()
         return get()",
        3.0,
    );
}

// ---- Closing: captured locals survive their frame ----

#[test]
fn test_closure_outlives_frame() {
    assert_number(
        "local function make()
             local x = 10
             return function() return x end
         end
         local f = make()
         return f()",
        10.0,
    );
}

#[test]
fn test_mutation_before_close_is_observed() {
    assert_number(
        "local function make()
             local x = 10
             local function get() return x end
             x = 42
             return get
         end
         local f = make()
         return f()",
        42.0,
    );
}

#[test]
fn test_closed_cells_are_independent_per_call() {
    assert_number(
        "local function counter()
             local n = 0
             return function()
                 n = n + 1
                 return n
             end
         end
         local a = counter()
         local b = counter()
         a()
         a()
         b()
         return a() * 10 + b()",
        32.0,
    );
}

#[test]
fn test_writes_through_closed_cell() {
    assert_number(
        "local function make()
             local x = 0
             return {
                 set = function(v) x = v end,
                 get = function() return x end,
             }
         end
         local ops = make()
         ops.set(99)
         return ops.get()",
        99.0,
    );
}

#[test]
fn test_counter_accumulates() {
    assert_number(
        "local function counter()
             local n = 0
             return function()
                 n = n + 1
                 return n
             end
         end
         local c = counter()
         c()
         c()
         return c()",
        3.0,
    );
}

// ---- Transitive capture ----

#[test]
fn test_capture_through_intermediate_function() {
    assert_number(
        "local x = 7
         local function outer()
             return function() return x end
         end
         return outer()()",
        7.0,
    );
}

#[test]
fn test_shared_cell_across_nesting_levels() {
    assert_number(
        "local function make()
             local n = 0
             local function bump() n = n + 10 end
             local function reader()
                 return function() return n end
             end
             bump()
             return reader()()
         end
         return make()",
        10.0,
    );
}

// ---- Parameters are capturable ----

#[test]
fn test_capture_parameter() {
    assert_number(
        "local function bind(n)
             return function() return n end
         end
         local five = bind(5)
         local nine = bind(9)
         return five() + nine()",
        14.0,
    );
}
