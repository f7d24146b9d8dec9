use super::helpers::*;

// ---- If ----

#[test]
fn test_if_else() {
    assert_number("if false then return 1 else return 2 end", 2.0);
    assert_number("if true then return 1 else return 2 end", 1.0);
}

#[test]
fn test_elseif_chain() {
    let source = |n: u32| {
        format!(
            "local x = {n}
             if x == 1 then return 10
             elseif x == 2 then return 20
             elseif x == 3 then return 30
             else return 0 end"
        )
    };
    assert_number(&source(1), 10.0);
    assert_number(&source(2), 20.0);
    assert_number(&source(3), 30.0);
    assert_number(&source(9), 0.0);
}

#[test]
fn test_untaken_branch_never_runs() {
    // The probe table records which arm executed.
    assert_number(
        "local t = {}
         if false then t[1] = true else t[2] = true end
         if t[1] == nil then return #t end
         return -1",
        1.0,
    );
}

// ---- While / repeat ----

#[test]
fn test_while_loop() {
    assert_number(
        "local n = 0
         local i = 0
         while i < 10 do i = i + 1 n = n + i end
         return n",
        55.0,
    );
}

#[test]
fn test_while_false_body_skipped() {
    assert_number("local n = 1 while false do n = 2 end return n", 1.0);
}

#[test]
fn test_repeat_runs_at_least_once() {
    assert_number("local n = 0 repeat n = n + 1 until true return n", 1.0);
    assert_number("local n = 0 repeat n = n + 1 until n >= 5 return n", 5.0);
}

#[test]
fn test_repeat_condition_sees_body_locals() {
    assert_number(
        "local n = 0
         repeat
             local step = 2
             n = n + step
         until step + n > 7
         return n",
        6.0,
    );
}

#[test]
fn test_break() {
    assert_number(
        "local n = 0
         while true do
             n = n + 1
             if n == 4 then break end
         end
         return n",
        4.0,
    );
}

// ---- Numeric for ----

#[test]
fn test_numeric_for_sum() {
    assert_number("local n = 0 for i = 1, 5 do n = n + i end return n", 15.0);
}

#[test]
fn test_numeric_for_step() {
    assert_number("local n = 0 for i = 1, 10, 3 do n = n + i end return n", 22.0);
    assert_number("local n = 0 for i = 5, 1, -1 do n = n + i end return n", 15.0);
}

#[test]
fn test_numeric_for_empty_range() {
    assert_number("local n = 0 for i = 5, 1 do n = n + i end return n", 0.0);
}

#[test]
fn test_numeric_for_break() {
    assert_number(
        "local n = 0
         for i = 1, 100 do
             if i > 3 then break end
             n = n + i
         end
         return n",
        6.0,
    );
}

#[test]
fn test_nested_loops() {
    assert_number(
        "local n = 0
         for i = 1, 3 do
             for j = 1, 3 do n = n + 1 end
         end
         return n",
        9.0,
    );
}

// ---- Generic for ----

#[test]
fn test_generic_for_iterator_protocol() {
    assert_number(
        "local function upto(limit)
             local i = 0
             return function()
                 i = i + 1
                 if i > limit then return nil end
                 return i
             end
         end
         local n = 0
         for v in upto(4) do n = n + v end
         return n",
        10.0,
    );
}

#[test]
fn test_generic_for_extra_vars_are_nil() {
    assert_boolean(
        "local function once()
             local done = false
             return function()
                 if done then return nil end
                 done = true
                 return 1
             end
         end
         local second = 0
         for a, b in once() do second = b end
         return second == nil",
        true,
    );
}

// ---- Goto ----

#[test]
fn test_goto_backward() {
    assert_number(
        "local n = 0
         ::top::
         n = n + 1
         if n < 3 then goto top end
         return n",
        3.0,
    );
}

#[test]
fn test_goto_forward() {
    assert_number(
        "local n = 1
         do
             n = 2
             goto done
         end
         ::done::
         return n",
        2.0,
    );
}

// ---- Do blocks and scoping ----

#[test]
fn test_do_block_scoping() {
    assert_number(
        "local x = 1
         do
             local x = 2
         end
         return x",
        1.0,
    );
}
