//! End-to-end scenarios driven through the public embedding surface:
//! whole chunks in, values and captured stdout out.

use std::cell::RefCell;
use std::rc::Rc;

use moonlet::{Config, Env, LuaValue};

fn run(src: &str) -> LuaValue {
    Env::new(Config::default())
        .parse(src)
        .expect("parse failed")
        .exec()
        .expect("exec failed")
}

fn run_values(src: &str) -> Vec<LuaValue> {
    Env::new(Config::default())
        .parse(src)
        .expect("parse failed")
        .exec_values()
        .expect("exec failed")
}

fn run_with_output(src: &str) -> Vec<String> {
    let lines = Rc::new(RefCell::new(Vec::new()));
    let sink = lines.clone();
    let env = Env::new(Config {
        stdout: Some(Box::new(move |line: &str| {
            sink.borrow_mut().push(line.to_string())
        })),
        ..Config::default()
    });
    env.parse(src).expect("parse failed").exec().expect("exec failed");
    let out = lines.borrow().clone();
    out
}

fn num(v: &LuaValue) -> f64 {
    match v {
        LuaValue::Number(n) => *n,
        other => panic!("expected number, got {:?}", other),
    }
}

fn text(v: &LuaValue) -> String {
    match v {
        LuaValue::Str(s) => s.to_string(),
        other => panic!("expected string, got {:?}", other),
    }
}

#[test]
fn print_reaches_the_stdout_collaborator() {
    assert_eq!(run_with_output("print(1 + 2)"), vec!["3"]);
}

#[test]
fn print_joins_with_tabs() {
    assert_eq!(run_with_output("print(1, 'two', true, nil)"), vec!["1\ttwo\ttrue\tnil"]);
}

#[test]
fn table_insert_shifts_and_extends_border() {
    let out = run_values("local t = {10, 20, 30}\ntable.insert(t, 2, 99)\nreturn t[2], #t");
    assert_eq!(num(&out[0]), 99.0);
    assert_eq!(num(&out[1]), 4.0);
}

#[test]
fn metatable_arithmetic() {
    let out = run(
        "local m = {__add = function(a, b) return 42 end}\n\
         local x = setmetatable({}, m)\n\
         return x + 1",
    );
    assert_eq!(num(&out), 42.0);
}

#[test]
fn goto_continue_skips_one_iteration() {
    let lines = run_with_output(
        "for i = 1, 3 do\n  if i == 2 then goto cont end\n  print(i)\n  ::cont::\nend",
    );
    assert_eq!(lines, vec!["1", "3"]);
}

#[test]
fn coroutine_yield_and_resume_values() {
    let out = run_values(
        "local co = coroutine.create(function(a)\n\
           local b = coroutine.yield(a + 1)\n\
           return a + b\n\
         end)\n\
         local r1 = {coroutine.resume(co, 3)}\n\
         local r2 = {coroutine.resume(co, 5)}\n\
         return r1[1], r1[2], r2[1], r2[2]",
    );
    assert_eq!(out[0], LuaValue::Boolean(true));
    assert_eq!(num(&out[1]), 4.0);
    assert_eq!(out[2], LuaValue::Boolean(true));
    assert_eq!(num(&out[3]), 8.0);
}

#[test]
fn gsub_word_replacement() {
    let out = run_values("return string.gsub('hello world', '%w+', 'X')");
    assert_eq!(text(&out[0]), "X X");
    assert_eq!(num(&out[1]), 2.0);
}

// ---------------------------------------------------------------------
// Language semantics

#[test]
fn multiple_assignment_swaps() {
    let out = run_values("local a, b = 1, 2\na, b = b, a\nreturn a, b");
    assert_eq!(num(&out[0]), 2.0);
    assert_eq!(num(&out[1]), 1.0);
}

#[test]
fn closures_share_upvalues() {
    let out = run(
        "local function counter()\n\
           local n = 0\n\
           return function() n = n + 1 return n end\n\
         end\n\
         local c = counter()\n\
         c() c()\n\
         return c()",
    );
    assert_eq!(num(&out), 3.0);
}

#[test]
fn recursion_through_local_function() {
    let out = run(
        "local function fib(n)\n\
           if n < 2 then return n end\n\
           return fib(n - 1) + fib(n - 2)\n\
         end\n\
         return fib(10)",
    );
    assert_eq!(num(&out), 55.0);
}

#[test]
fn varargs_spread_and_count() {
    let out = run_values(
        "local function f(...)\n\
           return select('#', ...), ...\n\
         end\n\
         return f(10, 20, 30)",
    );
    assert_eq!(num(&out[0]), 3.0);
    assert_eq!(num(&out[1]), 10.0);
    assert_eq!(num(&out[3]), 30.0);
}

#[test]
fn only_last_list_position_spreads() {
    let out = run_values(
        "local function two() return 1, 2 end\n\
         return two(), two()",
    );
    // The first call truncates to one value, the trailing call spreads.
    assert_eq!(out.len(), 3);
    assert_eq!(num(&out[0]), 1.0);
    assert_eq!(num(&out[1]), 1.0);
    assert_eq!(num(&out[2]), 2.0);
}

#[test]
fn parenthesized_call_truncates() {
    let out = run_values("local function two() return 1, 2 end\nreturn (two())");
    assert_eq!(out.len(), 1);
    assert_eq!(num(&out[0]), 1.0);
}

#[test]
fn method_definition_and_call() {
    let out = run(
        "local obj = {base = 10}\n\
         function obj:add(n) return self.base + n end\n\
         return obj:add(5)",
    );
    assert_eq!(num(&out), 15.0);
}

#[test]
fn string_methods_on_literals() {
    let out = run("return ('hello'):sub(1, 1):upper()");
    assert_eq!(text(&out), "H");
}

#[test]
fn numeric_for_negative_step() {
    let lines = run_with_output("for i = 3, 1, -1 do print(i) end");
    assert_eq!(lines, vec!["3", "2", "1"]);
}

#[test]
fn repeat_condition_sees_body_locals() {
    let out = run(
        "local total = 0\n\
         local i = 0\n\
         repeat\n\
           i = i + 1\n\
           local done = i >= 3\n\
           total = total + i\n\
         until done\n\
         return total",
    );
    assert_eq!(num(&out), 6.0);
}

#[test]
fn while_with_break() {
    let out = run(
        "local n = 0\n\
         while true do\n\
           n = n + 1\n\
           if n == 7 then break end\n\
         end\n\
         return n",
    );
    assert_eq!(num(&out), 7.0);
}

#[test]
fn string_arithmetic_coercion() {
    let out = run("return '10' + 5");
    assert_eq!(num(&out), 15.0);
}

#[test]
fn arithmetic_operator_set() {
    let out = run_values("return 7 // 2, 7 % 3, -7 % 3, 2 ^ 10, 7 / 2");
    assert_eq!(num(&out[0]), 3.0);
    assert_eq!(num(&out[1]), 1.0);
    assert_eq!(num(&out[2]), 2.0);
    assert_eq!(num(&out[3]), 1024.0);
    assert_eq!(num(&out[4]), 3.5);
}

#[test]
fn bitwise_operator_set() {
    let out = run_values("return 0xF0 & 0x3C, 0xF0 | 0x0F, 5 ~ 3, 1 << 4, 256 >> 4, ~0");
    assert_eq!(num(&out[0]), 0x30 as f64);
    assert_eq!(num(&out[1]), 0xFF as f64);
    assert_eq!(num(&out[2]), 6.0);
    assert_eq!(num(&out[3]), 16.0);
    assert_eq!(num(&out[4]), 16.0);
    assert_eq!(num(&out[5]), -1.0);
}

#[test]
fn logical_operators_return_operands() {
    let out = run_values("return nil or 'fallback', false and error('never'), 1 and 2");
    assert_eq!(text(&out[0]), "fallback");
    assert_eq!(out[1], LuaValue::Boolean(false));
    assert_eq!(num(&out[2]), 2.0);
}

#[test]
fn generic_for_over_ipairs() {
    let lines = run_with_output(
        "local t = {'a', 'b', 'c'}\n\
         for i, v in ipairs(t) do print(i, v) end",
    );
    assert_eq!(lines, vec!["1\ta", "2\tb", "3\tc"]);
}

#[test]
fn pairs_order_follows_physical_layout() {
    let lines = run_with_output(
        "local t = {10, 20}\n\
         t.z = 'first'\n\
         t.a = 'second'\n\
         for k, v in pairs(t) do print(k, v) end",
    );
    assert_eq!(
        lines,
        vec!["1\t10", "2\t20", "z\tfirst", "a\tsecond"]
    );
}

#[test]
fn goto_backward_loops() {
    let out = run(
        "local n = 0\n\
         ::again::\n\
         n = n + 1\n\
         if n < 5 then goto again end\n\
         return n",
    );
    assert_eq!(num(&out), 5.0);
}

#[test]
fn goto_into_local_scope_is_a_parse_error() {
    let env = Env::new(Config::default());
    let err = env
        .parse("goto skip\nlocal x = 1\n::skip::\nx = 2")
        .unwrap_err();
    assert!(err.message().contains("jumps into the scope"));
}

#[test]
fn chunk_returns_first_value() {
    let env = Env::new(Config::default());
    let v = env.parse("return 1, 2, 3").unwrap().exec().unwrap();
    assert_eq!(num(&v), 1.0);
}

#[test]
fn chunk_without_return_yields_nil() {
    assert_eq!(run("local x = 1"), LuaValue::Nil);
}

// ---------------------------------------------------------------------
// Metatable engine

#[test]
fn index_function_and_table_chain() {
    let out = run_values(
        "local base = {greeting = 'hi'}\n\
         local mid = setmetatable({}, {__index = base})\n\
         local top = setmetatable({}, {__index = mid})\n\
         local computed = setmetatable({}, {__index = function(t, k) return k .. '!' end})\n\
         return top.greeting, computed.boom",
    );
    assert_eq!(text(&out[0]), "hi");
    assert_eq!(text(&out[1]), "boom!");
}

#[test]
fn newindex_redirects_fresh_keys_only() {
    let out = run_values(
        "local log = {}\n\
         local t = setmetatable({present = 1}, {\n\
           __newindex = function(t, k, v) rawset(log, k, v) end,\n\
         })\n\
         t.present = 2\n\
         t.fresh = 3\n\
         return t.present, rawget(t, 'fresh'), log.fresh",
    );
    assert_eq!(num(&out[0]), 2.0);
    assert_eq!(out[1], LuaValue::Nil);
    assert_eq!(num(&out[2]), 3.0);
}

#[test]
fn call_metamethod() {
    let out = run(
        "local t = setmetatable({}, {__call = function(self, a, b) return a * b end})\n\
         return t(6, 7)",
    );
    assert_eq!(num(&out), 42.0);
}

#[test]
fn tostring_metamethod_drives_print() {
    let lines = run_with_output(
        "local t = setmetatable({}, {__tostring = function() return 'custom' end})\n\
         print(t)",
    );
    assert_eq!(lines, vec!["custom"]);
}

#[test]
fn eq_requires_shared_metatable() {
    let out = run_values(
        "local mt = {__eq = function() return true end}\n\
         local other = {__eq = function() return true end}\n\
         local a = setmetatable({}, mt)\n\
         local b = setmetatable({}, mt)\n\
         local c = setmetatable({}, other)\n\
         return a == b, a == c",
    );
    assert_eq!(out[0], LuaValue::Boolean(true));
    assert_eq!(out[1], LuaValue::Boolean(false));
}

#[test]
fn comparison_metamethods() {
    let out = run_values(
        "local mt = {__lt = function(a, b) return a.v < b.v end,\n\
                     __le = function(a, b) return a.v <= b.v end}\n\
         local a = setmetatable({v = 1}, mt)\n\
         local b = setmetatable({v = 2}, mt)\n\
         return a < b, b <= a, a > b",
    );
    assert_eq!(out[0], LuaValue::Boolean(true));
    assert_eq!(out[1], LuaValue::Boolean(false));
    assert_eq!(out[2], LuaValue::Boolean(false));
}

#[test]
fn len_and_concat_metamethods() {
    let out = run_values(
        "local t = setmetatable({}, {\n\
           __len = function() return 99 end,\n\
           __concat = function(a, b) return 'joined' end,\n\
         })\n\
         return #t, t .. 'x', 'x' .. t",
    );
    assert_eq!(num(&out[0]), 99.0);
    assert_eq!(text(&out[1]), "joined");
    assert_eq!(text(&out[2]), "joined");
}

#[test]
fn global_reads_through_index_on_g() {
    let out = run(
        "setmetatable(_G, {__index = function(t, k) return 'default:' .. k end})\n\
         return missing_global",
    );
    assert_eq!(text(&out), "default:missing_global");
}

// ---------------------------------------------------------------------
// Embedding surface

#[test]
fn load_lib_exposes_host_functions() {
    use moonlet::value::LuaValue as V;
    let env = Env::new(Config::default());
    let lib = std::rc::Rc::new(std::cell::RefCell::new(moonlet::table::Table::new()));
    lib.borrow_mut().raw_set_str(
        "double",
        V::native("double", |_env, args| {
            let n = match args.first() {
                Some(V::Number(n)) => *n,
                _ => 0.0,
            };
            Ok(vec![V::Number(n * 2.0)])
        }),
    );
    env.load_lib("host", lib);
    let v = env.parse("return host.double(21)").unwrap().exec().unwrap();
    assert_eq!(num(&v), 42.0);
}

#[test]
fn extend_lib_merges_and_falls_back() {
    let env = Env::new(Config::default());
    let extra = std::rc::Rc::new(std::cell::RefCell::new(moonlet::table::Table::new()));
    extra
        .borrow_mut()
        .raw_set_str("tau", LuaValue::Number(std::f64::consts::TAU));
    env.extend_lib("math", extra);
    let v = env
        .parse("return math.tau == 2 * math.pi")
        .unwrap()
        .exec()
        .unwrap();
    assert_eq!(v, LuaValue::Boolean(true));

    let fresh = std::rc::Rc::new(std::cell::RefCell::new(moonlet::table::Table::new()));
    fresh.borrow_mut().raw_set_str("x", LuaValue::Number(1.0));
    env.extend_lib("brandnew", fresh);
    let v = env.parse("return brandnew.x").unwrap().exec().unwrap();
    assert_eq!(num(&v), 1.0);
}

#[test]
fn parse_file_goes_through_the_loader() {
    let env = Env::new(Config {
        load_file: Some(Box::new(|path| {
            if path == "answer.lua" {
                Ok("return 42".to_string())
            } else {
                Err("not found".to_string())
            }
        })),
        ..Config::default()
    });
    let v = env.parse_file("answer.lua").unwrap().exec().unwrap();
    assert_eq!(num(&v), 42.0);
    assert!(env.parse_file("missing.lua").is_err());
}

#[test]
fn scripts_share_one_environment() {
    let env = Env::new(Config::default());
    env.parse("shared = 'state'").unwrap().exec().unwrap();
    let v = env.parse("return shared").unwrap().exec().unwrap();
    assert_eq!(text(&v), "state");
}
