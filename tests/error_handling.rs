//! The error taxonomy: message shapes, pcall/xpcall propagation, and
//! front-end rejection.

use moonlet::{Config, Env, LuaError, LuaValue};

fn env() -> Env {
    Env::new(Config::default())
}

fn run_values(src: &str) -> Vec<LuaValue> {
    env()
        .parse(src)
        .expect("parse failed")
        .exec_values()
        .expect("exec failed")
}

fn exec_err(src: &str) -> String {
    env()
        .parse(src)
        .expect("parse failed")
        .exec()
        .expect_err("expected a runtime error")
        .message()
}

fn text(v: &LuaValue) -> String {
    match v {
        LuaValue::Str(s) => s.to_string(),
        other => panic!("expected string, got {:?}", other),
    }
}

#[test]
fn arithmetic_on_nil() {
    assert_eq!(
        exec_err("return nil + 1"),
        "attempt to perform arithmetic on a nil value"
    );
}

#[test]
fn arithmetic_on_boolean_is_not_coerced() {
    assert_eq!(
        exec_err("return true + 1"),
        "attempt to perform arithmetic on a boolean value"
    );
}

#[test]
fn concatenating_a_table() {
    assert_eq!(
        exec_err("return {} .. 'x'"),
        "attempt to concatenate a table value"
    );
}

#[test]
fn table_index_is_nil() {
    assert_eq!(exec_err("local t = {} t[nil] = 1"), "table index is nil");
    assert_eq!(exec_err("local t = {} t[0/0] = 1"), "table index is NaN");
}

#[test]
fn indexing_uncallable_values() {
    assert_eq!(exec_err("return (nil).x"), "attempt to index a nil value");
    assert_eq!(exec_err("local n = 5 return n.x"), "attempt to index a number value");
}

#[test]
fn calling_an_uncallable_value() {
    assert_eq!(
        exec_err("local x = 5 return x()"),
        "attempt to call an uncallable type"
    );
}

#[test]
fn length_of_unsupported_value() {
    assert_eq!(
        exec_err("return #true"),
        "attempt to get length of an unsupported value"
    );
}

#[test]
fn comparing_mixed_kinds() {
    assert_eq!(exec_err("return 1 < 'a'"), "attempt to compare number with string");
}

#[test]
fn bad_argument_reporting() {
    assert_eq!(
        exec_err("return string.rep('a', {})"),
        "bad argument #2 to 'rep' (number expected, got table)"
    );
}

#[test]
fn for_step_zero() {
    assert_eq!(exec_err("for i = 1, 5, 0 do end"), "'for' step is zero");
}

#[test]
fn pcall_catches_and_reports() {
    let out = run_values("return pcall(function() error('kaput') end)");
    assert_eq!(out[0], LuaValue::Boolean(false));
    assert!(text(&out[1]).contains("kaput"));
}

#[test]
fn pcall_success_passes_values_through() {
    let out = run_values("return pcall(function() return 1, 2 end)");
    assert_eq!(out[0], LuaValue::Boolean(true));
    assert_eq!(out.len(), 3);
}

#[test]
fn nested_pcall_scopes_errors() {
    let out = run_values(
        "local ok_inner = pcall(error, 'inner')\n\
         local ok_outer, err = pcall(function()\n\
           pcall(error, 'swallowed')\n\
           error('escapes')\n\
         end)\n\
         return ok_inner, ok_outer, err",
    );
    assert_eq!(out[0], LuaValue::Boolean(false));
    assert_eq!(out[1], LuaValue::Boolean(false));
    assert!(text(&out[2]).contains("escapes"));
    assert!(!text(&out[2]).contains("swallowed"));
}

#[test]
fn xpcall_routes_through_the_handler() {
    let out = run_values(
        "local ok, handled = xpcall(function() error('raw') end, function(msg)\n\
           return 'handled: ' .. msg\n\
         end)\n\
         return ok, handled",
    );
    assert_eq!(out[0], LuaValue::Boolean(false));
    assert!(text(&out[1]).starts_with("handled: "));
}

#[test]
fn error_coerces_message_to_string() {
    let out = run_values("return pcall(function() error(42) end)");
    assert_eq!(out[0], LuaValue::Boolean(false));
    assert_eq!(text(&out[1]), "42");
}

#[test]
fn assert_passes_and_fails() {
    // The non-final call truncates to one value; the last one spreads.
    let out = run_values("return assert(1, 'unused'), assert('x')");
    assert_eq!(out.len(), 2);
    assert_eq!(exec_err("assert(false)"), "assertion failed!");
    assert_eq!(exec_err("assert(nil, 'custom')"), "custom");
}

#[test]
fn errors_propagate_out_of_exec() {
    let err = env()
        .parse("local t = nil\nreturn t.field")
        .unwrap()
        .exec()
        .unwrap_err();
    assert!(matches!(err, LuaError::Runtime(_)));
}

#[test]
fn parse_errors_carry_positions() {
    let err = env().parse("local = 5").unwrap_err();
    match err {
        LuaError::Parse { line, .. } => assert_eq!(line, 1),
        other => panic!("expected parse error, got {:?}", other),
    }
    let err = env().parse("x = 1\nif then end").unwrap_err();
    match err {
        LuaError::Parse { line, .. } => assert_eq!(line, 2),
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[test]
fn unfinished_constructs_fail_to_parse() {
    for src in ["if x then", "while true do", "function f(", "return (1", "'open"] {
        assert!(env().parse(src).is_err(), "expected parse failure: {}", src);
    }
}

#[test]
fn goto_violations_are_analysis_errors() {
    assert!(env().parse("goto nowhere").is_err());
    assert!(env().parse("::dup:: ::dup::").is_err());
    assert!(env().parse("break").is_err());
}

#[test]
fn runtime_panics_never_wrap_lua_errors() {
    // A domain error must arrive as Err, not unwind.
    let result = env().parse("error('observable')").unwrap().exec();
    assert!(result.is_err());
}
