//! Library behavior: string/table/math/os/package entry points and the
//! quantified properties they must uphold.

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

fn truthy(v: &LuaValue) -> bool {
    v.truthy()
}

// ---------------------------------------------------------------------
// string

#[test]
fn sub_follows_index_rules() {
    let out = run_values(
        "return ('hello'):sub(2, 4), ('hello'):sub(-3), ('hello'):sub(4, 2), ('hello'):sub(1, 99)",
    );
    assert_eq!(text(&out[0]), "ell");
    assert_eq!(text(&out[1]), "llo");
    assert_eq!(text(&out[2]), "");
    assert_eq!(text(&out[3]), "hello");
}

#[test]
fn sub_length_matches_clamped_window() {
    // #s:sub(i, j) == max(0, min(j, #s) - max(i, 1) + 1)
    let cases = [(1i64, 3i64), (2, 9), (-4, -2), (0, 2), (5, 5), (6, 9)];
    for (i, j) in cases {
        let src = format!("local s = 'world' return #s:sub({}, {})", i, j);
        let got = num(&run(&src));
        let len = 5i64;
        let ai = if i < 0 { (len + i + 1).max(0) } else { i };
        let aj = if j < 0 { len + j + 1 } else { j };
        let expect = (aj.min(len) - ai.max(1) + 1).max(0);
        assert_eq!(got, expect as f64, "sub({}, {})", i, j);
    }
}

#[test]
fn find_with_captures_and_plain_mode() {
    let out = run_values("return string.find('key=value', '(%w+)=(%w+)')");
    assert_eq!(num(&out[0]), 1.0);
    assert_eq!(num(&out[1]), 9.0);
    assert_eq!(text(&out[2]), "key");
    assert_eq!(text(&out[3]), "value");

    let out = run_values("return string.find('a.b.c', '.', 1, true)");
    assert_eq!(num(&out[0]), 2.0);
    assert_eq!(num(&out[1]), 2.0);

    let out = run_values("return string.find('abc', 'x')");
    assert_eq!(out[0], LuaValue::Nil);
}

#[test]
fn match_returns_captures_or_whole() {
    let out = run_values("return string.match('hello world', '%w+')");
    assert_eq!(text(&out[0]), "hello");
    let out = run_values("return string.match('2026-08-01', '(%d+)-(%d+)-(%d+)')");
    assert_eq!(text(&out[0]), "2026");
    assert_eq!(text(&out[2]), "01");
}

#[test]
fn gmatch_streams_matches() {
    let out = run(
        "local words = {}\n\
         for w in string.gmatch('one two three', '%a+') do\n\
           words[#words + 1] = w\n\
         end\n\
         return table.concat(words, ',')",
    );
    assert_eq!(text(&out), "one,two,three");
}

#[test]
fn gmatch_key_value_pairs() {
    let out = run(
        "local t = {}\n\
         for k, v in string.gmatch('a=1, b=2', '(%w+)=(%w+)') do t[k] = v end\n\
         return t.a .. '/' .. t.b",
    );
    assert_eq!(text(&out), "1/2");
}

#[test]
fn gsub_with_function_table_and_limit() {
    let out = run_values(
        "local up = string.gsub('abc', '%a', function(c) return c:upper() end)\n\
         local mapped = string.gsub('ab', '%a', {a = 'X'})\n\
         local limited = string.gsub('aaa', 'a', 'b', 2)\n\
         return up, mapped, limited",
    );
    assert_eq!(text(&out[0]), "ABC");
    assert_eq!(text(&out[1]), "Xb");
    assert_eq!(text(&out[2]), "bba");
}

#[test]
fn gsub_capture_references() {
    let out = run_values("return string.gsub('hello world', '(%w+)', '<%1>')");
    assert_eq!(text(&out[0]), "<hello> <world>");
    assert_eq!(num(&out[1]), 2.0);
}

#[test]
fn format_conversions() {
    let out = run_values(
        "return string.format('%d|%5d|%-5d|%05d', 42, 42, 42, 42),\n\
                string.format('%.2f', 3.14159),\n\
                string.format('%x %X', 255, 255),\n\
                string.format('%e', 150),\n\
                string.format('%g', 0.00001),\n\
                string.format('%s=%s', 'k', 10),\n\
                string.format('%c%c', 72, 105),\n\
                string.format('%%')",
    );
    assert_eq!(text(&out[0]), "42|   42|42   |00042");
    assert_eq!(text(&out[1]), "3.14");
    assert_eq!(text(&out[2]), "ff FF");
    assert_eq!(text(&out[3]), "1.500000e+02");
    assert_eq!(text(&out[4]), "1e-05");
    assert_eq!(text(&out[5]), "k=10");
    assert_eq!(text(&out[6]), "Hi");
    assert_eq!(text(&out[7]), "%");
}

#[test]
fn format_copies_non_ascii_literal_text_verbatim() {
    let out = run("return string.format('café %d°', 1)");
    assert_eq!(text(&out), "café 1°");
}

#[test]
fn format_q_escapes_quotes_and_newlines_only() {
    let out = run(r#"return string.format('%q', 'say "hi"\nbye')"#);
    assert_eq!(text(&out), "\"say \\\"hi\\\"\\nbye\"");
}

#[test]
fn byte_char_rep_reverse() {
    let out = run_values(
        "return string.byte('A'), string.char(76, 117, 97), ('ab'):rep(3), ('ab'):rep(2, '-'), ('abc'):reverse()",
    );
    assert_eq!(num(&out[0]), 65.0);
    assert_eq!(text(&out[1]), "Lua");
    assert_eq!(text(&out[2]), "ababab");
    assert_eq!(text(&out[3]), "ab-ab");
    assert_eq!(text(&out[4]), "cba");
}

// ---------------------------------------------------------------------
// table

#[test]
fn border_and_concat_agree_on_sequences() {
    let out = run_values(
        "local t = {1, 2, 3, 4}\n\
         return #t, table.concat(t, '+')",
    );
    assert_eq!(num(&out[0]), 4.0);
    assert_eq!(text(&out[1]), "1+2+3+4");
}

#[test]
fn remove_on_empty_table_returns_nil() {
    let out = run_values("local t = {}\nreturn table.remove(t, 1), #t");
    assert_eq!(out[0], LuaValue::Nil);
    assert_eq!(num(&out[1]), 0.0);
}

#[test]
fn insert_and_remove_shift() {
    let out = run_values(
        "local t = {'a', 'b', 'c'}\n\
         table.insert(t, 1, 'z')\n\
         local gone = table.remove(t, 2)\n\
         return gone, table.concat(t, ''), #t",
    );
    assert_eq!(text(&out[0]), "a");
    assert_eq!(text(&out[1]), "zbc");
    assert_eq!(num(&out[2]), 3.0);
}

#[test]
fn sort_default_and_comparator() {
    let out = run_values(
        "local t = {5, 2, 8, 1}\n\
         table.sort(t)\n\
         local asc = table.concat(t, ',')\n\
         table.sort(t, function(a, b) return a > b end)\n\
         return asc, table.concat(t, ',')",
    );
    assert_eq!(text(&out[0]), "1,2,5,8");
    assert_eq!(text(&out[1]), "8,5,2,1");
}

#[test]
fn sort_is_idempotent() {
    let out = run_values(
        "local t = {3, 1, 2, 1, 3}\n\
         table.sort(t)\n\
         local once = table.concat(t, ',')\n\
         table.sort(t)\n\
         return once, table.concat(t, ',')",
    );
    assert_eq!(text(&out[0]), text(&out[1]));
}

#[test]
fn pack_and_unpack() {
    let out = run_values(
        "local p = table.pack(10, 20, 30)\n\
         return p.n, table.unpack(p, 1, p.n)",
    );
    assert_eq!(num(&out[0]), 3.0);
    assert_eq!(num(&out[1]), 10.0);
    assert_eq!(num(&out[3]), 30.0);
}

// ---------------------------------------------------------------------
// math

#[test]
fn random_ranges() {
    let env = Env::new(Config::default());
    let out = env
        .parse(
            "for _ = 1, 100 do\n\
               local r = math.random()\n\
               assert(r >= 0 and r < 1)\n\
               local m = math.random(6)\n\
               assert(m >= 1 and m <= 6 and m == math.floor(m))\n\
               local mn = math.random(10, 20)\n\
               assert(mn >= 10 and mn <= 20)\n\
             end\n\
             return true",
        )
        .unwrap()
        .exec()
        .unwrap();
    assert!(truthy(&out));
}

#[test]
fn random_empty_interval_raises() {
    let out = run_values("return pcall(math.random, 5, 2)");
    assert_eq!(out[0], LuaValue::Boolean(false));
}

#[test]
fn randomseed_reproduces_sequences() {
    let out = run_values(
        "math.randomseed(99)\n\
         local a, b = math.random(1000), math.random(1000)\n\
         math.randomseed(99)\n\
         local c, d = math.random(1000), math.random(1000)\n\
         return a == c, b == d",
    );
    assert_eq!(out[0], LuaValue::Boolean(true));
    assert_eq!(out[1], LuaValue::Boolean(true));
}

#[test]
fn math_core_functions() {
    let out = run_values(
        "return math.floor(3.7), math.ceil(3.2), math.abs(-5), math.max(1, 9, 4), math.min(1, 9, 4), math.fmod(7, 3)",
    );
    assert_eq!(num(&out[0]), 3.0);
    assert_eq!(num(&out[1]), 4.0);
    assert_eq!(num(&out[2]), 5.0);
    assert_eq!(num(&out[3]), 9.0);
    assert_eq!(num(&out[4]), 1.0);
    assert_eq!(num(&out[5]), 1.0);
}

#[test]
fn math_type_and_tointeger() {
    let out = run_values(
        "return math.type(3), math.type(3.5), math.type('x'), math.tointeger(7.0), math.tointeger(7.5)",
    );
    assert_eq!(text(&out[0]), "integer");
    assert_eq!(text(&out[1]), "float");
    assert_eq!(out[2], LuaValue::Nil);
    assert_eq!(num(&out[3]), 7.0);
    assert_eq!(out[4], LuaValue::Nil);
}

// ---------------------------------------------------------------------
// base

#[test]
fn tostring_tonumber_round_trip() {
    let out = run(
        "local values = {0, 1, -1, 42, 0.5, -3.25, 1e10, 123456789}\n\
         for _, v in ipairs(values) do\n\
           assert(tostring(tonumber(tostring(v))) == tostring(v))\n\
         end\n\
         return true",
    );
    assert!(truthy(&out));
}

#[test]
fn rawequal_identity_semantics() {
    let out = run_values(
        "local t = {}\n\
         local u = {}\n\
         return rawequal(t, t), rawequal(t, u), rawequal('a', 'a'), rawequal(0/0, 0/0), rawequal(1, 1.0)",
    );
    assert_eq!(out[0], LuaValue::Boolean(true));
    assert_eq!(out[1], LuaValue::Boolean(false));
    assert_eq!(out[2], LuaValue::Boolean(true));
    assert_eq!(out[3], LuaValue::Boolean(false));
    assert_eq!(out[4], LuaValue::Boolean(true));
}

#[test]
fn protected_metatable() {
    let out = run_values(
        "local t = setmetatable({}, {__metatable = 'locked'})\n\
         local mt = getmetatable(t)\n\
         local ok, err = pcall(setmetatable, t, {})\n\
         return mt, ok, err",
    );
    assert_eq!(text(&out[0]), "locked");
    assert_eq!(out[1], LuaValue::Boolean(false));
    assert!(text(&out[2]).contains("protected metatable"));
}

#[test]
fn select_forms() {
    let out = run_values("return select('#', 'a', 'b', 'c'), select(2, 'a', 'b', 'c')");
    assert_eq!(num(&out[0]), 3.0);
    assert_eq!(text(&out[1]), "b");
    assert_eq!(text(&out[2]), "c");
}

#[test]
fn next_walks_and_terminates() {
    let out = run(
        "local t = {10, 20}\n\
         local count = 0\n\
         local k, v = next(t)\n\
         while k do\n\
           count = count + 1\n\
           k, v = next(t, k)\n\
         end\n\
         return count",
    );
    assert_eq!(num(&out), 2.0);
}

#[test]
fn collectgarbage_is_a_noop() {
    assert_eq!(num(&run("return collectgarbage('collect')")), 0.0);
}

#[test]
fn version_string() {
    assert_eq!(text(&run("return _VERSION")), "Lua 5.3");
}

// ---------------------------------------------------------------------
// os

#[test]
fn os_time_returns_epoch_seconds() {
    let v = run("return os.time()");
    let now = num(&v);
    assert!(now > 1_700_000_000.0, "implausible epoch time {}", now);
}

#[test]
fn os_date_table_fields_utc() {
    // 2009-02-13 23:31:30 UTC, a Friday.
    let out = run_values(
        "local d = os.date('!*t', 1234567890)\n\
         return d.year, d.month, d.day, d.hour, d.min, d.sec, d.wday, d.yday, d.isdst",
    );
    assert_eq!(num(&out[0]), 2009.0);
    assert_eq!(num(&out[1]), 2.0);
    assert_eq!(num(&out[2]), 13.0);
    assert_eq!(num(&out[3]), 23.0);
    assert_eq!(num(&out[4]), 31.0);
    assert_eq!(num(&out[5]), 30.0);
    assert_eq!(num(&out[6]), 6.0);
    assert_eq!(num(&out[7]), 44.0);
    assert_eq!(out[8], LuaValue::Boolean(false));
}

#[test]
fn os_date_utc_formatting() {
    let out = run("return os.date('!%Y-%m-%d %H:%M:%S', 1234567890)");
    assert_eq!(text(&out), "2009-02-13 23:31:30");
}

#[test]
fn os_date_local_formats_without_error() {
    let out = run("return os.date('%c')");
    assert!(!text(&out).is_empty());
}

#[test]
fn os_time_date_round_trip() {
    let out = run("return os.time(os.date('*t', 1234567890))");
    assert_eq!(num(&out), 1_234_567_890.0);
}

#[test]
fn os_difftime() {
    assert_eq!(num(&run("return os.difftime(100, 40)")), 60.0);
}

#[test]
fn os_exit_maps_booleans() {
    let exit_code = std::rc::Rc::new(std::cell::Cell::new(-1));
    let seen = exit_code.clone();
    let env = Env::new(Config {
        os_exit: Some(Box::new(move |code| seen.set(code))),
        ..Config::default()
    });
    env.parse("os.exit(false)").unwrap().exec().unwrap();
    assert_eq!(exit_code.get(), 1);
    env.parse("os.exit(true)").unwrap().exec().unwrap();
    assert_eq!(exit_code.get(), 0);
    env.parse("os.exit(3)").unwrap().exec().unwrap();
    assert_eq!(exit_code.get(), 3);
}

#[test]
fn os_exit_without_collaborator_raises() {
    let env = Env::new(Config::default());
    assert!(env.parse("os.exit(0)").unwrap().exec().is_err());
}

// ---------------------------------------------------------------------
// package / require

#[test]
fn require_uses_preload_first() {
    let out = run(
        "package.preload['greeting'] = function()\n\
           return {word = 'hello'}\n\
         end\n\
         local m = require('greeting')\n\
         return m.word",
    );
    assert_eq!(text(&out), "hello");
}

#[test]
fn require_caches_modules() {
    let out = run(
        "local count = 0\n\
         package.preload['counted'] = function()\n\
           count = count + 1\n\
           return {}\n\
         end\n\
         local a = require('counted')\n\
         local b = require('counted')\n\
         return count, a == b",
    );
    // exec() returns the first value; both asserts ride on one chunk.
    assert_eq!(num(&out), 1.0);
}

#[test]
fn require_searches_the_path_templates() {
    let env = Env::new(Config {
        lua_path: "lib/?.lua;./?.lua".to_string(),
        file_exists: Some(Box::new(|p| p == "lib/util/strings.lua")),
        load_file: Some(Box::new(|p| {
            if p == "lib/util/strings.lua" {
                Ok("local mod = {}\nfunction mod.shout(s) return s:upper() end\nreturn mod".into())
            } else {
                Err("missing".into())
            }
        })),
        ..Config::default()
    });
    let v = env
        .parse("local m = require('util.strings')\nreturn m.shout('quiet')")
        .unwrap()
        .exec()
        .unwrap();
    assert_eq!(text(&v), "QUIET");
}

#[test]
fn require_missing_module_lists_attempts() {
    let env = Env::new(Config::default());
    let err = env
        .parse("require('no.such.module')")
        .unwrap()
        .exec()
        .unwrap_err();
    let msg = err.message();
    assert!(msg.contains("Module 'no.such.module' not found!"), "{}", msg);
    assert!(msg.contains("no field package.preload"), "{}", msg);
}

#[test]
fn module_returning_nil_is_recorded_as_true() {
    let out = run(
        "package.preload['sideeffect'] = function() end\n\
         local v = require('sideeffect')\n\
         return v",
    );
    assert_eq!(out, LuaValue::Boolean(true));
}
