//! The package library: `require` walks `package.searchers` — preload
//! first, then `package.path` templates resolved through the
//! environment's `file_exists`/`load_file` collaborators. Loaded
//! modules are cached in `package.loaded`; a module that returns nil is
//! recorded as `true`.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use super::{check_str, module};
use crate::env::Env;
use crate::error::{LuaError, LuaResult};
use crate::exec::call_value;
use crate::table::Table;
use crate::value::{CallFuture, LuaValue, TableRef};

pub fn register(env: &Env) {
    let loaded: TableRef = Rc::new(RefCell::new(Table::new()));
    let preload: TableRef = Rc::new(RefCell::new(Table::new()));

    // The interlocking libraries registered before us.
    for name in ["string", "table", "math", "os", "coroutine"] {
        let lib = env.global(name);
        if !lib.is_nil() {
            loaded.borrow_mut().raw_set_str(name, lib);
        }
    }
    loaded
        .borrow_mut()
        .raw_set_str("_G", LuaValue::Table(env.globals()));

    let preload_searcher = {
        let preload = preload.clone();
        LuaValue::native("package.searcher.preload", move |_env, args| {
            let name = check_str(&args, 0, "require")?;
            let loader = preload.borrow().raw_get_str(&name);
            Ok(if loader.is_nil() {
                vec![LuaValue::str(format!(
                    "\n\tno field package.preload['{}']",
                    name
                ))]
            } else {
                vec![loader]
            })
        })
    };

    let pkg = module(vec![
        ("loaded", LuaValue::Table(loaded.clone())),
        ("preload", LuaValue::Table(preload)),
        ("path", LuaValue::str(env.initial_lua_path())),
    ]);

    let path_searcher = {
        let pkg = pkg.clone();
        LuaValue::native("package.searcher.path", move |env: Env, args| {
            let name = check_str(&args, 0, "require")?;
            let templates = match pkg.borrow().raw_get_str("path") {
                LuaValue::Str(s) => s.to_string(),
                _ => String::new(),
            };
            let as_path = name.replace('.', "/");
            let mut messages = String::new();
            for template in templates.split(';').filter(|t| !t.is_empty()) {
                let candidate = template.replace('?', &as_path);
                if env.file_exists(&candidate) {
                    debug!(module = %name, path = %candidate, "module resolved");
                    let loader = LuaValue::native(
                        "package.loader.file",
                        move |env: Env, args: Vec<LuaValue>| {
                            let name = check_str(&args, 0, "require")?;
                            let path = check_str(&args, 1, "require")?;
                            let source = env.load_file(&path)?;
                            let script = env.parse(&source)?;
                            let values = script.run_with_args(vec![
                                LuaValue::str(name),
                                LuaValue::str(path),
                            ])?;
                            Ok(values)
                        },
                    );
                    return Ok(vec![loader, LuaValue::str(candidate)]);
                }
                messages.push_str(&format!("\n\tno file '{}'", candidate));
            }
            Ok(vec![LuaValue::str(messages)])
        })
    };

    let searchers: TableRef = Rc::new(RefCell::new(Table::from_values(vec![
        preload_searcher,
        path_searcher,
    ])));
    pkg.borrow_mut()
        .raw_set_str("searchers", LuaValue::Table(searchers));

    let require = {
        let pkg = pkg.clone();
        LuaValue::native_async("require", move |env: Env, args: Vec<LuaValue>| -> CallFuture {
            let pkg = pkg.clone();
            Box::pin(async move { require_impl(&env, &pkg, args).await })
        })
    };
    env.globals().borrow_mut().raw_set_str("require", require);
    env.load_lib("package", pkg.clone());
    loaded
        .borrow_mut()
        .raw_set_str("package", LuaValue::Table(pkg));
}

async fn require_impl(
    env: &Env,
    pkg: &TableRef,
    args: Vec<LuaValue>,
) -> LuaResult<Vec<LuaValue>> {
    let name = check_str(&args, 0, "require")?;
    let loaded = match pkg.borrow().raw_get_str("loaded") {
        LuaValue::Table(t) => t,
        _ => return Err(LuaError::runtime("'package.loaded' is not a table")),
    };
    let cached = loaded.borrow().raw_get_str(&name);
    if !cached.is_nil() {
        return Ok(vec![cached]);
    }
    let searchers = match pkg.borrow().raw_get_str("searchers") {
        LuaValue::Table(t) => t,
        _ => return Err(LuaError::runtime("'package.searchers' is not a table")),
    };
    let mut messages = String::new();
    let mut index = 1usize;
    loop {
        let searcher = searchers.borrow().raw_get_int(index);
        if searcher.is_nil() {
            break;
        }
        index += 1;
        let mut outcome =
            call_value(env, searcher, vec![LuaValue::str(name.clone())]).await?;
        if outcome.is_empty() {
            continue;
        }
        let head = outcome.remove(0);
        match head {
            LuaValue::Function(_) | LuaValue::Thread(_) => {
                let extra = outcome.first().cloned().unwrap_or(LuaValue::Nil);
                let result = call_value(
                    env,
                    head,
                    vec![LuaValue::str(name.clone()), extra],
                )
                .await?;
                let value = result.into_iter().next().unwrap_or(LuaValue::Nil);
                let stored = if value.is_nil() {
                    LuaValue::Boolean(true)
                } else {
                    value
                };
                loaded.borrow_mut().raw_set_str(&name, stored.clone());
                return Ok(vec![stored]);
            }
            LuaValue::Str(msg) => messages.push_str(&msg),
            _ => {}
        }
    }
    Err(LuaError::runtime(format!(
        "Module '{}' not found!{}",
        name, messages
    )))
}
