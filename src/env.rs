//! The embedding surface: configuration, the environment, and script
//! handles.
//!
//! An [`Env`] owns the globals table, the root scope, the per-env
//! string metatable, the coroutine scheduler, and the deterministic
//! RNG state. All I/O goes through the configuration collaborators;
//! the core holds no file descriptors of its own.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::debug;

use crate::analysis::{analyze, Analysis};
use crate::ast::Block;
use crate::error::{LuaError, LuaResult};
use crate::exec::{run_blocking, Executor, Flow};
use crate::parser::parse_chunk;
use crate::scope::Scope;
use crate::stdlib;
use crate::table::Table;
use crate::thread::Scheduler;
use crate::value::{LuaValue, TableRef};

pub type FileExistsFn = Box<dyn Fn(&str) -> bool>;
pub type LoadFileFn = Box<dyn Fn(&str) -> Result<String, String>>;
pub type StdoutFn = Box<dyn FnMut(&str)>;
pub type OsExitFn = Box<dyn Fn(i32)>;

/// Host-injectable collaborators and options.
pub struct Config {
    /// Initial `package.path`.
    pub lua_path: String,
    /// Reserved input text for embedders.
    pub stdin: String,
    pub file_exists: Option<FileExistsFn>,
    pub load_file: Option<LoadFileFn>,
    /// Receives one line per `print` call, without a trailing newline.
    pub stdout: Option<StdoutFn>,
    pub os_exit: Option<OsExitFn>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            lua_path: "./?.lua".to_string(),
            stdin: String::new(),
            file_exists: None,
            load_file: None,
            stdout: None,
            os_exit: None,
        }
    }
}

const DEFAULT_RNG_SEED: i64 = 42;

struct EnvInner {
    globals: TableRef,
    global_scope: Rc<Scope>,
    string_meta: TableRef,
    scheduler: Scheduler,
    stdout: RefCell<StdoutFn>,
    file_exists: Option<FileExistsFn>,
    load_file: Option<LoadFileFn>,
    os_exit: Option<OsExitFn>,
    stdin: String,
    lua_path: String,
    rng: Cell<i64>,
}

/// A Lua environment. Cheap to clone; never `Send`.
#[derive(Clone)]
pub struct Env {
    inner: Rc<EnvInner>,
}

impl Env {
    pub fn new(config: Config) -> Env {
        let globals = Rc::new(RefCell::new(Table::new()));
        let global_scope = Scope::root(globals.clone());
        let string_meta = Rc::new(RefCell::new(Table::new()));
        let stdout: StdoutFn = config
            .stdout
            .unwrap_or_else(|| Box::new(|line| println!("{}", line)));
        let env = Env {
            inner: Rc::new(EnvInner {
                globals,
                global_scope,
                string_meta,
                scheduler: Scheduler::new(),
                stdout: RefCell::new(stdout),
                file_exists: config.file_exists,
                load_file: config.load_file,
                os_exit: config.os_exit,
                stdin: config.stdin,
                lua_path: config.lua_path,
                rng: Cell::new(DEFAULT_RNG_SEED),
            }),
        };
        stdlib::register(&env);
        debug!(lua_path = %env.inner.lua_path, "environment created");
        env
    }

    pub fn globals(&self) -> TableRef {
        self.inner.globals.clone()
    }

    pub fn global_scope(&self) -> Rc<Scope> {
        self.inner.global_scope.clone()
    }

    pub fn string_metatable(&self) -> TableRef {
        self.inner.string_meta.clone()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn stdin(&self) -> &str {
        &self.inner.stdin
    }

    pub fn initial_lua_path(&self) -> &str {
        &self.inner.lua_path
    }

    pub fn write_stdout(&self, line: &str) {
        (self.inner.stdout.borrow_mut())(line);
    }

    pub fn file_exists(&self, path: &str) -> bool {
        match &self.inner.file_exists {
            Some(f) => f(path),
            None => false,
        }
    }

    pub fn load_file(&self, path: &str) -> LuaResult<String> {
        match &self.inner.load_file {
            Some(f) => f(path).map_err(|reason| {
                LuaError::runtime(format!("cannot open {} ({})", path, reason))
            }),
            None => Err(LuaError::runtime(format!(
                "cannot open {} (no file loader configured)",
                path
            ))),
        }
    }

    pub fn os_exit(&self, code: i32) -> LuaResult<()> {
        match &self.inner.os_exit {
            Some(f) => {
                f(code);
                Ok(())
            }
            None => Err(LuaError::runtime(
                "os.exit is not available in this environment",
            )),
        }
    }

    /// One step of the deterministic LCG; result in [0, 1).
    pub fn next_random(&self) -> f64 {
        let seed = (self.inner.rng.get().wrapping_mul(16807)) % 2_147_483_647;
        let seed = if seed <= 0 { seed + 2_147_483_646 } else { seed };
        self.inner.rng.set(seed);
        (seed - 1) as f64 / 2_147_483_646.0
    }

    pub fn set_random_seed(&self, seed: f64) {
        let s = if seed.is_finite() {
            (seed.abs() as i64) % 2_147_483_645 + 1
        } else {
            DEFAULT_RNG_SEED
        };
        self.inner.rng.set(s);
    }

    /// Compile a source chunk against this environment.
    pub fn parse(&self, source: &str) -> LuaResult<Script> {
        let block = parse_chunk(source)?;
        let analysis = Rc::new(analyze(&block)?);
        debug!(bytes = source.len(), "chunk compiled");
        Ok(Script {
            env: self.clone(),
            block,
            analysis,
        })
    }

    /// Compile a chunk loaded through the `load_file` collaborator.
    pub fn parse_file(&self, path: &str) -> LuaResult<Script> {
        let source = self.load_file(path)?;
        self.parse(&source)
    }

    /// Register `table` as the global `name`.
    pub fn load_lib(&self, name: &str, table: TableRef) {
        debug!(name, "library registered");
        self.inner
            .globals
            .borrow_mut()
            .raw_set_str(name, LuaValue::Table(table));
    }

    /// Merge `table` into the existing global `name`, or register it.
    pub fn extend_lib(&self, name: &str, table: TableRef) {
        let existing = self.inner.globals.borrow().raw_get_str(name);
        match existing {
            LuaValue::Table(dst) => {
                let mut key = LuaValue::Nil;
                loop {
                    let entry = table.borrow().next_entry(&key);
                    match entry {
                        Ok(Some((k, v))) => {
                            // Keys come from a live table; never nil.
                            let _ = dst.borrow_mut().raw_set(k.clone(), v);
                            key = k;
                        }
                        _ => break,
                    }
                }
            }
            _ => self.load_lib(name, table),
        }
    }

    /// Read a global back out (embedder convenience).
    pub fn global(&self, name: &str) -> LuaValue {
        self.inner.globals.borrow().raw_get_str(name)
    }

    /// Run an already-compiled chunk with the given varargs.
    pub(crate) fn run_chunk(
        &self,
        block: &Rc<Block>,
        analysis: &Rc<Analysis>,
        args: Vec<LuaValue>,
    ) -> LuaResult<Vec<LuaValue>> {
        let ex = Executor::new(self.clone(), analysis.clone());
        let chunk_scope = Scope::child(&self.global_scope());
        chunk_scope.set_varargs(args);
        let fut = ex.exec_block(chunk_scope, block.clone());
        match run_blocking(fut)? {
            Flow::Return(values) => Ok(values),
            _ => Ok(Vec::new()),
        }
    }
}

/// A compiled chunk bound to its environment.
pub struct Script {
    env: Env,
    block: Rc<Block>,
    analysis: Rc<Analysis>,
}

impl std::fmt::Debug for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Script").finish_non_exhaustive()
    }
}

impl Script {
    /// Execute and return the first value of the chunk's return
    /// sequence, or nil.
    pub fn exec(&self) -> LuaResult<LuaValue> {
        let mut values = self.exec_values()?;
        Ok(if values.is_empty() {
            LuaValue::Nil
        } else {
            values.swap_remove(0)
        })
    }

    /// Execute and return the whole return sequence.
    pub fn exec_values(&self) -> LuaResult<Vec<LuaValue>> {
        self.env.run_chunk(&self.block, &self.analysis, Vec::new())
    }

    /// Execute with explicit chunk varargs (module loaders pass the
    /// module name and the resolved path).
    pub fn run_with_args(&self, args: Vec<LuaValue>) -> LuaResult<Vec<LuaValue>> {
        self.env.run_chunk(&self.block, &self.analysis, args)
    }
}
