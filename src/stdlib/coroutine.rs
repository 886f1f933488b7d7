//! The coroutine library — direct wiring to the scheduler.

use std::cell::RefCell;
use std::rc::Rc;

use super::{check_any, check_thread, module};
use crate::env::Env;
use crate::error::LuaError;
use crate::thread::{self, Thread};
use crate::value::{CallFuture, LuaValue};

pub fn register(env: &Env) {
    let lib = module(vec![
        (
            "create",
            LuaValue::native("create", |_env, args| {
                let f = check_any(&args, 0, "create")?;
                if !matches!(f, LuaValue::Function(_)) {
                    return Err(LuaError::runtime("Attempt to call non-function"));
                }
                Ok(vec![LuaValue::Thread(Rc::new(RefCell::new(Thread::new(
                    f,
                ))))])
            }),
        ),
        (
            "resume",
            LuaValue::native("resume", |env, mut args| {
                let t = check_thread(&args, 0, "resume")?;
                let rest = args.split_off(1);
                thread::resume(&env, &t, rest)
            }),
        ),
        (
            "yield",
            LuaValue::native_async("yield", |env: Env, args: Vec<LuaValue>| -> CallFuture {
                Box::pin(async move { thread::yield_values(&env, args).await })
            }),
        ),
        (
            "status",
            LuaValue::native("status", |_env, args| {
                let t = check_thread(&args, 0, "status")?;
                let status = t.borrow().status;
                Ok(vec![LuaValue::str(status.as_str())])
            }),
        ),
        (
            "wrap",
            LuaValue::native("wrap", |_env, args| {
                let f = check_any(&args, 0, "wrap")?;
                if !matches!(f, LuaValue::Function(_)) {
                    return Err(LuaError::runtime("Attempt to call non-function"));
                }
                let t = Rc::new(RefCell::new(Thread::new(f)));
                Ok(vec![LuaValue::native_async(
                    "wrap.call",
                    move |env: Env, args: Vec<LuaValue>| -> CallFuture {
                        let t = t.clone();
                        Box::pin(async move { thread::resume_unwrap(&env, &t, args) })
                    },
                )])
            }),
        ),
        (
            "running",
            LuaValue::native("running", |env, _args| {
                let current = env.scheduler().current();
                let is_main = env.scheduler().is_main(&current);
                Ok(vec![LuaValue::Thread(current), LuaValue::Boolean(is_main)])
            }),
        ),
    ]);
    env.load_lib("coroutine", lib);
}
