//! The coroutine scheduler.
//!
//! A thread's body is the call future of its function, polled manually
//! with a no-op waker. `coroutine.yield` is a hand-written future that
//! parks the yielded values in the thread's transfer cell and returns
//! `Pending` exactly once; the next `resume` stores the injected
//! arguments in the cell and polls again. Scheduling is single-threaded
//! and cooperative; the `current` pointer is per environment and is
//! restored on every resume exit path.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures_util::task::noop_waker;

use crate::env::Env;
use crate::error::{LuaError, LuaResult};
use crate::exec::call_value;
use crate::value::{CallFuture, LuaValue, ThreadRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    Suspended,
    Running,
    Dead,
}

impl ThreadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ThreadStatus::Suspended => "suspended",
            ThreadStatus::Running => "running",
            ThreadStatus::Dead => "dead",
        }
    }
}

/// Values moving across a yield/resume boundary.
pub enum Transfer {
    Idle,
    Resumed(Vec<LuaValue>),
    Yielded(Vec<LuaValue>),
}

pub struct Thread {
    pub status: ThreadStatus,
    /// The wrapped callable, consumed by the first resume.
    func: Option<LuaValue>,
    /// The in-flight body once started.
    body: Option<CallFuture>,
    transfer: Rc<RefCell<Transfer>>,
    pub is_main: bool,
}

impl Thread {
    /// Wrap a callable without running it.
    pub fn new(func: LuaValue) -> Thread {
        Thread {
            status: ThreadStatus::Suspended,
            func: Some(func),
            body: None,
            transfer: Rc::new(RefCell::new(Transfer::Idle)),
            is_main: false,
        }
    }

    /// The main thread: perpetually running, never resumable.
    pub fn main() -> Thread {
        Thread {
            status: ThreadStatus::Running,
            func: None,
            body: None,
            transfer: Rc::new(RefCell::new(Transfer::Idle)),
            is_main: true,
        }
    }
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("status", &self.status.as_str())
            .field("is_main", &self.is_main)
            .finish()
    }
}

/// Per-environment scheduler state.
pub struct Scheduler {
    main: ThreadRef,
    current: RefCell<ThreadRef>,
}

impl Scheduler {
    pub fn new() -> Scheduler {
        let main = Rc::new(RefCell::new(Thread::main()));
        Scheduler {
            current: RefCell::new(main.clone()),
            main,
        }
    }

    pub fn main_thread(&self) -> ThreadRef {
        self.main.clone()
    }

    pub fn current(&self) -> ThreadRef {
        self.current.borrow().clone()
    }

    pub fn is_main(&self, t: &ThreadRef) -> bool {
        Rc::ptr_eq(t, &self.main)
    }

    fn swap_current(&self, t: ThreadRef) -> ThreadRef {
        self.current.replace(t)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// One scheduler step: advance `t` with `args`, returning
/// `[true, values...]` or `[false, message]` when the body raised a
/// domain error. Resuming a dead or running coroutine raises.
pub fn resume(env: &Env, t: &ThreadRef, args: Vec<LuaValue>) -> LuaResult<Vec<LuaValue>> {
    let transfer = {
        let thread = t.borrow();
        match thread.status {
            ThreadStatus::Dead => {
                return Err(LuaError::runtime("cannot resume dead coroutine"))
            }
            ThreadStatus::Running => {
                return Err(LuaError::runtime("cannot resume non-suspended coroutine"))
            }
            ThreadStatus::Suspended => thread.transfer.clone(),
        }
    };

    // Build or revive the body without holding the borrow while polling.
    let mut body = {
        let mut thread = t.borrow_mut();
        thread.status = ThreadStatus::Running;
        match thread.body.take() {
            Some(body) => {
                *transfer.borrow_mut() = Transfer::Resumed(args);
                body
            }
            None => {
                let func = thread
                    .func
                    .take()
                    .expect("suspended thread without a body or function");
                call_value(env, func, args)
            }
        }
    };

    let prev = env.scheduler().swap_current(t.clone());
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    let polled = body.as_mut().poll(&mut cx);
    env.scheduler().swap_current(prev);

    let mut thread = t.borrow_mut();
    match polled {
        Poll::Ready(Ok(values)) => {
            thread.status = ThreadStatus::Dead;
            let mut out = vec![LuaValue::Boolean(true)];
            out.extend(values);
            Ok(out)
        }
        Poll::Ready(Err(err)) => {
            thread.status = ThreadStatus::Dead;
            Ok(vec![
                LuaValue::Boolean(false),
                LuaValue::str(err.message()),
            ])
        }
        Poll::Pending => {
            thread.status = ThreadStatus::Suspended;
            thread.body = Some(body);
            let yielded = match std::mem::replace(&mut *transfer.borrow_mut(), Transfer::Idle) {
                Transfer::Yielded(values) => values,
                _ => Vec::new(),
            };
            let mut out = vec![LuaValue::Boolean(true)];
            out.extend(yielded);
            Ok(out)
        }
    }
}

/// `wrap` semantics (also used when a thread value is called directly):
/// domain errors rethrow, results carry no leading `true`.
pub fn resume_unwrap(env: &Env, t: &ThreadRef, args: Vec<LuaValue>) -> LuaResult<Vec<LuaValue>> {
    let mut out = resume(env, t, args)?;
    let ok = out.remove(0).truthy();
    if ok {
        Ok(out)
    } else {
        let message = match out.first() {
            Some(LuaValue::Str(s)) => s.to_string(),
            Some(other) => other.display_text(),
            None => "error in coroutine".to_string(),
        };
        Err(LuaError::runtime(message))
    }
}

/// Suspend the current coroutine, delivering `values` to the pending
/// `resume`; resolves to the arguments of the next `resume`. Yielding
/// from the main thread raises.
pub async fn yield_values(env: &Env, values: Vec<LuaValue>) -> LuaResult<Vec<LuaValue>> {
    let current = env.scheduler().current();
    if current.borrow().is_main {
        return Err(LuaError::runtime(
            "attempt to yield from outside a coroutine",
        ));
    }
    let transfer = current.borrow().transfer.clone();
    Ok(YieldFuture {
        transfer,
        values: Some(values),
        parked: false,
    }
    .await)
}

struct YieldFuture {
    transfer: Rc<RefCell<Transfer>>,
    values: Option<Vec<LuaValue>>,
    parked: bool,
}

impl Future for YieldFuture {
    type Output = Vec<LuaValue>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Vec<LuaValue>> {
        let this = self.get_mut();
        if !this.parked {
            this.parked = true;
            let values = this.values.take().unwrap_or_default();
            *this.transfer.borrow_mut() = Transfer::Yielded(values);
            Poll::Pending
        } else {
            let resumed = std::mem::replace(&mut *this.transfer.borrow_mut(), Transfer::Idle);
            match resumed {
                Transfer::Resumed(args) => Poll::Ready(args),
                _ => Poll::Ready(Vec::new()),
            }
        }
    }
}
