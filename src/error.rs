//! Error handling for the engine.
//!
//! A single domain-error kind (a Lua-level error carrying a message)
//! plus positioned parse errors from the front end. Domain errors
//! propagate as `Err` until `pcall`/`xpcall` or the outermost `exec()`
//! catches them; host panics are never caught.

use std::fmt;

/// Error type shared by the front end and the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum LuaError {
    /// Lexer, parser, or analysis error with source position.
    Parse {
        message: String,
        line: u32,
        column: u32,
    },
    /// A Lua-level runtime error, catchable by `pcall`.
    Runtime(String),
}

impl LuaError {
    /// Create a parse error with location information.
    pub fn parse(message: impl Into<String>, line: u32, column: u32) -> Self {
        LuaError::Parse {
            message: message.into(),
            line,
            column,
        }
    }

    /// Create a runtime (domain) error.
    pub fn runtime(message: impl Into<String>) -> Self {
        LuaError::Runtime(message.into())
    }

    /// `bad argument #N to 'f' (T expected, got U)`
    pub fn bad_argument(index: usize, func: &str, expected: &str, got: &str) -> Self {
        LuaError::Runtime(format!(
            "bad argument #{} to '{}' ({} expected, got {})",
            index, func, expected, got
        ))
    }

    /// `bad argument #N to 'f' (msg)`
    pub fn bad_argument_msg(index: usize, func: &str, msg: &str) -> Self {
        LuaError::Runtime(format!("bad argument #{} to '{}' ({})", index, func, msg))
    }

    /// `attempt to perform arithmetic on a T value`
    pub fn arith(type_name: &str) -> Self {
        LuaError::Runtime(format!(
            "attempt to perform arithmetic on a {} value",
            type_name
        ))
    }

    /// `attempt to concatenate a T value`
    pub fn concat(type_name: &str) -> Self {
        LuaError::Runtime(format!("attempt to concatenate a {} value", type_name))
    }

    /// `attempt to index a T value`
    pub fn index(type_name: &str) -> Self {
        LuaError::Runtime(format!("attempt to index a {} value", type_name))
    }

    /// `attempt to compare X with Y`
    pub fn compare(left: &str, right: &str) -> Self {
        LuaError::Runtime(format!("attempt to compare {} with {}", left, right))
    }

    /// The message string delivered to `pcall` and error handlers.
    pub fn message(&self) -> String {
        match self {
            LuaError::Parse {
                message,
                line,
                column,
            } => format!("{}:{}: {}", line, column, message),
            LuaError::Runtime(message) => message.clone(),
        }
    }
}

impl fmt::Display for LuaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for LuaError {}

/// Convenience alias used throughout the crate.
pub type LuaResult<T> = Result<T, LuaError>;
