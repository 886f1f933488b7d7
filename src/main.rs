//! CLI harness: run a script file or an inline chunk against a fresh
//! environment wired to the real filesystem.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context as _};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use moonlet::{Config, Env, LuaError, LuaValue};

#[derive(Parser)]
#[command(name = "moonlet", version, about = "Run Lua 5.3 scripts")]
struct Cli {
    /// Script file to run.
    script: Option<PathBuf>,

    /// Inline chunk to execute instead of a file.
    #[arg(short = 'e', long = "execute", value_name = "CHUNK")]
    chunk: Option<String>,

    /// Override the module search path (package.path).
    #[arg(long = "lua-path", value_name = "TEMPLATES")]
    lua_path: Option<String>,
}

fn filesystem_config(lua_path: Option<String>) -> Config {
    Config {
        lua_path: lua_path.unwrap_or_else(|| "./?.lua".to_string()),
        file_exists: Some(Box::new(|path| {
            std::path::Path::new(path).is_file()
        })),
        load_file: Some(Box::new(|path| {
            std::fs::read_to_string(path).map_err(|e| e.to_string())
        })),
        os_exit: Some(Box::new(|code| std::process::exit(code))),
        ..Config::default()
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let env = Env::new(filesystem_config(cli.lua_path));

    let script = match (&cli.chunk, &cli.script) {
        (Some(chunk), _) => env.parse(chunk)?,
        (None, Some(path)) => {
            let path = path.to_str().context("script path is not valid UTF-8")?;
            env.parse_file(path)?
        }
        (None, None) => bail!("no script given; pass a file or -e '<chunk>'"),
    };

    match script.exec() {
        Ok(LuaValue::Nil) => Ok(()),
        Ok(value) => {
            println!("{}", value.display_text());
            Ok(())
        }
        Err(err @ LuaError::Parse { .. }) => bail!("{}", err),
        Err(LuaError::Runtime(message)) => bail!("{}", message),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("MOONLET_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("moonlet: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
