use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use magma_core::{CompileOptions, EmitMode, compile_with, run};
use tracing::{debug, info};

/// Magma to C compiler.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Source file; reads standard input when omitted.
    #[arg(short, long)]
    input: Option<String>,

    /// Destination for the emitted C; standard output when omitted.
    #[arg(short, long)]
    output: Option<String>,

    #[arg(
        long,
        value_enum,
        value_name = "FORMAT",
        default_value = "c",
        help = "Output format: c (fragment) or program (with main)"
    )]
    emit: Emit,

    #[arg(long, help = "Build the program with a C compiler and run it")]
    run: bool,

    #[arg(
        long,
        conflicts_with = "run",
        help = "Execute the program with the built-in interpreter; readInt consumes integers from standard input"
    )]
    interpret: bool,

    #[arg(long, value_name = "PATH", help = "C compiler used by --run (defaults to $CC or cc)")]
    cc: Option<String>,

    #[arg(short, long, help = "Log compiler phases to standard error")]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Emit {
    C,
    Program,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    execute(cli)
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .with(filter)
        .init();
}

fn execute(cli: Cli) -> Result<ExitCode> {
    let source = match &cli.input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read input file {path}"))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read source from standard input")?;
            buffer
        }
    };

    if cli.interpret {
        let input = if cli.input.is_some() {
            read_integers()?
        } else {
            Vec::new()
        };
        let outcome = run(&source, &input).context("interpretation failed")?;
        io::stdout()
            .write_all(&outcome.output)
            .context("failed to write program output")?;
        info!(exit_code = outcome.exit_code, "interpreted");
        return Ok(exit_code(outcome.exit_code));
    }

    let mode = if cli.run || cli.emit == Emit::Program {
        EmitMode::Program
    } else {
        EmitMode::Fragment
    };
    let c_source = compile_with(&source, CompileOptions { mode }).context("compilation failed")?;
    debug!(bytes = c_source.len(), ?mode, "compiled");

    if cli.run {
        if let Some(path) = &cli.output {
            write_output(path, c_source.as_bytes())?;
        }
        let compiler = cli
            .cc
            .clone()
            .or_else(|| std::env::var("CC").ok())
            .unwrap_or_else(|| "cc".to_string());
        return build_and_run(&compiler, &c_source);
    }

    match &cli.output {
        Some(path) => write_output(path, c_source.as_bytes())?,
        None => {
            let mut stdout = io::stdout();
            stdout.write_all(c_source.as_bytes())?;
            if !c_source.ends_with('\n') {
                stdout.write_all(b"\n")?;
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Whitespace-separated integers from standard input, for `readInt`.
fn read_integers() -> Result<Vec<i64>> {
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("failed to read program input")?;
    buffer
        .split_whitespace()
        .map(|word| {
            word.parse::<i64>()
                .with_context(|| format!("program input '{word}' is not an integer"))
        })
        .collect()
}

fn write_output(path: &str, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = PathBuf::from(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {parent:?}"))?;
        }
    }
    fs::write(path, bytes).with_context(|| format!("failed to write output file {path}"))?;
    Ok(())
}

fn build_and_run(compiler: &str, c_source: &str) -> Result<ExitCode> {
    let dir = tempfile::tempdir().context("failed to create build directory")?;
    let c_path = dir.path().join("main.c");
    let exe_path = dir.path().join("main");
    fs::write(&c_path, c_source).context("failed to write generated C")?;

    debug!(compiler, path = %c_path.display(), "invoking C compiler");
    let status = Command::new(compiler)
        .arg(&c_path)
        .arg("-o")
        .arg(&exe_path)
        .status()
        .with_context(|| format!("failed to start C compiler '{compiler}'"))?;
    if !status.success() {
        bail!("C compiler '{compiler}' failed with {status}");
    }
    run_executable(&exe_path)
}

fn run_executable(path: &Path) -> Result<ExitCode> {
    let status = Command::new(path)
        .status()
        .with_context(|| format!("failed to run {}", path.display()))?;
    let code = status.code().unwrap_or(1);
    info!(code, "program exited");
    Ok(exit_code(i64::from(code)))
}

fn exit_code(code: i64) -> ExitCode {
    ExitCode::from(exit_status(code))
}

/// Low byte of `code`, the way a shell reports it.
fn exit_status(code: i64) -> u8 {
    (code & 0xff) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_wrap_like_a_shell() {
        assert_eq!(exit_status(256), 0);
        assert_eq!(exit_status(-1), 255);
        assert_eq!(exit_status(42), 42);
    }
}
