use anyhow::{Context, Result};
use clap::Parser;
use go2cpp::{transpile, write_output, EmitOptions};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// go2cpp — converts a Go WebAssembly binary into a C++ project.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Input WebAssembly binary produced by GOOS=js GOARCH=wasm
    #[arg(long)]
    wasm: PathBuf,

    /// Output directory for the generated C++ sources
    #[arg(long)]
    out: PathBuf,

    /// Include prefix used inside generated #include directives
    #[arg(long, default_value = "")]
    include: String,

    /// Namespace for the emitted code (also drives the include guards)
    #[arg(long, default_value = "go2cpp_autogen")]
    namespace: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let wasm_bytes = fs::read(&cli.wasm)
        .with_context(|| format!("failed to read {}", cli.wasm.display()))?;

    let mut include_prefix = cli.include.trim_end_matches('/').to_string();
    if !include_prefix.is_empty() {
        include_prefix.push('/');
    }
    let options = EmitOptions {
        namespace: cli.namespace.clone(),
        include_prefix,
    };

    let files = transpile(&wasm_bytes, &options).context("transpilation failed")?;
    write_output(&cli.out, &files)?;

    eprintln!(
        "go2cpp: wrote {} files to {}",
        files.len(),
        cli.out.display()
    );
    Ok(())
}
