//! go2cpp — ahead-of-time transpiler from Go WebAssembly binaries to
//! standalone C++ projects.
//!
//! The pipeline decodes the wasm module, lowers every function body to
//! labelled-goto C++ through a symbolic operand stack, runs the textual
//! post-passes, and serializes the instance plus the fixed runtime files
//! into one output directory.

pub mod codegen;
pub mod ident;
pub mod optimizer;
pub mod parser;
pub mod runtime;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{debug, info};

pub use codegen::module::{EmitOptions, OutputFile};

/// Transpile a wasm binary into the output file set.
pub fn transpile(wasm_bytes: &[u8], options: &EmitOptions) -> Result<Vec<OutputFile>> {
    let module = parser::parse_wasm(wasm_bytes).context("failed to decode WebAssembly module")?;
    debug!(
        functions = module.funcs.len(),
        imports = module.num_imported_functions,
        exports = module.exports.len(),
        data_segments = module.data_segments.len(),
        "module decoded"
    );
    codegen::module::emit_module(&module, options).context("failed to emit C++ sources")
}

/// Write the emitted files under `out_dir`, one task per file.
///
/// The files are independent, so the fan-out is shared-nothing; any
/// failure aborts the run and leaves the partial directory in place.
pub fn write_output(out_dir: &Path, files: &[OutputFile]) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    files.par_iter().try_for_each(|file| {
        let path = out_dir.join(&file.name);
        fs::write(&path, &file.content)
            .with_context(|| format!("failed to write {}", path.display()))
    })?;
    info!(files = files.len(), dir = %out_dir.display(), "output written");
    Ok(())
}
