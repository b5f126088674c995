//! Module emission.
//!
//! Serializes the decoded module into the fixed output file set: the
//! instance pair `inst.h`/`inst.cpp` (Import interface, ImportImpl bound
//! to the Go runtime, the Inst façade with its dispatch table, typedefs,
//! tables, globals and export trampolines), the generated `mem.cpp`
//! (page count and data-segment splat), and the rendered runtime
//! templates. Iteration order is fixed everywhere so identical input
//! yields byte-identical output.

use std::collections::HashSet;

use anyhow::{Context, Result};
use wasmparser::{FuncType, ValType};

use crate::codegen::function::emit_function;
use crate::codegen::imports::{import_body, unimplemented_body};
use crate::codegen::types::{cpp_params, cpp_return_type, cpp_type, single_result};
use crate::ident::identifier_from_string;
use crate::parser::{InitValue, ParsedModule};
use crate::runtime::{include_guard, render, GO_CPP, MEM_CPP, TEMPLATES};

/// One emitted file.
#[derive(Debug, Clone)]
pub struct OutputFile {
    pub name: String,
    pub content: String,
}

/// Emission parameters from the CLI.
#[derive(Debug, Clone)]
pub struct EmitOptions {
    pub namespace: String,
    /// Prefix inside generated `#include` directives, `""` or `"dir/"`.
    pub include_prefix: String,
}

impl Default for EmitOptions {
    fn default() -> Self {
        EmitOptions {
            namespace: "go2cpp_autogen".to_string(),
            include_prefix: String::new(),
        }
    }
}

const NOTICE: &str = "// Code generated by go2cpp. DO NOT EDIT.\n";

/// The emitted C++ name of every function, by function index.
///
/// Imports use their encoded field name (the Import interface method);
/// defined functions use their name-section symbol, falling back to
/// `f<idx>`. A defined name that would collide with an export trampoline
/// or an earlier name gets an `_<idx>` suffix.
pub fn function_names(module: &ParsedModule) -> Result<Vec<String>> {
    let mut trampolines = HashSet::new();
    for export in &module.exports {
        trampolines.insert(identifier_from_string(&export.name)?);
    }
    let mut taken: HashSet<String> = HashSet::new();
    let mut names = Vec::with_capacity(module.funcs.len());
    for (idx, func) in module.funcs.iter().enumerate() {
        let base = match (&func.import, &func.name) {
            (Some((_, field)), _) => identifier_from_string(field)?,
            (None, Some(symbol)) => identifier_from_string(symbol)?,
            (None, None) => format!("f{}", idx),
        };
        let mut name = base;
        if (!func.is_import() && trampolines.contains(&name)) || taken.contains(&name) {
            name = format!("{}_{}", name, idx);
        }
        taken.insert(name.clone());
        names.push(name);
    }
    Ok(names)
}

/// Whether to synthesise `getsp()` from the stack-pointer global.
fn synthesise_getsp(module: &ParsedModule, names: &[String]) -> bool {
    module.exports.iter().all(|e| e.name != "getsp")
        && names.iter().all(|n| n != "getsp")
        && matches!(module.globals.first(), Some(g) if g.val_type == ValType::I32)
}

fn param_type_list(sig: &FuncType) -> Result<String> {
    let mut parts = Vec::with_capacity(sig.params().len());
    for p in sig.params() {
        parts.push(cpp_type(*p)?.to_string());
    }
    Ok(parts.join(", "))
}

fn global_literal(init: InitValue) -> String {
    match init {
        InitValue::I32(v) => v.to_string(),
        InitValue::I64(v) if v == i64::MIN => "(-9223372036854775807LL - 1LL)".to_string(),
        InitValue::I64(v) => format!("{}LL", v),
        InitValue::F32(v) if v.is_nan() => "std::numeric_limits<float>::quiet_NaN()".to_string(),
        InitValue::F32(v) if v.is_infinite() && v > 0.0 => {
            "std::numeric_limits<float>::infinity()".to_string()
        }
        InitValue::F32(v) if v.is_infinite() => {
            "-std::numeric_limits<float>::infinity()".to_string()
        }
        InitValue::F32(v) => format!("{:?}f", v),
        InitValue::F64(v) if v.is_nan() => "std::numeric_limits<double>::quiet_NaN()".to_string(),
        InitValue::F64(v) if v.is_infinite() && v > 0.0 => {
            "std::numeric_limits<double>::infinity()".to_string()
        }
        InitValue::F64(v) if v.is_infinite() => {
            "-std::numeric_limits<double>::infinity()".to_string()
        }
        InitValue::F64(v) => format!("{:?}", v),
    }
}

/// Emit the complete output file set for a decoded module.
pub fn emit_module(module: &ParsedModule, opts: &EmitOptions) -> Result<Vec<OutputFile>> {
    let names = function_names(module)?;
    // Bodies first: a lowering diagnostic (unsupported operator, exotic
    // block type) is more precise than the header's signature checks.
    let inst_cpp = emit_inst_cpp(module, &names, opts)?;
    let mut files = Vec::new();
    files.push(OutputFile {
        name: "inst.h".to_string(),
        content: emit_inst_header(module, &names, opts)?,
    });
    files.push(OutputFile {
        name: "inst.cpp".to_string(),
        content: inst_cpp,
    });
    files.push(OutputFile {
        name: "mem.cpp".to_string(),
        content: emit_mem_cpp(module, opts),
    });
    for (name, template) in TEMPLATES {
        files.push(OutputFile {
            name: name.to_string(),
            content: render(template, name, &opts.namespace, &opts.include_prefix),
        });
    }
    files.push(OutputFile {
        name: "go.cpp".to_string(),
        content: render(GO_CPP, "go.cpp", &opts.namespace, &opts.include_prefix),
    });
    Ok(files)
}

fn emit_inst_header(
    module: &ParsedModule,
    names: &[String],
    opts: &EmitOptions,
) -> Result<String> {
    let guard = include_guard(&opts.namespace, "inst.h");
    let inc = &opts.include_prefix;
    let mut out = String::new();
    out.push_str(NOTICE);
    out.push('\n');
    out.push_str(&format!("#ifndef {}\n#define {}\n\n", guard, guard));
    out.push_str("#include <array>\n#include <cstdint>\n#include <limits>\n\n");
    out.push_str(&format!("#include \"{}mem.h\"\n\n", inc));
    out.push_str(&format!("namespace {} {{\n\n", opts.namespace));
    out.push_str("class Go;\n\n");

    // The host-import interface: one pure virtual per imported function.
    out.push_str("class Import {\npublic:\n\tvirtual ~Import();\n");
    for (idx, func) in module.funcs.iter().enumerate() {
        if !func.is_import() {
            continue;
        }
        let sig = module.func_type(idx as u32)?;
        out.push_str(&format!(
            "\tvirtual {} {}({}) = 0;\n",
            cpp_return_type(sig)?,
            names[idx],
            cpp_params(sig)?
        ));
    }
    out.push_str("};\n\n");

    out.push_str("class ImportImpl : public Import {\npublic:\n\texplicit ImportImpl(Go* go);\n");
    for (idx, func) in module.funcs.iter().enumerate() {
        if !func.is_import() {
            continue;
        }
        let sig = module.func_type(idx as u32)?;
        out.push_str(&format!(
            "\t{} {}({}) override;\n",
            cpp_return_type(sig)?,
            names[idx],
            cpp_params(sig)?
        ));
    }
    out.push_str("\nprivate:\n\tGo* go_;\n};\n\n");

    out.push_str("class Inst {\npublic:\n\tInst(Mem* mem, Import* import);\n\n");
    for export in &module.exports {
        let sig = module.func_type(export.func_index)?;
        out.push_str(&format!(
            "\t{} {}({});\n",
            cpp_return_type(sig)?,
            identifier_from_string(&export.name)?,
            cpp_params(sig)?
        ));
    }
    if synthesise_getsp(module, names) {
        out.push_str("\tint32_t getsp() const;\n");
    }
    out.push_str("\nprivate:\n");

    for (idx, ty) in module.types.iter().enumerate() {
        out.push_str(&format!(
            "\ttypedef {} (Inst::*Type{})({});\n",
            cpp_return_type(ty)
                .with_context(|| format!("emitting typedef for type {}", idx))?,
            idx,
            param_type_list(ty)?
        ));
    }
    if !module.types.is_empty() {
        out.push('\n');
        out.push_str("\tstruct Func {\n");
        for idx in 0..module.types.len() {
            out.push_str(&format!("\t\tType{} type{}_ = nullptr;\n", idx, idx));
        }
        out.push_str("\t};\n");
    }
    if !module.funcs.is_empty() {
        out.push_str(&format!(
            "\tstatic const Func funcs_[{}];\n",
            module.funcs.len()
        ));
    }
    if !module.tables.is_empty() {
        let inner = module.tables.iter().map(Vec::len).max().unwrap_or(0);
        out.push_str(&format!(
            "\tstatic const std::array<std::array<uint32_t, {}>, {}> table_;\n",
            inner,
            module.tables.len()
        ));
    }
    out.push('\n');

    for (idx, func) in module.funcs.iter().enumerate() {
        if func.is_import() {
            continue;
        }
        let sig = module.func_type(idx as u32)?;
        out.push_str(&format!(
            "\t{} {}({});\n",
            cpp_return_type(sig)?,
            names[idx],
            cpp_params(sig)?
        ));
    }

    out.push_str("\n\tMem* mem_;\n\tImport* import_;\n");
    for (idx, global) in module.globals.iter().enumerate() {
        out.push_str(&format!(
            "\t{} global{}_ = {};\n",
            cpp_type(global.val_type)?,
            idx,
            global_literal(global.init_value)
        ));
    }
    out.push_str("};\n\n");
    out.push_str(&format!("}}  // namespace {}\n\n", opts.namespace));
    out.push_str(&format!("#endif  // {}\n", guard));
    Ok(out)
}

fn emit_inst_cpp(module: &ParsedModule, names: &[String], opts: &EmitOptions) -> Result<String> {
    let inc = &opts.include_prefix;
    let mut out = String::new();
    out.push_str(NOTICE);
    out.push('\n');
    out.push_str(&format!("#include \"{}inst.h\"\n\n", inc));
    out.push_str(
        "#include <algorithm>\n#include <cassert>\n#include <cmath>\n#include <cstdint>\n#include <iostream>\n#include <string>\n#include <vector>\n\n",
    );
    out.push_str(&format!("#include \"{}bits.h\"\n", inc));
    out.push_str(&format!("#include \"{}bytes.h\"\n", inc));
    out.push_str(&format!("#include \"{}go.h\"\n", inc));
    out.push_str(&format!("#include \"{}js.h\"\n\n", inc));
    out.push_str(&format!("namespace {} {{\n\n", opts.namespace));

    out.push_str("Import::~Import() = default;\n\n");
    out.push_str("ImportImpl::ImportImpl(Go* go) : go_(go) {\n}\n\n");

    for (idx, func) in module.funcs.iter().enumerate() {
        let Some((_, field)) = &func.import else {
            continue;
        };
        let sig = module.func_type(idx as u32)?;
        let body = match import_body(field) {
            Some(body) => body.to_string(),
            None => unimplemented_body(field),
        };
        out.push_str(&format!(
            "{} ImportImpl::{}({}) {{\n{}}}\n\n",
            cpp_return_type(sig)?,
            names[idx],
            cpp_params(sig)?,
            body
        ));
    }

    out.push_str("Inst::Inst(Mem* mem, Import* import) : mem_(mem), import_(import) {\n}\n\n");

    if !module.funcs.is_empty() {
        out.push_str("const Inst::Func Inst::funcs_[] = {\n");
        for (idx, func) in module.funcs.iter().enumerate() {
            if func.is_import() {
                // Imports dispatch through the Import interface; their
                // slots stay null.
                out.push_str("\t{},\n");
            } else {
                out.push_str(&format!(
                    "\t{{ .type{}_ = &Inst::{} }},\n",
                    func.type_idx, names[idx]
                ));
            }
        }
        out.push_str("};\n\n");
    }

    if !module.tables.is_empty() {
        let inner = module.tables.iter().map(Vec::len).max().unwrap_or(0);
        out.push_str(&format!(
            "const std::array<std::array<uint32_t, {}>, {}> Inst::table_ = {{{{\n",
            inner,
            module.tables.len()
        ));
        for table in &module.tables {
            let mut row: Vec<String> = table.iter().map(|f| f.to_string()).collect();
            row.resize(inner, "0".to_string());
            out.push_str(&format!("\t{{{{{}}}}},\n", row.join(", ")));
        }
        out.push_str("}};\n\n");
    }

    for export in &module.exports {
        let sig = module.func_type(export.func_index)?;
        let trampoline = identifier_from_string(&export.name)?;
        let target = &names[export.func_index as usize];
        let callee = if module.funcs[export.func_index as usize].is_import() {
            format!("import_->{}", target)
        } else {
            target.clone()
        };
        let args: Vec<String> = (0..sig.params().len())
            .map(|i| format!("local{}_", i))
            .collect();
        let ret = if single_result(sig)?.is_some() {
            "return "
        } else {
            ""
        };
        out.push_str(&format!(
            "{} Inst::{}({}) {{\n\t{}{}({});\n}}\n\n",
            cpp_return_type(sig)?,
            trampoline,
            cpp_params(sig)?,
            ret,
            callee,
            args.join(", ")
        ));
    }

    if synthesise_getsp(module, names) {
        out.push_str("int32_t Inst::getsp() const {\n\treturn global0_;\n}\n\n");
    }

    for (idx, func) in module.funcs.iter().enumerate() {
        if func.is_import() {
            continue;
        }
        let emitted = emit_function(module, names, idx as u32)
            .with_context(|| format!("emitting function {}", idx))?;
        out.push_str(&emitted.definition);
        out.push('\n');
    }

    out.push_str(&format!("}}  // namespace {}\n", opts.namespace));
    Ok(out)
}

fn emit_mem_cpp(module: &ParsedModule, opts: &EmitOptions) -> String {
    let mut data = String::new();
    for (idx, segment) in module.data_segments.iter().enumerate() {
        if segment.data.is_empty() {
            continue;
        }
        data.push_str(&format!("\tstatic const uint8_t segment{}_[] = {{\n", idx));
        for chunk in segment.data.chunks(16) {
            let bytes: Vec<String> = chunk.iter().map(|b| format!("0x{:02x}", b)).collect();
            data.push_str(&format!("\t\t{},\n", bytes.join(", ")));
        }
        data.push_str("\t};\n");
        data.push_str(&format!(
            "\tStoreBytes({}, segment{}_, sizeof(segment{}_));\n",
            segment.offset, idx, idx
        ));
    }
    render(MEM_CPP, "mem.cpp", &opts.namespace, &opts.include_prefix)
        .replace("{{PAGES}}", &module.initial_pages.to_string())
        .replace("{{DATA}}", &data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_wasm;

    fn emit(wat: &str) -> Vec<OutputFile> {
        let wasm = wat::parse_str(wat).unwrap();
        let module = parse_wasm(&wasm).unwrap();
        emit_module(&module, &EmitOptions::default()).unwrap()
    }

    fn file<'a>(files: &'a [OutputFile], name: &str) -> &'a str {
        &files
            .iter()
            .find(|f| f.name == name)
            .unwrap_or_else(|| panic!("missing file {}", name))
            .content
    }

    #[test]
    fn fixed_file_set_is_always_emitted() {
        let files = emit("(module (memory 1))");
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        for expected in [
            "inst.h",
            "inst.cpp",
            "mem.h",
            "mem.cpp",
            "bits.h",
            "bytes.h",
            "bytes.cpp",
            "js.h",
            "js.cpp",
            "taskqueue.h",
            "taskqueue.cpp",
            "gl.h",
            "gl.cpp",
            "game.h",
            "game.cpp",
            "go.h",
            "go.cpp",
        ] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
        for f in &files {
            assert!(
                f.content.starts_with("// Code generated by go2cpp. DO NOT EDIT."),
                "{} lacks the notice",
                f.name
            );
        }
    }

    #[test]
    fn empty_module_has_no_dispatch_table_and_copies_no_data() {
        let files = emit("(module (memory 1))");
        let inst = file(&files, "inst.cpp");
        assert!(!inst.contains("funcs_"));
        let mem = file(&files, "mem.cpp");
        assert!(mem.contains("bytes_.resize(static_cast<size_t>(1) * kPageSize);"));
        assert!(!mem.contains("segment"));
    }

    #[test]
    fn globals_become_members_with_initialisers() {
        let files = emit(
            r#"
            (module
                (global (mut i32) (i32.const 4096))
                (global (mut i64) (i64.const -9223372036854775808))
            )
        "#,
        );
        let header = file(&files, "inst.h");
        assert!(header.contains("\tint32_t global0_ = 4096;"));
        assert!(header.contains("\tint64_t global1_ = (-9223372036854775807LL - 1LL);"));
        // The stack-pointer global doubles as getsp().
        assert!(header.contains("int32_t getsp() const;"));
        assert!(file(&files, "inst.cpp").contains("return global0_;"));
    }

    #[test]
    fn dispatch_table_and_typedefs_cover_defined_functions() {
        let files = emit(
            r#"
            (module
                (type (func (param i32) (result i32)))
                (import "go" "runtime.wasmExit" (func (type 0)))
                (func (type 0) local.get 0)
                (table 2 funcref)
                (elem (i32.const 1) func 1)
            )
        "#,
        );
        let header = file(&files, "inst.h");
        assert!(header.contains("typedef int32_t (Inst::*Type0)(int32_t);"));
        assert!(header.contains("static const Func funcs_[2];"));
        assert!(header.contains("static const std::array<std::array<uint32_t, 2>, 1> table_;"));
        let inst = file(&files, "inst.cpp");
        assert!(inst.contains("\t{},\n\t{ .type0_ = &Inst::f1 },"));
        assert!(inst.contains("\t{{0, 1}},"));
    }

    #[test]
    fn import_methods_use_table_bodies_or_fail_at_call_time() {
        let files = emit(
            r#"
            (module
                (import "go" "runtime.wasmExit" (func (param i32)))
                (import "go" "mystery.hook" (func (param i32)))
            )
        "#,
        );
        let inst = file(&files, "inst.cpp");
        assert!(inst.contains("void ImportImpl::runtime_2ewasmExit(int32_t local0_) {"));
        assert!(inst.contains("go_->Exit(code);"));
        assert!(inst.contains("void ImportImpl::mystery_2ehook(int32_t local0_) {"));
        assert!(inst.contains("go_->Unimplemented(\"mystery.hook\");"));
    }

    #[test]
    fn export_trampolines_forward_to_internal_names() {
        let files = emit(
            r#"
            (module
                (func $main.run (param i32 i32)
                    local.get 0
                    drop
                    local.get 1
                    drop
                )
                (export "run" (func 0))
            )
        "#,
        );
        let inst = file(&files, "inst.cpp");
        assert!(inst.contains("void Inst::run(int32_t local0_, int32_t local1_) {"));
        assert!(inst.contains("\tmain_2erun(local0_, local1_);"));
    }

    #[test]
    fn colliding_internal_names_are_suffixed() {
        let files = emit(
            r#"
            (module
                (func $run (param i32)
                    local.get 0
                    drop
                )
                (export "run" (func 0))
            )
        "#,
        );
        let inst = file(&files, "inst.cpp");
        assert!(inst.contains("void Inst::run(int32_t local0_) {"));
        assert!(inst.contains("\trun_0(local0_);"));
        assert!(inst.contains("void Inst::run_0(int32_t local0_) {"));
    }

    #[test]
    fn data_segments_splat_at_their_offsets() {
        let files = emit(
            r#"
            (module
                (memory 2)
                (data (i32.const 1024) "Hi")
            )
        "#,
        );
        let mem = file(&files, "mem.cpp");
        assert!(mem.contains("bytes_.resize(static_cast<size_t>(2) * kPageSize);"));
        assert!(mem.contains("0x48, 0x69,"));
        assert!(mem.contains("StoreBytes(1024, segment0_, sizeof(segment0_));"));
    }

    #[test]
    fn emission_is_bit_stable() {
        let wat = r#"
            (module
                (memory 1)
                (global (mut i32) (i32.const 8))
                (func (export "run") (param i32 i32))
                (data (i32.const 0) "abc")
            )
        "#;
        let first = emit(wat);
        let second = emit(wat);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.content, b.content);
        }
    }

    #[test]
    fn namespace_and_guard_follow_the_options() {
        let wasm = wat::parse_str("(module)").unwrap();
        let module = parse_wasm(&wasm).unwrap();
        let opts = EmitOptions {
            namespace: "my::app".to_string(),
            include_prefix: "gen/".to_string(),
        };
        let files = emit_module(&module, &opts).unwrap();
        let header = file(&files, "inst.h");
        assert!(header.contains("#ifndef MY_APP_INST_H"));
        assert!(header.contains("namespace my::app {"));
        assert!(file(&files, "inst.cpp").contains("#include \"gen/inst.h\""));
    }
}
