//! Function emission.
//!
//! Composes, for every defined function, the declaration that goes into
//! the class header and the definition that goes into the `.cpp` file:
//! signature, zero-initialised wasm locals, the lowered body after all
//! post-passes. Functions whose symbol name appears in the replacement
//! table get their hand-written body instead of a lowered one.

use anyhow::{Context, Result};

use crate::codegen::imports::replaced_body;
use crate::codegen::instruction::lower_function;
use crate::codegen::types::{cpp_params, cpp_return_type, cpp_type, zero_literal};
use crate::optimizer::run_passes;
use crate::parser::ParsedModule;

/// A function's two emitted halves.
pub struct EmittedFunc {
    /// `int32_t name(int32_t local0_);` — placed inside the class body.
    pub declaration: String,
    /// The full `Inst::` method definition.
    pub definition: String,
}

/// Emit defined function `func_index` under its C++ name.
pub fn emit_function(
    module: &ParsedModule,
    func_names: &[String],
    func_index: u32,
) -> Result<EmittedFunc> {
    let func = &module.funcs[func_index as usize];
    let sig = module.func_type(func_index)?;
    let name = &func_names[func_index as usize];
    let ret = cpp_return_type(sig)?;
    let params = cpp_params(sig)?;

    let body = match func.name.as_deref().and_then(replaced_body) {
        Some(replacement) => replacement.to_string(),
        None => {
            let wasm_body = func
                .body
                .as_ref()
                .with_context(|| format!("function {} has no body", func_index))?;
            let mut lines = Vec::new();
            for (i, ty) in wasm_body.locals.iter().enumerate() {
                let local_index = sig.params().len() + i;
                lines.push(format!(
                    "\t{} local{}_ = {};",
                    cpp_type(*ty)?,
                    local_index,
                    zero_literal(*ty)
                ));
            }
            let lowered = lower_function(module, func_names, func_index)
                .with_context(|| format!("lowering function {}", func_index))?;
            lines.extend(lowered.lines);
            let lines = run_passes(lines, &lowered.no_merge);
            let mut body = lines.join("\n");
            if !body.is_empty() {
                body.push('\n');
            }
            body
        }
    };

    Ok(EmittedFunc {
        declaration: format!("{} {}({});", ret, name, params),
        definition: format!("{} Inst::{}({}) {{\n{}}}\n", ret, name, params, body),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::module::function_names;
    use crate::parser::parse_wasm;

    fn emit(wat: &str, func_index: u32) -> EmittedFunc {
        let wasm = wat::parse_str(wat).unwrap();
        let module = parse_wasm(&wasm).unwrap();
        let names = function_names(&module).unwrap();
        emit_function(&module, &names, func_index).unwrap()
    }

    #[test]
    fn add_function_emits_a_single_expression_return() {
        let f = emit(
            r#"
            (module
                (func (param i32 i32) (result i32)
                    local.get 0
                    local.get 1
                    i32.add
                )
            )
        "#,
            0,
        );
        assert_eq!(
            f.declaration,
            "int32_t f0(int32_t local0_, int32_t local1_);"
        );
        assert!(f
            .definition
            .contains("int32_t Inst::f0(int32_t local0_, int32_t local1_) {"));
        assert!(f.definition.contains("\treturn (local0_ + local1_);"));
    }

    #[test]
    fn extra_locals_are_zero_initialised_in_order() {
        let f = emit(
            r#"
            (module
                (func (param i32) (result f64) (local i64 f64)
                    i64.const 7
                    local.set 1
                    local.get 1
                    f64.convert_i64_s
                    local.set 2
                    local.get 2
                )
            )
        "#,
            0,
        );
        assert!(f.definition.contains("\tint64_t local1_ = 0;"));
        assert!(f.definition.contains("\tdouble local2_ = 0.0;"));
        assert!(f.definition.contains("\tlocal1_ = 7LL;"));
        assert!(f
            .definition
            .contains("\tlocal2_ = static_cast<double>(local1_);"));
    }

    #[test]
    fn unused_locals_are_swept() {
        let f = emit(
            r#"
            (module
                (func (param i32) (result i32) (local i64)
                    local.get 0
                )
            )
        "#,
            0,
        );
        assert!(!f.definition.contains("local1_"));
        assert!(f.definition.contains("\treturn local0_;"));
    }

    #[test]
    fn loads_bind_before_aliasing_stores() {
        // The earlier load must be materialised before the store so the
        // later use still sees the old value.
        let f = emit(
            r#"
            (module
                (memory 1)
                (func (param i32 i32) (result i32)
                    local.get 0
                    i32.load
                    local.get 0
                    local.get 1
                    i32.store
                    i32.const 1
                    i32.add
                )
            )
        "#,
            0,
        );
        let def = &f.definition;
        let bind = def
            .find("i32_0_ = mem_->LoadInt32(local0_);")
            .expect("load must be bound to a local");
        let store = def
            .find("mem_->StoreInt32(local0_, local1_);")
            .expect("store must be emitted");
        assert!(bind < store, "binding must precede the store:\n{}", def);
        assert!(def.contains("return (i32_0_ + 1);"));
    }

    #[test]
    fn named_memory_helpers_use_replacement_bodies() {
        let f = emit(
            r#"
            (module
                (global i32 (i32.const 4096))
                (func $memcmp (param i32) (result i32)
                    i32.const 0
                )
            )
        "#,
            0,
        );
        assert!(f.definition.contains("mem_->Memcmp(a, b, size)"));
        assert!(!f.definition.contains("return 0;\n\treturn"));
    }

    #[test]
    fn br_to_outer_frame_becomes_a_return() {
        let f = emit(
            r#"
            (module
                (func (param i32) (result i32)
                    local.get 0
                    br 0
                )
            )
        "#,
            0,
        );
        assert!(f.definition.contains("\treturn local0_;"));
        assert!(!f.definition.contains("goto"));
    }

    #[test]
    fn br_within_a_block_stays_a_goto_until_folded() {
        let f = emit(
            r#"
            (module
                (func (param i32)
                    (block
                        local.get 0
                        br_if 0
                        return
                    )
                )
            )
        "#,
            0,
        );
        // The goto to the block end survives; the label is its target.
        assert!(f.definition.contains("goto label0;"));
        assert!(f.definition.contains("label0:;"));
    }
}
