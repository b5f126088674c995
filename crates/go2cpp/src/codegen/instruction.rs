//! Per-opcode lowering of the wasm stack machine into C++ text.
//!
//! Each function body is translated in one linear walk over its operator
//! stream. Operand-stack slots stay symbolic expression strings
//! ([`crate::codegen::stack`]) until a side effect forces them into
//! declared locals; structured control flow lowers to labelled gotos
//! ([`crate::codegen::blocks`]). The output is a raw line list, later
//! rewritten by the post-passes.

use std::collections::HashSet;

use anyhow::{bail, Context, Result};
use wasmparser::{BinaryReader, BlockType, Operator, ValType};

use crate::codegen::blocks::{BlockKind, BlockStack, BranchTarget};
use crate::codegen::types::{cpp_type, single_result};
use crate::parser::ParsedModule;

/// The lowered body of one function.
pub struct LoweredBody {
    pub lines: Vec<String>,
    /// Block return-slot names; the aggregation pass keeps their
    /// declarations verbatim.
    pub no_merge: HashSet<String>,
}

/// Lower the body of defined function `func_index`.
///
/// `func_names` maps every function index to its emitted C++ name.
pub fn lower_function(
    module: &ParsedModule,
    func_names: &[String],
    func_index: u32,
) -> Result<LoweredBody> {
    let func = &module.funcs[func_index as usize];
    let body = func
        .body
        .as_ref()
        .with_context(|| format!("function {} has no body", func_index))?;
    let sig = module.func_type(func_index)?;

    let mut local_types: Vec<ValType> = sig.params().to_vec();
    local_types.extend(body.locals.iter().copied());

    let mut lowerer = Lowerer {
        module,
        func_names,
        result: single_result(sig)?,
        local_types,
        blocks: BlockStack::new(),
        lines: Vec::new(),
        no_merge: HashSet::new(),
        dead: None,
    };

    let mut ops = BinaryReader::new(&body.code, 0);
    while !ops.eof() {
        let op = ops.read_operator().context("disassembling operator")?;
        lowerer
            .translate_operator(&op)
            .with_context(|| format!("lowering {:?}", op))?;
    }

    Ok(LoweredBody {
        lines: lowerer.lines,
        no_merge: lowerer.no_merge,
    })
}

struct Lowerer<'a> {
    module: &'a ParsedModule,
    func_names: &'a [String],
    result: Option<ValType>,
    local_types: Vec<ValType>,
    blocks: BlockStack,
    lines: Vec<String>,
    no_merge: HashSet<String>,
    /// Extra block nesting while skipping dead code after an unconditional
    /// transfer; `None` when live.
    dead: Option<u32>,
}

impl Lowerer<'_> {
    fn indent(&self) -> String {
        "\t".repeat(1 + self.blocks.indent_level() as usize)
    }

    fn line(&mut self, text: String) {
        self.lines.push(format!("{}{}", self.indent(), text));
    }

    fn flush(&mut self, keyword: &str) -> Result<()> {
        let indent = self.indent();
        let flushed = self.blocks.flush_exprs_if_needed(keyword, &indent)?;
        self.lines.extend(flushed);
        Ok(())
    }

    fn pop(&mut self) -> Result<String> {
        Ok(self.blocks.scope().pop()?.0)
    }

    fn push(&mut self, expr: String, ty: ValType) {
        self.blocks.scope().push_expr(expr, ty);
    }

    /// Binary operation: pops rhs then lhs, pushes the built expression.
    fn binop(&mut self, result: ValType, build: impl FnOnce(&str, &str) -> String) -> Result<()> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        self.push(build(&lhs, &rhs), result);
        Ok(())
    }

    fn unop(&mut self, result: ValType, build: impl FnOnce(&str) -> String) -> Result<()> {
        let operand = self.pop()?;
        self.push(build(&operand), result);
        Ok(())
    }

    /// Memory load: pops the address, pushes the built access expression.
    fn load(&mut self, result: ValType, offset: u64, build: impl FnOnce(&str) -> String) -> Result<()> {
        let addr = self.pop()?;
        self.push(build(&address(&addr, offset)), result);
        Ok(())
    }

    /// Memory store: flushes aliasing reads, pops value then address.
    fn store(&mut self, offset: u64, build: impl FnOnce(&str, &str) -> String) -> Result<()> {
        self.flush("mem_->")?;
        let value = self.pop()?;
        let addr = self.pop()?;
        let stmt = build(&address(&addr, offset), &value);
        self.line(format!("{};", stmt));
        Ok(())
    }

    /// Declare a block's return slot ahead of the block, if it has one.
    ///
    /// The declaration carries no initialiser so that gotos across it stay
    /// well-formed C++.
    fn block_result(&mut self, blockty: &BlockType) -> Result<Option<(String, ValType)>> {
        match blockty {
            BlockType::Empty => Ok(None),
            BlockType::Type(ty) => {
                let name = self.blocks.scope().fresh_var();
                self.line(format!("{} {};", cpp_type(*ty)?, name));
                self.no_merge.insert(name.clone());
                Ok(Some((name, *ty)))
            }
            BlockType::FuncType(_) => bail!("multi-value block types are not supported"),
        }
    }

    /// Emit the transfer for an unconditional branch to `depth`.
    fn emit_branch(&mut self, depth: u32) -> Result<()> {
        match self.blocks.peep_block_level(depth) {
            BranchTarget::Label { id, ret } => {
                if let Some(ret) = ret {
                    if !self.blocks.scope().is_empty() {
                        let expr = self.pop()?;
                        self.line(format!("{} = {};", ret, expr));
                    }
                }
                self.line(format!("goto label{};", id));
            }
            BranchTarget::FunctionExit => {
                if self.result.is_some() && !self.blocks.scope().is_empty() {
                    let expr = self.pop()?;
                    self.line(format!("return {};", expr));
                } else {
                    self.line("return;".to_string());
                }
            }
        }
        Ok(())
    }

    fn local_type(&self, index: u32) -> Result<ValType> {
        self.local_types
            .get(index as usize)
            .copied()
            .with_context(|| format!("local index {} out of range", index))
    }

    fn global_type(&self, index: u32) -> Result<ValType> {
        self.module
            .globals
            .get(index as usize)
            .map(|g| g.val_type)
            .with_context(|| format!("global index {} out of range", index))
    }

    /// Emit a direct or indirect call statement, pushing a fresh result
    /// variable when the callee returns a value.
    fn emit_call(&mut self, callee: &str, args: &[String], result: Option<ValType>) -> Result<()> {
        let call = format!("{}({})", callee, args.join(", "));
        match result {
            Some(ty) => {
                let indent = self.indent();
                let lhs = self.blocks.scope().push_lhs(ty);
                self.lines
                    .push(format!("{}{} {} = {};", indent, cpp_type(ty)?, lhs, call));
            }
            None => self.line(format!("{};", call)),
        }
        Ok(())
    }

    /// Pop `count` call arguments, leftmost first in the result.
    fn pop_args(&mut self, count: usize) -> Result<Vec<String>> {
        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            args.push(self.pop()?);
        }
        args.reverse();
        Ok(args)
    }

    fn translate_operator(&mut self, op: &Operator) -> Result<()> {
        // Code after an unconditional transfer is dead until the frame it
        // belongs to closes; wasm allows arbitrary (stack-polymorphic)
        // instructions there.
        if let Some(nesting) = self.dead {
            match op {
                Operator::Block { .. } | Operator::Loop { .. } | Operator::If { .. } => {
                    self.dead = Some(nesting + 1);
                    return Ok(());
                }
                Operator::End => {
                    if nesting > 0 {
                        self.dead = Some(nesting - 1);
                        return Ok(());
                    }
                    self.dead = None;
                }
                Operator::Else => {
                    if nesting > 0 {
                        return Ok(());
                    }
                    self.dead = None;
                }
                _ => return Ok(()),
            }
        }

        match op {
            // ── Control flow ────────────────────────────────────────────
            Operator::Block { blockty } => {
                let ret = self.block_result(blockty)?;
                self.blocks.push_block(BlockKind::Block, ret);
            }

            Operator::Loop { blockty } => {
                let ret = self.block_result(blockty)?;
                let id = self.blocks.push_block(BlockKind::Loop, ret);
                self.line(format!("label{}:;", id));
            }

            Operator::If { blockty } => {
                let ret = self.block_result(blockty)?;
                let cond = self.pop()?;
                self.line(format!("if ({}) {{", cond));
                self.blocks.push_block(BlockKind::If, ret);
            }

            Operator::Else => {
                let inner_indent = self.indent();
                let block = self
                    .blocks
                    .innermost()
                    .context("else without an enclosing if")?;
                if block.kind != BlockKind::If {
                    bail!("else without an enclosing if");
                }
                if let Some((ret, _)) = block.ret.clone() {
                    // The then arm may have ended in a branch, leaving no
                    // value behind.
                    if !block.stack.is_empty() {
                        let (expr, _) = block.stack.pop()?;
                        self.lines
                            .push(format!("{}{} = {};", inner_indent, ret, expr));
                    }
                }
                let block = self.blocks.innermost().context("else lost its frame")?;
                block.stack.reset();
                let outer = self.blocks.indent_level() as usize; // includes this frame
                self.lines
                    .push(format!("{}}} else {{", "\t".repeat(outer)));
            }

            Operator::End => {
                if self.blocks.depth() == 0 {
                    // Function end: materialise the implicit return.
                    if self.result.is_some() && !self.blocks.scope().is_empty() {
                        let expr = self.pop()?;
                        self.line(format!("return {};", expr));
                    }
                    return Ok(());
                }
                let inner_indent = self.indent();
                let mut block = self.blocks.pop_block()?;
                let outer_indent = self.indent();
                let assigned = match (&block.ret, block.stack.is_empty()) {
                    (Some((name, _)), false) => {
                        let (expr, _) = block.stack.pop()?;
                        Some((name.clone(), expr))
                    }
                    _ => None,
                };
                match block.kind {
                    BlockKind::If => {
                        if let Some((name, expr)) = assigned {
                            self.lines
                                .push(format!("{}{} = {};", inner_indent, name, expr));
                        }
                        self.lines.push(format!("{}}}", outer_indent));
                    }
                    BlockKind::Block => {
                        if let Some((name, expr)) = assigned {
                            self.lines
                                .push(format!("{}{} = {};", outer_indent, name, expr));
                        }
                        self.lines
                            .push(format!("{}label{}:;", outer_indent, block.id));
                    }
                    BlockKind::Loop => {
                        if let Some((name, expr)) = assigned {
                            self.lines
                                .push(format!("{}{} = {};", outer_indent, name, expr));
                        }
                    }
                }
                if let Some((name, ty)) = block.ret {
                    self.blocks.scope().push_var(name, ty);
                }
            }

            Operator::Br { relative_depth } => {
                self.emit_branch(*relative_depth)?;
                self.dead = Some(0);
            }

            Operator::BrIf { relative_depth } => {
                let cond = self.pop()?;
                // Any carried value is peeked, not popped: the not-taken
                // path still owns it. Its binding must land before the
                // guard so both paths read an assigned variable.
                let target = self.blocks.peep_block_level(*relative_depth);
                let needs_value = match &target {
                    BranchTarget::Label { ret, .. } => ret.is_some(),
                    BranchTarget::FunctionExit => self.result.is_some(),
                };
                let value = if needs_value && !self.blocks.scope().is_empty() {
                    let indent = self.indent();
                    let (hoist, expr) = self.blocks.peep(&indent)?;
                    self.lines.extend(hoist);
                    Some(expr)
                } else {
                    None
                };
                self.line(format!("if ({}) {{", cond));
                self.blocks.push_temp_indent();
                match target {
                    BranchTarget::Label { id, ret } => {
                        if let (Some(ret), Some(v)) = (ret, &value) {
                            self.line(format!("{} = {};", ret, v));
                        }
                        self.line(format!("goto label{};", id));
                    }
                    BranchTarget::FunctionExit => match value {
                        Some(v) => self.line(format!("return {};", v)),
                        None => self.line("return;".to_string()),
                    },
                }
                self.blocks.pop_temp_indent();
                self.line("}".to_string());
            }

            Operator::BrTable { targets } => {
                let index = self.pop()?;
                let depths: Vec<u32> = targets
                    .targets()
                    .collect::<Result<Vec<_>, _>>()
                    .context("reading br_table targets")?;
                let resolved: Vec<BranchTarget> = depths
                    .iter()
                    .chain(std::iter::once(&targets.default()))
                    .map(|d| self.blocks.peep_block_level(*d))
                    .collect();
                // A single materialisation serves every value-carrying arm.
                let carries_value = resolved.iter().any(|t| match t {
                    BranchTarget::Label { ret, .. } => ret.is_some(),
                    BranchTarget::FunctionExit => self.result.is_some(),
                });
                let value = if carries_value && !self.blocks.scope().is_empty() {
                    let indent = self.indent();
                    let (hoist, expr) = self.blocks.peep(&indent)?;
                    self.lines.extend(hoist);
                    self.pop()?;
                    Some(expr)
                } else {
                    None
                };
                let has_result = self.result.is_some();
                self.line(format!("switch ({}) {{", index));
                let (default, cases) = resolved.split_last().context("br_table without default")?;
                for (value_idx, target) in cases.iter().enumerate() {
                    let action = branch_action(target, value.as_deref(), has_result);
                    self.line(format!("case {}: {}", value_idx, action));
                }
                self.line(format!(
                    "default: {}",
                    branch_action(default, value.as_deref(), has_result)
                ));
                self.line("}".to_string());
                self.dead = Some(0);
            }

            Operator::Return => {
                if self.result.is_some() && !self.blocks.scope().is_empty() {
                    let expr = self.pop()?;
                    self.line(format!("return {};", expr));
                } else {
                    self.line("return;".to_string());
                }
                self.dead = Some(0);
            }

            Operator::Unreachable => {
                self.line("assert(false);".to_string());
                self.dead = Some(0);
            }

            Operator::Nop => {}

            Operator::Drop => {
                self.pop()?;
            }

            Operator::Select => {
                let cond = self.pop()?;
                let on_zero = self.pop()?;
                let (on_nonzero, ty) = self.blocks.scope().pop()?;
                self.push(
                    format!("(({}) ? ({}) : ({}))", cond, on_nonzero, on_zero),
                    ty,
                );
            }

            // ── Calls ───────────────────────────────────────────────────
            Operator::Call { function_index } => {
                let func = self
                    .module
                    .funcs
                    .get(*function_index as usize)
                    .with_context(|| format!("call to unknown function {}", function_index))?;
                let sig = self.module.func_type(*function_index)?;
                let result = single_result(sig)?;
                let param_count = sig.params().len();
                // A callee may write globals and memory, never our locals.
                self.flush("global")?;
                self.flush("mem_->")?;
                let args = self.pop_args(param_count)?;
                let name = &self.func_names[*function_index as usize];
                let callee = if func.is_import() {
                    format!("import_->{}", name)
                } else {
                    name.clone()
                };
                self.emit_call(&callee, &args, result)?;
            }

            Operator::CallIndirect {
                type_index,
                table_index,
            } => {
                if *table_index != 0 {
                    bail!("call_indirect through table {} is not supported", table_index);
                }
                if self.module.tables.is_empty() {
                    bail!("call_indirect in a module without a table");
                }
                let sig = self
                    .module
                    .types
                    .get(*type_index as usize)
                    .with_context(|| format!("call_indirect unknown type {}", type_index))?
                    .clone();
                let result = single_result(&sig)?;
                self.flush("global")?;
                self.flush("mem_->")?;
                let index = self.pop()?;
                let args = self.pop_args(sig.params().len())?;
                let fp = self.blocks.temps.fresh();
                self.line(format!(
                    "Type{} {} = funcs_[table_[0][{}]].type{}_;",
                    type_index, fp, index, type_index
                ));
                self.emit_call(&format!("(this->*{})", fp), &args, result)?;
            }

            // ── Locals and globals ──────────────────────────────────────
            Operator::LocalGet { local_index } => {
                let ty = self.local_type(*local_index)?;
                self.push(format!("local{}_", local_index), ty);
            }

            Operator::LocalSet { local_index } => {
                self.local_type(*local_index)?;
                let name = format!("local{}_", local_index);
                self.flush(&name)?;
                let expr = self.pop()?;
                self.line(format!("{} = {};", name, expr));
            }

            Operator::LocalTee { local_index } => {
                self.local_type(*local_index)?;
                let name = format!("local{}_", local_index);
                let indent = self.indent();
                let (hoist, expr) = self.blocks.peep(&indent)?;
                self.lines.extend(hoist);
                self.flush(&name)?;
                self.line(format!("{} = {};", name, expr));
            }

            Operator::GlobalGet { global_index } => {
                let ty = self.global_type(*global_index)?;
                self.push(format!("global{}_", global_index), ty);
            }

            Operator::GlobalSet { global_index } => {
                self.global_type(*global_index)?;
                let name = format!("global{}_", global_index);
                self.flush(&name)?;
                let expr = self.pop()?;
                self.line(format!("{} = {};", name, expr));
            }

            // ── Constants ───────────────────────────────────────────────
            Operator::I32Const { value } => {
                self.push(value.to_string(), ValType::I32);
            }

            Operator::I64Const { value } => {
                // The most negative literal has no direct C++ spelling.
                let expr = if *value == i64::MIN {
                    "(-9223372036854775807LL - 1LL)".to_string()
                } else {
                    format!("{}LL", value)
                };
                self.push(expr, ValType::I64);
            }

            Operator::F32Const { value } => {
                let bits = value.bits();
                if bits == 0 {
                    self.push("0.0f".to_string(), ValType::F32);
                } else {
                    let indent = self.indent();
                    let holder = self.blocks.temps.fresh();
                    self.lines
                        .push(format!("{}uint32_t {} = 0x{:x};", indent, holder, bits));
                    let lhs = self.blocks.scope().push_lhs(ValType::F32);
                    self.lines.push(format!(
                        "{}float {} = *reinterpret_cast<float*>(&{});",
                        indent, lhs, holder
                    ));
                }
            }

            Operator::F64Const { value } => {
                let bits = value.bits();
                if bits == 0 {
                    self.push("0.0".to_string(), ValType::F64);
                } else {
                    let indent = self.indent();
                    let holder = self.blocks.temps.fresh();
                    self.lines
                        .push(format!("{}uint64_t {} = 0x{:x}ULL;", indent, holder, bits));
                    let lhs = self.blocks.scope().push_lhs(ValType::F64);
                    self.lines.push(format!(
                        "{}double {} = *reinterpret_cast<double*>(&{});",
                        indent, lhs, holder
                    ));
                }
            }

            // ── Memory ──────────────────────────────────────────────────
            Operator::I32Load { memarg } => self.load(ValType::I32, memarg.offset, |a| {
                format!("mem_->LoadInt32({})", a)
            })?,
            Operator::I64Load { memarg } => self.load(ValType::I64, memarg.offset, |a| {
                format!("mem_->LoadInt64({})", a)
            })?,
            Operator::F32Load { memarg } => self.load(ValType::F32, memarg.offset, |a| {
                format!("mem_->LoadFloat32({})", a)
            })?,
            Operator::F64Load { memarg } => self.load(ValType::F64, memarg.offset, |a| {
                format!("mem_->LoadFloat64({})", a)
            })?,
            Operator::I32Load8S { memarg } => self.load(ValType::I32, memarg.offset, |a| {
                format!("static_cast<int32_t>(mem_->LoadInt8({}))", a)
            })?,
            Operator::I32Load8U { memarg } => self.load(ValType::I32, memarg.offset, |a| {
                format!("static_cast<int32_t>(mem_->LoadUint8({}))", a)
            })?,
            Operator::I32Load16S { memarg } => self.load(ValType::I32, memarg.offset, |a| {
                format!("static_cast<int32_t>(mem_->LoadInt16({}))", a)
            })?,
            Operator::I32Load16U { memarg } => self.load(ValType::I32, memarg.offset, |a| {
                format!("static_cast<int32_t>(mem_->LoadUint16({}))", a)
            })?,
            Operator::I64Load8S { memarg } => self.load(ValType::I64, memarg.offset, |a| {
                format!("static_cast<int64_t>(mem_->LoadInt8({}))", a)
            })?,
            Operator::I64Load8U { memarg } => self.load(ValType::I64, memarg.offset, |a| {
                format!("static_cast<int64_t>(mem_->LoadUint8({}))", a)
            })?,
            Operator::I64Load16S { memarg } => self.load(ValType::I64, memarg.offset, |a| {
                format!("static_cast<int64_t>(mem_->LoadInt16({}))", a)
            })?,
            Operator::I64Load16U { memarg } => self.load(ValType::I64, memarg.offset, |a| {
                format!("static_cast<int64_t>(mem_->LoadUint16({}))", a)
            })?,
            Operator::I64Load32S { memarg } => self.load(ValType::I64, memarg.offset, |a| {
                format!("static_cast<int64_t>(mem_->LoadInt32({}))", a)
            })?,
            Operator::I64Load32U { memarg } => self.load(ValType::I64, memarg.offset, |a| {
                format!("static_cast<int64_t>(mem_->LoadUint32({}))", a)
            })?,

            Operator::I32Store { memarg } => self.store(memarg.offset, |a, v| {
                format!("mem_->StoreInt32({}, {})", a, v)
            })?,
            Operator::I64Store { memarg } => self.store(memarg.offset, |a, v| {
                format!("mem_->StoreInt64({}, {})", a, v)
            })?,
            Operator::F32Store { memarg } => self.store(memarg.offset, |a, v| {
                format!("mem_->StoreFloat32({}, {})", a, v)
            })?,
            Operator::F64Store { memarg } => self.store(memarg.offset, |a, v| {
                format!("mem_->StoreFloat64({}, {})", a, v)
            })?,
            Operator::I32Store8 { memarg } => self.store(memarg.offset, |a, v| {
                format!("mem_->StoreInt8({}, static_cast<int8_t>({}))", a, v)
            })?,
            Operator::I32Store16 { memarg } => self.store(memarg.offset, |a, v| {
                format!("mem_->StoreInt16({}, static_cast<int16_t>({}))", a, v)
            })?,
            Operator::I64Store8 { memarg } => self.store(memarg.offset, |a, v| {
                format!("mem_->StoreInt8({}, static_cast<int8_t>({}))", a, v)
            })?,
            Operator::I64Store16 { memarg } => self.store(memarg.offset, |a, v| {
                format!("mem_->StoreInt16({}, static_cast<int16_t>({}))", a, v)
            })?,
            Operator::I64Store32 { memarg } => self.store(memarg.offset, |a, v| {
                format!("mem_->StoreInt32({}, static_cast<int32_t>({}))", a, v)
            })?,

            Operator::MemorySize { mem: 0, .. } => {
                self.push("mem_->GetSize()".to_string(), ValType::I32);
            }

            Operator::MemoryGrow { mem: 0, .. } => {
                // Growing invalidates pending size and content reads.
                self.flush("mem_->")?;
                let delta = self.pop()?;
                let indent = self.indent();
                let lhs = self.blocks.scope().push_lhs(ValType::I32);
                self.lines.push(format!(
                    "{}int32_t {} = mem_->Grow({});",
                    indent, lhs, delta
                ));
            }

            // ── i32 arithmetic and comparison ───────────────────────────
            Operator::I32Add => self.binop(ValType::I32, |a, b| format!("({} + {})", a, b))?,
            Operator::I32Sub => self.binop(ValType::I32, |a, b| format!("({} - {})", a, b))?,
            Operator::I32Mul => self.binop(ValType::I32, |a, b| format!("({} * {})", a, b))?,
            Operator::I32DivS => self.binop(ValType::I32, |a, b| format!("({} / {})", a, b))?,
            Operator::I32DivU => self.binop(ValType::I32, |a, b| {
                format!(
                    "static_cast<int32_t>(static_cast<uint32_t>({}) / static_cast<uint32_t>({}))",
                    a, b
                )
            })?,
            Operator::I32RemS => self.binop(ValType::I32, |a, b| format!("({} % {})", a, b))?,
            Operator::I32RemU => self.binop(ValType::I32, |a, b| {
                format!(
                    "static_cast<int32_t>(static_cast<uint32_t>({}) % static_cast<uint32_t>({}))",
                    a, b
                )
            })?,
            Operator::I32And => self.binop(ValType::I32, |a, b| format!("({} & {})", a, b))?,
            Operator::I32Or => self.binop(ValType::I32, |a, b| format!("({} | {})", a, b))?,
            Operator::I32Xor => self.binop(ValType::I32, |a, b| format!("({} ^ {})", a, b))?,
            Operator::I32Shl => self.binop(ValType::I32, |a, b| format!("({} << {})", a, b))?,
            Operator::I32ShrS => self.binop(ValType::I32, |a, b| format!("({} >> {})", a, b))?,
            Operator::I32ShrU => self.binop(ValType::I32, |a, b| {
                format!(
                    "static_cast<int32_t>(static_cast<uint32_t>({}) >> {})",
                    a, b
                )
            })?,
            Operator::I32Rotl => self.binop(ValType::I32, |a, b| {
                format!(
                    "static_cast<int32_t>(Bits::RotateLeft(static_cast<uint32_t>({}), {}))",
                    a, b
                )
            })?,
            Operator::I32Rotr => self.binop(ValType::I32, |a, b| {
                format!(
                    "static_cast<int32_t>(Bits::RotateLeft(static_cast<uint32_t>({}), -({})))",
                    a, b
                )
            })?,

            Operator::I32Eqz => self.unop(ValType::I32, |a| format!("({} == 0)", a))?,
            Operator::I32Eq => self.binop(ValType::I32, |a, b| format!("({} == {})", a, b))?,
            Operator::I32Ne => self.binop(ValType::I32, |a, b| format!("({} != {})", a, b))?,
            Operator::I32LtS => self.binop(ValType::I32, |a, b| format!("({} < {})", a, b))?,
            Operator::I32LtU => self.binop(ValType::I32, |a, b| {
                format!(
                    "(static_cast<uint32_t>({}) < static_cast<uint32_t>({}))",
                    a, b
                )
            })?,
            Operator::I32GtS => self.binop(ValType::I32, |a, b| format!("({} > {})", a, b))?,
            Operator::I32GtU => self.binop(ValType::I32, |a, b| {
                format!(
                    "(static_cast<uint32_t>({}) > static_cast<uint32_t>({}))",
                    a, b
                )
            })?,
            Operator::I32LeS => self.binop(ValType::I32, |a, b| format!("({} <= {})", a, b))?,
            Operator::I32LeU => self.binop(ValType::I32, |a, b| {
                format!(
                    "(static_cast<uint32_t>({}) <= static_cast<uint32_t>({}))",
                    a, b
                )
            })?,
            Operator::I32GeS => self.binop(ValType::I32, |a, b| format!("({} >= {})", a, b))?,
            Operator::I32GeU => self.binop(ValType::I32, |a, b| {
                format!(
                    "(static_cast<uint32_t>({}) >= static_cast<uint32_t>({}))",
                    a, b
                )
            })?,

            Operator::I32Clz => self.unop(ValType::I32, |a| {
                format!(
                    "static_cast<int32_t>(Bits::LeadingZeros(static_cast<uint32_t>({})))",
                    a
                )
            })?,
            Operator::I32Ctz => self.unop(ValType::I32, |a| {
                format!(
                    "static_cast<int32_t>(Bits::TrailingZeros(static_cast<uint32_t>({})))",
                    a
                )
            })?,
            Operator::I32Popcnt => self.unop(ValType::I32, |a| {
                format!(
                    "static_cast<int32_t>(Bits::OnesCount(static_cast<uint32_t>({})))",
                    a
                )
            })?,

            // ── i64 arithmetic and comparison ───────────────────────────
            Operator::I64Add => self.binop(ValType::I64, |a, b| format!("({} + {})", a, b))?,
            Operator::I64Sub => self.binop(ValType::I64, |a, b| format!("({} - {})", a, b))?,
            Operator::I64Mul => self.binop(ValType::I64, |a, b| format!("({} * {})", a, b))?,
            Operator::I64DivS => self.binop(ValType::I64, |a, b| format!("({} / {})", a, b))?,
            Operator::I64DivU => self.binop(ValType::I64, |a, b| {
                format!(
                    "static_cast<int64_t>(static_cast<uint64_t>({}) / static_cast<uint64_t>({}))",
                    a, b
                )
            })?,
            Operator::I64RemS => self.binop(ValType::I64, |a, b| format!("({} % {})", a, b))?,
            Operator::I64RemU => self.binop(ValType::I64, |a, b| {
                format!(
                    "static_cast<int64_t>(static_cast<uint64_t>({}) % static_cast<uint64_t>({}))",
                    a, b
                )
            })?,
            Operator::I64And => self.binop(ValType::I64, |a, b| format!("({} & {})", a, b))?,
            Operator::I64Or => self.binop(ValType::I64, |a, b| format!("({} | {})", a, b))?,
            Operator::I64Xor => self.binop(ValType::I64, |a, b| format!("({} ^ {})", a, b))?,
            // 64-bit shift counts narrow to the i32 carrier.
            Operator::I64Shl => self.binop(ValType::I64, |a, b| {
                format!("({} << static_cast<int32_t>({}))", a, b)
            })?,
            Operator::I64ShrS => self.binop(ValType::I64, |a, b| {
                format!("({} >> static_cast<int32_t>({}))", a, b)
            })?,
            Operator::I64ShrU => self.binop(ValType::I64, |a, b| {
                format!(
                    "static_cast<int64_t>(static_cast<uint64_t>({}) >> static_cast<int32_t>({}))",
                    a, b
                )
            })?,
            Operator::I64Rotl => self.binop(ValType::I64, |a, b| {
                format!(
                    "static_cast<int64_t>(Bits::RotateLeft64(static_cast<uint64_t>({}), static_cast<int32_t>({})))",
                    a, b
                )
            })?,
            Operator::I64Rotr => self.binop(ValType::I64, |a, b| {
                format!(
                    "static_cast<int64_t>(Bits::RotateLeft64(static_cast<uint64_t>({}), -static_cast<int32_t>({})))",
                    a, b
                )
            })?,

            Operator::I64Eqz => self.unop(ValType::I32, |a| format!("({} == 0)", a))?,
            Operator::I64Eq => self.binop(ValType::I32, |a, b| format!("({} == {})", a, b))?,
            Operator::I64Ne => self.binop(ValType::I32, |a, b| format!("({} != {})", a, b))?,
            Operator::I64LtS => self.binop(ValType::I32, |a, b| format!("({} < {})", a, b))?,
            Operator::I64LtU => self.binop(ValType::I32, |a, b| {
                format!(
                    "(static_cast<uint64_t>({}) < static_cast<uint64_t>({}))",
                    a, b
                )
            })?,
            Operator::I64GtS => self.binop(ValType::I32, |a, b| format!("({} > {})", a, b))?,
            Operator::I64GtU => self.binop(ValType::I32, |a, b| {
                format!(
                    "(static_cast<uint64_t>({}) > static_cast<uint64_t>({}))",
                    a, b
                )
            })?,
            Operator::I64LeS => self.binop(ValType::I32, |a, b| format!("({} <= {})", a, b))?,
            Operator::I64LeU => self.binop(ValType::I32, |a, b| {
                format!(
                    "(static_cast<uint64_t>({}) <= static_cast<uint64_t>({}))",
                    a, b
                )
            })?,
            Operator::I64GeS => self.binop(ValType::I32, |a, b| format!("({} >= {})", a, b))?,
            Operator::I64GeU => self.binop(ValType::I32, |a, b| {
                format!(
                    "(static_cast<uint64_t>({}) >= static_cast<uint64_t>({}))",
                    a, b
                )
            })?,

            Operator::I64Clz => self.unop(ValType::I64, |a| {
                format!(
                    "static_cast<int64_t>(Bits::LeadingZeros64(static_cast<uint64_t>({})))",
                    a
                )
            })?,
            Operator::I64Ctz => self.unop(ValType::I64, |a| {
                format!(
                    "static_cast<int64_t>(Bits::TrailingZeros64(static_cast<uint64_t>({})))",
                    a
                )
            })?,
            Operator::I64Popcnt => self.unop(ValType::I64, |a| {
                format!(
                    "static_cast<int64_t>(Bits::OnesCount64(static_cast<uint64_t>({})))",
                    a
                )
            })?,

            // ── f32 ─────────────────────────────────────────────────────
            Operator::F32Add => self.binop(ValType::F32, |a, b| format!("({} + {})", a, b))?,
            Operator::F32Sub => self.binop(ValType::F32, |a, b| format!("({} - {})", a, b))?,
            Operator::F32Mul => self.binop(ValType::F32, |a, b| format!("({} * {})", a, b))?,
            Operator::F32Div => self.binop(ValType::F32, |a, b| format!("({} / {})", a, b))?,
            Operator::F32Min => {
                self.binop(ValType::F32, |a, b| format!("std::min({}, {})", a, b))?
            }
            Operator::F32Max => {
                self.binop(ValType::F32, |a, b| format!("std::max({}, {})", a, b))?
            }
            Operator::F32Copysign => self.binop(ValType::F32, |a, b| {
                format!("std::copysign({}, {})", a, b)
            })?,
            Operator::F32Abs => self.unop(ValType::F32, |a| format!("std::abs({})", a))?,
            Operator::F32Neg => self.unop(ValType::F32, |a| format!("(-({}))", a))?,
            Operator::F32Ceil => self.unop(ValType::F32, |a| format!("std::ceil({})", a))?,
            Operator::F32Floor => self.unop(ValType::F32, |a| format!("std::floor({})", a))?,
            Operator::F32Trunc => self.unop(ValType::F32, |a| format!("std::trunc({})", a))?,
            Operator::F32Nearest => self.unop(ValType::F32, |a| format!("Math::Round({})", a))?,
            Operator::F32Sqrt => self.unop(ValType::F32, |a| format!("std::sqrt({})", a))?,
            Operator::F32Eq => self.binop(ValType::I32, |a, b| format!("({} == {})", a, b))?,
            Operator::F32Ne => self.binop(ValType::I32, |a, b| format!("({} != {})", a, b))?,
            Operator::F32Lt => self.binop(ValType::I32, |a, b| format!("({} < {})", a, b))?,
            Operator::F32Gt => self.binop(ValType::I32, |a, b| format!("({} > {})", a, b))?,
            Operator::F32Le => self.binop(ValType::I32, |a, b| format!("({} <= {})", a, b))?,
            Operator::F32Ge => self.binop(ValType::I32, |a, b| format!("({} >= {})", a, b))?,

            // ── f64 ─────────────────────────────────────────────────────
            Operator::F64Add => self.binop(ValType::F64, |a, b| format!("({} + {})", a, b))?,
            Operator::F64Sub => self.binop(ValType::F64, |a, b| format!("({} - {})", a, b))?,
            Operator::F64Mul => self.binop(ValType::F64, |a, b| format!("({} * {})", a, b))?,
            Operator::F64Div => self.binop(ValType::F64, |a, b| format!("({} / {})", a, b))?,
            Operator::F64Min => {
                self.binop(ValType::F64, |a, b| format!("std::min({}, {})", a, b))?
            }
            Operator::F64Max => {
                self.binop(ValType::F64, |a, b| format!("std::max({}, {})", a, b))?
            }
            Operator::F64Copysign => self.binop(ValType::F64, |a, b| {
                format!("std::copysign({}, {})", a, b)
            })?,
            Operator::F64Abs => self.unop(ValType::F64, |a| format!("std::abs({})", a))?,
            Operator::F64Neg => self.unop(ValType::F64, |a| format!("(-({}))", a))?,
            Operator::F64Ceil => self.unop(ValType::F64, |a| format!("std::ceil({})", a))?,
            Operator::F64Floor => self.unop(ValType::F64, |a| format!("std::floor({})", a))?,
            Operator::F64Trunc => self.unop(ValType::F64, |a| format!("std::trunc({})", a))?,
            Operator::F64Nearest => self.unop(ValType::F64, |a| format!("Math::Round({})", a))?,
            Operator::F64Sqrt => self.unop(ValType::F64, |a| format!("std::sqrt({})", a))?,
            Operator::F64Eq => self.binop(ValType::I32, |a, b| format!("({} == {})", a, b))?,
            Operator::F64Ne => self.binop(ValType::I32, |a, b| format!("({} != {})", a, b))?,
            Operator::F64Lt => self.binop(ValType::I32, |a, b| format!("({} < {})", a, b))?,
            Operator::F64Gt => self.binop(ValType::I32, |a, b| format!("({} > {})", a, b))?,
            Operator::F64Le => self.binop(ValType::I32, |a, b| format!("({} <= {})", a, b))?,
            Operator::F64Ge => self.binop(ValType::I32, |a, b| format!("({} >= {})", a, b))?,

            // ── Conversions ─────────────────────────────────────────────
            Operator::I32WrapI64 => {
                self.unop(ValType::I32, |a| format!("static_cast<int32_t>({})", a))?
            }
            Operator::I64ExtendI32S => {
                self.unop(ValType::I64, |a| format!("static_cast<int64_t>({})", a))?
            }
            Operator::I64ExtendI32U => self.unop(ValType::I64, |a| {
                format!("static_cast<int64_t>(static_cast<uint32_t>({}))", a)
            })?,
            Operator::I32Extend8S => self.unop(ValType::I32, |a| {
                format!("static_cast<int32_t>(static_cast<int8_t>({}))", a)
            })?,
            Operator::I32Extend16S => self.unop(ValType::I32, |a| {
                format!("static_cast<int32_t>(static_cast<int16_t>({}))", a)
            })?,
            Operator::I64Extend8S => self.unop(ValType::I64, |a| {
                format!("static_cast<int64_t>(static_cast<int8_t>({}))", a)
            })?,
            Operator::I64Extend16S => self.unop(ValType::I64, |a| {
                format!("static_cast<int64_t>(static_cast<int16_t>({}))", a)
            })?,
            Operator::I64Extend32S => self.unop(ValType::I64, |a| {
                format!("static_cast<int64_t>(static_cast<int32_t>({}))", a)
            })?,

            Operator::I32TruncF32S | Operator::I32TruncF64S => {
                self.unop(ValType::I32, |a| format!("static_cast<int32_t>({})", a))?
            }
            Operator::I32TruncF32U | Operator::I32TruncF64U => self.unop(ValType::I32, |a| {
                format!("static_cast<int32_t>(static_cast<uint32_t>({}))", a)
            })?,
            Operator::I64TruncF32S | Operator::I64TruncF64S => {
                self.unop(ValType::I64, |a| format!("static_cast<int64_t>({})", a))?
            }
            Operator::I64TruncF32U | Operator::I64TruncF64U => self.unop(ValType::I64, |a| {
                format!("static_cast<int64_t>(static_cast<uint64_t>({}))", a)
            })?,

            Operator::I32TruncSatF32S | Operator::I32TruncSatF64S => {
                self.unop(ValType::I32, |a| format!("Math::TruncSat<int32_t>({})", a))?
            }
            Operator::I32TruncSatF32U | Operator::I32TruncSatF64U => {
                self.unop(ValType::I32, |a| {
                    format!("static_cast<int32_t>(Math::TruncSat<uint32_t>({}))", a)
                })?
            }
            Operator::I64TruncSatF32S | Operator::I64TruncSatF64S => {
                self.unop(ValType::I64, |a| format!("Math::TruncSat<int64_t>({})", a))?
            }
            Operator::I64TruncSatF32U | Operator::I64TruncSatF64U => {
                self.unop(ValType::I64, |a| {
                    format!("static_cast<int64_t>(Math::TruncSat<uint64_t>({}))", a)
                })?
            }

            Operator::F32ConvertI32S => {
                self.unop(ValType::F32, |a| format!("static_cast<float>({})", a))?
            }
            Operator::F32ConvertI32U => self.unop(ValType::F32, |a| {
                format!("static_cast<float>(static_cast<uint32_t>({}))", a)
            })?,
            Operator::F32ConvertI64S => {
                self.unop(ValType::F32, |a| format!("static_cast<float>({})", a))?
            }
            Operator::F32ConvertI64U => self.unop(ValType::F32, |a| {
                format!("static_cast<float>(static_cast<uint64_t>({}))", a)
            })?,
            Operator::F64ConvertI32S => {
                self.unop(ValType::F64, |a| format!("static_cast<double>({})", a))?
            }
            Operator::F64ConvertI32U => self.unop(ValType::F64, |a| {
                format!("static_cast<double>(static_cast<uint32_t>({}))", a)
            })?,
            Operator::F64ConvertI64S => {
                self.unop(ValType::F64, |a| format!("static_cast<double>({})", a))?
            }
            Operator::F64ConvertI64U => self.unop(ValType::F64, |a| {
                format!("static_cast<double>(static_cast<uint64_t>({}))", a)
            })?,
            Operator::F32DemoteF64 => {
                self.unop(ValType::F32, |a| format!("static_cast<float>({})", a))?
            }
            Operator::F64PromoteF32 => {
                self.unop(ValType::F64, |a| format!("static_cast<double>({})", a))?
            }

            Operator::I32ReinterpretF32
            | Operator::I64ReinterpretF64
            | Operator::F32ReinterpretI32
            | Operator::F64ReinterpretI64 => {
                bail!("reinterpret operators are not supported");
            }

            other => bail!("unsupported operator: {:?}", other),
        }
        Ok(())
    }
}

/// Address expression with the static memarg offset folded in.
fn address(addr: &str, offset: u64) -> String {
    if offset == 0 {
        addr.to_string()
    } else {
        format!("{} + {}", addr, offset)
    }
}

/// One `case`/`default` action of a lowered br_table.
fn branch_action(target: &BranchTarget, value: Option<&str>, has_result: bool) -> String {
    match target {
        BranchTarget::Label { id, ret: Some(ret) } => match value {
            Some(v) => format!("{} = {}; goto label{};", ret, v, id),
            None => format!("goto label{};", id),
        },
        BranchTarget::Label { id, ret: None } => format!("goto label{};", id),
        BranchTarget::FunctionExit => match value.filter(|_| has_result) {
            Some(v) => format!("return {};", v),
            None => "return;".to_string(),
        },
    }
}
