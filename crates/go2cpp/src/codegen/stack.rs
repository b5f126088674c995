//! Symbolic operand stack for one control region.
//!
//! The lowerer keeps Wasm operand-stack slots as C++ expression strings for
//! as long as that is safe. An entry is either a raw expression (not yet
//! bound to storage) or a declared placeholder: a variable name whose
//! declaration line has already been emitted. Raw expressions that read
//! mutable storage must be lifted into placeholders before any statement
//! that could change what they read; see [`StackVars::flush_if_needed`].
//!
//! Variable names follow a two-level scheme `stackG_I_`, where `G` is the
//! group of the owning block (group 0 is reserved for temporaries, the
//! function root is group 1) and `I` counts within the group. The
//! aggregation pass later rewrites these to compact per-type names.

use anyhow::{bail, Result};
use wasmparser::ValType;

use crate::codegen::types::cpp_type;

/// Allocates `stack0_I_` names for temporaries that belong to no block.
#[derive(Debug, Default)]
pub struct TempVars {
    counter: u32,
}

impl TempVars {
    pub fn fresh(&mut self) -> String {
        let name = format!("stack0_{}_", self.counter);
        self.counter += 1;
        name
    }
}

/// One operand-stack slot.
#[derive(Debug, Clone)]
struct StackVar {
    expr: String,
    ty: ValType,
    /// True once the entry is a declared variable name rather than a raw
    /// expression.
    declared: bool,
}

/// The symbolic stack scope owned by one block.
#[derive(Debug)]
pub struct StackVars {
    group: u32,
    counter: u32,
    vars: Vec<StackVar>,
}

impl StackVars {
    pub fn new(group: u32) -> Self {
        StackVars {
            group,
            counter: 0,
            vars: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Allocate a fresh variable name in this scope without pushing it.
    pub fn fresh_var(&mut self) -> String {
        let name = format!("stack{}_{}_", self.group, self.counter);
        self.counter += 1;
        name
    }

    /// Push a raw expression.
    pub fn push_expr(&mut self, expr: impl Into<String>, ty: ValType) {
        self.vars.push(StackVar {
            expr: expr.into(),
            ty,
            declared: false,
        });
    }

    /// Allocate and push a declared placeholder; the caller emits the
    /// `<ctype> <name> = …;` line for it.
    pub fn push_lhs(&mut self, ty: ValType) -> String {
        let name = self.fresh_var();
        self.vars.push(StackVar {
            expr: name.clone(),
            ty,
            declared: true,
        });
        name
    }

    /// Push an already-declared variable name (a block's return slot).
    pub fn push_var(&mut self, name: impl Into<String>, ty: ValType) {
        self.vars.push(StackVar {
            expr: name.into(),
            ty,
            declared: true,
        });
    }

    /// Pop the top entry.
    pub fn pop(&mut self) -> Result<(String, ValType)> {
        match self.vars.pop() {
            Some(v) => Ok((v.expr, v.ty)),
            None => bail!("operand stack underflow"),
        }
    }

    /// Return the top expression without popping.
    ///
    /// A raw expression that could observe a later side effect is lifted
    /// into a declared temporary first; the lines to emit come back with
    /// the (possibly renamed) expression.
    pub fn peep(&mut self, temps: &mut TempVars, indent: &str) -> Result<(Vec<String>, String)> {
        let Some(top) = self.vars.last_mut() else {
            bail!("operand stack underflow in peep");
        };
        if top.declared || is_literal(&top.expr) {
            return Ok((Vec::new(), top.expr.clone()));
        }
        let name = temps.fresh();
        let line = format!(
            "{}{} {} = {};",
            indent,
            cpp_type(top.ty)?,
            name,
            top.expr
        );
        top.expr = name.clone();
        top.declared = true;
        Ok((vec![line], name))
    }

    /// Materialise pending reads that a following statement would
    /// invalidate.
    ///
    /// When the stack holds at least two entries, every raw entry below
    /// the top that textually contains `keyword` is lifted into a declared
    /// variable. The top is exempt: it is consumed by the very statement
    /// being emitted.
    pub fn flush_if_needed(&mut self, keyword: &str, indent: &str) -> Result<Vec<String>> {
        if self.vars.len() < 2 {
            return Ok(Vec::new());
        }
        let top = self.vars.len() - 1;
        self.flush_below(top, keyword, indent)
    }

    /// Like [`flush_if_needed`](Self::flush_if_needed), but with no exempt
    /// top. Used for enclosing scopes, whose entries are all re-read after
    /// the statement being emitted.
    pub fn flush_enclosing(&mut self, keyword: &str, indent: &str) -> Result<Vec<String>> {
        self.flush_below(self.vars.len(), keyword, indent)
    }

    fn flush_below(&mut self, limit: usize, keyword: &str, indent: &str) -> Result<Vec<String>> {
        if !self.vars[..limit]
            .iter()
            .any(|v| !v.declared && v.expr.contains(keyword))
        {
            return Ok(Vec::new());
        }
        let mut lines = Vec::new();
        for i in 0..limit {
            if self.vars[i].declared || !self.vars[i].expr.contains(keyword) {
                continue;
            }
            let name = format!("stack{}_{}_", self.group, self.counter);
            self.counter += 1;
            lines.push(format!(
                "{}{} {} = {};",
                indent,
                cpp_type(self.vars[i].ty)?,
                name,
                self.vars[i].expr
            ));
            self.vars[i].expr = name;
            self.vars[i].declared = true;
        }
        Ok(lines)
    }

    /// Drop all entries but keep the name counter, so reopened scopes
    /// (the else arm of an if) never reuse a name.
    pub fn reset(&mut self) {
        self.vars.clear();
    }
}

fn is_literal(expr: &str) -> bool {
    !expr.is_empty()
        && expr
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | '.' | 'x' | 'L' | 'f' | 'e' | 'E'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_round_trip() {
        let mut s = StackVars::new(1);
        s.push_expr("(local0_ + 1)", ValType::I32);
        s.push_expr("local1_", ValType::I64);
        let (e, t) = s.pop().unwrap();
        assert_eq!(e, "local1_");
        assert_eq!(t, ValType::I64);
        let (e, t) = s.pop().unwrap();
        assert_eq!(e, "(local0_ + 1)");
        assert_eq!(t, ValType::I32);
        assert!(s.pop().is_err());
    }

    #[test]
    fn push_lhs_names_follow_group_scheme() {
        let mut s = StackVars::new(3);
        assert_eq!(s.push_lhs(ValType::I32), "stack3_0_");
        assert_eq!(s.push_lhs(ValType::F64), "stack3_1_");
    }

    #[test]
    fn flush_materialises_pending_memory_reads() {
        let mut s = StackVars::new(1);
        s.push_expr("mem_->LoadInt32(local0_)", ValType::I32);
        s.push_expr("local1_", ValType::I32);
        let lines = s.flush_if_needed("mem_->", "\t").unwrap();
        assert_eq!(
            lines,
            vec!["\tint32_t stack1_0_ = mem_->LoadInt32(local0_);".to_string()]
        );
        // The flushed entry is now a stable placeholder.
        s.pop().unwrap();
        let (e, _) = s.pop().unwrap();
        assert_eq!(e, "stack1_0_");
    }

    #[test]
    fn flush_leaves_the_top_alone() {
        let mut s = StackVars::new(1);
        s.push_expr("local0_", ValType::I32);
        s.push_expr("mem_->LoadInt32(8)", ValType::I32);
        // Only the top references memory, so nothing below needs lifting.
        assert!(s.flush_if_needed("mem_->", "\t").unwrap().is_empty());
    }

    #[test]
    fn flush_is_a_no_op_on_shallow_stacks() {
        let mut s = StackVars::new(1);
        s.push_expr("mem_->LoadInt32(0)", ValType::I32);
        assert!(s.flush_if_needed("mem_->", "\t").unwrap().is_empty());
    }

    #[test]
    fn peep_hoists_raw_expressions() {
        let mut temps = TempVars::default();
        let mut s = StackVars::new(1);
        s.push_expr("(local0_ + 1)", ValType::I32);
        let (lines, expr) = s.peep(&mut temps, "\t").unwrap();
        assert_eq!(lines, vec!["\tint32_t stack0_0_ = (local0_ + 1);".to_string()]);
        assert_eq!(expr, "stack0_0_");
        // A second peep sees the placeholder and emits nothing.
        let (lines, expr) = s.peep(&mut temps, "\t").unwrap();
        assert!(lines.is_empty());
        assert_eq!(expr, "stack0_0_");
    }

    #[test]
    fn peep_keeps_literals_in_place() {
        let mut temps = TempVars::default();
        let mut s = StackVars::new(1);
        s.push_expr("42", ValType::I32);
        let (lines, expr) = s.peep(&mut temps, "\t").unwrap();
        assert!(lines.is_empty());
        assert_eq!(expr, "42");
    }
}
