//! Textual post-passes over a single function's emitted body.
//!
//! Each pass is a self-contained sub-module. [`run_passes`] applies them in
//! a fixed order; the input is the composed line list (local declarations
//! followed by the lowered body) and the output is the final body text.

use std::collections::HashSet;

pub mod aggregate;
pub mod condition;
pub mod gotos;
pub mod labels;
pub mod locals;

/// Run all passes in order on one function's body lines.
///
/// `no_merge` holds stack-variable names (block return slots) whose
/// declarations must survive the aggregation pass verbatim.
pub fn run_passes(lines: Vec<String>, no_merge: &HashSet<String>) -> Vec<String> {
    let lines = aggregate::run(lines, no_merge);
    let lines = gotos::run(lines);
    let lines = labels::run(lines);
    let lines = condition::run(lines);
    locals::run(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(src: &[&str]) -> Vec<String> {
        src.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn passes_compose_over_a_small_body() {
        let body = lines(&[
            "\tint32_t local1_ = 0;",
            "\tint32_t stack1_0_ = (local0_ + 1);",
            "\tlabel0:;",
            "\tif ((stack1_0_ != 0)) {",
            "\t\tgoto label1;",
            "\t}",
            "\treturn stack1_0_;",
            "\tlabel1:;",
            "\treturn 0;",
        ]);
        let out = run_passes(body, &HashSet::new());
        let text = out.join("\n");
        // stack1_0_ was renamed and its declaration hoisted.
        assert!(text.contains("int32_t i32_0_;"));
        assert!(text.contains("i32_0_ = (local0_ + 1);"));
        assert!(!text.contains("stack1_0_"));
        // label1's return was folded into the goto, label0 never had a goto.
        assert!(text.contains("return 0;"));
        assert!(!text.contains("label0:;"));
        assert!(!text.contains("label1:;"));
        assert!(!text.contains("goto"));
        // The `!= 0` wrapper was peeled.
        assert!(text.contains("if (i32_0_) {"));
        // The unused wasm local declaration was swept.
        assert!(!text.contains("local1_"));
    }
}
