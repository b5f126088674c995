//! Condition simplification.
//!
//! Applied to the expression of every emitted `if (…)` line: strips
//! redundant outer parentheses, collapses a top-level `== 0` into logical
//! negation, peels a top-level `!= 0`, and removes `static_cast` wrappers
//! around the whole condition. Purely textual and idempotent.

/// Whether `expr` starts with `(`, ends with `)`, and that pair wraps the
/// whole string.
fn wrapped_in_parens(expr: &str) -> bool {
    if !(expr.starts_with('(') && expr.ends_with(')')) {
        return false;
    }
    let mut depth = 0usize;
    for (i, c) in expr.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return i == expr.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

/// Whether `suffix` sits at parenthesis depth zero at the end of `expr`.
fn top_level_suffix<'a>(expr: &'a str, suffix: &str) -> Option<&'a str> {
    let head = expr.strip_suffix(suffix)?;
    let mut depth = 0i32;
    for c in head.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
    }
    if depth == 0 {
        Some(head)
    } else {
        None
    }
}

const CAST_WRAPPERS: [&str; 4] = [
    "static_cast<int32_t>(",
    "static_cast<uint32_t>(",
    "static_cast<int64_t>(",
    "static_cast<uint64_t>(",
];

/// Simplify a condition expression. Idempotent.
pub fn optimize_condition(expr: &str) -> String {
    let mut e = expr.trim().to_string();
    loop {
        if wrapped_in_parens(&e) {
            e = e[1..e.len() - 1].trim().to_string();
            continue;
        }
        let mut stripped = false;
        for wrapper in CAST_WRAPPERS {
            if let Some(inner) = e.strip_prefix(wrapper) {
                if let Some(inner) = inner.strip_suffix(')') {
                    let candidate = format!("({})", inner);
                    if wrapped_in_parens(&candidate) {
                        e = inner.trim().to_string();
                        stripped = true;
                        break;
                    }
                }
            }
        }
        if stripped {
            continue;
        }
        if let Some(head) = top_level_suffix(&e, " != 0") {
            e = head.trim().to_string();
            continue;
        }
        if let Some(head) = top_level_suffix(&e, " == 0") {
            let mut inner = head.trim().to_string();
            while wrapped_in_parens(&inner) {
                inner = inner[1..inner.len() - 1].trim().to_string();
            }
            e = format!("!({})", inner);
            // A negation is final: recursing would strip its parentheses.
            break;
        }
        break;
    }
    e
}

/// Rewrite the condition of every `if (…) {` line in place.
pub fn run(lines: Vec<String>) -> Vec<String> {
    lines
        .into_iter()
        .map(|line| {
            let trimmed = line.trim_start_matches(['\t', ' ']);
            let indent = &line[..line.len() - trimmed.len()];
            let Some(cond) = trimmed
                .strip_prefix("if (")
                .and_then(|r| r.strip_suffix(") {"))
            else {
                return line;
            };
            format!("{}if ({}) {{", indent, optimize_condition(cond))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_redundant_outer_parens() {
        assert_eq!(optimize_condition("((local0_ < local1_))"), "local0_ < local1_");
    }

    #[test]
    fn keeps_non_wrapping_parens() {
        assert_eq!(
            optimize_condition("(local0_ + 1) < (local1_ - 2)"),
            "(local0_ + 1) < (local1_ - 2)"
        );
    }

    #[test]
    fn collapses_eq_zero_to_negation() {
        assert_eq!(optimize_condition("(local0_ & 1) == 0"), "!(local0_ & 1)");
        assert_eq!(optimize_condition("local0_ == 0"), "!(local0_)");
    }

    #[test]
    fn peels_ne_zero() {
        assert_eq!(optimize_condition("(local0_ & 1) != 0"), "local0_ & 1");
        assert_eq!(optimize_condition("local0_ != 0"), "local0_");
    }

    #[test]
    fn nested_comparisons_are_not_peeled() {
        // The `== 0` here is inside parentheses, not top-level.
        assert_eq!(
            optimize_condition("(local0_ == 0) & local1_"),
            "(local0_ == 0) & local1_"
        );
    }

    #[test]
    fn removes_whole_condition_casts() {
        assert_eq!(
            optimize_condition("static_cast<int32_t>(local0_ < local1_)"),
            "local0_ < local1_"
        );
        assert_eq!(
            optimize_condition("static_cast<uint64_t>((local0_))"),
            "local0_"
        );
    }

    #[test]
    fn keeps_casts_of_subexpressions() {
        let cond = "static_cast<int32_t>(local0_) < local1_";
        assert_eq!(optimize_condition(cond), cond);
    }

    #[test]
    fn is_idempotent() {
        let samples = [
            "((local0_ < local1_))",
            "(mem_->LoadInt32(local0_) & 255) == 0",
            "static_cast<uint32_t>((i32_0_ != 0))",
            "(local0_ + 1) < (local1_ - 2)",
            "i32_3_",
        ];
        for s in samples {
            let once = optimize_condition(s);
            assert_eq!(optimize_condition(&once), once, "input {:?}", s);
        }
    }

    #[test]
    fn rewrites_if_lines_only() {
        let out = run(vec![
            "\tif ((local0_ != 0)) {".to_string(),
            "\t\tgoto label1;".to_string(),
            "\t}".to_string(),
        ]);
        assert_eq!(out[0], "\tif (local0_) {");
        assert_eq!(out[1], "\t\tgoto label1;");
    }
}
