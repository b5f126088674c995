//! Goto folding.
//!
//! Two rewrites over the labelled-goto control flow:
//!
//! 1. A label that is immediately followed by a `return` makes every
//!    `goto` to it an inline return. Runs of stacked labels ahead of the
//!    return all fold the same way.
//! 2. A `br_table` lowers to a `switch` of gotos behind a head label. When
//!    a jump to that head is preceded by a constant assignment to the
//!    switch variable, the jump is retargeted straight at the matching
//!    case, skipping the dispatch.

use std::collections::HashMap;

fn label_name(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let name = trimmed.strip_suffix(":;")?;
    let digits = name.strip_prefix("label")?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(name)
}

fn is_return(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed == "return;" || (trimmed.starts_with("return ") && trimmed.ends_with(';'))
}

/// Fold `goto labelN;` into the `return` that labelN points at.
fn fold_returns(lines: Vec<String>) -> Vec<String> {
    let mut inline: HashMap<String, String> = HashMap::new();
    let mut i = 0;
    while i < lines.len() {
        let mut labels = Vec::new();
        let mut j = i;
        while j < lines.len() {
            match label_name(&lines[j]) {
                Some(name) => labels.push(name.to_string()),
                None => break,
            }
            j += 1;
        }
        if !labels.is_empty() && j < lines.len() && is_return(&lines[j]) {
            for label in labels {
                inline.insert(label, lines[j].trim().to_string());
            }
        }
        i = if j > i { j } else { i + 1 };
    }
    if inline.is_empty() {
        return lines;
    }
    lines
        .into_iter()
        .map(|line| {
            let mut line = line;
            for (label, ret) in &inline {
                let goto = format!("goto {};", label);
                if line.contains(&goto) {
                    line = line.replace(&goto, ret);
                }
            }
            line
        })
        .collect()
}

/// One recognised `switch` dispatch: variable, per-case actions, default.
struct JumpTable {
    var: String,
    cases: HashMap<i64, String>,
    default: String,
}

fn parse_jump_table(lines: &[String], head: usize) -> Option<(String, JumpTable)> {
    // head points at `labelN:;`, followed by `switch (var) {`.
    let label = label_name(&lines[head])?.to_string();
    let switch = lines.get(head + 1)?.trim();
    let var = switch.strip_prefix("switch (")?.strip_suffix(") {")?;
    if !var.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    let mut cases = HashMap::new();
    let mut default = None;
    let mut i = head + 2;
    loop {
        let line = lines.get(i)?.trim();
        if line == "}" {
            break;
        }
        if let Some(rest) = line.strip_prefix("case ") {
            let (value, action) = rest.split_once(": ")?;
            cases.insert(value.parse::<i64>().ok()?, action.to_string());
        } else if let Some(action) = line.strip_prefix("default: ") {
            default = Some(action.to_string());
        } else {
            return None;
        }
        i += 1;
    }
    Some((
        label,
        JumpTable {
            var: var.to_string(),
            cases,
            default: default?,
        },
    ))
}

/// Retarget `var = C; goto head;` pairs through the jump table.
fn fold_jump_tables(lines: Vec<String>) -> Vec<String> {
    let mut tables: HashMap<String, JumpTable> = HashMap::new();
    for i in 0..lines.len() {
        if label_name(&lines[i]).is_some() {
            if let Some((label, table)) = parse_jump_table(&lines, i) {
                tables.insert(label, table);
            }
        }
    }
    if tables.is_empty() {
        return lines;
    }
    let mut out = lines;
    for i in 0..out.len().saturating_sub(1) {
        let Some(rest) = out[i + 1].trim().strip_prefix("goto ") else {
            continue;
        };
        let Some(table) = rest.strip_suffix(';').and_then(|l| tables.get(l)) else {
            continue;
        };
        let assign = out[i].trim();
        let Some(value) = assign
            .strip_prefix(&format!("{} = ", table.var))
            .and_then(|v| v.strip_suffix(';'))
            .and_then(|v| v.parse::<i64>().ok())
        else {
            continue;
        };
        let action = table.cases.get(&value).unwrap_or(&table.default).clone();
        let indent_len = out[i + 1].len() - out[i + 1].trim_start().len();
        let indent = out[i + 1][..indent_len].to_string();
        out[i + 1] = format!("{}{}", indent, action);
    }
    out
}

pub fn run(lines: Vec<String>) -> Vec<String> {
    fold_jump_tables(fold_returns(lines))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(src: &[&str]) -> Vec<String> {
        src.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn goto_to_labelled_return_is_inlined() {
        let out = run(lines(&[
            "\tgoto label2;",
            "\tlabel2:;",
            "\treturn local0_;",
        ]));
        assert_eq!(out[0], "\treturn local0_;");
    }

    #[test]
    fn stacked_labels_fold_together() {
        let out = run(lines(&[
            "\tgoto label0;",
            "\tgoto label1;",
            "\tlabel0:;",
            "\tlabel1:;",
            "\treturn;",
        ]));
        assert_eq!(out[0], "\treturn;");
        assert_eq!(out[1], "\treturn;");
    }

    #[test]
    fn goto_inside_a_case_folds_too() {
        let out = run(lines(&[
            "\tcase 1: goto label3;",
            "\tlabel3:;",
            "\treturn 7;",
        ]));
        assert_eq!(out[0], "\tcase 1: return 7;");
    }

    #[test]
    fn label_numbers_do_not_alias() {
        // goto label1; must not be rewritten by a fold of label10.
        let out = run(lines(&[
            "\tgoto label1;",
            "\tlabel10:;",
            "\treturn 1;",
            "\tlabel1:;",
            "\tlocal0_ = 2;",
        ]));
        assert_eq!(out[0], "\tgoto label1;");
    }

    #[test]
    fn constant_preamble_skips_the_dispatch() {
        let out = run(lines(&[
            "\ti32_0_ = 2;",
            "\tgoto label5;",
            "\tlabel5:;",
            "\tswitch (i32_0_) {",
            "\tcase 0: goto label1;",
            "\tcase 1: goto label2;",
            "\tcase 2: goto label3;",
            "\tdefault: goto label4;",
            "\t}",
        ]));
        assert_eq!(out[0], "\ti32_0_ = 2;");
        assert_eq!(out[1], "\tgoto label3;");
    }

    #[test]
    fn preamble_outside_the_table_range_takes_the_default() {
        let out = run(lines(&[
            "\ti32_0_ = 9;",
            "\tgoto label5;",
            "\tlabel5:;",
            "\tswitch (i32_0_) {",
            "\tcase 0: goto label1;",
            "\tdefault: goto label4;",
            "\t}",
        ]));
        assert_eq!(out[1], "\tgoto label4;");
    }

    #[test]
    fn non_constant_preambles_are_left_alone() {
        let input = lines(&[
            "\ti32_0_ = local1_;",
            "\tgoto label5;",
            "\tlabel5:;",
            "\tswitch (i32_0_) {",
            "\tcase 0: goto label1;",
            "\tdefault: goto label4;",
            "\t}",
        ]);
        assert_eq!(run(input.clone()), input);
    }
}
