//! Unused-label sweep.
//!
//! After goto folding, labels may have lost their last `goto`. This pass
//! deletes any `labelN:;` line whose label no gotos target, leaving the
//! label set exactly equal to the goto-target set.

use std::collections::HashSet;

fn label_line(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let name = trimmed.strip_suffix(":;")?;
    let digits = name.strip_prefix("label")?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(name)
}

/// Collect every `goto labelN;` target inside a line (plain statements,
/// br_if bodies, and switch cases alike).
fn collect_targets(line: &str, targets: &mut HashSet<String>) {
    let mut rest = line;
    while let Some(pos) = rest.find("goto label") {
        let after = &rest[pos + "goto ".len()..];
        if let Some(end) = after.find(';') {
            targets.insert(after[..end].to_string());
            rest = &after[end..];
        } else {
            break;
        }
    }
}

pub fn run(lines: Vec<String>) -> Vec<String> {
    let mut targets = HashSet::new();
    for line in &lines {
        collect_targets(line, &mut targets);
    }
    lines
        .into_iter()
        .filter(|line| match label_line(line) {
            Some(name) => targets.contains(name),
            None => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(src: &[&str]) -> Vec<String> {
        src.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn untargeted_labels_are_removed() {
        let out = run(lines(&["\tlabel0:;", "\tgoto label1;", "\tlabel1:;"]));
        assert_eq!(out, lines(&["\tgoto label1;", "\tlabel1:;"]));
    }

    #[test]
    fn switch_case_targets_keep_their_labels() {
        let out = run(lines(&[
            "\tcase 0: goto label3;",
            "\tdefault: goto label4;",
            "\tlabel3:;",
            "\tlabel4:;",
            "\tlabel5:;",
        ]));
        assert_eq!(
            out,
            lines(&[
                "\tcase 0: goto label3;",
                "\tdefault: goto label4;",
                "\tlabel3:;",
                "\tlabel4:;",
            ])
        );
    }

    #[test]
    fn label_set_equals_goto_target_set() {
        let out = run(lines(&[
            "\tlabel0:;",
            "\tlabel1:;",
            "\tgoto label1;",
            "\tif (local0_) {",
            "\t\tgoto label2;",
            "\t}",
            "\tlabel2:;",
        ]));
        let labels: Vec<_> = out.iter().filter_map(|l| label_line(l)).collect();
        assert_eq!(labels, vec!["label1", "label2"]);
    }
}
