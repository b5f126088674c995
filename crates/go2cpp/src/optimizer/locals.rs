//! Unused-declaration sweep.
//!
//! Aggregation can leave declarations behind: a hoisted stack variable
//! whose every use was folded away, or a zero-initialised wasm local the
//! body never touches. This pass drops any declaration line whose name
//! appears nowhere else in the body. Only side-effect-free initialisers
//! (none, or a plain literal) qualify; assignments are never touched.

const TYPE_TOKENS: [&str; 6] = [
    "int32_t", "uint32_t", "int64_t", "uint64_t", "float", "double",
];

/// The declared name, if this line is a removable declaration.
fn removable_decl(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let (ctype, rest) = trimmed.split_once(' ')?;
    let is_known = TYPE_TOKENS.contains(&ctype)
        || (ctype.starts_with("Type") && ctype[4..].chars().all(|c| c.is_ascii_digit()));
    if !is_known {
        return None;
    }
    let (name, init) = match rest.split_once(" = ") {
        Some((name, init)) => (name, Some(init)),
        None => (rest.strip_suffix(';')?, None),
    };
    if name.is_empty() || !name.ends_with('_') {
        return None;
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return None;
    }
    if let Some(init) = init {
        let init = init.strip_suffix(';')?;
        if !init
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        {
            return None;
        }
    }
    Some(name)
}

pub fn run(lines: Vec<String>) -> Vec<String> {
    let mut drop = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let Some(name) = removable_decl(line) else {
            continue;
        };
        let used_elsewhere = lines
            .iter()
            .enumerate()
            .any(|(j, other)| j != i && other.contains(name));
        if !used_elsewhere {
            drop.push(i);
        }
    }
    if drop.is_empty() {
        return lines;
    }
    lines
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !drop.contains(i))
        .map(|(_, line)| line)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(src: &[&str]) -> Vec<String> {
        src.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn unused_local_declarations_are_dropped() {
        let out = run(lines(&[
            "\tint32_t local1_ = 0;",
            "\tint32_t local2_ = 0;",
            "\treturn local2_;",
        ]));
        assert_eq!(out, lines(&["\tint32_t local2_ = 0;", "\treturn local2_;"]));
    }

    #[test]
    fn unused_hoisted_stack_declarations_are_dropped() {
        let out = run(lines(&["\tint32_t i32_0_;", "\treturn local0_;"]));
        assert_eq!(out, lines(&["\treturn local0_;"]));
    }

    #[test]
    fn declarations_with_call_initialisers_are_kept() {
        let input = lines(&["\tint32_t i32_0_ = mem_->Grow(local0_);"]);
        assert_eq!(run(input.clone()), input);
    }

    #[test]
    fn similar_names_do_not_count_as_uses() {
        // local1_ appearing inside local10_ must not keep local1_ alive.
        let out = run(lines(&[
            "\tint32_t local1_ = 0;",
            "\tint64_t local10_ = 0;",
            "\treturn local10_;",
        ]));
        assert_eq!(
            out,
            lines(&["\tint64_t local10_ = 0;", "\treturn local10_;"])
        );
    }
}
