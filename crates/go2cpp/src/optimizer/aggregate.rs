//! Stack-variable aggregation.
//!
//! The lowerer declares operand-stack spills as `stackG_I_` at their point
//! of first use. This pass renames them to compact per-type names
//! (`i32_0_`, `f64_3_`, `u32_1_`, `t0_2_`, …), turns the in-place
//! declarations into plain assignments, and hoists one declaration per
//! variable to the top of the body, ahead of any label, so a backward goto
//! can never bypass an initialisation. Names in the no-merge set (block
//! return slots) keep their original declarations untouched.

use std::collections::{HashMap, HashSet};

/// Carrier-type tokens recognised at the head of a declaration line.
const CARRIERS: [(&str, &str); 6] = [
    ("int32_t", "i32"),
    ("uint32_t", "u32"),
    ("int64_t", "i64"),
    ("uint64_t", "u64"),
    ("float", "f32"),
    ("double", "f64"),
];

/// A declaration line split into its parts.
struct Decl<'a> {
    indent: &'a str,
    ctype: &'a str,
    name: &'a str,
    /// Initialiser text including the trailing semicolon, or `";"`.
    rest: &'a str,
}

fn split_decl(line: &str) -> Option<Decl<'_>> {
    let trimmed = line.trim_start_matches(['\t', ' ']);
    let indent = &line[..line.len() - trimmed.len()];
    let (ctype, after) = trimmed.split_once(' ')?;
    if !is_type_token(ctype) {
        return None;
    }
    let name_end = after.find([' ', ';'])?;
    let name = &after[..name_end];
    if !is_stack_var(name) {
        return None;
    }
    let rest = after[name_end..].trim_start();
    if !(rest == ";" || rest.starts_with("= ")) {
        return None;
    }
    Some(Decl {
        indent,
        ctype,
        name,
        rest,
    })
}

fn is_type_token(token: &str) -> bool {
    CARRIERS.iter().any(|(c, _)| *c == token)
        || (token.starts_with("Type") && token[4..].chars().all(|c| c.is_ascii_digit()))
}

/// Matches the lowerer's `stackG_I_` naming scheme.
fn is_stack_var(name: &str) -> bool {
    let Some(rest) = name.strip_prefix("stack") else {
        return false;
    };
    let Some(rest) = rest.strip_suffix('_') else {
        return false;
    };
    let mut parts = rest.splitn(2, '_');
    let (Some(g), Some(i)) = (parts.next(), parts.next()) else {
        return false;
    };
    !g.is_empty()
        && !i.is_empty()
        && g.chars().all(|c| c.is_ascii_digit())
        && i.chars().all(|c| c.is_ascii_digit())
}

pub fn run(lines: Vec<String>, no_merge: &HashSet<String>) -> Vec<String> {
    // First walk: assign compact names in first-declaration order.
    let mut rename: Vec<(String, String)> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut per_prefix: HashMap<String, u32> = HashMap::new();
    let mut opaque_types: HashMap<String, u32> = HashMap::new();
    let mut hoisted: Vec<String> = Vec::new();

    for line in &lines {
        let Some(decl) = split_decl(line) else {
            continue;
        };
        if no_merge.contains(decl.name) || seen.contains(decl.name) {
            continue;
        }
        seen.insert(decl.name.to_string());
        let prefix = match CARRIERS.iter().find(|(c, _)| *c == decl.ctype) {
            Some((_, p)) => (*p).to_string(),
            None => {
                let next = opaque_types.len() as u32;
                let idx = *opaque_types.entry(decl.ctype.to_string()).or_insert(next);
                format!("t{}", idx)
            }
        };
        let k = per_prefix.entry(prefix.clone()).or_insert(0);
        let compact = format!("{}_{}_", prefix, k);
        *k += 1;
        hoisted.push(format!("\t{} {};", decl.ctype, compact));
        rename.push((decl.name.to_string(), compact));
    }

    if rename.is_empty() {
        return lines;
    }

    // Second walk: strip mapped declarations down to assignments, then
    // apply the rename everywhere. The `_` suffix of the scheme guarantees
    // no name is a prefix of another, so plain substring replace is exact.
    let mut out = Vec::with_capacity(lines.len() + hoisted.len());
    out.extend(hoisted);
    for line in &lines {
        let mut line = match split_decl(line) {
            Some(decl) if seen.contains(decl.name) => {
                if decl.rest == ";" {
                    // A bare declaration collapses to `name_;` — drop it.
                    continue;
                }
                format!("{}{} {}", decl.indent, decl.name, decl.rest)
            }
            _ => line.clone(),
        };
        for (old, new) in &rename {
            if line.contains(old.as_str()) {
                line = line.replace(old.as_str(), new);
            }
        }
        out.push(line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(src: &[&str]) -> Vec<String> {
        src.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn renames_and_hoists_declarations() {
        let out = run(
            lines(&[
                "\tint32_t stack1_0_ = mem_->LoadInt32(local0_);",
                "\tmem_->StoreInt32(local0_, 7);",
                "\treturn (stack1_0_ + 1);",
            ]),
            &HashSet::new(),
        );
        assert_eq!(
            out,
            lines(&[
                "\tint32_t i32_0_;",
                "\ti32_0_ = mem_->LoadInt32(local0_);",
                "\tmem_->StoreInt32(local0_, 7);",
                "\treturn (i32_0_ + 1);",
            ])
        );
    }

    #[test]
    fn numbers_compact_names_per_type() {
        let out = run(
            lines(&[
                "\tint32_t stack1_0_ = 1;",
                "\tdouble stack1_1_ = 2.0;",
                "\tint32_t stack2_0_ = 3;",
            ]),
            &HashSet::new(),
        );
        assert_eq!(out[0], "\tint32_t i32_0_;");
        assert_eq!(out[1], "\tdouble f64_0_;");
        assert_eq!(out[2], "\tint32_t i32_1_;");
        assert_eq!(out[3], "\ti32_0_ = 1;");
        assert_eq!(out[4], "\tf64_0_ = 2.0;");
        assert_eq!(out[5], "\ti32_1_ = 3;");
    }

    #[test]
    fn no_merge_declarations_survive_verbatim() {
        let mut no_merge = HashSet::new();
        no_merge.insert("stack1_0_".to_string());
        let out = run(
            lines(&["\tint32_t stack1_0_;", "\tstack1_0_ = 4;", "\treturn stack1_0_;"]),
            &no_merge,
        );
        assert_eq!(
            out,
            lines(&["\tint32_t stack1_0_;", "\tstack1_0_ = 4;", "\treturn stack1_0_;"])
        );
    }

    #[test]
    fn opaque_types_get_t_prefixes() {
        let out = run(
            lines(&[
                "\tType4 stack0_0_ = funcs_[table_[0][local0_]].type4_;",
                "\t(this->*stack0_0_)(local1_);",
            ]),
            &HashSet::new(),
        );
        assert_eq!(out[0], "\tType4 t0_0_;");
        assert_eq!(out[1], "\tt0_0_ = funcs_[table_[0][local0_]].type4_;");
        assert_eq!(out[2], "\t(this->*t0_0_)(local1_);");
    }

    #[test]
    fn similar_names_do_not_collide() {
        // stack1_2_ must not rewrite inside stack1_20_.
        let out = run(
            lines(&[
                "\tint32_t stack1_2_ = 1;",
                "\tint32_t stack1_20_ = (stack1_2_ + 1);",
                "\treturn (stack1_2_ + stack1_20_);",
            ]),
            &HashSet::new(),
        );
        assert_eq!(out[4], "\treturn (i32_0_ + i32_1_);");
    }

    #[test]
    fn local_declarations_are_untouched() {
        let input = lines(&["\tint32_t local3_ = 0;", "\tlocal3_ = 9;"]);
        assert_eq!(run(input.clone(), &HashSet::new()), input);
    }
}
