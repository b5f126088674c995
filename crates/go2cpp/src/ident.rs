//! Identifier encoding for Go symbol names.
//!
//! Go symbols such as `runtime.wasmExit` or `type..eq.[2]string` are not
//! valid C++ identifiers. Every byte outside `[0-9A-Za-z]` is escaped as
//! `_XX` (two lowercase hex digits), so the mapping is injective and the
//! output stays in `[0-9A-Za-z_]`.

use anyhow::{bail, Result};

/// Identifiers longer than this are truncated (MSVC caps external names).
const MAX_IDENT_LEN: usize = 511;

/// Encode an arbitrary symbol string as a C++ identifier.
///
/// ASCII alphanumerics pass through verbatim; everything else, including
/// `_` itself, becomes `_XX`. Characters beyond Latin-1 cannot be encoded
/// in two hex digits and are rejected.
pub fn identifier_from_string(name: &str) -> Result<String> {
    let mut ident = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            ident.push(c);
            continue;
        }
        let code = c as u32;
        if code > 0xff {
            bail!("identifier {:?} contains a non-Latin-1 character {:?}", name, c);
        }
        ident.push_str(&format!("_{:02x}", code));
    }
    if ident.len() > MAX_IDENT_LEN {
        ident.truncate(MAX_IDENT_LEN);
    }
    Ok(ident)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphanumerics_pass_through() {
        assert_eq!(identifier_from_string("run").unwrap(), "run");
        assert_eq!(identifier_from_string("Func42").unwrap(), "Func42");
    }

    #[test]
    fn dots_and_slashes_are_escaped() {
        assert_eq!(
            identifier_from_string("runtime.wasmExit").unwrap(),
            "runtime_2ewasmExit"
        );
        assert_eq!(
            identifier_from_string("syscall/js.valueGet").unwrap(),
            "syscall_2fjs_2evalueGet"
        );
    }

    #[test]
    fn underscore_is_escaped_too() {
        // Keeps the encoding injective: `a_b` and `a_5fb` stay distinct.
        assert_eq!(identifier_from_string("a_b").unwrap(), "a_5fb");
    }

    #[test]
    fn latin1_bytes_are_escaped() {
        assert_eq!(identifier_from_string("å").unwrap(), "_e5");
    }

    #[test]
    fn non_latin1_is_rejected() {
        assert!(identifier_from_string("関数").is_err());
    }

    #[test]
    fn output_alphabet_is_safe() {
        let ident = identifier_from_string("type..eq.[2]string·f").unwrap();
        assert!(ident
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }

    #[test]
    fn long_names_are_truncated() {
        let long = "x".repeat(4096);
        let ident = identifier_from_string(&long).unwrap();
        assert_eq!(ident.len(), 511);
    }
}
