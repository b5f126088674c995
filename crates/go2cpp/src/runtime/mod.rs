//! The fixed C++ runtime files shipped with every output directory.
//!
//! These are resource text, not synthesised code: the emitter only fills
//! the `{{GUARD}}`/`{{NS}}`/`{{INCLUDE}}` placeholders (plus the
//! module-specific `{{PAGES}}`/`{{DATA}}` splice points of `mem.cpp`).

use heck::ToShoutySnakeCase;

/// The runtime files emitted verbatim (after placeholder substitution),
/// as `(file name, template text)` pairs in emission order.
pub const TEMPLATES: [(&str, &str); 13] = [
    ("bits.h", include_str!("templates/bits.h.in")),
    ("bytes.h", include_str!("templates/bytes.h.in")),
    ("bytes.cpp", include_str!("templates/bytes.cpp.in")),
    ("mem.h", include_str!("templates/mem.h.in")),
    ("js.h", include_str!("templates/js.h.in")),
    ("js.cpp", include_str!("templates/js.cpp.in")),
    ("taskqueue.h", include_str!("templates/taskqueue.h.in")),
    ("taskqueue.cpp", include_str!("templates/taskqueue.cpp.in")),
    ("gl.h", include_str!("templates/gl.h.in")),
    ("gl.cpp", include_str!("templates/gl.cpp.in")),
    ("game.h", include_str!("templates/game.h.in")),
    ("game.cpp", include_str!("templates/game.cpp.in")),
    ("go.h", include_str!("templates/go.h.in")),
];

/// `go.cpp` and the `mem.cpp` skeleton are kept out of [`TEMPLATES`]: the
/// former closes the file list, the latter receives module data.
pub const GO_CPP: &str = include_str!("templates/go.cpp.in");
pub const MEM_CPP: &str = include_str!("templates/mem.cpp.in");

/// The include-guard macro for a file in a namespace:
/// `my::gen` + `mem.h` → `MY_GEN_MEM_H`.
pub fn include_guard(namespace: &str, file_name: &str) -> String {
    let sanitize = |s: &str| {
        s.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect::<String>()
    };
    format!(
        "{}_{}",
        sanitize(namespace).to_shouty_snake_case(),
        sanitize(file_name).to_shouty_snake_case()
    )
}

/// Substitute the shared placeholders into a template.
pub fn render(template: &str, file_name: &str, namespace: &str, include_prefix: &str) -> String {
    template
        .replace("{{GUARD}}", &include_guard(namespace, file_name))
        .replace("{{NS}}", namespace)
        .replace("{{INCLUDE}}", include_prefix)
}
