//! `{{name}}` placeholder substitution and SQL quoting.
//!
//! Rendering is purely textual. Bindings hold fragments that are already valid
//! SQL: identifiers go through [`quote_identifier`], literals through
//! [`quote_literal`]. Templates never wrap placeholders in quotes themselves.

use std::collections::BTreeMap;

/// Placeholder name to pre-rendered SQL fragment.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: BTreeMap<&'static str, String>,
}

impl Bindings {
    /// Empty bindings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to a quoted identifier.
    #[must_use]
    pub fn identifier(mut self, name: &'static str, ident: &str) -> Self {
        self.values.insert(name, quote_identifier(ident));
        self
    }

    /// Bind `name` to a quoted string literal.
    #[must_use]
    pub fn literal(mut self, name: &'static str, value: &str) -> Self {
        self.values.insert(name, quote_literal(value));
        self
    }

    /// Look up the fragment bound to `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// Substitute every `{{name}}` in `template` that has a binding.
///
/// Unbound placeholders are left as they are; the server rejects them.
#[must_use]
pub fn render(template: &str, bindings: &Bindings) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let (head, tail) = rest.split_at(start);
        out.push_str(head);

        let Some(end) = tail.find("}}") else {
            out.push_str(tail);
            return out;
        };

        let name = tail[2..end].trim();
        match bindings.get(name) {
            Some(fragment) => out.push_str(fragment),
            None => out.push_str(&tail[..end + 2]),
        }
        rest = &tail[end + 2..];
    }

    out.push_str(rest);
    out
}

/// Quote `ident` as a PostgreSQL identifier.
///
/// Embedded double quotes are doubled and anything after a NUL byte is
/// dropped, matching libpq behaviour.
#[must_use]
pub fn quote_identifier(ident: &str) -> String {
    let ident = ident.split('\0').next().unwrap_or_default();
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote `value` as a PostgreSQL string literal.
///
/// Single quotes are doubled. Values containing a backslash are emitted as an
/// escape string (`E'...'`) with the backslashes doubled.
#[must_use]
pub fn quote_literal(value: &str) -> String {
    let escaped = value.replace('\'', "''");
    if escaped.contains('\\') {
        format!(" E'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{escaped}'")
    }
}
