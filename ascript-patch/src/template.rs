use std::collections::BTreeMap;

use crate::error::PatchError;

/// Renders `source` by replacing every `{{key}}` placeholder with its bound
/// value. Unlike the `$VAR` syntax the rest of the language uses for
/// variable resolution, template placeholders are a separate, closed
/// substitution namespace scoped to a single `FileTemplate` step; a
/// placeholder that isn't in `values` is an error rather than a pass-through,
/// since a template's whole point is to fully determine its own output.
#[allow(clippy::expect_used)]
pub fn render(source: &str, values: &BTreeMap<String, String>) -> Result<String, PatchError> {
    let mut out = String::with_capacity(source.len());
    let bytes = source.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i..].starts_with(b"{{") {
            let start = i;
            let rest = &source[i + 2..];
            let Some(close) = rest.find("}}") else {
                return Err(PatchError::UnterminatedPlaceholder(start));
            };
            let key = rest[..close].trim();
            let value = values.get(key).ok_or_else(|| PatchError::UndeclaredKey(key.to_string()))?;
            out.push_str(value);
            i += 2 + close + 2;
        } else {
            let ch = source[i..].chars().next().expect("i is a valid char boundary");
            out.push(ch);
            i += ch.len_utf8();
        }
    }
    Ok(out)
}
