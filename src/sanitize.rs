//! Input sanitization for untrusted request fields.
//!
//! Every field goes through [`sanitize`] before it is used. Text fields lose
//! markup and control characters; email fields are reduced to the address
//! alphabet and must then parse as a [`lettre::Address`].

use lettre::Address;

/// How a raw field should be cleaned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Email,
}

/// Clean a raw field. `None` means the field is absent or unusable.
pub fn sanitize(raw: Option<&str>, kind: FieldKind) -> Option<String> {
    match kind {
        FieldKind::Text => sanitize_text(raw),
        FieldKind::Email => sanitize_email(raw).map(|a| a.to_string()),
    }
}

/// Strip markup and control characters, keeping every other character.
pub fn sanitize_text(raw: Option<&str>) -> Option<String> {
    let raw = raw.filter(|s| !s.trim().is_empty())?;
    let cleaned = strip_tags(&strip_controls(raw));
    if cleaned.trim().is_empty() { None } else { Some(cleaned) }
}

/// Reduce to the address alphabet, then validate.
pub fn sanitize_email(raw: Option<&str>) -> Option<Address> {
    let raw = raw.filter(|s| !s.trim().is_empty())?;
    let cleaned: String = raw.trim().chars().filter(|c| is_address_char(*c)).collect();
    cleaned.parse().ok()
}

/// Remove `\r` and `\n` so a value can sit in a mail header.
pub fn strip_header_breaks(value: &str) -> String {
    value.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

fn strip_controls(s: &str) -> String {
    s.chars().filter(|c| !matches!(*c, '\u{0}'..='\u{1f}' | '\u{7f}')).collect()
}

/// Drops `<tag ...>` sequences. A `<` only opens a tag when followed by a
/// letter, `/`, `!` or `?`, so `a < b` survives. An unterminated tag swallows
/// the rest of the input.
fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    let mut in_tag = false;
    while let Some(c) = chars.next() {
        if in_tag {
            if c == '>' {
                in_tag = false;
            }
            continue;
        }
        let opens = c == '<'
            && chars
                .peek()
                .is_some_and(|n| n.is_ascii_alphabetic() || matches!(n, '/' | '!' | '?'));
        if opens {
            in_tag = true;
        } else {
            out.push(c);
        }
    }
    out
}

fn is_address_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-=?^_`{|}~@.[]".contains(c)
}
