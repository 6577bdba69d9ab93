#![forbid(unsafe_code)]

/// Derive a human-readable display name from a field name:
/// `firstName` and `first_name` both become `First Name`.
#[must_use]
pub fn gen_display_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;
    for c in name.chars() {
        if c == '_' || c == '-' {
            prev = Some(' ');
            if !out.ends_with(' ') && !out.is_empty() {
                out.push(' ');
            }
            continue;
        }
        match prev {
            None | Some(' ') => out.extend(c.to_uppercase()),
            Some(p) if c.is_uppercase() && p.is_lowercase() => {
                out.push(' ');
                out.push(c);
            }
            _ => out.push(c),
        }
        prev = Some(c);
    }
    out
}
