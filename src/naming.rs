//! Relation names derived from file names.

/// Turn a file name into an engine relation name.
///
/// Strips the last extension, maps every character outside `[A-Za-z0-9_]` to `_`
/// and prefixes `_` when the result starts with a digit. Uniqueness is not
/// checked here; loading a second file with the same derived name replaces the
/// first.
pub fn sanitize_relation_name(file_name: &str) -> String {
    let stem = match file_name.rfind('.') {
        Some(0) | None => file_name,
        Some(dot) => &file_name[..dot],
    };

    let mut name: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if name.is_empty() {
        name.push('_');
    } else if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}
