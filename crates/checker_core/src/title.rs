const LEFT_TO_RIGHT_MARK: char = '\u{200E}';
const RIGHT_TO_LEFT_MARK: char = '\u{200F}';

/// Drop directional marks and surrounding whitespace from user input.
pub fn clean_input_title(raw: &str) -> String {
    raw.chars()
        .filter(|ch| *ch != LEFT_TO_RIGHT_MARK && *ch != RIGHT_TO_LEFT_MARK)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Database form of a title: spaces become underscores.
pub fn to_db_key(title: &str) -> String {
    title.trim().replace(' ', "_")
}

pub fn to_display(title: &str) -> String {
    title.replace('_', " ")
}

/// Turn `Index:Foo bar.djvu` into the database key `Foo_bar.djvu`.
///
/// Returns `None` when the title is not in the index namespace or names only
/// the namespace itself.
pub fn strip_index_namespace(raw: &str, index_namespace_name: &str) -> Option<String> {
    let key = to_db_key(&clean_input_title(raw));
    let prefix = format!("{}:", to_db_key(index_namespace_name));
    let rest = key.strip_prefix(&prefix)?.trim_start_matches('_');
    if rest.is_empty() {
        return None;
    }
    Some(rest.to_string())
}

/// Percent-encode a title for an article path, leaving `/` and `:` readable.
pub fn encode_for_url(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for byte in to_db_key(title).bytes() {
        if byte.is_ascii_alphanumeric() || b"-._~:/()!*,;@$'".contains(&byte) {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}
