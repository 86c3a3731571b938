/// Suffix the replica service appends to database names (`enwikisource_p`).
pub const STORAGE_SUFFIX: &str = "_p";

/// Pick the wiki identifier for a request: the trimmed raw value without its
/// trailing storage suffix, or `default` when nothing usable was given.
pub fn select_database(raw: Option<&str>, default: &str) -> String {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return default.to_string();
    };
    raw.strip_suffix(STORAGE_SUFFIX).unwrap_or(raw).to_string()
}
