/// Derive a machine key from a column display name.
///
/// Lowercased, whitespace runs replaced with a single underscore. The key is
/// the stable identifier row data is stored under; renaming a column later
/// never changes it.
pub fn derive_column_key(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Normalize a display name for matching during bulk import.
///
/// Case-insensitive, whitespace- and underscore-insensitive: "Store Count",
/// "store_count" and "STORECOUNT" all normalize to "storecount".
pub fn normalize_display_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .collect()
}
