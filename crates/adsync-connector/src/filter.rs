//! LDAP filter value escaping (RFC 4515).

/// Escape special characters in a filter assertion value.
///
/// Characters that must be escaped: `* ( ) \` and NUL. Values embedded
/// into filters (including watermarks read back from the state store)
/// always pass through here to rule out filter injection.
pub fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}
