//! Prefixed, time-sortable identifiers (`{prefix}_{ulid}`).

use ulid::Ulid;

/// Build `{prefix}_{ulid}` from a fresh ULID.
///
/// # Examples
/// ```
/// let id = chat_common::id::prefixed_ulid("conn");
/// assert!(id.starts_with("conn_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{prefix}_{}", Ulid::new())
}

/// Split `{prefix}_{ulid}` and decode the ULID part. Returns `None` when the
/// prefix differs or the suffix is not a valid ULID.
pub fn parse_prefixed(prefix: &str, id: &str) -> Option<Ulid> {
    let rest = id.strip_prefix(prefix)?.strip_prefix('_')?;
    Ulid::from_string(rest).ok()
}

/// An id type minted with a fixed prefix.
pub trait PrefixedId {
    const PREFIX: &'static str;

    fn generate() -> String {
        prefixed_ulid(Self::PREFIX)
    }

    /// Whether `id` was minted for this type.
    fn is_valid(id: &str) -> bool {
        parse_prefixed(Self::PREFIX, id).is_some()
    }
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const CONNECTION: &str = "conn";
}
