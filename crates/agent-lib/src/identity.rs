//! Container identifier helpers

/// Number of characters in the short form of a container id
pub const SHORT_ID_LEN: usize = 12;

/// Short form of a container id: its first 12 characters, or the whole id
/// when it is shorter than that.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}
