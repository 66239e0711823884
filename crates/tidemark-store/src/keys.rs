//! Key and channel naming.
//!
//! All sorted-set keys and pub/sub channel names are derived here so the
//! store schema lives in exactly one place:
//!
//! - `journal:<persistenceId>` — per-identifier sorted set, score = sequence
//!   number, value = encoded persistent record
//! - `tag:<tag>` — per-tag sorted set, score = tag-local index starting at 0,
//!   value = `"<seqNr>:<persistenceId>"`
//! - `channel:journal:<persistenceId>` / `channel:tag:<tag>` — pub/sub
//!   channels carrying the ASCII-decimal index of the latest write

/// Returns the sorted-set key holding the journal of one persistence id.
#[must_use]
pub fn journal_key(persistence_id: &str) -> String {
    format!("journal:{persistence_id}")
}

/// Returns the sorted-set key holding the event references of one tag.
#[must_use]
pub fn tag_key(tag: &str) -> String {
    format!("tag:{tag}")
}

/// Returns the pub/sub channel notified on writes to one persistence id.
#[must_use]
pub fn journal_channel(persistence_id: &str) -> String {
    format!("channel:journal:{persistence_id}")
}

/// Returns the pub/sub channel notified on writes to one tag.
#[must_use]
pub fn tag_channel(tag: &str) -> String {
    format!("channel:tag:{tag}")
}
