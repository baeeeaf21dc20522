//! AWS IoT classic shadow topic construction.
//!
//! Topic scheme: `$aws/things/<thing>/shadow/...` — the reserved namespace
//! AWS IoT uses for device shadow documents.

/// Shadow update topic — publishing here merges reported state.
pub fn shadow_update(thing: &str) -> String {
    format!("$aws/things/{thing}/shadow/update")
}

/// Shadow delete topic — publishing here removes the shadow document.
pub fn shadow_delete(thing: &str) -> String {
    format!("$aws/things/{thing}/shadow/delete")
}

/// Shadow delta topic — the broker notifies here when desired state
/// diverges from reported.
pub fn shadow_delta(thing: &str) -> String {
    format!("$aws/things/{thing}/shadow/update/delta")
}
