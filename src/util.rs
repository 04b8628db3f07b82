//! Small shared helpers: timestamp formatting and session id minting.

use chrono::Utc;

/// `yyyymmdd_hhmmss_mmm`, used for artifact filenames throughout the
/// store so that lexicographic order matches chronological order.
pub fn file_timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S_%3f").to_string()
}

/// Time-prefixed, random-suffixed session identifier, e.g.
/// `20260730_211530-9f2c4a1b`.
pub fn new_session_id() -> String {
    let prefix = Utc::now().format("%Y%m%d_%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &suffix[..8])
}
