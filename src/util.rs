use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Get current timestamp in milliseconds
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Fresh opaque identifier for a captured call or connection.
pub fn new_record_id() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
