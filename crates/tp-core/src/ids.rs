use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a prefixed identifier, e.g. `task-4f1c…`.
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

/// Current UTC timestamp. Single call site for "now" so stores and the
/// pipeline stamp records consistently.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
