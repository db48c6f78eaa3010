use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length of a profile name.
pub const PROFILE_NAME_MAX_LEN: usize = 30;

/// A user profile, created on the first authenticated request.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub id: i64,

    /// Unique user name, taken from the access token subject
    pub name: String,

    pub created_at: DateTime<Utc>,
}
