use serde::{Deserialize, Serialize};

/// Caller role. Column editability mostly gates on `Admin`; vendors get a
/// read-mostly view and anonymous sessions get none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    Vendor,
    #[default]
    Anonymous,
}

impl UserRole {
    pub fn can_edit(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// The authenticated identity, as reported by the auth layer. Auth mechanics
/// (tokens, cookies) live outside the core; this is just the answer to
/// "who is editing".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub role: UserRole,
    pub name: String,
}
