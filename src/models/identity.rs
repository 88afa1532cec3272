use serde::{Deserialize, Serialize};

/// Signed-in user as stored under `yt_user`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserIdentity {
    #[serde(default)]
    pub name: String,
    pub email: String,
}

impl UserIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// An identity without an email cannot be reported against.
    pub fn is_signed_in(&self) -> bool {
        !self.email.trim().is_empty()
    }
}

/// Profile document returned by `GET /profile/{email}`. Unknown fields the
/// backend adds (completion lists, timestamps) are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    #[serde(default)]
    pub name: String,
    pub email: String,
}

impl From<Profile> for UserIdentity {
    fn from(profile: Profile) -> Self {
        Self {
            name: profile.name,
            email: profile.email,
        }
    }
}
