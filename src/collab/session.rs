use serde_json::Value;

use crate::models::{pick_color, Participant};

/// Identity of the signed-in user, threaded explicitly into the coordinator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = Some(full_name.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_avatar_url(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }

    /// Build a session from verified JWT claims.
    ///
    /// `sub` is required; profile fields are read from `email` and the
    /// `user_metadata` object.
    pub fn from_claims(claims: &Value) -> Option<Self> {
        let user_id = non_empty(claims.get("sub").and_then(Value::as_str))?;
        let meta = claims.get("user_metadata");
        let meta_field = |field: &str| non_empty(meta.and_then(|m| m.get(field)).and_then(Value::as_str));

        Some(Self {
            user_id,
            email: non_empty(claims.get("email").and_then(Value::as_str)),
            full_name: meta_field("full_name"),
            name: meta_field("name"),
            avatar_url: meta_field("avatar_url"),
        })
    }

    /// Full name, then name, then the local part of the email address.
    pub fn display_name(&self) -> Option<String> {
        non_empty(self.full_name.as_deref())
            .or_else(|| non_empty(self.name.as_deref()))
            .or_else(|| {
                let email = self.email.as_deref()?;
                let (local, _) = email.split_once('@')?;
                non_empty(Some(local))
            })
    }

    /// Presence record for this session with a freshly picked color.
    pub fn participant(&self) -> Participant {
        Participant {
            id: self.user_id.clone(),
            display_name: self.display_name(),
            color: pick_color().to_string(),
            avatar: non_empty(self.avatar_url.as_deref()),
        }
    }
}
