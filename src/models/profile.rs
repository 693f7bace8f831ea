use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

/// Permissions granted to every admin, explicit or auto-registered.
pub const DEFAULT_ADMIN_PERMISSIONS: [&str; 4] = [
    "manage_suggestions",
    "manage_feedback",
    "manage_comments",
    "export_data",
];

/// A user or admin profile (`sugestoes_users` / `admins`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Identity-provider uid.
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub domain: String,
    pub role: Role,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub is_institutional: bool,
    #[serde(default)]
    pub auto_registered: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdminRequest {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub permissions: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePhotoRequest {
    pub photo_url: String,
}

/// Lowercased domain part of an email, or an empty string if there is none.
pub fn email_domain(email: &str) -> String {
    email
        .rsplit_once('@')
        .map(|(_, domain)| domain.trim().to_lowercase())
        .unwrap_or_default()
}

impl Profile {
    pub fn user(
        uid: &str,
        email: &str,
        display_name: Option<String>,
        photo_url: Option<String>,
        corporate_domain: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let domain = email_domain(email);
        Self {
            uid: uid.to_string(),
            email: email.to_string(),
            display_name,
            photo_url,
            is_institutional: !domain.is_empty() && domain == corporate_domain,
            domain,
            role: Role::User,
            permissions: Vec::new(),
            auto_registered: false,
            created_at: now,
            last_login: Some(now),
        }
    }

    pub fn into_admin(mut self, permissions: Option<Vec<String>>, auto_registered: bool) -> Self {
        self.role = Role::Admin;
        self.permissions = permissions.unwrap_or_else(|| {
            DEFAULT_ADMIN_PERMISSIONS.iter().map(|p| p.to_string()).collect()
        });
        self.auto_registered = auto_registered;
        self
    }
}
