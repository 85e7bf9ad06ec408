use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ========== USER ==========
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
    /// Older records were created with a dedicated teacher role.
    Teacher,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Teacher => "teacher",
        }
    }

    /// Display label. Admins and legacy teachers are shown as teachers.
    pub fn label(&self) -> &'static str {
        match self {
            Role::Admin | Role::Teacher => "Teacher",
            Role::User => "Student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            "teacher" => Ok(Role::Teacher),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Directory entry as stored in the user table. Never mutated by this service.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserRecord {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub subject: Option<String>,
    pub grade_level: Option<String>,
    pub date_of_birth: Option<String>, // YYYY-MM-DD
    pub bio: Option<String>,
    pub profile_image_url: Option<String>,
    pub created_at: String,
}

impl UserRecord {
    pub fn new(id: &str, full_name: &str, email: &str, role: Role) -> Self {
        Self {
            id: id.to_string(),
            full_name: full_name.to_string(),
            email: email.to_string(),
            role,
            phone: None,
            address: None,
            subject: None,
            grade_level: None,
            date_of_birth: None,
            bio: None,
            profile_image_url: None,
            created_at: String::new(),
        }
    }
}

// ========== INVITE ==========
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InviteRole {
    #[default]
    User,
    Admin,
}

impl InviteRole {
    /// Label used in the invitation mail. Admins are invited as teachers.
    pub fn label(&self) -> &'static str {
        match self {
            InviteRole::Admin => "Teacher",
            InviteRole::User => "Student",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct InviteForm {
    pub email: String,
    pub role: InviteRole,
    pub full_name: String,
    pub subject: String,
    pub grade_level: String,
    pub message: String,
}

impl InviteForm {
    pub fn is_empty(&self) -> bool {
        *self == InviteForm::default()
    }

    pub fn has_required_fields(&self) -> bool {
        !self.email.trim().is_empty() && !self.full_name.trim().is_empty()
    }
}

/// One field edit coming from the invite form.
#[derive(Debug, Clone, PartialEq)]
pub enum InviteField {
    Email(String),
    Role(InviteRole),
    FullName(String),
    Subject(String),
    GradeLevel(String),
    Message(String),
}

#[derive(Debug, Serialize, Clone, PartialEq, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InviteOutcome {
    #[default]
    Idle,
    Sending,
    Sent { link: String },
    Failed { reason: String, link: String },
}

impl InviteOutcome {
    pub fn link(&self) -> Option<&str> {
        match self {
            InviteOutcome::Sent { link } | InviteOutcome::Failed { link, .. } => Some(link),
            InviteOutcome::Idle | InviteOutcome::Sending => None,
        }
    }
}

// ========== EMAIL ==========
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}
