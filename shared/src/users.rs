use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use chrono::{DateTime, NaiveDate};
use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::Serialize;
use std::collections::HashMap;

use crate::auth::{IdentityProvider, Session, SessionUser};
use crate::filter::{filter_users, RoleFilter};
use crate::responses;
use crate::types::{Role, UserRecord};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory query failed: {0}")]
    Query(String),
    #[error("malformed user item: {0}")]
    Malformed(String),
}

/// Read-only source of user records, newest first.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn list_users(&self) -> Result<Vec<UserRecord>, DirectoryError>;
}

/// Users stored in the single DynamoDB table under PK=SK=USER#id
pub struct DynamoDirectory {
    client: DynamoClient,
    table_name: String,
}

impl DynamoDirectory {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }
}

#[async_trait]
impl DirectoryStore for DynamoDirectory {
    async fn list_users(&self) -> Result<Vec<UserRecord>, DirectoryError> {
        let mut users = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let output = self
                .client
                .scan()
                .table_name(&self.table_name)
                .filter_expression("entity_type = :type")
                .expression_attribute_values(":type", AttributeValue::S("user".to_string()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| DirectoryError::Query(format!("{:?}", e)))?;

            for item in output.items() {
                match user_from_item(item) {
                    Ok(user) => users.push(user),
                    Err(e) => tracing::warn!("Skipping user item: {}", e),
                }
            }

            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        sort_newest_first(&mut users);
        tracing::info!("Loaded {} users from {}", users.len(), self.table_name);
        Ok(users)
    }
}

fn string_attr(item: &HashMap<String, AttributeValue>, name: &str) -> Option<String> {
    item.get(name)
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
}

/// Map one table item onto a [`UserRecord`]
pub fn user_from_item(item: &HashMap<String, AttributeValue>) -> Result<UserRecord, DirectoryError> {
    let id = string_attr(item, "PK")
        .and_then(|pk| pk.strip_prefix("USER#").map(|s| s.to_string()))
        .or_else(|| string_attr(item, "user_id"))
        .ok_or_else(|| DirectoryError::Malformed("missing user id".to_string()))?;

    let email = string_attr(item, "email")
        .ok_or_else(|| DirectoryError::Malformed(format!("user {} has no email", id)))?;

    let role = match string_attr(item, "role") {
        Some(raw) => raw
            .parse::<Role>()
            .map_err(|e| DirectoryError::Malformed(format!("user {}: {}", id, e)))?,
        None => Role::User,
    };

    Ok(UserRecord {
        full_name: string_attr(item, "full_name")
            .or_else(|| string_attr(item, "name"))
            .unwrap_or_default(),
        email,
        role,
        phone: string_attr(item, "phone"),
        address: string_attr(item, "address"),
        subject: string_attr(item, "subject"),
        grade_level: string_attr(item, "grade_level"),
        date_of_birth: string_attr(item, "date_of_birth"),
        bio: string_attr(item, "bio"),
        profile_image_url: string_attr(item, "profile_image_url"),
        created_at: string_attr(item, "created_at").unwrap_or_default(),
        id,
    })
}

/// Order by creation date, newest first. Undated records go last.
pub fn sort_newest_first(users: &mut [UserRecord]) {
    users.sort_by_key(|u| std::cmp::Reverse(DateTime::parse_from_rfc3339(&u.created_at).ok()));
}

// ========== VIEW ==========
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct UserCard {
    pub id: String,
    pub full_name: String,
    pub initials: String,
    pub email: String,
    pub role: Role,
    pub role_label: &'static str,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub subject: Option<String>,
    pub grade_level: Option<String>,
    pub date_of_birth: Option<String>,
    pub bio: Option<String>,
    pub profile_image_url: Option<String>,
}

pub fn initials(name: &str) -> String {
    let letters: String = name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .collect();

    if letters.is_empty() {
        "U".to_string()
    } else {
        letters.to_uppercase()
    }
}

/// "1990-04-07" -> "Apr 7, 1990". Anything unparseable is shown as stored.
pub fn format_birth_date(raw: &str) -> String {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()));

    match date {
        Some(d) => d.format("%b %-d, %Y").to_string(),
        None => raw.to_string(),
    }
}

impl From<&UserRecord> for UserCard {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.clone(),
            full_name: user.full_name.clone(),
            initials: initials(&user.full_name),
            email: user.email.clone(),
            role: user.role,
            role_label: user.role.label(),
            phone: user.phone.clone(),
            address: user.address.clone(),
            subject: user.subject.clone(),
            grade_level: user.grade_level.clone(),
            date_of_birth: user.date_of_birth.as_deref().map(format_birth_date),
            bio: user.bio.clone(),
            profile_image_url: user.profile_image_url.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DirectoryListing {
    pub users: Vec<UserCard>,
    pub count: usize,
    pub summary: String,
    pub empty_hint: Option<&'static str>,
}

impl DirectoryListing {
    pub fn build(all: &[UserRecord], search: &str, role: RoleFilter) -> Self {
        let users: Vec<UserCard> = filter_users(all, search, role)
            .into_iter()
            .map(UserCard::from)
            .collect();
        let count = users.len();

        let empty_hint = if count > 0 {
            None
        } else if !search.is_empty() || role != RoleFilter::All {
            Some("Try adjusting your search or filter criteria")
        } else {
            Some("No users have been added to the system yet")
        };

        Self {
            users,
            count,
            summary: format!("{} user{} found", count, if count == 1 { "" } else { "s" }),
            empty_hint,
        }
    }
}

/// Fetch the directory and the caller's identity side by side.
pub async fn load_directory(
    directory: &dyn DirectoryStore,
    identity: &dyn IdentityProvider,
    access_token: Option<&str>,
) -> (Result<Vec<UserRecord>, DirectoryError>, Session) {
    tokio::join!(
        directory.list_users(),
        Session::resolve(identity, access_token)
    )
}

pub(crate) fn directory_unavailable(e: &DirectoryError) -> Result<Response<Body>, Error> {
    tracing::error!("Error loading users: {}", e);
    responses::error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "DirectoryUnavailable",
        "Failed to load users",
    )
}

/// GET /users
pub async fn list_users(
    directory: &dyn DirectoryStore,
    identity: &dyn IdentityProvider,
    access_token: Option<&str>,
    search: &str,
    role: &str,
) -> Result<Response<Body>, Error> {
    let (users, session) = load_directory(directory, identity, access_token).await;

    if session.user().is_none() {
        return responses::sign_in_required();
    }

    let role_filter: RoleFilter = match role.parse() {
        Ok(filter) => filter,
        Err(message) => {
            return responses::error(StatusCode::BAD_REQUEST, "InvalidRoleFilter", &message);
        }
    };

    match users {
        Ok(users) => responses::json(StatusCode::OK, &DirectoryListing::build(&users, search, role_filter)),
        Err(e) => directory_unavailable(&e),
    }
}

/// GET /users/me
pub fn get_me(session: &Session) -> Result<Response<Body>, Error> {
    match session.user() {
        Some(user) => responses::json::<SessionUser>(StatusCode::OK, user),
        None => responses::sign_in_required(),
    }
}
