use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::Serialize;

use crate::auth::IdentityProvider;
use crate::responses;
use crate::types::{Role, UserRecord};
use crate::users::{directory_unavailable, load_directory, DirectoryStore, UserCard};

const RECENT_USERS: usize = 5;

#[derive(Debug, Serialize, PartialEq)]
pub struct DashboardStats {
    pub total_users: usize,
    pub admins: usize,
    pub students: usize,
    pub legacy_teachers: usize,
    pub recent: Vec<UserCard>,
}

impl DashboardStats {
    /// `users` must already be ordered newest first
    pub fn from_users(users: &[UserRecord]) -> Self {
        let count = |role: Role| users.iter().filter(|u| u.role == role).count();

        Self {
            total_users: users.len(),
            admins: count(Role::Admin),
            students: count(Role::User),
            legacy_teachers: count(Role::Teacher),
            recent: users.iter().take(RECENT_USERS).map(UserCard::from).collect(),
        }
    }
}

/// GET /dashboard
pub async fn get_dashboard(
    directory: &dyn DirectoryStore,
    identity: &dyn IdentityProvider,
    access_token: Option<&str>,
) -> Result<Response<Body>, Error> {
    let (users, session) = load_directory(directory, identity, access_token).await;

    if session.user().is_none() {
        return responses::sign_in_required();
    }

    match users {
        Ok(users) => responses::json(StatusCode::OK, &DashboardStats::from_users(&users)),
        Err(e) => directory_unavailable(&e),
    }
}
