use crate::types::{Role, UserRecord};
use std::str::FromStr;

/// Role selector offered next to the search box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoleFilter {
    #[default]
    All,
    Admin,
    User,
}

impl RoleFilter {
    pub fn matches(&self, role: Role) -> bool {
        match self {
            RoleFilter::All => true,
            RoleFilter::Admin => role == Role::Admin,
            RoleFilter::User => role == Role::User,
        }
    }
}

impl FromStr for RoleFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "all" => Ok(RoleFilter::All),
            "admin" => Ok(RoleFilter::Admin),
            "user" => Ok(RoleFilter::User),
            other => Err(format!("Unknown role filter '{}'", other)),
        }
    }
}

/// Reduce the directory to the users matching `search` and `role`.
///
/// The search term is matched case-insensitively as a substring of either the
/// full name or the email. An empty term matches everyone. Input order is kept.
pub fn filter_users<'a>(
    users: &'a [UserRecord],
    search: &str,
    role: RoleFilter,
) -> Vec<&'a UserRecord> {
    let needle = search.to_lowercase();

    users
        .iter()
        .filter(|user| {
            let matches_search = user.full_name.to_lowercase().contains(&needle)
                || user.email.to_lowercase().contains(&needle);
            matches_search && role.matches(user.role)
        })
        .collect()
}
