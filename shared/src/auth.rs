use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::types::AuthFlowType;
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use lambda_http::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    Body, Error, Response,
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::responses;
use crate::types::Role;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("not authorized: {0}")]
    NotAuthorized(String),
    #[error("no authentication result returned")]
    NoResult,
    #[error("identity provider error: {0}")]
    Provider(String),
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct LoginResponse {
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i32,
}

/// The signed-in person as reported by the identity provider
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self, access_token: &str) -> Result<Option<SessionUser>, IdentityError>;
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, IdentityError>;
    async fn logout(&self, access_token: &str) -> Result<(), IdentityError>;
}

/// Who is making the request. Resolved once at the start of a request and
/// passed down explicitly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    user: Option<SessionUser>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn signed_in(user: SessionUser) -> Self {
        Self { user: Some(user) }
    }

    pub fn user(&self) -> Option<&SessionUser> {
        self.user.as_ref()
    }

    /// Look the caller up. Any provider failure counts as not signed in.
    pub async fn resolve(identity: &dyn IdentityProvider, access_token: Option<&str>) -> Self {
        let Some(token) = access_token else {
            return Self::anonymous();
        };

        match identity.current_user(token).await {
            Ok(Some(user)) => Self::signed_in(user),
            Ok(None) => Self::anonymous(),
            Err(e) => {
                tracing::warn!("Could not resolve current user, treating as signed out: {}", e);
                Self::anonymous()
            }
        }
    }
}

/// Bearer token from the Authorization header, if any
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

type HmacSha256 = Hmac<Sha256>;

/// Compute the SECRET_HASH for Cognito authentication
fn compute_secret_hash(username: &str, client_id: &str, client_secret: &str) -> Result<String, IdentityError> {
    let message = format!("{}{}", username, client_id);
    let mut mac = HmacSha256::new_from_slice(client_secret.as_bytes())
        .map_err(|e| IdentityError::Provider(format!("invalid client secret: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Turn a Cognito exception into something a person can act on
fn friendly_login_message(raw: &str) -> &'static str {
    if raw.contains("NotAuthorizedException") {
        "Incorrect email or password"
    } else if raw.contains("UserNotConfirmedException") {
        "Please verify your email before logging in"
    } else if raw.contains("UserNotFoundException") {
        "No account found with this email"
    } else if raw.contains("PasswordResetRequiredException") {
        "Password reset required"
    } else if raw.contains("TooManyRequestsException") {
        "Too many login attempts. Please try again later"
    } else {
        "Login failed. Please check your credentials"
    }
}

/// Identity backed by a Cognito user pool app client
pub struct CognitoIdentity {
    client: CognitoClient,
    client_id: String,
    client_secret: String,
}

impl CognitoIdentity {
    pub fn new(client: CognitoClient, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for CognitoIdentity {
    async fn current_user(&self, access_token: &str) -> Result<Option<SessionUser>, IdentityError> {
        let output = self
            .client
            .get_user()
            .access_token(access_token)
            .send()
            .await
            .map_err(|e| {
                let raw = format!("{:?}", e);
                if raw.contains("NotAuthorizedException") {
                    IdentityError::NotAuthorized("access token rejected".to_string())
                } else {
                    IdentityError::Provider(raw)
                }
            })?;

        let attribute = |name: &str| {
            output
                .user_attributes()
                .iter()
                .find(|a| a.name() == name)
                .and_then(|a| a.value())
                .map(|v| v.to_string())
        };

        let id = attribute("sub").unwrap_or_else(|| output.username().to_string());
        let email = attribute("email").unwrap_or_default();
        let full_name = attribute("name").unwrap_or_default();
        let role = attribute("custom:role")
            .and_then(|r| r.parse::<Role>().ok())
            .unwrap_or(Role::User);

        Ok(Some(SessionUser {
            id,
            email,
            full_name,
            role,
        }))
    }

    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, IdentityError> {
        let secret_hash = compute_secret_hash(email, &self.client_id, &self.client_secret)?;

        let response = self
            .client
            .initiate_auth()
            .auth_flow(AuthFlowType::UserPasswordAuth)
            .client_id(&self.client_id)
            .auth_parameters("USERNAME", email)
            .auth_parameters("PASSWORD", password)
            .auth_parameters("SECRET_HASH", &secret_hash)
            .send()
            .await
            .map_err(|e| {
                let raw = format!("{:?}", e);
                tracing::error!("Cognito authentication error: {}", raw);
                IdentityError::NotAuthorized(friendly_login_message(&raw).to_string())
            })?;

        let result = response.authentication_result().ok_or(IdentityError::NoResult)?;

        Ok(LoginResponse {
            id_token: result.id_token().unwrap_or_default().to_string(),
            access_token: result.access_token().unwrap_or_default().to_string(),
            refresh_token: result.refresh_token().unwrap_or_default().to_string(),
            expires_in: result.expires_in(),
        })
    }

    async fn logout(&self, access_token: &str) -> Result<(), IdentityError> {
        self.client
            .global_sign_out()
            .access_token(access_token)
            .send()
            .await
            .map_err(|e| IdentityError::Provider(format!("{:?}", e)))?;
        Ok(())
    }
}

/// POST /login
pub async fn login(identity: &dyn IdentityProvider, body: &[u8]) -> Result<Response<Body>, Error> {
    tracing::info!("Login request received");

    let request: LoginRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            tracing::error!("Failed to parse request body: {}", e);
            return responses::error(
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                &format!("Invalid request body: {}", e),
            );
        }
    };

    match identity.login(&request.email, &request.password).await {
        Ok(tokens) => {
            tracing::info!("Authentication successful for user: {}", request.email);
            responses::json(StatusCode::OK, &tokens)
        }
        Err(IdentityError::NotAuthorized(message)) => {
            responses::error(StatusCode::UNAUTHORIZED, "AuthenticationFailed", &message)
        }
        Err(e) => {
            tracing::error!("Login failed for {}: {}", request.email, e);
            responses::error(
                StatusCode::UNAUTHORIZED,
                "AuthenticationFailed",
                "Login failed. Please check your credentials",
            )
        }
    }
}

/// POST /logout
pub async fn logout(identity: &dyn IdentityProvider, access_token: Option<&str>) -> Result<Response<Body>, Error> {
    let Some(token) = access_token else {
        return responses::sign_in_required();
    };

    // The client drops its tokens either way
    if let Err(e) = identity.logout(token).await {
        tracing::warn!("Global sign out failed: {}", e);
    }
    responses::no_content()
}
