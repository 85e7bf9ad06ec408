use edubase_shared::{
    auth::{self, bearer_token, Session},
    dashboard, invites, responses, users, AppState,
};
use lambda_http::{http::Method, Body, Error, Request, RequestExt, Response};
use std::sync::Arc;

/// Main Lambda handler - routes requests to the directory, invite and auth endpoints
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    let body = event.body();
    tracing::info!("🚀 EduBase API invoked - Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if method == "OPTIONS" {
        return responses::preflight();
    }

    let access_token = bearer_token(event.headers());
    let identity = state.identity.as_ref();
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method, parts.as_slice()) {
        // POST /login - exchange credentials for tokens (public)
        (&Method::POST, ["login"]) => auth::login(identity, body).await,
        // POST /logout - end the provider session
        (&Method::POST, ["logout"]) => auth::logout(identity, access_token).await,
        // GET /users?search=&role= - filtered directory
        (&Method::GET, ["users"]) => {
            let params = event.query_string_parameters_ref();
            let search = params.and_then(|p| p.first("search")).unwrap_or("");
            let role = params.and_then(|p| p.first("role")).unwrap_or("all");

            users::list_users(state.directory.as_ref(), identity, access_token, search, role).await
        }
        // GET /users/me - the signed-in user
        (&Method::GET, ["users", "me"]) => {
            let session = Session::resolve(identity, access_token).await;
            users::get_me(&session)
        }
        // GET /dashboard - directory statistics
        (&Method::GET, ["dashboard"]) => {
            dashboard::get_dashboard(state.directory.as_ref(), identity, access_token).await
        }
        // POST /invites - email an invitation
        (&Method::POST, ["invites"]) => {
            let session = Session::resolve(identity, access_token).await;
            let Some(inviter) = session.user() else {
                return responses::sign_in_required();
            };

            invites::send_invite(
                state.notifier.as_ref(),
                &state.config.frontend_url,
                inviter,
                body,
            )
            .await
        }
        (_, ["login"] | ["logout"] | ["users"] | ["users", "me"] | ["dashboard"] | ["invites"]) => {
            responses::method_not_allowed()
        }
        _ => {
            tracing::warn!("⚠️ No route matched - Method: {} Path: {}", method, path);
            responses::not_found()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use edubase_shared::auth::{IdentityError, IdentityProvider, LoginResponse, SessionUser};
    use edubase_shared::config::Config;
    use edubase_shared::email::{NotificationSender, NotifyError};
    use edubase_shared::types::{EmailMessage, Role, UserRecord};
    use edubase_shared::users::{DirectoryError, DirectoryStore};
    use lambda_http::http::StatusCode;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct StaticDirectory(Option<Vec<UserRecord>>);

    #[async_trait]
    impl DirectoryStore for StaticDirectory {
        async fn list_users(&self) -> Result<Vec<UserRecord>, DirectoryError> {
            self.0
                .clone()
                .ok_or_else(|| DirectoryError::Query("table missing".to_string()))
        }
    }

    struct TokenIdentity;

    #[async_trait]
    impl IdentityProvider for TokenIdentity {
        async fn current_user(&self, token: &str) -> Result<Option<SessionUser>, IdentityError> {
            if token == "good" {
                Ok(Some(SessionUser {
                    id: "sub-1".to_string(),
                    email: "principal@school.edu".to_string(),
                    full_name: "Pat Principal".to_string(),
                    role: Role::Admin,
                }))
            } else {
                Err(IdentityError::NotAuthorized("access token rejected".to_string()))
            }
        }

        async fn login(&self, _email: &str, password: &str) -> Result<LoginResponse, IdentityError> {
            if password == "correct horse" {
                Ok(LoginResponse {
                    id_token: "id".to_string(),
                    access_token: "good".to_string(),
                    refresh_token: "refresh".to_string(),
                    expires_in: 3600,
                })
            } else {
                Err(IdentityError::NotAuthorized("Incorrect email or password".to_string()))
            }
        }

        async fn logout(&self, _token: &str) -> Result<(), IdentityError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Outbox {
        fail: bool,
        sent: Mutex<Vec<EmailMessage>>,
    }

    #[async_trait]
    impl NotificationSender for Outbox {
        async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(message.clone());
            if self.fail {
                Err(NotifyError::Delivery("throttled".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn directory() -> Vec<UserRecord> {
        vec![
            UserRecord::new("1", "Alice Moreau", "alice@school.edu", Role::Admin),
            UserRecord::new("2", "Bob Stone", "bob@school.edu", Role::User),
            UserRecord::new("3", "Carla Alison", "carla@school.edu", Role::User),
        ]
    }

    fn state_with(users: Option<Vec<UserRecord>>, outbox: Arc<Outbox>) -> Arc<AppState> {
        let config = Config {
            table_name: "edubase-test".to_string(),
            frontend_url: "https://edu.example/".to_string(),
            sender_email: "noreply@edu.example".to_string(),
            cognito_client_id: "client".to_string(),
            cognito_client_secret: "secret".to_string(),
        };
        AppState::new(
            config,
            Arc::new(StaticDirectory(users)),
            Arc::new(TokenIdentity),
            outbox,
        )
    }

    fn request(method: &str, uri: &str, token: Option<&str>, body: &str) -> Request {
        let mut builder = lambda_http::http::Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn json_body(response: &Response<Body>) -> serde_json::Value {
        serde_json::from_slice(&response.body().to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_preflight() {
        let state = state_with(Some(directory()), Arc::default());
        let response = function_handler(request("OPTIONS", "/users", None, ""), state)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["Access-Control-Allow-Origin"], "*");
    }

    #[tokio::test]
    async fn test_listing_requires_sign_in() {
        let state = state_with(Some(directory()), Arc::default());

        for token in [None, Some("expired")] {
            let response = function_handler(request("GET", "/users", token, ""), state.clone())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(json_body(&response)["error"], "AccessRequired");
        }
    }

    #[tokio::test]
    async fn test_listing_applies_search_and_role() {
        let state = state_with(Some(directory()), Arc::default());

        let mut params = HashMap::new();
        params.insert("search".to_string(), "ALI".to_string());
        params.insert("role".to_string(), "user".to_string());
        let event = request("GET", "/users", Some("good"), "").with_query_string_parameters(params);

        let response = function_handler(event, state).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(&response);
        assert_eq!(body["count"], 1);
        assert_eq!(body["summary"], "1 user found");
        assert_eq!(body["users"][0]["id"], "3");
        assert_eq!(body["users"][0]["initials"], "CA");
        assert_eq!(body["users"][0]["role_label"], "Student");
    }

    #[tokio::test]
    async fn test_listing_rejects_unknown_role() {
        let state = state_with(Some(directory()), Arc::default());

        let mut params = HashMap::new();
        params.insert("role".to_string(), "teacher".to_string());
        let event = request("GET", "/users", Some("good"), "").with_query_string_parameters(params);

        let response = function_handler(event, state).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(&response)["error"], "InvalidRoleFilter");
    }

    #[tokio::test]
    async fn test_unknown_role_without_session_asks_for_sign_in() {
        let state = state_with(Some(directory()), Arc::default());

        let mut params = HashMap::new();
        params.insert("role".to_string(), "bogus".to_string());
        let event = request("GET", "/users", None, "").with_query_string_parameters(params);

        let response = function_handler(event, state).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(&response)["error"], "AccessRequired");
    }

    #[tokio::test]
    async fn test_listing_reports_directory_failure() {
        let state = state_with(None, Arc::default());
        let response = function_handler(request("GET", "/users", Some("good"), ""), state)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(&response)["error"], "DirectoryUnavailable");
    }

    #[tokio::test]
    async fn test_invite_sent() {
        let outbox = Arc::new(Outbox::default());
        let state = state_with(Some(directory()), outbox.clone());
        let body = r#"{"email":"a@x.com","fullName":"Alice","role":"admin"}"#;

        let response = function_handler(request("POST", "/invites", Some("good"), body), state)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(&response);
        assert_eq!(json["outcome"]["state"], "sent");
        assert_eq!(json["outcome"]["link"], "https://edu.example/Dashboard");
        assert_eq!(json["refresh_directory"], true);

        let sent = outbox.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@x.com");
        assert_eq!(sent[0].subject, "Welcome to EduBase - Teacher Invitation");
    }

    #[tokio::test]
    async fn test_invite_send_failure_returns_fallback_link() {
        let outbox = Arc::new(Outbox {
            fail: true,
            ..Default::default()
        });
        let state = state_with(Some(directory()), outbox);
        let body = r#"{"email":"b@x.com","fullName":"Bob"}"#;

        let response = function_handler(request("POST", "/invites", Some("good"), body), state)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(&response);
        assert_eq!(json["outcome"]["state"], "failed");
        assert_eq!(json["outcome"]["link"], "https://edu.example/Dashboard");
        assert_eq!(json["message"], invites::SEND_FAILED_MESSAGE);
        assert_eq!(json["refresh_directory"], false);
    }

    #[tokio::test]
    async fn test_invite_requires_name_and_email() {
        let outbox = Arc::new(Outbox::default());
        let state = state_with(Some(directory()), outbox.clone());
        let body = r#"{"email":"","fullName":"x"}"#;

        let response = function_handler(request("POST", "/invites", Some("good"), body), state)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(&response)["message"], "Please fill in all required fields");
        assert!(outbox.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invite_requires_sign_in() {
        let outbox = Arc::new(Outbox::default());
        let state = state_with(Some(directory()), outbox.clone());
        let body = r#"{"email":"a@x.com","fullName":"Alice"}"#;

        let response = function_handler(request("POST", "/invites", None, body), state)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(outbox.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dashboard_and_me() {
        let state = state_with(Some(directory()), Arc::default());

        let response = function_handler(request("GET", "/dashboard", Some("good"), ""), state.clone())
            .await
            .unwrap();
        let stats = json_body(&response);
        assert_eq!(stats["total_users"], 3);
        assert_eq!(stats["admins"], 1);
        assert_eq!(stats["students"], 2);

        let response = function_handler(request("GET", "/users/me", Some("good"), ""), state)
            .await
            .unwrap();
        assert_eq!(json_body(&response)["email"], "principal@school.edu");
    }

    #[tokio::test]
    async fn test_login_and_logout() {
        let state = state_with(Some(directory()), Arc::default());

        let body = r#"{"email":"p@school.edu","password":"correct horse"}"#;
        let response = function_handler(request("POST", "/login", None, body), state.clone())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(&response)["access_token"], "good");

        let response = function_handler(request("POST", "/logout", Some("good"), ""), state)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_unknown_routes() {
        let state = state_with(Some(directory()), Arc::default());

        let response = function_handler(request("GET", "/projects", Some("good"), ""), state.clone())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = function_handler(request("DELETE", "/users", Some("good"), ""), state)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
