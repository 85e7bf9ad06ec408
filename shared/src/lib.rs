pub mod types;
pub mod config;
pub mod responses;
pub mod auth;
pub mod users;
pub mod filter;
pub mod invites;
pub mod email;
pub mod dashboard;

use auth::{CognitoIdentity, IdentityProvider};
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_sesv2::Client as SesClient;
use config::Config;
use email::{NotificationSender, SesSender};
use std::sync::Arc;
use users::{DirectoryStore, DynamoDirectory};

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub directory: Arc<dyn DirectoryStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub notifier: Arc<dyn NotificationSender>,
}

impl AppState {
    pub fn new(
        config: Config,
        directory: Arc<dyn DirectoryStore>,
        identity: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            directory,
            identity,
            notifier,
        })
    }

    /// Wire the AWS-backed collaborators
    pub fn from_aws(
        config: Config,
        cognito_client: CognitoClient,
        dynamo_client: DynamoClient,
        ses_client: SesClient,
    ) -> Arc<Self> {
        let directory = Arc::new(DynamoDirectory::new(dynamo_client, config.table_name.clone()));
        let identity = Arc::new(CognitoIdentity::new(
            cognito_client,
            config.cognito_client_id.clone(),
            config.cognito_client_secret.clone(),
        ));
        let notifier = Arc::new(SesSender::new(ses_client, config.sender_email.clone()));

        Self::new(config, directory, identity, notifier)
    }
}
