use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::Serialize;

use crate::auth::SessionUser;
use crate::email::{NotificationSender, NotifyError};
use crate::responses;
use crate::types::{EmailMessage, InviteField, InviteForm, InviteOutcome};

pub const SEND_FAILED_MESSAGE: &str =
    "Email failed to send, but you can copy the invite link below and share it manually.";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InviteError {
    #[error("Please fill in all required fields")]
    MissingRequiredFields,
    #[error("An invitation is already being sent")]
    AlreadySending,
    #[error("This invitation has already been processed")]
    AlreadyFinished,
}

/// Generic landing link handed to every invitee.
pub fn access_link(origin: &str) -> String {
    format!("{}/Dashboard", origin.trim_end_matches('/'))
}

fn optional(value: &str) -> Option<&str> {
    (!value.trim().is_empty()).then_some(value)
}

/// Build the invitation mail for `form`
pub fn compose_invitation(form: &InviteForm, link: &str) -> EmailMessage {
    let role_label = form.role.label();

    let personal = optional(&form.message)
        .map(|m| format!("\nPersonal message:\n{}\n", m))
        .unwrap_or_default();
    let subject = optional(&form.subject)
        .map(|s| format!("Subject: {}\n", s))
        .unwrap_or_default();
    let grade_level = optional(&form.grade_level)
        .map(|g| format!("Grade Level: {}\n", g))
        .unwrap_or_default();

    let body = format!(
        r#"Hello {name},

You've been invited to join EduBase as a {role}!

{personal}

To get started:
1. Click this link: {link}
2. Sign in with your Google account
3. Complete your profile setup

{subject}{grade_level}

Welcome to EduBase!

Best regards,
The EduBase Team"#,
        name = form.full_name,
        role = role_label,
        personal = personal,
        link = link,
        subject = subject,
        grade_level = grade_level,
    );

    EmailMessage {
        to: form.email.trim().to_string(),
        subject: format!("Welcome to EduBase - {} Invitation", role_label),
        body,
    }
}

/// Handle for one in-flight send. Stale once the dialog has been closed.
#[derive(Debug, Clone, PartialEq)]
pub struct SendTicket {
    generation: u64,
    link: String,
}

/// Lifecycle of a single invitation, from an empty form to a delivered
/// (or manually shareable) access link.
///
/// `Idle -> Sending -> Sent | Failed`. Only `close` returns to `Idle`, and it
/// wipes the form with it.
#[derive(Debug, Default)]
pub struct InviteDialog {
    form: InviteForm,
    outcome: InviteOutcome,
    validation: Option<InviteError>,
    generation: u64,
}

impl InviteDialog {
    pub fn open() -> Self {
        Self::default()
    }

    pub fn form(&self) -> &InviteForm {
        &self.form
    }

    pub fn outcome(&self) -> &InviteOutcome {
        &self.outcome
    }

    pub fn validation_error(&self) -> Option<&InviteError> {
        self.validation.as_ref()
    }

    pub fn is_sending(&self) -> bool {
        matches!(self.outcome, InviteOutcome::Sending)
    }

    /// Apply one field edit. Inputs are locked while a send is in flight.
    pub fn edit(&mut self, field: InviteField) -> bool {
        if self.is_sending() {
            return false;
        }

        match field {
            InviteField::Email(v) => self.form.email = v,
            InviteField::Role(v) => self.form.role = v,
            InviteField::FullName(v) => self.form.full_name = v,
            InviteField::Subject(v) => self.form.subject = v,
            InviteField::GradeLevel(v) => self.form.grade_level = v,
            InviteField::Message(v) => self.form.message = v,
        }
        self.validation = None;
        true
    }

    /// Replace the whole form at once
    pub fn fill(&mut self, form: InviteForm) -> bool {
        if self.is_sending() {
            return false;
        }
        self.form = form;
        self.validation = None;
        true
    }

    /// Move to `Sending` and hand back the message to deliver.
    pub fn begin_send(&mut self, origin: &str) -> Result<(SendTicket, EmailMessage), InviteError> {
        match self.outcome {
            InviteOutcome::Idle => {}
            InviteOutcome::Sending => return Err(InviteError::AlreadySending),
            InviteOutcome::Sent { .. } | InviteOutcome::Failed { .. } => {
                return Err(InviteError::AlreadyFinished)
            }
        }

        if !self.form.has_required_fields() {
            self.validation = Some(InviteError::MissingRequiredFields);
            return Err(InviteError::MissingRequiredFields);
        }

        let link = access_link(origin);
        let message = compose_invitation(&self.form, &link);

        self.validation = None;
        self.outcome = InviteOutcome::Sending;

        Ok((
            SendTicket {
                generation: self.generation,
                link,
            },
            message,
        ))
    }

    /// Record the sender's answer. Returns false when the ticket is stale.
    pub fn finish_send(&mut self, ticket: SendTicket, result: Result<(), NotifyError>) -> bool {
        if ticket.generation != self.generation || !self.is_sending() {
            tracing::debug!("Ignoring late invite result for a closed dialog");
            return false;
        }

        self.outcome = match result {
            Ok(()) => InviteOutcome::Sent { link: ticket.link },
            Err(e) => {
                tracing::error!("Failed to send invite email: {}", e);
                InviteOutcome::Failed {
                    reason: SEND_FAILED_MESSAGE.to_string(),
                    link: ticket.link,
                }
            }
        };
        true
    }

    /// Compose, deliver and record the outcome in one step.
    pub async fn send(
        &mut self,
        sender: &dyn NotificationSender,
        origin: &str,
    ) -> Result<&InviteOutcome, InviteError> {
        let (ticket, message) = self.begin_send(origin)?;
        let result = sender.send(&message).await;
        self.finish_send(ticket, result);
        Ok(&self.outcome)
    }

    /// Reset everything. Returns true when the directory should be reloaded.
    pub fn close(&mut self) -> bool {
        let refresh = matches!(self.outcome, InviteOutcome::Sent { .. });

        self.form = InviteForm::default();
        self.outcome = InviteOutcome::Idle;
        self.validation = None;
        self.generation += 1;

        refresh
    }
}

#[derive(Debug, Serialize)]
pub struct InviteResponse {
    pub outcome: InviteOutcome,
    pub message: Option<String>,
    pub refresh_directory: bool,
}

/// POST /invites
pub async fn send_invite(
    sender: &dyn NotificationSender,
    frontend_url: &str,
    inviter: &SessionUser,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let form: InviteForm = match serde_json::from_slice(body) {
        Ok(form) => form,
        Err(e) => {
            return responses::error(
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                &format!("Invalid request body: {}", e),
            );
        }
    };

    tracing::info!("Invite for {} requested by {}", form.email, inviter.email);

    let mut dialog = InviteDialog::open();
    dialog.fill(form);

    let outcome = match dialog.send(sender, frontend_url).await {
        Ok(outcome) => outcome.clone(),
        Err(e @ InviteError::MissingRequiredFields) => {
            return responses::error(StatusCode::BAD_REQUEST, "MissingRequiredFields", &e.to_string());
        }
        Err(e @ (InviteError::AlreadySending | InviteError::AlreadyFinished)) => {
            return responses::error(StatusCode::CONFLICT, "InviteInProgress", &e.to_string());
        }
    };

    let message = match &outcome {
        InviteOutcome::Failed { reason, .. } => Some(reason.clone()),
        _ => None,
    };
    let refresh_directory = dialog.close();

    responses::json(
        StatusCode::OK,
        &InviteResponse {
            outcome,
            message,
            refresh_directory,
        },
    )
}
