use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::{FrontendConfig, SmtpConfig};
use crate::services::error::NotifyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Confirmation,
    ConfirmationResend,
    Invite,
}

/// Delivers a link embedding `token` to `email`.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, email: &str, token: &str, kind: NotificationKind) -> Result<(), NotifyError>;
}

struct RenderedMessage {
    subject: &'static str,
    plain: String,
    html: String,
}

fn link_for(frontend: &FrontendConfig, token: &str, kind: NotificationKind) -> String {
    let base = match kind {
        NotificationKind::Confirmation | NotificationKind::ConfirmationResend => &frontend.confirm_url,
        NotificationKind::Invite => &frontend.set_password_url,
    };
    format!("{}/{}", base.trim_end_matches('/'), token)
}

fn subject_for(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::Confirmation => "Confirm your account",
        NotificationKind::ConfirmationResend => "Your new confirmation link",
        NotificationKind::Invite => "You have been invited",
    }
}

fn render(kind: NotificationKind, link: &str) -> RenderedMessage {
    let (subject, heading, intro, action) = match kind {
        NotificationKind::Confirmation => (
            subject_for(kind),
            "Welcome! Please confirm your email",
            "Thank you for registering. Please confirm your email address:",
            "Confirm Email",
        ),
        NotificationKind::ConfirmationResend => (
            subject_for(kind),
            "Here is your new confirmation link",
            "You asked for a new link. Earlier links no longer work:",
            "Confirm Email",
        ),
        NotificationKind::Invite => (
            subject_for(kind),
            "You have been invited to the workforce platform",
            "An administrator created an account for you. Choose a password to activate it:",
            "Set Password",
        ),
    };

    let html = format!(
        r###"<html>
    <body style="font-family: Arial, sans-serif;">
        <h2>{heading}</h2>
        <p>{intro}</p>
        <p>
            <a href="{link}" style="background-color: #4CAF50; color: white; padding: 14px 20px; text-decoration: none; border-radius: 4px;">
                {action}
            </a>
        </p>
        <p style="color: #666; font-size: 12px;">
            If you didn't expect this email, you can ignore it.
        </p>
    </body>
</html>
"###
    );

    let plain = format!(
        "{heading}\n\n{intro}\n\n{link}\n\nIf you didn't expect this email, you can ignore it."
    );

    RenderedMessage {
        subject,
        plain,
        html,
    }
}

/// SMTP delivery via lettre, sent on the blocking pool.
#[derive(Clone)]
pub struct SmtpNotifier {
    mailer: SmtpTransport,
    from_email: String,
    frontend: FrontendConfig,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig, frontend: FrontendConfig) -> Result<Self, NotifyError> {
        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let mailer = SmtpTransport::starttls_relay(&config.host)
            .map_err(|e| NotifyError::Send(e.to_string()))?
            .credentials(creds)
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, port = config.port, "SMTP notifier initialized");

        Ok(Self {
            mailer,
            from_email: config.from.clone(),
            frontend,
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, email: &str, token: &str, kind: NotificationKind) -> Result<(), NotifyError> {
        let message = render(kind, &link_for(&self.frontend, token, kind));

        let mail = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e: lettre::address::AddressError| NotifyError::Address(e.to_string()))?,
            )
            .to(email
                .parse()
                .map_err(|e: lettre::address::AddressError| NotifyError::Address(e.to_string()))?)
            .subject(message.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(message.plain),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(message.html),
                    ),
            )
            .map_err(|e| NotifyError::Send(e.to_string()))?;

        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&mail))
            .await
            .map_err(|e| NotifyError::Send(e.to_string()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %email, kind = ?kind, "Notification sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, to = %email, kind = ?kind, "Failed to send notification");
                Err(NotifyError::Send(e.to_string()))
            }
        }
    }
}

/// Stands in for SMTP when it is not configured. Only the kind and subject are logged,
/// unless `expose_links` is set (development), in which case the link is logged at debug
/// so a local signup can still be confirmed.
#[derive(Clone)]
pub struct LogNotifier {
    frontend: FrontendConfig,
    expose_links: bool,
}

impl LogNotifier {
    pub fn new(frontend: FrontendConfig, expose_links: bool) -> Self {
        Self {
            frontend,
            expose_links,
        }
    }

    fn visible_link(&self, token: &str, kind: NotificationKind) -> Option<String> {
        self.expose_links
            .then(|| link_for(&self.frontend, token, kind))
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, email: &str, token: &str, kind: NotificationKind) -> Result<(), NotifyError> {
        tracing::info!(
            to = %email,
            kind = ?kind,
            subject = subject_for(kind),
            "SMTP not configured; notification not delivered"
        );
        if let Some(link) = self.visible_link(token, kind) {
            tracing::debug!(to = %email, link = %link, "Undelivered notification link");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub email: String,
    pub token: String,
    pub kind: NotificationKind,
}

/// Records every call; optionally fails them all.
#[derive(Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<SentNotification>>,
    fail: bool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last_for(&self, email: &str) -> Option<SentNotification> {
        self.sent().into_iter().rev().find(|n| n.email == email)
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, email: &str, token: &str, kind: NotificationKind) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Send("mock notifier configured to fail".to_string()));
        }
        self.sent
            .lock()
            .map_err(|_| NotifyError::Send("mock notifier lock poisoned".to_string()))?
            .push(SentNotification {
                email: email.to_string(),
                token: token.to_string(),
                kind,
            });
        Ok(())
    }
}
