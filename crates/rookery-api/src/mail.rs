//! Outgoing account mail: confirmation, password reset and email change.
//!
//! Sending is synchronous and runs inside [`crate::blocking`]. Delivery
//! failures are reported as internal errors.

use anyhow::{Context, Result};
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;

use crate::error::ApiError;
use crate::{AppState, blocking};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Confirm,
    ResetPassword,
    ChangeEmail,
}

impl Template {
    pub fn subject(self) -> &'static str {
        match self {
            Template::Confirm => "Confirm Your Account",
            Template::ResetPassword => "Reset Your Password",
            Template::ChangeEmail => "Confirm your email address",
        }
    }

    /// Route the emailed token is appended to.
    pub fn link_path(self) -> &'static str {
        match self {
            Template::Confirm => "/confirm",
            Template::ResetPassword => "/resetpassword",
            Template::ChangeEmail => "/resetemail",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub template: Template,
    pub username: String,
    pub token: String,
    pub link: String,
}

impl OutgoingMail {
    pub fn body(&self) -> String {
        let action = match self.template {
            Template::Confirm => "Welcome to Rookery!\n\nTo confirm your account please click on the following link:",
            Template::ResetPassword => "To reset your password click on the following link:",
            Template::ChangeEmail => "To confirm your new email address click on the following link:",
        };
        let footer = match self.template {
            Template::Confirm => "",
            _ => "\n\nIf you have not requested this change simply ignore this message.",
        };
        format!(
            "Dear {},\n\n{}\n\n{}{}\n\nSincerely,\n\nThe Rookery Team\n\nNote: replies to this email address are not monitored.\n",
            self.username, action, self.link, footer
        )
    }
}

pub trait Mailer: Send + Sync {
    fn send(&self, mail: &OutgoingMail) -> Result<()>;
}

/// SMTP settings read by the server binary.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub server: String,
    pub port: u16,
    pub use_ssl: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub sender: String,
}

pub struct SmtpMailer {
    transport: SmtpTransport,
    sender: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings) -> Result<Self> {
        let builder = if settings.use_ssl {
            SmtpTransport::relay(&settings.server)
        } else {
            SmtpTransport::starttls_relay(&settings.server)
        }
        .with_context(|| format!("Invalid SMTP server {}", settings.server))?
        .port(settings.port);

        let builder = match (&settings.username, &settings.password) {
            (Some(user), Some(pass)) => builder.credentials(Credentials::new(user.clone(), pass.clone())),
            _ => builder,
        };

        let sender = settings
            .sender
            .parse::<Mailbox>()
            .with_context(|| format!("Invalid mail sender {}", settings.sender))?;

        Ok(Self {
            transport: builder.build(),
            sender,
        })
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, mail: &OutgoingMail) -> Result<()> {
        let to = mail
            .to
            .parse::<Mailbox>()
            .with_context(|| format!("Invalid recipient {}", mail.to))?;

        let message = Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(mail.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body())?;

        self.transport.send(&message)?;
        info!("Sent {:?} mail to {}", mail.template, mail.to);
        Ok(())
    }
}

/// Writes mail to the log instead of delivering it. Used when no SMTP
/// server is configured.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, mail: &OutgoingMail) -> Result<()> {
        info!(
            to = %mail.to,
            subject = %mail.subject,
            link = %mail.link,
            "Mail delivery disabled; not sending"
        );
        Ok(())
    }
}

/// Compose and send `template` to `to`, carrying `token` in the link.
pub(crate) async fn send_mail(
    state: &AppState,
    to: String,
    username: String,
    template: Template,
    token: String,
) -> Result<(), ApiError> {
    blocking(state, move |s| {
        let mail = OutgoingMail {
            subject: format!("{} {}", s.settings.mail_subject_prefix, template.subject()),
            link: format!(
                "{}{}/{}",
                s.settings.base_url.trim_end_matches('/'),
                template.link_path(),
                token
            ),
            to,
            template,
            username,
            token,
        };
        s.mailer.send(&mail)?;
        Ok(())
    })
    .await
}
