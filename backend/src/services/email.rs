use crate::config::SmtpConfig;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("could not build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("transport failure: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    #[error("unknown email template '{0}'")]
    UnknownTemplate(String),
    #[error("mail transport not configured")]
    NotConfigured,
}

/// Pre-interpolated content handed to a mail sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
}

/// Outbound mail transport. Recipient and content arrive fully resolved.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send_email(&self, to: &str, template: &str, message: &EmailMessage) -> Result<(), MailError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub subject: String,
    pub html_body: String,
    pub text_body: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

impl EmailService {
    pub fn new(smtp_config: &SmtpConfig) -> Result<Self, MailError> {
        let creds = Credentials::new(smtp_config.username.clone(), smtp_config.password.clone());

        let builder = if smtp_config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp_config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp_config.host)
        };

        let transport = builder
            .port(smtp_config.port)
            .credentials(creds)
            .pool_config(PoolConfig::new().max_size(10))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        Ok(EmailService {
            transport,
            from_email: smtp_config.from_email.clone(),
            from_name: smtp_config.from_name.clone(),
        })
    }

    /// Render a named template around already-interpolated content.
    pub fn render(&self, template: &str, message: &EmailMessage) -> Result<EmailTemplate, MailError> {
        match template {
            "workflow_notification" => Ok(workflow_notification_template(&self.from_name, message)),
            "plain" => Ok(EmailTemplate {
                subject: message.subject.clone(),
                html_body: message.body.clone(),
                text_body: None,
            }),
            other => Err(MailError::UnknownTemplate(other.to_string())),
        }
    }

    async fn deliver(&self, to_email: &str, email: EmailTemplate) -> Result<(), MailError> {
        let from = format!("{} <{}>", self.from_name, self.from_email).parse::<Mailbox>()?;
        let to = to_email.parse::<Mailbox>()?;

        let builder = Message::builder().from(from).to(to).subject(email.subject);

        let message = match email.text_body {
            Some(text) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html_body),
                    ),
            )?,
            None => builder.body(email.html_body)?,
        };

        match self.transport.send(message).await {
            Ok(_) => {
                info!("Email sent successfully to {}", to_email);
                Ok(())
            }
            Err(e) => {
                error!("Failed to send email to {}: {}", to_email, e);
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl MailSender for EmailService {
    async fn send_email(&self, to: &str, template: &str, message: &EmailMessage) -> Result<(), MailError> {
        let email = self.render(template, message)?;
        self.deliver(to, email).await
    }
}

/// Used when SMTP is not configured: every delivery fails, so messages
/// land in the outbox until a transport is available.
pub struct DisabledMailer;

#[async_trait]
impl MailSender for DisabledMailer {
    async fn send_email(&self, to: &str, _template: &str, _message: &EmailMessage) -> Result<(), MailError> {
        tracing::warn!("SMTP not configured, cannot deliver email to {}", to);
        Err(MailError::NotConfigured)
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn workflow_notification_template(sender: &str, message: &EmailMessage) -> EmailTemplate {
    let paragraphs: String = message
        .body
        .split("\n\n")
        .map(|p| format!("<p>{}</p>", escape_html(p).replace('\n', "<br>")))
        .collect();

    let html_body = format!(
        r#"
        <html>
        <head>
            <style>
                body {{ font-family: Arial, sans-serif; margin: 0; padding: 20px; background-color: #f5f5f5; }}
                .container {{ max-width: 600px; margin: 0 auto; background: white; border-radius: 8px; overflow: hidden; }}
                .content {{ padding: 30px; }}
                .footer {{ background: #f8fafc; padding: 20px; text-align: center; color: #666; }}
            </style>
        </head>
        <body>
            <div class="container">
                <div class="content">{}</div>
                <div class="footer">
                    <p>Sent by {} via Flowdesk automations.</p>
                </div>
            </div>
        </body>
        </html>
        "#,
        paragraphs,
        escape_html(sender)
    );

    EmailTemplate {
        subject: message.subject.clone(),
        html_body,
        text_body: Some(message.body.clone()),
    }
}
