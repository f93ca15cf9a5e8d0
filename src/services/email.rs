//! Email notifications for comments
//!
//! [`EmailNotifier`] is a [`CmsHooks`] implementation that mails the
//! moderator about comments awaiting approval and tells commenters when
//! someone replies to them.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;

use crate::config::{CmsSettings, EmailConfig};
use crate::models::{Comment, Post};
use crate::services::hooks::CmsHooks;

/// An outgoing notification before it is addressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub struct EmailNotifier {
    config: EmailConfig,
    settings: Arc<CmsSettings>,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig, settings: Arc<CmsSettings>) -> Result<Self> {
        if config.smtp_host.is_empty() {
            return Err(anyhow!("SMTP host not configured"));
        }
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
            .port(config.smtp_port);
        if !config.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ));
        }
        Ok(Self {
            mailer: builder.build(),
            config,
            settings,
        })
    }

    /// Mail for the moderator about a comment waiting for approval
    pub fn pending_comment_notification(&self, comment: &Comment, post: &Post) -> Option<Notification> {
        if comment.approved {
            return None;
        }
        let to = self.config.notify_address.clone().filter(|a| !a.is_empty())?;
        Some(Notification {
            to,
            subject: format!("[{}] New comment on \"{}\"", self.settings.website_name, post.title),
            body: format!(
                "{} left a comment on \"{}\" that is waiting for approval.\n\n{}\n",
                comment.author_name.as_deref().unwrap_or("Someone"),
                post.title,
                comment.content
            ),
        })
    }

    /// Mail for the author of `parent` about an answer to their comment
    pub fn reply_notification(&self, comment: &Comment, parent: &Comment, post: &Post) -> Option<Notification> {
        let to = parent.author_email.clone().filter(|e| !e.is_empty())?;
        if comment.author_email.as_deref() == Some(to.as_str()) {
            return None;
        }
        let link = self
            .settings
            .post_url(&post.post_type, &post.code, post.id)
            .map(|url| format!("\n\nRead it here: {}", url))
            .unwrap_or_default();
        Some(Notification {
            to,
            subject: format!("[{}] New reply to your comment", self.settings.website_name),
            body: format!(
                "Someone replied to your comment on \"{}\".{}\n",
                post.title, link
            ),
        })
    }

    fn build_message(&self, notification: &Notification) -> Result<Message> {
        let from = format!("{} <{}>", self.config.from_name, self.config.from_address);
        Message::builder()
            .from(from.parse().map_err(|e| anyhow!("Invalid from address: {}", e))?)
            .to(notification
                .to
                .parse()
                .map_err(|e| anyhow!("Invalid to address: {}", e))?)
            .subject(notification.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(notification.body.clone())
            .map_err(|e| anyhow!("Failed to build email: {}", e))
    }

    async fn send(&self, notification: Notification) {
        let result = match self.build_message(&notification) {
            Ok(message) => self
                .mailer
                .send(message)
                .await
                .map(|_| ())
                .map_err(|e| anyhow!("Failed to send email: {}", e)),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => tracing::info!("Sent notification to {}", notification.to),
            Err(e) => tracing::warn!("Notification to {} failed: {:#}", notification.to, e),
        }
    }
}

#[async_trait]
impl CmsHooks for EmailNotifier {
    async fn comment_added(&self, comment: &Comment, post: &Post) {
        if let Some(notification) = self.pending_comment_notification(comment, post) {
            self.send(notification).await;
        }
    }

    async fn comment_reply(&self, comment: &Comment, parent: &Comment, post: &Post) {
        if let Some(notification) = self.reply_notification(comment, parent, post) {
            self.send(notification).await;
        }
    }
}
