//! Outbound mail. Delivery is behind [`Mailer`]; the shipped implementation
//! only logs, leaving transport configuration to the deployment.

use async_trait::async_trait;
use tracing::{debug, info};

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()>;
}

pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()> {
        info!(from = %self.from, %to, %subject, "email sent");
        debug!(body = %html, "email body");
        Ok(())
    }
}

pub struct Email {
    pub subject: String,
    pub html: String,
}

pub fn password_reset(name: &str, reset_url: &str, valid_minutes: i64) -> Email {
    let first = name.split_whitespace().next().unwrap_or(name);
    Email {
        subject: format!("Your password reset token (valid for {valid_minutes} min)"),
        html: format!(
            "<p>Hi {first},</p>\
             <p>Forgot your password? Submit a PATCH request with your new password and \
             passwordConfirm to: <a href=\"{reset_url}\">{reset_url}</a></p>\
             <p>If you didn't forget your password, please ignore this email!</p>"
        ),
    }
}
