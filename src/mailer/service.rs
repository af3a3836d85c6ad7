use async_trait::async_trait;
use lettre::message::{header, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{debug, info};

use crate::config::SmtpConfig;

/// Outbound mail seam. The SMTP implementation is swapped for a no-op
/// in `AppState::fake()`.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send_confirmation(&self, to: &str, confirm_url: &str) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn build_transport(&self) -> anyhow::Result<SmtpTransport> {
        let credentials = Credentials::new(
            self.config.username.clone(),
            self.config.password.clone(),
        );
        let transport = SmtpTransport::starttls_relay(&self.config.host)?
            .port(self.config.port)
            .credentials(credentials)
            .build();
        Ok(transport)
    }

    fn build_message(&self, to: &str, confirm_url: &str) -> anyhow::Result<Message> {
        let text_body = format!(
            "Welcome!\n\nPlease confirm your email address by opening this link:\n{}\n",
            confirm_url
        );
        let html_body = format!(
            "<p>Welcome!</p><p>Please confirm your email address: \
             <a href=\"{url}\">{url}</a></p>",
            url = confirm_url
        );

        let message = Message::builder()
            .from(self.config.from.parse()?)
            .to(to.parse()?)
            .subject("Confirm your email address")
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(text_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )?;
        Ok(message)
    }
}

#[async_trait]
impl MailSender for SmtpMailer {
    async fn send_confirmation(&self, to: &str, confirm_url: &str) -> anyhow::Result<()> {
        let message = self.build_message(to, confirm_url)?;
        let transport = self.build_transport()?;

        debug!(to = %to, "sending confirmation mail");
        // lettre's SMTP transport is blocking; keep it off the runtime.
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await?
            .map_err(|e| anyhow::anyhow!("smtp send failed: {}", e))?;

        info!(to = %to, "confirmation mail sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".into(),
            port: 587,
            username: "mailer".into(),
            password: "secret".into(),
            from: "Authhub <noreply@example.com>".into(),
            confirm_base_url: "http://localhost:8080/mailer/confirm-email".into(),
        }
    }

    #[test]
    fn builds_multipart_message_with_link() {
        let mailer = SmtpMailer::new(config());
        let message = mailer
            .build_message("user@example.com", "http://localhost/confirm?token=abc")
            .expect("message should build");
        let raw = String::from_utf8(message.formatted()).expect("utf8 message");
        assert!(raw.contains("user@example.com"));
        assert!(raw.contains("Confirm your email address"));
        assert!(raw.contains("http://localhost/confirm?token=3Dabc") || raw.contains("token=abc"));
    }

    #[test]
    fn rejects_invalid_recipient() {
        let mailer = SmtpMailer::new(config());
        assert!(mailer.build_message("not an address", "http://x").is_err());
    }
}
