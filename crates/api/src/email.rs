//! Outbound mail

use async_trait::async_trait;

use crate::models::User;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> anyhow::Result<()>;
}

/// Mailer that writes messages to the log instead of delivering them
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            body = %email.body,
            "email (not delivered)"
        );
        Ok(())
    }
}

/// Welcome message carrying the account's activation token
pub fn welcome_email(user: &User, activation_token: &str) -> Email {
    Email {
        to: user.email.clone(),
        subject: "Welcome to Greenlight!".to_string(),
        body: format!(
            "Hi {name},\n\n\
             Thanks for signing up for a Greenlight account. Your user ID number is {id}.\n\n\
             To activate your account, send a request to PUT /v1/users/activated with:\n\n\
             {{\"token\": \"{activation_token}\"}}\n\n\
             This token is valid for 3 days and can only be used once.\n",
            name = user.name,
            id = user.id,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Credential;
    use time::OffsetDateTime;

    #[test]
    fn test_welcome_email_contains_token() {
        let user = User {
            id: 12,
            created_at: OffsetDateTime::UNIX_EPOCH,
            name: "Alice".into(),
            email: "alice@example.com".into(),
            credential: Credential::default(),
            activated: false,
            version: 1,
        };

        let email = welcome_email(&user, "ABCDEFGHIJKLMNOPQRSTUVWXYZ");
        assert_eq!(email.to, "alice@example.com");
        assert!(email.body.contains("user ID number is 12"));
        assert!(email
            .body
            .contains(r#"{"token": "ABCDEFGHIJKLMNOPQRSTUVWXYZ"}"#));
    }

    #[tokio::test]
    async fn test_log_mailer_accepts_mail() {
        let email = Email {
            to: "bob@example.com".into(),
            subject: "hi".into(),
            body: "hello".into(),
        };
        LogMailer.send(&email).await.unwrap();
    }
}
