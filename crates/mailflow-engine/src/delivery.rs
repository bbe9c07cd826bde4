//! SMTP delivery of rendered replies

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::debug;

use mailflow_common::config::SmtpConfig;

use crate::actions::{DeliveryError, RenderedReply, ReplySender};

/// Sends replies over SMTP using the configured relay.
///
/// The transport is built once at startup. Connection pooling and
/// reconnects are handled by lettre.
pub struct SmtpReplySender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpReplySender {
    pub fn new(config: &SmtpConfig) -> Result<Self, mailflow_common::error::Error> {
        let transport_result = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else if config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        } else {
            Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
                &config.host,
            ))
        };

        let mut transport = transport_result
            .map_err(|e| {
                mailflow_common::error::Error::Config(format!(
                    "failed to create SMTP transport for {}: {}",
                    config.host, e
                ))
            })?
            .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            transport = transport.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let mailer = transport
            .timeout(Some(StdDuration::from_secs(config.timeout_secs)))
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    /// Classify an SMTP error string into transient vs permanent.
    ///
    /// Hard bounces (5.x.x, unknown user) cannot be fixed by retrying;
    /// 4xx codes and connection-level failures can.
    fn classify(error: String) -> DeliveryError {
        if error.contains("5.1.1")
            || error.contains("550")
            || error.contains("553")
            || error.contains("User unknown")
            || error.contains("does not exist")
        {
            DeliveryError::Permanent(error)
        } else {
            DeliveryError::Transient(error)
        }
    }
}

#[async_trait]
impl ReplySender for SmtpReplySender {
    async fn send_reply(&self, reply: &RenderedReply) -> Result<(), DeliveryError> {
        let from: Mailbox = self
            .from_address
            .parse()
            .map_err(|e| DeliveryError::Permanent(format!("invalid from address: {}", e)))?;

        let to: Mailbox = reply
            .to
            .parse()
            .map_err(|e| DeliveryError::Permanent(format!("invalid to address: {}", e)))?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(&reply.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(reply.body.clone())
            .map_err(|e| DeliveryError::Permanent(format!("failed to build email: {}", e)))?;

        match self.mailer.send(email).await {
            Ok(response) => {
                debug!(
                    rule_id = %reply.rule_id,
                    event_id = %reply.event_id,
                    "reply sent: {:?}",
                    response
                );
                Ok(())
            }
            Err(e) => Err(Self::classify(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_bounce_is_permanent() {
        let err = SmtpReplySender::classify("550 5.1.1 User unknown".to_string());
        assert!(matches!(err, DeliveryError::Permanent(_)));
    }

    #[test]
    fn greylisting_is_transient() {
        let err = SmtpReplySender::classify("451 try again later".to_string());
        assert!(matches!(err, DeliveryError::Transient(_)));
    }

    #[test]
    fn connection_errors_are_transient() {
        let err = SmtpReplySender::classify("connection refused".to_string());
        assert!(matches!(err, DeliveryError::Transient(_)));
    }
}
