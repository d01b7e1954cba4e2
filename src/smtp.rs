//! SMTP transport
//!
//! Mail is composed once and delivered through the first relay that accepts
//! it. Every attempt opens its own connection and closes it after `QUIT`.

use hubclient_core_resilience::{Endpoint, EndpointRegistry, FailoverExecutor, Redactor, RegistryError};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{SmtpConfig, SmtpSessionConfig};
use crate::error::SmtpError;

pub const DEFAULT_SMTP_PORT: u16 = 25;

/// One configured relay
#[derive(Debug, Clone)]
pub struct SmtpSession {
    alias: String,
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    tls: bool,
    timeout: Duration,
}

impl SmtpSession {
    pub fn new(config: &SmtpSessionConfig) -> Result<Self, SmtpError> {
        if config.host.trim().is_empty() {
            return Err(RegistryError::Invalid {
                alias: config.alias.clone(),
                reason: "host is required".to_string(),
            }
            .into());
        }

        let credentials = config.username.as_ref().map(|user| {
            (user.clone(), config.password.clone().unwrap_or_default())
        });

        Ok(Self {
            alias: config.alias.clone(),
            host: config.host.trim().to_string(),
            port: config.port.unwrap_or(DEFAULT_SMTP_PORT),
            credentials,
            tls: config.tls,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn transport(&self) -> Result<SmtpTransport, SmtpError> {
        let builder = if self.tls {
            SmtpTransport::starttls_relay(&self.host).map_err(|source| SmtpError::Delivery {
                alias: self.alias.clone(),
                source,
            })?
        } else {
            SmtpTransport::builder_dangerous(&self.host)
        };

        let mut builder = builder.port(self.port).timeout(Some(self.timeout));
        if let Some((ref user, ref password)) = self.credentials {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }
        Ok(builder.build())
    }

    /// Deliver over a fresh connection
    fn send(&self, message: &Message) -> Result<(), SmtpError> {
        debug!(alias = %self.alias, "Connecting to {}:{}", self.host, self.port);
        self.transport()?
            .send(message)
            .map(|response| {
                debug!(alias = %self.alias, "Relay replied {}", response.code());
            })
            .map_err(|source| SmtpError::Delivery {
                alias: self.alias.clone(),
                source,
            })
    }
}

impl Endpoint for SmtpSession {
    const KIND: &'static str = "smtp";

    fn alias(&self) -> &str {
        &self.alias
    }

    fn validate(&self) -> Result<(), RegistryError> {
        if self.host.is_empty() {
            return Err(RegistryError::Invalid {
                alias: self.alias.clone(),
                reason: "host is required".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAttachment {
    pub file_name: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// An outgoing message
///
/// # Example
/// ```
/// use hubclient::smtp::Mail;
///
/// let mail = Mail::new("till@store.local", "Z-report", "Daily totals attached")
///     .to("office@store.local")
///     .attach("z-report.csv", b"total;125.50\n".to_vec());
///
/// assert!(mail.build().is_ok());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Mail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<MailAttachment>,
}

impl Mail {
    pub fn new(from: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            subject: subject.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    /// Attach in-memory content; the MIME type is guessed from the name
    pub fn attach(mut self, file_name: impl Into<String>, content: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let content_type = mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .to_string();
        self.attachments.push(MailAttachment {
            file_name,
            content_type,
            content,
        });
        self
    }

    pub fn attach_file(self, path: &Path) -> Result<Self, SmtpError> {
        let content = std::fs::read(path).map_err(|source| SmtpError::Attachment {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        Ok(self.attach(file_name, content))
    }

    /// Compose the MIME message
    pub fn build(&self) -> Result<Message, SmtpError> {
        if self.to.is_empty() {
            return Err(SmtpError::Message("at least one recipient is required".to_string()));
        }

        let mut builder = Message::builder()
            .from(parse_mailbox(&self.from)?)
            .subject(self.subject.clone());
        for address in &self.to {
            builder = builder.to(parse_mailbox(address)?);
        }

        let text = SinglePart::plain(self.body.clone());
        let message = if self.attachments.is_empty() {
            builder.singlepart(text)
        } else {
            let mut parts = MultiPart::mixed().singlepart(text);
            for attachment in &self.attachments {
                let content_type = ContentType::parse(&attachment.content_type)
                    .map_err(|e| SmtpError::Message(format!("{}: {}", attachment.file_name, e)))?;
                parts = parts.singlepart(
                    Attachment::new(attachment.file_name.clone())
                        .body(attachment.content.clone(), content_type),
                );
            }
            builder.multipart(parts)
        };

        message.map_err(|e| SmtpError::Message(e.to_string()))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, SmtpError> {
    address
        .parse()
        .map_err(|e| SmtpError::Message(format!("invalid address '{}': {}", address, e)))
}

/// Mail sender with relay failover
#[derive(Debug)]
pub struct SmtpFactory {
    sessions: EndpointRegistry<SmtpSession>,
    executor: FailoverExecutor,
    redactor: Redactor,
}

impl SmtpFactory {
    pub fn new(config: &SmtpConfig, redactor: Redactor) -> Result<Self, SmtpError> {
        let sessions = config
            .sessions
            .iter()
            .map(SmtpSession::new)
            .collect::<Result<Vec<_>, _>>()?;
        let sessions = EndpointRegistry::new(sessions)?;

        info!("SMTP factory ready: sessions [{}]", sessions.aliases().join(", "));

        Ok(Self {
            sessions,
            executor: FailoverExecutor::new(config.failover.into()),
            redactor,
        })
    }

    pub fn sessions(&self) -> &EndpointRegistry<SmtpSession> {
        &self.sessions
    }

    pub fn send(&self, mail: &Mail) -> Result<(), SmtpError> {
        let message = mail.build()?;
        debug!(
            "Sending '{}' to {} ({} attachments): {}",
            mail.subject,
            mail.to.join(", "),
            mail.attachments.len(),
            self.redactor.redact(&mail.body)
        );
        self.executor.run(&self.sessions, |session| session.send(&message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_session_defaults() {
        let session = SmtpSession::new(&SmtpSessionConfig {
            alias: "relay".into(),
            host: " mail.store.local ".into(),
            timeout_secs: 10,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(session.host(), "mail.store.local");
        assert_eq!(session.port(), DEFAULT_SMTP_PORT);
    }

    #[test]
    fn test_missing_host_rejected() {
        let err = SmtpSession::new(&SmtpSessionConfig {
            alias: "relay".into(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, SmtpError::Registry(RegistryError::Invalid { .. })));
    }

    #[test]
    fn test_no_sessions_rejected() {
        let err = SmtpFactory::new(
            &SmtpConfig {
                sessions: Vec::new(),
                failover: Default::default(),
            },
            Redactor::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SmtpError::Registry(RegistryError::Empty { kind: "smtp" })));
    }

    #[test]
    fn test_mail_without_recipients_rejected() {
        let err = Mail::new("till@store.local", "s", "b").build().unwrap_err();
        assert!(matches!(err, SmtpError::Message(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_invalid_address_rejected() {
        let err = Mail::new("not an address", "s", "b")
            .to("office@store.local")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("not an address"));
    }

    #[test]
    fn test_attachment_content_type_guessed() {
        let mail = Mail::new("till@store.local", "s", "b")
            .to("office@store.local")
            .attach("batch.zip", vec![1, 2, 3])
            .attach("blob", vec![4]);
        assert_eq!(mail.attachments[0].content_type, "application/zip");
        assert_eq!(mail.attachments[1].content_type, "application/octet-stream");

        let formatted = String::from_utf8(mail.build().unwrap().formatted()).unwrap();
        assert!(formatted.contains("multipart/mixed"));
        assert!(formatted.contains("batch.zip"));
    }

    #[test]
    fn test_attach_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"total;125.50").unwrap();

        let mail = Mail::new("till@store.local", "s", "b")
            .attach_file(file.path())
            .unwrap();
        assert_eq!(mail.attachments[0].content, b"total;125.50");

        let err = Mail::new("till@store.local", "s", "b")
            .attach_file(Path::new("/nonexistent/report.csv"))
            .unwrap_err();
        assert!(matches!(err, SmtpError::Attachment { .. }));
    }
}
