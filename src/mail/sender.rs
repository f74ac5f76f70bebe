//! Outbound report mail.
//!
//! Reports go back to the sender as a plain-text body plus the fax image.
//! Fax TIFFs are converted to PDF first since most mail clients cannot show
//! multi-page G3 TIFF.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;

use crate::config::MailConfig;
use crate::convert::command::{CommandTemplate, Converter};
use crate::error::MailError;

/// One report to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Files attached in order.
    pub attachments: Vec<PathBuf>,
}

/// Capability to deliver an [`OutgoingMail`].
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// An attachment ready to be put on the wire.
#[derive(Debug, Clone)]
struct EncodedAttachment {
    filename: String,
    content_type: String,
    data: Vec<u8>,
}

/// Sends mail through an SMTP relay with `lettre`.
pub struct SmtpMailer {
    config: MailConfig,
    converter: Arc<dyn Converter>,
    tiff_to_pdf: CommandTemplate,
    work_dir: PathBuf,
}

impl SmtpMailer {
    pub fn new(
        config: MailConfig,
        converter: Arc<dyn Converter>,
        tiff_to_pdf: CommandTemplate,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            config,
            converter,
            tiff_to_pdf,
            work_dir,
        }
    }

    /// Read every attachment, converting TIFFs to PDF where possible.
    async fn prepare_attachments(&self, paths: &[PathBuf]) -> Result<Vec<EncodedAttachment>, MailError> {
        let mut out = Vec::with_capacity(paths.len());
        for path in paths {
            let content_type = mime_guess::from_path(path).first_or_octet_stream();
            if content_type.essence_str() == "image/tiff" {
                match self.tiff_as_pdf(path).await {
                    Ok(attachment) => {
                        out.push(attachment);
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "TIFF to PDF failed, attaching TIFF");
                    }
                }
            }
            out.push(EncodedAttachment {
                filename: file_name(path),
                content_type: content_type.essence_str().to_string(),
                data: tokio::fs::read(path).await?,
            });
        }
        Ok(out)
    }

    async fn tiff_as_pdf(&self, tiff: &Path) -> Result<EncodedAttachment, Box<dyn std::error::Error + Send + Sync>> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("faxgate-mail-")
            .tempdir_in(&self.work_dir)?;
        let stem = tiff
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "fax".to_string());
        let output = scratch.path().join(format!("{stem}.pdf"));

        let job = self.tiff_to_pdf.job(vec![tiff.to_path_buf()], output.clone(), &[]);
        self.converter.run(&job).await?;

        Ok(EncodedAttachment {
            filename: format!("{stem}.pdf"),
            content_type: "application/pdf".to_string(),
            data: tokio::fs::read(&output).await?,
        })
    }

    fn build_message(&self, mail: &OutgoingMail, attachments: Vec<EncodedAttachment>) -> Result<Message, MailError> {
        let from: Mailbox = self
            .config
            .from_address
            .parse()
            .map_err(|e: lettre::address::AddressError| MailError::InvalidAddress {
                address: self.config.from_address.clone(),
                reason: e.to_string(),
            })?;
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|e: lettre::address::AddressError| MailError::InvalidAddress {
                address: mail.to.clone(),
                reason: e.to_string(),
            })?;

        let mut multipart = MultiPart::mixed().singlepart(SinglePart::plain(mail.body.clone()));
        for attachment in attachments {
            let content_type = ContentType::parse(&attachment.content_type)
                .map_err(|e| MailError::Build(format!("content type {}: {e}", attachment.content_type)))?;
            multipart = multipart
                .singlepart(MimeAttachment::new(attachment.filename).body(attachment.data, content_type));
        }

        Message::builder()
            .from(from)
            .to(to)
            .subject(mail.subject.clone())
            .date_now()
            .message_id(None)
            .multipart(multipart)
            .map_err(|e| MailError::Build(e.to_string()))
    }

    fn transport(&self) -> Result<SmtpTransport, MailError> {
        let transport = match (&self.config.username, &self.config.password) {
            (Some(username), Some(password)) => {
                let creds = Credentials::new(username.clone(), password.expose_secret().to_string());
                SmtpTransport::relay(&self.config.smtp_host)
                    .map_err(|e| MailError::Transport(format!("SMTP relay error: {e}")))?
                    .port(self.config.smtp_port)
                    .credentials(creds)
                    .build()
            }
            // Local MTA on loopback: plain SMTP, no auth.
            _ => SmtpTransport::builder_dangerous(&self.config.smtp_host)
                .port(self.config.smtp_port)
                .build(),
        };
        Ok(transport)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let attachments = self.prepare_attachments(&mail.attachments).await?;
        let email = self.build_message(mail, attachments)?;
        let transport = self.transport()?;

        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| MailError::Transport(format!("send task failed: {e}")))?
            .map_err(|e| MailError::Transport(e.to_string()))?;

        tracing::info!(to = %mail.to, subject = %mail.subject, "Report mail sent");
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string())
}
