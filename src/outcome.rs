//! Choosing and carrying out the single result of an invocation.
//!
//! First match wins: a rejected option clause mails an error report, a dry
//! run mails a preview, anything else schedules the fax.

use std::path::{Path, PathBuf};

use crate::callfile::CallFile;
use crate::config::{Destination, GatewayConfig};
use crate::convert::raster::FaxArtifact;
use crate::error::{Error, MailError};
use crate::mail::sender::{Mailer, OutgoingMail};
use crate::options::ParsedOptions;
use crate::workspace::InvocationId;

pub const ERROR_PREFIX: &str = "[ERROR] ";
pub const DRY_RUN_PREFIX: &str = "[DRY-RUN] ";

const OPTION_HELP: &str = "Options go in braces at the end of the subject, e.g. {-q fine -t plain}:\n\
  -q, --quality normal|fine|super\n\
  -t, --text none|plain|markdown|html\n\
  --dry-run";

/// A report mailed back to the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<PathBuf>,
}

impl Report {
    fn into_mail(self) -> OutgoingMail {
        OutgoingMail {
            to: self.to,
            subject: self.subject,
            body: self.body,
            attachments: self.attachment.into_iter().collect(),
        }
    }
}

/// The one thing an invocation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Transmit(CallFile),
    DryRun(Report),
    Error(Report),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Transmit(_) => "transmit",
            Self::DryRun(_) => "dry-run",
            Self::Error(_) => "error",
        }
    }

    /// Decide the outcome.
    ///
    /// Transmissions and previews carry the subject without its option
    /// clause; error reports echo the subject as received so the sender sees
    /// the clause that was rejected. `reply_to` is the Reply-To (else From)
    /// address, if any.
    pub fn decide(
        config: &GatewayConfig,
        destination: &Destination,
        parsed: &ParsedOptions,
        reply_to: Option<String>,
        artifact: &FaxArtifact,
    ) -> Result<Self, MailError> {
        let or_default = |s: &str| {
            if s.trim().is_empty() {
                format!("Send Fax to {}", destination.number)
            } else {
                s.to_string()
            }
        };
        let subject = or_default(&parsed.subject);
        let attachment = artifact.path().map(Path::to_path_buf);

        if let Some(error) = &parsed.error {
            let to = reply_to.ok_or(MailError::MissingSender)?;
            return Ok(Self::Error(Report {
                to,
                subject: format!("{ERROR_PREFIX}{}", or_default(&parsed.original)),
                body: format!(
                    "The fax to {} was not sent.\n\n\
                     The options in the subject could not be understood: {error}\n\n\
                     {OPTION_HELP}\n",
                    destination.number
                ),
                attachment,
            }));
        }

        if parsed.options.dry_run {
            let to = reply_to.ok_or(MailError::MissingSender)?;
            let pages = match artifact {
                FaxArtifact::Image(_) => "The rendered fax is attached.",
                FaxArtifact::Empty => "No pages could be extracted from the message.",
            };
            return Ok(Self::DryRun(Report {
                to,
                subject: format!("{DRY_RUN_PREFIX}{subject}"),
                body: format!(
                    "Dry run: the fax to {} was not sent.\n\n\
                     Quality: {}\nText: {}\n\n{pages}\n",
                    destination.number, parsed.options.quality, parsed.options.text_mode
                ),
                attachment,
            }));
        }

        Ok(Self::Transmit(CallFile {
            channel: config.dial_string(&destination.number, &destination.trunk),
            context: destination.context.clone(),
            fax_file: artifact.callfile_value(),
            fax_number: destination.number.clone(),
            reply_to: reply_to.unwrap_or_default(),
            subject,
        }))
    }

    /// Perform the outcome's side effect: write the call-file or send the
    /// report, never both.
    pub async fn execute(
        self,
        outgoing_dir: &Path,
        id: &InvocationId,
        mailer: &dyn Mailer,
    ) -> Result<Dispatched, Error> {
        match self {
            Self::Transmit(call) => {
                let dir = outgoing_dir.to_path_buf();
                let id = id.clone();
                let path = tokio::task::spawn_blocking(move || call.write_atomic(&dir, &id))
                    .await
                    .map_err(std::io::Error::other)??;
                Ok(Dispatched::CallFile(path))
            }
            Self::DryRun(report) | Self::Error(report) => {
                let to = report.to.clone();
                mailer.send(&report.into_mail()).await?;
                Ok(Dispatched::Mailed(to))
            }
        }
    }
}

/// What [`Outcome::execute`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    CallFile(PathBuf),
    Mailed(String),
}
