//! Asterisk call-files.
//!
//! A call-file dropped into the dialer's outgoing directory schedules one fax
//! transmission. The dialer may pick a file up as soon as it appears, so it is
//! written to a temporary file in the same directory and renamed into place.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::error::CallFileError;
use crate::workspace::InvocationId;

pub const WAIT_TIME: u32 = 30;
pub const MAX_RETRIES: u32 = 2;
pub const RETRY_TIME: u32 = 300;
pub const EXTENSION: &str = "send";
pub const PRIORITY: u32 = 1;

/// Permissions of the committed file; the dialer usually runs as another user.
#[cfg(unix)]
const CALLFILE_MODE: u32 = 0o644;

/// One scheduled transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFile {
    pub channel: String,
    pub context: String,
    /// `FAXFILE`: the fax image path, or the empty marker.
    pub fax_file: String,
    pub fax_number: String,
    pub reply_to: String,
    pub subject: String,
}

impl CallFile {
    /// Serialize in the dialer's `Key: value` format.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(256);
        let mut line = |key: &str, value: &str| {
            let _ = writeln!(out, "{key}: {}", single_line(value));
        };
        line("Channel", &self.channel);
        line("WaitTime", &WAIT_TIME.to_string());
        line("MaxRetries", &MAX_RETRIES.to_string());
        line("RetryTime", &RETRY_TIME.to_string());
        line("Archive", "yes");
        line("Context", &self.context);
        line("Extension", EXTENSION);
        line("Priority", &PRIORITY.to_string());
        line("Set", &format!("FAXFILE={}", self.fax_file));
        line("Set", &format!("FAXNUMBER={}", self.fax_number));
        line("Set", &format!("REPLYTO={}", self.reply_to));
        line("Set", &format!("SUBJECT={}", self.subject));
        out
    }

    /// Read a rendered call-file back.
    ///
    /// Fixed keys are checked against the values this gateway writes; unknown
    /// keys and `Set` variables are rejected.
    pub fn parse(text: &str) -> Result<Self, CallFileError> {
        let mut channel = None;
        let mut context = None;
        let mut fax_file = None;
        let mut fax_number = None;
        let mut reply_to = None;
        let mut subject = None;

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            if raw.trim().is_empty() {
                continue;
            }
            let malformed = |reason: String| CallFileError::Malformed { line, reason };

            let (key, value) = raw
                .split_once(": ")
                .ok_or_else(|| malformed("expected `Key: value`".to_string()))?;

            let fixed = |expected: &str| {
                if value == expected {
                    Ok(())
                } else {
                    Err(malformed(format!("{key} must be {expected}, got {value:?}")))
                }
            };

            match key {
                "Channel" => channel = Some(value.to_string()),
                "Context" => context = Some(value.to_string()),
                "WaitTime" => fixed(&WAIT_TIME.to_string())?,
                "MaxRetries" => fixed(&MAX_RETRIES.to_string())?,
                "RetryTime" => fixed(&RETRY_TIME.to_string())?,
                "Archive" => fixed("yes")?,
                "Extension" => fixed(EXTENSION)?,
                "Priority" => fixed(&PRIORITY.to_string())?,
                "Set" => {
                    let (name, var) = value
                        .split_once('=')
                        .ok_or_else(|| malformed("expected `Set: NAME=value`".to_string()))?;
                    let slot = match name {
                        "FAXFILE" => &mut fax_file,
                        "FAXNUMBER" => &mut fax_number,
                        "REPLYTO" => &mut reply_to,
                        "SUBJECT" => &mut subject,
                        other => return Err(malformed(format!("unknown variable {other}"))),
                    };
                    *slot = Some(var.to_string());
                }
                other => return Err(malformed(format!("unknown key {other}"))),
            }
        }

        let missing = |what: &str| CallFileError::Malformed {
            line: 0,
            reason: format!("missing {what}"),
        };
        Ok(Self {
            channel: channel.ok_or_else(|| missing("Channel"))?,
            context: context.ok_or_else(|| missing("Context"))?,
            fax_file: fax_file.ok_or_else(|| missing("FAXFILE"))?,
            fax_number: fax_number.ok_or_else(|| missing("FAXNUMBER"))?,
            reply_to: reply_to.ok_or_else(|| missing("REPLYTO"))?,
            subject: subject.ok_or_else(|| missing("SUBJECT"))?,
        })
    }

    /// Commit to `<outgoing_dir>/<id>.call`.
    ///
    /// Either the complete file appears under its final name or nothing does.
    /// An existing file with the same name is never replaced.
    pub fn write_atomic(&self, outgoing_dir: &Path, id: &InvocationId) -> Result<PathBuf, CallFileError> {
        let path = outgoing_dir.join(format!("{id}.call"));

        std::fs::create_dir_all(outgoing_dir)?;
        let mut tf = tempfile::NamedTempFile::new_in(outgoing_dir)?;
        tf.as_file_mut().write_all(self.render().as_bytes())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(tf.path(), std::fs::Permissions::from_mode(CALLFILE_MODE))?;
        }
        tf.as_file_mut().sync_all()?;
        tf.persist_noclobber(&path).map_err(|e| CallFileError::Persist {
            path: path.clone(),
            source: e.error,
        })?;

        tracing::info!(path = %path.display(), "Call-file committed");
        Ok(path)
    }
}

/// Values must stay on their own line.
fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CallFile {
        CallFile {
            channel: "SIP/0312345678@trunk1".into(),
            context: "fax-out".into(),
            fax_file: "/var/spool/asterisk/fax/x.tif".into(),
            fax_number: "0312345678".into(),
            reply_to: "alice@example.com".into(),
            subject: "Invoice: March = paid".into(),
        }
    }

    #[test]
    fn exact_layout() {
        assert_eq!(
            sample().render(),
            "Channel: SIP/0312345678@trunk1\n\
             WaitTime: 30\n\
             MaxRetries: 2\n\
             RetryTime: 300\n\
             Archive: yes\n\
             Context: fax-out\n\
             Extension: send\n\
             Priority: 1\n\
             Set: FAXFILE=/var/spool/asterisk/fax/x.tif\n\
             Set: FAXNUMBER=0312345678\n\
             Set: REPLYTO=alice@example.com\n\
             Set: SUBJECT=Invoice: March = paid\n"
        );
    }

    #[test]
    fn parse_recovers_fields() {
        let call = sample();
        assert_eq!(CallFile::parse(&call.render()).unwrap(), call);
    }

    #[test]
    fn newlines_cannot_inject_keys() {
        let mut call = sample();
        call.subject = "hi\nChannel: SIP/evil".into();
        let text = call.render();
        assert_eq!(text.lines().count(), 12);
        assert!(text.contains("Set: SUBJECT=hi Channel: SIP/evil\n"));
        assert_eq!(CallFile::parse(&text).unwrap().channel, "SIP/0312345678@trunk1");
    }

    #[test]
    fn parse_rejects_foreign_content() {
        assert!(matches!(
            CallFile::parse("Channel SIP/x\n"),
            Err(CallFileError::Malformed { line: 1, .. })
        ));
        let wrong_retries = sample().render().replace("MaxRetries: 2", "MaxRetries: 9");
        assert!(CallFile::parse(&wrong_retries).is_err());
        assert!(CallFile::parse("Channel: SIP/x\n").is_err());
    }

    #[test]
    fn atomic_write_leaves_only_final_file() {
        let dir = tempfile::tempdir().unwrap();
        let outgoing = dir.path().join("outgoing");
        let id = InvocationId::new();

        let path = sample().write_atomic(&outgoing, &id).unwrap();

        assert_eq!(path, outgoing.join(format!("{id}.call")));
        let entries: Vec<_> = std::fs::read_dir(&outgoing).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), sample().render());
    }

    #[test]
    fn existing_file_is_not_clobbered() {
        let dir = tempfile::tempdir().unwrap();
        let id = InvocationId::new();
        std::fs::write(dir.path().join(format!("{id}.call")), "taken").unwrap();

        let result = sample().write_atomic(dir.path(), &id);

        assert!(matches!(result, Err(CallFileError::Persist { .. })));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
