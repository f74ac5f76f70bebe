//! Subject-line option negotiation.
//!
//! A sender can append a clause such as `{-q super --dry-run}` to the subject
//! to override the gateway defaults for one message. The clause is applied
//! all-or-nothing: if any token fails to parse, none of the flags take effect
//! and the caller gets an error signal instead of a partial merge.

use std::fmt;
use std::str::FromStr;

/// How (and whether) a text body is turned into a fax page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextMode {
    /// Text parts are ignored.
    #[default]
    None,
    /// `text/plain` rendered as-is.
    Plain,
    /// `text/plain` rendered as markdown.
    Markdown,
    /// `text/html` rendered as a web page.
    Html,
}

impl TextMode {
    /// The `text/*` subtype this mode accepts, if any.
    pub fn accepted_subtype(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Plain | Self::Markdown => Some("plain"),
            Self::Html => Some("html"),
        }
    }
}

impl FromStr for TextMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "plain" => Ok(Self::Plain),
            "markdown" => Ok(Self::Markdown),
            "html" => Ok(Self::Html),
            _ => Err(()),
        }
    }
}

impl fmt::Display for TextMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Plain => "plain",
            Self::Markdown => "markdown",
            Self::Html => "html",
        })
    }
}

/// Fax resolution preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    #[default]
    Normal,
    Fine,
    Super,
}

impl FromStr for Quality {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "fine" => Ok(Self::Fine),
            "super" => Ok(Self::Super),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::Fine => "fine",
            Self::Super => "super",
        })
    }
}

/// Fully resolved options for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptionSet {
    pub text_mode: TextMode,
    pub quality: Quality,
    pub dry_run: bool,
}

/// Why a subject clause was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptionError {
    #[error("unbalanced quoting in option clause")]
    Tokenize,

    #[error("unknown option {0}")]
    UnknownFlag(String),

    #[error("option {0} requires a value")]
    MissingValue(String),

    #[error("invalid value {value:?} for {flag}")]
    InvalidValue { flag: String, value: String },

    #[error("unexpected argument {0:?}")]
    UnexpectedArgument(String),
}

/// Result of negotiating options from a subject line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOptions {
    /// The options to use. Always exactly the defaults when `error` is set.
    pub options: OptionSet,
    /// Subject with the option clause removed.
    pub subject: String,
    /// Subject as received, clause included.
    pub original: String,
    /// Set when a clause was present but failed to parse.
    pub error: Option<OptionError>,
}

impl ParsedOptions {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Split a trailing `{...}` clause off the subject.
///
/// Returns the remaining subject and the clause body, if present.
pub fn split_clause(subject: &str) -> (&str, Option<&str>) {
    let trimmed = subject.trim_end();
    if !trimmed.ends_with('}') {
        return (trimmed, None);
    }
    match trimmed.rfind('{') {
        Some(open) => (
            trimmed[..open].trim_end(),
            Some(&trimmed[open + 1..trimmed.len() - 1]),
        ),
        None => (trimmed, None),
    }
}

/// Negotiate options from a decoded subject line.
pub fn parse_subject(subject: &str, defaults: &OptionSet) -> ParsedOptions {
    let (rest, clause) = split_clause(subject);
    let (options, error) = match clause.map(|c| parse_clause(c, defaults)) {
        None => (*defaults, None),
        Some(Ok(options)) => (options, None),
        Some(Err(e)) => (*defaults, Some(e)),
    };

    ParsedOptions {
        options,
        subject: rest.to_string(),
        original: subject.trim().to_string(),
        error,
    }
}

/// Parse the body of an option clause on top of `defaults`.
///
/// Short flags take their value as the next token or attached (`-qsuper`).
/// Long flags take it as the next token or after `=`; they must be spelled
/// out in full.
pub fn parse_clause(clause: &str, defaults: &OptionSet) -> Result<OptionSet, OptionError> {
    let tokens = shlex::split(clause).ok_or(OptionError::Tokenize)?;
    let mut options = *defaults;
    let mut iter = tokens.into_iter();

    while let Some(token) = iter.next() {
        let (flag, inline) = match token.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => {
                (flag.to_string(), Some(value.to_string()))
            }
            _ => match split_short(&token) {
                Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
                None => (token.clone(), None),
            },
        };

        match flag.as_str() {
            "--dry-run" if inline.is_none() => options.dry_run = true,
            "-q" | "--quality" => {
                let value = inline
                    .or_else(|| iter.next())
                    .ok_or_else(|| OptionError::MissingValue(flag.clone()))?;
                options.quality = value
                    .parse()
                    .map_err(|()| OptionError::InvalidValue {
                        flag: flag.clone(),
                        value,
                    })?;
            }
            "-t" | "--text" => {
                let value = inline
                    .or_else(|| iter.next())
                    .ok_or_else(|| OptionError::MissingValue(flag.clone()))?;
                options.text_mode = value
                    .parse()
                    .map_err(|()| OptionError::InvalidValue {
                        flag: flag.clone(),
                        value,
                    })?;
            }
            f if f.starts_with('-') => return Err(OptionError::UnknownFlag(f.to_string())),
            other => return Err(OptionError::UnexpectedArgument(other.to_string())),
        }
    }

    Ok(options)
}

/// `-qsuper` -> (`-q`, `super`).
fn split_short(token: &str) -> Option<(&str, &str)> {
    if token.starts_with("--") || token.len() <= 2 {
        return None;
    }
    match token.split_at_checked(2)? {
        (flag @ ("-q" | "-t"), value) => Some((flag, value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> OptionSet {
        OptionSet {
            text_mode: TextMode::Plain,
            quality: Quality::Fine,
            dry_run: false,
        }
    }

    #[test]
    fn no_clause_returns_defaults() {
        let parsed = parse_subject("Invoice 42", &defaults());
        assert_eq!(parsed.options, defaults());
        assert_eq!(parsed.subject, "Invoice 42");
        assert!(!parsed.is_error());
    }

    #[test]
    fn quality_override() {
        let parsed = parse_subject("Invoice {-q super}", &defaults());
        assert_eq!(parsed.options.quality, Quality::Super);
        assert_eq!(parsed.options.text_mode, TextMode::Plain);
        assert_eq!(parsed.subject, "Invoice");
    }

    #[test]
    fn long_flags_and_inline_values() {
        let parsed = parse_subject("x {--quality=normal --text markdown --dry-run}", &defaults());
        assert_eq!(
            parsed.options,
            OptionSet {
                text_mode: TextMode::Markdown,
                quality: Quality::Normal,
                dry_run: true,
            }
        );
    }

    #[test]
    fn unknown_quality_is_error() {
        let parsed = parse_subject("x {-q ultra}", &defaults());
        assert_eq!(
            parsed.error,
            Some(OptionError::InvalidValue {
                flag: "-q".into(),
                value: "ultra".into()
            })
        );
        assert_eq!(parsed.options, defaults());
    }

    #[test]
    fn error_applies_nothing() {
        // --dry-run parses fine, but the clause as a whole does not.
        let parsed = parse_subject("x {--dry-run -t badformat}", &defaults());
        assert!(parsed.is_error());
        assert!(!parsed.options.dry_run);
    }

    #[test]
    fn unknown_flag_and_stray_argument() {
        assert_eq!(
            parse_clause("--verbose", &defaults()),
            Err(OptionError::UnknownFlag("--verbose".into()))
        );
        assert_eq!(
            parse_clause("super", &defaults()),
            Err(OptionError::UnexpectedArgument("super".into()))
        );
        assert_eq!(
            parse_clause("--dry-run=yes", &defaults()),
            Err(OptionError::UnknownFlag("--dry-run".into()))
        );
    }

    #[test]
    fn attached_short_values() {
        let parsed = parse_subject("x {-qsuper -tmarkdown}", &defaults());
        assert!(!parsed.is_error());
        assert_eq!(parsed.options.quality, Quality::Super);
        assert_eq!(parsed.options.text_mode, TextMode::Markdown);

        assert_eq!(
            parse_clause("-qultra", &defaults()),
            Err(OptionError::InvalidValue {
                flag: "-q".into(),
                value: "ultra".into()
            })
        );
    }

    #[test]
    fn long_flags_are_not_abbreviated() {
        assert_eq!(
            parse_clause("--qual super", &defaults()),
            Err(OptionError::UnknownFlag("--qual".into()))
        );
    }

    #[test]
    fn original_subject_keeps_clause() {
        let parsed = parse_subject("  Invoice {-q ultra} ", &defaults());
        assert_eq!(parsed.subject, "Invoice");
        assert_eq!(parsed.original, "Invoice {-q ultra}");
    }

    #[test]
    fn missing_value() {
        assert_eq!(
            parse_clause("-q", &defaults()),
            Err(OptionError::MissingValue("-q".into()))
        );
    }

    #[test]
    fn unbalanced_quote() {
        assert_eq!(parse_clause("-t 'plain", &defaults()), Err(OptionError::Tokenize));
    }

    #[test]
    fn empty_clause_is_valid() {
        let parsed = parse_subject("Report {}", &defaults());
        assert!(!parsed.is_error());
        assert_eq!(parsed.options, defaults());
        assert_eq!(parsed.subject, "Report");
    }

    #[test]
    fn clause_must_be_trailing() {
        let parsed = parse_subject("{-q super} Report", &defaults());
        assert_eq!(parsed.options, defaults());
        assert_eq!(parsed.subject, "{-q super} Report");
    }

    #[test]
    fn trailing_whitespace_after_clause() {
        let parsed = parse_subject("Report {-t html}  ", &defaults());
        assert_eq!(parsed.options.text_mode, TextMode::Html);
    }

    #[test]
    fn text_none_disables_text() {
        let parsed = parse_subject("{-t none}", &defaults());
        assert_eq!(parsed.options.text_mode, TextMode::None);
        assert_eq!(parsed.subject, "");
        assert_eq!(TextMode::None.accepted_subtype(), None);
        assert_eq!(TextMode::Markdown.accepted_subtype(), Some("plain"));
    }
}
