//! Configuration types.
//!
//! Everything is read once at startup (environment plus the positional
//! arguments) and then shared immutably with the pipeline.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::convert::command::{CommandTemplate, DEFAULT_TIMEOUT};
use crate::convert::raster::QualityTable;
use crate::error::ConfigError;
use crate::options::{OptionSet, Quality, TextMode};

/// Default dial string, as used with an Asterisk SIP trunk.
pub const DEFAULT_DIAL_TEMPLATE: &str = "SIP/{number}@{trunk}";

/// What to do when one part fails to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversionFailurePolicy {
    /// Log it; the part contributes no page.
    #[default]
    Skip,
    /// Fail the whole invocation.
    Abort,
}

impl FromStr for ConversionFailurePolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "abort" => Ok(Self::Abort),
            _ => Err(()),
        }
    }
}

/// Argument-vector templates for every external converter.
#[derive(Debug, Clone)]
pub struct ConverterCommands {
    pub image_to_pdf: CommandTemplate,
    pub text_to_pdf: CommandTemplate,
    pub html_to_pdf: CommandTemplate,
    pub rasterize: CommandTemplate,
    pub tiff_to_pdf: CommandTemplate,
}

impl Default for ConverterCommands {
    fn default() -> Self {
        Self {
            image_to_pdf: CommandTemplate::new(["convert", "{input}", "{output}"]),
            text_to_pdf: CommandTemplate::new([
                "wkhtmltopdf",
                "-q",
                "--dpi",
                "{dpi}",
                "--encoding",
                "{encoding}",
                "{input}",
                "{output}",
            ]),
            html_to_pdf: CommandTemplate::new([
                "wkhtmltopdf",
                "-q",
                "--dpi",
                "{dpi}",
                "--encoding",
                "utf-8",
                "{input}",
                "{output}",
            ]),
            rasterize: CommandTemplate::new([
                "gs",
                "-q",
                "-dNOPAUSE",
                "-dBATCH",
                "-dSAFER",
                "-sDEVICE=tiffg3",
                "-sPAPERSIZE=a4",
                "-dFIXEDMEDIA",
                "-dPDFFitPage",
                "-r{resolution}",
                "-sOutputFile={output}",
                "{inputs}",
            ]),
            tiff_to_pdf: CommandTemplate::new(["convert", "{input}", "{output}"]),
        }
    }
}

/// Gateway configuration shared by every invocation.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Scratch directory for per-part files.
    pub work_dir: PathBuf,
    /// Where finished fax images are kept for the dialer.
    pub fax_dir: PathBuf,
    /// The dialer's call-file inbox.
    pub outgoing_dir: PathBuf,
    /// Dial string with `{number}` and `{trunk}` placeholders.
    pub dial_template: String,
    /// Options used when the subject carries no clause.
    pub defaults: OptionSet,
    /// Rendering resolution passed to the text/HTML converters.
    pub dpi: u32,
    pub quality: QualityTable,
    pub commands: ConverterCommands,
    pub convert_timeout: Duration,
    pub on_convert_failure: ConversionFailurePolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp"),
            fax_dir: PathBuf::from("/var/spool/asterisk/fax"),
            outgoing_dir: PathBuf::from("/var/spool/asterisk/outgoing"),
            dial_template: DEFAULT_DIAL_TEMPLATE.to_string(),
            defaults: OptionSet::default(),
            dpi: 200,
            quality: QualityTable::default(),
            commands: ConverterCommands::default(),
            convert_timeout: DEFAULT_TIMEOUT,
            on_convert_failure: ConversionFailurePolicy::default(),
        }
    }
}

impl GatewayConfig {
    /// Build config from `FAXGATE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(dir) = lookup("FAXGATE_WORK_DIR") {
            config.work_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("FAXGATE_FAX_DIR") {
            config.fax_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("FAXGATE_OUTGOING_DIR") {
            config.outgoing_dir = PathBuf::from(dir);
        }
        if let Some(template) = lookup("FAXGATE_DIAL_TEMPLATE") {
            if !template.contains("{number}") {
                return Err(invalid("FAXGATE_DIAL_TEMPLATE", "must contain {number}"));
            }
            config.dial_template = template;
        }

        if let Some(mode) = lookup("FAXGATE_TEXT_MODE") {
            config.defaults.text_mode = parse_value::<TextMode>("FAXGATE_TEXT_MODE", &mode)?;
        }
        if let Some(quality) = lookup("FAXGATE_QUALITY") {
            config.defaults.quality = parse_value::<Quality>("FAXGATE_QUALITY", &quality)?;
        }
        if let Some(dry_run) = lookup("FAXGATE_DRY_RUN") {
            config.defaults.dry_run = parse_bool("FAXGATE_DRY_RUN", &dry_run)?;
        }

        if let Some(dpi) = lookup("FAXGATE_DPI") {
            config.dpi = dpi
                .trim()
                .parse()
                .ok()
                .filter(|&d| d > 0)
                .ok_or_else(|| invalid("FAXGATE_DPI", "expected a positive integer"))?;
        }
        if let Some(secs) = lookup("FAXGATE_CONVERT_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .ok()
                .filter(|&s| s > 0)
                .ok_or_else(|| invalid("FAXGATE_CONVERT_TIMEOUT_SECS", "expected a positive integer"))?;
            config.convert_timeout = Duration::from_secs(secs);
        }
        if let Some(policy) = lookup("FAXGATE_ON_CONVERT_FAILURE") {
            config.on_convert_failure =
                parse_value::<ConversionFailurePolicy>("FAXGATE_ON_CONVERT_FAILURE", &policy)?;
        }

        let commands = &mut config.commands;
        for (key, slot) in [
            ("FAXGATE_CMD_IMAGE", &mut commands.image_to_pdf),
            ("FAXGATE_CMD_TEXT", &mut commands.text_to_pdf),
            ("FAXGATE_CMD_HTML", &mut commands.html_to_pdf),
            ("FAXGATE_CMD_RASTER", &mut commands.rasterize),
            ("FAXGATE_CMD_TIFF_TO_PDF", &mut commands.tiff_to_pdf),
        ] {
            if let Some(template) = lookup(key) {
                *slot = CommandTemplate::parse(&template)
                    .ok_or_else(|| invalid(key, "expected a non-empty shell-style command"))?;
            }
        }

        Ok(config)
    }

    /// Dial string for `number` over `trunk`.
    pub fn dial_string(&self, number: &str, trunk: &str) -> String {
        self.dial_template
            .replace("{number}", number)
            .replace("{trunk}", trunk)
    }
}

/// Where one message is faxed to, from the positional arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Dialplan context the call-file starts in.
    pub context: String,
    pub trunk: String,
    pub number: String,
}

impl Destination {
    pub fn new(context: impl Into<String>, trunk: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            trunk: trunk.into(),
            number: number.into(),
        }
    }

    /// Parse `<context> <trunk> <fax-number>`.
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let args: Vec<String> = args.into_iter().collect();
        let [context, trunk, number] = <[String; 3]>::try_from(args).map_err(|args| ConfigError::InvalidValue {
            key: "arguments".to_string(),
            message: format!("expected <context> <trunk> <fax-number>, got {} argument(s)", args.len()),
        })?;
        if number.trim().is_empty() {
            return Err(invalid("fax-number", "must not be empty"));
        }
        Ok(Self::new(context, trunk, number))
    }
}

/// Outbound mail settings for the report outcomes.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// When set, the relay is used over TLS with these credentials.
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub from_address: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "127.0.0.1".to_string(),
            smtp_port: 25,
            username: None,
            password: None,
            from_address: "noreply@example.com".to_string(),
        }
    }
}

impl MailConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(host) = lookup("FAXGATE_SMTP_HOST") {
            config.smtp_host = host;
        }
        if let Some(port) = lookup("FAXGATE_SMTP_PORT") {
            config.smtp_port = port
                .trim()
                .parse()
                .map_err(|_| invalid("FAXGATE_SMTP_PORT", "expected a port number"))?;
        }
        config.username = lookup("FAXGATE_SMTP_USERNAME").filter(|u| !u.is_empty());
        config.password = lookup("FAXGATE_SMTP_PASSWORD").map(SecretString::from);
        if config.username.is_some() && config.password.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "FAXGATE_SMTP_PASSWORD".to_string(),
                hint: "Required when FAXGATE_SMTP_USERNAME is set.".to_string(),
            });
        }
        if let Some(from) = lookup("FAXGATE_MAIL_FROM") {
            config.from_address = from;
        }

        Ok(config)
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .to_ascii_lowercase()
        .parse()
        .map_err(|_| invalid(key, &format!("unrecognized value {value:?}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(invalid(key, &format!("expected a boolean, got {value:?}"))),
    }
}
