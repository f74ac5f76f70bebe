use std::process::ExitCode;
use std::sync::Arc;

use tokio::io::AsyncReadExt;

use faxgate::config::{Destination, GatewayConfig, MailConfig};
use faxgate::convert::CommandConverter;
use faxgate::error::Error;
use faxgate::mail::SmtpMailer;
use faxgate::pipeline::FaxPipeline;

#[tokio::main]
async fn main() -> ExitCode {
    // Install rustls crypto provider before any TLS usage
    let _ = rustls::crypto::ring::default_provider().install_default();

    // Logs go to stderr; stdout belongs to the MTA pipe.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Fax gateway failed");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run() -> Result<(), Error> {
    let destination = Destination::from_args(std::env::args().skip(1))?;
    let config = Arc::new(GatewayConfig::from_env()?);
    let mail_config = MailConfig::from_env()?;

    let converter = Arc::new(CommandConverter::new().with_timeout(config.convert_timeout));
    let mailer = Arc::new(SmtpMailer::new(
        mail_config,
        converter.clone(),
        config.commands.tiff_to_pdf.clone(),
        config.work_dir.clone(),
    ));

    let mut raw = Vec::new();
    tokio::io::stdin().read_to_end(&mut raw).await?;

    let processed = FaxPipeline::new(config, converter, mailer)
        .process(&destination, &raw)
        .await?;

    tracing::info!(
        invocation = %processed.id,
        outcome = processed.outcome,
        pages = processed.pages,
        "Done"
    );
    Ok(())
}
