//! One gateway invocation, end to end.
//!
//! Flow:
//! 1. Parse the message and negotiate options from its subject
//! 2. Convert accepted parts to PDFs, in document order
//! 3. Rasterize the PDFs into one fax image
//! 4. Decide the outcome and perform its single side effect

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{Destination, GatewayConfig};
use crate::convert::command::Converter;
use crate::convert::dispatch::ConverterDispatcher;
use crate::convert::raster::{FaxArtifact, FaxRasterizer};
use crate::error::Error;
use crate::mail::message::InboundMessage;
use crate::mail::sender::Mailer;
use crate::options::parse_subject;
use crate::outcome::{Dispatched, Outcome};
use crate::workspace::{InvocationId, Workspace};

/// Summary of a finished invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed {
    pub id: InvocationId,
    pub outcome: &'static str,
    pub pages: usize,
    pub dispatched: Dispatched,
}

pub struct FaxPipeline {
    config: Arc<GatewayConfig>,
    converter: Arc<dyn Converter>,
    mailer: Arc<dyn Mailer>,
}

impl FaxPipeline {
    pub fn new(config: Arc<GatewayConfig>, converter: Arc<dyn Converter>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            config,
            converter,
            mailer,
        }
    }

    /// Process one raw message bound for `destination`.
    pub async fn process(&self, destination: &Destination, raw: &[u8]) -> Result<Processed, Error> {
        self.process_with_id(destination, raw, InvocationId::new()).await
    }

    /// Like [`process`](Self::process) with a caller-chosen invocation id.
    pub async fn process_with_id(
        &self,
        destination: &Destination,
        raw: &[u8],
        id: InvocationId,
    ) -> Result<Processed, Error> {
        let config = &self.config;
        let message = InboundMessage::parse(raw)?;

        // Options are settled before anything is converted.
        let parsed = parse_subject(&message.subject(), &config.defaults);
        info!(
            invocation = %id,
            number = %destination.number,
            parts = message.parts().len(),
            quality = %parsed.options.quality,
            text = %parsed.options.text_mode,
            dry_run = parsed.options.dry_run,
            "Processing fax message"
        );
        if let Some(e) = &parsed.error {
            warn!(invocation = %id, error = %e, "Option clause rejected, using defaults");
        }

        let mut workspace = Workspace::with_id(config.work_dir.clone(), id);
        workspace.ensure_dirs().await?;

        let pdfs = ConverterDispatcher::new(self.converter.as_ref(), config)
            .dispatch(message.parts(), parsed.options.text_mode, &mut workspace)
            .await?;
        debug!(invocation = %workspace.id(), pages = pdfs.len(), "Parts converted");

        // The fax image stays tracked until a call-file that names it is
        // committed; any earlier exit removes it.
        let fax_path = config.fax_dir.join(format!("{}.tif", workspace.id()));
        let mut spool = Workspace::with_id(config.fax_dir.clone(), workspace.id().clone());
        spool.track(fax_path.clone());

        let artifact = FaxRasterizer::new(self.converter.as_ref(), &config.commands.rasterize, &config.quality)
            .rasterize(&pdfs, parsed.options.quality, fax_path)
            .await
            .map_err(Error::Raster)?;

        // Per-part files are no longer needed once the fax image exists.
        workspace.cleanup();

        let outcome = Outcome::decide(config, destination, &parsed, message.reply_address(), &artifact)?;
        let label = outcome.label();
        info!(invocation = %workspace.id(), outcome = label, "Outcome decided");

        let dispatched = outcome
            .execute(&config.outgoing_dir, workspace.id(), self.mailer.as_ref())
            .await?;

        // Only a committed transmission needs the image after this invocation.
        if let Dispatched::CallFile(_) = &dispatched
            && let FaxArtifact::Image(path) = &artifact
        {
            spool.release(path);
        }

        Ok(Processed {
            id: workspace.id().clone(),
            outcome: label,
            pages: pdfs.len(),
            dispatched,
        })
    }
}
