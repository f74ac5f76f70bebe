//! Merging per-part PDFs into one multi-page fax image.

use std::path::{Path, PathBuf};

use crate::convert::command::{CommandTemplate, Converter};
use crate::error::ConvertError;
use crate::options::Quality;

/// Literal written in place of a fax file when nothing was extracted.
pub const EMPTY_MARKER: &str = "none";

/// Output resolution (`HxV` dpi) for each quality preset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityTable {
    pub normal: String,
    pub fine: String,
    pub superfine: String,
}

impl QualityTable {
    pub fn resolution(&self, quality: Quality) -> &str {
        match quality {
            Quality::Normal => &self.normal,
            Quality::Fine => &self.fine,
            Quality::Super => &self.superfine,
        }
    }
}

impl Default for QualityTable {
    /// Standard G3 fax resolutions.
    fn default() -> Self {
        Self {
            normal: "204x98".to_string(),
            fine: "204x196".to_string(),
            superfine: "204x392".to_string(),
        }
    }
}

/// The rasterized result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaxArtifact {
    Image(PathBuf),
    /// No part produced a page.
    Empty,
}

impl FaxArtifact {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Image(path) => Some(path),
            Self::Empty => None,
        }
    }

    /// Value for the call-file `FAXFILE` variable.
    pub fn callfile_value(&self) -> String {
        match self {
            Self::Image(path) => path.display().to_string(),
            Self::Empty => EMPTY_MARKER.to_string(),
        }
    }
}

/// Builds and runs the single rasterization command.
pub struct FaxRasterizer<'a> {
    converter: &'a dyn Converter,
    template: &'a CommandTemplate,
    table: &'a QualityTable,
}

impl<'a> FaxRasterizer<'a> {
    pub fn new(converter: &'a dyn Converter, template: &'a CommandTemplate, table: &'a QualityTable) -> Self {
        Self {
            converter,
            template,
            table,
        }
    }

    /// Merge `pdfs` (in page order) into `output`.
    ///
    /// An empty list never reaches the converter.
    pub async fn rasterize(
        &self,
        pdfs: &[PathBuf],
        quality: Quality,
        output: PathBuf,
    ) -> Result<FaxArtifact, ConvertError> {
        if pdfs.is_empty() {
            tracing::info!("No pages extracted, skipping rasterization");
            return Ok(FaxArtifact::Empty);
        }

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let job = self.template.job(
            pdfs.to_vec(),
            output.clone(),
            &[("resolution", self.table.resolution(quality))],
        );
        self.converter.run(&job).await?;

        tracing::info!(
            pages = pdfs.len(),
            %quality,
            output = %output.display(),
            "Fax image rasterized"
        );
        Ok(FaxArtifact::Image(output))
    }
}
