//! Turning message parts into fax pages.

pub mod classify;
pub mod command;
pub mod dispatch;
pub mod raster;
pub mod text;

pub use classify::{ImageFormat, PartKind, classify};
pub use command::{CommandConverter, CommandTemplate, ConversionJob, Converter};
pub use dispatch::ConverterDispatcher;
pub use raster::{EMPTY_MARKER, FaxArtifact, FaxRasterizer, QualityTable};
