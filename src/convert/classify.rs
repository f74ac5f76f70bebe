//! Part classification.
//!
//! Maps a part's (maintype, subtype) to a closed [`PartKind`]. Generic binary
//! parts are re-resolved from their filename extension first.

use crate::mail::message::ContentPart;
use crate::options::TextMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Tiff,
    Jpeg,
    Png,
    Gif,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Tiff => "tif",
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartKind {
    Pdf,
    Image(ImageFormat),
    PlainText,
    Html,
    /// A type the gateway has no converter for.
    Unsupported(String),
    /// `application/octet-stream` whose filename gives no usable hint.
    Unclassifiable,
}

impl PartKind {
    pub fn is_text(&self) -> bool {
        matches!(self, Self::PlainText | Self::Html)
    }

    /// Whether this kind is in the allow-set for `mode`.
    pub fn is_accepted(&self, mode: TextMode) -> bool {
        match self {
            Self::Pdf | Self::Image(_) => true,
            Self::PlainText => mode.accepted_subtype() == Some("plain"),
            Self::Html => mode.accepted_subtype() == Some("html"),
            Self::Unsupported(_) | Self::Unclassifiable => false,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Pdf => "pdf",
            Self::Image(ImageFormat::Tiff) => "tiff",
            Self::Image(ImageFormat::Jpeg) => "jpeg",
            Self::Image(ImageFormat::Png) => "png",
            Self::Image(ImageFormat::Gif) => "gif",
            Self::PlainText => "text/plain",
            Self::Html => "text/html",
            Self::Unsupported(t) => t,
            Self::Unclassifiable => "unclassifiable",
        }
    }
}

/// Classify one part.
pub fn classify(part: &ContentPart) -> PartKind {
    let (maintype, subtype) = if part.maintype == "application" && part.subtype == "octet-stream" {
        match guess_from_filename(part.filename.as_deref()) {
            Some(guess) => guess,
            None => return PartKind::Unclassifiable,
        }
    } else {
        (part.maintype.clone(), part.subtype.clone())
    };

    kind_for(&maintype, &subtype)
}

/// The dispatch table.
fn kind_for(maintype: &str, subtype: &str) -> PartKind {
    match (maintype, subtype) {
        ("application", "pdf") => PartKind::Pdf,
        ("image", "tiff") => PartKind::Image(ImageFormat::Tiff),
        ("image", "jpeg" | "jpg" | "pjpeg") => PartKind::Image(ImageFormat::Jpeg),
        ("image", "png") => PartKind::Image(ImageFormat::Png),
        ("image", "gif") => PartKind::Image(ImageFormat::Gif),
        ("text", "plain") => PartKind::PlainText,
        ("text", "html") => PartKind::Html,
        _ => PartKind::Unsupported(format!("{maintype}/{subtype}")),
    }
}

fn guess_from_filename(filename: Option<&str>) -> Option<(String, String)> {
    let mime = mime_guess::from_path(filename?).first()?;
    Some((
        mime.type_().as_str().to_ascii_lowercase(),
        mime.subtype().as_str().to_ascii_lowercase(),
    ))
}
