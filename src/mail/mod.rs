//! Inbound message parsing and outbound report mail.

pub mod header;
pub mod message;
pub mod sender;

pub use header::decode_header;
pub use message::{ContentPart, InboundMessage};
pub use sender::{Mailer, OutgoingMail, SmtpMailer};
