//! faxgate: mail-to-fax gateway for Asterisk.
//!
//! Reads one message, turns its attachments (and optionally its text body)
//! into a multi-page fax image and either schedules the transmission with a
//! call-file or mails a report back to the sender.

pub mod callfile;
pub mod config;
pub mod convert;
pub mod error;
pub mod mail;
pub mod options;
pub mod outcome;
pub mod pipeline;
pub mod workspace;
