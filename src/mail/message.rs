//! Inbound message model: top-level headers plus the leaf parts of the MIME
//! tree in document order.

use mail_parser::{MessageParser, MessagePart, MimeHeaders, PartType};

use crate::error::MessageError;
use crate::mail::header::decode_header;

/// One leaf of the MIME tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPart {
    pub maintype: String,
    pub subtype: String,
    /// Charset of `payload`. Text bodies the MIME parser could decode are
    /// already UTF-8 and report `utf-8` here.
    pub charset: Option<String>,
    pub payload: Vec<u8>,
    pub filename: Option<String>,
}

impl ContentPart {
    /// Convenience constructor, mostly for tests.
    pub fn new(mime_type: &str, payload: impl Into<Vec<u8>>) -> Self {
        let (maintype, subtype) = mime_type.split_once('/').unwrap_or((mime_type, ""));
        Self {
            maintype: maintype.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            charset: None,
            payload: payload.into(),
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.maintype, self.subtype)
    }

    fn from_mime(part: &MessagePart<'_>) -> Self {
        let content_type = part.content_type();
        let (maintype, subtype) = match content_type {
            Some(ct) => (
                ct.ctype().to_ascii_lowercase(),
                ct.subtype().unwrap_or_default().to_ascii_lowercase(),
            ),
            None => match part.body {
                PartType::Html(_) => ("text".to_string(), "html".to_string()),
                PartType::Text(_) => ("text".to_string(), "plain".to_string()),
                _ => ("application".to_string(), "octet-stream".to_string()),
            },
        };

        let charset = match part.body {
            PartType::Text(_) | PartType::Html(_) => Some("utf-8".to_string()),
            _ => content_type
                .and_then(|ct| ct.attribute("charset"))
                .map(|c| c.to_ascii_lowercase()),
        };

        Self {
            maintype,
            subtype,
            charset,
            payload: part.contents().to_vec(),
            filename: part.attachment_name().map(|s| s.to_string()),
        }
    }
}

/// A received message, parsed once and never modified.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    headers: Vec<(String, Vec<u8>)>,
    reply_address: Option<String>,
    parts: Vec<ContentPart>,
}

impl InboundMessage {
    /// Parse a raw RFC 5322 message.
    pub fn parse(raw: &[u8]) -> Result<Self, MessageError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(MessageError::Empty);
        }

        let parsed = MessageParser::default()
            .parse(raw)
            .ok_or(MessageError::Unparseable)?;

        let reply_address = parsed
            .reply_to()
            .and_then(|a| a.first())
            .and_then(|a| a.address())
            .or_else(|| parsed.from().and_then(|a| a.first()).and_then(|a| a.address()))
            .map(str::to_string);

        let mut parts = Vec::new();
        collect_leaves(&parsed, 0, &mut parts);

        Ok(Self {
            headers: read_header_section(raw),
            reply_address,
            parts,
        })
    }

    /// Raw (unfolded) value of the first header called `name`.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// Decoded subject, empty when absent.
    pub fn subject(&self) -> String {
        self.header("Subject")
            .map(|raw| decode_header(raw).trim().to_string())
            .unwrap_or_default()
    }

    /// Address replies should go to: Reply-To, else From.
    pub fn reply_address(&self) -> Option<String> {
        self.reply_address.clone()
    }

    /// Leaf parts in document order.
    pub fn parts(&self) -> &[ContentPart] {
        &self.parts
    }
}

/// Pre-order walk of the MIME tree, descending into attached messages.
fn collect_leaves(message: &mail_parser::Message<'_>, part_id: usize, out: &mut Vec<ContentPart>) {
    let Some(part) = message.parts.get(part_id) else {
        return;
    };
    match &part.body {
        PartType::Multipart(children) => {
            for &child in children {
                collect_leaves(message, child as usize, out);
            }
        }
        PartType::Message(nested) => collect_leaves(nested, 0, out),
        _ => out.push(ContentPart::from_mime(part)),
    }
}

/// Split the top-level header section into unfolded `(name, value)` pairs.
fn read_header_section(raw: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut headers: Vec<(String, Vec<u8>)> = Vec::new();

    for line in raw.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            break;
        }

        if line[0] == b' ' || line[0] == b'\t' {
            if let Some((_, value)) = headers.last_mut() {
                value.extend_from_slice(line);
            }
            continue;
        }

        let Some(colon) = line.iter().position(|&b| b == b':') else {
            continue;
        };
        let name = String::from_utf8_lossy(&line[..colon]).trim().to_string();
        let value = line[colon + 1..].trim_ascii_start().to_vec();
        headers.push((name, value));
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTIPART: &str = "From: Alice <alice@example.com>\r\n\
Reply-To: fax-replies@example.com\r\n\
Subject: =?UTF-8?B?RmF4?= for\r\n the office {-q fine}\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
--outer\r\n\
Content-Type: text/plain; charset=iso-8859-1\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
Caf=E9 menu\r\n\
--outer\r\n\
Content-Type: application/pdf; name=\"menu.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--outer\r\n\
Content-Type: application/octet-stream\r\n\
Content-Disposition: attachment; filename=\"scan.png\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
iVBORw0K\r\n\
--outer--\r\n";

    #[test]
    fn parses_leaves_in_document_order() {
        let msg = InboundMessage::parse(MULTIPART.as_bytes()).unwrap();
        let types: Vec<String> = msg.parts().iter().map(ContentPart::mime_type).collect();
        assert_eq!(
            types,
            vec!["text/plain", "application/pdf", "application/octet-stream"]
        );
    }

    #[test]
    fn text_parts_are_utf8() {
        let msg = InboundMessage::parse(MULTIPART.as_bytes()).unwrap();
        let text = &msg.parts()[0];
        assert_eq!(text.charset.as_deref(), Some("utf-8"));
        assert!(String::from_utf8(text.payload.clone()).unwrap().starts_with("Caf\u{e9} menu"));
    }

    #[test]
    fn binary_payload_is_decoded() {
        let msg = InboundMessage::parse(MULTIPART.as_bytes()).unwrap();
        assert!(msg.parts()[1].payload.starts_with(b"%PDF-1.4"));
        assert_eq!(msg.parts()[2].filename.as_deref(), Some("scan.png"));
    }

    #[test]
    fn folded_encoded_subject() {
        let msg = InboundMessage::parse(MULTIPART.as_bytes()).unwrap();
        assert_eq!(msg.subject(), "Fax for the office {-q fine}");
    }

    #[test]
    fn reply_to_preferred_over_from() {
        let msg = InboundMessage::parse(MULTIPART.as_bytes()).unwrap();
        assert_eq!(msg.reply_address().as_deref(), Some("fax-replies@example.com"));

        let msg = InboundMessage::parse(b"From: Bob <bob@example.com>\r\nSubject: x\r\n\r\nhi\r\n").unwrap();
        assert_eq!(msg.reply_address().as_deref(), Some("bob@example.com"));
    }

    #[test]
    fn quoted_display_name_does_not_hide_address() {
        let msg = InboundMessage::parse(
            b"From: \"Smith <Sales>\" <bob@example.com>\r\nSubject: x\r\n\r\nhi\r\n",
        )
        .unwrap();
        assert_eq!(msg.reply_address().as_deref(), Some("bob@example.com"));

        let msg = InboundMessage::parse(
            b"From: a@example.com\r\nReply-To: \"Desk, Fax\" <desk@example.com>, b@example.com\r\n\r\nhi\r\n",
        )
        .unwrap();
        assert_eq!(msg.reply_address().as_deref(), Some("desk@example.com"));
    }

    #[test]
    fn no_sender_headers() {
        let msg = InboundMessage::parse(b"To: fax@example.com\r\nSubject: x\r\n\r\nhi\r\n").unwrap();
        assert_eq!(msg.reply_address(), None);
    }

    #[test]
    fn first_header_value_wins() {
        let msg = InboundMessage::parse(b"Subject: one\r\nSubject: two\r\n\r\nbody\r\n").unwrap();
        assert_eq!(msg.subject(), "one");
        assert_eq!(msg.header("SUBJECT"), Some(&b"one"[..]));
    }

    #[test]
    fn single_part_message_defaults_to_text_plain() {
        let msg = InboundMessage::parse(b"From: a@example.com\r\n\r\nJust text\r\n").unwrap();
        assert_eq!(msg.parts().len(), 1);
        assert_eq!(msg.parts()[0].mime_type(), "text/plain");
        assert_eq!(msg.subject(), "");
    }

    #[test]
    fn attached_message_is_walked() {
        let raw = "From: a@example.com\r\n\
Content-Type: multipart/mixed; boundary=\"b\"\r\n\
\r\n\
--b\r\n\
Content-Type: message/rfc822\r\n\
\r\n\
Subject: inner\r\n\
Content-Type: application/pdf\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--b\r\n\
Content-Type: image/png\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
iVBORw0K\r\n\
--b--\r\n";
        let msg = InboundMessage::parse(raw.as_bytes()).unwrap();
        let types: Vec<String> = msg.parts().iter().map(ContentPart::mime_type).collect();
        assert_eq!(types, vec!["application/pdf", "image/png"]);
    }

    #[test]
    fn empty_input_rejected() {
        assert!(matches!(InboundMessage::parse(b"  \r\n"), Err(MessageError::Empty)));
    }
}
