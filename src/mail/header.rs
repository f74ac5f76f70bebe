//! RFC 2047 header decoding.
//!
//! Decoding is best-effort and never fails: anything that does not decode
//! cleanly is passed through as it appeared on the wire.

use std::borrow::Cow;
use std::sync::LazyLock;

use base64::Engine;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use encoding_rs::{Encoding, WINDOWS_1252};
use regex::bytes::Regex;

/// `=?charset?encoding?text?=`, with an optional RFC 2231 `*lang` suffix on
/// the charset.
static ENCODED_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"=\?([^?\s*]+)(?:\*[^?\s]*)?\?([A-Za-z])\?([^?\s]*)\?=").expect("valid regex")
});

/// Mail agents disagree about base64 padding in encoded words.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &base64::alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode a raw header value into display text.
///
/// Whitespace between two adjacent encoded words is removed; everything else
/// between encoded words is kept. Raw bytes outside encoded words are taken as
/// UTF-8 when valid and as an ASCII-compatible 8-bit charset otherwise.
pub fn decode_header(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_end = 0;
    let mut after_encoded_word = false;

    for m in ENCODED_WORD.find_iter(raw) {
        let gap = &raw[last_end..m.start()];
        last_end = m.end();

        match decode_word(m.as_bytes()) {
            Some(decoded) => {
                if !(after_encoded_word && gap.iter().all(u8::is_ascii_whitespace)) {
                    out.push_str(&decode_raw(gap));
                }
                out.push_str(&decoded);
                after_encoded_word = true;
            }
            None => {
                out.push_str(&decode_raw(gap));
                out.push_str(&decode_raw(m.as_bytes()));
                after_encoded_word = false;
            }
        }
    }

    out.push_str(&decode_raw(&raw[last_end..]));
    out
}

/// Decode one complete encoded word, or `None` if it is malformed.
pub fn decode_word(word: &[u8]) -> Option<String> {
    let caps = ENCODED_WORD.captures(word)?;
    if caps.get(0)?.len() != word.len() {
        return None;
    }

    let charset = std::str::from_utf8(caps.get(1)?.as_bytes()).ok()?;
    let content = caps.get(3)?.as_bytes();

    let bytes = match caps.get(2)?.as_bytes() {
        b"b" | b"B" => LENIENT_BASE64.decode(content).ok()?,
        b"q" | b"Q" => q_decode(content)?,
        _ => return None,
    };

    let encoding = Encoding::for_label_no_replacement(charset.as_bytes())?;
    let (text, _, had_errors) = encoding.decode(&bytes);
    if had_errors {
        return None;
    }
    Some(text.into_owned())
}

/// The "Q" encoding: quoted-printable with `_` standing for a space.
fn q_decode(content: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(content.len());
    let mut iter = content.iter();
    while let Some(&b) = iter.next() {
        match b {
            b'_' => out.push(b' '),
            b'=' => {
                let hi = hex_value(*iter.next()?)?;
                let lo = hex_value(*iter.next()?)?;
                out.push(hi << 4 | lo);
            }
            _ => out.push(b),
        }
    }
    Some(out)
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn decode_raw(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => WINDOWS_1252.decode_without_bom_handling(bytes).0,
    }
}
