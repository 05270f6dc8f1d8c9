//! Subject decoding: raw envelope bytes, RFC 2047 encoded-words, and the
//! `Subject:` header fallback for servers that send no envelope subject.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `B` encoded-words show up both padded and unpadded in the wild.
const B_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// What to do with a message whose subject cannot be decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectPolicy {
    /// Abort the mailbox. Nothing is written for the message.
    #[default]
    Abort,
    /// Archive the message without a subject in its filename.
    Placeholder,
}

/// Why an encoded-word could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubjectError {
    #[error("unknown charset '{0}'")]
    UnknownCharset(String),

    #[error("unknown transfer encoding '{0}'")]
    UnknownEncoding(String),

    #[error("invalid base64 in encoded-word: {0}")]
    InvalidBase64(String),
}

/// Decode a raw subject: bytes to text, then every encoded-word.
///
/// Text without encoded-words passes through unchanged.
pub fn decode_subject(raw: &[u8]) -> Result<String, SubjectError> {
    let text = decode_header_bytes(raw);
    let decoded = decode_encoded_words(&text)?;
    Ok(decoded.trim().to_string())
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
    }
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// A `=?` that does not start a well-formed encoded-word is kept as literal
/// text. A well-formed word with an unknown charset, an unknown encoding or
/// broken base64 is an error.
pub fn decode_encoded_words(input: &str) -> Result<String, SubjectError> {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // Whitespace between two encoded-words is dropped (RFC 2047 §6.2)
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];
        match split_encoded_word(after_start) {
            Some(word) => {
                result.push_str(&word.decode()?);
                remaining = &after_start[word.consumed..];
                last_was_encoded = true;
            }
            None => {
                result.push_str("=?");
                remaining = after_start;
                last_was_encoded = false;
            }
        }
    }

    result.push_str(remaining);
    Ok(result)
}

/// The three fields of an encoded-word, borrowed from the input.
struct EncodedWord<'a> {
    charset: &'a str,
    encoding: &'a str,
    text: &'a str,
    /// Bytes consumed after the leading `=?`.
    consumed: usize,
}

/// Split `charset?encoding?text?=` (the part after `=?`).
fn split_encoded_word(s: &str) -> Option<EncodedWord<'_>> {
    let (charset, rest) = s.split_once('?')?;
    let (encoding, rest) = rest.split_once('?')?;
    let end = rest.find("?=")?;
    let text = &rest[..end];

    if charset.is_empty() || charset.contains(char::is_whitespace) || text.contains(' ') {
        return None;
    }

    Some(EncodedWord {
        charset,
        encoding,
        text,
        consumed: charset.len() + 1 + encoding.len() + 1 + end + 2,
    })
}

impl EncodedWord<'_> {
    fn decode(&self) -> Result<String, SubjectError> {
        let bytes = match self.encoding {
            "B" | "b" => B_ENGINE
                .decode(self.text)
                .map_err(|e| SubjectError::InvalidBase64(e.to_string()))?,
            "Q" | "q" => decode_q_encoding(self.text),
            other => return Err(SubjectError::UnknownEncoding(other.to_string())),
        };
        decode_charset(self.charset, &bytes)
    }
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' => match bytes.get(i + 1..i + 3).and_then(hex_byte) {
                Some(byte) => {
                    result.push(byte);
                    i += 3;
                }
                None => {
                    result.push(b'=');
                    i += 1;
                }
            },
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

fn hex_byte(pair: &[u8]) -> Option<u8> {
    let digits = std::str::from_utf8(pair).ok()?;
    u8::from_str_radix(digits, 16).ok()
}

/// Decode bytes using a named charset. RFC 2231 language tags (`utf-8*en`)
/// are ignored.
fn decode_charset(charset: &str, bytes: &[u8]) -> Result<String, SubjectError> {
    let label = charset.split('*').next().unwrap_or(charset);
    let encoding = encoding_rs::Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| SubjectError::UnknownCharset(charset.to_string()))?;
    let (decoded, _, _) = encoding.decode(bytes);
    Ok(decoded.into_owned())
}

/// Extract the raw `Subject:` header value from a full message.
///
/// Folded continuation lines are joined with a single space.
pub fn subject_from_payload(payload: &[u8]) -> Option<Vec<u8>> {
    let headers = &payload[..find_header_end(payload).unwrap_or(payload.len())];
    let mut value: Option<Vec<u8>> = None;

    for line in headers.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let is_continuation = line.first().is_some_and(|&b| b == b' ' || b == b'\t');

        if is_continuation {
            if let Some(v) = value.as_mut() {
                v.push(b' ');
                v.extend_from_slice(line.trim_ascii());
            }
            continue;
        }
        if value.is_some() {
            break;
        }
        if let Some(colon) = line.iter().position(|&b| b == b':') {
            if line[..colon].trim_ascii().eq_ignore_ascii_case(b"subject") {
                value = Some(line[colon + 1..].trim_ascii().to_vec());
            }
        }
    }

    value
}

/// Byte offset where the header block ends (the first empty line).
fn find_header_end(data: &[u8]) -> Option<usize> {
    let lf = data.windows(2).position(|w| w == b"\n\n");
    let crlf = data.windows(4).position(|w| w == b"\r\n\r\n");
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
