//! IMAP modified UTF-7 (RFC 3501 §5.1.3) for mailbox names.
//!
//! Servers list non-ASCII mailbox names as `&<base64 of UTF-16BE>-` runs,
//! with `&-` standing for a literal `&`. Names are decoded once on LIST so
//! filtering and the on-disk layout see UTF-8; commands re-encode them.

use std::borrow::Cow;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

const ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::IMAP_MUTF7,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Decode a mailbox name as sent by the server.
///
/// A name that is not valid modified UTF-7 is returned unchanged.
pub fn decode(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let shifted = &rest[start + 1..];
        let Some(end) = shifted.find('-') else {
            return Cow::Borrowed(raw);
        };

        let run = &shifted[..end];
        if run.is_empty() {
            out.push('&');
        } else {
            match decode_run(run) {
                Some(text) => out.push_str(&text),
                None => return Cow::Borrowed(raw),
            }
        }
        rest = &shifted[end + 1..];
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn decode_run(run: &str) -> Option<String> {
    let bytes = ENGINE.decode(run).ok()?;
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
    char::decode_utf16(units).collect::<Result<String, _>>().ok()
}

/// Encode a UTF-8 mailbox name for use in a command.
pub fn encode(name: &str) -> Cow<'_, str> {
    if name.chars().all(|c| is_direct(c) && c != '&') {
        return Cow::Borrowed(name);
    }

    let mut out = String::with_capacity(name.len() * 2);
    let mut pending: Vec<u16> = Vec::new();
    for c in name.chars() {
        if is_direct(c) {
            flush(&mut out, &mut pending);
            if c == '&' {
                out.push_str("&-");
            } else {
                out.push(c);
            }
        } else {
            let mut buf = [0u16; 2];
            pending.extend_from_slice(c.encode_utf16(&mut buf));
        }
    }
    flush(&mut out, &mut pending);
    Cow::Owned(out)
}

fn is_direct(c: char) -> bool {
    (' '..='~').contains(&c)
}

fn flush(out: &mut String, pending: &mut Vec<u16>) {
    if pending.is_empty() {
        return;
    }
    let bytes: Vec<u8> = pending.iter().flat_map(|u| u.to_be_bytes()).collect();
    out.push('&');
    out.push_str(&ENGINE.encode(bytes));
    out.push('-');
    pending.clear();
}
