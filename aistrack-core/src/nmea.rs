//! NMEA 0183 AIS sentence framing.
//!
//! AIS payloads travel wrapped in `!AIVDM` (other vessels) or `!AIVDO` (own
//! vessel) sentences:
//!
//! ```text
//! !AIVDM,<total>,<index>,<msgid>,<channel>,<payload>,<fillbits>*<checksum>
//! ```
//!
//! This module only looks at the framing fields needed to route and reassemble
//! fragments. Payload bits are left to the decoder.

use serde::Serialize;

/// Talker/sentence prefixes accepted as AIS traffic.
pub const AIS_SENTENCE_PREFIXES: [&str; 2] = ["!AIVDM", "!AIVDO"];

/// Minimum number of comma-separated fields in a usable AIS sentence.
pub const MIN_FIELDS: usize = 6;

/// Routing metadata from one AIVDM/AIVDO sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentMetadata {
    /// Number of sentences the message is split into (>= 1)
    pub total_fragments: u32,
    /// 1-based position of this sentence within the message
    pub fragment_index: u32,
    /// Sequential message id; absent on most single-part sentences
    pub message_id: Option<String>,
    /// Radio channel label, normally `A` or `B` (not validated)
    pub channel: String,
}

impl FragmentMetadata {
    pub fn is_multipart(&self) -> bool {
        self.total_fragments > 1
    }
}

/// True if the trimmed line is an AIS sentence (`!AIVDM` or `!AIVDO`).
pub fn is_ais_sentence(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty()
        && AIS_SENTENCE_PREFIXES
            .iter()
            .any(|prefix| line.starts_with(prefix))
}

/// Extract fragment metadata from an AIS sentence.
///
/// Returns `None` if the sentence has fewer than [`MIN_FIELDS`] fields or the
/// fragment count/index are not positive integers. Never panics.
pub fn parse_fragment_fields(line: &str) -> Option<FragmentMetadata> {
    let parts: Vec<&str> = line.trim().split(',').collect();
    if parts.len() < MIN_FIELDS {
        log::warn!("Invalid NMEA format (too few fields): {}", line);
        return None;
    }

    let total_fragments = parse_positive(parts[1]);
    let fragment_index = parse_positive(parts[2]);
    let (Some(total_fragments), Some(fragment_index)) = (total_fragments, fragment_index) else {
        log::warn!("Invalid NMEA format: {}", line);
        return None;
    };

    Some(FragmentMetadata {
        total_fragments,
        fragment_index,
        message_id: Some(parts[3])
            .filter(|id| !id.is_empty())
            .map(str::to_string),
        channel: parts[4].to_string(),
    })
}

fn parse_positive(field: &str) -> Option<u32> {
    field.parse::<u32>().ok().filter(|n| *n >= 1)
}

/// AIS message type from the first six-bit character of the sentence payload.
///
/// Only meaningful for the first fragment of a message.
pub fn message_type_of(line: &str) -> Option<u8> {
    let payload = line.trim().split(',').nth(5)?;
    let first = *payload.as_bytes().first()?;
    sixbit_value(first)
}

/// Value of one ASCII-armored six-bit character.
fn sixbit_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'W' => Some(c - 48),
        b'`'..=b'w' => Some(c - 56),
        _ => None,
    }
}

/// XOR checksum over the characters between the leading `!`/`$` and the `*`.
pub fn checksum(body: &str) -> u8 {
    body.trim_start_matches(['!', '$'])
        .bytes()
        .fold(0u8, |acc, b| acc ^ b)
}

/// True if the sentence carries a `*hh` suffix matching its contents.
pub fn has_valid_checksum(line: &str) -> bool {
    let line = line.trim();
    let Some((body, tail)) = line.rsplit_once('*') else {
        return false;
    };
    match u8::from_str_radix(tail.get(..2).unwrap_or(tail), 16) {
        Ok(expected) => checksum(body) == expected,
        Err(_) => false,
    }
}

/// Append `*hh` to a sentence body. Handy for building test traffic.
pub fn with_checksum(body: &str) -> String {
    format!("{}*{:02X}", body, checksum(body))
}
