//! Compact text encoding of the persisted queue
//!
//! Every value is written as its hexadecimal digits in reverse order
//! (least significant nibble first) and terminated by `;`. Zero is the
//! single digit `0`. So `[0, 255, 4096]` becomes `"0;ff;0001;"`.
//!
//! Decoding accepts only `[0-9a-f;]`. The first malformed character makes
//! the whole string bogus and nothing decoded so far is kept. Digits
//! after the last `;` are an unterminated group and are ignored.

use crate::types::TrackId;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// A u64 holds at most 16 nibbles
const MAX_DIGITS: u32 = 16;

/// Encode track identifiers
pub fn encode_ids(ids: &[TrackId]) -> String {
    let mut out = String::with_capacity(ids.len() * 4);
    for id in ids {
        push_value(&mut out, id.0);
    }
    out
}

/// Decode track identifiers, returning an empty list for corrupt input
pub fn decode_ids(text: &str) -> Vec<TrackId> {
    decode_values(text)
        .map(|values| values.into_iter().map(TrackId).collect())
        .unwrap_or_default()
}

/// Encode shuffle history (queue positions)
pub fn encode_positions(positions: &[usize]) -> String {
    let mut out = String::with_capacity(positions.len() * 2);
    for &position in positions {
        push_value(&mut out, position as u64);
    }
    out
}

/// Decode shuffle history for a queue of `queue_len` items
///
/// Any out-of-range index discards the entire history.
pub fn decode_positions(text: &str, queue_len: usize) -> Vec<usize> {
    let Some(values) = decode_values(text) else {
        return Vec::new();
    };

    let mut positions = Vec::with_capacity(values.len());
    for value in values {
        match usize::try_from(value) {
            Ok(position) if position < queue_len => positions.push(position),
            _ => {
                tracing::warn!(value, queue_len, "Discarding history with out-of-range entry");
                return Vec::new();
            }
        }
    }
    positions
}

fn push_value(out: &mut String, mut value: u64) {
    if value == 0 {
        out.push_str("0;");
        return;
    }
    while value != 0 {
        out.push(char::from(HEX_DIGITS[(value & 0xf) as usize]));
        value >>= 4;
    }
    out.push(';');
}

/// Returns `None` when the text is bogus
fn decode_values(text: &str) -> Option<Vec<u64>> {
    let mut values = Vec::new();
    let mut value: u64 = 0;
    let mut digits: u32 = 0;

    for c in text.chars() {
        if c == ';' {
            values.push(value);
            value = 0;
            digits = 0;
            continue;
        }

        let nibble = match c {
            '0'..='9' => u64::from(c as u8 - b'0'),
            'a'..='f' => u64::from(c as u8 - b'a' + 10),
            _ => {
                tracing::warn!(character = %c, "Discarding corrupt queue encoding");
                return None;
            }
        };

        if digits >= MAX_DIGITS {
            tracing::warn!("Discarding queue encoding with oversized value");
            return None;
        }
        value |= nibble << (digits * 4);
        digits += 1;
    }

    Some(values)
}
