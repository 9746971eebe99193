//! Framing of the multimeter's serial output.
//!
//! The meter streams readings as ASCII decimals framed by a line feed (start)
//! and a carriage return (stop). The sampler reads fixed-size words and
//! pulls at most one reading out of each.

use crate::error::FrameError;

/// Byte that opens a reading.
pub const START_MARKER: u8 = 0x0A;
/// Byte that closes a reading.
pub const STOP_MARKER: u8 = 0x0D;
/// Size of one sampled word.
pub const WORD_LEN: usize = 40;

/// Locates the payload of the first complete frame in `word`.
///
/// A start marker at index 0 is not accepted. Later start markers replace
/// earlier ones until a stop marker closes the frame.
pub fn extract_payload(word: &[u8]) -> Result<&[u8], FrameError> {
    let mut start = None;
    for (i, &b) in word.iter().enumerate() {
        if b == START_MARKER && i > 0 {
            start = Some(i);
        } else if b == STOP_MARKER {
            if let Some(s) = start {
                if i == s + 1 {
                    return Err(FrameError::EmptyPayload);
                }
                return Ok(&word[s + 1..i]);
            }
        }
    }
    Err(FrameError::NoFrame)
}

/// Extracts and parses the reading in `word` as volts.
pub fn parse_word(word: &[u8]) -> Result<f32, FrameError> {
    let payload = extract_payload(word)?;
    let text = std::str::from_utf8(payload).map_err(|_| FrameError::NotUtf8)?;
    let text = text.trim();
    match text.parse::<f32>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(FrameError::BadNumber(text.to_string())),
    }
}
