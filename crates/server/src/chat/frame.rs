//! Inbound chat frame parsing.

use serde::Deserialize;

pub const MAX_CONTENT_CHARS: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame of {0} bytes exceeds the size limit")]
    TooLarge(usize),
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("message content is empty")]
    Empty,
    #[error("message content is too long ({0} characters)")]
    TooLong(usize),
}

/// Client frames only carry text; the sender always comes from the session.
#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(alias = "Content")]
    content: String,
}

/// Parse a raw frame into validated, trimmed message content.
pub fn parse_content(payload: &[u8], max_frame_size: usize) -> Result<String, FrameError> {
    if payload.len() > max_frame_size {
        return Err(FrameError::TooLarge(payload.len()));
    }
    let frame: InboundFrame = serde_json::from_slice(payload)?;
    validate_content(&frame.content)
}

pub fn validate_content(raw: &str) -> Result<String, FrameError> {
    let content = raw.trim();
    match content.chars().count() {
        0 => Err(FrameError::Empty),
        n if n > MAX_CONTENT_CHARS => Err(FrameError::TooLong(n)),
        _ => Ok(content.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_both_field_spellings() {
        assert_eq!(parse_content(br#"{"content":" hi "}"#, 1024).unwrap(), "hi");
        assert_eq!(parse_content(br#"{"Content":"hey","sender":"mallory"}"#, 1024).unwrap(), "hey");
    }

    #[test]
    fn length_boundary_is_500_chars() {
        assert!(validate_content(&"a".repeat(500)).is_ok());
        assert!(matches!(validate_content(&"a".repeat(501)), Err(FrameError::TooLong(501))));
        // Counted in characters, not bytes.
        assert!(validate_content(&"é".repeat(500)).is_ok());
    }

    #[test]
    fn rejects_malformed_empty_and_oversized() {
        assert!(matches!(parse_content(b"not json", 1024), Err(FrameError::Malformed(_))));
        assert!(matches!(parse_content(br#"{"text":"hi"}"#, 1024), Err(FrameError::Malformed(_))));
        assert!(matches!(parse_content(br#"{"content":"   "}"#, 1024), Err(FrameError::Empty)));
        assert!(matches!(parse_content(&[b' '; 2048], 1024), Err(FrameError::TooLarge(2048))));
    }
}
