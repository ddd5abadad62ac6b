//! Escape-based frame codec.
//!
//! A frame on the wire is `START`, the escaped body, `END`. Literal
//! occurrences of `START`, `END` or `ESC` in the body are sent as two-byte
//! escape sequences. The decoder is a byte-driven state machine that
//! tolerates line noise between frames and a dropped `END` (a `START` seen
//! inside a frame restarts it).

use tracing::{debug, warn};

use super::constants::{
    FRAME_END, FRAME_ESC, FRAME_ESC_END, FRAME_ESC_ESC, FRAME_ESC_START, FRAME_START, MAX_PKT_SIZE,
};

/// Encode one frame body into `out` (cleared first), ready for transmit.
pub fn encode_frame(body: &[u8], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(body.len() + 2);
    out.push(FRAME_START);
    for &byte in body {
        match byte {
            FRAME_START => {
                out.push(FRAME_ESC);
                out.push(FRAME_ESC_START);
            }
            FRAME_END => {
                out.push(FRAME_ESC);
                out.push(FRAME_ESC_END);
            }
            FRAME_ESC => {
                out.push(FRAME_ESC);
                out.push(FRAME_ESC_ESC);
            }
            _ => out.push(byte),
        }
    }
    out.push(FRAME_END);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Between frames; everything except `START` is discarded.
    OutOfFrame,
    /// Accumulating body bytes.
    InFrame,
    /// `ESC` seen, the next byte selects the literal.
    InFrameEsc,
}

/// Byte-driven frame decoder.
///
/// The body buffer is owned by the decoder and reused across frames. A body
/// that would exceed [`MAX_PKT_SIZE`] is abandoned silently: bytes are
/// discarded until the next `END` (dropped) or `START` (restart).
pub struct FrameDecoder {
    state: DecodeState,
    body: Vec<u8>,
    overflowed: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::OutOfFrame,
            body: Vec::with_capacity(MAX_PKT_SIZE),
            overflowed: false,
        }
    }

    /// Feed one byte. Returns the completed frame body when this byte was a
    /// closing `END`; the returned slice is valid until the next `push`.
    pub fn push(&mut self, byte: u8) -> Option<&[u8]> {
        match self.state {
            DecodeState::OutOfFrame => {
                if byte == FRAME_START {
                    self.restart();
                } else {
                    debug!(byte = format!("{byte:#04x}"), "Discarding out-of-frame byte");
                }
                None
            }
            DecodeState::InFrame => match byte {
                // Tolerates a dropped END on the previous frame.
                FRAME_START => {
                    if !self.body.is_empty() || self.overflowed {
                        warn!(
                            partial_len = self.body.len(),
                            "START inside frame, restarting"
                        );
                    }
                    self.restart();
                    None
                }
                FRAME_END => {
                    self.state = DecodeState::OutOfFrame;
                    if self.overflowed {
                        self.overflowed = false;
                        self.body.clear();
                        None
                    } else {
                        Some(&self.body)
                    }
                }
                FRAME_ESC => {
                    self.state = DecodeState::InFrameEsc;
                    None
                }
                _ => {
                    self.append(byte);
                    None
                }
            },
            DecodeState::InFrameEsc => {
                self.state = DecodeState::InFrame;
                let literal = match byte {
                    FRAME_ESC_END => FRAME_END,
                    FRAME_ESC_ESC => FRAME_ESC,
                    FRAME_ESC_START => FRAME_START,
                    // Tolerant mode: an unknown escape keeps the byte as-is.
                    other => other,
                };
                self.append(literal);
                None
            }
        }
    }

    fn restart(&mut self) {
        self.state = DecodeState::InFrame;
        self.body.clear();
        self.overflowed = false;
    }

    fn append(&mut self, byte: u8) {
        if self.overflowed {
            return;
        }
        if self.body.len() >= MAX_PKT_SIZE {
            warn!(limit = MAX_PKT_SIZE, "Frame body overflow, abandoning");
            self.body.clear();
            self.overflowed = true;
            return;
        }
        self.body.push(byte);
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut FrameDecoder, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        for &b in bytes {
            if let Some(frame) = decoder.push(b) {
                frames.push(frame.to_vec());
            }
        }
        frames
    }

    #[test]
    fn test_roundtrip_plain() {
        let body = b"hello device";
        let mut encoded = Vec::new();
        encode_frame(body, &mut encoded);

        let mut decoder = FrameDecoder::new();
        let frames = decode_all(&mut decoder, &encoded);
        assert_eq!(frames, vec![body.to_vec()]);
    }

    #[test]
    fn test_roundtrip_all_sentinels() {
        let body = [0x00, FRAME_START, FRAME_END, FRAME_ESC, 0xFF, FRAME_ESC_END, FRAME_ESC_ESC];
        let mut encoded = Vec::new();
        encode_frame(&body, &mut encoded);
        // Three body bytes need escaping.
        assert_eq!(encoded.len(), body.len() + 3 + 2);

        let mut decoder = FrameDecoder::new();
        let frames = decode_all(&mut decoder, &encoded);
        assert_eq!(frames, vec![body.to_vec()]);
    }

    #[test]
    fn test_roundtrip_every_byte_value() {
        let body: Vec<u8> = (0..=255).collect();
        let mut encoded = Vec::new();
        encode_frame(&body, &mut encoded);

        let mut decoder = FrameDecoder::new();
        let frames = decode_all(&mut decoder, &encoded);
        assert_eq!(frames, vec![body]);
    }

    #[test]
    fn test_noise_between_frames_is_ignored() {
        let mut encoded = Vec::new();
        encode_frame(b"first", &mut encoded);
        // Line noise that must not corrupt the following frame. None of these
        // bytes is a START.
        encoded.extend_from_slice(&[0x00, 0xFF, FRAME_ESC_END, FRAME_ESC_ESC, 0x42]);
        let mut second = Vec::new();
        encode_frame(b"second", &mut second);
        encoded.extend_from_slice(&second);

        let mut decoder = FrameDecoder::new();
        let frames = decode_all(&mut decoder, &encoded);
        assert_eq!(frames, vec![b"first".to_vec(), b"second".to_vec()]);
    }

    #[test]
    fn test_start_inside_frame_restarts() {
        // END of the first frame was lost; its partial body must be dropped.
        let bytes = [FRAME_START, 0x01, 0x02, FRAME_START, 0x03, FRAME_END];
        let mut decoder = FrameDecoder::new();
        let frames = decode_all(&mut decoder, &bytes);
        assert_eq!(frames, vec![vec![0x03]]);
    }

    #[test]
    fn test_bare_escape_aliases_are_literal_in_frame() {
        // ESC_END / ESC_ESC / ESC_START outside an escape sequence are plain
        // body bytes; only the encoder produces them after an ESC.
        let bytes = [FRAME_START, FRAME_ESC_END, FRAME_ESC_ESC, FRAME_ESC_START, FRAME_END];
        let mut decoder = FrameDecoder::new();
        let frames = decode_all(&mut decoder, &bytes);
        assert_eq!(frames, vec![vec![FRAME_ESC_END, FRAME_ESC_ESC, FRAME_ESC_START]]);
    }

    #[test]
    fn test_unknown_escape_is_tolerated() {
        let bytes = [FRAME_START, FRAME_ESC, 0x42, FRAME_END];
        let mut decoder = FrameDecoder::new();
        let frames = decode_all(&mut decoder, &bytes);
        assert_eq!(frames, vec![vec![0x42]]);
    }

    #[test]
    fn test_overflow_abandons_frame_silently() {
        let mut decoder = FrameDecoder::new();
        decoder.push(FRAME_START);
        for _ in 0..(MAX_PKT_SIZE + 10) {
            assert!(decoder.push(0x11).is_none());
        }
        // The END closing the oversized frame yields nothing.
        assert!(decoder.push(FRAME_END).is_none());

        // The decoder recovers for the next frame.
        let mut encoded = Vec::new();
        encode_frame(b"after overflow", &mut encoded);
        let frames = decode_all(&mut decoder, &encoded);
        assert_eq!(frames, vec![b"after overflow".to_vec()]);
    }

    #[test]
    fn test_overflow_recovers_on_restart() {
        let mut decoder = FrameDecoder::new();
        decoder.push(FRAME_START);
        for _ in 0..(MAX_PKT_SIZE + 1) {
            decoder.push(0x22);
        }
        // A new START while abandoned restarts cleanly without waiting
        // for the dropped END.
        decoder.push(FRAME_START);
        decoder.push(0x33);
        let frame = decoder.push(FRAME_END).map(<[u8]>::to_vec);
        assert_eq!(frame, Some(vec![0x33]));
    }

    #[test]
    fn test_max_size_body_is_accepted() {
        let body = vec![0x5A; MAX_PKT_SIZE];
        let mut encoded = Vec::new();
        encode_frame(&body, &mut encoded);
        let mut decoder = FrameDecoder::new();
        let frames = decode_all(&mut decoder, &encoded);
        assert_eq!(frames, vec![body]);
    }

    #[test]
    fn test_empty_frame() {
        let bytes = [FRAME_START, FRAME_END];
        let mut decoder = FrameDecoder::new();
        let frames = decode_all(&mut decoder, &bytes);
        assert_eq!(frames, vec![Vec::<u8>::new()]);
    }
}
