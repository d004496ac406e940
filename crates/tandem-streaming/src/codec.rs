//! Newline-delimited JSON wire codec.

use futures::stream::{self, Stream, StreamExt};

use crate::error::StreamError;
use crate::frame::Frame;

/// Encodes frames as one JSON object per line.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameEncoder;

impl FrameEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode one frame, including the trailing newline.
    pub fn encode(&self, frame: &Frame) -> Result<Vec<u8>, StreamError> {
        let mut line = serde_json::to_vec(frame).map_err(|e| StreamError::Protocol(e.to_string()))?;
        line.push(b'\n');
        Ok(line)
    }

    /// Encode a batch of frames into one buffer.
    pub fn encode_all<'a>(
        &self,
        frames: impl IntoIterator<Item = &'a Frame>,
    ) -> Result<Vec<u8>, StreamError> {
        let mut out = Vec::new();
        for frame in frames {
            out.extend(self.encode(frame)?);
        }
        Ok(out)
    }
}

/// Incremental decoder.
///
/// Bytes may arrive split at arbitrary points; complete lines are parsed as
/// they become available.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    line: usize,
    frames: usize,
    ended: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Parse the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, StreamError> {
        loop {
            let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') else {
                return Ok(None);
            };
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.line += 1;

            let text = std::str::from_utf8(&line[..line.len() - 1]).map_err(|e| {
                StreamError::Malformed {
                    line: self.line,
                    message: e.to_string(),
                }
            })?;
            if text.trim().is_empty() {
                continue;
            }
            if self.ended {
                return Err(StreamError::Protocol(format!(
                    "frame after end at line {}",
                    self.line
                )));
            }

            let frame: Frame = serde_json::from_str(text).map_err(|e| StreamError::Malformed {
                line: self.line,
                message: e.to_string(),
            })?;
            self.frames += 1;
            self.ended = frame.is_end();
            return Ok(Some(frame));
        }
    }

    /// Drain every complete frame currently buffered.
    pub fn drain(&mut self) -> Result<Vec<Frame>, StreamError> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Whether the terminating frame has been decoded.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Check the stream once the transport has closed.
    pub fn finish(&self) -> Result<(), StreamError> {
        if !self.ended || self.buffer.iter().any(|b| !b.is_ascii_whitespace()) {
            return Err(StreamError::Truncated {
                frames: self.frames,
            });
        }
        Ok(())
    }
}

/// Decode a complete byte buffer.
pub fn decode_all(bytes: &[u8]) -> Result<Vec<Frame>, StreamError> {
    let mut decoder = FrameDecoder::new();
    decoder.push(bytes);
    let frames = decoder.drain()?;
    decoder.finish()?;
    Ok(frames)
}

/// Adapt a stream of byte chunks into a stream of frames.
///
/// Yields an error and stops on the first malformed line, or when the
/// chunk stream ends before the terminating frame.
pub fn decode_stream<S>(chunks: S) -> impl Stream<Item = Result<Frame, StreamError>>
where
    S: Stream<Item = Vec<u8>> + Unpin,
{
    struct State<S> {
        chunks: S,
        decoder: FrameDecoder,
        done: bool,
    }

    let state = State {
        chunks,
        decoder: FrameDecoder::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }
        loop {
            match state.decoder.next_frame() {
                Ok(Some(frame)) => return Some((Ok(frame), state)),
                Ok(None) => {}
                Err(err) => {
                    state.done = true;
                    return Some((Err(err), state));
                }
            }
            match state.chunks.next().await {
                Some(chunk) => state.decoder.push(&chunk),
                None => {
                    state.done = true;
                    return match state.decoder.finish() {
                        Ok(()) => None,
                        Err(err) => Some((Err(err), state)),
                    };
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameId;
    use serde_json::json;

    fn sample() -> Vec<Frame> {
        vec![
            Frame::pending(FrameId(1)),
            Frame::value(FrameId(0), json!(["$F", ["early", "$1"]])),
            Frame::resolution(FrameId(1), json!("late")),
            Frame::end(3),
        ]
    }

    #[test]
    fn test_encode_is_line_delimited() {
        let bytes = FrameEncoder::new().encode_all(&sample()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.lines().count(), 4);
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_decode_split_chunks() {
        let bytes = FrameEncoder::new().encode_all(&sample()).unwrap();
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();

        for chunk in bytes.chunks(7) {
            decoder.push(chunk);
            frames.extend(decoder.drain().unwrap());
        }

        assert_eq!(frames, sample());
        assert!(decoder.finish().is_ok());
    }

    #[test]
    fn test_truncated_stream() {
        let bytes = FrameEncoder::new().encode_all(&sample()[..2]).unwrap();
        assert!(matches!(
            decode_all(&bytes),
            Err(StreamError::Truncated { frames: 2 })
        ));
    }

    #[test]
    fn test_partial_trailing_line_is_truncation() {
        let mut bytes = FrameEncoder::new().encode_all(&sample()).unwrap();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(decode_all(&bytes), Err(StreamError::Truncated { .. })));
    }

    #[test]
    fn test_malformed_line() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"{\"id\":0,\"kind\":\"value\",\"payload\":\"A\"}\nnot json\n");
        assert!(decoder.next_frame().unwrap().is_some());
        assert!(matches!(
            decoder.next_frame(),
            Err(StreamError::Malformed { line: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_decode_stream() {
        let bytes = FrameEncoder::new().encode_all(&sample()).unwrap();
        let chunks: Vec<Vec<u8>> = bytes.chunks(5).map(<[u8]>::to_vec).collect();

        let decoded: Vec<_> = decode_stream(stream::iter(chunks)).collect().await;
        let frames: Vec<Frame> = decoded.into_iter().map(Result::unwrap).collect();
        assert_eq!(frames, sample());
    }

    #[tokio::test]
    async fn test_decode_stream_reports_truncation() {
        let bytes = FrameEncoder::new().encode_all(&sample()[..1]).unwrap();
        let decoded: Vec<_> = decode_stream(stream::iter(vec![bytes])).collect().await;
        assert_eq!(decoded.len(), 2);
        assert!(decoded[0].is_ok());
        assert!(matches!(decoded[1], Err(StreamError::Truncated { frames: 1 })));
    }
}
