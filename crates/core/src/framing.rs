// Newline-delimited envelope framing for stream transports

use bytes::BytesMut;
use std::io;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

/// Largest envelope either side accepts on one line (1 MiB), newline excluded
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// One inbound line.
///
/// Bad lines are frames rather than decode errors: a `FramedRead` stops
/// after the first error, and one bad line must not end the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Line(String),
    /// Longer than the limit; the bytes are discarded up to the next newline
    /// without being buffered.
    Oversized,
    NotUtf8,
}

/// `LinesCodec` with a length cap and recoverable line faults
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    lines: LinesCodec,
}

impl EnvelopeCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_MESSAGE_BYTES)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
        }
    }

    pub fn max_length(&self) -> usize {
        self.lines.max_length()
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn classify(decoded: Result<Option<String>, LinesCodecError>) -> io::Result<Option<Frame>> {
    match decoded {
        Ok(line) => Ok(line.map(Frame::Line)),
        Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Frame::Oversized)),
        // LinesCodec does no I/O of its own; InvalidData is its UTF-8 check
        Err(LinesCodecError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => {
            Ok(Some(Frame::NotUtf8))
        }
        Err(LinesCodecError::Io(e)) => Err(e),
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<Frame>> {
        classify(self.lines.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> io::Result<Option<Frame>> {
        classify(self.lines.decode_eof(buf))
    }
}

impl Encoder<String> for EnvelopeCodec {
    type Error = io::Error;

    fn encode(&mut self, line: String, buf: &mut BytesMut) -> io::Result<()> {
        self.lines.encode(line, buf).map_err(|e| match e {
            LinesCodecError::Io(e) => e,
            LinesCodecError::MaxLineLengthExceeded => {
                io::Error::new(io::ErrorKind::InvalidInput, "line too long")
            }
        })
    }
}
