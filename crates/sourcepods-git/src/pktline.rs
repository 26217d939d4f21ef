//! Git pkt-line framing.
//!
//! Each frame is prefixed with a 4-character lowercase hex length that counts
//! the prefix itself, or is the "0000" flush marker. Only the encoding
//! direction lives here: everything the gateway reads from a client is handed
//! to `git` untouched.

use crate::{GitError, Result};
use std::io::Write;

/// The flush marker.
pub const FLUSH: &[u8; 4] = b"0000";

/// Largest total frame length (prefix included) the 4-digit header can express.
pub const MAX_PKT_LEN: usize = 0xffff;

const HEADER_LEN: usize = 4;

/// Returns the flush marker.
pub fn flush() -> &'static [u8] {
    FLUSH
}

/// Frames `payload` as a single pkt-line.
pub fn frame(payload: &[u8]) -> Result<Vec<u8>> {
    let len = payload.len() + HEADER_LEN;
    if len > MAX_PKT_LEN {
        return Err(GitError::PayloadTooLarge(payload.len()));
    }

    let mut out = Vec::with_capacity(len);
    out.extend_from_slice(format!("{:04x}", len).as_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// One frame of a pkt-line stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    /// Length-prefixed payload.
    Data(Vec<u8>),
    /// `0000`.
    Flush,
}

impl PktLine {
    /// A text frame; a trailing newline is added when missing.
    pub fn text(line: &str) -> Self {
        let mut payload = Vec::with_capacity(line.len() + 1);
        payload.extend_from_slice(line.as_bytes());
        if !line.ends_with('\n') {
            payload.push(b'\n');
        }
        PktLine::Data(payload)
    }

    /// Renders the frame, header included.
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            PktLine::Data(payload) => frame(payload),
            PktLine::Flush => Ok(flush().to_vec()),
        }
    }

    /// Payload of a data frame.
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            PktLine::Data(payload) => Some(payload),
            PktLine::Flush => None,
        }
    }
}

/// Writes pkt-line frames to any [`Write`] sink.
///
/// Used to build the preamble of a refs advertisement:
///
/// ```
/// use sourcepods_git::PktLineWriter;
///
/// let mut out = PktLineWriter::new(Vec::new());
/// out.write_text("# service=git-upload-pack").unwrap();
/// out.write_flush().unwrap();
/// assert_eq!(out.finish().unwrap(), b"001e# service=git-upload-pack\n0000");
/// ```
pub struct PktLineWriter<W> {
    sink: W,
}

impl<W: Write> PktLineWriter<W> {
    /// Wraps `sink`.
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    /// Writes one frame.
    pub fn write_packet(&mut self, pkt: &PktLine) -> Result<()> {
        self.sink.write_all(&pkt.encode()?)?;
        Ok(())
    }

    /// Writes a text frame, see [`PktLine::text`].
    pub fn write_text(&mut self, line: &str) -> Result<()> {
        self.write_packet(&PktLine::text(line))
    }

    /// Writes the flush marker.
    pub fn write_flush(&mut self) -> Result<()> {
        self.sink.write_all(FLUSH)?;
        Ok(())
    }

    /// Flushes the sink and returns it.
    pub fn finish(mut self) -> Result<W> {
        self.sink.flush()?;
        Ok(self.sink)
    }
}
