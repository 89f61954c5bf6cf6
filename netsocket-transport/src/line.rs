/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Newline-delimited text framing.
//!
//! Lines are terminated by `\n`; a trailing `\r` is stripped on read so
//! peers that write `\r\n` are understood. Bytes are decoded as UTF-8, with
//! invalid sequences replaced rather than rejected.

use std::io;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
    WriteHalf,
};

pub const LINE_TERMINATOR: u8 = b'\n';

/// Longest line, terminator excluded, that [`LineReader`] accepts by default.
pub const DEFAULT_MAX_LINE_LEN: usize = 64 * 1024;

/// True if `text` would be split into more than one line on the wire.
pub fn contains_terminator(text: &str) -> bool {
    text.contains(|c: char| c == '\n' || c == '\r')
}

/// Split a duplex stream into a line reader and a line writer.
pub fn split<S>(stream: S) -> (LineReader<ReadHalf<S>>, LineWriter<WriteHalf<S>>)
where
    S: AsyncRead + AsyncWrite,
{
    let (read_half, write_half) = tokio::io::split(stream);
    (LineReader::new(read_half), LineWriter::new(write_half))
}

/// Reads one line at a time from a byte stream.
///
/// `read_line` is cancel safe: bytes of a partially received line are kept
/// in the reader and completed by the next call, so it can sit in a
/// `tokio::select!` next to other branches.
#[derive(Debug)]
pub struct LineReader<R> {
    inner: BufReader<R>,
    pending: Vec<u8>,
    max_line_len: usize,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            pending: Vec::new(),
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }

    /// Reject lines longer than `max` bytes.
    pub fn with_max_line_len(mut self, max: usize) -> Self {
        self.max_line_len = max.max(1);
        self
    }

    /// Next line without its terminator, or `None` at end of stream.
    ///
    /// A final unterminated line is returned before `None`. A line longer
    /// than the limit fails with [`io::ErrorKind::InvalidData`] and its bytes
    /// read so far are dropped; the rest of it arrives as the next line.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        // Room for the longest accepted line plus its terminator.
        let limit = self
            .max_line_len
            .saturating_add(1)
            .saturating_sub(self.pending.len()) as u64;
        let read = (&mut self.inner)
            .take(limit)
            .read_until(LINE_TERMINATOR, &mut self.pending)
            .await?;
        if read == 0 && self.pending.is_empty() {
            return Ok(None);
        }
        if self.pending.last() != Some(&LINE_TERMINATOR) && self.pending.len() > self.max_line_len
        {
            let dropped = std::mem::take(&mut self.pending).len();
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line exceeds {} bytes ({dropped} buffered)", self.max_line_len),
            ));
        }

        let mut raw = std::mem::take(&mut self.pending);
        if raw.last() == Some(&LINE_TERMINATOR) {
            raw.pop();
            if raw.last() == Some(&b'\r') {
                raw.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&raw).into_owned()))
    }

    /// Bytes of an incomplete line currently buffered.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Writes lines and flushes after each one.
#[derive(Debug)]
pub struct LineWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write `line` followed by the terminator, then flush.
    pub async fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut frame = Vec::with_capacity(line.len() + 1);
        frame.extend_from_slice(line.as_bytes());
        frame.push(LINE_TERMINATOR);
        self.inner.write_all(&frame).await?;
        self.inner.flush().await
    }

    /// Flush and half-close the write side.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_write_line_appends_terminator() {
        let (client, mut peer) = tokio::io::duplex(1024);
        let (_reader, mut writer) = split(client);

        writer.write_line("Hello Raspberry Pi!").await.unwrap();

        let mut buf = vec![0u8; 20];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, b"Hello Raspberry Pi!\n");
    }

    #[tokio::test]
    async fn test_read_lines_in_order() {
        let (client, mut peer) = tokio::io::duplex(1024);
        let (mut reader, _writer) = split(client);

        peer.write_all(b"first\nsecond\r\nthird\n").await.unwrap();

        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("second"));
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("third"));
    }

    #[tokio::test]
    async fn test_empty_line_is_not_eof() {
        let (client, mut peer) = tokio::io::duplex(64);
        let (mut reader, _writer) = split(client);

        peer.write_all(b"\n").await.unwrap();
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_unterminated_tail_then_eof() {
        let (client, mut peer) = tokio::io::duplex(64);
        let (mut reader, _writer) = split(client);

        peer.write_all(b"done\ntail").await.unwrap();
        drop(peer);

        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("done"));
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("tail"));
        assert_eq!(reader.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let (client, mut peer) = tokio::io::duplex(64);
        let (mut reader, _writer) = split(client);

        peer.write_all(b"ok\xffok\n").await.unwrap();
        assert_eq!(
            reader.read_line().await.unwrap().as_deref(),
            Some("ok\u{FFFD}ok")
        );
    }

    #[tokio::test]
    async fn test_cancelled_read_keeps_partial_line() {
        let (client, mut peer) = tokio::io::duplex(64);
        let (mut reader, _writer) = split(client);

        peer.write_all(b"hal").await.unwrap();
        let cancelled =
            tokio::time::timeout(Duration::from_millis(50), reader.read_line()).await;
        assert!(cancelled.is_err(), "read should still be waiting");
        assert_eq!(reader.pending_len(), 3);

        peer.write_all(b"f\n").await.unwrap();
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("half"));
        assert_eq!(reader.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_overlong_line_is_rejected() {
        let (client, mut peer) = tokio::io::duplex(64);
        let (reader, _writer) = split(client);
        let mut reader = reader.with_max_line_len(8);

        peer.write_all(b"12345678\n0123456789").await.unwrap();

        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("12345678"));
        let err = reader.read_line().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(reader.pending_len(), 0);

        peer.write_all(b"\nok\n").await.unwrap();
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("9"));
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("ok"));
    }

    #[test]
    fn test_contains_terminator() {
        assert!(!contains_terminator("ping"));
        assert!(contains_terminator("a\nb"));
        assert!(contains_terminator("a\r"));
    }
}
