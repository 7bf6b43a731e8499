//! Line-oriented codec over the session stream: CRLF command lines out
//! and in, plus the dot-stuffed DATA body reader.

use crate::common::*;
use crate::io::Io;
use crate::reply::Reply;
use bytes::BytesMut;
use std::fmt;

/// Failure of [`LineCodec::read_data_body`]. The size-limit case must
/// stay distinguishable from a broken stream: the former is answered
/// with a 503 and the session continues, the latter tears the session
/// down.
#[derive(Debug)]
pub enum BodyReadError {
    /// More than the configured number of body bytes arrived.
    TooLarge(usize),
    Io(io::Error),
}

impl fmt::Display for BodyReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyReadError::TooLarge(max) => {
                write!(f, "message body exceeded the maximum of {} bytes", max)
            }
            BodyReadError::Io(e) => write!(f, "reading message body: {}", e),
        }
    }
}

impl std::error::Error for BodyReadError {}

impl From<io::Error> for BodyReadError {
    fn from(e: io::Error) -> Self {
        BodyReadError::Io(e)
    }
}

/// Reads and writes CRLF-terminated lines on a boxed stream.
///
/// The stream sits behind an `Option` so STARTTLS can take it out,
/// run the handshake and hand back the encrypted one.
pub struct LineCodec {
    io: Option<Box<dyn Io>>,
    buffer: BytesMut,
}

impl LineCodec {
    pub fn new(io: Box<dyn Io>) -> Self {
        LineCodec {
            io: Some(io),
            buffer: BytesMut::new(),
        }
    }

    /// Takes the underlying stream out, leaving the codec unusable
    /// until a new one is handed in. Any read-ahead is dropped with it;
    /// RFC 3207 requires discarding plaintext buffered before the TLS
    /// handshake.
    pub fn take_io(&mut self) -> Option<Box<dyn Io>> {
        self.buffer.clear();
        self.io.take()
    }

    fn io_mut(&mut self) -> io::Result<&mut Box<dyn Io>> {
        match self.io.as_mut() {
            Some(io) => Ok(io),
            None => Err(io::ErrorKind::NotConnected.into()),
        }
    }

    /// Reads one line including its LF terminator. EOF before any
    /// terminator is an error - SMTP clients must quit, not vanish.
    async fn read_raw_line(&mut self) -> io::Result<Vec<u8>> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
                let line = self.buffer.split_to(pos + 1);
                return Ok(line.to_vec());
            }
            let mut chunk = [0u8; 1024];
            let n = self.io_mut()?.read(&mut chunk).await?;
            if n == 0 {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Reads one command line with the CRLF (or bare LF) stripped.
    pub async fn read_line(&mut self) -> io::Result<String> {
        let mut line = self.read_raw_line().await?;
        strip_terminator(&mut line);
        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    /// Reads a dot-stuffed message body up to the `.` terminator line,
    /// un-stuffing a leading dot on each line (RFC 5321 section 4.5.2).
    ///
    /// With `max > 0`, a body growing past `max` bytes keeps being
    /// consumed up to the terminator - so the command stream stays in
    /// sync - but is thrown away and reported as
    /// [`BodyReadError::TooLarge`].
    pub async fn read_data_body(&mut self, max: usize) -> std::result::Result<Vec<u8>, BodyReadError> {
        let mut body: Vec<u8> = Vec::new();
        let mut too_large = false;
        loop {
            let line = self.read_raw_line().await?;
            if line == b".\r\n" || line == b".\n" {
                break;
            }
            let payload = if line.starts_with(b".") {
                &line[1..]
            } else {
                &line[..]
            };
            if too_large {
                continue;
            }
            if max > 0 && body.len() + payload.len() > max {
                too_large = true;
                continue;
            }
            body.extend_from_slice(payload);
        }
        if too_large {
            Err(BodyReadError::TooLarge(max))
        } else {
            Ok(body)
        }
    }

    /// Writes a reply and flushes it. A failed write poisons the
    /// stream; callers must not attempt further replies.
    pub async fn write_reply(&mut self, reply: &Reply) -> io::Result<()> {
        let rendered = reply.to_string();
        let io = self.io_mut()?;
        io.write_all(rendered.as_bytes()).await?;
        io.flush().await
    }

    pub async fn close(&mut self) -> io::Result<()> {
        match self.io.take() {
            None => Ok(()),
            // async-std's WriteExt has no close, the futures one does
            Some(mut io) => futures_util::io::AsyncWriteExt::close(&mut io).await,
        }
    }
}

fn strip_terminator(line: &mut Vec<u8>) {
    if line.ends_with(b"\n") {
        line.pop();
    }
    if line.ends_with(b"\r") {
        line.pop();
    }
}
