//! In-memory doubles for the unit tests: a scripted stream, canned
//! servers and envelope fixtures.

use crate::common::*;
use crate::handler::{Envelope, Handler, HandlerFn};
use crate::io::{Io, TlsUpgrade};
use crate::message::Message;
use crate::server::Server;
use crate::session::Session;
use std::sync::Mutex;

/// A stream fed from a fixed script, capturing everything written
/// into a shared buffer the test can inspect.
pub struct MockIo {
    input: std::io::Cursor<Vec<u8>>,
    output: Arc<Mutex<Vec<u8>>>,
}

impl MockIo {
    pub fn pair(input: &[u8]) -> (MockIo, Arc<Mutex<Vec<u8>>>) {
        let output = Arc::new(Mutex::new(Vec::new()));
        (
            MockIo {
                input: std::io::Cursor::new(input.to_vec()),
                output: output.clone(),
            },
            output,
        )
    }
}

impl Read for MockIo {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(std::io::Read::read(&mut self.get_mut().input, buf))
    }
}

impl Write for MockIo {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.get_mut().output.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Everything written so far, as text.
pub fn replies(output: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8_lossy(&output.lock().unwrap()).into_owned()
}

/// "TLS" upgrade that hands the very same stream back, so the
/// STARTTLS control flow can run without a handshake.
pub struct NullTls;

impl TlsUpgrade for NullTls {
    fn upgrade_to_tls(&self, stream: Box<dyn Io>) -> S3Fut<io::Result<Box<dyn Io>>> {
        Box::pin(async move { Ok(stream) })
    }
}

/// A server that accepts everything and looks nothing up.
pub fn test_server() -> Server {
    test_server_with(HandlerFn::new(|_| Ok(())))
}

pub fn test_server_with(handler: impl Handler + 'static) -> Server {
    Server::new(handler).without_lookup()
}

/// A server recording every envelope its handler sees.
pub fn recording_server() -> (Server, Arc<Mutex<Vec<Envelope>>>) {
    let delivered: Arc<Mutex<Vec<Envelope>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = delivered.clone();
    let server = test_server_with(HandlerFn::new(move |envelope: &Envelope| {
        sink.lock().unwrap().push(envelope.clone());
        Ok(())
    }));
    (server, delivered)
}

pub fn session_for(server: Server, input: &str) -> (Session, Arc<Mutex<Vec<u8>>>) {
    let (mock, output) = MockIo::pair(input.as_bytes());
    let session = Session::new(server, Box::new(mock), "127.0.0.1:12345".to_owned());
    (session, output)
}

pub fn test_session(input: &str) -> (Session, Arc<Mutex<Vec<u8>>>) {
    session_for(test_server(), input)
}

/// An envelope fixture addressed to the given recipients.
pub fn envelope_to(recipients: &[&str]) -> Envelope {
    let message = Message::parse(b"Subject: t\r\n\r\nhi\r\n".to_vec()).unwrap();
    Envelope {
        local_name: "localhost".to_owned(),
        remote_addr: "127.0.0.1:12345".to_owned(),
        tls: false,
        auth_user: String::new(),
        hello_host: "client.test".to_owned(),
        from: "a@x.test".to_owned(),
        to: recipients.iter().map(|r| (*r).to_owned()).collect(),
        message: Arc::new(message),
        spf: None,
        mailable: false,
    }
}
