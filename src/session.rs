//! Per-connection protocol state and the dispatcher loop.

use crate::codec::{BodyReadError, LineCodec};
use crate::common::*;
use crate::handler::Envelope;
use crate::io::{Io, TlsUpgrade};
use crate::lookup::SpfResult;
use crate::message::Message;
use crate::reply::Reply;
use crate::server::Server;
use std::net::SocketAddr;

/// One TCP connection's worth of SMTP state, owned by the task
/// serving that connection.
///
/// Processors mutate the session directly; the dispatcher serializes
/// them, so no locking is involved. Fields are public because the
/// processor table is an extension point.
pub struct Session {
    server: Server,
    codec: LineCodec,
    /// Peer address as accepted, `ip:port`.
    pub remote_addr: String,
    /// True once STARTTLS completed.
    pub tls_active: bool,
    /// Set by HELO/EHLO, cleared again by STARTTLS (RFC 3207 requires
    /// a fresh EHLO after the handshake).
    pub hello_received: bool,
    pub hello_host: String,
    /// Authenticated user, empty while anonymous. Survives RSET.
    pub auth_user: String,
    /// MAIL FROM arrived; `from` may still be empty for a bounce.
    pub mail_from_received: bool,
    pub from: String,
    pub from_domain: String,
    /// Accepted recipients, append-only within a transaction.
    pub to: Vec<String>,
    /// Parsed message, present only between DATA and the reset that
    /// follows the handler.
    pub message: Option<Arc<Message>>,
    /// Ends the dispatcher loop after the current reply.
    pub quit_sent: bool,
    pub spf_result: Option<SpfResult>,
    pub mailable: bool,
    /// Tokens of the line being processed, `line[0]` is the verb as
    /// sent by the client.
    pub line: Vec<String>,
}

impl Session {
    pub fn new(server: Server, io: Box<dyn Io>, remote_addr: String) -> Self {
        Session {
            server,
            codec: LineCodec::new(io),
            remote_addr,
            tls_active: false,
            hello_received: false,
            hello_host: String::new(),
            auth_user: String::new(),
            mail_from_received: false,
            from: String::new(),
            from_domain: String::new(),
            to: vec![],
            message: None,
            quit_sent: false,
            spf_result: None,
            mailable: false,
            line: vec![],
        }
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Greets the client and processes commands until QUIT or a dead
    /// stream. IO errors end the session silently, per the failure
    /// model - no reply is attempted on a broken socket.
    pub async fn serve(&mut self) -> Result<()> {
        let greeting = format!("{} ESMTP", self.server.name());
        self.say(220, greeting).await?;
        let result = self.run().await;
        if let Err(e) = self.codec.close().await {
            trace!("[{}] close: {}", self.remote_addr, e);
        }
        result
    }

    pub(crate) async fn run(&mut self) -> Result<()> {
        while !self.quit_sent {
            let line = self.codec.read_line().await?;
            trace!("[{}] > {}", self.remote_addr, line);
            if line.is_empty() {
                self.say(500, format!("Command not recognized ({})", line))
                    .await?;
                continue;
            }
            self.line = line.split(' ').map(str::to_owned).collect();
            let verb = self.line[0].to_ascii_uppercase();
            match self.server.processors().get(&verb) {
                Some(processor) => processor.process(self).await?,
                None => {
                    self.say(500, format!("Command not recognized ({})", verb))
                        .await?
                }
            }
        }
        Ok(())
    }

    /// Drops the transaction. Hello state, the authenticated user and
    /// the TLS state survive; MAIL through DATA state does not.
    pub fn reset_transaction(&mut self) {
        self.mail_from_received = false;
        self.from.clear();
        self.from_domain.clear();
        self.to.clear();
        self.message = None;
        self.spf_result = None;
        self.mailable = false;
    }

    /// Writes a single-line reply.
    pub async fn say(&mut self, code: u16, text: impl Into<String>) -> Result<()> {
        self.say_reply(Reply::new(code, text)).await
    }

    pub async fn say_reply(&mut self, reply: Reply) -> Result<()> {
        let rendered = reply.to_string();
        if reply.is_error() {
            debug!("[{}] < {}", self.remote_addr, rendered.trim_end());
        } else {
            trace!("[{}] < {}", self.remote_addr, rendered.trim_end());
        }
        self.codec.write_reply(&reply).await?;
        Ok(())
    }

    /// Reads a continuation line from the client, for processors that
    /// need more than one line (AUTH PLAIN's challenge form).
    pub async fn read_line(&mut self) -> io::Result<String> {
        let line = self.codec.read_line().await?;
        trace!("[{}] > {}", self.remote_addr, line);
        Ok(line)
    }

    /// Reads the dot-stuffed DATA body, capped at the server's
    /// configured maximum.
    pub async fn read_data_body(&mut self) -> std::result::Result<Vec<u8>, BodyReadError> {
        self.codec.read_data_body(self.server.max_body_size()).await
    }

    /// Runs the TLS handshake and swaps the codec onto the encrypted
    /// stream. On failure the error propagates and the session dies;
    /// the stream is not usable after a botched handshake.
    pub async fn upgrade_tls(&mut self, upgrade: Arc<dyn TlsUpgrade>) -> Result<()> {
        let plain = match self.codec.take_io() {
            Some(io) => io,
            None => return Err(io::Error::from(io::ErrorKind::NotConnected).into()),
        };
        let encrypted = upgrade.upgrade_to_tls(plain).await?;
        self.codec = LineCodec::new(encrypted);
        self.tls_active = true;
        debug!("[{}] TLS established", self.remote_addr);
        Ok(())
    }

    /// The peer's IP, when the remote address parses as `ip:port`.
    pub fn remote_ip(&self) -> Option<std::net::IpAddr> {
        self.remote_addr
            .parse::<SocketAddr>()
            .ok()
            .map(|addr| addr.ip())
    }

    /// Snapshot handed to the handler, carrying `message` as the
    /// accepted DATA payload. A replacement DATA processor builds its
    /// envelope through this too.
    pub fn envelope(&self, message: Arc<Message>) -> Envelope {
        Envelope {
            local_name: self.server.name().to_owned(),
            remote_addr: self.remote_addr.clone(),
            tls: self.tls_active,
            auth_user: self.auth_user.clone(),
            hello_host: self.hello_host.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            message,
            spf: self.spf_result.clone(),
            mailable: self.mailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{replies, test_session};
    use async_std::task::block_on;

    #[test]
    fn greets_and_quits() {
        block_on(async {
            let (mut session, out) = test_session("QUIT\r\n");
            session.serve().await.unwrap();
            assert_eq!(replies(&out), "220 localhost ESMTP\r\n221 OK\r\n");
            assert!(session.quit_sent);
        })
    }

    #[test]
    fn unknown_verb_is_rejected_uppercased() {
        block_on(async {
            let (mut session, out) = test_session("XYZZY foo\r\nQUIT\r\n");
            session.serve().await.unwrap();
            assert!(replies(&out).contains("500 Command not recognized (XYZZY)\r\n"));
        })
    }

    #[test]
    fn verbs_match_case_insensitively() {
        block_on(async {
            let (mut session, out) = test_session("noop\r\nQuIt\r\n");
            session.serve().await.unwrap();
            let all = replies(&out);
            assert!(all.contains("250 OK\r\n"));
            assert!(all.contains("221 OK\r\n"));
        })
    }

    #[test]
    fn empty_line_is_rejected() {
        block_on(async {
            let (mut session, out) = test_session("\r\nQUIT\r\n");
            session.serve().await.unwrap();
            assert!(replies(&out).contains("500 Command not recognized ()\r\n"));
        })
    }

    #[test]
    fn client_vanishing_is_an_error() {
        block_on(async {
            let (mut session, _out) = test_session("NOOP\r\n");
            assert!(session.serve().await.is_err());
        })
    }

    #[test]
    fn reset_preserves_identity() {
        let (mut session, _out) = test_session("");
        session.auth_user = "user".to_owned();
        session.hello_received = true;
        session.hello_host = "client.test".to_owned();
        session.tls_active = true;
        session.mail_from_received = true;
        session.from = "a@x.test".to_owned();
        session.from_domain = "x.test".to_owned();
        session.to.push("b@y.test".to_owned());
        session.mailable = true;
        session.spf_result = Some(SpfResult::Pass);
        session.reset_transaction();
        assert!(!session.mail_from_received);
        assert!(session.from.is_empty());
        assert!(session.to.is_empty());
        assert!(session.message.is_none());
        assert!(session.spf_result.is_none());
        assert!(!session.mailable);
        assert_eq!(session.auth_user, "user");
        assert!(session.hello_received);
        assert!(session.tls_active);
    }

    #[test]
    fn remote_ip_parses_socket_addr() {
        let (mut session, _out) = test_session("");
        session.remote_addr = "192.0.2.7:4444".to_owned();
        assert_eq!(session.remote_ip(), Some("192.0.2.7".parse().unwrap()));
        session.remote_addr = "not an address".to_owned();
        assert_eq!(session.remote_ip(), None);
    }
}
