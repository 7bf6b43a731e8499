use crate::command::Processor;
use crate::common::*;
use crate::reply::Reply;
use crate::session::Session;
use async_trait::async_trait;

/// HELO and EHLO share this processor: both reset the transaction,
/// record the client's name and answer with the extension banner.
pub struct Helo;

#[async_trait]
impl Processor for Helo {
    async fn process(&self, session: &mut Session) -> Result<()> {
        if session.line.len() < 2 {
            return session.say(501, "Not enough arguments").await;
        }
        session.reset_transaction();
        session.hello_host = session.line[1].clone();
        session.hello_received = true;

        let mut reply = Reply::new(250, format!("Greets {}", session.hello_host));
        let tls_configured = session.server().tls().is_some();
        if tls_configured && !session.tls_active {
            reply = reply.item("STARTTLS");
        }
        // never advertise PLAIN over cleartext while TLS is on offer;
        // without any TLS configured it is advertised as-is
        if session.server().auth().is_some() && (!tls_configured || session.tls_active) {
            reply = reply.item("AUTH PLAIN");
        }
        reply = reply.item("PIPELINING").item("SMTPUTF8").item("8BITMIME");
        session.say_reply(reply).await
    }
}
