//! The seam between the protocol engine and the embedding application.

use crate::common::*;
use crate::lookup::SpfResult;
use crate::message::Message;
use async_trait::async_trait;

/// Everything known about an accepted mail transaction, handed to the
/// handler after the DATA terminator.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Name the server greets with, its identity towards the client.
    pub local_name: String,
    /// Peer address as accepted, `ip:port`.
    pub remote_addr: String,
    /// True once STARTTLS completed on this connection.
    pub tls: bool,
    /// Authenticated user, empty for an anonymous session.
    pub auth_user: String,
    /// Host the client introduced itself as in HELO/EHLO.
    pub hello_host: String,
    /// Reverse-path; empty for a bounce (`MAIL FROM:<>`).
    pub from: String,
    /// Accepted recipients, in RCPT order. A muxed handler sees
    /// exactly one.
    pub to: Vec<String>,
    /// The parsed message.
    pub message: Arc<Message>,
    /// SPF verdict for the sender, when a lookup collaborator ran.
    pub spf: Option<SpfResult>,
    /// Whether the sender domain publishes MX records.
    pub mailable: bool,
}

impl Envelope {
    /// A copy of this envelope narrowed down to a single recipient,
    /// the unit the muxer routes.
    pub fn for_recipient(&self, recipient: &str) -> Envelope {
        Envelope {
            to: vec![recipient.to_owned()],
            ..self.clone()
        }
    }
}

/// Receives accepted envelopes. Returning an error turns into a
/// `450 <error>` reply and the transaction is dropped.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve_mail(&self, envelope: &Envelope) -> Result<()>;
}

impl std::fmt::Debug for dyn Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<Handler>")
    }
}

#[async_trait]
impl<T: Handler + ?Sized> Handler for Arc<T> {
    async fn serve_mail(&self, envelope: &Envelope) -> Result<()> {
        T::serve_mail(self, envelope).await
    }
}

/// Adapts a plain closure into a [`Handler`].
pub struct HandlerFn<F>(F);

impl<F> HandlerFn<F>
where
    F: Fn(&Envelope) -> Result<()> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        HandlerFn(f)
    }
}

#[async_trait]
impl<F> Handler for HandlerFn<F>
where
    F: Fn(&Envelope) -> Result<()> + Send + Sync,
{
    async fn serve_mail(&self, envelope: &Envelope) -> Result<()> {
        (self.0)(envelope)
    }
}
