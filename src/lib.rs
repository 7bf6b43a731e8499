/*!
An embeddable SMTP server library.

Mailmux accepts TCP connections, drives the SMTP/ESMTP conversation with
each client, optionally upgrades the stream to TLS (STARTTLS, RFC 3207),
optionally authenticates the peer (AUTH PLAIN, RFC 4954), collects an
envelope (sender, recipients, message) and then hands the parsed message
to a handler you supply. It does not spool, relay or store anything -
every accepted message is delivered to your handler exactly once and
forgotten.

The three building blocks:

* a per-connection session driving the protocol state machine,
* a table of command processors - one per SMTP verb - that you can
  extend or replace ([`ProcessorMap`]),
* an address-matching muxer ([`Muxer`]) routing envelopes to handlers
  by `local@domain` patterns with `*` wildcards.

# Usage

Handle everything with one handler:

```no_run
use mailmux::{HandlerFn, Server};

fn main() -> mailmux::common::Result<()> {
    env_logger::init();
    let server = Server::new(HandlerFn::new(|envelope| {
        println!("mail from {} for {:?}", envelope.from, envelope.to);
        Ok(())
    }))
    .on("localhost:2525");
    async_std::task::block_on(server.listen_and_serve())
}
```

Or register handlers per address pattern:

```no_run
use mailmux::{Muxer, Server};

fn main() -> mailmux::common::Result<()> {
    let mut mux = Muxer::default();
    mux.handle_fn("postmaster@example.org", |envelope| {
        println!("for the postmaster: {}", envelope.from);
        Ok(())
    })?;
    mux.handle_fn("*@example.org", |_envelope| Ok(()))?;
    let server = Server::new(mux).on("localhost:2525");
    async_std::task::block_on(server.listen_and_serve())
}
```

STARTTLS is advertised once a TLS provider is configured, either through
[`Server::with_tls`] or by starting with [`Server::listen_and_serve_tls`].
Authentication and recipient filtering are plain callbacks
([`Server::with_auth`], [`Server::with_addressable`]). SPF and MX lookups for the
sender are performed by a pluggable [`SenderLookup`] collaborator and
attached to the envelope; they never decide anything by themselves.
*/

#[macro_use]
extern crate log;

mod address;
mod codec;
mod command;
mod handler;
mod io;
mod lookup;
mod message;
mod mux;
mod reply;
mod server;
mod session;

#[cfg(test)]
pub(crate) mod test_util;

pub use self::address::{canonicalize_local, split_address, AddressError};
pub use self::codec::{BodyReadError, LineCodec};
pub use self::command::{
    Auth, Data, Expn, Helo, Help, Mail, Noop, Processor, ProcessorMap, Quit, Rcpt, Rset, StartTls,
    Vrfy,
};
pub use self::handler::{Envelope, Handler, HandlerFn};
pub use self::io::{load_tls_identity, Io, RustlsUpgrade, TlsUpgrade};
pub use self::lookup::{DnsLookup, SenderLookup, SpfConfig, SpfResult};
pub use self::message::Message;
pub use self::mux::{MuxError, Muxer};
pub use self::reply::Reply;
pub use self::server::{AddressableFn, AuthFn, Server, ServerClosed};
pub use self::session::Session;

pub mod common {
    //! Shared aliases - the async IO traits and the boxed error type
    //! used across the crate.
    pub use async_std::io::prelude::{ReadExt, WriteExt};
    pub use async_std::io::{self, Read, Write};
    pub use std::future::Future;
    pub use std::pin::Pin;
    pub use std::sync::Arc;
    pub use std::task::{Context, Poll};

    pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
    pub type Result<T> = std::result::Result<T, Error>;

    /// Owned boxed future, the shape trait objects hand out.
    pub type S3Fut<T> = Pin<Box<dyn Future<Output = T> + Sync + Send + 'static>>;
}
