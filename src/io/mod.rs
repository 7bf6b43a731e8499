//! IO abstractions: the boxed stream the session runs on and the TLS
//! upgrade seam used by STARTTLS.

mod rustls;

pub use self::rustls::{load_tls_identity, RustlsUpgrade};

use crate::common::*;

/// Anything a session can run on - a `TcpStream`, a TLS stream or a
/// test double.
pub trait Io: Read + Write + Sync + Send + Unpin {}
impl<T> Io for T where T: Read + Write + Sync + Send + Unpin {}

/// Performs the server side of a TLS handshake over an established
/// stream, consuming the plaintext stream and returning the encrypted
/// one. This is what STARTTLS swaps the session onto.
pub trait TlsUpgrade: Sync + Send {
    fn upgrade_to_tls(&self, stream: Box<dyn Io>) -> S3Fut<io::Result<Box<dyn Io>>>;
}
