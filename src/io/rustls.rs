//! TLS upgrade backed by async-tls and rustls.

use crate::common::*;
use crate::io::{Io, TlsUpgrade};
use async_tls::TlsAcceptor;
use rustls::internal::pemfile;
use rustls::{NoClientAuth, ServerConfig};
use std::path::Path;

/// [`TlsUpgrade`] implementation wrapping a rustls acceptor.
#[derive(Clone)]
pub struct RustlsUpgrade {
    acceptor: TlsAcceptor,
}

impl From<TlsAcceptor> for RustlsUpgrade {
    fn from(acceptor: TlsAcceptor) -> Self {
        RustlsUpgrade { acceptor }
    }
}

impl From<ServerConfig> for RustlsUpgrade {
    fn from(config: ServerConfig) -> Self {
        TlsAcceptor::from(Arc::new(config)).into()
    }
}

impl TlsUpgrade for RustlsUpgrade {
    fn upgrade_to_tls(&self, stream: Box<dyn Io>) -> S3Fut<io::Result<Box<dyn Io>>> {
        let handshake = self.acceptor.accept(stream);
        Box::pin(async move {
            match handshake.await {
                Ok(encrypted) => {
                    let encrypted: Box<dyn Io> = Box::new(encrypted);
                    Ok(encrypted)
                }
                Err(e) => Err(e),
            }
        })
    }
}

impl std::fmt::Debug for RustlsUpgrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RustlsUpgrade").finish()
    }
}

/// Loads a PEM certificate chain and private key (PKCS#8 or RSA) into
/// a [`RustlsUpgrade`] ready for [`crate::Server::tls`].
pub fn load_tls_identity(
    cert_file: impl AsRef<Path>,
    key_file: impl AsRef<Path>,
) -> Result<RustlsUpgrade> {
    let cert_file = cert_file.as_ref();
    let key_file = key_file.as_ref();

    let certbuf = std::fs::read(cert_file)
        .map_err(|e| format!("Could not read certs from {:?}: {}", cert_file, e))?;
    let certs = pemfile::certs(&mut &certbuf[..])
        .map_err(|_| format!("Could not parse certs from {:?}", cert_file))?;
    if certs.is_empty() {
        return Err(format!("No certs found in {:?}", cert_file).into());
    }

    let keybuf = std::fs::read(key_file)
        .map_err(|e| format!("Could not read identity from {:?}: {}", key_file, e))?;
    let mut keys = pemfile::pkcs8_private_keys(&mut &keybuf[..])
        .map_err(|_| format!("Could not parse identity from {:?}", key_file))?;
    if keys.is_empty() {
        keys = pemfile::rsa_private_keys(&mut &keybuf[..])
            .map_err(|_| format!("Could not parse identity from {:?}", key_file))?;
    }
    let key = match keys.into_iter().next() {
        Some(key) => key,
        None => return Err(format!("No private key found in {:?}", key_file).into()),
    };

    let mut config = ServerConfig::new(NoClientAuth::new());
    config.set_single_cert(certs, key)?;
    Ok(config.into())
}
