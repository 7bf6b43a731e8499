//! Server configuration, the accept loop and graceful shutdown.

use crate::command::ProcessorMap;
use crate::common::*;
use crate::handler::Handler;
use crate::io::{load_tls_identity, TlsUpgrade};
use crate::lookup::{DnsLookup, SenderLookup};
use crate::session::Session;
use async_std::net::{TcpListener, TcpStream};
use async_std::task;
use futures_util::future::{select, Either};
use futures_util::pin_mut;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Authentication callback: username, password, remote address.
/// Any error means the credentials are refused.
pub type AuthFn = Arc<dyn Fn(&str, &str, &str) -> Result<()> + Send + Sync>;

/// Recipient filter: authenticated user (may be empty) and the
/// recipient address. `false` refuses the RCPT.
pub type AddressableFn = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Returned by [`Server::serve`] after a graceful [`Server::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerClosed;

impl fmt::Display for ServerClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("smtp server closed")
    }
}

impl std::error::Error for ServerClosed {}

struct ServeState {
    closed: AtomicBool,
    active: AtomicUsize,
    close_tx: async_std::channel::Sender<()>,
    close_rx: async_std::channel::Receiver<()>,
}

impl ServeState {
    fn new() -> Self {
        let (close_tx, close_rx) = async_std::channel::bounded(1);
        ServeState {
            closed: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            close_tx,
            close_rx,
        }
    }
}

/// Decrements the active-session counter however the session ends.
struct ActiveSession(Arc<ServeState>);

impl ActiveSession {
    fn begin(state: &Arc<ServeState>) -> Self {
        state.active.fetch_add(1, Ordering::SeqCst);
        ActiveSession(state.clone())
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The embedder-facing configuration and entry point.
///
/// Cheap to clone; clones share the serving state, so a clone can be
/// parked on another task just to call [`Server::shutdown`] later.
/// Configuration must be finished before serving starts.
#[derive(Clone)]
pub struct Server {
    name: String,
    addr: String,
    handler: Arc<dyn Handler>,
    tls: Option<Arc<dyn TlsUpgrade>>,
    auth: Option<AuthFn>,
    addressable: Option<AddressableFn>,
    processors: ProcessorMap,
    max_body_size: usize,
    lookup: Option<Arc<dyn SenderLookup>>,
    state: Arc<ServeState>,
}

impl Server {
    /// A server delivering everything to `handler` - commonly a
    /// [`crate::Muxer`] - greeting as `localhost` on `localhost:25`.
    pub fn new(handler: impl Handler + 'static) -> Self {
        Server {
            name: "localhost".to_owned(),
            addr: "localhost:25".to_owned(),
            handler: Arc::new(handler),
            tls: None,
            auth: None,
            addressable: None,
            processors: ProcessorMap::default(),
            max_body_size: 0,
            lookup: Some(Arc::new(DnsLookup::default())),
            state: Arc::new(ServeState::new()),
        }
    }

    /// Address to bind, `host:port`.
    pub fn on(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Name used in the greeting and the EHLO banner.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Enables STARTTLS with the given upgrade provider.
    pub fn with_tls(mut self, upgrade: impl TlsUpgrade + 'static) -> Self {
        self.tls = Some(Arc::new(upgrade));
        self
    }

    /// Enables AUTH PLAIN, gating MAIL on a successful login.
    pub fn with_auth<F>(mut self, auth: F) -> Self
    where
        F: Fn(&str, &str, &str) -> Result<()> + Send + Sync + 'static,
    {
        self.auth = Some(Arc::new(auth));
        self
    }

    /// Lets the embedder refuse recipients that are not theirs.
    pub fn with_addressable<F>(mut self, addressable: F) -> Self
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        self.addressable = Some(Arc::new(addressable));
        self
    }

    /// Replaces the verb table.
    pub fn with_processors(mut self, processors: ProcessorMap) -> Self {
        self.processors = processors;
        self
    }

    /// Caps the DATA body; 0 means unlimited.
    pub fn with_max_body_size(mut self, max: usize) -> Self {
        self.max_body_size = max;
        self
    }

    /// Replaces the SPF/MX collaborator consulted during MAIL.
    pub fn with_lookup(mut self, lookup: impl SenderLookup + 'static) -> Self {
        self.lookup = Some(Arc::new(lookup));
        self
    }

    /// Disables sender lookups entirely.
    pub fn without_lookup(mut self) -> Self {
        self.lookup = None;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    pub fn handler(&self) -> Arc<dyn Handler> {
        self.handler.clone()
    }

    pub fn tls(&self) -> Option<Arc<dyn TlsUpgrade>> {
        self.tls.clone()
    }

    pub fn auth(&self) -> Option<AuthFn> {
        self.auth.clone()
    }

    pub fn addressable(&self) -> Option<AddressableFn> {
        self.addressable.clone()
    }

    pub fn lookup(&self) -> Option<Arc<dyn SenderLookup>> {
        self.lookup.clone()
    }

    pub fn processors(&self) -> &ProcessorMap {
        &self.processors
    }

    /// Binds the configured address and serves until shut down.
    pub async fn listen_and_serve(&self) -> Result<()> {
        let listener = TcpListener::bind(self.addr.as_str()).await?;
        self.serve(listener).await
    }

    /// Like [`Server::listen_and_serve`] with STARTTLS enabled from
    /// the given PEM certificate chain and private key. Connections
    /// still start in plaintext; TLS begins when the client asks.
    pub async fn listen_and_serve_tls(
        &self,
        cert_file: impl AsRef<Path>,
        key_file: impl AsRef<Path>,
    ) -> Result<()> {
        let upgrade = load_tls_identity(cert_file, key_file)?;
        self.clone().with_tls(upgrade).listen_and_serve().await
    }

    /// Accepts connections on `listener`, spawning one task per
    /// session, until a fatal accept error or [`Server::shutdown`].
    /// Transient accept errors are retried with exponential backoff,
    /// 5ms doubling up to 1s. Returns [`ServerClosed`] after a
    /// graceful shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        match listener.local_addr() {
            Ok(addr) => info!("{} listening on {}", self.name, addr),
            Err(_) => info!("{} listening", self.name),
        }
        let close_rx = self.state.close_rx.clone();
        let mut delay: Option<Duration> = None;
        loop {
            if self.state.closed.load(Ordering::SeqCst) {
                return Err(ServerClosed.into());
            }
            let accept = listener.accept();
            let closed = close_rx.recv();
            pin_mut!(accept);
            pin_mut!(closed);
            match select(accept, closed).await {
                Either::Left((Ok((stream, peer)), _)) => {
                    delay = None;
                    self.spawn_session(stream, peer.to_string());
                }
                Either::Left((Err(e), _)) => {
                    if !is_transient(&e) {
                        return Err(e.into());
                    }
                    let next = match delay {
                        None => Duration::from_millis(5),
                        Some(d) => (d * 2).min(Duration::from_secs(1)),
                    };
                    warn!("accept error: {}; retrying in {:?}", e, next);
                    delay = Some(next);
                    task::sleep(next).await;
                }
                Either::Right((_, _)) => return Err(ServerClosed.into()),
            }
        }
    }

    fn spawn_session(&self, stream: TcpStream, remote_addr: String) {
        // counted before the spawn so shutdown cannot miss it
        let guard = ActiveSession::begin(&self.state);
        let server = self.clone();
        task::spawn(async move {
            let _guard = guard;
            debug!("[{}] connected", remote_addr);
            let mut session = Session::new(server, Box::new(stream), remote_addr.clone());
            match session.serve().await {
                Ok(()) => debug!("[{}] session ended", remote_addr),
                Err(e) => debug!("[{}] session ended: {}", remote_addr, e),
            }
        });
    }

    /// Stops accepting, then waits for running sessions to finish.
    /// Sessions are not cancelled; a session outliving `deadline`
    /// makes this return a timeout error, the sessions keep running.
    pub async fn shutdown(&self, deadline: Duration) -> Result<()> {
        info!("{} shutting down", self.name);
        self.state.closed.store(true, Ordering::SeqCst);
        self.state.close_tx.close();
        let end = Instant::now() + deadline;
        while self.state.active.load(Ordering::SeqCst) > 0 {
            if Instant::now() >= end {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "sessions still active past the shutdown deadline",
                )
                .into());
            }
            task::sleep(Duration::from_millis(10)).await;
        }
        Ok(())
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.name)
            .field("addr", &self.addr)
            .field("tls", &self.tls.is_some())
            .field("auth", &self.auth.is_some())
            .field("addressable", &self.addressable.is_some())
            .field("max_body_size", &self.max_body_size)
            .field("processors", &self.processors)
            .finish()
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
    )
}
