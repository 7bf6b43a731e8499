//! The address muxer: routes envelope recipients to handlers by
//! `local@domain` patterns, `*` standing in for either side.

use crate::address::{canonicalize_local, split_address};
use crate::common::*;
use crate::handler::{Envelope, Handler};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxError {
    /// The registration pattern did not split into `local@domain`.
    InvalidPattern(String),
    /// The `(domain, canonical local)` slot is already taken.
    PatternTaken(String),
    /// No handler matched the recipient.
    BadAddress(String),
}

impl fmt::Display for MuxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MuxError::InvalidPattern(pattern) => write!(f, "Invalid pattern: {}", pattern),
            MuxError::PatternTaken(pattern) => write!(f, "Pattern already used: {}", pattern),
            MuxError::BadAddress(_) => f.write_str("Bad Address"),
        }
    }
}

impl std::error::Error for MuxError {}

struct MuxEntry {
    pattern: String,
    handler: Arc<dyn Handler>,
}

/// Pattern table, `domain -> canonical local -> handler`.
///
/// Register everything before serving; the table is only read
/// concurrently, never changed, once the server runs.
#[derive(Default)]
pub struct Muxer {
    table: HashMap<String, HashMap<String, MuxEntry>>,
}

impl Muxer {
    pub fn new() -> Self {
        Muxer::default()
    }

    /// Registers `handler` for `pattern`, e.g. `sales@example.org`,
    /// `*@example.org` or `postmaster@*`. An empty local part counts
    /// as `*`. The local part is canonicalized, so `a.b+tag@x` and
    /// `ab@x` land in the same slot - and collide.
    pub fn handle(
        &mut self,
        pattern: &str,
        handler: Arc<dyn Handler>,
    ) -> std::result::Result<(), MuxError> {
        let (local, domain) = split_address(pattern)
            .map_err(|_| MuxError::InvalidPattern(pattern.to_owned()))?;
        let local = if local.is_empty() { "*" } else { local };
        let local = canonicalize_local(local);
        let domain = domain.to_lowercase();
        let slot = self.table.entry(domain).or_insert_with(HashMap::new);
        if slot.contains_key(&local) {
            return Err(MuxError::PatternTaken(pattern.to_owned()));
        }
        slot.insert(
            local,
            MuxEntry {
                pattern: pattern.to_owned(),
                handler,
            },
        );
        Ok(())
    }

    /// [`Muxer::handle`] for a plain closure.
    pub fn handle_fn<F>(&mut self, pattern: &str, f: F) -> std::result::Result<(), MuxError>
    where
        F: Fn(&Envelope) -> Result<()> + Send + Sync + 'static,
    {
        self.handle(pattern, Arc::new(crate::handler::HandlerFn::new(f)))
    }

    /// Finds the handler for a recipient address. Fallback runs
    /// domain-first, then local: `(domain, local)`, `(domain, *)`,
    /// `(*, local)`, `(*, *)`.
    pub fn route(&self, address: &str) -> std::result::Result<Arc<dyn Handler>, MuxError> {
        let (local, domain) =
            split_address(address).map_err(|_| MuxError::BadAddress(address.to_owned()))?;
        let local = canonicalize_local(local);
        let domain = domain.to_lowercase();
        for (domain_key, local_key) in &[
            (domain.as_str(), local.as_str()),
            (domain.as_str(), "*"),
            ("*", local.as_str()),
            ("*", "*"),
        ] {
            if let Some(entry) = self
                .table
                .get(*domain_key)
                .and_then(|locals| locals.get(*local_key))
            {
                trace!("{} routed by pattern {}", address, entry.pattern);
                return Ok(entry.handler.clone());
            }
        }
        Err(MuxError::BadAddress(address.to_owned()))
    }
}

/// Routing one envelope per recipient is the muxer's handler mode:
/// every recipient is attempted, the last failure wins.
#[async_trait]
impl Handler for Muxer {
    async fn serve_mail(&self, envelope: &Envelope) -> Result<()> {
        let mut last_err: Option<Error> = None;
        for recipient in &envelope.to {
            match self.route(recipient) {
                Err(e) => last_err = Some(e.into()),
                Ok(handler) => {
                    if let Err(e) = handler.serve_mail(&envelope.for_recipient(recipient)).await {
                        last_err = Some(e);
                    }
                }
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Muxer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let patterns: Vec<&str> = self
            .table
            .values()
            .flat_map(|locals| locals.values().map(|entry| entry.pattern.as_str()))
            .collect();
        f.debug_struct("Muxer").field("patterns", &patterns).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::envelope_to;
    use async_std::task::block_on;
    use std::sync::Mutex;

    fn tagging(tag: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Handler> {
        let log = log.clone();
        Arc::new(crate::handler::HandlerFn::new(move |e: &Envelope| {
            log.lock().unwrap().push(format!("{}:{}", tag, e.to[0]));
            Ok(())
        }))
    }

    fn full_mux(log: &Arc<Mutex<Vec<String>>>) -> Muxer {
        let mut mux = Muxer::default();
        mux.handle("a@b", tagging("H1", log)).unwrap();
        mux.handle("*@b", tagging("H2", log)).unwrap();
        mux.handle("a@*", tagging("H3", log)).unwrap();
        mux.handle("*@*", tagging("H4", log)).unwrap();
        mux
    }

    fn routed(mux: &Muxer, log: &Arc<Mutex<Vec<String>>>, address: &str) -> String {
        block_on(async {
            mux.route(address)
                .unwrap()
                .serve_mail(&envelope_to(&[address]))
                .await
                .unwrap();
        });
        log.lock().unwrap().pop().unwrap()
    }

    #[test]
    fn fallback_order() {
        let log = Arc::new(Mutex::new(vec![]));
        let mux = full_mux(&log);
        assert_eq!(routed(&mux, &log, "a@b"), "H1:a@b");
        assert_eq!(routed(&mux, &log, "c@b"), "H2:c@b");
        assert_eq!(routed(&mux, &log, "a@c"), "H3:a@c");
        assert_eq!(routed(&mux, &log, "c@c"), "H4:c@c");
    }

    #[test]
    fn no_match_is_bad_address() {
        let mut mux = Muxer::default();
        mux.handle_fn("a@b", |_| Ok(())).unwrap();
        let err = mux.route("nobody@nowhere").unwrap_err();
        assert_eq!(err.to_string(), "Bad Address");
    }

    #[test]
    fn routing_canonicalizes() {
        let log = Arc::new(Mutex::new(vec![]));
        let mut mux = Muxer::default();
        mux.handle("sean@example.org", tagging("H", &log)).unwrap();
        assert_eq!(
            routed(&mux, &log, "S.e.a.n+lists@EXAMPLE.ORG"),
            "H:S.e.a.n+lists@EXAMPLE.ORG"
        );
    }

    #[test]
    fn empty_local_registers_wildcard() {
        let log = Arc::new(Mutex::new(vec![]));
        let mut mux = Muxer::default();
        mux.handle("@example.org", tagging("H", &log)).unwrap();
        assert_eq!(routed(&mux, &log, "anyone@example.org"), "H:anyone@example.org");
    }

    #[test]
    fn empty_pattern_is_rejected() {
        let mut mux = Muxer::default();
        let err = mux.handle_fn("", |_| Ok(())).unwrap_err();
        assert_eq!(err, MuxError::InvalidPattern(String::new()));
    }

    #[test]
    fn duplicate_slot_is_rejected() {
        let mut mux = Muxer::default();
        mux.handle_fn("a.b@x", |_| Ok(())).unwrap();
        // canonically the same slot as a.b@x
        let err = mux.handle_fn("ab+tag@x", |_| Ok(())).unwrap_err();
        assert_eq!(err, MuxError::PatternTaken("ab+tag@x".to_owned()));
    }

    #[test]
    fn envelope_fans_out_per_recipient() {
        let log = Arc::new(Mutex::new(vec![]));
        let mux = full_mux(&log);
        block_on(async {
            mux.serve_mail(&envelope_to(&["a@b", "c@b"])).await.unwrap();
        });
        assert_eq!(
            &*log.lock().unwrap(),
            &["H1:a@b".to_owned(), "H2:c@b".to_owned()]
        );
    }

    #[test]
    fn unroutable_recipient_fails_the_envelope() {
        let log = Arc::new(Mutex::new(vec![]));
        let mut mux = Muxer::default();
        mux.handle("a@b", tagging("H1", &log)).unwrap();
        let err = block_on(async {
            mux.serve_mail(&envelope_to(&["a@b", "nobody@nowhere"]))
                .await
                .unwrap_err()
        });
        assert_eq!(err.to_string(), "Bad Address");
        // the routable recipient was still delivered
        assert_eq!(&*log.lock().unwrap(), &["H1:a@b".to_owned()]);
    }
}
