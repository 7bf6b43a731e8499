//! Command processors - one per SMTP verb - and the table the
//! dispatcher resolves verbs against.
//!
//! The table is data, not a match: embedders extend the protocol by
//! inserting their own processor under a new verb, or shadow a
//! standard one.

mod auth;
mod data;
mod helo;
mod mail;
mod noop;
mod quit;
mod rcpt;
mod rset;
mod starttls;

pub use self::auth::Auth;
pub use self::data::Data;
pub use self::helo::Helo;
pub use self::mail::Mail;
pub use self::noop::{Expn, Help, Noop, Vrfy};
pub use self::quit::Quit;
pub use self::rcpt::Rcpt;
pub use self::rset::Rset;
pub use self::starttls::StartTls;

use crate::common::*;
use crate::session::Session;
use async_trait::async_trait;
use std::collections::HashMap;

/// Implements one SMTP verb against the session state. The returned
/// error is the dispatcher's current error - only broken IO should
/// produce one, protocol trouble is answered with a reply instead.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, session: &mut Session) -> Result<()>;
}

/// Verb to processor table. Lookups are case-insensitive; keys are
/// stored uppercased and the dispatcher uppercases the verb before
/// resolving it.
#[derive(Clone)]
pub struct ProcessorMap {
    map: HashMap<String, Arc<dyn Processor>>,
}

impl ProcessorMap {
    /// A table with no verbs at all. Useful as a base when an
    /// embedder wants full control over the command surface.
    pub fn empty() -> Self {
        ProcessorMap {
            map: HashMap::new(),
        }
    }

    pub fn insert(&mut self, verb: &str, processor: Arc<dyn Processor>) {
        self.map.insert(verb.to_ascii_uppercase(), processor);
    }

    pub fn get(&self, verb: &str) -> Option<Arc<dyn Processor>> {
        self.map.get(verb).cloned()
    }
}

/// The standard SMTP verb table described in RFC 5321 plus STARTTLS
/// and AUTH.
impl Default for ProcessorMap {
    fn default() -> Self {
        let mut processors = ProcessorMap::empty();
        let helo = Arc::new(Helo);
        processors.insert("EHLO", helo.clone());
        processors.insert("HELO", helo);
        processors.insert("STARTTLS", Arc::new(StartTls));
        processors.insert("AUTH", Arc::new(Auth));
        processors.insert("MAIL", Arc::new(Mail::new()));
        processors.insert("RCPT", Arc::new(Rcpt::new()));
        processors.insert("DATA", Arc::new(Data));
        processors.insert("RSET", Arc::new(Rset));
        processors.insert("VRFY", Arc::new(Vrfy));
        processors.insert("EXPN", Arc::new(Expn));
        processors.insert("HELP", Arc::new(Help));
        processors.insert("NOOP", Arc::new(Noop));
        processors.insert("QUIT", Arc::new(Quit));
        processors
    }
}

impl std::fmt::Debug for ProcessorMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut verbs: Vec<&str> = self.map.keys().map(String::as_str).collect();
        verbs.sort_unstable();
        f.debug_struct("ProcessorMap").field("verbs", &verbs).finish()
    }
}
