//! Sender reputation collaborators: SPF evaluation and MX probing.
//!
//! Both run during MAIL processing when the reverse-path is non-empty
//! and only annotate the session - MAIL never fails because of them.

use async_trait::async_trait;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str;
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::Resolver;
use viaspf::{evaluate_spf, Lookup, LookupError, LookupResult, Name};

pub use viaspf::Config as SpfConfig;

/// Outcome of an SPF check for the sender, RFC 7208 result names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpfResult {
    None,
    Neutral,
    Pass,
    Fail(String),
    SoftFail,
    TempError,
    PermError,
}

impl fmt::Display for SpfResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpfResult::None => f.write_str("none"),
            SpfResult::Neutral => f.write_str("neutral"),
            SpfResult::Pass => f.write_str("pass"),
            SpfResult::Fail(_) => f.write_str("fail"),
            SpfResult::SoftFail => f.write_str("softfail"),
            SpfResult::TempError => f.write_str("temperror"),
            SpfResult::PermError => f.write_str("permerror"),
        }
    }
}

/// Collaborator consulted while processing MAIL FROM. Results are
/// attached to the session and later the envelope; implementations
/// must be fail-open and never block a transaction on their own.
#[async_trait]
pub trait SenderLookup: Send + Sync {
    /// SPF verdict for `sender` in `domain` connecting from `ip`.
    async fn spf(&self, ip: IpAddr, domain: &str, sender: &str) -> SpfResult;

    /// Whether `domain` publishes at least one MX record, i.e. a bounce
    /// could plausibly be returned to the sender.
    async fn mailable(&self, domain: &str) -> bool;
}

/// DNS-backed [`SenderLookup`] using viaspf for the SPF evaluation and
/// trust-dns for the record lookups. The blocking resolver runs on the
/// blocking thread pool.
#[derive(Clone, Default)]
pub struct DnsLookup {
    config: std::sync::Arc<viaspf::Config>,
}

impl DnsLookup {
    pub fn new(config: viaspf::Config) -> Self {
        DnsLookup {
            config: std::sync::Arc::new(config),
        }
    }
}

#[async_trait]
impl SenderLookup for DnsLookup {
    async fn spf(&self, ip: IpAddr, domain: &str, sender: &str) -> SpfResult {
        let config = self.config.clone();
        let domain = domain.to_owned();
        let sender = sender.to_owned();
        async_std::task::spawn_blocking(move || {
            let resolver = match TrustDnsLookup::system() {
                Ok(resolver) => resolver,
                Err(e) => {
                    error!("Could not create resolver: {}", e);
                    return SpfResult::TempError;
                }
            };
            let evaluation = evaluate_spf(&resolver, &*config, ip, &sender, &domain);
            match evaluation.result {
                viaspf::SpfResult::Fail(explanation) => {
                    debug!("SPF fail for {}: {}", sender, explanation);
                    SpfResult::Fail(explanation.to_string())
                }
                other => {
                    trace!("SPF result for {}: {}", sender, other);
                    match other.to_string().as_str() {
                        "pass" => SpfResult::Pass,
                        "neutral" => SpfResult::Neutral,
                        "softfail" => SpfResult::SoftFail,
                        "temperror" => SpfResult::TempError,
                        "permerror" => SpfResult::PermError,
                        _ => SpfResult::None,
                    }
                }
            }
        })
        .await
    }

    async fn mailable(&self, domain: &str) -> bool {
        let domain = domain.to_owned();
        async_std::task::spawn_blocking(move || {
            let resolver = match TrustDnsLookup::system() {
                Ok(resolver) => resolver,
                Err(e) => {
                    error!("Could not create resolver: {}", e);
                    return false;
                }
            };
            match resolver.0.mx_lookup(domain.as_str()) {
                Ok(mxs) => mxs.iter().next().is_some(),
                Err(e) => {
                    trace!("No MX for {}: {}", domain, e);
                    false
                }
            }
        })
        .await
    }
}

/// viaspf lookup adapter over the blocking trust-dns resolver.
struct TrustDnsLookup(Resolver);

impl TrustDnsLookup {
    fn system() -> crate::common::Result<Self> {
        Ok(TrustDnsLookup(Resolver::default()?))
    }
}

impl Lookup for TrustDnsLookup {
    fn lookup_a(&self, name: &Name) -> LookupResult<Vec<Ipv4Addr>> {
        Ok(self
            .0
            .ipv4_lookup(name.as_str())
            .map_err(to_lookup_error)?
            .into_iter()
            .collect())
    }

    fn lookup_aaaa(&self, name: &Name) -> LookupResult<Vec<Ipv6Addr>> {
        Ok(self
            .0
            .ipv6_lookup(name.as_str())
            .map_err(to_lookup_error)?
            .into_iter()
            .collect())
    }

    fn lookup_mx(&self, name: &Name) -> LookupResult<Vec<Name>> {
        let mut mxs = self
            .0
            .mx_lookup(name.as_str())
            .map_err(to_lookup_error)?
            .into_iter()
            .collect::<Vec<_>>();
        mxs.sort_by_key(|mx| mx.preference());
        mxs.into_iter()
            .map(|mx| {
                Name::new(&mx.exchange().to_ascii())
                    .map_err(|e| LookupError::Dns(Some(e.into())))
            })
            .collect()
    }

    fn lookup_txt(&self, name: &Name) -> LookupResult<Vec<String>> {
        self.0
            .txt_lookup(name.as_str())
            .map_err(to_lookup_error)?
            .into_iter()
            .map(|txt| {
                txt.iter()
                    .map(|data| {
                        str::from_utf8(data).map_err(|e| LookupError::Dns(Some(e.into())))
                    })
                    .collect()
            })
            .collect()
    }

    fn lookup_ptr(&self, ip: IpAddr) -> LookupResult<Vec<Name>> {
        self.0
            .reverse_lookup(ip)
            .map_err(to_lookup_error)?
            .into_iter()
            .map(|name| {
                Name::new(&name.to_ascii()).map_err(|e| LookupError::Dns(Some(e.into())))
            })
            .collect()
    }
}

fn to_lookup_error(error: ResolveError) -> LookupError {
    use ResolveErrorKind::*;
    match error.kind() {
        NoRecordsFound { .. } => LookupError::NoRecords,
        Io(_) => LookupError::Dns(Some(error.into())),
        Timeout => LookupError::Timeout,
        _ => LookupError::Dns(Some(error.into())),
    }
}
