use crate::address::PathParser;
use crate::command::Processor;
use crate::common::*;
use crate::session::Session;
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr};

/// MAIL FROM. Opens the transaction, records the reverse-path and -
/// when a sender is present and a lookup collaborator is configured -
/// attaches the SPF verdict and the MX probe result. Neither lookup
/// outcome can fail the command.
pub struct Mail {
    parser: PathParser,
}

impl Mail {
    pub fn new() -> Self {
        Mail {
            parser: PathParser::new(),
        }
    }
}

impl Default for Mail {
    fn default() -> Self {
        Mail::new()
    }
}

#[async_trait]
impl Processor for Mail {
    async fn process(&self, session: &mut Session) -> Result<()> {
        if session.server().auth().is_some() && session.auth_user.is_empty() {
            return session.say(503, "Authentication needed").await;
        }
        if !session.from.is_empty() {
            return session.say(503, "MAIL command already received").await;
        }
        if session.line.len() < 2 {
            return session.say(501, "Not enough arguments").await;
        }
        if !session.line[1].starts_with("FROM:") {
            return session
                .say(501, "MAIL command must be immediately succeeded by 'FROM:'")
                .await;
        }
        let raw = session.line[1]["FROM:".len()..]
            .trim_matches(|c: char| c.is_ascii_whitespace())
            .to_owned();
        let path = match self.parser.parse(&raw) {
            None => {
                return session
                    .say(501, "MAIL command contained invalid address")
                    .await
            }
            Some(path) => path,
        };

        session.mail_from_received = true;
        session.from = path.address;
        if !session.from.is_empty() {
            session.from_domain = path.domain;
            if let Some(lookup) = session.server().lookup() {
                let ip = session
                    .remote_ip()
                    .unwrap_or_else(|| IpAddr::V4(Ipv4Addr::UNSPECIFIED));
                let domain = session.from_domain.clone();
                let sender = session.from.clone();
                let spf = lookup.spf(ip, &domain, &sender).await;
                trace!("[{}] SPF for {}: {}", session.remote_addr, sender, spf);
                session.spf_result = Some(spf);
                session.mailable = lookup.mailable(&domain).await;
            }
        }
        session.say(250, "Ok").await
    }
}
