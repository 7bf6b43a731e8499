use crate::address::PathParser;
use crate::command::Processor;
use crate::common::*;
use crate::session::Session;
use async_trait::async_trait;

/// RCPT TO. Appends a recipient once MAIL has been accepted, asking
/// the addressable callback - when one is configured - whether the
/// address is one of ours.
pub struct Rcpt {
    parser: PathParser,
}

impl Rcpt {
    pub fn new() -> Self {
        Rcpt {
            parser: PathParser::new(),
        }
    }
}

impl Default for Rcpt {
    fn default() -> Self {
        Rcpt::new()
    }
}

#[async_trait]
impl Processor for Rcpt {
    async fn process(&self, session: &mut Session) -> Result<()> {
        if !session.mail_from_received {
            return session.say(503, "Bad sequence of commands").await;
        }
        if session.line.len() < 2 {
            return session.say(501, "Not enough arguments").await;
        }
        if !session.line[1].starts_with("TO:") {
            return session
                .say(501, "RCPT command must be immediately succeeded by 'TO:'")
                .await;
        }
        let raw = session.line[1]["TO:".len()..].to_owned();
        let path = match self.parser.parse(&raw) {
            None => {
                return session
                    .say(501, "RCPT command contained invalid address")
                    .await
            }
            Some(path) => path,
        };
        if let Some(addressable) = session.server().addressable() {
            if !addressable(&session.auth_user, &path.address) {
                let text = format!("no such user - {}", path.address);
                return session.say(501, text).await;
            }
        }
        session.to.push(path.address);
        session.say(250, "Ok").await
    }
}
