use crate::command::Processor;
use crate::common::*;
use crate::session::Session;
use async_trait::async_trait;

/// AUTH, RFC 4954, mechanism PLAIN only. Both forms are accepted:
/// `AUTH PLAIN <base64>` in one line, or `AUTH PLAIN` followed by a
/// `334 ` challenge and the base64 on its own line.
pub struct Auth;

#[async_trait]
impl Processor for Auth {
    async fn process(&self, session: &mut Session) -> Result<()> {
        let auth = match session.server().auth() {
            None => return session.say(502, "Command not implemented").await,
            Some(auth) => auth,
        };
        if session.line.len() < 2 {
            return session.say(501, "Not enough arguments").await;
        }
        let mut ppwd = String::new();
        if session.line.len() == 2 && session.line[1] == "PLAIN" {
            session.say(334, "").await?;
            ppwd = session.read_line().await?;
        }
        if session.line.len() == 3 && session.line[1] == "PLAIN" {
            ppwd = session.line[2].clone();
        }
        let decoded = match base64::decode(&ppwd) {
            Ok(decoded) => decoded,
            Err(_) => return session.say(501, "Bad base64 encoding").await,
        };
        // PLAIN is authzid NUL authcid NUL passwd; the authzid is ignored
        let parts: Vec<&[u8]> = decoded.split(|b| *b == 0).collect();
        if parts.len() != 3 {
            return session.say(501, "Bad base64 encoding").await;
        }
        let username = String::from_utf8_lossy(parts[1]).into_owned();
        let password = String::from_utf8_lossy(parts[2]).into_owned();
        match auth(&username, &password, &session.remote_addr) {
            Ok(()) => {
                session.auth_user = username;
                session.say(235, "2.7.0 Authentication successful").await
            }
            Err(e) => {
                debug!("[{}] authentication failed: {}", session.remote_addr, e);
                session.auth_user.clear();
                session
                    .say(535, "5.7.8  Authentication credentials invalid")
                    .await
            }
        }
    }
}
