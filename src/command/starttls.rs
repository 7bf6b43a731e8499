use crate::command::Processor;
use crate::common::*;
use crate::session::Session;
use async_trait::async_trait;

/// STARTTLS, RFC 3207. After the handshake the client has to
/// introduce itself again; nothing from the plaintext phase survives
/// except the authentication-free, transaction-free session itself.
pub struct StartTls;

#[async_trait]
impl Processor for StartTls {
    async fn process(&self, session: &mut Session) -> Result<()> {
        let upgrade = match session.server().tls() {
            None => return session.say(454, "TLS unavailable on the server").await,
            Some(upgrade) => upgrade,
        };
        if session.tls_active {
            return session.say(454, "TLS session already active").await;
        }
        session.say(220, "Ready to start TLS").await?;
        // a handshake failure propagates and tears the session down
        session.upgrade_tls(upgrade).await?;
        session.hello_received = false;
        session.reset_transaction();
        // no reply here - the next thing on the wire is the client's
        // fresh EHLO over the encrypted stream
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{replies, session_for, test_server, test_session, NullTls};
    use async_std::task::block_on;

    #[test]
    fn refused_without_tls_config() {
        block_on(async {
            let (mut session, out) = test_session("");
            session.line = vec!["STARTTLS".to_owned()];
            StartTls.process(&mut session).await.unwrap();
            assert_eq!(replies(&out), "454 TLS unavailable on the server\r\n");
        })
    }

    #[test]
    fn refused_when_already_active() {
        block_on(async {
            let server = test_server().with_tls(NullTls);
            let (mut session, out) = session_for(server, "");
            session.tls_active = true;
            session.line = vec!["STARTTLS".to_owned()];
            StartTls.process(&mut session).await.unwrap();
            assert_eq!(replies(&out), "454 TLS session already active\r\n");
        })
    }

    #[test]
    fn upgrade_clears_hello_and_transaction() {
        block_on(async {
            let server = test_server().with_tls(NullTls);
            let (mut session, out) = session_for(server, "");
            session.hello_received = true;
            session.hello_host = "client.test".to_owned();
            session.auth_user = "user".to_owned();
            session.mail_from_received = true;
            session.from = "a@x.test".to_owned();
            session.line = vec!["STARTTLS".to_owned()];
            StartTls.process(&mut session).await.unwrap();
            assert_eq!(replies(&out), "220 Ready to start TLS\r\n");
            assert!(session.tls_active);
            assert!(!session.hello_received);
            assert!(!session.mail_from_received);
            assert!(session.from.is_empty());
            // the authenticated user survives, RFC 4954 has no
            // de-authentication on STARTTLS
            assert_eq!(session.auth_user, "user");
        })
    }
}
