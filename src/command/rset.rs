use crate::command::Processor;
use crate::common::*;
use crate::session::Session;
use async_trait::async_trait;

/// RSET. Drops the transaction; who the client is - hello name,
/// authenticated user, TLS - stays.
pub struct Rset;

#[async_trait]
impl Processor for Rset {
    async fn process(&self, session: &mut Session) -> Result<()> {
        session.reset_transaction();
        session.say(250, "Ok").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{replies, test_session};
    use async_std::task::block_on;

    #[test]
    fn drops_the_transaction_only() {
        block_on(async {
            let (mut session, out) = test_session("");
            session.auth_user = "user".to_owned();
            session.tls_active = true;
            session.hello_received = true;
            session.mail_from_received = true;
            session.from = "a@x.test".to_owned();
            session.to.push("b@y.test".to_owned());
            session.line = vec!["RSET".to_owned()];
            Rset.process(&mut session).await.unwrap();
            assert_eq!(replies(&out), "250 Ok\r\n");
            assert!(!session.mail_from_received);
            assert!(session.from.is_empty());
            assert!(session.to.is_empty());
            assert_eq!(session.auth_user, "user");
            assert!(session.tls_active);
            assert!(session.hello_received);
        })
    }
}
