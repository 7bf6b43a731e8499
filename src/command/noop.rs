//! The `250 OK` stubs: NOOP does nothing by definition, VRFY, EXPN
//! and HELP do nothing yet - they keep their own processors so
//! embedders can shadow each one separately.

use crate::command::Processor;
use crate::common::*;
use crate::session::Session;
use async_trait::async_trait;

pub struct Noop;

#[async_trait]
impl Processor for Noop {
    async fn process(&self, session: &mut Session) -> Result<()> {
        session.say(250, "OK").await
    }
}

pub struct Vrfy;

#[async_trait]
impl Processor for Vrfy {
    async fn process(&self, session: &mut Session) -> Result<()> {
        session.say(250, "OK").await
    }
}

pub struct Expn;

#[async_trait]
impl Processor for Expn {
    async fn process(&self, session: &mut Session) -> Result<()> {
        session.say(250, "OK").await
    }
}

pub struct Help;

#[async_trait]
impl Processor for Help {
    async fn process(&self, session: &mut Session) -> Result<()> {
        session.say(250, "OK").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{replies, test_session};
    use async_std::task::block_on;

    #[test]
    fn all_stubs_say_ok() {
        block_on(async {
            let (mut session, out) = test_session("");
            session.line = vec!["NOOP".to_owned()];
            Noop.process(&mut session).await.unwrap();
            Vrfy.process(&mut session).await.unwrap();
            Expn.process(&mut session).await.unwrap();
            Help.process(&mut session).await.unwrap();
            assert_eq!(replies(&out), "250 OK\r\n".repeat(4));
        })
    }

    #[test]
    fn stubs_leave_the_transaction_alone() {
        block_on(async {
            let (mut session, _out) = test_session("");
            session.mail_from_received = true;
            session.from = "a@x.test".to_owned();
            session.line = vec!["NOOP".to_owned()];
            Noop.process(&mut session).await.unwrap();
            assert!(session.mail_from_received);
            assert_eq!(session.from, "a@x.test");
        })
    }
}
