use crate::command::Processor;
use crate::common::*;
use crate::session::Session;
use async_trait::async_trait;

/// QUIT. The dispatcher exits right after this reply is on the wire.
pub struct Quit;

#[async_trait]
impl Processor for Quit {
    async fn process(&self, session: &mut Session) -> Result<()> {
        session.quit_sent = true;
        session.say(221, "OK").await
    }
}
