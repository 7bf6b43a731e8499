use crate::codec::BodyReadError;
use crate::command::Processor;
use crate::common::*;
use crate::message::Message;
use crate::session::Session;
use async_trait::async_trait;

/// DATA. Collects the dot-stuffed body, parses the headers and hands
/// the envelope to the configured handler. Whatever the outcome, the
/// transaction is reset and the session keeps going - only broken IO
/// ends it.
pub struct Data;

#[async_trait]
impl Processor for Data {
    async fn process(&self, session: &mut Session) -> Result<()> {
        if !session.mail_from_received || session.to.is_empty() {
            return session.say(503, "Bad sequence of commands").await;
        }
        session.say(354, "End data with <CR><LF>.<CR><LF>").await?;

        let max = session.server().max_body_size();
        let raw = match session.read_data_body().await {
            Ok(raw) => raw,
            Err(BodyReadError::Io(e)) => return Err(e.into()),
            Err(BodyReadError::TooLarge(_)) => {
                debug!("[{}] DATA over the {} byte cap", session.remote_addr, max);
                session.reset_transaction();
                return session.say(503, oversize_text(max)).await;
            }
        };
        let message = match Message::parse(raw) {
            Ok(message) => Arc::new(message),
            Err(e) => {
                debug!("[{}] DATA did not parse: {}", session.remote_addr, e);
                session.reset_transaction();
                return session.say(503, oversize_text(max)).await;
            }
        };
        session.message = Some(message.clone());

        let envelope = session.envelope(message);
        let handler = session.server().handler();
        match handler.serve_mail(&envelope).await {
            Err(e) => {
                info!("[{}] handler refused mail: {}", session.remote_addr, e);
                session.reset_transaction();
                session.say(450, e.to_string()).await
            }
            Ok(()) => {
                session.reset_transaction();
                session.say(250, "OK").await
            }
        }
    }
}

fn oversize_text(max: usize) -> String {
    format!(
        "error parsing the DATA, it may have exceeded the max size of {} bytes",
        max
    )
}
