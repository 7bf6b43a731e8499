//! The parsed message handed to handlers: RFC 5322 headers plus the
//! body kept as an opaque blob.

use mailparse::MailParseError;

/// An accepted DATA payload.
///
/// Headers are parsed eagerly with `mailparse`; the body is whatever
/// follows the header block, untouched. The raw bytes stay available
/// for handlers that want to re-parse MIME themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    raw: Vec<u8>,
    headers: Vec<(String, String)>,
    body_start: usize,
}

impl Message {
    pub fn parse(raw: Vec<u8>) -> Result<Self, MailParseError> {
        let (headers, body_start) = {
            let (parsed, offset) = mailparse::parse_headers(&raw)?;
            let headers = parsed
                .iter()
                .map(|h| (h.get_key(), h.get_value()))
                .collect();
            (headers, offset)
        };
        Ok(Message {
            raw,
            headers,
            body_start,
        })
    }

    /// First header with the given name, compared ASCII
    /// case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Everything after the header block.
    pub fn body(&self) -> &[u8] {
        &self.raw[self.body_start..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }
}
