//! SMTP reply rendering.

use std::fmt;

/// A reply to be written to the client, CRLF terminated.
///
/// A reply without items renders as a single `code text` line. Items
/// turn it into a multi-line reply: every line but the last uses the
/// `code-text` continuation form (RFC 5321 section 4.2.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: u16,
    text: String,
    items: Vec<String>,
}

impl Reply {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Reply {
            code,
            text: text.into(),
            items: vec![],
        }
    }

    /// Appends a continuation item. The last appended item becomes the
    /// closing line of the reply.
    pub fn item(mut self, line: impl Into<String>) -> Self {
        self.items.push(line.into());
        self
    }

    /// 4xx and 5xx replies; the session logs these louder.
    pub fn is_error(&self) -> bool {
        self.code >= 400
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.items.split_last() {
            None => write!(f, "{} {}\r\n", self.code, self.text),
            Some((last, rest)) => {
                write!(f, "{}-{}\r\n", self.code, self.text)?;
                for item in rest {
                    write!(f, "{}-{}\r\n", self.code, item)?;
                }
                write!(f, "{} {}\r\n", self.code, last)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line() {
        assert_eq!(Reply::new(250, "Ok").to_string(), "250 Ok\r\n");
    }

    #[test]
    fn empty_text_keeps_separator() {
        // the AUTH PLAIN challenge is "334 " with nothing after the space
        assert_eq!(Reply::new(334, "").to_string(), "334 \r\n");
    }

    #[test]
    fn multi_line_banner() {
        let reply = Reply::new(250, "Greets me")
            .item("PIPELINING")
            .item("SMTPUTF8")
            .item("8BITMIME");
        assert_eq!(
            reply.to_string(),
            "250-Greets me\r\n250-PIPELINING\r\n250-SMTPUTF8\r\n250 8BITMIME\r\n"
        );
    }

    #[test]
    fn error_classification() {
        assert!(Reply::new(503, "Bad sequence of commands").is_error());
        assert!(!Reply::new(250, "Ok").is_error());
        assert!(!Reply::new(354, "go ahead").is_error());
    }
}
