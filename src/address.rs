//! Address utilities shared by the muxer and the MAIL/RCPT processors.

use regex::Regex;
use std::fmt;

/// Error of [`split_address`] - the input carried no `@` at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressError {
    address: String,
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid Address: {}", self.address)
    }
}

impl std::error::Error for AddressError {}

/// Splits `local@domain` at the last `@`.
///
/// No further validation happens here; an empty local or domain part is
/// the caller's business.
pub fn split_address(address: &str) -> Result<(&str, &str), AddressError> {
    match address.rfind('@') {
        None => Err(AddressError {
            address: address.to_owned(),
        }),
        Some(at) => Ok((&address[..at], &address[at + 1..])),
    }
}

/// Canonicalizes the local part of an address the way gmail would:
/// lowercased, dots dropped, anything after the last `+` cut off.
/// A leading `+` is kept. The domain is never touched by this function.
pub fn canonicalize_local(local: &str) -> String {
    let mut local = local.trim().to_lowercase().replace('.', "");
    if let Some(plus) = local.rfind('+') {
        if plus > 0 {
            local.truncate(plus);
        }
    }
    local
}

/// A reverse-path or forward-path argument taken out of its angle
/// brackets. `MAIL FROM:<>` yields all fields empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EnvelopePath {
    pub address: String,
    pub local: String,
    pub domain: String,
}

/// Matcher for the strict `<local@domain>` envelope address syntax.
/// The empty path `<>` is accepted and left for the caller to judge.
pub(crate) struct PathParser {
    re: Regex,
}

impl PathParser {
    pub fn new() -> Self {
        PathParser {
            re: Regex::new(r"^<((\S+)@(\S+))?>$").unwrap(),
        }
    }

    pub fn parse(&self, raw: &str) -> Option<EnvelopePath> {
        let caps = self.re.captures(raw)?;
        Some(EnvelopePath {
            address: caps.get(1).map(|m| m.as_str()).unwrap_or("").to_owned(),
            local: caps.get(2).map(|m| m.as_str()).unwrap_or("").to_owned(),
            domain: caps.get(3).map(|m| m.as_str()).unwrap_or("").to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_takes_last_at() {
        assert_eq!(split_address("a@b.c").unwrap(), ("a", "b.c"));
        assert_eq!(split_address("a@b@c.d").unwrap(), ("a@b", "c.d"));
        assert_eq!(split_address("@d").unwrap(), ("", "d"));
    }

    #[test]
    fn split_rejects_plain_word() {
        let err = split_address("nodomain").unwrap_err();
        assert_eq!(err.to_string(), "Invalid Address: nodomain");
    }

    #[test]
    fn split_reassembles() {
        for (l, d) in &[("sean", "x.io"), ("a.b+tag", "example.org")] {
            let joined = format!("{}@{}", l, d);
            assert_eq!(split_address(&joined).unwrap(), (*l, *d));
        }
    }

    #[test]
    fn canonical_drops_dots_and_tags() {
        assert_eq!(canonicalize_local("A.B+tag"), "ab");
        assert_eq!(canonicalize_local("sean.murphy+lists"), "seanmurphy");
        assert_eq!(canonicalize_local(" Postmaster "), "postmaster");
    }

    #[test]
    fn canonical_keeps_leading_plus() {
        assert_eq!(canonicalize_local("+special"), "+special");
    }

    #[test]
    fn canonical_cuts_at_last_plus() {
        assert_eq!(canonicalize_local("a+b+c"), "a+b");
    }

    #[test]
    fn canonical_is_idempotent() {
        for s in &["A.B+tag", "+lead", "plain", "a+b+c", "X..y"] {
            let once = canonicalize_local(s);
            assert_eq!(canonicalize_local(&once), once);
        }
    }

    #[test]
    fn path_parses_address() {
        let p = PathParser::new();
        let path = p.parse("<a@x.test>").unwrap();
        assert_eq!(path.address, "a@x.test");
        assert_eq!(path.local, "a");
        assert_eq!(path.domain, "x.test");
    }

    #[test]
    fn path_accepts_null() {
        let p = PathParser::new();
        let path = p.parse("<>").unwrap();
        assert_eq!(path.address, "");
    }

    #[test]
    fn path_requires_brackets() {
        let p = PathParser::new();
        assert!(p.parse("a@x.test").is_none());
        assert!(p.parse("<a@x.test").is_none());
        assert!(p.parse("a@x.test>").is_none());
    }

    #[test]
    fn path_rejects_spaces() {
        let p = PathParser::new();
        assert!(p.parse("<a b@x.test>").is_none());
        assert!(p.parse("<a@x test>").is_none());
    }
}
