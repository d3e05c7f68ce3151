use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rs_http_parser::request::Request;

const ANY: &str = "*";

/// Version marker of a resource: its modification time in whole seconds,
/// rendered as a quoted decimal (`"1700000000"`).
///
/// Two writes within the same second produce the same tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTag(String);

impl EntityTag {
    pub fn from_modified(modified: SystemTime) -> Self {
        let seconds = modified
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        Self(format!("\"{}\"", seconds))
    }

    pub fn from_metadata(metadata: &std::fs::Metadata) -> std::io::Result<Self> {
        Ok(Self::from_modified(metadata.modified()?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a comma separated `If-Match`/`If-None-Match` value names this
    /// tag or `*`.
    fn listed_in(&self, header: &str) -> bool {
        header
            .split(',')
            .map(str::trim)
            .any(|candidate| candidate == ANY || candidate == self.0)
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Read,
    Write,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conditional {
    Proceed,
    NotModified,
    PreconditionFailed,
}

/// The conditional headers of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preconditions {
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
}

impl Preconditions {
    pub fn from_request(request: &Request) -> Self {
        Self {
            if_match: request.header("if-match").map(str::to_string),
            if_none_match: request.header("if-none-match").map(str::to_string),
        }
    }

    /// `current` is the tag of the resource as it is now, `None` if absent.
    pub fn evaluate(&self, kind: RequestKind, current: Option<&EntityTag>) -> Conditional {
        match kind {
            RequestKind::Read => match (&self.if_none_match, current) {
                (Some(header), Some(tag)) if tag.listed_in(header) => Conditional::NotModified,
                _ => Conditional::Proceed,
            },
            RequestKind::Write | RequestKind::Delete => {
                if let Some(header) = &self.if_match {
                    match current {
                        Some(tag) if tag.listed_in(header) => {}
                        _ => return Conditional::PreconditionFailed,
                    }
                }

                if kind == RequestKind::Write {
                    if let (Some(header), Some(tag)) = (&self.if_none_match, current) {
                        if tag.listed_in(header) {
                            return Conditional::PreconditionFailed;
                        }
                    }
                }

                Conditional::Proceed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn at(seconds: u64) -> EntityTag {
        EntityTag::from_modified(UNIX_EPOCH + Duration::from_secs(seconds))
    }

    fn if_match(value: &str) -> Preconditions {
        Preconditions {
            if_match: Some(value.into()),
            ..Default::default()
        }
    }

    fn if_none_match(value: &str) -> Preconditions {
        Preconditions {
            if_none_match: Some(value.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_tag_format() {
        assert_eq!(at(1_700_000_000).as_str(), "\"1700000000\"");
        assert_eq!(at(0).to_string(), "\"0\"");
    }

    #[test]
    fn test_sub_second_writes_share_a_tag() {
        let base = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let first = EntityTag::from_modified(base + Duration::from_millis(100));
        let second = EntityTag::from_modified(base + Duration::from_millis(900));

        assert_eq!(first, second);
        assert_ne!(first, EntityTag::from_modified(base + Duration::from_secs(1)));
    }

    #[test]
    fn test_no_headers_always_proceed() {
        let none = Preconditions::default();
        for kind in [RequestKind::Read, RequestKind::Write, RequestKind::Delete] {
            assert_eq!(none.evaluate(kind, Some(&at(5))), Conditional::Proceed);
            assert_eq!(none.evaluate(kind, None), Conditional::Proceed);
        }
    }

    #[test]
    fn test_read_not_modified() {
        let current = at(10);

        assert_eq!(
            if_none_match("\"10\"").evaluate(RequestKind::Read, Some(&current)),
            Conditional::NotModified
        );
        assert_eq!(
            if_none_match("\"9\", \"10\"").evaluate(RequestKind::Read, Some(&current)),
            Conditional::NotModified
        );
        assert_eq!(
            if_none_match("\"9\"").evaluate(RequestKind::Read, Some(&current)),
            Conditional::Proceed
        );
        assert_eq!(
            if_none_match("*").evaluate(RequestKind::Read, None),
            Conditional::Proceed
        );
    }

    #[test]
    fn test_if_match_on_write_and_delete() {
        let current = at(10);

        for kind in [RequestKind::Write, RequestKind::Delete] {
            assert_eq!(
                if_match("\"10\"").evaluate(kind, Some(&current)),
                Conditional::Proceed
            );
            assert_eq!(
                if_match("\"9\"").evaluate(kind, Some(&current)),
                Conditional::PreconditionFailed
            );
            assert_eq!(
                if_match("\"10\"").evaluate(kind, None),
                Conditional::PreconditionFailed
            );
            assert_eq!(if_match("*").evaluate(kind, None), Conditional::PreconditionFailed);
        }
    }

    #[test]
    fn test_create_only_write() {
        assert_eq!(
            if_none_match("*").evaluate(RequestKind::Write, Some(&at(10))),
            Conditional::PreconditionFailed
        );
        assert_eq!(
            if_none_match("*").evaluate(RequestKind::Write, None),
            Conditional::Proceed
        );
        assert_eq!(
            if_none_match("\"10\"").evaluate(RequestKind::Write, Some(&at(10))),
            Conditional::PreconditionFailed
        );
        // If-None-Match has no bearing on deletes
        assert_eq!(
            if_none_match("*").evaluate(RequestKind::Delete, Some(&at(10))),
            Conditional::Proceed
        );
    }
}
