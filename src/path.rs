use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;

use crate::error::{ServerError, ServerResult};
use crate::metadata::SIDECAR_PREFIX;

pub const STORAGE_PREFIX: &str = "/storage/";
const PUBLIC_SEGMENT: &str = "public";

/// A storage URL split once into the account it belongs to and the
/// resource segments below that account's storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePath {
    user: String,
    segments: Vec<String>,
    collection: bool,
}

impl StoragePath {
    /// Parses the path component of `/storage/<user>/<rest>`.
    pub fn parse(url_path: &str) -> ServerResult<Self> {
        let rest = url_path
            .strip_prefix(STORAGE_PREFIX)
            .ok_or_else(|| {
                ServerError::MalformedRequest(format!("not a storage path: {}", url_path))
            })?;

        let (user, remainder) = rest.split_once('/').ok_or_else(|| {
            ServerError::MalformedRequest(format!("missing path below user: {}", url_path))
        })?;

        let user = validate_username(&decode_segment(user)?)?.to_string();

        let collection = remainder.is_empty() || remainder.ends_with('/');
        let trimmed = remainder.strip_suffix('/').unwrap_or(remainder);

        let segments = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed
                .split('/')
                .map(|segment| {
                    let segment = decode_segment(segment)?;
                    validate_segment(&segment)?;
                    Ok(segment)
                })
                .collect::<ServerResult<Vec<_>>>()?
        };

        Ok(Self {
            user,
            segments,
            collection,
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_collection(&self) -> bool {
        self.collection
    }

    pub fn is_public(&self) -> bool {
        self.segments.first().map(String::as_str) == Some(PUBLIC_SEGMENT)
    }

    /// `/a/b` for a leaf, `/a/b/` for a collection, `/` for the root.
    pub fn rooted(&self) -> String {
        let mut rooted = format!("/{}", self.segments.join("/"));
        if self.collection && !self.segments.is_empty() {
            rooted.push('/');
        }
        rooted
    }

    /// Location of this resource below a user's storage root.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        self.segments
            .iter()
            .fold(root.to_path_buf(), |path, segment| path.join(segment))
    }
}

fn decode_segment(raw: &str) -> ServerResult<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| ServerError::MalformedRequest(format!("segment is not utf-8: {}", raw)))
}

fn validate_segment(segment: &str) -> ServerResult<()> {
    if segment.is_empty() || segment == "." || segment == ".." {
        return Err(ServerError::MalformedRequest(format!(
            "invalid path segment: {:?}",
            segment
        )));
    }

    if segment.contains(['/', '\\', '\0']) {
        return Err(ServerError::MalformedRequest(format!(
            "separator in path segment: {:?}",
            segment
        )));
    }

    if segment.starts_with(SIDECAR_PREFIX) {
        return Err(ServerError::MalformedRequest(format!(
            "reserved path segment: {:?}",
            segment
        )));
    }

    Ok(())
}

/// Account names double as directory names below the storage root.
pub fn validate_username(username: &str) -> ServerResult<&str> {
    validate_segment(username)?;

    if username.starts_with('.') {
        return Err(ServerError::MalformedRequest(format!(
            "invalid user name: {:?}",
            username
        )));
    }

    Ok(username)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_leaf() {
        let path = StoragePath::parse("/storage/alice/documents/notes%20v2.txt").unwrap();

        assert_eq!(path.user(), "alice");
        assert_eq!(path.segments(), ["documents", "notes v2.txt"]);
        assert!(!path.is_collection());
        assert!(!path.is_public());
        assert_eq!(path.rooted(), "/documents/notes v2.txt");
    }

    #[test]
    fn test_parse_collections() {
        let root = StoragePath::parse("/storage/alice/").unwrap();
        assert!(root.is_collection());
        assert!(root.segments().is_empty());
        assert_eq!(root.rooted(), "/");

        let public = StoragePath::parse("/storage/alice/public/photos/").unwrap();
        assert!(public.is_collection());
        assert!(public.is_public());
        assert_eq!(public.rooted(), "/public/photos/");
    }

    #[test]
    fn test_resolve_below_root() {
        let path = StoragePath::parse("/storage/alice/a/b/c.txt").unwrap();
        assert_eq!(
            path.resolve(Path::new("/data")),
            PathBuf::from("/data/a/b/c.txt")
        );
    }

    #[test]
    fn test_rejects_malformed_paths() {
        for bad in [
            "/storage/alice",
            "/storage//x",
            "/storage/alice/a//b",
            "/storage/alice/../bob/x",
            "/storage/alice/a/%2E%2E/x",
            "/storage/alice/a%2Fb",
            "/storage/.alice/x",
            "/other/alice/x",
        ] {
            let result = StoragePath::parse(bad);
            assert!(
                matches!(result, Err(ServerError::MalformedRequest(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_rejects_sidecar_names() {
        let url = format!("/storage/alice/docs/{}notes.txt", SIDECAR_PREFIX);
        assert!(matches!(
            StoragePath::parse(&url),
            Err(ServerError::MalformedRequest(_))
        ));
    }
}
