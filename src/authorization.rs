use rs_http_parser::http::Method;

use crate::error::{ServerError, ServerResult};
use crate::path::StoragePath;
use crate::scope::{Authorization, Scope};
use crate::tokens::TokenStore;

const BEARER_PREFIX: &str = "Bearer ";

/// Outcome of a successful authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    /// Read of a public leaf resource; no token involved.
    Public,
    Token(Authorization),
}

impl Grant {
    pub fn authorization(&self) -> Option<&Authorization> {
        match self {
            Grant::Public => None,
            Grant::Token(authorization) => Some(authorization),
        }
    }
}

/// Extracts the token from an `Authorization` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let header = header?;
    let token = header.strip_prefix(BEARER_PREFIX).unwrap_or(header).trim();
    (!token.is_empty()).then_some(token)
}

pub fn is_read(method: &Method) -> bool {
    matches!(method, Method::GET | Method::HEAD)
}

pub fn scope_permits(scopes: &[Scope], path: &StoragePath, method: &Method) -> bool {
    let rooted = path.rooted();
    scopes
        .iter()
        .any(|scope| scope.covers(&rooted) && (is_read(method) || scope.write))
}

pub struct ScopeAuthorizer<'a> {
    tokens: &'a dyn TokenStore,
}

impl<'a> ScopeAuthorizer<'a> {
    pub fn new(tokens: &'a dyn TokenStore) -> Self {
        Self { tokens }
    }

    /// Decides whether `token` may perform `method` on `path`.
    ///
    /// Public leaves are world-readable; listings of public collections
    /// still require a token.
    pub async fn authorize(
        &self,
        token: Option<&str>,
        path: &StoragePath,
        method: &Method,
    ) -> ServerResult<Grant> {
        if path.is_public() && !path.is_collection() && is_read(method) {
            return Ok(Grant::Public);
        }

        let token = token.ok_or_else(|| ServerError::Unauthorized("no bearer token".into()))?;

        let authorization = self
            .tokens
            .lookup(token)
            .await
            .ok_or_else(|| ServerError::Unauthorized("unknown bearer token".into()))?;

        if authorization.username != path.user() {
            return Err(ServerError::Unauthorized(format!(
                "token of {} used for storage of {}",
                authorization.username,
                path.user()
            )));
        }

        if !scope_permits(&authorization.scopes, path, method) {
            return Err(ServerError::Unauthorized(format!(
                "no scope grants {} {}",
                method,
                path.rooted()
            )));
        }

        Ok(Grant::Token(authorization))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::parse_scopes;
    use crate::tokens::InMemoryTokenStore;

    async fn store_with(username: &str, scopes: &str, token: &str) -> InMemoryTokenStore {
        let store = InMemoryTokenStore::new();
        store
            .insert(Authorization {
                username: username.into(),
                client_id: "client.example".into(),
                scopes: parse_scopes(scopes),
                bearer_token: token.into(),
            })
            .await;
        store
    }

    fn path(url: &str) -> StoragePath {
        StoragePath::parse(url).unwrap()
    }

    #[test]
    fn test_bearer_token_header() {
        assert_eq!(bearer_token(Some("Bearer abc123")), Some("abc123"));
        assert_eq!(bearer_token(Some("abc123")), Some("abc123"));
        assert_eq!(bearer_token(Some("Bearer ")), None);
        assert_eq!(bearer_token(None), None);
    }

    #[tokio::test]
    async fn test_scope_grants_within_category() {
        let store = store_with("alice", "documents:rw photos:r", "tok").await;
        let authorizer = ScopeAuthorizer::new(&store);

        for (url, method) in [
            ("/storage/alice/documents/notes.txt", Method::PUT),
            ("/storage/alice/documents/notes.txt", Method::DELETE),
            ("/storage/alice/documents/", Method::GET),
            ("/storage/alice/public/documents/flyer.pdf", Method::PUT),
            ("/storage/alice/photos/x.jpg", Method::GET),
            ("/storage/alice/public/photos/", Method::GET),
        ] {
            let grant = authorizer.authorize(Some("tok"), &path(url), &method).await;
            assert!(
                matches!(grant, Ok(Grant::Token(_))),
                "{} {} should be granted",
                method,
                url
            );
        }
    }

    #[tokio::test]
    async fn test_denials() {
        let store = store_with("alice", "documents:rw photos:r", "tok").await;
        let authorizer = ScopeAuthorizer::new(&store);

        for (token, url, method) in [
            (None, "/storage/alice/documents/notes.txt", Method::GET),
            (Some("nope"), "/storage/alice/documents/notes.txt", Method::GET),
            (Some("tok"), "/storage/bob/documents/notes.txt", Method::GET),
            (Some("tok"), "/storage/alice/photos/x.jpg", Method::PUT),
            (Some("tok"), "/storage/alice/music/song.ogg", Method::GET),
            (Some("tok"), "/storage/alice/", Method::GET),
            (Some("tok"), "/storage/alice/documents", Method::GET),
        ] {
            let grant = authorizer.authorize(token, &path(url), &method).await;
            assert!(
                matches!(grant, Err(ServerError::Unauthorized(_))),
                "{:?} {} {} should be denied",
                token,
                method,
                url
            );
        }
    }

    #[tokio::test]
    async fn test_public_reads_need_no_token() {
        let store = InMemoryTokenStore::new();
        let authorizer = ScopeAuthorizer::new(&store);

        let leaf = path("/storage/alice/public/pic.png");
        assert_eq!(
            authorizer.authorize(None, &leaf, &Method::GET).await.unwrap(),
            Grant::Public
        );

        // Content is public, structure is not
        let listing = path("/storage/alice/public/");
        assert!(authorizer.authorize(None, &listing, &Method::GET).await.is_err());

        assert!(authorizer.authorize(None, &leaf, &Method::PUT).await.is_err());
    }

    #[tokio::test]
    async fn test_root_scope_covers_everything() {
        let store = store_with("alice", "root:r", "tok").await;
        let authorizer = ScopeAuthorizer::new(&store);

        assert!(authorizer
            .authorize(Some("tok"), &path("/storage/alice/"), &Method::GET)
            .await
            .is_ok());
        assert!(authorizer
            .authorize(Some("tok"), &path("/storage/alice/music/a.ogg"), &Method::PUT)
            .await
            .is_err());
    }
}
