use std::path::Path;

use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};
use tokio::fs;

use crate::error::{ServerError, ServerResult};
use crate::scope::{Authorization, Scope};
use crate::tokens::TokenStore;

pub const TOKEN_LENGTH: usize = 20;
const SALT_SEPARATOR: char = '$';

/// Random opaque bearer token. Uniqueness is not checked against the
/// registry.
pub fn random_token() -> String {
    rand::thread_rng()
        .sample_iter(Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Lowercase hex SHA-256 of `salt || password`.
pub fn digest_password(salt: Option<&str>, password: &str) -> String {
    let mut hasher = Sha256::new();
    if let Some(salt) = salt {
        hasher.update(salt.as_bytes());
    }
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Checks `password` against a stored `<hex>` or `<salt>$<hex>` digest.
pub fn password_matches(stored: &str, password: &str) -> bool {
    let stored = stored.trim();
    let (salt, expected) = match stored.rsplit_once(SALT_SEPARATOR) {
        Some((salt, expected)) => (Some(salt), expected),
        None => (None, stored),
    };

    !expected.is_empty() && digest_password(salt, password) == expected
}

pub struct TokenIssuer<'a> {
    tokens: &'a dyn TokenStore,
}

impl<'a> TokenIssuer<'a> {
    pub fn new(tokens: &'a dyn TokenStore) -> Self {
        Self { tokens }
    }

    /// Verifies `password` against the digest in `password_file` and, on
    /// success, registers a new token carrying `scopes` as requested.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        password_file: &Path,
        client_id: &str,
        scopes: Vec<Scope>,
    ) -> ServerResult<String> {
        let stored = match fs::read_to_string(password_file).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::debug!("No usable password for {}: {}", username, e);
                return Err(ServerError::InvalidCredentials);
            }
        };

        if !password_matches(&stored, password) {
            tracing::debug!("Wrong password for {}", username);
            return Err(ServerError::InvalidCredentials);
        }

        let authorization = Authorization {
            username: username.to_string(),
            client_id: client_id.to_string(),
            scopes,
            bearer_token: random_token(),
        };
        let bearer_token = authorization.bearer_token.clone();

        tracing::info!(
            "Issued token for {} to client {} ({} scopes)",
            username,
            client_id,
            authorization.scopes.len()
        );
        self.tokens.insert(authorization).await;

        Ok(bearer_token)
    }
}
