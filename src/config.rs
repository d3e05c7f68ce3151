use std::net::SocketAddr;
use std::path::PathBuf;

use crate::ancestry::OwnershipPolicy;

/// Per-user directory below the storage root holding data and credentials.
const USER_DIR: &str = ".rstore";
const DATA_DIR: &str = "data";
const PASSWORD_FILE: &str = "password.sha256";

#[derive(Debug, Clone)]
pub struct Config {
    pub storage_root: PathBuf,
    pub listen_addr: SocketAddr,
    /// External URL clients reach this server under, without trailing `/`.
    pub base_url: Option<String>,
    pub ownership: OwnershipPolicy,
    pub assets_dir: PathBuf,
    /// Largest request body accepted, in bytes.
    pub max_body_bytes: usize,
}

impl Config {
    fn user_dir(&self, username: &str) -> PathBuf {
        self.storage_root.join(username).join(USER_DIR)
    }

    /// The root every storage path of `username` resolves below.
    pub fn user_data_root(&self, username: &str) -> PathBuf {
        self.user_dir(username).join(DATA_DIR)
    }

    pub fn password_file(&self, username: &str) -> PathBuf {
        self.user_dir(username).join(PASSWORD_FILE)
    }

    /// Configured base URL, or one derived from the host the request was
    /// addressed to.
    pub fn base_url(&self, request_host: Option<&str>) -> String {
        match (&self.base_url, request_host) {
            (Some(base_url), _) => base_url.trim_end_matches('/').to_string(),
            (None, Some(host)) => format!("http://{}", host),
            (None, None) => format!("http://{}", self.listen_addr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rs_http_parser::parser::DEFAULT_MAX_BODY_BYTES;

    fn config(base_url: Option<&str>) -> Config {
        Config {
            storage_root: PathBuf::from("/srv/storage"),
            listen_addr: "127.0.0.1:8888".parse().unwrap(),
            base_url: base_url.map(str::to_string),
            ownership: OwnershipPolicy::Disabled,
            assets_dir: PathBuf::from("css"),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    #[test]
    fn test_user_layout() {
        let config = config(None);
        assert_eq!(
            config.user_data_root("alice"),
            PathBuf::from("/srv/storage/alice/.rstore/data")
        );
        assert_eq!(
            config.password_file("alice"),
            PathBuf::from("/srv/storage/alice/.rstore/password.sha256")
        );
    }

    #[test]
    fn test_base_url() {
        assert_eq!(
            config(Some("https://store.example/")).base_url(Some("ignored:80")),
            "https://store.example"
        );
        assert_eq!(config(None).base_url(Some("localhost:8888")), "http://localhost:8888");
        assert_eq!(config(None).base_url(None), "http://127.0.0.1:8888");
    }
}
