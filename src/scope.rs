use std::fmt;

/// Scope paths starting with this grant access to the whole account.
///
/// Matched as a prefix, so any scope path beginning with these letters is
/// treated as a blanket grant.
pub const ROOT_SCOPE: &str = "root";
const WRITE_MODE: &str = "rw";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub path: String,
    pub write: bool,
}

impl Scope {
    pub fn new(path: impl Into<String>, write: bool) -> Self {
        Self {
            path: path.into(),
            write,
        }
    }

    /// Parses one `path:mode` entry. `rw` grants write access, any other
    /// mode (or none at all) is read-only.
    pub fn parse(entry: &str) -> Self {
        match entry.split_once(':') {
            Some((path, mode)) => Self::new(path, mode == WRITE_MODE),
            None => Self::new(entry, false),
        }
    }

    pub fn is_root(&self) -> bool {
        self.path.starts_with(ROOT_SCOPE)
    }

    /// Whether `rooted_path` (as rendered by `StoragePath::rooted`) lies in
    /// this scope's category, in either its private or public area.
    pub fn covers(&self, rooted_path: &str) -> bool {
        if self.is_root() {
            return true;
        }

        let private = format!("/{}/", self.path);
        let public = format!("/public/{}/", self.path);
        rooted_path.starts_with(&private) || rooted_path.starts_with(&public)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.write {
            write!(f, "{} (Full Access)", self.path)
        } else {
            f.write_str(&self.path)
        }
    }
}

/// Parses a space separated scope list, keeping the requested order.
pub fn parse_scopes(scopes: &str) -> Vec<Scope> {
    scopes.split_whitespace().map(Scope::parse).collect()
}

/// A successful login: who may use `bearer_token`, on behalf of which
/// client, and for what.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub username: String,
    pub client_id: String,
    pub scopes: Vec<Scope>,
    pub bearer_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes() {
        assert_eq!(
            parse_scopes("name1:rw name2:r"),
            vec![Scope::new("name1", true), Scope::new("name2", false)]
        );
    }

    #[test]
    fn test_scope_edge_entries() {
        assert_eq!(
            parse_scopes("  contacts   music:RW root:rw bare "),
            vec![
                Scope::new("contacts", false),
                Scope::new("music", false),
                Scope::new("root", true),
                Scope::new("bare", false),
            ]
        );
        assert!(parse_scopes("").is_empty());
    }

    #[test]
    fn test_covers() {
        let documents = Scope::new("documents", false);

        assert!(documents.covers("/documents/notes.txt"));
        assert!(documents.covers("/documents/a/b/"));
        assert!(documents.covers("/public/documents/flyer.pdf"));
        assert!(!documents.covers("/documents"));
        assert!(!documents.covers("/documentsx/notes.txt"));
        assert!(!documents.covers("/photos/x.jpg"));
        assert!(!documents.covers("/"));
    }

    #[test]
    fn test_root_scope_is_a_prefix_match() {
        assert!(Scope::new("root", false).covers("/"));
        assert!(Scope::new("root", false).covers("/anything/at/all"));
        // Prefix matching also accepts scope names that merely start with "root"
        assert!(Scope::new("rootkit", false).covers("/photos/x.jpg"));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Scope::new("myfavoritedrinks", true).to_string(),
            "myfavoritedrinks (Full Access)"
        );
        assert_eq!(Scope::new("myfavoritedrinks", false).to_string(), "myfavoritedrinks");
    }
}
