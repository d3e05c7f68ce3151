use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use tokio::fs;

const PASSWD_FILE: &str = "/etc/passwd";

/// Proper ancestor collections of the resource at `segments` below `root`,
/// shallowest first. `root` itself is never included.
pub fn ancestors(root: &Path, segments: &[String]) -> Vec<PathBuf> {
    let parents = segments.len().saturating_sub(1);
    segments[..parents]
        .iter()
        .scan(root.to_path_buf(), |current, segment| {
            current.push(segment);
            Some(current.clone())
        })
        .collect()
}

async fn set_modified(path: PathBuf, time: SystemTime) -> io::Result<()> {
    tokio::task::spawn_blocking(move || std::fs::File::open(&path)?.set_modified(time))
        .await
        .map_err(io::Error::other)?
}

/// Stamps every ancestor collection with the current time, so that
/// collection tags change whenever a descendant does. Ancestors that have
/// disappeared in the meantime are skipped.
pub async fn touch_ancestors(root: &Path, segments: &[String]) -> io::Result<()> {
    let now = SystemTime::now();

    for dir in ancestors(root, segments) {
        match set_modified(dir.clone(), now).await {
            Ok(()) => tracing::debug!("Mark as modified {}", dir.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

/// Removes the now-empty collections left behind by a delete, deepest
/// first, stopping at the first one that still has entries. `root` is
/// never removed.
pub async fn prune_empty_ancestors(root: &Path, segments: &[String]) -> io::Result<()> {
    for dir in ancestors(root, segments).into_iter().rev() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };

        if entries.next_entry().await?.is_some() {
            break;
        }

        match fs::remove_dir(&dir).await {
            Ok(()) => tracing::debug!("Pruned empty collection {}", dir.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            // Something was written into it concurrently
            Err(_) => break,
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

/// Who stored files and their collections should belong to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OwnershipPolicy {
    #[default]
    Disabled,
    Fixed(Owner),
    /// The system account named like the authenticated storage user.
    AuthenticatedUser,
}

impl OwnershipPolicy {
    /// The owner to transfer files to, if any. Failures to look up the
    /// account are logged and yield `None`.
    pub async fn resolve(&self, username: Option<&str>) -> Option<Owner> {
        match self {
            OwnershipPolicy::Disabled => None,
            OwnershipPolicy::Fixed(owner) => Some(*owner),
            OwnershipPolicy::AuthenticatedUser => {
                let username = username?;
                match fs::read_to_string(PASSWD_FILE).await {
                    Ok(passwd) => {
                        let owner = lookup_account(&passwd, username);
                        if owner.is_none() {
                            tracing::warn!("No system account named {}", username);
                        }
                        owner
                    }
                    Err(e) => {
                        tracing::warn!("Failed to read {}: {}", PASSWD_FILE, e);
                        None
                    }
                }
            }
        }
    }
}

impl FromStr for OwnershipPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "disabled" | "none" => Ok(OwnershipPolicy::Disabled),
            "authenticated" => Ok(OwnershipPolicy::AuthenticatedUser),
            fixed => {
                let (uid, gid) = fixed.split_once(':').ok_or_else(|| {
                    format!(
                        "expected `disabled`, `authenticated` or `<uid>:<gid>`, got {:?}",
                        fixed
                    )
                })?;
                let uid = uid.parse().map_err(|_| format!("invalid uid {:?}", uid))?;
                let gid = gid.parse().map_err(|_| format!("invalid gid {:?}", gid))?;
                Ok(OwnershipPolicy::Fixed(Owner { uid, gid }))
            }
        }
    }
}

impl fmt::Display for OwnershipPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnershipPolicy::Disabled => f.write_str("disabled"),
            OwnershipPolicy::AuthenticatedUser => f.write_str("authenticated"),
            OwnershipPolicy::Fixed(owner) => write!(f, "{}:{}", owner.uid, owner.gid),
        }
    }
}

/// Finds `name:x:uid:gid:...` in passwd(5) formatted text.
pub fn lookup_account(passwd: &str, name: &str) -> Option<Owner> {
    passwd.lines().find_map(|line| {
        let mut fields = line.split(':');
        if fields.next()? != name {
            return None;
        }
        let _password = fields.next()?;
        let uid = fields.next()?.parse().ok()?;
        let gid = fields.next()?.parse().ok()?;
        Some(Owner { uid, gid })
    })
}

#[cfg(unix)]
async fn chown(path: PathBuf, owner: Owner) -> io::Result<()> {
    tokio::task::spawn_blocking(move || {
        std::os::unix::fs::chown(&path, Some(owner.uid), Some(owner.gid))
    })
    .await
    .map_err(io::Error::other)?
}

#[cfg(not(unix))]
async fn chown(_path: PathBuf, _owner: Owner) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "ownership transfer needs a unix host",
    ))
}

/// Hands `files` and every ancestor collection over to `owner`. Failures
/// are logged and otherwise ignored.
pub async fn chown_ancestors(root: &Path, segments: &[String], files: &[PathBuf], owner: Owner) {
    for path in files.iter().cloned().chain(ancestors(root, segments)) {
        if let Err(e) = chown(path.clone(), owner).await {
            tracing::warn!(
                "Failed to hand {} to {}:{}: {}",
                path.display(),
                owner.uid,
                owner.gid,
                e
            );
        }
    }
}
