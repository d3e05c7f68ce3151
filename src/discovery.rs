use serde::Serialize;

use crate::error::{ServerError, ServerResult};

pub const HOST_META_PATH: &str = "/.well-known/host-meta.json";

const ACCOUNT_SCHEME: &str = "acct:";
const STORAGE_REL: &str = "remoteStorage";
const STORAGE_TYPE: &str = "https://www.w3.org/community/rww/wiki/read-write-web-00#simple";
const AUTH_METHOD: &str = "https://tools.ietf.org/html/draft-ietf-oauth-v2-26#section-4.2";

#[derive(Debug, Serialize)]
pub struct HostMeta {
    pub links: Vec<Link>,
}

#[derive(Debug, Serialize)]
pub struct Link {
    pub href: String,
    pub rel: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: LinkProperties,
}

#[derive(Debug, Serialize)]
pub struct LinkProperties {
    #[serde(rename = "auth-method")]
    pub auth_method: String,
    #[serde(rename = "auth-endpoint")]
    pub auth_endpoint: String,
}

/// Extracts the user from `acct:<user>@<host>`. The user part runs up to
/// the last `@`.
pub fn account_user(resource: &str) -> ServerResult<&str> {
    resource
        .strip_prefix(ACCOUNT_SCHEME)
        .and_then(|account| account.rsplit_once('@'))
        .filter(|(user, host)| !user.is_empty() && !host.is_empty())
        .map(|(user, _)| user)
        .ok_or_else(|| ServerError::MalformedRequest(format!("not an account: {:?}", resource)))
}

/// Storage and authorization endpoints of the account named by `resource`.
pub fn discover(base_url: &str, resource: &str) -> ServerResult<HostMeta> {
    let user = account_user(resource)?;

    Ok(HostMeta {
        links: vec![Link {
            href: format!("{}/storage/{}", base_url, user),
            rel: STORAGE_REL.into(),
            kind: STORAGE_TYPE.into(),
            properties: LinkProperties {
                auth_method: AUTH_METHOD.into(),
                auth_endpoint: format!("{}/auth/{}", base_url, user),
            },
        }],
    })
}
