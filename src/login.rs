use askama::Template;
use percent_encoding::percent_decode_str;
use rs_http_parser::http::{Method, MimeType};
use rs_http_parser::request::Request;
use rs_http_parser::response::Response;

use crate::authentication::TokenIssuer;
use crate::error::{ServerError, ServerResult};
use crate::path::validate_username;
use crate::scope::{parse_scopes, Scope};
use crate::state::AppState;

pub const AUTH_PREFIX: &str = "/auth/";

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate<'a> {
    pub username: &'a str,
    pub client_id: &'a str,
    pub scopes: &'a [Scope],
    pub wrong_password: bool,
}

/// The parameters an application passes when sending a user to log in.
#[derive(Debug)]
pub struct LoginRequest {
    pub username: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<Scope>,
}

impl LoginRequest {
    pub fn from_request(request: &Request) -> ServerResult<Self> {
        let raw_user = request
            .path
            .strip_prefix(AUTH_PREFIX)
            .map(|user| user.trim_end_matches('/'))
            .ok_or_else(|| ServerError::MalformedRequest("not an auth path".into()))?;
        let username = percent_decode_str(raw_user)
            .decode_utf8()
            .map_err(|_| ServerError::MalformedRequest("user is not utf-8".into()))?;
        let username = validate_username(&username)?.to_string();

        let param = |name: &str| {
            request
                .query_param(name)
                .map(str::to_string)
                .ok_or_else(|| ServerError::MalformedRequest(format!("missing {}", name)))
        };

        let redirect_uri = param("redirect_uri")?;
        if redirect_uri.chars().any(char::is_control) {
            return Err(ServerError::MalformedRequest(
                "control characters in redirect_uri".into(),
            ));
        }

        Ok(Self {
            username,
            client_id: param("client_id")?,
            redirect_uri,
            scopes: parse_scopes(&param("scope")?),
        })
    }

    fn render(&self, wrong_password: bool) -> ServerResult<Vec<u8>> {
        LoginTemplate {
            username: &self.username,
            client_id: &self.client_id,
            scopes: &self.scopes,
            wrong_password,
        }
        .render()
        .map(String::into_bytes)
        .map_err(|e| ServerError::Unsupported(format!("login page: {}", e)))
    }
}

/// `GET` renders the login page, `POST` checks the password and redirects
/// back to the application with a fresh token in the fragment.
pub async fn handle_auth(
    state: &AppState,
    request: &Request,
    res: &mut Response,
) -> ServerResult<()> {
    let login = LoginRequest::from_request(request)?;

    let wrong_password = match request.method {
        Method::GET => false,
        Method::POST => {
            let form = request.form();
            let password = form.get("password").map(String::as_str).unwrap_or_default();
            let issuer = TokenIssuer::new(state.tokens.as_ref());

            match issuer
                .login(
                    &login.username,
                    password,
                    &state.config.password_file(&login.username),
                    &login.client_id,
                    login.scopes.clone(),
                )
                .await
            {
                Ok(token) => {
                    let location = format!("{}#access_token={}", login.redirect_uri, token);
                    res.redirect(&location, 301);
                    return Ok(());
                }
                Err(ServerError::InvalidCredentials) => true,
                Err(e) => return Err(e),
            }
        }
        ref other => {
            return Err(ServerError::Unsupported(format!("{} on auth endpoint", other)));
        }
    };

    res.set_status_code(200);
    res.set_body(login.render(wrong_password)?, MimeType::TextHtml);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: Method, uri: &str) -> Request {
        Request::new(method, uri.into(), "HTTP/1.1".into())
    }

    #[test]
    fn test_login_request_parameters() {
        let login = LoginRequest::from_request(&request(
            Method::GET,
            "/auth/marco?redirect_uri=https%3A%2F%2Fmyfavoritedrinks.5apps.com%2F&client_id=myfavoritedrinks.5apps.com&scope=myfavoritedrinks%3Arw&response_type=token",
        ))
        .unwrap();

        assert_eq!(login.username, "marco");
        assert_eq!(login.client_id, "myfavoritedrinks.5apps.com");
        assert_eq!(login.redirect_uri, "https://myfavoritedrinks.5apps.com/");
        assert_eq!(login.scopes, vec![Scope::new("myfavoritedrinks", true)]);
    }

    #[test]
    fn test_missing_or_unsafe_parameters() {
        for uri in [
            "/auth/marco?client_id=c&scope=s%3Arw",
            "/auth/marco?redirect_uri=r&scope=s%3Arw",
            "/auth/marco?redirect_uri=r&client_id=c",
            "/auth/..?redirect_uri=r&client_id=c&scope=s",
            "/auth/marco?redirect_uri=https%3A%2F%2Fa.example%2F%0D%0ASet-Cookie%3A%20evil%3D1&client_id=c&scope=s",
            "/auth/marco?redirect_uri=https%3A%2F%2Fa.example%2F%00&client_id=c&scope=s",
        ] {
            assert!(
                matches!(
                    LoginRequest::from_request(&request(Method::GET, uri)),
                    Err(ServerError::MalformedRequest(_))
                ),
                "{} should be rejected",
                uri
            );
        }
    }

    #[test]
    fn test_render_page() {
        let login = LoginRequest {
            username: "marco".into(),
            client_id: "myfavoritedrinks.5apps.com".into(),
            redirect_uri: "https://myfavoritedrinks.5apps.com/".into(),
            scopes: vec![Scope::new("myfavoritedrinks", true), Scope::new("<b>", false)],
        };

        let page = String::from_utf8(login.render(false).unwrap()).unwrap();
        assert!(page.contains("<h1>Allow Remote Storage Access?</h1>"));
        assert!(page.contains("marco"));
        assert!(page.contains("myfavoritedrinks (Full Access)"));
        assert!(page.contains("myfavoritedrinks.5apps.com"));
        assert!(page.contains("&lt;b&gt;"));
        assert!(!page.contains("Wrong password"));

        let retry = String::from_utf8(login.render(true).unwrap()).unwrap();
        assert!(retry.contains("Wrong password"));
    }
}
