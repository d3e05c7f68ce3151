use std::io;
use std::net::SocketAddr;

use rs_http_parser::http::{Method, MimeType};
use rs_http_parser::parser::{ParseError, Parser};
use rs_http_parser::request::Request;
use rs_http_parser::response::Response;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_stream::StreamExt;

use crate::authorization::{bearer_token, ScopeAuthorizer};
use crate::discovery::{self, HOST_META_PATH};
use crate::error::{ServerError, ServerResult};
use crate::etag::Preconditions;
use crate::login::{self, AUTH_PREFIX};
use crate::path::{StoragePath, STORAGE_PREFIX};
use crate::resource::{FileBody, Resource};
use crate::state::AppState;
use crate::storage::{Storage, StorageReply};

const CSS_PREFIX: &str = "/css/";
const CORS_ALLOW_HEADERS: &str = "content-type, authorization, origin, if-match, if-none-match";
const CORS_ALLOW_METHODS: &str = "GET, PUT, DELETE";
const CORS_EXPOSE_HEADERS: &str = "etag, content-type, content-length";

pub struct Server {
    address: SocketAddr,
    listener: TcpListener,
    state: AppState,
}

impl Server {
    pub async fn new(state: AppState) -> io::Result<Self> {
        let address = state.config.listen_addr;
        let listener = TcpListener::bind(address).await?;
        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            address,
            listener,
            state,
        })
    }

    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Err(error) => {
                    tracing::error!("{}: failed to accept connection - {}", self.address, error);
                }
                Ok((socket, address)) => {
                    let state = self.state.clone();

                    tokio::spawn(async move {
                        let mut conn = Conn::new(socket, address);
                        if let Err(e) = conn.run(&state).await {
                            tracing::debug!("{}: connection error - {}", address, e);
                        }
                        conn.close().await;
                    });
                }
            }
        }
    }
}

pub struct Conn {
    address: SocketAddr,
    socket: TcpStream,
}

impl Conn {
    fn new(socket: TcpStream, address: SocketAddr) -> Self {
        Self { address, socket }
    }

    async fn close(&mut self) {
        if let Err(e) = self.socket.shutdown().await {
            tracing::debug!("{}: failed to shutdown socket - {}", self.address, e);
        }
    }

    /// Serves exactly one request.
    async fn run(&mut self, state: &AppState) -> io::Result<()> {
        let mut buffer = [0; 4096];
        let (mut reader, mut writer) = self.socket.split();

        let mut parser = Parser::with_body_limit(state.config.max_body_bytes);

        loop {
            match reader.read(&mut buffer).await? {
                0 => {
                    tracing::debug!("{}: end of stream", self.address);
                    break;
                }
                count => {
                    parser.update(&buffer[..count]);
                    if parser.is_done() {
                        break;
                    }
                }
            }
        }

        let (response, body) = handle_http_request(state, parser).await;

        writer.write_all(&response.as_bytes()).await?;

        if let Some(body) = body {
            let mut chunks = body.into_stream();
            while let Some(chunk) = chunks.next().await {
                writer.write_all(&chunk?).await?;
            }
        }

        writer.flush().await
    }
}

/// Turns a fully read request into a response, plus a file body to stream
/// after the headers when the response has one.
pub async fn handle_http_request(
    state: &AppState,
    parser: Parser,
) -> (Response, Option<FileBody>) {
    let mut res = Response::new(200);
    res.set_header("connection", "close");

    // A connection closed mid-request is as malformed as a garbled one
    let request = match parser.failure() {
        Some(failure) => Err(failure),
        None if !parser.is_done() => Err(ParseError::Malformed),
        None => parser.consume_request().ok_or(ParseError::Malformed),
    };

    let request = match request {
        Ok(request) => request,
        Err(failure) => {
            tracing::debug!("Rejected request: {}", failure);
            res.set_status_code(failure.status_code());
            res.set_body(failure.to_string().into_bytes(), MimeType::TextPlain);
            return (res, None);
        }
    };

    tracing::debug!("{} {}", request.method, request.uri);

    let path = request.path.as_str();
    let body = if path == HOST_META_PATH {
        enable_cors(&request, &mut res);
        handle_discovery(state, &request, &mut res);
        None
    } else if path.starts_with(AUTH_PREFIX) {
        if let Err(e) = login::handle_auth(state, &request, &mut res).await {
            report(&request, &e);
            res.set_status_code(e.status_code());
        }
        None
    } else if path.starts_with(STORAGE_PREFIX) {
        enable_cors(&request, &mut res);
        handle_storage(state, &request, &mut res).await
    } else if let Some(name) = path.strip_prefix(CSS_PREFIX) {
        serve_asset(state, name, &mut res).await
    } else {
        res.set_status_code(404);
        None
    };

    (res, body)
}

fn report(request: &Request, error: &ServerError) {
    match error {
        ServerError::Io(_) | ServerError::Unsupported(_) => {
            tracing::error!("{} {}: {}", request.method, request.uri, error)
        }
        _ => tracing::debug!("{} {}: {}", request.method, request.uri, error),
    }
}

fn enable_cors(request: &Request, res: &mut Response) {
    let origin = request.header("origin").unwrap_or("*");
    res.set_header("access-control-allow-origin", origin);
    res.set_header("access-control-allow-headers", CORS_ALLOW_HEADERS);
    res.set_header("access-control-allow-methods", CORS_ALLOW_METHODS);
    res.set_header("access-control-expose-headers", CORS_EXPOSE_HEADERS);
}

fn request_host(request: &Request) -> Option<&str> {
    request
        .header("x-forwarded-host")
        .or_else(|| request.header("host"))
}

fn handle_discovery(state: &AppState, request: &Request, res: &mut Response) {
    if request.method == Method::OPTIONS {
        return;
    }

    let base_url = state.config.base_url(request_host(request));
    let host_meta = request
        .query_param("resource")
        .ok_or_else(|| ServerError::MalformedRequest("missing resource".into()))
        .and_then(|resource| discovery::discover(&base_url, resource));

    let json = host_meta.and_then(|host_meta| {
        serde_json::to_string(&host_meta).map_err(|e| ServerError::Unsupported(e.to_string()))
    });

    match json {
        Ok(json) => res.set_json(json),
        Err(e) => {
            report(request, &e);
            res.set_status_code(e.status_code());
            res.set_json("{}".into());
        }
    }
}

async fn handle_storage(
    state: &AppState,
    request: &Request,
    res: &mut Response,
) -> Option<FileBody> {
    if request.method == Method::OPTIONS {
        return None;
    }

    let listing = request.method == Method::GET && request.path.ends_with('/');

    match storage_reply(state, request).await {
        Ok(reply) => write_reply(reply, res),
        Err(e) => {
            report(request, &e);
            res.set_status_code(e.status_code());
            if listing {
                res.set_json("{}".into());
            }
            None
        }
    }
}

async fn storage_reply(state: &AppState, request: &Request) -> ServerResult<StorageReply> {
    let path = StoragePath::parse(&request.path)?;

    let grant = ScopeAuthorizer::new(state.tokens.as_ref())
        .authorize(
            bearer_token(request.header("authorization")),
            &path,
            &request.method,
        )
        .await?;

    let owner = match &request.method {
        Method::PUT => {
            let username = grant.authorization().map(|auth| auth.username.as_str());
            state.config.ownership.resolve(username).await
        }
        _ => None,
    };

    let storage = Storage::new(
        state.config.user_data_root(path.user()),
        state.metadata.clone(),
        owner,
    );
    let preconditions = Preconditions::from_request(request);

    match &request.method {
        Method::GET if path.is_collection() => storage.list(&path, &preconditions).await,
        Method::GET => storage.read(&path, &preconditions).await,
        Method::PUT => {
            storage
                .write(
                    &path,
                    &request.raw_body,
                    request.header("content-type"),
                    &preconditions,
                )
                .await
        }
        Method::DELETE => storage.delete(&path, &preconditions).await,
        other => Err(ServerError::Unsupported(format!("{} on storage", other))),
    }
}

fn write_reply(reply: StorageReply, res: &mut Response) -> Option<FileBody> {
    match reply {
        StorageReply::Listing { etag, entries } => match serde_json::to_string(&entries) {
            Ok(json) => {
                res.set_header("etag", etag.as_str());
                res.set_json(json);
            }
            Err(e) => {
                tracing::error!("Failed to encode listing: {}", e);
                res.set_status_code(500);
                res.set_json("{}".into());
            }
        },
        StorageReply::Content {
            etag,
            content_type,
            body,
        } => {
            res.set_header("etag", etag.as_str());
            res.set_header("content-type", &content_type);
            res.set_header("content-length", &body.len.to_string());
            return Some(body);
        }
        StorageReply::Written { etag } | StorageReply::Deleted { etag } => {
            res.set_header("etag", etag.as_str());
        }
        StorageReply::NotModified { etag } => {
            res.set_status_code(304);
            res.set_header("etag", etag.as_str());
        }
    }

    None
}

async fn serve_asset(state: &AppState, name: &str, res: &mut Response) -> Option<FileBody> {
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        res.set_status_code(404);
        return None;
    }

    let path = state.config.assets_dir.join(name);
    let resource = match Resource::stat(&path).await {
        Ok(Some(resource)) if !resource.is_collection() => resource,
        _ => {
            res.set_status_code(404);
            return None;
        }
    };

    match resource.open().await {
        Ok(body) => {
            let extension = path
                .extension()
                .and_then(|extension| extension.to_str())
                .unwrap_or_default();
            res.set_header("content-type", MimeType::from_extension(extension).to_str());
            res.set_header("content-length", &body.len.to_string());
            Some(body)
        }
        Err(e) => {
            tracing::error!("Failed to open {}: {}", path.display(), e);
            res.set_status_code(500);
            None
        }
    }
}
