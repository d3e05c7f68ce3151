#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    HEAD,
    OPTIONS,
    PATCH,
    // Any other syntactically valid token. Kept so that callers can decide
    // how to answer methods they do not implement.
    Other(String),
}

impl Method {
    pub fn from_token(token: &str) -> Result<Self, String> {
        if token.is_empty() || !token.bytes().all(is_token_char) {
            return Err(format!("Invalid method: {:?}", token));
        }

        Ok(match token {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            "HEAD" => Method::HEAD,
            "OPTIONS" => Method::OPTIONS,
            "PATCH" => Method::PATCH,
            other => Method::Other(other.to_string()),
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
            Method::Other(token) => token.as_str(),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_token_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&byte)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum MimeType {
    TextPlain,
    TextHtml,
    TextCss,
    TextJavascript,
    ImagePng,
    ImageJpeg,
    ImageGif,
    ImageWebp,
    ImageSvg,
    ApplicationJson,
    ApplicationXml,
    #[default]
    ApplicationOctetStream,
}

impl MimeType {
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "txt" => MimeType::TextPlain,
            "html" | "htm" => MimeType::TextHtml,
            "css" => MimeType::TextCss,
            "js" => MimeType::TextJavascript,
            "png" => MimeType::ImagePng,
            "jpg" | "jpeg" => MimeType::ImageJpeg,
            "gif" => MimeType::ImageGif,
            "webp" => MimeType::ImageWebp,
            "svg" => MimeType::ImageSvg,
            "json" => MimeType::ApplicationJson,
            "xml" => MimeType::ApplicationXml,
            _ => MimeType::ApplicationOctetStream,
        }
    }

    pub fn to_str(&self) -> &'static str {
        match self {
            MimeType::TextPlain => "text/plain",
            MimeType::TextHtml => "text/html; charset=utf-8",
            MimeType::TextCss => "text/css",
            MimeType::TextJavascript => "text/javascript",
            MimeType::ImagePng => "image/png",
            MimeType::ImageJpeg => "image/jpeg",
            MimeType::ImageGif => "image/gif",
            MimeType::ImageWebp => "image/webp",
            MimeType::ImageSvg => "image/svg+xml",
            MimeType::ApplicationJson => "application/json",
            MimeType::ApplicationXml => "application/xml",
            MimeType::ApplicationOctetStream => "application/octet-stream",
        }
    }
}

pub fn status_code_lookup(code: u16) -> &'static str {
    match code {
        100 => "Continue",

        200 => "OK",
        201 => "Created",
        204 => "No Content",

        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",

        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Payload Too Large",

        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",

        _ => "Unknown",
    }
}
