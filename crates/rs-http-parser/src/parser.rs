// HTTP Request parser
// Builds up a request from a stream of bytes

use std::fmt;
use std::str::Split;

use bytes::BytesMut;

use crate::{http::Method, request::Request};

const CRLF_CHARS: &str = "\r\n";
const CRLF: &[u8] = b"\r\n";
const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";
const TOKEN_SEPERATOR: &str = " ";
const HEADER_SEPERATOR: char = ':';
const CHUNK_EXTENSION_SEPERATOR: u8 = b';';

/// Upper bound for the request line plus headers.
const MAX_HEAD_BYTES: usize = 64 * 1024;
/// Upper bound for a chunk-size line including extensions.
const MAX_CHUNK_LINE_BYTES: usize = 1024;

pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Why a request could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    Malformed,
    UnsupportedTransferEncoding,
    BodyTooLarge,
}

impl ParseError {
    pub fn status_code(&self) -> u16 {
        match self {
            ParseError::Malformed => 400,
            ParseError::UnsupportedTransferEncoding => 501,
            ParseError::BodyTooLarge => 413,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Malformed => f.write_str("Invalid HTTP Request"),
            ParseError::UnsupportedTransferEncoding => {
                f.write_str("Unsupported Transfer-Encoding")
            }
            ParseError::BodyTooLarge => f.write_str("Request Body Too Large"),
        }
    }
}

trait TextStream {
    fn as_line_stream<'a>(data: &'a str) -> Split<'a, &'a str>;
    fn as_token_stream<'a>(line: &'a str) -> Split<'a, &'a str>;
}

pub struct Parser {
    // Unparsed head bytes, then undecoded chunked body bytes
    buffer: BytesMut,

    has_consumed_req_headers: bool,

    // Set once the terminating zero-size chunk has been read
    has_consumed_chunks: bool,

    max_body_bytes: usize,

    failure: Option<ParseError>,

    request: Option<Request>,
}

// Default parsing behavior for HTTP
impl TextStream for Parser {
    fn as_line_stream<'a>(data: &'a str) -> Split<'a, &'a str> {
        data.split(CRLF_CHARS)
    }

    fn as_token_stream<'a>(line: &'a str) -> Split<'a, &'a str> {
        line.split(TOKEN_SEPERATOR)
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Hex size of a chunk, ignoring any `;extension`.
fn parse_chunk_size(line: &[u8]) -> Option<usize> {
    let size = match line.iter().position(|&b| b == CHUNK_EXTENSION_SEPERATOR) {
        Some(index) => &line[..index],
        None => line,
    };
    let size = std::str::from_utf8(size).ok()?.trim();
    if size.is_empty() {
        return None;
    }
    usize::from_str_radix(size, 16).ok()
}

impl Parser {
    pub fn new() -> Self {
        Self::with_body_limit(DEFAULT_MAX_BODY_BYTES)
    }

    pub fn with_body_limit(max_body_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            has_consumed_req_headers: false,
            has_consumed_chunks: false,
            max_body_bytes,
            failure: None,
            request: None,
        }
    }

    /// Hands out the parsed request. Bytes received past the end of the
    /// body are not part of it.
    pub fn consume_request(self) -> Option<Request> {
        if self.failure.is_some() {
            return None;
        }

        self.request
    }

    pub fn update(&mut self, raw_data: &[u8]) {
        if self.failure.is_some() {
            return;
        }

        if self.has_consumed_req_headers {
            self.append_body(raw_data);
            return;
        }

        self.buffer.extend_from_slice(raw_data);

        let Some(index) = find(&self.buffer, HEAD_TERMINATOR) else {
            if self.buffer.len() > MAX_HEAD_BYTES {
                self.failure = Some(ParseError::Malformed);
            }
            return;
        };

        let head = self.buffer.split_to(index + HEAD_TERMINATOR.len());
        self.has_consumed_req_headers = true;

        if let Err(e) = self.parse_head(&head[..index]) {
            self.failure = Some(e);
            return;
        }

        // Whatever followed the blank line is the start of the body
        let rest = self.buffer.split();
        self.append_body(&rest);
    }

    fn parse_head(&mut self, head: &[u8]) -> Result<(), ParseError> {
        let head = String::from_utf8_lossy(head);
        let mut lines = Self::as_line_stream(head.as_ref());

        let request_line = lines.next().ok_or(ParseError::Malformed)?;
        let mut request =
            Self::parse_request_line(request_line).map_err(|_| ParseError::Malformed)?;

        for line in lines {
            Self::parse_request_header(&mut request, line).map_err(|_| ParseError::Malformed)?;
        }

        request.post_process()?;

        if request.content_length.unwrap_or(0) > self.max_body_bytes {
            return Err(ParseError::BodyTooLarge);
        }

        self.request = Some(request);
        Ok(())
    }

    fn parse_request_line(line: &str) -> Result<Request, ()> {
        let mut tokens = Self::as_token_stream(line);

        let (Some(method), Some(uri), Some(version), None) =
            (tokens.next(), tokens.next(), tokens.next(), tokens.next())
        else {
            return Err(());
        };

        if !version.starts_with("HTTP/") || !uri.starts_with('/') {
            return Err(());
        }

        let method = Method::from_token(method).map_err(|_| ())?;

        Ok(Request::new(method, uri.to_string(), version.to_string()))
    }

    fn parse_request_header(request: &mut Request, line: &str) -> Result<(), ()> {
        let (header_name, header_value) = line.split_once(HEADER_SEPERATOR).ok_or(())?;

        let header_name = header_name.trim().to_lowercase();
        if header_name.is_empty() {
            return Err(());
        }

        // Repeated headers: the last one wins
        request
            .headers
            .insert(header_name, header_value.trim().to_string());

        Ok(())
    }

    fn append_body(&mut self, data: &[u8]) {
        let Some(request) = &mut self.request else {
            return;
        };

        if request.chunked {
            self.buffer.extend_from_slice(data);
            if let Err(e) = self.decode_chunks() {
                self.failure = Some(e);
            }
            return;
        }

        let remaining = match request.content_length {
            Some(content_length) => content_length.saturating_sub(request.raw_body.len()),
            None => 0,
        };
        request
            .raw_body
            .extend_from_slice(&data[..remaining.min(data.len())]);
    }

    /// Moves every complete chunk from the buffer into the body.
    fn decode_chunks(&mut self) -> Result<(), ParseError> {
        let Some(request) = &mut self.request else {
            return Ok(());
        };

        while !self.has_consumed_chunks {
            let Some(line_end) = find(&self.buffer, CRLF) else {
                if self.buffer.len() > MAX_CHUNK_LINE_BYTES {
                    return Err(ParseError::Malformed);
                }
                return Ok(());
            };

            let size = parse_chunk_size(&self.buffer[..line_end]).ok_or(ParseError::Malformed)?;
            let data_start = line_end + CRLF.len();

            if size == 0 {
                // Trailer fields are read and dropped up to the closing blank line
                let trailers = &self.buffer[data_start..];
                if trailers.starts_with(CRLF) || find(trailers, HEAD_TERMINATOR).is_some() {
                    self.has_consumed_chunks = true;
                    self.buffer.clear();
                } else if trailers.len() > MAX_HEAD_BYTES {
                    return Err(ParseError::Malformed);
                }
                return Ok(());
            }

            if size > self.max_body_bytes.saturating_sub(request.raw_body.len()) {
                return Err(ParseError::BodyTooLarge);
            }

            let data_end = data_start + size;
            if self.buffer.len() < data_end + CRLF.len() {
                return Ok(());
            }
            if &self.buffer[data_end..data_end + CRLF.len()] != CRLF {
                return Err(ParseError::Malformed);
            }

            let chunk = self.buffer.split_to(data_end + CRLF.len());
            request
                .raw_body
                .extend_from_slice(&chunk[data_start..data_end]);
        }

        Ok(())
    }

    pub fn is_done(&self) -> bool {
        if self.is_invalid() {
            return true;
        }

        if !self.has_consumed_req_headers {
            return false;
        }

        match &self.request {
            Some(request) if request.chunked => self.has_consumed_chunks,
            Some(request) => match request.content_length {
                Some(content_length) => request.raw_body.len() >= content_length,
                None => true,
            },
            None => true,
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.failure.is_some()
    }

    pub fn failure(&self) -> Option<ParseError> {
        self.failure
    }
}
