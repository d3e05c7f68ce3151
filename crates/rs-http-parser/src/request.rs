use std::collections::HashMap;

use url::form_urlencoded;

use crate::http::Method;
use crate::parser::ParseError;

const CHUNKED: &str = "chunked";

pub struct Request {
    pub method: Method,
    pub uri: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub raw_body: Vec<u8>,

    // Post-processing
    pub path: String,
    pub query: HashMap<String, String>,
    pub content_length: Option<usize>,
    pub chunked: bool,
}

impl Request {
    // Create empty request with no data and default values
    pub fn new(method: Method, uri: String, version: String) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path.to_string(), decode_pairs(query.as_bytes())),
            None => (uri.clone(), HashMap::new()),
        };

        Self {
            method,
            uri,
            version,
            headers: HashMap::new(),
            raw_body: Vec::new(),
            path,
            query,
            content_length: None,
            chunked: false,
        }
    }

    /// Derives the body framing from `Content-Length` and
    /// `Transfer-Encoding`. Only a bare `chunked` coding is understood.
    pub fn post_process(&mut self) -> Result<(), ParseError> {
        self.content_length = match self.headers.get("content-length") {
            Some(value) => Some(
                value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| ParseError::Malformed)?,
            ),
            None => None,
        };

        if let Some(codings) = self.headers.get("transfer-encoding") {
            if self.content_length.is_some() {
                return Err(ParseError::Malformed);
            }

            let codings: Vec<String> = codings
                .split(',')
                .map(|coding| coding.trim().to_ascii_lowercase())
                .filter(|coding| !coding.is_empty())
                .collect();

            match codings.as_slice() {
                [coding] if coding == CHUNKED => self.chunked = true,
                _ => return Err(ParseError::UnsupportedTransferEncoding),
            }
        }

        Ok(())
    }

    /// Header lookup by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name.to_ascii_lowercase().as_str())
            .map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Decodes an `application/x-www-form-urlencoded` body. The first
    /// occurrence of a repeated field wins.
    pub fn form(&self) -> HashMap<String, String> {
        decode_pairs(&self.raw_body)
    }
}

fn decode_pairs(input: &[u8]) -> HashMap<String, String> {
    let mut pairs = HashMap::new();
    for (key, value) in form_urlencoded::parse(input) {
        pairs
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    pairs
}
