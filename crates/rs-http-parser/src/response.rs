use crate::http::{self, MimeType};

pub struct Response {
    pub status_code: u16,
    // Lowercased names, kept in insertion order
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn set_status_code(&mut self, status_code: u16) {
        self.status_code = status_code;
    }

    /// Sets a header, replacing any previous value of the same name. Line
    /// breaks are dropped so a value can never start a new header.
    pub fn set_header(&mut self, key: &str, value: &str) {
        let key = strip_line_breaks(key).to_ascii_lowercase();
        self.headers.retain(|(name, _)| *name != key);
        self.headers.push((key, strip_line_breaks(value)));
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        let key = key.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_body(&mut self, body: Vec<u8>, mime_type: MimeType) {
        self.set_header("content-type", mime_type.to_str());
        self.body = body
    }

    pub fn set_json(&mut self, json: String) {
        self.set_body(json.into_bytes(), MimeType::ApplicationJson);
    }

    pub fn redirect(&mut self, location: &str, status_code: u16) {
        self.set_status_code(status_code);
        self.set_header("location", location);
    }

    /// Serializes status line, headers and the in-memory body. A body that
    /// is streamed separately must announce its own `content-length`.
    pub fn as_bytes(&self) -> Vec<u8> {
        let mut response = format!(
            "HTTP/1.1 {} {}\r\n",
            self.status_code,
            http::status_code_lookup(self.status_code)
        );

        for (key, value) in &self.headers {
            response.push_str(&format!("{}: {}\r\n", key, value));
        }

        if self.header("content-length").is_none() {
            response.push_str(&format!("content-length: {}\r\n", self.body.len()));
        }

        response.push_str("\r\n");

        let mut response_bytes: Vec<u8> = response.into_bytes();

        response_bytes.extend(&self.body);

        response_bytes
    }
}

fn strip_line_breaks(text: &str) -> String {
    text.chars().filter(|c| !matches!(c, '\r' | '\n')).collect()
}
