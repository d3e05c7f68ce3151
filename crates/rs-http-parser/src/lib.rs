pub mod http;
pub mod parser;
pub mod request;
pub mod response;
