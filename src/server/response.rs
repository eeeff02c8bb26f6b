//! Fixed-shape response assembly. The server never emits a non-2xx status;
//! error outcomes ride the success status with a distinguishing body.

const STATUS_LINE: &str = "HTTP/1.0 200 OK";
const SERVER_HEADER: &str = "Server: deckd";
const CONTENT_TYPE: &str = "text/html";

/// Body for a successfully dispatched command.
pub const BODY_OK: &str = "OK";
/// Body when the request line cannot be parsed.
pub const BODY_BAD_REQUEST: &str = "ERR bad request";
/// Body when a command token has no mapping.
pub const BODY_UNKNOWN_COMMAND: &str = "ERR unknown command";
/// Body when a mapped executable fails to start.
pub const BODY_LAUNCH_FAILURE: &str = "ERR launch failure";
/// Body when a resolved file cannot be read.
pub const BODY_UNREADABLE: &str = "ERR unreadable";

/// Assembles the one response shape the deck speaks: status line, product
/// header, byte-accurate `Content-Length`, fixed content type, permissive
/// CORS header, blank line, body. The connection is closed by the caller
/// after writing; there are no persistent connections.
pub fn build(body: &[u8]) -> Vec<u8> {
    let mut response = format!(
        "{STATUS_LINE}\r\n\
         {SERVER_HEADER}\r\n\
         Content-Length: {}\r\n\
         Content-Type: {CONTENT_TYPE}\r\n\
         Access-Control-Allow-Origin: *\r\n\
         \r\n",
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(body);
    response
}
