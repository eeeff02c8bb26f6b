use thiserror::Error;

/// A parsed request line. Only the first line of the received text is ever
/// interpreted; headers and any body are read off the socket but ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    /// The target up to (not including) the first `?`.
    pub raw_path: String,
    /// Everything after the first `?`; empty when the target has none.
    pub query: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty request")]
    Empty,
    #[error("malformed request line {0:?}")]
    MalformedRequestLine(String),
}

impl Request {
    /// Parses `method target [version]` from the first line of `raw`. The
    /// protocol version is accepted but unused. Missing pieces are a typed
    /// parse failure, never an out-of-range index.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let request_line = raw.lines().next().unwrap_or("");
        if request_line.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let mut parts = request_line.split_whitespace();
        let method = parts
            .next()
            .ok_or_else(|| ParseError::MalformedRequestLine(request_line.to_string()))?;
        let target = parts
            .next()
            .ok_or_else(|| ParseError::MalformedRequestLine(request_line.to_string()))?;

        let (raw_path, query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };

        Ok(Self {
            method: method.to_string(),
            raw_path: raw_path.to_string(),
            query: query.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_plain_get() {
        let req = Request::parse("GET /index.html HTTP/1.1\r\nHost: deck\r\n\r\n").unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.raw_path, "/index.html");
        assert_eq!(req.query, "");
    }

    #[test]
    fn splits_query_at_the_first_question_mark() {
        let req = Request::parse("GET /index.html?CMD-A HTTP/1.1").unwrap();
        assert_eq!(req.raw_path, "/index.html");
        assert_eq!(req.query, "CMD-A");

        let req = Request::parse("GET /a?b?c HTTP/1.1").unwrap();
        assert_eq!(req.raw_path, "/a");
        assert_eq!(req.query, "b?c");
    }

    #[test]
    fn version_is_optional() {
        let req = Request::parse("GET /").unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.raw_path, "/");
    }

    #[test]
    fn only_the_first_line_matters() {
        let req = Request::parse("GET / HTTP/1.0\r\nGET /other HTTP/1.0\r\n").unwrap();
        assert_eq!(req.raw_path, "/");
    }

    #[test]
    fn missing_target_is_a_parse_failure() {
        assert_eq!(
            Request::parse("GET"),
            Err(ParseError::MalformedRequestLine("GET".to_string()))
        );
    }

    #[test]
    fn blank_input_is_a_parse_failure() {
        assert_eq!(Request::parse(""), Err(ParseError::Empty));
        assert_eq!(Request::parse("\r\n"), Err(ParseError::Empty));
        assert_eq!(Request::parse("   \r\n"), Err(ParseError::Empty));
    }

    #[test]
    fn non_get_methods_parse_normally() {
        let req = Request::parse("POST /upload HTTP/1.1").unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.raw_path, "/upload");
    }
}
