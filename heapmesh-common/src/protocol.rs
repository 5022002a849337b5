use crate::error::{Error, Result};
use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

pub const SERVER_NAME: &str = "Heapmesh-Httpd";
pub const MAX_REQUEST_LEN: usize = 64 * 1024;
const MAX_HEADERS: usize = 32;

/// How much of an inbound request has arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Partial,
    Complete { head_len: usize, content_length: usize },
}

impl Progress {
    pub fn scan(bytes: &[u8]) -> Result<Progress> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);

        let head_len = match req.parse(bytes)? {
            httparse::Status::Complete(n) => n,
            httparse::Status::Partial => return Ok(Progress::Partial),
        };

        let content_length = match req
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case("Content-Length"))
        {
            Some(h) => std::str::from_utf8(h.value)
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .ok_or_else(|| Error::MalformedRequest("bad Content-Length".to_owned()))?,
            None => 0,
        };

        if head_len + content_length > MAX_REQUEST_LEN {
            return Err(Error::RequestTooLarge {
                limit: MAX_REQUEST_LEN,
            });
        }

        Ok(Progress::Complete {
            head_len,
            content_length,
        })
    }

    /// True once the head and the announced body are all buffered.
    pub fn is_done(&self, buffered: usize) -> bool {
        match self {
            Progress::Partial => false,
            Progress::Complete {
                head_len,
                content_length,
            } => buffered >= head_len + content_length,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub uri: String,
    /// Header names as received.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn parse(bytes: &[u8]) -> Result<Request> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);

        let head_len = match req.parse(bytes)? {
            httparse::Status::Complete(n) => n,
            httparse::Status::Partial => {
                return Err(Error::MalformedRequest("incomplete request head".to_owned()))
            }
        };

        let method = req
            .method
            .ok_or_else(|| Error::MalformedRequest("missing method".to_owned()))?;
        let uri = req
            .path
            .ok_or_else(|| Error::MalformedRequest("missing uri".to_owned()))?;

        let headers: BTreeMap<String, String> = req
            .headers
            .iter()
            .map(|h| {
                (
                    h.name.to_owned(),
                    String::from_utf8_lossy(h.value).into_owned(),
                )
            })
            .collect();

        let mut body = &bytes[head_len..];
        if let Progress::Complete { content_length, .. } = Progress::scan(bytes)? {
            body = &body[..content_length.min(body.len())];
        }

        Ok(Request {
            method: method.to_owned(),
            uri: uri.to_owned(),
            headers,
            body: body.to_vec(),
        })
    }

    /// The uri without its query string.
    pub fn path(&self) -> &str {
        self.uri.split('?').next().unwrap_or_default()
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| Error::BadPayload(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl Response {
    pub fn new(status_code: u16) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Server".to_owned(), SERVER_NAME.to_owned());
        headers.insert("Connection".to_owned(), "close".to_owned());
        headers.insert("Content-Length".to_owned(), "0".to_owned());

        Response {
            status_code,
            headers,
            body: String::new(),
        }
    }

    pub fn json<T: Serialize>(status_code: u16, body: &T) -> anyhow::Result<Self> {
        Ok(Response::new(status_code).with_body("application/json", serde_json::to_string(body)?))
    }

    pub fn with_body(mut self, content_type: &str, body: String) -> Self {
        self.headers
            .insert("Content-Type".to_owned(), content_type.to_owned());
        self.headers
            .insert("Content-Length".to_owned(), body.len().to_string());
        self.body = body;
        self
    }

    pub fn not_found() -> Self {
        Response::new(404)
    }

    pub fn from_error(e: &Error) -> Self {
        Response::new(e.status_code())
    }

    fn status_line(&self) -> String {
        format!("HTTP/1.1 {} {}\r\n", self.status_code, reason(self.status_code))
    }

    /// Serialized length in bytes.
    pub fn size(&self) -> usize {
        self.status_line().len()
            + self
                .headers
                .iter()
                .map(|(k, v)| k.len() + v.len() + 4)
                .sum::<usize>()
            + 2
            + self.body.len()
    }

    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.reserve(self.size());
        buf.put_slice(self.status_line().as_bytes());

        for (k, v) in self.headers.iter() {
            buf.put_slice(k.as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(v.as_bytes());
            buf.put_slice(b"\r\n");
        }

        buf.put_slice(b"\r\n");
        buf.put_slice(self.body.as_bytes());
    }

    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.size());
        self.write_to(&mut buf);
        buf
    }
}

fn reason(status_code: u16) -> &'static str {
    match status_code {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOIN: &[u8] = b"POST /join?x=1 HTTP/1.1\r\nHost: 10.0.0.1\r\nuser-agent: probe/1.0\r\nContent-Length: 39\r\n\r\n{\"ip_address\":\"10.0.0.5\",\"is_master\":1}\r\n";

    #[test]
    fn parse_splits_head_and_body() {
        let req = Request::parse(JOIN).unwrap();

        assert_eq!(req.method, "POST");
        assert_eq!(req.uri, "/join?x=1");
        assert_eq!(req.path(), "/join");
        assert_eq!(req.header("User-Agent"), Some("probe/1.0"));
        assert!(req.headers.contains_key("user-agent"));
        assert_eq!(req.body.len(), 39);
    }

    #[test]
    fn get_json_reports_bad_payload() {
        let req = Request::parse(b"POST /join HTTP/1.1\r\nContent-Length: 5\r\n\r\n{nope").unwrap();
        let err = req.get_json::<serde_json::Value>().unwrap_err();

        assert!(matches!(err, Error::BadPayload(_)));
    }

    #[test]
    fn scan_waits_for_announced_body() {
        let head = b"POST /join HTTP/1.1\r\nContent-Length: 4\r\n\r\n";
        assert_eq!(Progress::scan(&head[..10]).unwrap(), Progress::Partial);

        let progress = Progress::scan(head).unwrap();
        assert!(!progress.is_done(head.len()));
        assert!(progress.is_done(head.len() + 4));
    }

    #[test]
    fn scan_rejects_oversized_bodies_up_front() {
        let head = b"POST /join HTTP/1.1\r\nContent-Length: 1000000\r\n\r\n";
        let err = Progress::scan(head).unwrap_err();

        assert_eq!(err.status_code(), 413);
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            Request::parse(b"\x00\x01 nonsense\r\n\r\n"),
            Err(Error::MalformedRequest(_))
        ));
    }

    #[test]
    fn serialized_response_parses_back() {
        let res = Response::new(200).with_body("application/json", "{\"status\":\"JOINED\"}".into());
        let bytes = res.to_bytes();
        assert_eq!(bytes.len(), res.size());

        let mut headers = [httparse::EMPTY_HEADER; 8];
        let mut parsed = httparse::Response::new(&mut headers);
        let head_len = match parsed.parse(&bytes).unwrap() {
            httparse::Status::Complete(n) => n,
            httparse::Status::Partial => panic!("partial response"),
        };

        assert_eq!(parsed.code, Some(200));
        let headers: BTreeMap<String, String> = parsed
            .headers
            .iter()
            .map(|h| (h.name.to_owned(), std::str::from_utf8(h.value).unwrap().to_owned()))
            .collect();
        assert_eq!(headers, res.headers);
        assert_eq!(&bytes[head_len..], res.body.as_bytes());
    }

    #[test]
    fn empty_response_still_names_the_server() {
        let res = Response::new(500);
        assert_eq!(res.headers["Server"], SERVER_NAME);
        assert_eq!(res.headers["Content-Length"], "0");
        assert!(!res.headers.contains_key("Content-Type"));
    }
}
