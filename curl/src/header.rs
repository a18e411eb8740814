use cirro_http::{HeaderName, HeaderValue, StatusCode};
use std::str::from_utf8;

#[inline]
pub(crate) fn is_status_line(line: &[u8]) -> bool {
    line.starts_with(b"HTTP/")
}

#[inline]
pub(crate) fn is_ended_line(line: &[u8]) -> bool {
    line == b"\r\n"
}

#[inline]
pub(crate) fn parse_status_line(line: &[u8]) -> Option<StatusCode> {
    line.split(u8::is_ascii_whitespace)
        .skip(1)
        .find(|s| !s.is_empty())
        .and_then(|s| from_utf8(s).ok())
        .and_then(|s| s.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
}

#[inline]
pub(crate) fn parse_header_line(line: &[u8]) -> Option<(HeaderName, HeaderValue)> {
    let line = from_utf8(line).ok()?;
    let mut iter = line
        .trim_matches(char::is_whitespace)
        .splitn(2, ':')
        .take(2)
        .map(|s| s.trim_matches(char::is_whitespace));
    if let (Some(header_name), Some(header_value)) = (iter.next(), iter.next()) {
        let header_name = HeaderName::from_bytes(header_name.as_bytes()).ok()?;
        let header_value = HeaderValue::from_str(header_value).ok()?;
        return Some((header_name, header_value));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_line() {
        assert_eq!(
            parse_status_line(b"HTTP/1.1 200 OK\r\n"),
            Some(StatusCode::OK)
        );
        assert_eq!(
            parse_status_line(b"HTTP/2 404 \r\n"),
            Some(StatusCode::NOT_FOUND)
        );
        assert_eq!(parse_status_line(b"HTTP/1.1\r\n"), None);
    }

    #[test]
    fn test_parse_header_line() {
        let (name, value) = parse_header_line(b"Content-Type: application/json\r\n").unwrap();
        assert_eq!(name.as_str(), "content-type");
        assert_eq!(value.to_str().unwrap(), "application/json");
        assert!(parse_header_line(b"\r\n").is_none());
    }
}
