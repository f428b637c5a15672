//! Control-channel response framing.
//!
//! Commands travel client→server as newline-terminated ASCII lines; each
//! response comes back as one raw send of at most `MAX_RESPONSE_LEN` bytes.
//! Three response shapes are distinguished: the success sentinel, the two
//! data-channel announcements, and free-form `Error: ...` text.

/// Success sentinel. Every command cycle starts from this response.
pub const OK: &str = "OK";

pub const GET_PORT_PREFIX: &str = "get port: ";
pub const PUT_PORT_PREFIX: &str = "put port: ";
const SIZE_SEPARATOR: &str = " size: ";

/// A classified server response, as seen by the client driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok,
    /// Announcement of a server→client data channel.
    GetPort { port: u16, size: u64 },
    /// Announcement of a client→server data channel.
    PutPort { port: u16 },
    /// Anything else: error text or captured command output.
    Other(String),
}

/// Render the GET announcement exactly as the protocol requires.
pub fn format_get(port: u16, size: u64) -> String {
    format!("{GET_PORT_PREFIX}{port}{SIZE_SEPARATOR}{size}")
}

/// Render the PUT announcement. No size is echoed; the client declared it.
pub fn format_put(port: u16) -> String {
    format!("{PUT_PORT_PREFIX}{port}")
}

impl Response {
    /// Classify a raw response. A malformed announcement falls back to
    /// `Other` so the client prints it instead of opening a data channel.
    pub fn classify(raw: &str) -> Response {
        if raw == OK {
            return Response::Ok;
        }
        if let Some(rest) = raw.strip_prefix(GET_PORT_PREFIX) {
            if let Some((port_str, size_str)) = rest.split_once(SIZE_SEPARATOR) {
                if let (Ok(port), Ok(size)) = (port_str.parse(), size_str.parse()) {
                    return Response::GetPort { port, size };
                }
            }
        }
        if let Some(rest) = raw.strip_prefix(PUT_PORT_PREFIX) {
            if let Ok(port) = rest.parse() {
                return Response::PutPort { port };
            }
        }
        Response::Other(raw.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_the_success_sentinel() {
        assert_eq!(Response::classify("OK"), Response::Ok);
        // only the exact sentinel counts
        assert!(matches!(Response::classify("OK then"), Response::Other(_)));
    }

    #[test]
    fn announcements_round_trip() {
        assert_eq!(
            Response::classify(&format_get(4242, 37)),
            Response::GetPort { port: 4242, size: 37 }
        );
        assert_eq!(
            Response::classify(&format_put(9000)),
            Response::PutPort { port: 9000 }
        );
    }

    #[test]
    fn malformed_announcements_degrade_to_text() {
        assert!(matches!(
            Response::classify("get port: x size: 1"),
            Response::Other(_)
        ));
        assert!(matches!(
            Response::classify("put port: 123456789"),
            Response::Other(_)
        ));
    }

    #[test]
    fn error_text_is_other() {
        assert_eq!(
            Response::classify("Error : access denied!"),
            Response::Other("Error : access denied!".to_owned())
        );
    }
}
