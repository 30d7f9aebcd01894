//! Close codes carried in the payload of a close frame.
//!
//! A close frame's payload is a 2-byte big-endian status code optionally
//! followed by a UTF-8 reason string. The codes here are the subset defined
//! by [RFC 6455 Section 7.4.1](https://datatracker.ietf.org/doc/html/rfc6455#section-7.4.1)
//! that this protocol exchanges; anything else round-trips through
//! [`CloseCode::Other`].

/// Status code explaining why a connection is being closed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CloseCode {
    /// 1000: normal closure, the purpose of the connection is fulfilled.
    Normal,
    /// 1001: the endpoint is going away (shutdown, navigation).
    Away,
    /// 1002: a protocol error was detected.
    Protocol,
    /// 1003: a data type the endpoint cannot accept was received.
    Unsupported,
    /// 1007: a payload was inconsistent with its type (e.g. non-UTF-8 text).
    InvalidData,
    /// 1008: a message violated the endpoint's policy.
    Policy,
    /// 1009: a message was too big to process.
    Size,
    /// 1010: the client expected an extension the server did not negotiate.
    Extension,
    /// 1011: the server hit an unexpected internal condition.
    Error,
    /// Any other raw status code.
    Other(u16),
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        match code {
            1000 => Self::Normal,
            1001 => Self::Away,
            1002 => Self::Protocol,
            1003 => Self::Unsupported,
            1007 => Self::InvalidData,
            1008 => Self::Policy,
            1009 => Self::Size,
            1010 => Self::Extension,
            1011 => Self::Error,
            other => Self::Other(other),
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        match code {
            CloseCode::Normal => 1000,
            CloseCode::Away => 1001,
            CloseCode::Protocol => 1002,
            CloseCode::Unsupported => 1003,
            CloseCode::InvalidData => 1007,
            CloseCode::Policy => 1008,
            CloseCode::Size => 1009,
            CloseCode::Extension => 1010,
            CloseCode::Error => 1011,
            CloseCode::Other(other) => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_round_trip() {
        for code in [
            CloseCode::Normal,
            CloseCode::Away,
            CloseCode::Protocol,
            CloseCode::Unsupported,
            CloseCode::InvalidData,
            CloseCode::Policy,
            CloseCode::Size,
            CloseCode::Extension,
            CloseCode::Error,
        ] {
            assert_eq!(CloseCode::from(u16::from(code)), code);
        }
    }

    #[test]
    fn test_fixed_values() {
        assert_eq!(u16::from(CloseCode::Normal), 1000);
        assert_eq!(u16::from(CloseCode::Size), 1009);
        assert_eq!(u16::from(CloseCode::Error), 1011);
    }

    #[test]
    fn test_unknown_code_passes_through() {
        assert_eq!(CloseCode::from(4000), CloseCode::Other(4000));
        assert_eq!(u16::from(CloseCode::Other(4000)), 4000);
    }
}
