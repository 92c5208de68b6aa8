use crate::publisher::PublishSummary;
use std::panic::Location;

/// Error kinds that can occur in scampack
#[derive(Debug)]
pub enum ErrorKind {
    ConfigParse(String),
    ConnectionFailed(String),
    ConnectionTimeout,
    Disconnected,
    General(String),
    Hex(hex::FromHexError),
    Http(http::Error),
    InvalidPack(String),
    InvalidPublicKey(String),
    InvalidRelayUrl(String),
    InvalidUri(http::uri::InvalidUri),
    Io(std::io::Error),
    JoinError(tokio::task::JoinError),
    KeyInvalid,
    MalformedEvent(String),
    MalformedMessage(String),
    NoRelaySuccess(PublishSummary),
    Nostr(nostr_types::Error),
    RelayRejected(String),
    Secp256k1(secp256k1::Error),
    SerdeJson(serde_json::Error),
    SigningRejected(String),
    SigningUnavailable,
    Timeout(tokio::time::error::Elapsed),
    UnknownCommand(String),
    UrlHasNoHostname,
    UrlParse(url::ParseError),
    Usage(String, String), // error, usage line
    Websocket(tungstenite::Error),
}

/// Errors that can occur in scampack, including the file and line number
/// where they were generated
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    location: &'static Location<'static>,
}

impl Error {
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.kind, self.location)
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ErrorKind::*;
        match self {
            ConfigParse(s) => write!(f, "Configuration could not be parsed: {s}"),
            ConnectionFailed(s) => write!(f, "Connection failed: {s}"),
            ConnectionTimeout => write!(f, "Connection timeout"),
            Disconnected => write!(f, "Disconnected"),
            General(s) => write!(f, "{s}"),
            Hex(e) => write!(f, "Hex: {e}"),
            Http(e) => write!(f, "HTTP error: {e}"),
            InvalidPack(s) => write!(f, "Invalid pack: {s}"),
            InvalidPublicKey(s) => write!(f, "Invalid public key: {s}"),
            InvalidRelayUrl(s) => write!(f, "Invalid relay URL: {s}"),
            InvalidUri(e) => write!(f, "Invalid URI: {e}"),
            Io(e) => write!(f, "I/O Error: {e}"),
            JoinError(e) => write!(f, "Task join error: {e}"),
            KeyInvalid => write!(f, "Key is invalid"),
            MalformedEvent(s) => write!(f, "Malformed event: {s}"),
            MalformedMessage(s) => write!(f, "Malformed relay message: {s}"),
            NoRelaySuccess(summary) => write!(
                f,
                "Failed to publish to any relay ({} attempted)",
                summary.per_relay.len()
            ),
            Nostr(e) => write!(f, "Nostr: {e}"),
            RelayRejected(s) if s.is_empty() => write!(f, "Relay rejected event"),
            RelayRejected(s) => write!(f, "Relay rejected event: {s}"),
            Secp256k1(e) => write!(f, "secp256k1: {e}"),
            SerdeJson(e) => write!(f, "SerdeJson Error: {e}"),
            SigningRejected(s) => write!(f, "Signing rejected: {s}"),
            SigningUnavailable => write!(f, "No signer available"),
            Timeout(e) => write!(f, "Timeout: {e}"),
            UnknownCommand(s) => write!(f, "Unknown command: {s}"),
            UrlHasNoHostname => write!(f, "URL has no hostname"),
            UrlParse(e) => write!(f, "URL parse: {e}"),
            Usage(e, u) => write!(f, "{}\n\nUsage: {}", e, u),
            Websocket(e) => write!(f, "Websocket: {e}"),
        }
    }
}

// Note: we impl Into because our typical pattern is ErrorKind::Variant.into()
//       when we tried implementing From, the location was deep in rust code's
//       blanket into implementation, which wasn't the line number we wanted.
//
//       As for converting other error types, the try! macro uses From so it
//       is correct.
#[allow(clippy::from_over_into)]
impl Into<Error> for ErrorKind {
    #[track_caller]
    fn into(self) -> Error {
        Error {
            kind: self,
            location: Location::caller(),
        }
    }
}

impl From<String> for Error {
    #[track_caller]
    fn from(s: String) -> Error {
        Error {
            kind: ErrorKind::General(s),
            location: Location::caller(),
        }
    }
}

impl From<&str> for Error {
    #[track_caller]
    fn from(s: &str) -> Error {
        Error {
            kind: ErrorKind::General(s.to_string()),
            location: Location::caller(),
        }
    }
}

impl From<hex::FromHexError> for Error {
    #[track_caller]
    fn from(e: hex::FromHexError) -> Error {
        Error {
            kind: ErrorKind::Hex(e),
            location: Location::caller(),
        }
    }
}

impl From<http::Error> for Error {
    #[track_caller]
    fn from(e: http::Error) -> Error {
        Error {
            kind: ErrorKind::Http(e),
            location: Location::caller(),
        }
    }
}

impl From<http::uri::InvalidUri> for Error {
    #[track_caller]
    fn from(e: http::uri::InvalidUri) -> Error {
        Error {
            kind: ErrorKind::InvalidUri(e),
            location: Location::caller(),
        }
    }
}

impl From<std::io::Error> for Error {
    #[track_caller]
    fn from(e: std::io::Error) -> Error {
        Error {
            kind: ErrorKind::Io(e),
            location: Location::caller(),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    #[track_caller]
    fn from(e: tokio::task::JoinError) -> Error {
        Error {
            kind: ErrorKind::JoinError(e),
            location: Location::caller(),
        }
    }
}

impl From<nostr_types::Error> for Error {
    #[track_caller]
    fn from(e: nostr_types::Error) -> Error {
        Error {
            kind: ErrorKind::Nostr(e),
            location: Location::caller(),
        }
    }
}

impl From<secp256k1::Error> for Error {
    #[track_caller]
    fn from(e: secp256k1::Error) -> Error {
        Error {
            kind: ErrorKind::Secp256k1(e),
            location: Location::caller(),
        }
    }
}

impl From<serde_json::Error> for Error {
    #[track_caller]
    fn from(e: serde_json::Error) -> Error {
        Error {
            kind: ErrorKind::SerdeJson(e),
            location: Location::caller(),
        }
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    #[track_caller]
    fn from(e: tokio::time::error::Elapsed) -> Error {
        Error {
            kind: ErrorKind::Timeout(e),
            location: Location::caller(),
        }
    }
}

impl From<tungstenite::Error> for Error {
    #[track_caller]
    fn from(e: tungstenite::Error) -> Error {
        Error {
            kind: ErrorKind::Websocket(e),
            location: Location::caller(),
        }
    }
}

impl From<url::ParseError> for Error {
    #[track_caller]
    fn from(e: url::ParseError) -> Error {
        Error {
            kind: ErrorKind::UrlParse(e),
            location: Location::caller(),
        }
    }
}
