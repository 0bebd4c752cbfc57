use std::fmt;

use http::StatusCode;

/// Result of probing one (mirror, repo) pair, persisted as an integer code.
///
/// HTTP outcomes keep their status code. Transport failures use negative
/// codes so they cannot collide with HTTP statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    HostNotFound,
    Timeout,
    ConnectionError,
    ParseFailure,
    Http(u16),
}

impl CheckOutcome {
    pub const OK: CheckOutcome = CheckOutcome::Http(200);

    pub fn code(&self) -> i32 {
        match self {
            CheckOutcome::HostNotFound => -1,
            CheckOutcome::Timeout => -2,
            CheckOutcome::ConnectionError => -3,
            CheckOutcome::ParseFailure => -4,
            CheckOutcome::Http(status) => i32::from(*status),
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            -1 => CheckOutcome::HostNotFound,
            -2 => CheckOutcome::Timeout,
            -3 => CheckOutcome::ConnectionError,
            -4 => CheckOutcome::ParseFailure,
            other => CheckOutcome::Http(u16::try_from(other).unwrap_or(0)),
        }
    }

    pub fn is_ok(&self) -> bool {
        *self == Self::OK
    }

    /// Category shown in the issues report
    pub fn description(&self) -> String {
        match self {
            CheckOutcome::HostNotFound => "Host not found".to_string(),
            CheckOutcome::Timeout => "Connection timeout".to_string(),
            CheckOutcome::ConnectionError => "Unknown connection error".to_string(),
            CheckOutcome::ParseFailure => "Failed to parse repomd.xml".to_string(),
            CheckOutcome::Http(status) => StatusCode::from_u16(*status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Unknown Status Code")
                .to_string(),
        }
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
