//! Event and close-reason types emitted by transports.

use serde::{Deserialize, Serialize};

/// How a pairing challenge is presented to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingKind {
    /// Scan-a-QR challenge; `data` carries the QR payload string.
    Qr,
    /// Type-a-code challenge; `data` carries the code.
    Code,
}

/// Why the wire connection closed.
///
/// The session state machine keys its entire reconnect policy off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CloseReason {
    /// Credentials rejected. One spurious occurrence is tolerated; two in a
    /// row mean the pairing is really gone.
    Unauthorized,
    /// The platform blocked the account. Terminal.
    Forbidden,
    /// Another device took over this identity.
    Superseded,
    /// The wire layer asked for a planned restart; reconnect promptly.
    RestartRequired,
    /// Anything else (network hiccups, server restarts, ...).
    Other { code: u16 },
}

impl CloseReason {
    /// Map a wire status code to a close reason.
    pub fn from_code(code: u16) -> Self {
        match code {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            440 => Self::Superseded,
            515 => Self::RestartRequired,
            other => Self::Other { code: other },
        }
    }

    /// The wire status code this reason corresponds to.
    pub fn code(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::Superseded => 440,
            Self::RestartRequired => 515,
            Self::Other { code } => *code,
        }
    }
}

/// A typed event from the wire connection.
///
/// Replaces the callback-soup registration style of typical chat SDKs: the
/// session consumes one stream and routes from there.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    /// The platform wants the operator to pair this device.
    PairingChallenge { kind: PairingKind, data: String },

    /// The connection is up and authenticated.
    Established,

    /// The connection dropped.
    Closed { reason: CloseReason },

    /// A message arrived. `from` may be a transport-internal alias rather
    /// than the contact's stable address; `self_sent` marks echoes of our
    /// own messages synced from other devices.
    Inbound {
        from: String,
        text: String,
        self_sent: bool,
    },

    /// The transport learned an alias→address mapping (contact sync).
    ContactSync { alias: String, contact: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_reason_code_round_trip() {
        for code in [401u16, 403, 440, 515, 500, 1006] {
            assert_eq!(CloseReason::from_code(code).code(), code);
        }
    }

    #[test]
    fn test_known_codes_map_to_named_reasons() {
        assert_eq!(CloseReason::from_code(401), CloseReason::Unauthorized);
        assert_eq!(CloseReason::from_code(403), CloseReason::Forbidden);
        assert_eq!(CloseReason::from_code(440), CloseReason::Superseded);
        assert_eq!(CloseReason::from_code(515), CloseReason::RestartRequired);
        assert!(matches!(
            CloseReason::from_code(500),
            CloseReason::Other { code: 500 }
        ));
    }

    #[test]
    fn test_event_serializes_tagged() {
        let event = TransportEvent::Inbound {
            from: "12345@internal".to_string(),
            text: "hi".to_string(),
            self_sent: false,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"inbound""#));
    }
}
