//! Wire codec for the accessory server protocol.
//!
//! Requests are single ASCII lines of the form `"<opcode>|<payload>"`.
//! Responses are either a decimal result code ([`SimpleResult`]) or a
//! six-field pipe-delimited accessory record. Payloads are trusted not to
//! contain the `|` delimiter: the protocol has no escaping, an inherited
//! constraint of the deployed server.

use crate::accessory::Accessory;
use crate::ipc::IpcError;

/// Field separator used throughout the protocol.
pub const FIELD_SEP: char = '|';

/// Number of identity fields in an accessory record.
pub const RECORD_FIELDS: usize = 6;

/// Fixed message buffer size of the deployed server.
pub const MAX_MSG_LEN: usize = 1542;

/// Request opcodes understood by the accessory server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Fetch the attached accessory's identity record.
    GetAccessoryInfo,
    /// Ask the server to run the host permission-grant flow.
    RequestPermission,
    /// Query whether the calling application already holds permission.
    HasPermission,
}

impl Request {
    /// Numeric opcode sent on the wire.
    pub fn code(self) -> i32 {
        match self {
            Request::GetAccessoryInfo => 20,
            Request::RequestPermission => 21,
            Request::HasPermission => 22,
        }
    }
}

/// Opcodes pushed by the server on the notification channel.
///
/// The numbering mirrors the server's permission-popup button events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    PermissionGranted,
    PermissionDenied,
}

impl Notification {
    /// Decode a pushed notification message.
    ///
    /// Returns `None` for unrecognized opcodes and for unparseable text;
    /// both are dropped by the dispatcher without reaching the callback.
    pub fn from_wire(message: &str) -> Option<Self> {
        match message.trim_end_matches('\0').trim().parse::<i32>() {
            Ok(3) => Some(Notification::PermissionGranted),
            Ok(4) => Some(Notification::PermissionDenied),
            _ => None,
        }
    }
}

/// Three-valued result code used for simple responses and acknowledgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleResult {
    Error,
    Fail,
    Success,
}

impl SimpleResult {
    /// Numeric code written on the wire.
    pub fn code(self) -> i32 {
        match self {
            SimpleResult::Error => 0,
            SimpleResult::Fail => 1,
            SimpleResult::Success => 2,
        }
    }

    /// Parse a decimal result code.
    ///
    /// Anything unparseable decodes as [`SimpleResult::Error`], matching
    /// the `atoi` semantics the server protocol was built around.
    pub fn from_wire(reply: &str) -> Self {
        match reply.trim_end_matches('\0').trim().parse::<i32>() {
            Ok(2) => SimpleResult::Success,
            Ok(1) => SimpleResult::Fail,
            _ => SimpleResult::Error,
        }
    }
}

/// Encode a request line: `"<opcode>|<payload>"`, or `"<opcode>|"` for an
/// empty payload.
pub fn encode_request(opcode: i32, payload: &str) -> String {
    format!("{opcode}{FIELD_SEP}{payload}")
}

/// Decode a six-field accessory record.
///
/// The line must contain exactly five separators; fields are consumed
/// left to right and the sixth runs to end of string. Any other separator
/// count is a protocol error, not a partial record.
pub fn decode_record(line: &str) -> Result<Accessory, IpcError> {
    let line = line.trim_end_matches('\0');
    let found = line.matches(FIELD_SEP).count();
    if found != RECORD_FIELDS - 1 {
        return Err(IpcError::MalformedRecord { found });
    }

    let mut fields = line.splitn(RECORD_FIELDS, FIELD_SEP);
    let mut next = || fields.next().unwrap_or_default().to_string();
    Ok(Accessory::new(next(), next(), next(), next(), next(), next()))
}
