//! Controller list decoding
//!
//! The hub answers `list;` with a bare JSON array such as
//! `[{"name":"Living Room"},{"name":"Bedroom"}]`. There is no length prefix
//! or delimiter, so a reply may arrive split across several reads.

use blinds_core::prelude::*;
use blinds_core::{ControllerDescriptor, ControllerList};

/// Why a list payload could not be turned into a [`ControllerList`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Not a JSON array of `{ "name": string }` records
    #[error("Failed to parse controllers list: {0}")]
    Malformed(String),

    /// Well-formed, but the hub reported no controllers
    #[error("No controllers found")]
    Empty,
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Error::protocol(err.to_string())
    }
}

/// Result of looking at a possibly partial payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// The payload is a complete document (or is definitely broken)
    Complete(std::result::Result<ControllerList, DecodeError>),
    /// The payload is a valid prefix; wait for more bytes
    Incomplete,
}

/// Decode a complete list response.
///
/// A truncated document is reported as [`DecodeError::Malformed`].
pub fn decode_controller_list(payload: &[u8]) -> std::result::Result<ControllerList, DecodeError> {
    match scan_controller_list(payload) {
        DecodeOutcome::Complete(result) => result,
        DecodeOutcome::Incomplete => Err(DecodeError::Malformed(
            "unexpected end of controllers list".to_string(),
        )),
    }
}

/// Decode a list response that may still be arriving.
pub fn scan_controller_list(payload: &[u8]) -> DecodeOutcome {
    let text = match std::str::from_utf8(payload) {
        Ok(text) => text,
        // error_len() == None: a multi-byte sequence was cut at the end
        Err(e) if e.error_len().is_none() => return DecodeOutcome::Incomplete,
        Err(e) => return DecodeOutcome::Complete(Err(DecodeError::Malformed(e.to_string()))),
    };

    let records: Vec<ControllerDescriptor> = match serde_json::from_str(text) {
        Ok(records) => records,
        Err(e) if e.is_eof() => {
            trace!("controller list incomplete after {} bytes", payload.len());
            return DecodeOutcome::Incomplete;
        }
        Err(e) => return DecodeOutcome::Complete(Err(DecodeError::Malformed(e.to_string()))),
    };

    if records.is_empty() {
        return DecodeOutcome::Complete(Err(DecodeError::Empty));
    }

    for controller in records.iter().filter(|c| !c.is_addressable()) {
        warn!(
            "Controller {:?} cannot be addressed by commands (contains delimiters)",
            controller.name
        );
    }

    debug!("Found {} controllers", records.len());
    DecodeOutcome::Complete(Ok(ControllerList::new(records)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_two_controllers_in_order() {
        let payload = br#"[{"name":"Living Room"},{"name":"Bedroom"}]"#;
        let list = decode_controller_list(payload).unwrap();
        assert_eq!(list.names(), vec!["Living Room", "Bedroom"]);
    }

    #[test]
    fn test_decode_preserves_length_and_order() {
        let names = ["Attic", "Kitchen", "Office", "Nursery", "Garage"];
        let payload = serde_json::to_string(
            &names
                .iter()
                .map(|n| serde_json::json!({ "name": n }))
                .collect::<Vec<_>>(),
        )
        .unwrap();

        let list = decode_controller_list(payload.as_bytes()).unwrap();
        assert_eq!(list.len(), names.len());
        assert_eq!(list.names(), names.to_vec());
    }

    #[test]
    fn test_decode_ignores_extra_fields() {
        let payload = br#"[
            {"name": "Kitchen", "channel": 3, "position": 40},
            {"id": 7, "name": "Office"}
        ]"#;
        let list = decode_controller_list(payload).unwrap();
        assert_eq!(list.names(), vec!["Kitchen", "Office"]);
    }

    #[test]
    fn test_decode_tolerates_trailing_newline() {
        let list = decode_controller_list(b"[{\"name\":\"Kitchen\"}]\r\n").unwrap();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_decode_empty_array() {
        assert_eq!(decode_controller_list(b"[]"), Err(DecodeError::Empty));
        assert_eq!(decode_controller_list(b"  [ ]\n"), Err(DecodeError::Empty));
    }

    #[test]
    fn test_decode_non_json_is_malformed() {
        let err = decode_controller_list(b"OK").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_decode_object_is_malformed() {
        let err = decode_controller_list(br#"{"name":"Kitchen"}"#).unwrap_err();
        match err {
            DecodeError::Malformed(message) => assert!(!message.is_empty()),
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_missing_name_is_malformed() {
        let err = decode_controller_list(br#"[{"id":1}]"#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_decode_non_string_name_is_malformed() {
        let err = decode_controller_list(br#"[{"name":42}]"#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_decode_invalid_utf8_is_malformed() {
        let err = decode_controller_list(&[b'[', 0xFF, b']']).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_decode_truncated_is_malformed() {
        let err = decode_controller_list(br#"[{"name":"Kit"#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_scan_truncated_is_incomplete() {
        assert_eq!(
            scan_controller_list(br#"[{"name":"Kit"#),
            DecodeOutcome::Incomplete
        );
        assert_eq!(scan_controller_list(b""), DecodeOutcome::Incomplete);
    }

    #[test]
    fn test_scan_split_utf8_is_incomplete() {
        // "é" is 0xC3 0xA9; cut after the first byte
        let payload = [b'[', b'{', b'"', b'n', b'a', b'm', b'e', b'"', b':', b'"', 0xC3];
        assert_eq!(scan_controller_list(&payload), DecodeOutcome::Incomplete);
    }

    #[test]
    fn test_scan_garbage_is_complete_error() {
        assert!(matches!(
            scan_controller_list(b"ERR unknown command"),
            DecodeOutcome::Complete(Err(DecodeError::Malformed(_)))
        ));
    }

    #[test]
    fn test_decode_keeps_unaddressable_names() {
        let list = decode_controller_list(br#"[{"name":"Living Room"}]"#).unwrap();
        assert!(!list.get(0).unwrap().is_addressable());
    }

    #[test]
    fn test_decode_error_into_protocol_error() {
        let err: Error = DecodeError::Empty.into();
        assert!(matches!(err, Error::Protocol { .. }));
        assert!(err.to_string().contains("No controllers found"));
    }
}
