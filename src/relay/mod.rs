//! Command Relay
//!
//! Lets remote callers issue commands to the one process that is physically
//! connected to the desk. The server accepts a request, merges it over the
//! local configuration and executes it against the shared desk session; the
//! client forwards a command and prints the streamed response lines.

pub mod client;
pub mod server;

use serde::{Deserialize, Serialize};

/// The override keys a remote caller may send, as a single serialized text
/// frame. Only the target height is forwardable; unknown keys are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(default, alias = "move-to", skip_serializing_if = "Option::is_none")]
    pub move_to: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_both_key_spellings() {
        let request: CommandRequest = serde_json::from_str(r#"{"move_to": "sit"}"#).unwrap();
        assert_eq!(request.move_to.as_deref(), Some("sit"));

        let request: CommandRequest = serde_json::from_str(r#"{"move-to": "100"}"#).unwrap();
        assert_eq!(request.move_to.as_deref(), Some("100"));
    }

    #[test]
    fn ignores_unknown_keys() {
        let request: CommandRequest =
            serde_json::from_str(r#"{"move_to": "720", "mac_address": "11:22:33:44:55:66"}"#)
                .unwrap();
        assert_eq!(request.move_to.as_deref(), Some("720"));
    }

    #[test]
    fn serializes_only_present_keys() {
        let json = serde_json::to_string(&CommandRequest {
            move_to: Some("100".to_string()),
        })
        .unwrap();
        assert_eq!(json, r#"{"move_to":"100"}"#);

        let json = serde_json::to_string(&CommandRequest::default()).unwrap();
        assert_eq!(json, "{}");
    }
}
