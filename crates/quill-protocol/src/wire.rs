//! WebSocket frame types exchanged once a connection is established.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events sent from server to client during and around a turn.
///
/// Exactly one terminal `Done` or `Error` is sent per turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    /// One incremental fragment of generated text.
    Token { response: String },

    /// Usage statistics reported by the inference backend. Opaque to the
    /// relay; forwarded without interpretation.
    Usage { usage: Value },

    /// A structured payload the relay recognized but could not classify.
    Data { data: String },

    /// The turn completed.
    Done,

    /// The turn failed, or an inbound frame could not be handled.
    Error { error: String },
}

/// Commands sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientCommand {
    /// Ask the assistant to answer `prompt` in the context of the
    /// conversation so far.
    Prompt { prompt: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_event_tags() {
        let token = ServerEvent::Token {
            response: "Hel".to_string(),
        };
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, r#"{"type":"token","response":"Hel"}"#);

        let done = serde_json::to_string(&ServerEvent::Done).unwrap();
        assert_eq!(done, r#"{"type":"done"}"#);
    }

    #[test]
    fn test_prompt_parses() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"type":"prompt","prompt":"hi there"}"#).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Prompt {
                prompt: "hi there".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_command_rejected() {
        // Closed union: unrecognized tags are an error, not best-effort.
        assert!(serde_json::from_str::<ClientCommand>(r#"{"type":"subscribe"}"#).is_err());
        assert!(serde_json::from_str::<ClientCommand>(r#"{"prompt":"no tag"}"#).is_err());
    }
}
