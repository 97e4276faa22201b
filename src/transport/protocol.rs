//! JSON message protocol for the assistant's event channel.

use crate::error::{Result, VoxturnError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Commands sent to the assistant server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundCommand {
    /// Microphone opened
    StartListening,
    /// Microphone closed
    StopListening,
    /// One finished utterance as a `data:` URL
    AudioData { audio: String },
    /// Typed user input
    TextInput { text: String },
    ChangeModel { model: String },
    ChangeTtsLang { lang: String },
    /// Stop synthesizing speech for the current response
    CancelSpeech,
    /// Stop generating the current response
    CancelResponse,
}

impl OutboundCommand {
    /// Serialize command to JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize command from JSON string.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Events received from the assistant server.
///
/// Fragment `text` is kept as a raw JSON value: servers send plain strings,
/// JSON-quoted strings, and occasionally non-strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Status {
        message: String,
    },
    /// Recognized text of the user's last utterance
    Transcript {
        text: String,
    },
    /// A complete, non-streamed response
    Response {
        #[serde(default)]
        text: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio: Option<String>,
        #[serde(
            default,
            rename = "lastUserMessage",
            skip_serializing_if = "Option::is_none"
        )]
        last_user_message: Option<String>,
    },
    /// One fragment of a streamed response
    ResponseChunk {
        #[serde(default)]
        text: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio: Option<String>,
    },
    ResponseComplete {
        #[serde(default)]
        cancelled: bool,
        #[serde(
            default,
            rename = "lastUserMessage",
            skip_serializing_if = "Option::is_none"
        )]
        last_user_message: Option<String>,
    },
    Error {
        message: String,
    },
    ListeningStarted,
    ListeningStopped,
    /// Server-initiated interruption of the current response
    Interrupt,
}

impl InboundEvent {
    /// Serialize event to JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize event from JSON string.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Parse one wire line; unknown or malformed lines are a stream parse error.
    pub fn parse_line(line: &str) -> Result<Self> {
        Self::from_json(line.trim()).map_err(|e| VoxturnError::StreamParse {
            message: format!("{} in {:?}", e, truncate(line, 80)),
        })
    }

    /// Wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::Status { .. } => "status",
            InboundEvent::Transcript { .. } => "transcript",
            InboundEvent::Response { .. } => "response",
            InboundEvent::ResponseChunk { .. } => "response_chunk",
            InboundEvent::ResponseComplete { .. } => "response_complete",
            InboundEvent::Error { .. } => "error",
            InboundEvent::ListeningStarted => "listening_started",
            InboundEvent::ListeningStopped => "listening_stopped",
            InboundEvent::Interrupt => "interrupt",
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outbound_json_format_examples() {
        assert_eq!(
            OutboundCommand::StartListening.to_json().unwrap(),
            r#"{"type":"start_listening"}"#
        );
        assert_eq!(
            OutboundCommand::AudioData {
                audio: "data:audio/wav;base64,AA==".to_string()
            }
            .to_json()
            .unwrap(),
            r#"{"type":"audio_data","audio":"data:audio/wav;base64,AA=="}"#
        );
        assert_eq!(
            OutboundCommand::ChangeTtsLang {
                lang: "en".to_string()
            }
            .to_json()
            .unwrap(),
            r#"{"type":"change_tts_lang","lang":"en"}"#
        );
        assert_eq!(
            OutboundCommand::CancelResponse.to_json().unwrap(),
            r#"{"type":"cancel_response"}"#
        );
    }

    #[test]
    fn test_outbound_all_variants_roundtrip() {
        let commands = vec![
            OutboundCommand::StartListening,
            OutboundCommand::StopListening,
            OutboundCommand::AudioData {
                audio: "x".to_string(),
            },
            OutboundCommand::TextInput {
                text: "bonjour \"toi\"\n".to_string(),
            },
            OutboundCommand::ChangeModel {
                model: "mistral".to_string(),
            },
            OutboundCommand::ChangeTtsLang {
                lang: "fr".to_string(),
            },
            OutboundCommand::CancelSpeech,
            OutboundCommand::CancelResponse,
        ];

        for cmd in commands {
            let json = cmd.to_json().expect("should serialize");
            let back = OutboundCommand::from_json(&json).expect("should deserialize");
            assert_eq!(cmd, back, "roundtrip failed for {:?}", cmd);
        }
    }

    #[test]
    fn test_parse_response_chunk_with_audio() {
        let event =
            InboundEvent::parse_line(r#"{"type":"response_chunk","text":"Hello","audio":"AQID"}"#)
                .unwrap();
        assert_eq!(
            event,
            InboundEvent::ResponseChunk {
                text: json!("Hello"),
                audio: Some("AQID".to_string())
            }
        );
        assert_eq!(event.kind(), "response_chunk");
    }

    #[test]
    fn test_parse_response_chunk_without_text() {
        let event = InboundEvent::parse_line(r#"{"type":"response_chunk","audio":"AQID"}"#).unwrap();
        assert_eq!(
            event,
            InboundEvent::ResponseChunk {
                text: Value::Null,
                audio: Some("AQID".to_string())
            }
        );
    }

    #[test]
    fn test_parse_non_string_fragment_text() {
        let event = InboundEvent::parse_line(r#"{"type":"response_chunk","text":12}"#).unwrap();
        assert!(matches!(event, InboundEvent::ResponseChunk { text, .. } if text == json!(12)));
    }

    #[test]
    fn test_parse_response_complete_camel_case_field() {
        let event = InboundEvent::parse_line(
            r#"{"type":"response_complete","cancelled":true,"lastUserMessage":"salut"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            InboundEvent::ResponseComplete {
                cancelled: true,
                last_user_message: Some("salut".to_string())
            }
        );

        let bare = InboundEvent::parse_line(r#"{"type":"response_complete"}"#).unwrap();
        assert_eq!(
            bare,
            InboundEvent::ResponseComplete {
                cancelled: false,
                last_user_message: None
            }
        );
    }

    #[test]
    fn test_parse_unit_events() {
        for (line, kind) in [
            (r#"{"type":"listening_started"}"#, "listening_started"),
            (r#"{"type":"listening_stopped"}"#, "listening_stopped"),
            (r#"{"type":"interrupt"}"#, "interrupt"),
        ] {
            assert_eq!(InboundEvent::parse_line(line).unwrap().kind(), kind);
        }
    }

    #[test]
    fn test_unknown_type_is_stream_parse_error() {
        let result = InboundEvent::parse_line(r#"{"type":"telemetry","x":1}"#);
        assert!(matches!(result, Err(VoxturnError::StreamParse { .. })));
    }

    #[test]
    fn test_malformed_line_is_stream_parse_error() {
        let result = InboundEvent::parse_line("{not json");
        match result {
            Err(VoxturnError::StreamParse { message }) => {
                assert!(message.contains("{not json"), "got {}", message);
            }
            other => panic!("Expected StreamParse, got {:?}", other),
        }
    }

    #[test]
    fn test_response_serializes_camel_case_field() {
        let event = InboundEvent::Response {
            text: json!("ok"),
            audio: None,
            last_user_message: Some("q".to_string()),
        };
        let json = event.to_json().unwrap();
        assert!(json.contains(r#""lastUserMessage":"q""#), "got {}", json);
        assert!(!json.contains("audio"));
        assert_eq!(InboundEvent::from_json(&json).unwrap(), event);
    }

    #[test]
    fn test_truncate_long_lines() {
        let long = "x".repeat(200);
        assert_eq!(truncate(&long, 10).chars().count(), 11);
        assert_eq!(truncate("short", 10), "short");
    }
}
