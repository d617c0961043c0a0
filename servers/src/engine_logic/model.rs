use lib_engine::forecast::PredictionResult;
use lib_engine::readings::Reading;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    pub set_mode: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerMessage {
    pub r#type: String,
    pub reading: Option<Reading>,
    pub forecast: Option<PredictionResult>,
    pub mode: Option<String>,
    pub error: Option<String>,
    pub ack: Option<bool>,
}

impl ServerMessage {
    fn empty(kind: &str) -> Self {
        Self {
            r#type: kind.to_string(),
            reading: None,
            forecast: None,
            mode: None,
            error: None,
            ack: None,
        }
    }

    pub fn reading(reading: Reading) -> Self {
        Self {
            reading: Some(reading),
            ..Self::empty("reading")
        }
    }

    pub fn forecast(forecast: PredictionResult) -> Self {
        Self {
            forecast: Some(forecast),
            ..Self::empty("forecast")
        }
    }

    pub fn mode_changed(mode: &str) -> Self {
        Self {
            mode: Some(mode.to_string()),
            ..Self::empty("mode")
        }
    }

    pub fn ack() -> Self {
        Self {
            ack: Some(true),
            ..Self::empty("ack")
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::empty("error")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_set_mode_parses() {
        let msg: ClientMessage = serde_json::from_str(r#"{ "set_mode": "replay" }"#).unwrap();
        assert_eq!(msg.set_mode.as_deref(), Some("replay"));
    }

    #[test]
    fn server_frames_carry_their_kind() {
        let frame = ServerMessage::mode_changed("live");
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"mode""#));
        assert!(json.contains(r#""mode":"live""#));
    }
}
