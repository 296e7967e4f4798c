use serde::{Deserialize, Serialize};

/// Outbound control message sent to the backend over the case connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Must be the first command on every connection.
    #[serde(rename = "subscribe_case")]
    Subscribe { case_id: String },
    Pause,
    Resume,
    Stop,
    Feedback {
        feedback: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        approve: Option<bool>,
    },
}

impl Command {
    /// Creates a subscribe command for a case.
    pub fn subscribe(case_id: impl Into<String>) -> Self {
        Self::Subscribe {
            case_id: case_id.into(),
        }
    }

    /// Returns the wire tag of this command.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => "subscribe_case",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::Feedback { .. } => "feedback",
        }
    }
}
