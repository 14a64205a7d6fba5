use serde::{Deserialize, Serialize};

/// Command string that forces a waiting worker to activate.
pub const SKIP_WAITING: &str = "SKIP_WAITING";

/// Out-of-band message posted to a worker, e.g. from an "update available" prompt.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ControlMessage {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Commands a worker understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SkipWaiting,
}

impl ControlMessage {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: Some(kind.to_string()),
        }
    }

    pub fn skip_waiting() -> Self {
        Self::new(SKIP_WAITING)
    }

    /// Parse a JSON message. Anything that is not an object with an optional
    /// string `type` yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    pub fn command(&self) -> Option<Command> {
        match self.kind.as_deref() {
            Some(SKIP_WAITING) => Some(Command::SkipWaiting),
            _ => None,
        }
    }
}
