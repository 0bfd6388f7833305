use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    domain::Position,
    error::{FrameDecodeError, ServerError},
};

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// One element of the JSON array served by the snapshot endpoint.
///
/// The server may attach bookkeeping fields (timestamp, author); they are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub position: Position,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub value: String,
}

impl SnapshotEntry {
    pub fn new(position: Position, value: impl Into<String>) -> Self {
        Self {
            position,
            value: value.into(),
        }
    }
}

/// A value written to one cell. Used both as the inbound update frame and as the
/// payload of the outbound `NewGridValue` action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellUpdate {
    pub position: Position,
    /// Required on the wire; only an explicit `null` means empty.
    #[serde(deserialize_with = "null_as_empty")]
    pub value: String,
}

impl CellUpdate {
    pub fn new(position: Position, value: impl Into<String>) -> Self {
        Self {
            position,
            value: value.into(),
        }
    }
}

/// Outbound intents. Serialized externally tagged:
/// `{"Select":{..}}` / `{"NewGridValue":{..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientAction {
    Select(Position),
    NewGridValue(CellUpdate),
}

impl ClientAction {
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Select(_) => "select",
            Self::NewGridValue(_) => "new_grid_value",
        }
    }
}

/// What a broadcast envelope carries: a value write or another user's selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BroadcastAction {
    Update(CellUpdate),
    Select(Position),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Error(ServerError),
    Broadcast { who: String, action: BroadcastAction },
    Update(CellUpdate),
}

impl ServerFrame {
    /// Decodes one text frame.
    ///
    /// A frame carrying an `error` key is only ever an error frame, whatever
    /// else it contains. Anything matching none of the variants is rejected.
    pub fn decode(text: &str) -> Result<Self, FrameDecodeError> {
        let raw: serde_json::Value = serde_json::from_str(text)?;
        if raw.get("error").is_some() {
            return Ok(Self::Error(serde_json::from_value(raw)?));
        }
        Ok(serde_json::from_value(raw)?)
    }
}
