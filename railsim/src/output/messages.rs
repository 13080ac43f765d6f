use crate::output::events::EventName;
use crate::simulation::Simulation;
use log::info;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MessageType {
    Software,
    PlayerWarning,
    Simulation,
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(match self {
            MessageType::Software => 0,
            MessageType::PlayerWarning => 1,
            MessageType::Simulation => 2,
        })
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<MessageType, D::Error> {
        match u8::deserialize(d)? {
            0 => Ok(MessageType::Software),
            1 => Ok(MessageType::PlayerWarning),
            2 => Ok(MessageType::Simulation),
            x => Err(de::Error::custom(format!("invalid message type {}", x))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub msg_type: MessageType,
    pub msg_text: String,
}

/// Messages shown to the player. Saved with the scenario.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MessageLogger {
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl MessageLogger {
    pub fn add(&mut self, msg_text: String, msg_type: MessageType) -> &Message {
        self.messages.push(Message { msg_type, msg_text });
        &self.messages[self.messages.len() - 1]
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Simulation {
    pub fn log_message(&mut self, text: String, msg_type: MessageType) {
        info!("{}", text);
        let value = serde_json::to_value(self.messages.add(text, msg_type)).unwrap_or_default();
        self.emit(EventName::MessageReceived, "", value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logger_document() {
        let mut logger: MessageLogger =
            serde_json::from_str(r#"{"messages": [{"msgType": 0, "msgText": "Loaded"}]}"#).unwrap();
        assert_eq!(logger.messages[0].msg_type, MessageType::Software);
        let m = logger.add("Train S001 entered the area on time".to_string(), MessageType::Simulation);
        assert_eq!(m.msg_type, MessageType::Simulation);
        assert_eq!(logger.len(), 2);
        let v = serde_json::to_value(&logger).unwrap();
        assert_eq!(v["messages"][1]["msgType"], 2);
        assert!(serde_json::from_str::<MessageType>("7").is_err());
    }
}
