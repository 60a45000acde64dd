// Network message: an event tagged with its wire verb

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::NetResult;
use crate::events::Event;

/// An immutable event carrying an opaque JSON payload and a `verb`.
///
/// Outbound, the verb is the wire discriminator. Inbound, it is also the name
/// of the dispatcher topic the message is published on.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkMessage {
    verb: String,
    event: Event<Value>,
}

impl NetworkMessage {
    pub fn new(verb: impl Into<String>, data: Value) -> Self {
        Self {
            verb: verb.into(),
            event: Event::new(data),
        }
    }

    /// Build a message from any serializable payload
    pub fn from_serialize<T: Serialize>(verb: impl Into<String>, payload: &T) -> NetResult<Self> {
        Ok(Self::new(verb, serde_json::to_value(payload)?))
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn data(&self) -> &Value {
        self.event.data()
    }

    pub fn timestamp(&self) -> u64 {
        self.event.timestamp()
    }

    pub fn event(&self) -> &Event<Value> {
        &self.event
    }

    /// Decode the payload into a concrete type
    pub fn decode<T: DeserializeOwned>(&self) -> NetResult<T> {
        Ok(T::deserialize(self.event.data())?)
    }
}
