// Event system: immutable events and the topic hub that fans them out

pub mod event;
pub mod hub;
pub mod types;

pub use event::Event;
pub use hub::{EventCallback, EventHub, Publisher, Subscriber, SubscriberId, Topic, TopicInfo};
pub use types::{tick_millis, topics, TickEvent};
