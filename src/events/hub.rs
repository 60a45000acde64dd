// Topic-based publish/subscribe hub
// Topics are created lazily by name on first advertise or subscribe and live
// as long as the hub. Publishing is synchronous, in subscription order, over
// a snapshot of the subscriber list taken when the publish starts.

use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::Serialize;
use std::any::{type_name, Any};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tracing::error;
use ulid::Ulid;

use crate::error::{HubError, HubResult};

/// Callback signature for subscribers
pub type EventCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Unique identity of one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(Ulid);

impl SubscriberId {
    fn new() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Subscription<T> {
    id: SubscriberId,
    callback: EventCallback<T>,
}

/// A named channel holding the subscribers of one payload type.
///
/// Topics are only created through `EventHub`; callers reach them through a
/// `Publisher` and only get read access.
pub struct Topic<T> {
    name: String,
    subscribers: ArcSwap<Vec<Arc<Subscription<T>>>>,
}

impl<T: 'static> Topic<T> {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Topic name, used as its key in the hub
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load().len()
    }

    /// Current subscribers in notification order (a copy, not a live view)
    pub fn subscribers(&self) -> Vec<SubscriberId> {
        self.subscribers.load().iter().map(|sub| sub.id).collect()
    }

    fn add_subscriber(&self, callback: EventCallback<T>) -> SubscriberId {
        let subscription = Arc::new(Subscription {
            id: SubscriberId::new(),
            callback,
        });
        let id = subscription.id;

        self.subscribers.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(Arc::clone(&subscription));
            next
        });

        id
    }

    fn remove_subscriber(&self, id: SubscriberId) -> bool {
        let mut removed = false;
        self.subscribers.rcu(|current| {
            let next: Vec<_> = current.iter().filter(|sub| sub.id != id).cloned().collect();
            removed = next.len() != current.len();
            next
        });
        removed
    }

    fn publish(&self, payload: &T) -> usize {
        // Subscribers added or removed from inside a callback only see the next publish
        let snapshot = self.subscribers.load_full();
        let mut delivered = 0;

        for subscription in snapshot.iter() {
            let callback = &subscription.callback;
            match panic::catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                Ok(()) => delivered += 1,
                Err(cause) => {
                    error!(
                        topic = %self.name,
                        subscriber = %subscription.id,
                        "Subscriber panicked: {}",
                        panic_message(cause.as_ref())
                    );
                }
            }
        }

        delivered
    }
}

impl<T> fmt::Debug for Topic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("payload", &type_name::<T>())
            .field("subscribers", &self.subscribers.load().len())
            .finish()
    }
}

/// Write-side handle of a topic
///
/// Every `advertise` of the same name returns a handle to the same topic;
/// handles compare equal by topic identity.
pub struct Publisher<T> {
    topic: Arc<Topic<T>>,
}

impl<T: 'static> Publisher<T> {
    /// Deliver `payload` to every current subscriber, in subscription order.
    ///
    /// All subscribers receive a reference to the same value. A panicking
    /// subscriber is logged and skipped. Returns the number of subscribers
    /// that completed normally.
    pub fn publish(&self, payload: T) -> usize {
        self.topic.publish(&payload)
    }

    /// The topic this publisher writes to
    pub fn topic(&self) -> &Topic<T> {
        &self.topic
    }

    /// True when both handles point at the same topic
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.topic, &other.topic)
    }
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            topic: Arc::clone(&self.topic),
        }
    }
}

impl<T> PartialEq for Publisher<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.topic, &other.topic)
    }
}

impl<T> Eq for Publisher<T> {}

impl<T> fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("topic", &self.topic.name)
            .finish()
    }
}

/// Handle to one registered callback
///
/// Dropping the handle does not unsubscribe; the callback stays registered
/// until `unsubscribe` is called or the topic goes away with its hub.
pub struct Subscriber<T> {
    id: SubscriberId,
    topic_name: String,
    topic: Weak<Topic<T>>,
}

impl<T: 'static> Subscriber<T> {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn topic_name(&self) -> &str {
        &self.topic_name
    }

    /// Detach the callback from its topic.
    ///
    /// Returns `true` the first time; later calls are no-ops returning `false`.
    pub fn unsubscribe(&self) -> bool {
        match self.topic.upgrade() {
            Some(topic) => topic.remove_subscriber(self.id),
            None => false,
        }
    }

    /// Whether the callback is still registered
    pub fn is_subscribed(&self) -> bool {
        self.topic
            .upgrade()
            .map(|topic| topic.subscribers.load().iter().any(|sub| sub.id == self.id))
            .unwrap_or(false)
    }
}

impl<T> fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("topic", &self.topic_name)
            .finish()
    }
}

/// Read-only description of a topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicInfo {
    pub name: String,
    pub payload_type: &'static str,
    pub subscriber_count: usize,
}

/// Type-erased view of a `Topic<T>` so topics of different payload types share one map
trait ErasedTopic: Send + Sync {
    fn info(&self) -> TopicInfo;
    fn payload_type(&self) -> &'static str;
    fn subscriber_ids(&self) -> Vec<SubscriberId>;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: 'static> ErasedTopic for Topic<T> {
    fn info(&self) -> TopicInfo {
        TopicInfo {
            name: self.name.clone(),
            payload_type: type_name::<T>(),
            subscriber_count: self.subscriber_count(),
        }
    }

    fn payload_type(&self) -> &'static str {
        type_name::<T>()
    }

    fn subscriber_ids(&self) -> Vec<SubscriberId> {
        self.subscribers()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Owns every topic and hands out publishers and subscribers.
///
/// The hub is the only type in the event system that callers construct
/// themselves. All methods take `&self`, so one hub can be shared behind an
/// `Arc` with callbacks that publish or subscribe re-entrantly.
pub struct EventHub {
    topics: DashMap<String, Arc<dyn ErasedTopic>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
        }
    }

    /// Publisher for `topic_name`, creating the topic on first use
    pub fn advertise<T: 'static>(&self, topic_name: &str) -> HubResult<Publisher<T>> {
        let topic = self.topic::<T>(topic_name)?;
        Ok(Publisher { topic })
    }

    /// Register `callback` on `topic_name`, creating the topic on first use.
    ///
    /// Every call adds a new subscriber, even for an identical callback.
    pub fn subscribe<T, F>(&self, topic_name: &str, callback: F) -> HubResult<Subscriber<T>>
    where
        T: 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let topic = self.topic::<T>(topic_name)?;
        let id = topic.add_subscriber(Arc::new(callback));

        debug_log!("EventHub: subscriber {} added to '{}'", id, topic_name);

        Ok(Subscriber {
            id,
            topic_name: topic_name.to_string(),
            topic: Arc::downgrade(&topic),
        })
    }

    /// Snapshot of every topic (no ordering promised)
    pub fn topics(&self) -> Vec<TopicInfo> {
        self.topics.iter().map(|entry| entry.value().info()).collect()
    }

    /// Subscribers of one topic in notification order, empty for unknown names
    pub fn subscribers(&self, topic_name: &str) -> Vec<SubscriberId> {
        self.topics
            .get(topic_name)
            .map(|entry| entry.value().subscriber_ids())
            .unwrap_or_default()
    }

    pub fn has_topic(&self, topic_name: &str) -> bool {
        self.topics.contains_key(topic_name)
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    fn topic<T: 'static>(&self, topic_name: &str) -> HubResult<Arc<Topic<T>>> {
        let erased = match self.topics.get(topic_name) {
            Some(entry) => Arc::clone(entry.value()),
            None => {
                // First registration wins if two callers race on the same name
                let entry = self
                    .topics
                    .entry(topic_name.to_string())
                    .or_insert_with(|| {
                        debug_log!("EventHub: created topic '{}'", topic_name);
                        Arc::new(Topic::<T>::new(topic_name)) as Arc<dyn ErasedTopic>
                    });
                Arc::clone(entry.value())
            }
        };

        let existing = erased.payload_type();
        erased
            .into_any()
            .downcast::<Topic<T>>()
            .map_err(|_| HubError::TopicTypeMismatch {
                topic: topic_name.to_string(),
                existing,
                requested: type_name::<T>(),
            })
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.topics.iter().map(|entry| entry.key().clone()).collect();
        f.debug_struct("EventHub").field("topics", &names).finish()
    }
}

fn panic_message(cause: &(dyn Any + Send)) -> String {
    if let Some(message) = cause.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = cause.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
