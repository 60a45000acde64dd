// Immutable event wrapper passed through the event hub
// The payload is shared read-only: every holder sees the same allocation and
// no API hands out a mutable alias.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// An immutable value with the time it was created.
///
/// Cloning an event shares the payload instead of copying it, so a payload
/// fanned out to many subscribers is one allocation that none of them can
/// change:
///
/// ```compile_fail
/// use prism_engine::events::Event;
///
/// let event = Event::new(vec![1, 2, 3]);
/// event.data().push(4);
/// ```
///
/// The same holds at any depth:
///
/// ```compile_fail
/// use prism_engine::events::Event;
///
/// struct Inner { y: u32 }
/// struct Outer { x: Inner }
///
/// let event = Event::new(Outer { x: Inner { y: 1 } });
/// event.data().x.y = 3;
/// ```
///
/// Payloads with interior mutability (`Mutex`, atomics) opt out of this
/// guarantee by their own choice of type.
pub struct Event<T> {
    timestamp: u64,
    data: Arc<T>,
}

impl<T> Event<T> {
    /// Wrap a payload, stamping it with the current time
    pub fn new(data: T) -> Self {
        Self {
            timestamp: current_timestamp_ms(),
            data: Arc::new(data),
        }
    }

    /// Creation time in milliseconds since the Unix epoch
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Read-only view of the payload
    pub fn data(&self) -> &T {
        &self.data
    }

    /// True when both events wrap the very same payload allocation
    pub fn shares_payload(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            timestamp: self.timestamp,
            data: Arc::clone(&self.data),
        }
    }
}

/// An event built without data carries the payload type's empty value
impl<T: Default> Default for Event<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> AsRef<T> for Event<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T: fmt::Debug> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("timestamp", &self.timestamp)
            .field("data", &self.data)
            .finish()
    }
}

impl<T: PartialEq> PartialEq for Event<T> {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp && self.data == other.data
    }
}

/// Get current Unix timestamp in milliseconds
fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
