//! In-process topic bus. Subscribers run synchronously on the publisher in
//! registration order; a failing subscriber is isolated and its error
//! recorded, never surfaced to the publishing handler.

use std::collections::BTreeMap;

use contracts::{Event, EventPayload, EventTopic};

use crate::clock::SimClock;

type Callback = Box<dyn FnMut(&Event) -> Result<(), String> + Send>;

struct BusSubscriber {
    topics: Vec<EventTopic>,
    queue: Vec<Event>,
    callback: Option<Callback>,
}

#[derive(Default)]
pub struct EventBus {
    registration_order: Vec<String>,
    subscribers: BTreeMap<String, BusSubscriber>,
    published: u64,
    subscriber_errors: Vec<(String, String)>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.registration_order)
            .field("published", &self.published)
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue-backed subscription: matching events accumulate until drained.
    pub fn subscribe(&mut self, id: impl Into<String>, topics: Vec<EventTopic>) {
        let id = id.into();
        if !self.subscribers.contains_key(&id) {
            self.registration_order.push(id.clone());
        }
        self.subscribers.insert(
            id,
            BusSubscriber {
                topics,
                queue: Vec::new(),
                callback: None,
            },
        );
    }

    /// Callback subscription; errors from the callback are isolated.
    pub fn subscribe_fn(
        &mut self,
        id: impl Into<String>,
        topics: Vec<EventTopic>,
        callback: impl FnMut(&Event) -> Result<(), String> + Send + 'static,
    ) {
        let id = id.into();
        if !self.subscribers.contains_key(&id) {
            self.registration_order.push(id.clone());
        }
        self.subscribers.insert(
            id,
            BusSubscriber {
                topics,
                queue: Vec::new(),
                callback: Some(Box::new(callback)),
            },
        );
    }

    pub fn unsubscribe(&mut self, id: &str) -> bool {
        self.registration_order.retain(|existing| existing != id);
        self.subscribers.remove(id).is_some()
    }

    /// Build the event record and deliver it to every matching subscriber in
    /// registration order. Returns the published event.
    pub fn publish(&mut self, topic: EventTopic, payload: EventPayload, clock: &mut SimClock) -> Event {
        self.published = self.published.saturating_add(1);
        let event = Event {
            id: format!("evt:{:06}", self.published),
            topic,
            sequence: self.published,
            timestamp: clock.next_stamp(),
            payload,
        };

        for id in self.registration_order.clone() {
            let Some(subscriber) = self.subscribers.get_mut(&id) else {
                continue;
            };
            if !subscriber.topics.contains(&topic) {
                continue;
            }
            subscriber.queue.push(event.clone());
            if let Some(callback) = subscriber.callback.as_mut() {
                if let Err(message) = callback(&event) {
                    self.subscriber_errors.push((id.clone(), message));
                }
            }
        }
        event
    }

    pub fn drain(&mut self, id: &str) -> Vec<Event> {
        self.subscribers
            .get_mut(id)
            .map(|subscriber| std::mem::take(&mut subscriber.queue))
            .unwrap_or_default()
    }

    pub fn has_subscriber(&self, id: &str) -> bool {
        self.subscribers.contains_key(id)
    }

    pub fn published_count(&self) -> u64 {
        self.published
    }

    /// Errors collected from callback subscribers since the last take.
    pub fn take_subscriber_errors(&mut self) -> Vec<(String, String)> {
        std::mem::take(&mut self.subscriber_errors)
    }
}
