//! `events.subscribe`: queue-backed subscriptions on the in-process bus.

use serde::Deserialize;
use serde_json::{json, Value};

use contracts::{EventTopic, KernelError};

use super::decode_args;
use crate::KernelApi;

#[derive(Debug, Deserialize)]
struct SubscribeArgs {
    topics: Vec<String>,
}

fn parse_topic(raw: &str) -> Result<EventTopic, KernelError> {
    match raw {
        "world" => Ok(EventTopic::World),
        "combat" => Ok(EventTopic::Combat),
        other => Err(KernelError::validation(format!("unknown topic '{other}'"))),
    }
}

impl KernelApi {
    pub(crate) fn handle_events_subscribe(
        &mut self,
        args: &Value,
    ) -> Result<(String, Value), KernelError> {
        let params: SubscribeArgs = decode_args("events.subscribe", args)?;
        if params.topics.is_empty() {
            return Err(KernelError::validation("subscribe needs at least one topic"));
        }
        let mut topics = Vec::with_capacity(params.topics.len());
        for raw in &params.topics {
            topics.push(parse_topic(raw)?);
        }

        self.subscription_seq += 1;
        let subscription_id = format!("sub:{:06}", self.subscription_seq);
        self.bus.subscribe(subscription_id.clone(), topics);

        let prose = format!(
            "Subscribed {} to topics [{}]; drain the subscription to receive notifications.",
            subscription_id,
            params.topics.join(", "),
        );
        let state = json!({
            "subscription_id": subscription_id,
            "topics": params.topics,
        });
        Ok((prose, state))
    }
}
