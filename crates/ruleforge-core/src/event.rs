//! Structured build events, delivered to any number of subscribers with
//! monotonic per-rule ordering.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::digest::Digest;
use crate::target::TargetLabel;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BuildEvent {
    BuildStarted {
        targets: Vec<TargetLabel>,
        timestamp_millis: u64,
    },
    BuildFinished {
        success: bool,
        timestamp_millis: u64,
    },
    RuleStarted {
        target: TargetLabel,
        timestamp_millis: u64,
    },
    RuleFinished {
        target: TargetLabel,
        success: bool,
        timestamp_millis: u64,
    },
    CacheChecked {
        target: TargetLabel,
        rule_key: Digest,
        hit: bool,
        timestamp_millis: u64,
    },
    CacheStored {
        target: TargetLabel,
        rule_key: Digest,
        timestamp_millis: u64,
    },
    StepStarted {
        target: TargetLabel,
        step_name: String,
        timestamp_millis: u64,
    },
    StepFinished {
        target: TargetLabel,
        step_name: String,
        success: bool,
        timestamp_millis: u64,
    },
}

/// Milliseconds since the Unix epoch, used to stamp every posted event.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A thread-safe multi-producer sink. Producers post events with monotonic
/// timestamps; any number of consumers may subscribe independently.
///
/// Backed by a broadcast channel: a slow or absent subscriber never blocks
/// producers, it only misses events that overflow the ring buffer.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BuildEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.sender.subscribe()
    }

    /// Posts an event. Returns without error even if there are currently no
    /// subscribers - event delivery is best-effort for observers, never a
    /// build dependency.
    pub fn post(&self, event: BuildEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_posted_events() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let target = TargetLabel::unconfigured("root", "foo", "bar");
        bus.post(BuildEvent::RuleStarted {
            target: target.clone(),
            timestamp_millis: now_millis(),
        });
        let event = rx.recv().await.unwrap();
        match event {
            BuildEvent::RuleStarted { target: t, .. } => assert_eq!(t, target),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn post_without_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.post(BuildEvent::BuildFinished {
            success: true,
            timestamp_millis: now_millis(),
        });
    }
}
