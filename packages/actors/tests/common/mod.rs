#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actors::{
    DeliveryPolicy, DeliveryWorker, Notification, NotificationTransport, SendError, SendFuture,
};
use broadcast_core::{BroadcastMessage, RecipientId};
use db::repositories::{AnalyticsRepository, BroadcastRepository};
use db::{MemoryStore, Store};
use tokio::time::Instant;

/// What the scripted transport does for one attempt.
#[derive(Debug, Clone)]
pub enum Step {
    Deliver,
    Reject(&'static str),
    Fail(&'static str),
    Hang,
    Panic(&'static str),
}

/// Transport that replays a per-recipient script and records every attempt.
/// Recipients without a script (or past its end) are delivered.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<HashMap<u64, VecDeque<Step>>>,
    calls: Mutex<Vec<(Instant, Notification)>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(self: &Arc<Self>, fid: u64, steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        self.script
            .lock()
            .unwrap()
            .insert(fid, steps.into_iter().collect());
        self.clone()
    }

    pub fn calls(&self) -> Vec<Notification> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, n)| n.clone())
            .collect()
    }

    /// Time between each attempt and the one before it.
    pub fn gaps(&self) -> Vec<Duration> {
        let calls = self.calls.lock().unwrap();
        calls.windows(2).map(|w| w[1].0 - w[0].0).collect()
    }

    pub fn attempts_for(&self, fid: u64) -> usize {
        self.calls()
            .iter()
            .filter(|n| n.recipient == RecipientId(fid))
            .count()
    }
}

impl NotificationTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    fn send<'a>(&'a self, notification: &'a Notification) -> SendFuture<'a> {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), notification.clone()));
        let step = self
            .script
            .lock()
            .unwrap()
            .get_mut(&notification.recipient.0)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::Deliver);

        Box::pin(async move {
            match step {
                Step::Deliver => Ok(()),
                Step::Reject(detail) => Err(SendError::Rejected(detail.to_string())),
                Step::Fail(detail) => Err(SendError::Transient(detail.to_string())),
                Step::Hang => std::future::pending().await,
                Step::Panic(reason) => panic!("{}", reason),
            }
        })
    }
}

pub struct Harness {
    pub store: Store,
    pub broadcasts: BroadcastRepository,
    pub analytics: AnalyticsRepository,
}

pub fn harness() -> Harness {
    let store: Store = Arc::new(MemoryStore::new());
    Harness {
        broadcasts: BroadcastRepository::new(store.clone()),
        analytics: AnalyticsRepository::new(store.clone()),
        store,
    }
}

impl Harness {
    pub fn worker(&self, transport: Arc<dyn NotificationTransport>) -> DeliveryWorker {
        self.worker_with(transport, DeliveryPolicy::immediate())
    }

    pub fn worker_with(
        &self,
        transport: Arc<dyn NotificationTransport>,
        policy: DeliveryPolicy,
    ) -> DeliveryWorker {
        DeliveryWorker::new(self.broadcasts.clone(), transport, policy)
    }
}

pub fn message() -> BroadcastMessage {
    BroadcastMessage::new("T", "B", "https://x")
}

pub fn fids(ids: &[u64]) -> Vec<RecipientId> {
    ids.iter().copied().map(RecipientId).collect()
}

/// Assert two virtual-clock durations agree to within a timer tick.
pub fn assert_near(actual: Duration, expected: Duration) {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(
        diff <= Duration::from_millis(5),
        "expected about {:?}, got {:?}",
        expected,
        actual
    );
}
