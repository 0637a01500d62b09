//! Shared handler state.

use std::sync::Arc;

use actors::{ActorRef, DeliveryPolicy, NotificationTransport, SupervisorMessage};
use db::Store;
use db::repositories::{
    AnalyticsRepository, BroadcastRepository, ClickRepository, RecipientRepository,
};

/// Application state cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub broadcasts: BroadcastRepository,
    pub analytics: AnalyticsRepository,
    pub clicks: ClickRepository,
    pub recipients: RecipientRepository,
    pub supervisor: ActorRef<SupervisorMessage>,
    /// Used directly by single test sends; broadcast runs go through the supervisor.
    pub transport: Arc<dyn NotificationTransport>,
    pub policy: DeliveryPolicy,
}

impl AppState {
    pub fn new(
        store: Store,
        supervisor: ActorRef<SupervisorMessage>,
        transport: Arc<dyn NotificationTransport>,
        policy: DeliveryPolicy,
    ) -> Self {
        Self {
            broadcasts: BroadcastRepository::new(store.clone()),
            analytics: AnalyticsRepository::new(store.clone()),
            clicks: ClickRepository::new(store.clone()),
            recipients: RecipientRepository::new(store),
            supervisor,
            transport,
            policy,
        }
    }
}
