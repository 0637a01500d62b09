//! Repository implementations for store operations.

mod analytics_repo;
mod broadcast_repo;
mod click_repo;
mod recipient_repo;

pub use analytics_repo::{AnalyticsRepository, BroadcastDetails, HistoryEntry};
pub use broadcast_repo::BroadcastRepository;
pub use click_repo::ClickRepository;
pub use recipient_repo::RecipientRepository;
