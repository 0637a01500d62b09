//! Supervisor actor for worker runs, events and the processing sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use broadcast_core::{BroadcastEvent, BroadcastId};
use chrono::Utc;
use db::repositories::BroadcastRepository;
use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, SupervisionEvent};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::messages::{SupervisorMessage, WorkerError, WorkerMessage};
use crate::policy::DeliveryPolicy;
use crate::transport::NotificationTransport;
use crate::worker::{DeliveryWorker, WorkerReport};
use crate::worker_actor::{WorkerActor, WorkerArgs};

/// How stranded processing entries are recovered.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    /// Entries claimed longer ago than this go back to pending.
    pub lease: Duration,
    /// Time between sweeps.
    pub interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(300),
            interval: Duration::from_secs(60),
        }
    }
}

impl SweepConfig {
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Supervisor arguments.
pub struct SupervisorArgs {
    pub broadcasts: BroadcastRepository,
    pub transport: Arc<dyn NotificationTransport>,
    pub policy: DeliveryPolicy,
    pub sweep: SweepConfig,
}

/// State for the supervisor actor.
pub struct SupervisorState {
    broadcasts: BroadcastRepository,
    /// Template cloned into every worker run.
    worker: DeliveryWorker,
    sweep: SweepConfig,
    /// Event broadcaster.
    event_tx: broadcast::Sender<BroadcastEvent>,
    /// Cancellation handles of running workers.
    running: HashMap<ActorId, CancellationToken>,
    /// Set once shutdown is requested; the supervisor stops when the last
    /// worker finishes.
    stopping: bool,
}

impl SupervisorState {
    fn new(args: SupervisorArgs) -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        let worker = DeliveryWorker::new(args.broadcasts.clone(), args.transport, args.policy)
            .with_events(event_tx.clone());
        Self {
            broadcasts: args.broadcasts,
            worker,
            sweep: args.sweep,
            event_tx,
            running: HashMap::new(),
            stopping: false,
        }
    }

    async fn sweep_stale(&self) -> Result<(), db::DbError> {
        let now = Utc::now();
        for id in self.broadcasts.active_ids().await? {
            let count = self
                .broadcasts
                .requeue_stale(id, self.sweep.lease, now)
                .await?;
            if count > 0 {
                let _ = self.event_tx.send(BroadcastEvent::Requeued {
                    broadcast_id: id,
                    count,
                    timestamp: now,
                });
            }
        }
        Ok(())
    }
}

async fn spawn_worker(
    myself: &ActorRef<SupervisorMessage>,
    state: &mut SupervisorState,
    broadcast_id: BroadcastId,
) -> Result<ActorRef<WorkerMessage>, ActorProcessingErr> {
    let cancel = CancellationToken::new();
    let args = WorkerArgs {
        worker: state.worker.clone(),
        broadcast_id,
        cancel: cancel.clone(),
    };

    let (actor, _handle) = Actor::spawn_linked(None, WorkerActor, args, myself.get_cell())
        .await
        .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn worker: {}", e)))?;

    state.running.insert(actor.get_id(), cancel);
    Ok(actor)
}

/// Supervisor actor that owns worker runs and the event channel.
pub struct Supervisor;

impl Actor for Supervisor {
    type Msg = SupervisorMessage;
    type State = SupervisorState;
    type Arguments = SupervisorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting broadcast supervisor");
        let state = SupervisorState::new(args);

        // Start periodic sweep; a zero interval disables it
        let interval = state.sweep.interval;
        let myself_clone = myself.clone();
        if interval.is_zero() {
            return Ok(state);
        }
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if myself_clone.send_message(SupervisorMessage::Tick).is_err() {
                    break;
                }
            }
        });

        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::RunWorker {
                broadcast_id,
                reply,
            } => {
                if state.stopping {
                    let stopping = WorkerError::Actor("Supervisor is shutting down".into());
                    let _ = reply.send(Err(stopping));
                    return Ok(());
                }

                match spawn_worker(&myself, state, broadcast_id).await {
                    Ok(worker) => {
                        if let Err(e) = worker.send_message(WorkerMessage::Drain { reply }) {
                            tracing::error!("Failed to start worker run: {}", e);
                        }
                    }
                    Err(e) => {
                        let _ = reply.send(Err(WorkerError::Actor(e.to_string())));
                    }
                }
            }

            SupervisorMessage::Publish { event } => {
                tracing::debug!("{}", event.description());
                let _ = state.event_tx.send(event);
            }

            SupervisorMessage::Subscribe { sender } => {
                // Forward from our channel to the subscriber's
                let mut rx = state.event_tx.subscribe();
                tokio::spawn(async move {
                    loop {
                        match rx.recv().await {
                            Ok(event) => {
                                if sender.send(event).is_err() {
                                    break;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!("Event subscriber lagged by {} events", skipped);
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                });
            }

            SupervisorMessage::RunningWorkers { reply } => {
                let _ = reply.send(state.running.len());
            }

            SupervisorMessage::Shutdown => {
                tracing::info!(running = state.running.len(), "Shutting down supervisor");
                state.stopping = true;
                for cancel in state.running.values() {
                    cancel.cancel();
                }
                if state.running.is_empty() {
                    myself.stop(None);
                }
            }

            SupervisorMessage::Tick => {
                if let Err(e) = state.sweep_stale().await {
                    tracing::warn!("Processing sweep failed: {}", e);
                }
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorTerminated(cell, _, _) => {
                state.running.remove(&cell.get_id());
            }
            SupervisionEvent::ActorFailed(cell, error) => {
                tracing::warn!("Worker {} failed: {}", cell.get_id(), error);
                state.running.remove(&cell.get_id());
            }
            _ => {}
        }

        if state.stopping && state.running.is_empty() {
            myself.stop(None);
        }
        Ok(())
    }
}

/// Start the supervisor.
pub async fn start_supervisor(
    args: SupervisorArgs,
) -> Result<(ActorRef<SupervisorMessage>, tokio::task::JoinHandle<()>), ractor::SpawnErr> {
    Actor::spawn(None, Supervisor, args).await
}

/// Ask the supervisor for a worker run and wait for its report.
pub async fn run_worker(
    supervisor: &ActorRef<SupervisorMessage>,
    broadcast_id: BroadcastId,
) -> Result<WorkerReport, WorkerError> {
    let result = ractor::rpc::call(
        supervisor,
        |reply| SupervisorMessage::RunWorker {
            broadcast_id,
            reply,
        },
        None,
    )
    .await
    .map_err(|e| WorkerError::Actor(e.to_string()))?;

    match result {
        ractor::rpc::CallResult::Success(report) => report,
        ractor::rpc::CallResult::Timeout => Err(WorkerError::Actor("Worker run timed out".into())),
        ractor::rpc::CallResult::SenderError => {
            Err(WorkerError::Actor("Worker stopped before replying".into()))
        }
    }
}

/// Subscribe to broadcast events.
pub fn subscribe(
    supervisor: &ActorRef<SupervisorMessage>,
) -> Result<broadcast::Receiver<BroadcastEvent>, WorkerError> {
    let (tx, rx) = broadcast::channel(256);
    supervisor
        .send_message(SupervisorMessage::Subscribe { sender: tx })
        .map_err(|e| WorkerError::Actor(e.to_string()))?;
    Ok(rx)
}

/// Publish an event through the supervisor.
pub fn publish(supervisor: &ActorRef<SupervisorMessage>, event: BroadcastEvent) {
    if let Err(e) = supervisor.send_message(SupervisorMessage::Publish { event }) {
        tracing::warn!("Failed to publish event: {}", e);
    }
}
