//! Worker actor running one delivery pass.

use broadcast_core::BroadcastId;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio_util::sync::CancellationToken;

use crate::messages::WorkerMessage;
use crate::worker::DeliveryWorker;

/// State for the worker actor.
pub struct WorkerActorState {
    worker: DeliveryWorker,
    broadcast_id: BroadcastId,
    cancel: CancellationToken,
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub worker: DeliveryWorker,
    pub broadcast_id: BroadcastId,
    /// Cancelled by the supervisor on shutdown.
    pub cancel: CancellationToken,
}

/// Actor owning a single worker run. It stops itself after replying.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::debug!(broadcast_id = %args.broadcast_id, "Starting worker actor");
        Ok(WorkerActorState {
            worker: args.worker,
            broadcast_id: args.broadcast_id,
            cancel: args.cancel,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Drain { reply } => {
                let result = state.worker.drain(state.broadcast_id, &state.cancel).await;
                if let Err(e) = &result {
                    tracing::error!(broadcast_id = %state.broadcast_id, "Worker run failed: {}", e);
                }
                let _ = reply.send(result);
                myself.stop(None);
            }
        }
        Ok(())
    }
}
