#![allow(dead_code)]

use std::error::Error;
use std::sync::{Arc, Mutex};

use actors::{
    ActorRef, DeliveryPolicy, FnTransport, Notification, NotificationTransport, SendError,
    SendFuture, SupervisorArgs, SupervisorMessage, SweepConfig, start_supervisor,
};
use api::AppState;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode},
};
use db::{MemoryStore, Store};
use serde_json::Value;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub supervisor: ActorRef<SupervisorMessage>,
    pub handle: tokio::task::JoinHandle<()>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Result<Value, Box<dyn Error>> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Transport that records every notification and delivers it.
pub fn recording() -> (Arc<dyn NotificationTransport>, Arc<Mutex<Vec<Notification>>>) {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let log = sent.clone();
    let transport = FnTransport::new("recording", move |n: &Notification| -> SendFuture<'static> {
        log.lock().unwrap().push(n.clone());
        Box::pin(async { Ok::<(), SendError>(()) })
    });
    (Arc::new(transport), sent)
}

/// Transport that rejects the listed recipients and delivers everyone else.
pub fn rejecting(fids: &'static [u64]) -> Arc<dyn NotificationTransport> {
    Arc::new(FnTransport::new(
        "rejecting",
        move |n: &Notification| -> SendFuture<'static> {
            let rejected = fids.contains(&n.recipient.0);
            Box::pin(async move {
                if rejected {
                    Err(SendError::Rejected("HTTP 400: invalid fid".into()))
                } else {
                    Ok(())
                }
            })
        },
    ))
}

pub async fn app() -> Result<TestApp, Box<dyn Error>> {
    app_with(recording().0).await
}

pub async fn app_with(
    transport: Arc<dyn NotificationTransport>,
) -> Result<TestApp, Box<dyn Error>> {
    let store: Store = Arc::new(MemoryStore::new());
    let policy = DeliveryPolicy::immediate();
    let (supervisor, handle) = start_supervisor(SupervisorArgs {
        broadcasts: db::repositories::BroadcastRepository::new(store.clone()),
        transport: transport.clone(),
        policy: policy.clone(),
        sweep: SweepConfig::default().with_interval(std::time::Duration::ZERO),
    })
    .await?;

    let state = AppState::new(store, supervisor.clone(), transport, policy);
    Ok(TestApp {
        router: api::router(state.clone()),
        state,
        supervisor,
        handle,
    })
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Result<TestResponse, Box<dyn Error>> {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json)?)
            }
            None => Body::empty(),
        };

        let response = self.router.clone().oneshot(builder.body(body)?).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(TestResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }

    pub async fn get(&self, uri: &str) -> Result<TestResponse, Box<dyn Error>> {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> Result<TestResponse, Box<dyn Error>> {
        self.request(Method::POST, uri, Some(body)).await
    }

    /// Start a broadcast to `fids` and return its id.
    pub async fn start(&self, fids: &[u64]) -> Result<String, Box<dyn Error>> {
        let response = self
            .post(
                "/api/admin/broadcast/start",
                serde_json::json!({
                    "message": {"title": "T", "body": "B", "targetUrl": "https://x"},
                    "recipients": fids,
                }),
            )
            .await?;
        assert_eq!(response.status, StatusCode::OK);
        let id = response.json()?["broadcastId"]
            .as_str()
            .ok_or("missing broadcastId")?
            .to_string();
        Ok(id)
    }

    pub async fn shutdown(self) -> Result<(), Box<dyn Error>> {
        self.supervisor.send_message(SupervisorMessage::Shutdown)?;
        self.handle.await?;
        Ok(())
    }
}
