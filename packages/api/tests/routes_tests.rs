#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use common::{app, app_with, recording, rejecting};

#[tokio::test]
async fn start_creates_a_deduplicated_broadcast() -> Result<(), Box<dyn Error>> {
    let app = app().await?;
    let response = app
        .post(
            "/api/admin/broadcast/start",
            json!({
                "message": {"title": "T", "body": "B", "targetUrl": "https://x"},
                "recipients": [1, 2, 2, 3],
            }),
        )
        .await?;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json()?;
    assert_eq!(body["success"], true);
    assert_eq!(body["totalUsers"], 3);

    let id = body["broadcastId"].as_str().ok_or("missing id")?;
    let status = app.get(&format!("/api/admin/broadcast/status?id={id}")).await?;
    assert_eq!(status.status, StatusCode::OK);
    let status = status.json()?;
    assert_eq!(status["stats"]["pending"], 3);
    assert_eq!(status["state"], "created");
    assert_eq!(status["isComplete"], false);

    app.shutdown().await
}

#[tokio::test]
async fn start_rejects_incomplete_messages() -> Result<(), Box<dyn Error>> {
    let app = app().await?;

    let incomplete = [
        json!(null),
        json!({"title": "T", "body": "B"}),
        json!({"title": "", "body": "B", "targetUrl": "https://x"}),
    ];
    for message in incomplete {
        let response = app
            .post(
                "/api/admin/broadcast/start",
                json!({"message": message, "recipients": [1]}),
            )
            .await?;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        let body = response.json()?;
        assert_eq!(body["code"], "BAD_REQUEST");
        assert_eq!(body["message"], "Missing required message fields");
    }

    let history = app.get("/api/admin/broadcast/history").await?.json()?;
    assert_eq!(history["broadcasts"].as_array().map(Vec::len), Some(0));

    app.shutdown().await
}

#[tokio::test]
async fn start_without_recipients_uses_the_directory() -> Result<(), Box<dyn Error>> {
    let app = app().await?;
    let message = json!({"title": "T", "body": "B", "targetUrl": "https://x"});

    let empty = app
        .post("/api/admin/broadcast/start", json!({"message": message}))
        .await?;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
    assert_eq!(empty.json()?["message"], "No users found");

    for fid in [5, 3, 5] {
        let response = app.post("/api/admin/recipients", json!({"fid": fid})).await?;
        assert_eq!(response.status, StatusCode::OK);
    }
    let directory = app.get("/api/admin/recipients").await?.json()?;
    assert_eq!(directory["total"], 2);
    assert_eq!(directory["fids"], json!([3, 5]));

    let started = app
        .post("/api/admin/broadcast/start", json!({"message": message}))
        .await?;
    assert_eq!(started.status, StatusCode::OK);
    assert_eq!(started.json()?["totalUsers"], 2);

    app.shutdown().await
}

#[tokio::test]
async fn worker_drains_and_completes() -> Result<(), Box<dyn Error>> {
    let (transport, sent) = recording();
    let app = app_with(transport).await?;
    let id = app.start(&[1, 2, 3]).await?;

    let response = app
        .post("/api/admin/broadcast/worker", json!({"broadcastId": id}))
        .await?;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json()?;
    assert_eq!(body["success"], true);
    assert_eq!(body["processed"], 3);
    assert_eq!(body["exhausted"], true);
    assert_eq!(body["stats"]["sent"], 3);
    assert_eq!(body["stats"]["state"], "completed");
    assert_eq!(sent.lock().unwrap().len(), 3);

    let status = app
        .get(&format!("/api/admin/broadcast/status?id={id}"))
        .await?
        .json()?;
    assert_eq!(status["isComplete"], true);
    assert_eq!(status["progress"], 100.0);
    assert_eq!(status["eta"], 0);

    let history = app
        .get("/api/admin/broadcast/history?limit=5")
        .await?
        .json()?;
    assert_eq!(history["broadcasts"][0]["id"], id.as_str());
    assert_eq!(history["broadcasts"][0]["stats"]["sent"], 3);

    app.shutdown().await
}

#[tokio::test]
async fn broadcast_lookups_report_bad_and_unknown_ids() -> Result<(), Box<dyn Error>> {
    let app = app().await?;
    let unknown = broadcast_core::BroadcastId::new().to_string();

    let missing = app.post("/api/admin/broadcast/worker", json!({})).await?;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.json()?["message"], "Missing broadcastId");

    let malformed = app
        .post("/api/admin/broadcast/worker", json!({"broadcastId": "nope"}))
        .await?;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);

    let worker = app
        .post("/api/admin/broadcast/worker", json!({"broadcastId": unknown}))
        .await?;
    assert_eq!(worker.status, StatusCode::NOT_FOUND);

    let status = app.get(&format!("/api/admin/broadcast/status?id={unknown}")).await?;
    assert_eq!(status.status, StatusCode::NOT_FOUND);
    assert_eq!(status.json()?["code"], "NOT_FOUND");

    let no_id = app.get("/api/admin/broadcast/status").await?;
    assert_eq!(no_id.status, StatusCode::BAD_REQUEST);
    assert_eq!(no_id.json()?["message"], "Missing broadcast ID");

    let retry = app
        .post("/api/admin/broadcast/retry", json!({"broadcastId": unknown}))
        .await?;
    assert_eq!(retry.status, StatusCode::NOT_FOUND);

    app.shutdown().await
}

#[tokio::test]
async fn retry_requeues_failures_once() -> Result<(), Box<dyn Error>> {
    let app = app_with(rejecting(&[2])).await?;
    let id = app.start(&[1, 2, 3]).await?;
    app.post("/api/admin/broadcast/worker", json!({"broadcastId": id}))
        .await?;

    let first = app
        .post("/api/admin/broadcast/retry", json!({"broadcastId": id}))
        .await?;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.json()?["retriedCount"], 1);

    let second = app
        .post("/api/admin/broadcast/retry", json!({"broadcastId": id}))
        .await?;
    assert_eq!(second.json()?["retriedCount"], 0);

    let status = app
        .get(&format!("/api/admin/broadcast/status?id={id}"))
        .await?
        .json()?;
    assert_eq!(status["stats"]["pending"], 1);
    assert_eq!(status["stats"]["failed"], 0);
    assert_eq!(status["state"], "draining");

    app.shutdown().await
}

#[tokio::test]
async fn details_and_csv_exports() -> Result<(), Box<dyn Error>> {
    let app = app_with(rejecting(&[2])).await?;
    let id = app.start(&[1, 2, 3]).await?;
    app.post("/api/admin/broadcast/worker", json!({"broadcastId": id}))
        .await?;

    let details = app
        .get(&format!("/api/admin/broadcast/details?id={id}"))
        .await?;
    assert_eq!(details.status, StatusCode::OK);
    let details = details.json()?;
    assert_eq!(details["broadcastId"], id.as_str());
    assert_eq!(details["succeeded"], json!([1, 3]));
    assert_eq!(details["failed"][0]["fid"], 2);
    assert_eq!(details["failed"][0]["error"], "HTTP 400: invalid fid");
    assert_eq!(details["status"]["isComplete"], true);
    assert_eq!(details["analytics"]["funnel"]["delivered"], 2);

    let export = app
        .get(&format!(
            "/api/admin/broadcast/details?id={id}&action=export&export=failed"
        ))
        .await?;
    assert_eq!(export.status, StatusCode::OK);
    assert_eq!(export.headers[header::CONTENT_TYPE], "text/csv");
    assert_eq!(
        export.headers[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"broadcast_{id}_failed.csv\"").as_str()
    );
    assert_eq!(export.text(), "FID,Error\n2,\"HTTP 400: invalid fid\"\n");

    let success = app
        .get(&format!(
            "/api/admin/broadcast/details?id={id}&action=export&export=success"
        ))
        .await?;
    assert_eq!(success.text(), "FID,Status\n1,Success\n3,Success\n");

    let bogus = app
        .get(&format!(
            "/api/admin/broadcast/details?id={id}&action=export&export=everything"
        ))
        .await?;
    assert_eq!(bogus.status, StatusCode::BAD_REQUEST);

    app.shutdown().await
}

#[tokio::test]
async fn clicks_are_tracked_per_event() -> Result<(), Box<dyn Error>> {
    let app = app().await?;
    let id = app.start(&[5, 6]).await?;
    let notif_id = format!("{id}_5");

    for _ in 0..2 {
        let response = app
            .post(
                "/api/track-notification-click",
                json!({"notifId": notif_id, "fid": 5}),
            )
            .await?;
        assert_eq!(response.status, StatusCode::OK);
        let body = response.json()?;
        assert_eq!(body["broadcastId"], id.as_str());
        assert_eq!(body["fid"], 5);
    }

    let details = app
        .get(&format!("/api/admin/broadcast/details?id={id}"))
        .await?
        .json()?;
    assert_eq!(details["status"]["stats"]["clicks"], 2);
    assert_eq!(details["clicks"].as_array().map(Vec::len), Some(1));
    assert_eq!(details["clicks"][0]["fid"], 5);

    let missing = app
        .post("/api/track-notification-click", json!({"notifId": notif_id}))
        .await?;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.json()?["message"], "Missing parameters");

    let malformed = app
        .post(
            "/api/track-notification-click",
            json!({"notifId": "no-separator", "fid": 5}),
        )
        .await?;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);

    let unknown = format!("{}_5", broadcast_core::BroadcastId::new());
    let response = app
        .post(
            "/api/track-notification-click",
            json!({"notifId": unknown, "fid": 5}),
        )
        .await?;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    app.shutdown().await
}

#[tokio::test]
async fn test_notification_fills_in_defaults() -> Result<(), Box<dyn Error>> {
    let (transport, sent) = recording();
    let app = app_with(transport).await?;

    let response = app
        .post("/api/admin/test-notification", json!({"fid": 42}))
        .await?;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json()?;
    assert_eq!(body["success"], true);
    assert_eq!(body["attempts"], 1);

    let custom = app
        .post(
            "/api/admin/test-notification",
            json!({"fid": 42, "title": "Hi", "body": "There", "targetUrl": "https://y"}),
        )
        .await?;
    assert_eq!(custom.status, StatusCode::OK);

    {
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].recipient.0, 42);
        assert_eq!(sent[0].title, "🌟 Galaxy Update");
        assert_eq!(sent[0].target_url, "http://localhost");
        assert_eq!(sent[1].title, "Hi");
        assert_eq!(sent[1].target_url, "https://y");
    }

    let missing = app.post("/api/admin/test-notification", json!({})).await?;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.json()?["message"], "FID is required");

    app.shutdown().await
}

#[tokio::test]
async fn rejected_test_notification_is_a_gateway_error() -> Result<(), Box<dyn Error>> {
    let app = app_with(rejecting(&[7])).await?;

    let response = app
        .post("/api/admin/test-notification", json!({"fid": 7}))
        .await?;
    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    let body = response.json()?;
    assert_eq!(body["code"], "DELIVERY_FAILED");
    assert!(body["message"].as_str().unwrap_or_default().contains("400"));

    app.shutdown().await
}

#[tokio::test]
async fn health_reports_healthy() -> Result<(), Box<dyn Error>> {
    let app = app().await?;
    let response = app.get("/health").await?;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()?["status"], "healthy");
    app.shutdown().await
}

#[tokio::test]
async fn malformed_requests_get_structured_errors() -> Result<(), Box<dyn Error>> {
    let app = app().await?;

    let request = Request::post("/api/admin/broadcast/start")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))?;
    let response = app.router.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await?)?;
    assert_eq!(body["code"], "INVALID_BODY");
    assert!(body["message"].is_string());

    let request = Request::post("/api/track-notification-click").body(Body::from("{}"))?;
    let response = app.router.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await?)?;
    assert_eq!(body["code"], "INVALID_BODY");

    let response = app.get("/api/admin/broadcast/history?limit=lots").await?;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()?["code"], "INVALID_QUERY");

    app.shutdown().await
}
