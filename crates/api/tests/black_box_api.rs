//! Black-box API tests: real HTTP server on an ephemeral port, real bearer
//! tokens, reqwest as the client.

use std::net::SocketAddr;
use std::time::Duration;

use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;

use totem_api::app::{build_app, services::build_test_services};

const SECRET: &[u8] = b"black-box-secret";

#[derive(Serialize)]
struct WireClaims {
    sub: uuid::Uuid,
    tenant_id: uuid::Uuid,
    capabilities: Vec<String>,
    iat: i64,
    exp: i64,
}

fn token(tenant_id: uuid::Uuid, capabilities: &[&str]) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = WireClaims {
        sub: uuid::Uuid::now_v7(),
        tenant_id,
        capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        iat: now - 30,
        exp: now + 300,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET),
    )
    .unwrap()
}

async fn spawn_server() -> SocketAddr {
    let services = build_test_services(Duration::from_millis(50));
    let app = build_app(services, SECRET);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn receipt() -> serde_json::Value {
    serde_json::json!({"lines": ["CAFE TOTEM", "1x espresso", "total: 7.00"]})
}

#[tokio::test]
async fn health_needs_no_credentials() {
    let addr = spawn_server().await;
    let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn protected_routes_reject_missing_and_weak_credentials() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();
    let tenant = uuid::Uuid::now_v7();

    // No token at all.
    let response = client
        .post(format!("http://{addr}/queue/claim"))
        .json(&serde_json::json!({"terminal_id": "kiosk-01", "lease_duration_ms": 90000}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    // Valid token, wrong capability.
    let response = client
        .post(format!("http://{addr}/queue/claim"))
        .bearer_auth(token(tenant, &["payments.read"]))
        .json(&serde_json::json!({"terminal_id": "kiosk-01", "lease_duration_ms": 90000}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn enqueue_claim_report_happy_path() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();
    let tenant = uuid::Uuid::now_v7();
    let backend = token(tenant, &["queue.enqueue", "queue.read"]);
    let agent = token(tenant, &["queue.work"]);

    // Empty queue: 204.
    let response = client
        .post(format!("http://{addr}/queue/claim"))
        .bearer_auth(&agent)
        .json(&serde_json::json!({"terminal_id": "kiosk-01", "lease_duration_ms": 90000}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    // Enqueue a job.
    let response = client
        .post(format!("http://{addr}/queue/jobs"))
        .bearer_auth(&backend)
        .json(&serde_json::json!({"terminal_id": "kiosk-01", "payload": receipt()}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    // Claim it.
    let response = client
        .post(format!("http://{addr}/queue/claim"))
        .bearer_auth(&agent)
        .json(&serde_json::json!({"terminal_id": "kiosk-01", "lease_duration_ms": 90000}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let claimed: serde_json::Value = response.json().await.unwrap();
    let job_id = claimed["id"].as_str().unwrap().to_string();
    let attempt_token = claimed["token"].as_str().unwrap().to_string();
    assert_eq!(claimed["attempt"], 1);

    // Mark printing, then report success.
    let response = client
        .post(format!("http://{addr}/queue/{job_id}/begin"))
        .bearer_auth(&agent)
        .json(&serde_json::json!({"attempt_token": attempt_token}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client
        .post(format!("http://{addr}/queue/{job_id}/report"))
        .bearer_auth(&agent)
        .json(&serde_json::json!({"attempt_token": attempt_token, "result": "completed"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["state"], "succeeded");

    // Duplicate report: conflict, no state change.
    let response = client
        .post(format!("http://{addr}/queue/{job_id}/report"))
        .bearer_auth(&agent)
        .json(&serde_json::json!({"attempt_token": attempt_token, "result": "completed"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    // Operator view shows the terminal job.
    let response = client
        .get(format!("http://{addr}/queue/terminals/kiosk-01/jobs"))
        .bearer_auth(&backend)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["jobs"][0]["state"], "succeeded");
    assert_eq!(body["jobs"][0]["attempt_count"], 1);
}

#[tokio::test]
async fn transient_failure_report_requeues_the_job() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();
    let tenant = uuid::Uuid::now_v7();
    let backend = token(tenant, &["queue.enqueue"]);
    let agent = token(tenant, &["queue.work"]);

    client
        .post(format!("http://{addr}/queue/jobs"))
        .bearer_auth(&backend)
        .json(&serde_json::json!({"terminal_id": "kiosk-01", "payload": receipt(), "max_retries": 3}))
        .send()
        .await
        .unwrap();

    let claimed: serde_json::Value = client
        .post(format!("http://{addr}/queue/claim"))
        .bearer_auth(&agent)
        .json(&serde_json::json!({"terminal_id": "kiosk-01", "lease_duration_ms": 90000}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let job_id = claimed["id"].as_str().unwrap();
    let attempt_token = claimed["token"].as_str().unwrap();

    let response = client
        .post(format!("http://{addr}/queue/{job_id}/report"))
        .bearer_auth(&agent)
        .json(&serde_json::json!({
            "attempt_token": attempt_token,
            "result": "failed",
            "fault": "transient",
            "message": "device_busy: paper jam",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["state"], "pending");

    // The job is claimable again; its attempt counter advanced.
    let reclaimed: serde_json::Value = client
        .post(format!("http://{addr}/queue/claim"))
        .bearer_auth(&agent)
        .json(&serde_json::json!({"terminal_id": "kiosk-01", "lease_duration_ms": 90000}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reclaimed["id"].as_str().unwrap(), job_id);
    assert_eq!(reclaimed["attempt"], 2);

    // The old token lost the race for good.
    let response = client
        .post(format!("http://{addr}/queue/{job_id}/report"))
        .bearer_auth(&agent)
        .json(&serde_json::json!({"attempt_token": attempt_token, "result": "completed"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn cross_tenant_jobs_are_invisible() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();
    let tenant_a = uuid::Uuid::now_v7();
    let tenant_b = uuid::Uuid::now_v7();

    client
        .post(format!("http://{addr}/queue/jobs"))
        .bearer_auth(token(tenant_a, &["queue.enqueue"]))
        .json(&serde_json::json!({"terminal_id": "kiosk-01", "payload": receipt()}))
        .send()
        .await
        .unwrap();

    let response = client
        .post(format!("http://{addr}/queue/claim"))
        .bearer_auth(token(tenant_b, &["queue.work"]))
        .json(&serde_json::json!({"terminal_id": "kiosk-01", "lease_duration_ms": 90000}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
}

#[tokio::test]
async fn pix_charge_and_status_round_trip() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();
    let tenant = uuid::Uuid::now_v7();
    let operator = token(tenant, &["payments.charge", "payments.read"]);

    let response = client
        .post(format!("http://{addr}/payments/appointments/appt-42/pix"))
        .bearer_auth(&operator)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let charge: serde_json::Value = response.json().await.unwrap();
    let payment_id = charge["payment_id"].as_str().unwrap();
    assert!(!charge["qr_code_text"].as_str().unwrap().is_empty());
    assert!(!charge["qr_code_image_base64"].as_str().unwrap().is_empty());

    let response = client
        .get(format!("http://{addr}/payments/{payment_id}"))
        .bearer_auth(&operator)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let record: serde_json::Value = response.json().await.unwrap();
    assert_eq!(record["payment_id"].as_str().unwrap(), payment_id);

    // Charge-only credential cannot read status.
    let response = client
        .get(format!("http://{addr}/payments/{payment_id}"))
        .bearer_auth(token(tenant, &["payments.charge"]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}
