use covid_data_ws::services::StatsClient;
use futures::StreamExt;
use shared::{
    AppError, CfrReply, CfrRequest, MemoryBus, MessageBus, WorkerErrorCode,
    SUBJECT_CALCULATE_CFR,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Answers every CFR request on `bus` with whatever `reply` returns.
async fn spawn_responder<F>(bus: &MemoryBus, reply: F)
where
    F: Fn(CfrRequest) -> Vec<u8> + Send + 'static,
{
    let mut requests = bus.subscribe(SUBJECT_CALCULATE_CFR).await.unwrap();
    let responder = bus.clone();
    tokio::spawn(async move {
        while let Some(message) = requests.next().await {
            let request: CfrRequest = serde_json::from_slice(&message.payload).unwrap();
            responder.respond(&message, reply(request)).await.unwrap();
        }
    });
}

fn client(bus: &MemoryBus) -> StatsClient {
    StatsClient::new(Arc::new(bus.clone()), Duration::from_secs(2))
}

#[tokio::test]
async fn test_reply_is_returned() {
    let bus = MemoryBus::new();
    spawn_responder(&bus, |request| {
        serde_json::to_vec(&CfrReply::new(request.country, 200, 10)).unwrap()
    })
    .await;

    let reply = client(&bus)
        .request_cfr(Some("Italy".to_string()))
        .await
        .unwrap();
    assert_eq!(reply.country.as_deref(), Some("Italy"));
    assert_eq!(reply.cfr, Some(5.0));
}

#[tokio::test]
async fn test_silent_worker_times_out() {
    let bus = MemoryBus::new();
    let _silent = bus.subscribe(SUBJECT_CALCULATE_CFR).await.unwrap();

    let started = Instant::now();
    let err = client(&bus)
        .request_cfr_with_timeout(None, Duration::from_millis(50))
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, AppError::Timeout { .. }));
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_secs(1));
}

#[tokio::test]
async fn test_no_worker_is_service_unavailable_immediately() {
    let bus = MemoryBus::new();

    let started = Instant::now();
    let err = client(&bus).request_cfr(None).await.unwrap_err();

    assert!(matches!(err, AppError::ServiceUnavailable { .. }));
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn test_worker_error_envelope_is_upstream() {
    let bus = MemoryBus::new();
    spawn_responder(&bus, |_| {
        serde_json::to_vec(&WorkerErrorCode::DatabaseError.envelope()).unwrap()
    })
    .await;

    let err = client(&bus).request_cfr(None).await.unwrap_err();
    match err {
        AppError::Upstream { code, message } => {
            assert_eq!(code, 1001);
            assert_eq!(message, "A database error occurred");
        }
        other => panic!("expected upstream error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unrecognized_reply_is_bad_gateway() {
    let bus = MemoryBus::new();
    spawn_responder(&bus, |_| br#"{"status":"ok"}"#.to_vec()).await;

    let err = client(&bus).request_cfr(None).await.unwrap_err();
    assert!(matches!(err, AppError::BadGateway { .. }));
}

#[tokio::test]
async fn test_request_body_carries_country() {
    let bus = MemoryBus::new();
    let mut requests = bus.subscribe(SUBJECT_CALCULATE_CFR).await.unwrap();
    let responder = bus.clone();
    let seen = tokio::spawn(async move {
        let message = requests.next().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&message.payload).unwrap();
        let reply = CfrReply::new(None, 0, 0);
        responder
            .respond(&message, serde_json::to_vec(&reply).unwrap())
            .await
            .unwrap();
        body
    });

    let reply = client(&bus).request_cfr(None).await.unwrap();
    assert_eq!(reply.cfr, None);
    assert_eq!(seen.await.unwrap(), serde_json::json!({"country": null}));
}
