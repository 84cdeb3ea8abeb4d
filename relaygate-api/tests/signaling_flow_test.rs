// Full signaling flow over real sockets
//
// Control router and endpoint listeners are served on loopback; the media
// engine is the in-memory fake.

use relaygate_api::{create_control_router, ClientError, ControlState, SignalingClient, TcpEndpointBinder};
use relaygate_sfu::testing::{FakeEngine, FAKE_ANSWER_SDP};
use relaygate_sfu::{EndpointPool, IceCandidate, PoolConfig, SdpType, SessionDescription};
use std::sync::Arc;
use tokio::net::TcpListener;

/// A loopback port that was free a moment ago
async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn start() -> (Arc<EndpointPool>, Arc<FakeEngine>, SignalingClient) {
    let engine = FakeEngine::new();
    let config = PoolConfig {
        first_port: free_port().await,
        sample_interval: None,
        ..PoolConfig::default()
    };
    let pool = EndpointPool::new(config, engine.clone(), Arc::new(TcpEndpointBinder::new("127.0.0.1")));

    let control = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let control_port = control.local_addr().unwrap().port();
    let router = create_control_router(ControlState {
        pool: pool.clone(),
        preview: None,
    });
    tokio::spawn(async move {
        axum::serve(control, router).await.unwrap();
    });

    let client = SignalingClient::new("127.0.0.1", control_port).unwrap();
    (pool, engine, client)
}

#[tokio::test]
async fn test_discover_negotiate_and_trickle() {
    let (pool, engine, client) = start().await;

    let port = client.discover().await.unwrap();
    assert_eq!(port, pool.config().first_port);

    let answer = client
        .negotiate(port, SessionDescription::offer("v=0"))
        .await
        .unwrap();
    assert_eq!(answer.answer.sdp_type, SdpType::Answer);
    assert_eq!(answer.answer.sdp, FAKE_ANSWER_SDP);
    assert!(answer
        .session_id
        .as_str()
        .starts_with(&format!("{port}-127.0.0.1-")));

    let candidate = IceCandidate {
        candidate: "candidate:1 1 udp 2130706431 127.0.0.1 50000 typ host".to_string(),
        sdp_mid: Some("0".to_string()),
        sdp_mline_index: Some(0),
        username_fragment: None,
    };
    client
        .send_candidate(port, Some(answer.session_id.clone()), candidate.clone())
        .await
        .unwrap();
    assert_eq!(engine.last_peer().unwrap().candidates(), vec![candidate]);

    let stats = client.stats().await.unwrap();
    let entry = &stats[answer.session_id.as_str()];
    assert_eq!(entry.port_num, port);
    assert_eq!(entry.client_id, answer.session_id.as_str());
    assert!(entry.video.is_none());

    pool.shutdown_all().await.unwrap();
}

#[tokio::test]
async fn test_rejected_offer_reports_error() {
    let (pool, engine, client) = start().await;
    engine.set_reject_offers(true);

    let port = client.discover().await.unwrap();
    match client.negotiate(port, SessionDescription::offer("garbage")).await {
        Err(ClientError::Server { status, message }) => {
            assert_eq!(status, 500);
            assert!(message.starts_with("negotiation failed"));
        }
        other => panic!("expected server error, got {other:?}"),
    }
    assert_eq!(pool.session_count(), 0);

    pool.shutdown_all().await.unwrap();
}

#[tokio::test]
async fn test_endpoint_stops_listening_after_shutdown() {
    let (pool, _, client) = start().await;
    let port = client.discover().await.unwrap();

    pool.shutdown_all().await.unwrap();

    let result = client.negotiate(port, SessionDescription::offer("v=0")).await;
    assert!(matches!(result, Err(ClientError::Http(_))));
}
