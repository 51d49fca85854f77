//! End-to-End Tests
//!
//! A registry served over HTTP on a loopback port, a client uploading to it,
//! and a consumer following it through the reconciliation manager.

use std::sync::Arc;
use std::time::Duration;

use familiar_isr::{
    ErrorKind, HotSwapValidator, ManagerConfig, ManagerState, Message, ReconciliationManager, RegistryClient,
    SchemaRegistry, SchemaSource, SchemaTarget,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const V0: &[u8] = include_bytes!("fixtures/user_v1_0_0.json");
const V1: &[u8] = include_bytes!("fixtures/user_v1_0_1.json");

struct TestServer {
    url: String,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<familiar_isr::Result<()>>,
}

impl TestServer {
    async fn start(registry: SchemaRegistry) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
        let (shutdown, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(familiar_isr::http::serve(listener, registry, async move {
            let _ = rx.await;
        }));
        Self { url, shutdown, handle }
    }

    async fn stop(self) {
        let _ = self.shutdown.send(());
        self.handle.await.unwrap().unwrap();
    }
}

fn client(url: &str) -> RegistryClient {
    RegistryClient::new(url, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_client_round_trip() {
    let server = TestServer::start(SchemaRegistry::in_memory()).await;
    let client = client(&server.url);
    assert!(client.base_url().starts_with("http://"));

    client.health().await.unwrap();
    let metadata = client.upload("1.0.0", V0).await.unwrap();
    assert_eq!(metadata.size_bytes, V0.len() as u64);

    let record = client.get_by_version("1.0.0").await.unwrap();
    assert_eq!(record.payload, V0);
    assert!(record.verify_checksum());

    client.upload("1.0.1", V1).await.unwrap();
    assert_eq!(client.latest_patch(1, 0).await.unwrap().payload, V1);
    assert!(client.version_exists("1.0.1").await.unwrap());
    assert!(!client.version_exists("1.0.2").await.unwrap());
    assert_eq!(client.list().await.unwrap().len(), 2);

    server.stop().await;
}

#[tokio::test]
async fn test_client_error_kinds() {
    let server = TestServer::start(SchemaRegistry::in_memory()).await;
    let client = client(&server.url);
    client.upload("1.0.0", V0).await.unwrap();

    assert_eq!(client.upload("1.0.0", V1).await.unwrap_err().kind(), ErrorKind::AlreadyExists);
    assert_eq!(client.upload("1.0", V1).await.unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(client.upload("1.0.1", b"").await.unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(client.get_by_version("3.0.0").await.unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(client.latest_patch(4, 0).await.unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(client.latest_patch(-1, 0).await.unwrap_err().kind(), ErrorKind::InvalidArgument);

    server.stop().await;
}

#[tokio::test]
async fn test_large_payload_over_http() {
    let server = TestServer::start(SchemaRegistry::in_memory()).await;
    let client = client(&server.url);

    let max = familiar_isr::schema::MAX_PAYLOAD_BYTES;
    client.upload("1.0.0", &vec![b'x'; max]).await.unwrap();
    let err = client.upload("1.0.1", &vec![b'x'; max + 1]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    server.stop().await;
}

#[tokio::test]
async fn test_consumer_follows_remote_registry() {
    let registry = SchemaRegistry::in_memory();
    let server = TestServer::start(registry.clone()).await;
    let client = client(&server.url);
    client.upload("1.0.0", V0).await.unwrap();

    let validator = Arc::new(HotSwapValidator::new());
    let config = ManagerConfig::new(SchemaTarget::parse("1.0").unwrap()).with_polling_interval(Duration::from_millis(50));
    let manager = ReconciliationManager::new(config, Arc::new(client.clone()), validator.clone()).unwrap();

    manager.load_initial_schema().await.unwrap();
    manager.start().await.unwrap();
    assert_eq!(validator.current_version(), "1.0.0");

    let user = Message::new(
        "user.v1.User",
        json!({ "id": "0190b6a2-7f3c-7d0e-8a4b-1c2d3e4f5a6b", "name": "Ada" }),
    );
    assert!(validator.validate(&user).is_ok());

    client.upload("1.0.1", V1).await.unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while validator.current_version() != "1.0.1" {
        assert!(tokio::time::Instant::now() < deadline, "Consumer never swapped to 1.0.1");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(validator.validate(&user).is_err());

    // A broken patch is skipped; the consumer keeps serving 1.0.1
    registry.register("1.0.2", b"invalid schema data".to_vec()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(validator.current_version(), "1.0.1");

    manager.stop().await.unwrap();
    assert_eq!(manager.state().await, ManagerState::Stopped);
    server.stop().await;
}

#[tokio::test]
async fn test_initial_load_fails_without_schema() {
    let server = TestServer::start(SchemaRegistry::in_memory()).await;
    let source: Arc<dyn SchemaSource> = Arc::new(client(&server.url));

    let manager = ReconciliationManager::new(
        ManagerConfig::new(SchemaTarget::new(1, 0)),
        source,
        Arc::new(HotSwapValidator::new()),
    )
    .unwrap();
    let err = manager.load_initial_schema().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(manager.state().await, ManagerState::Uninitialized);

    server.stop().await;
}
