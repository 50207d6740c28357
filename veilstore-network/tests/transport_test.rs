//! Loopback tests for the upload and private-lookup flows

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use veilstore_core::PaillierKeyPair;
use veilstore_network::{NetworkError, PeerClient, PeerServer, TransportConfig};
use veilstore_store::{PrivateStore, StoreConfig};

const BLOCK: usize = 32;
const SUB_CHUNK: usize = 16;

fn test_config() -> TransportConfig {
    TransportConfig {
        connect_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_secs(5),
        upload_retries: 2,
        retry_backoff: Duration::from_millis(20),
        block_size: BLOCK,
        sub_chunk_size: SUB_CHUNK,
        ..TransportConfig::default()
    }
}

fn test_store(capacity: usize) -> Arc<PrivateStore> {
    Arc::new(
        PrivateStore::new(StoreConfig {
            capacity,
            block_size: BLOCK,
            sub_chunk_size: SUB_CHUNK,
            uploads_enabled: true,
        })
        .unwrap(),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn upload_then_private_lookup_roundtrip() {
    let store = test_store(8);
    let config = test_config();
    let handle = PeerServer::new(store.clone(), config.clone())
        .bind("127.0.0.1:0")
        .await
        .unwrap();
    let address = handle.local_addr().to_string();
    let client = PeerClient::new(config);

    let share: Vec<u8> = (0..BLOCK as u8).collect();
    client
        .upload_share(&address, "ledger.db_part0", Bytes::from(share.clone()))
        .await
        .unwrap();
    assert!(store.contains("ledger.db_part0"));

    let keypair = PaillierKeyPair::generate(256).unwrap();
    let recovered = client
        .fetch_share(&address, &keypair, "ledger.db", &[0, 1, 2])
        .await
        .unwrap();

    let (part, data) = recovered.expect("share should be found");
    assert_eq!(part, 0);
    assert_eq!(data.as_ref(), share.as_slice());

    handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn lookup_for_absent_file_completes_with_none() {
    let store = test_store(8);
    store
        .add("other.bin_part0", Bytes::from(vec![7u8; BLOCK]))
        .unwrap();
    let config = test_config();
    let handle = PeerServer::new(store, config.clone())
        .bind("127.0.0.1:0")
        .await
        .unwrap();
    let client = PeerClient::new(config);

    let keypair = PaillierKeyPair::generate(256).unwrap();
    let recovered = client
        .fetch_share(
            &handle.local_addr().to_string(),
            &keypair,
            "missing.bin",
            &[0, 1],
        )
        .await
        .unwrap();
    assert!(recovered.is_none());

    handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn upload_denied_when_store_is_full() {
    let store = test_store(1);
    store
        .add("taken_part0", Bytes::from(vec![1u8; BLOCK]))
        .unwrap();
    let config = test_config();
    let handle = PeerServer::new(store, config.clone())
        .bind("127.0.0.1:0")
        .await
        .unwrap();
    let client = PeerClient::new(config);

    let result = client
        .upload_share(
            &handle.local_addr().to_string(),
            "new_part0",
            Bytes::from(vec![2u8; BLOCK]),
        )
        .await;
    assert!(matches!(result, Err(NetworkError::UploadDenied)));

    handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_upload_exhausts_retries() {
    let store = test_store(8);
    let config = test_config();
    let handle = PeerServer::new(store, config.clone())
        .bind("127.0.0.1:0")
        .await
        .unwrap();
    let address = handle.local_addr().to_string();
    let client = PeerClient::new(config);

    let data = Bytes::from(vec![5u8; BLOCK]);
    client
        .upload_share(&address, "dup_part0", data.clone())
        .await
        .unwrap();

    // The name is taken: every resend is rejected until the budget runs out
    let result = client.upload_share(&address, "dup_part0", data).await;
    assert!(matches!(
        result,
        Err(NetworkError::RetriesExhausted { attempts: 2 })
    ));

    handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_peer_is_an_error_not_a_panic() {
    let config = test_config();

    // Bind then immediately drop a listener to get a dead port
    let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = dead.local_addr().unwrap().to_string();
    drop(dead);

    let client = PeerClient::new(config);
    let result = client
        .upload_share(&address, "x_part0", Bytes::from(vec![0u8; BLOCK]))
        .await;
    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn wrong_size_share_is_rejected_not_fatal() {
    let store = test_store(8);
    let config = test_config();
    let handle = PeerServer::new(store.clone(), config.clone())
        .bind("127.0.0.1:0")
        .await
        .unwrap();
    let address = handle.local_addr().to_string();
    let client = PeerClient::new(config);

    let result = client
        .upload_share(&address, "tiny_part0", Bytes::from_static(b"too small"))
        .await;
    assert!(matches!(
        result,
        Err(NetworkError::RetriesExhausted { .. })
    ));
    assert!(store.is_empty());

    // The listener is still alive and serving
    client
        .upload_share(&address, "ok_part0", Bytes::from(vec![3u8; BLOCK]))
        .await
        .unwrap();

    handle.shutdown().await;
}
