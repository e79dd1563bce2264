//! Transfer session tests against the scripted mock transport.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::time::Duration;
use stratus_cloud::mock::{MockResponse, MockTransport};
use stratus_cloud::EngineConfig;
use stratus_storage::{StorageError, TransferClient};

fn config_with_chunk(chunk_size: usize) -> EngineConfig {
    EngineConfig {
        poll_interval: Duration::from_millis(1),
        chunk_size,
        ..EngineConfig::default()
    }
}

fn script_upload_session(transport: &MockTransport, transfer_id: &str) {
    transport.on_post(
        "/fileService",
        MockResponse::body(format!(r#"{{"FileTransferID":"{transfer_id}"}}"#)),
    );
    transport.on_post(&format!("/fileService/{transfer_id}"), MockResponse::body(""));
    transport.on_post(
        &format!("/fileService/{transfer_id}/CompleteUpload"),
        MockResponse::body(r#"{"QueuedMessageId":"t-up"}"#),
    );
    transport.on_get(
        "/TaskInfo/t-up",
        MockResponse::body(r#"{"State":4,"Result":"","Errors":{}}"#),
    );
}

/// Reassemble the payload an upload pushed, checking sequence numbering.
fn uploaded_bytes(transport: &MockTransport, transfer_id: &str) -> Vec<u8> {
    let chunk_path = format!("/fileService/{transfer_id}");
    let mut expected_sequence = 0u64;
    let mut payload = Vec::new();
    for request in transport.requests() {
        if request.method != "POST" || request.path != chunk_path {
            continue;
        }
        let chunk: serde_json::Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(chunk["Sequence"].as_u64().unwrap(), expected_sequence);
        expected_sequence += 1;
        payload.extend(BASE64.decode(chunk["Data"].as_str().unwrap()).unwrap());
    }
    payload
}

async fn upload_reassembles(chunk_size: usize, payload: &[u8]) {
    let transport = MockTransport::new();
    script_upload_session(&transport, "xfer-1");

    let client = TransferClient::new(transport, config_with_chunk(chunk_size));
    let mut reader = payload;
    client
        .upload("st-1", "/data.bin", &mut reader, payload.len() as u64)
        .await
        .unwrap();
    assert_eq!(uploaded_bytes(client.transport(), "xfer-1"), payload);
    assert_eq!(
        client
            .transport()
            .hits("POST", "/fileService/xfer-1/CompleteUpload"),
        1
    );
}

#[tokio::test]
async fn upload_round_trips_across_chunk_boundaries() {
    let payload = b"the quick brown fox jumps over the lazy dog";
    // chunk below, equal to, and above the payload length
    upload_reassembles(10, payload).await;
    upload_reassembles(payload.len(), payload).await;
    upload_reassembles(payload.len() * 2, payload).await;
}

#[tokio::test]
async fn upload_of_an_exact_multiple_sends_no_empty_chunk() {
    let transport = MockTransport::new();
    script_upload_session(&transport, "xfer-1");

    let client = TransferClient::new(transport, config_with_chunk(4));
    let mut reader: &[u8] = b"abcdefgh";
    client.upload("st-1", "/data.bin", &mut reader, 8).await.unwrap();
    assert_eq!(client.transport().hits("POST", "/fileService/xfer-1"), 2);
    assert_eq!(uploaded_bytes(client.transport(), "xfer-1"), b"abcdefgh");
}

#[tokio::test]
async fn failed_chunk_cancels_the_upload_session() {
    let transport = MockTransport::new();
    transport.on_post(
        "/fileService",
        MockResponse::body(r#"{"FileTransferID":"xfer-1"}"#),
    );
    transport.on_post(
        "/fileService/xfer-1",
        MockResponse::Error {
            status: 500,
            reason: "Internal Server Error".to_string(),
            message: "chunk store offline".to_string(),
        },
    );
    transport.on_post("/fileService/xfer-1/CancelUpload", MockResponse::body(""));

    let client = TransferClient::new(transport, config_with_chunk(4));
    let mut reader: &[u8] = b"abcdefgh";
    let err = client
        .upload("st-1", "/data.bin", &mut reader, 8)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::TransferFailed(_)));
    assert_eq!(
        client
            .transport()
            .hits("POST", "/fileService/xfer-1/CancelUpload"),
        1
    );
    assert_eq!(
        client
            .transport()
            .hits("POST", "/fileService/xfer-1/CompleteUpload"),
        0
    );
}

fn script_download_begin(transport: &MockTransport, transfer_id: &str, size: u64) {
    transport.on_post(
        "/fileService",
        MockResponse::body(format!(
            r#"{{"FileTransfer":{{"FileTransferID":"{transfer_id}","FileSizeBytes":{size}}},"QueuedMessageId":"t-dl"}}"#
        )),
    );
    transport.on_get(
        "/TaskInfo/t-dl",
        MockResponse::body(r#"{"State":4,"Result":"","Errors":{}}"#),
    );
}

#[tokio::test]
async fn download_reassembles_the_reported_size() {
    let transport = MockTransport::new();
    script_download_begin(&transport, "xfer-2", 10);
    transport.on_get_bytes(
        "/fileService/xfer-2?Position=0&ChunkSize=4",
        b"abcd".to_vec(),
    );
    transport.on_get_bytes(
        "/fileService/xfer-2?Position=4&ChunkSize=4",
        b"efgh".to_vec(),
    );
    transport.on_get_bytes("/fileService/xfer-2?Position=8&ChunkSize=4", b"ij".to_vec());
    transport.on_post("/fileService/xfer-2/CompleteDownload", MockResponse::body(""));

    let client = TransferClient::new(transport, config_with_chunk(4));
    let data = client.download("st-1", "/data.bin").await.unwrap();
    assert_eq!(data, b"abcdefghij");
    assert_eq!(
        client
            .transport()
            .hits("POST", "/fileService/xfer-2/CompleteDownload"),
        1
    );
}

#[tokio::test]
async fn download_ends_on_an_empty_chunk_at_an_exact_multiple() {
    let transport = MockTransport::new();
    script_download_begin(&transport, "xfer-2", 8);
    transport.on_get_bytes(
        "/fileService/xfer-2?Position=0&ChunkSize=4",
        b"abcd".to_vec(),
    );
    transport.on_get_bytes(
        "/fileService/xfer-2?Position=4&ChunkSize=4",
        b"efgh".to_vec(),
    );
    transport.on_get_bytes("/fileService/xfer-2?Position=8&ChunkSize=4", Vec::new());
    transport.on_post("/fileService/xfer-2/CompleteDownload", MockResponse::body(""));

    let client = TransferClient::new(transport, config_with_chunk(4));
    let data = client.download("st-1", "/data.bin").await.unwrap();
    assert_eq!(data, b"abcdefgh");
}

#[tokio::test]
async fn short_download_cancels_and_fails() {
    let transport = MockTransport::new();
    script_download_begin(&transport, "xfer-2", 99);
    transport.on_get_bytes("/fileService/xfer-2?Position=0&ChunkSize=4", b"ab".to_vec());
    transport.on_post("/fileService/xfer-2/CancelDownload", MockResponse::body(""));

    let client = TransferClient::new(transport, config_with_chunk(4));
    let err = client.download("st-1", "/data.bin").await.unwrap_err();
    assert!(matches!(err, StorageError::TransferFailed(_)));
    assert_eq!(
        client
            .transport()
            .hits("POST", "/fileService/xfer-2/CancelDownload"),
        1
    );
}
