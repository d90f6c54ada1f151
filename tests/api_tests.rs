use std::sync::Arc;
use tokio::sync::mpsc;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stitch_pip::api::{ApiError, OpenSubtitlesClient, SubtitleFinder, WhisperClient};
use stitch_pip::capture::{AudioChunk, TranscriptionPipeline};
use stitch_pip::config::{SubtitleConfig, TranscriptionConfig};

const SRT: &str = "1\n00:00:01,000 --> 00:00:02,000\nHello\n";

fn subtitles_config(server: &MockServer) -> SubtitleConfig {
    SubtitleConfig {
        base_url: server.uri(),
        api_key: Some("os-key".to_string()),
        ..SubtitleConfig::default()
    }
}

fn transcription_config(server: &MockServer) -> TranscriptionConfig {
    TranscriptionConfig {
        base_url: server.uri(),
        api_key: Some("sk-test".to_string()),
        ..TranscriptionConfig::default()
    }
}

#[tokio::test]
async fn test_search_then_download() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/subtitles"))
        .and(query_param("query", "Spirited Away"))
        .and(query_param("languages", "en,ja"))
        .and(header("Api-Key", "os-key"))
        .and(header("User-Agent", "AISubtitleSearch v2.0.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"attributes": {"files": [{"file_id": 4242}, {"file_id": 7}]}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/download"))
        .and(body_json(serde_json::json!({"file_id": 4242})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "link": format!("{}/files/4242.srt", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/4242.srt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SRT))
        .mount(&server)
        .await;

    let finder = SubtitleFinder::new(OpenSubtitlesClient::new(subtitles_config(&server)).unwrap());
    let content = finder.smart_process("Spirited Away").await.unwrap();
    assert_eq!(content, SRT);
}

#[tokio::test]
async fn test_no_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subtitles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .mount(&server)
        .await;

    let finder = SubtitleFinder::new(OpenSubtitlesClient::new(subtitles_config(&server)).unwrap());
    let err = finder.smart_process("Nothing").await.unwrap_err();
    assert!(matches!(err, ApiError::NoResults));
    assert_eq!(err.to_string(), "No subtitles found");
}

#[tokio::test]
async fn test_missing_download_link() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/download"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"remaining": 0})))
        .mount(&server)
        .await;

    let client = OpenSubtitlesClient::new(subtitles_config(&server)).unwrap();
    assert!(matches!(client.download(1).await, Err(ApiError::MissingLink)));
}

#[tokio::test]
async fn test_failed_file_fetch_is_not_subtitle_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/download"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "link": format!("{}/files/gone.srt", server.uri())
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/gone.srt"))
        .respond_with(ResponseTemplate::new(404).set_body_string("<html>Not Found</html>"))
        .mount(&server)
        .await;

    let client = OpenSubtitlesClient::new(subtitles_config(&server)).unwrap();
    match client.download(9).await {
        Err(ApiError::Status { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "<html>Not Found</html>");
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn test_search_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subtitles"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
        .mount(&server)
        .await;

    let client = OpenSubtitlesClient::new(subtitles_config(&server)).unwrap();
    match client.search("Anything").await {
        Err(ApiError::Status { status, message }) => {
            assert_eq!(status, 401);
            assert_eq!(message, "invalid key");
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_key_skips_request() {
    let server = MockServer::start().await;
    let config = SubtitleConfig {
        api_key: None,
        ..subtitles_config(&server)
    };

    let client = OpenSubtitlesClient::new(config).unwrap();
    assert!(matches!(client.search("x").await, Err(ApiError::MissingKey("OpenSubtitles"))));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_transcription_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_string_contains("audio.mp4"))
        .and(body_string_contains("whisper-1"))
        .and(body_string_contains("vtt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("WEBVTT\n\n00:00.000 --> 00:01.000\nhi\n"))
        .expect(1)
        .mount(&server)
        .await;

    let client = WhisperClient::new(transcription_config(&server)).unwrap();
    let text = client.transcribe_chunk(b"fake audio".to_vec(), "audio/mp4").await.unwrap();
    assert!(text.starts_with("WEBVTT"));
}

#[tokio::test]
async fn test_transcription_error_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {"message": "Invalid file format."}
        })))
        .mount(&server)
        .await;

    let client = WhisperClient::new(transcription_config(&server)).unwrap();
    let err = client.transcribe_chunk(b"x".to_vec(), "audio/webm").await.unwrap_err();
    assert_eq!(err.to_string(), "API Error 400: Invalid file format.");
}

#[tokio::test]
async fn test_transcription_error_without_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = WhisperClient::new(transcription_config(&server)).unwrap();
    match client.transcribe_chunk(b"x".to_vec(), "audio/webm").await {
        Err(ApiError::Status { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "Internal Server Error");
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn test_pipeline_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .and(body_string_contains("good"))
        .respond_with(ResponseTemplate::new(200).set_body_string("WEBVTT\n\n00:00.000 --> 00:02.000\nok\n"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .and(body_string_contains("broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = Arc::new(WhisperClient::new(transcription_config(&server)).unwrap());
    let (chunk_tx, chunk_rx) = mpsc::channel(4);
    let (update_tx, mut update_rx) = mpsc::channel(4);
    let handle = TranscriptionPipeline::new(client).spawn(chunk_rx, update_tx);

    for (data, offset) in [(&b"broken"[..], 0.0), (&b"good"[..], 5.0)] {
        chunk_tx
            .send(AudioChunk {
                data: data.to_vec(),
                mime: "audio/webm".to_string(),
                offset,
            })
            .await
            .unwrap();
    }
    drop(chunk_tx);

    let update = update_rx.recv().await.unwrap();
    assert_eq!(update.offset, 5.0);
    assert!(update.content.contains("ok"));
    assert_eq!(handle.await.unwrap(), 1);
}
