//! HttpVision against a local one-shot HTTP server.

use carscan::config::secrets::SecretString;
use carscan::error::Error;
use carscan::model::{ImageRef, TextDetection, TextKind};
use carscan::vision::{Annotator, Classifier, HttpVision};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Answer exactly one request with `status` and `body`. The handle yields
/// the raw request text.
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream).await;
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
        request
    });
    (endpoint, server)
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn image() -> ImageRef {
    ImageRef::new("car-images", "a.jpg")
}

#[tokio::test]
async fn detect_labels_parses_response_and_sends_bearer_token() {
    let (endpoint, server) = serve_once(
        "200 OK",
        r#"{"labels":[{"name":"Car","confidence":97.5},{"name":"Vehicle","confidence":99.0}]}"#,
    )
    .await;
    let vision = HttpVision::new(endpoint, Some(SecretString::from("vk-test"))).unwrap();

    let labels = vision.detect_labels(&image(), 90.0).await.unwrap();
    assert_eq!(labels.len(), 2);
    assert_eq!(labels[0].name, "Car");
    assert_eq!(labels[0].confidence, 97.5);

    let request = server.await.unwrap();
    let lowered = request.to_ascii_lowercase();
    assert!(lowered.starts_with("post /detect-labels "), "{request}");
    assert!(lowered.contains("authorization: bearer vk-test"), "{request}");
    assert!(request.contains(r#""key":"a.jpg""#), "{request}");
    assert!(request.contains(r#""min_confidence":90"#), "{request}");
}

#[tokio::test]
async fn detect_text_parses_kinds_without_key() {
    let (endpoint, server) = serve_once(
        "200 OK",
        r#"{"text_detections":[{"text":"NJ 1234","kind":"LINE"},{"text":"NJ","kind":"WORD"}]}"#,
    )
    .await;
    let vision = HttpVision::new(format!("{endpoint}/"), None).unwrap();

    let detections = vision.detect_text(&image()).await.unwrap();
    assert_eq!(
        detections,
        vec![TextDetection::line("NJ 1234"), TextDetection::word("NJ")]
    );
    assert_eq!(detections[1].kind, TextKind::Word);

    let request = server.await.unwrap().to_ascii_lowercase();
    assert!(request.starts_with("post /detect-text "), "{request}");
    assert!(!request.contains("authorization:"), "{request}");
}

#[tokio::test]
async fn non_success_status_is_a_vision_error() {
    let (endpoint, server) = serve_once(
        "500 Internal Server Error",
        r#"{"error":"model offline"}"#,
    )
    .await;
    let vision = HttpVision::new(endpoint, None).unwrap();

    let err = vision.detect_labels(&image(), 90.0).await.unwrap_err();
    match err {
        Error::Vision(message) => {
            assert!(message.contains("500"), "{message}");
            assert!(message.contains("model offline"), "{message}");
        }
        other => panic!("expected Error::Vision, got {other:?}"),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn hung_service_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(stream);
    });

    let vision = HttpVision::with_timeout(endpoint, None, Duration::from_millis(100)).unwrap();
    let started = tokio::time::Instant::now();
    let err = vision.detect_text(&image()).await.unwrap_err();

    assert!(
        matches!(err, Error::Http(ref e) if e.is_timeout()),
        "expected a timeout, got {err:?}"
    );
    assert!(started.elapsed() < Duration::from_secs(2));
    server.abort();
}
