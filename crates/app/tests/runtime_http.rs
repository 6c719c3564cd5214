use std::{
    io::{Read, Write},
    net::{SocketAddr, TcpStream},
    thread,
    time::{Duration, Instant},
};

use clap::Parser;
use person_stream::vision::{PipelineState, VisionCliArgs, VisionConfig, VisionRuntime};

fn stub_config(labels: &std::path::Path) -> VisionConfig {
    let args = VisionCliArgs::try_parse_from([
        "person-stream",
        "--model",
        "stub://",
        "--labels",
        labels.to_str().unwrap(),
        "--camera",
        "stub://",
        "--host",
        "127.0.0.1",
        "--port",
        "0",
        "--cpu",
        "--stream-timeout-ms",
        "50",
    ])
    .unwrap();
    VisionConfig::try_from(args).unwrap()
}

fn connect(addr: SocketAddr, path: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    write!(
        stream,
        "GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
    )
    .unwrap();
    stream
}

fn get(addr: SocketAddr, path: &str) -> String {
    let mut response = String::new();
    connect(addr, path).read_to_string(&mut response).unwrap();
    response
}

#[test]
fn stub_runtime_serves_stream_and_json() {
    let dir = tempfile::tempdir().unwrap();
    let labels = dir.path().join("labels.txt");
    std::fs::write(&labels, "0 person\n").unwrap();

    let runtime = VisionRuntime::launch(&stub_config(&labels)).unwrap();
    let addr = runtime.local_addrs()[0];
    let status = runtime.status();

    let deadline = Instant::now() + Duration::from_secs(5);
    while status.frames_processed() == 0 {
        assert!(Instant::now() < deadline, "no frames processed");
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(status.state(), PipelineState::Running);

    let detections = get(addr, "/detections");
    assert!(detections.starts_with("HTTP/1.1 200"));
    assert!(detections.contains("access-control-allow-origin: *"));
    assert!(detections.contains(r#"{"detections":[]"#));

    let status_body = get(addr, "/status");
    assert!(status_body.contains(r#""state":"running""#));
    assert!(status_body.contains(r#""mode":"cpu""#));

    let mut feed = connect(addr, "/video_feed");
    let mut received = Vec::new();
    let mut chunk = [0u8; 4096];
    let marker = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\xFF\xD8";
    while !received.windows(marker.len()).any(|window| window == marker) {
        let read = feed.read(&mut chunk).unwrap();
        assert!(read > 0, "stream ended before the first part");
        received.extend_from_slice(&chunk[..read]);
    }
    let head = String::from_utf8_lossy(&received).to_lowercase();
    assert!(head.contains("multipart/x-mixed-replace; boundary=frame"));
    drop(feed);

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    shutdown_tx.send(()).unwrap();
    runtime.wait(&shutdown_rx);
    runtime.shutdown().unwrap();
}

#[test]
fn missing_label_file_fails_to_launch() {
    let dir = tempfile::tempdir().unwrap();
    let err = VisionRuntime::launch(&stub_config(&dir.path().join("absent.txt")))
        .err()
        .expect("launch should fail");
    assert!(format!("{err:#}").contains("label file"));
}
