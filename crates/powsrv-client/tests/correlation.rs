//! Request/response correlation over a real socket.
//!
//! The echo server here answers out of order on purpose: each request is
//! answered from its own thread after a delay derived from its payload.

#![cfg(unix)]

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use powsrv_client::{ClientConfig, ClientError, PowClient};
use powsrv_frame::{encode_frame, Command, FrameReader};
use powsrv_transport::{Endpoint, IpcListener};

fn unique_endpoint(tag: &str) -> Endpoint {
    let dir = std::env::temp_dir().join(format!("powsrv-corr-{tag}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    Endpoint::Unix(dir.join("s.sock"))
}

/// Echo every request payload back as a `Response`, delayed by `delay(payload)`.
fn spawn_echo_server(
    endpoint: &Endpoint,
    delay: fn(&[u8]) -> Duration,
) -> (Endpoint, thread::JoinHandle<()>) {
    let listener = IpcListener::bind(endpoint).unwrap();
    let local = listener.local_endpoint();
    let handle = thread::spawn(move || {
        let stream = listener.accept().unwrap();
        let out = Arc::new(Mutex::new(stream.try_clone().unwrap()));
        let mut reader = FrameReader::new(stream);
        let mut workers = Vec::new();
        while let Ok(frame) = reader.read_frame() {
            let out = Arc::clone(&out);
            workers.push(thread::spawn(move || {
                thread::sleep(delay(&frame.payload));
                let mut buf = BytesMut::new();
                encode_frame(
                    frame.request_id,
                    Command::Response.code(),
                    &frame.payload,
                    &mut buf,
                )
                .unwrap();
                let _ = out.lock().unwrap().write_all(&buf);
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }
    });
    (local, handle)
}

fn scattered(payload: &[u8]) -> Duration {
    let sum: u64 = payload.iter().map(|b| u64::from(*b)).sum();
    Duration::from_millis(sum % 13)
}

#[test]
fn every_concurrent_caller_gets_its_own_reply() {
    let (endpoint, server) = spawn_echo_server(&unique_endpoint("many"), scattered);
    let client = PowClient::connect(&endpoint).unwrap();

    thread::scope(|scope| {
        let handles: Vec<_> = (0..255)
            .map(|i| {
                let client = &client;
                scope.spawn(move || {
                    let payload = format!("caller-{i}");
                    let reply = client
                        .call(Command::PowFunc, payload.as_bytes(), Duration::from_secs(10))
                        .unwrap();
                    assert_eq!(reply.as_ref(), payload.as_bytes());
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    });

    drop(client);
    server.join().unwrap();
}

#[test]
fn timeout_is_bounded_and_connection_survives() {
    fn slow_first(payload: &[u8]) -> Duration {
        if payload == b"slow" {
            Duration::from_millis(300)
        } else {
            Duration::ZERO
        }
    }

    let (endpoint, server) = spawn_echo_server(&unique_endpoint("timeout"), slow_first);
    let client = PowClient::connect(&endpoint).unwrap();

    let timeout = Duration::from_millis(50);
    let started = Instant::now();
    let err = client.call(Command::PowFunc, b"slow", timeout).unwrap_err();
    let elapsed = started.elapsed();
    assert!(matches!(err, ClientError::Timeout(t) if t == timeout));
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + Duration::from_millis(200), "{elapsed:?}");

    let reply = client
        .call(Command::PowFunc, b"fast", Duration::from_secs(2))
        .unwrap();
    assert_eq!(reply.as_ref(), b"fast");

    // Let the late reply for "slow" arrive and be discarded.
    thread::sleep(Duration::from_millis(400));
    let reply = client
        .call(Command::PowFunc, b"after", Duration::from_secs(2))
        .unwrap();
    assert_eq!(reply.as_ref(), b"after");
    assert!(!client.is_closed());

    drop(client);
    server.join().unwrap();
}

#[test]
fn works_over_tcp() {
    let (endpoint, server) = spawn_echo_server(
        &"tcp://127.0.0.1:0".parse::<Endpoint>().unwrap(),
        |_| Duration::ZERO,
    );
    assert!(matches!(endpoint, Endpoint::Tcp(_)));

    let config = ClientConfig {
        timeout: Duration::from_secs(2),
        ..ClientConfig::default()
    };
    let client = PowClient::connect_with_config(&endpoint, config).unwrap();
    let reply = client
        .call(Command::GetServerVersion, b"echo", Duration::from_secs(2))
        .unwrap();
    assert_eq!(reply.as_ref(), b"echo");

    drop(client);
    server.join().unwrap();
}
