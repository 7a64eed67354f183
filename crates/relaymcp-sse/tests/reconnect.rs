//! Event delivery and resumption against a scripted HTTP server

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, unbounded};
use pretty_assertions::assert_eq;

use relaymcp_core::McpError;
use relaymcp_sse::{SseClient, SseConfig, SseError, SseEvent};

const OK_HEAD: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\n\r\n";

/// Read request lines up to the blank line
fn read_request(stream: &TcpStream) -> Vec<String> {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let line = line.trim_end().to_string();
        if line.is_empty() {
            return lines;
        }
        lines.push(line);
    }
}

fn fast_config(port: u16) -> SseConfig {
    SseConfig::new("127.0.0.1", port)
        .with_reconnect_delay(Duration::from_millis(50))
        .with_poll_interval(Duration::from_millis(10))
}

fn recv(rx: &Receiver<SseEvent>) -> SseEvent {
    rx.recv_timeout(Duration::from_secs(5)).unwrap()
}

/// The id is recorded after the callback returns
fn wait_for_last_id(client: &SseClient, id: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while client.last_event_id().as_deref() != Some(id) {
        assert!(Instant::now() < deadline, "last event id never reached {id}");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_resumes_with_last_event_id() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (events_tx, events_rx) = unbounded();
    let (requests_tx, requests_rx) = unbounded::<Vec<String>>();
    let (sever_tx, sever_rx) = unbounded::<()>();

    let server = thread::spawn(move || {
        let (mut first, _) = listener.accept().unwrap();
        requests_tx.send(read_request(&first)).unwrap();
        first.write_all(OK_HEAD.as_bytes()).unwrap();
        first
            .write_all(b"id: 1\ndata: {\"n\":1}\n\nid: 2\nevent: update\ndata: {\"n\":2}\n\n")
            .unwrap();
        // Third event split across writes
        first.write_all(b"id: 3\ndata: {\"n\"").unwrap();
        first.flush().unwrap();
        thread::sleep(Duration::from_millis(20));
        first.write_all(b":3}\n\n").unwrap();
        sever_rx.recv().unwrap();
        drop(first);

        let (second, _) = listener.accept().unwrap();
        requests_tx.send(read_request(&second)).unwrap();
        // Hold the second connection until the test ends
        sever_rx.recv().ok();
    });

    let client = SseClient::new(fast_config(port).with_api_key("token"), move |event: &SseEvent| {
        events_tx.send(event.clone()).ok();
        Ok(())
    })
    .unwrap();
    client.start().unwrap();

    let first_request = requests_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(first_request[0], "GET /events HTTP/1.1");
    assert!(first_request.contains(&"Accept: text/event-stream".to_string()));
    assert!(first_request.contains(&"Authorization: Bearer token".to_string()));
    assert!(!first_request.iter().any(|line| line.starts_with("Last-Event-ID")));

    let received: Vec<(Option<String>, String)> = (0..3)
        .map(|_| recv(&events_rx))
        .map(|event| (event.id, event.data))
        .collect();
    assert_eq!(
        received,
        vec![
            (Some("1".into()), r#"{"n":1}"#.into()),
            (Some("2".into()), r#"{"n":2}"#.into()),
            (Some("3".into()), r#"{"n":3}"#.into()),
        ]
    );
    wait_for_last_id(&client, "3");

    sever_tx.send(()).unwrap();
    let second_request = requests_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(second_request.contains(&"Last-Event-ID: 3".to_string()));

    drop(sever_tx);
    client.stop();
    server.join().unwrap();
}

#[test]
fn test_non_success_status_reconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (events_tx, events_rx) = unbounded();
    let (errors_tx, errors_rx) = unbounded::<String>();

    let server = thread::spawn(move || {
        let (mut rejected, _) = listener.accept().unwrap();
        read_request(&rejected);
        rejected
            .write_all(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\n\r\n")
            .unwrap();
        drop(rejected);

        let (mut accepted, _) = listener.accept().unwrap();
        read_request(&accepted);
        accepted.write_all(OK_HEAD.as_bytes()).unwrap();
        accepted.write_all(b"data: hello\n\n").unwrap();
        thread::sleep(Duration::from_millis(200));
    });

    let client = SseClient::new(fast_config(port), move |event: &SseEvent| {
        events_tx.send(event.clone()).ok();
        Ok(())
    })
    .unwrap();
    client.set_error_callback(move |error: &SseError| {
        errors_tx.send(error.to_string()).ok();
    });
    client.start().unwrap();

    let error = errors_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(error.contains("503"), "{error}");
    let event = recv(&events_rx);
    assert_eq!(event.data, "hello");
    assert_eq!(event.id, None);
    assert_eq!(client.last_event_id(), None);

    client.stop();
    server.join().unwrap();
}

#[test]
fn test_callback_error_keeps_loop_running() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (events_tx, events_rx) = unbounded();
    let (errors_tx, errors_rx) = unbounded::<String>();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        read_request(&stream);
        stream.write_all(OK_HEAD.as_bytes()).unwrap();
        stream
            .write_all(b"id: a\ndata: bad\n\nid: b\ndata: good\n\n")
            .unwrap();
        thread::sleep(Duration::from_millis(200));
    });

    let client = SseClient::new(fast_config(port), move |event: &SseEvent| {
        if event.data == "bad" {
            return Err(McpError::invalid_params("rejected"));
        }
        events_tx.send(event.clone()).ok();
        Ok(())
    })
    .unwrap();
    client.set_error_callback(move |error: &SseError| {
        errors_tx.send(error.to_string()).ok();
    });
    client.start().unwrap();

    assert_eq!(recv(&events_rx).data, "good");
    let error = errors_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(error.contains("rejected"), "{error}");
    wait_for_last_id(&client, "b");

    client.stop();
    server.join().unwrap();
}

#[test]
fn test_idle_stream_reconnects_with_last_event_id() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (events_tx, events_rx) = unbounded();
    let (errors_tx, errors_rx) = unbounded::<String>();
    let (requests_tx, requests_rx) = unbounded::<Vec<String>>();
    let (done_tx, done_rx) = unbounded::<()>();

    let server = thread::spawn(move || {
        let (mut silent, _) = listener.accept().unwrap();
        read_request(&silent);
        silent.write_all(OK_HEAD.as_bytes()).unwrap();
        silent.write_all(b"id: 7\ndata: last\n\n").unwrap();

        // Keep the first connection open but quiet
        let (second, _) = listener.accept().unwrap();
        requests_tx.send(read_request(&second)).unwrap();
        done_rx.recv().ok();
        drop(silent);
    });

    let config = fast_config(port).with_max_idle(Duration::from_millis(100));
    let client = SseClient::new(config, move |event: &SseEvent| {
        events_tx.send(event.clone()).ok();
        Ok(())
    })
    .unwrap();
    client.set_error_callback(move |error: &SseError| {
        errors_tx.send(error.to_string()).ok();
    });
    client.start().unwrap();

    assert_eq!(recv(&events_rx).data, "last");
    let error = errors_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(error.contains("idle"), "{error}");

    let second_request = requests_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(second_request[0], "GET /events HTTP/1.1");
    assert!(second_request.contains(&"Last-Event-ID: 7".to_string()));

    drop(done_tx);
    client.stop();
    server.join().unwrap();
}

#[test]
fn test_oversized_event_drops_stream() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (events_tx, events_rx) = unbounded();
    let (errors_tx, errors_rx) = unbounded::<String>();
    let (flood_tx, flood_rx) = unbounded::<()>();

    let server = thread::spawn(move || {
        let (mut flooding, _) = listener.accept().unwrap();
        read_request(&flooding);
        flooding.write_all(OK_HEAD.as_bytes()).unwrap();
        flooding.write_all(b"id: 1\ndata: small\n\n").unwrap();
        flood_rx.recv().unwrap();
        // No line terminator ever arrives
        let _ = flooding.write_all(&[b'x'; 256]);

        let (mut resumed, _) = listener.accept().unwrap();
        let request = read_request(&resumed);
        assert!(request.contains(&"Last-Event-ID: 1".to_string()));
        resumed.write_all(OK_HEAD.as_bytes()).unwrap();
        resumed.write_all(b"id: 2\ndata: after\n\n").unwrap();
        thread::sleep(Duration::from_millis(200));
    });

    let config = fast_config(port).with_max_event_size(64);
    let client = SseClient::new(config, move |event: &SseEvent| {
        events_tx.send(event.clone()).ok();
        Ok(())
    })
    .unwrap();
    client.set_error_callback(move |error: &SseError| {
        errors_tx.send(error.to_string()).ok();
    });
    client.start().unwrap();

    assert_eq!(recv(&events_rx).data, "small");
    wait_for_last_id(&client, "1");
    flood_tx.send(()).unwrap();
    let error = errors_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(error.contains("exceeds 64 bytes"), "{error}");
    assert_eq!(recv(&events_rx).data, "after");
    wait_for_last_id(&client, "2");

    client.stop();
    server.join().unwrap();
}
