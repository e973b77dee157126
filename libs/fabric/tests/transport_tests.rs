use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_core::{Payload, Topic, Value, WireType};
use tether_fabric::{
    codec::{BincodeCodec, Codec},
    error::Error,
    frame::{self, Frame},
    transport::{team_addresses, ConnectionEvent, Endpoint, MemoryTransport, TcpTransport, Transport},
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

/// Helper to get a free port
async fn get_listener() -> (TcpListener, std::net::SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Poll `cond` until it holds or a second passes
async fn wait_for(cond: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

fn record_events(transport: &dyn Transport) -> Arc<Mutex<Vec<ConnectionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    transport.add_connection_listener(Arc::new(move |event: &ConnectionEvent| {
        sink.lock().unwrap().push(event.clone());
    }));
    events
}

// Framing

#[tokio::test]
async fn frames_preserve_boundaries() {
    let (listener, addr) = get_listener().await;

    // Spawn server that echoes three frames
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (mut reader, mut writer) = frame::split(stream);
        for _ in 0..3 {
            let frame = reader.receive().await.unwrap();
            writer.send(&frame).await.unwrap();
        }
    });

    let stream = frame::connect(&addr.to_string(), Duration::from_secs(1))
        .await
        .unwrap();
    let (mut reader, mut writer) = frame::split(stream);
    let frames = vec![
        Frame::Hello {
            identity: "dashboard".into(),
        },
        Frame::Subscribe {
            topic: "MyPose".into(),
            wire_type: "struct:Pose2d".into(),
        },
        Frame::Update {
            topic: "speed".into(),
            payload: Value::DoubleArray(vec![1.0, 2.5]).into(),
        },
    ];

    for frame in &frames {
        writer.send(frame).await.unwrap();
        assert_eq!(&reader.receive().await.unwrap(), frame);
    }
}

#[tokio::test]
async fn rejects_oversized_frame() {
    let (listener, addr) = get_listener().await;

    // Server writes a frame header claiming 200MB (over the 100MB limit)
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_u32(200 * 1024 * 1024).await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let stream = frame::connect(&addr.to_string(), Duration::from_secs(1))
        .await
        .unwrap();
    let (mut reader, _writer) = frame::split(stream);

    match reader.receive().await {
        Err(Error::InvalidFrame(msg)) => assert!(msg.contains("too large")),
        other => panic!("Expected InvalidFrame error, got {:?}", other),
    }
}

#[tokio::test]
async fn connection_closed_error() {
    let (listener, addr) = get_listener().await;

    // Spawn server that immediately closes
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    let stream = frame::connect(&addr.to_string(), Duration::from_secs(1))
        .await
        .unwrap();
    let (mut reader, _writer) = frame::split(stream);

    match reader.receive().await {
        Err(Error::ConnectionClosed) => {}
        other => panic!("Expected ConnectionClosed, got {:?}", other),
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Wide {
    a: f64,
    b: f64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Narrow {
    a: f64,
}

#[test]
fn codec_rejects_trailing_bytes() {
    let codec = BincodeCodec;
    let bytes = codec.encode(&Wide { a: 1.0, b: 2.0 }).unwrap();

    assert_eq!(codec.decode::<Wide>(&bytes).unwrap(), Wide { a: 1.0, b: 2.0 });
    assert!(matches!(codec.decode::<Narrow>(&bytes), Err(Error::Codec(_))));
}

// Memory transport

#[tokio::test]
async fn memory_connects_only_to_reachable_targets() {
    let transport = MemoryTransport::new();
    let events = record_events(&transport);
    transport.set_reachable("10.0.0.2", true);
    transport.start_client("dashboard").await.unwrap();

    transport.set_server("10.0.0.9").await.unwrap();
    assert!(!transport.is_connected());

    transport.set_server("10.0.0.2").await.unwrap();
    assert!(transport.is_connected());
    assert_eq!(transport.remote().as_deref(), Some("10.0.0.2"));

    let attempts: Vec<Endpoint> = transport.attempts().into_iter().map(|a| a.endpoint).collect();
    assert_eq!(
        attempts,
        vec![
            Endpoint::Address("10.0.0.9".into()),
            Endpoint::Address("10.0.0.2".into())
        ]
    );
    assert_eq!(
        *events.lock().unwrap(),
        vec![ConnectionEvent::connected("10.0.0.2")]
    );
}

#[tokio::test]
async fn memory_requires_started_client() {
    let transport = MemoryTransport::new();
    assert!(matches!(
        transport.set_server("127.0.0.1").await,
        Err(Error::NotStarted)
    ));
    transport.start_client("dashboard").await.unwrap();
    assert!(matches!(
        transport.set_server("  ").await,
        Err(Error::InvalidAddress(_))
    ));
}

#[tokio::test]
async fn memory_resolves_team_numbers() {
    let transport = MemoryTransport::new();
    transport.set_reachable("10.55.15.2", true);
    transport.start_client("dashboard").await.unwrap();

    transport.set_server_team(5515).await.unwrap();

    assert!(transport.is_connected());
    assert_eq!(transport.remote().as_deref(), Some("10.55.15.2"));
    assert_eq!(team_addresses(5515)[0], "10.55.15.2");
    assert_eq!(team_addresses(254)[1], "roborio-254-FRC.local");
}

#[tokio::test]
async fn memory_link_loss_and_stop_report_disconnects() {
    let transport = MemoryTransport::new();
    let events = record_events(&transport);
    transport.set_reachable("127.0.0.1", true);
    transport.start_client("dashboard").await.unwrap();
    transport.set_server("127.0.0.1").await.unwrap();

    transport.drop_link();
    assert!(!transport.is_connected());

    transport.set_reachable("127.0.0.1", true);
    assert!(transport.is_connected());

    transport.stop_client().await.unwrap();
    assert!(!transport.is_connected());
    assert_eq!(transport.identity(), None);

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            ConnectionEvent::connected("127.0.0.1"),
            ConnectionEvent::disconnected(),
            ConnectionEvent::connected("127.0.0.1"),
            ConnectionEvent::disconnected(),
        ]
    );
}

#[tokio::test]
async fn memory_injected_updates_reach_subscribers() {
    let transport = MemoryTransport::new();
    let default = Payload::from(Value::Integer(-1));
    let subscriber = transport
        .subscriber(&Topic::subscribe("count", WireType::Integer), Some(default.clone()))
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    subscriber.add_listener(Arc::new(move |payload: &Payload| {
        sink.lock().unwrap().push(payload.clone());
    }));

    assert_eq!(subscriber.read(), Some(default));
    assert!(transport.inject("count", Value::Integer(1).into()));
    assert!(transport.inject("count", Value::Integer(2).into()));
    assert!(!transport.inject("other", Value::Integer(3).into()));

    assert_eq!(subscriber.read(), Some(Value::Integer(2).into()));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![Value::Integer(1).into(), Value::Integer(2).into()]
    );
}

#[tokio::test]
async fn memory_counts_transport_level_handles() {
    let transport = MemoryTransport::new();
    let topic = Topic::publish("speed", WireType::Double);
    let publisher = transport.publisher(&topic).unwrap();
    publisher.write(Value::Double(1.0).into());

    assert_eq!(transport.publisher_count("speed"), 1);
    assert_eq!(transport.written("speed"), vec![Value::Double(1.0).into()]);
    assert_eq!(transport.subscriber_count("speed"), 0);
}

// TCP transport

#[tokio::test]
async fn tcp_requires_started_client() {
    let transport = TcpTransport::new();
    assert!(matches!(
        transport.set_server("127.0.0.1").await,
        Err(Error::NotStarted)
    ));
}

#[tokio::test]
async fn tcp_handshake_announces_topics_and_exchanges_updates() {
    let (listener, addr) = get_listener().await;
    let (frames_tx, mut frames_rx) = tokio::sync::mpsc::unbounded_channel();

    // Server: record client frames, push one update for "count"
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (mut reader, mut writer) = frame::split(stream);
        writer
            .send(&Frame::Update {
                topic: "count".into(),
                payload: Value::Integer(7).into(),
            })
            .await
            .unwrap();
        while let Ok(frame) = reader.receive().await {
            frames_tx.send(frame).unwrap();
        }
    });

    let transport = TcpTransport::builder().port(addr.port()).build();
    let events = record_events(&transport);

    // Topics created before the link are replayed in the handshake
    let subscriber = transport
        .subscriber(&Topic::subscribe("count", WireType::Integer), None)
        .unwrap();
    let publisher = transport
        .publisher(&Topic::publish("speed", WireType::Double))
        .unwrap();
    publisher.write(Value::Double(0.5).into());

    transport.start_client("dashboard").await.unwrap();
    transport.set_server("127.0.0.1").await.unwrap();

    assert!(wait_for(|| transport.is_connected()).await);
    assert!(wait_for(|| subscriber.read() == Some(Value::Integer(7).into())).await);

    publisher.write(Value::Double(1.5).into());

    let mut received = Vec::new();
    while received.len() < 5 {
        let frame = tokio::time::timeout(Duration::from_secs(1), frames_rx.recv())
            .await
            .unwrap()
            .unwrap();
        received.push(frame);
    }

    assert_eq!(
        received[0],
        Frame::Hello {
            identity: "dashboard".into()
        }
    );
    assert!(received.contains(&Frame::Announce {
        topic: "speed".into(),
        wire_type: "double".into()
    }));
    assert!(received.contains(&Frame::Subscribe {
        topic: "count".into(),
        wire_type: "int".into()
    }));
    assert!(received.contains(&Frame::Update {
        topic: "speed".into(),
        payload: Value::Double(0.5).into()
    }));
    assert_eq!(
        received[4],
        Frame::Update {
            topic: "speed".into(),
            payload: Value::Double(1.5).into()
        }
    );

    let events = events.lock().unwrap().clone();
    assert_eq!(events.len(), 1);
    assert!(events[0].connected);
    assert_eq!(events[0].remote_id, Some(addr.to_string()));
}

#[tokio::test]
async fn tcp_drops_updates_with_mismatched_type() {
    let (listener, addr) = get_listener().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (mut reader, mut writer) = frame::split(stream);
        for payload in [Value::String("seven".into()), Value::Integer(8)] {
            writer
                .send(&Frame::Update {
                    topic: "count".into(),
                    payload: payload.into(),
                })
                .await
                .unwrap();
        }
        while reader.receive().await.is_ok() {}
    });

    let transport = TcpTransport::builder().port(addr.port()).build();
    let subscriber = transport
        .subscriber(&Topic::subscribe("count", WireType::Integer), None)
        .unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    subscriber.add_listener(Arc::new(move |payload: &Payload| {
        sink.lock().unwrap().push(payload.clone());
    }));

    transport.start_client("dashboard").await.unwrap();
    transport.set_server("127.0.0.1").await.unwrap();

    assert!(wait_for(|| !seen.lock().unwrap().is_empty()).await);
    assert_eq!(*seen.lock().unwrap(), vec![Value::Integer(8).into()]);
}

#[tokio::test]
async fn tcp_reports_link_loss_and_relinks() {
    let (listener, addr) = get_listener().await;

    // Server drops the first connection, keeps the second
    tokio::spawn(async move {
        let (first, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(first);

        let (second, _) = listener.accept().await.unwrap();
        let (mut reader, _writer) = frame::split(second);
        while reader.receive().await.is_ok() {}
    });

    let transport = TcpTransport::builder()
        .port(addr.port())
        .retry_delay(Duration::from_millis(20))
        .build();
    let events = record_events(&transport);

    transport.start_client("dashboard").await.unwrap();
    transport.set_server("127.0.0.1").await.unwrap();

    assert!(wait_for(|| events.lock().unwrap().len() >= 3).await);
    assert!(transport.is_connected());

    let connected: Vec<bool> = events.lock().unwrap().iter().map(|e| e.connected).collect();
    assert_eq!(connected, vec![true, false, true]);

    transport.stop_client().await.unwrap();
    assert!(!transport.is_connected());
    assert_eq!(events.lock().unwrap().last(), Some(&ConnectionEvent::disconnected()));
}

#[tokio::test]
async fn tcp_unreachable_server_stays_disconnected() {
    // Bind then drop to get a port nobody listens on
    let (listener, addr) = get_listener().await;
    drop(listener);

    let transport = TcpTransport::builder()
        .port(addr.port())
        .connect_timeout(Duration::from_millis(100))
        .retry_delay(Duration::from_millis(20))
        .build();
    transport.start_client("dashboard").await.unwrap();
    transport.set_server("127.0.0.1").await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!transport.is_connected());
    transport.stop_client().await.unwrap();
}
