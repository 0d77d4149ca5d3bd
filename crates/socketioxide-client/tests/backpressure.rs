mod fixture;

use std::time::Duration;

use fixture::{StubTransport, config, timeout_rcv, wait_until};
use socketioxide_client::{Client, Error};
use tokio::sync::mpsc;

/// Let the writer dequeue the first frame and block on its write.
async fn writer_blocked() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn full_queue_rejects_emits() {
    let (transport, mut server) = StubTransport::new();
    let _gate = transport.gate_writes();
    let client = Client::connect(config().max_buffer_size(4).build(), transport, "/chat")
        .await
        .unwrap();
    let _conn = server.accept().await;

    client.emit("greet", "0").unwrap();
    writer_blocked().await;
    client.emit("greet", "1").unwrap();
    for i in 2..=4 {
        client.emit("greet", &i.to_string()).unwrap();
    }
    assert!(matches!(
        client.emit("greet", "overflow"),
        Err(Error::Overflow)
    ));
}

#[tokio::test]
async fn overflow_tears_down() {
    let (transport, mut server) = StubTransport::new();
    let gate = transport.gate_writes();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = Client::builder(config().max_buffer_size(4).build())
        .on("disconnection", move || {
            let tx = tx.clone();
            async move { tx.send(()).unwrap() }
        })
        .unwrap()
        .connect(transport, "/chat")
        .await
        .unwrap();
    let mut conn = server.accept().await;

    client.emit("greet", "0").unwrap();
    writer_blocked().await;
    client.emit("greet", "1").unwrap();
    client.emit("greet", "2").unwrap();
    client.emit("greet", "3").unwrap();

    // the writer finishes its frame and finds the queue at the high watermark
    gate.add_permits(1);
    assert_eq!(conn.recv().await, r#"42/chat,["greet","0"]"#);
    timeout_rcv(&mut rx).await;
    assert!(!client.is_connected());
    assert!(!client.is_overflowing());
    assert!(matches!(client.emit("greet", "4"), Err(Error::Closed)));
}

#[tokio::test]
async fn overflow_advisory() {
    let (transport, mut server) = StubTransport::new();
    let gate = transport.gate_writes();
    let client = Client::connect(config().max_buffer_size(8).build(), transport, "/chat")
        .await
        .unwrap();
    let mut conn = server.accept().await;

    client.emit("greet", "0").unwrap();
    writer_blocked().await;
    client.emit("greet", "1").unwrap();
    for i in 2..=5 {
        client.emit("greet", &i.to_string()).unwrap();
    }
    assert!(!client.is_overflowing());

    // five frames queued when the writer samples the depth: more than half of 8
    gate.add_permits(1);
    assert_eq!(conn.recv().await, r#"42/chat,["greet","0"]"#);
    wait_until(|| client.is_overflowing()).await;
    assert!(client.is_connected());

    gate.add_permits(100);
    for i in 1..=5 {
        assert_eq!(conn.recv().await, format!(r#"42/chat,["greet","{i}"]"#));
    }
    wait_until(|| !client.is_overflowing()).await;
    assert!(client.is_connected());
}

#[tokio::test]
async fn undersized_buffer_is_raised() {
    let (transport, mut server) = StubTransport::new();
    let mut config = config().build();
    config.max_buffer_size = 0;
    let client = Client::connect(config, transport, "/chat").await.unwrap();
    let mut conn = server.accept().await;
    // let the writer reach the empty queue
    writer_blocked().await;

    client.emit("greet", "hello").unwrap();
    assert_eq!(conn.recv().await, r#"42/chat,["greet","hello"]"#);
    client.emit("greet", "again").unwrap();
    assert_eq!(conn.recv().await, r#"42/chat,["greet","again"]"#);
    assert!(client.is_connected());
}
