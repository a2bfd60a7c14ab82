//! End-to-end tests over the real TCP transport, against an in-process
//! server that speaks just enough RESP for the handshake and a few
//! commands. No external Redis required.

use std::io::Cursor;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use redis_leaf::{
    Client, ClientConfig, ConnectionStatus, Payload, ProtocolVersion, RespValue, StatusEvent,
};
use redis_leaf::protocol::RespDecoder;

const STEP: Duration = Duration::from_secs(5);

/// Serve RESP commands on one connection; `limit` bounds how many
/// non-handshake commands are answered before the server hangs up.
async fn serve_connection(mut stream: TcpStream, limit: Option<usize>) {
    let mut buffer = BytesMut::with_capacity(4096);
    let mut served = 0usize;

    loop {
        let command = loop {
            let mut cursor = Cursor::new(&buffer[..]);
            match RespDecoder::decode(&mut cursor) {
                Ok(Some(value)) => {
                    let consumed = cursor.position() as usize;
                    buffer.advance(consumed);
                    break value;
                }
                Ok(None) => match stream.read_buf(&mut buffer).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                },
                Err(_) => return,
            }
        };

        let args: Vec<String> = match command {
            RespValue::Array(items) => items
                .iter()
                .filter_map(|item| item.as_string().ok())
                .collect(),
            _ => return,
        };
        let name = args.first().map(String::as_str).unwrap_or("");

        let reply: Vec<u8> = match name {
            "HELLO" => b"%1\r\n$6\r\nserver\r\n$5\r\nredis\r\n".to_vec(),
            "CLUSTER" => b"$12\r\nfake-node-id\r\n".to_vec(),
            "PING" => b"+PONG\r\n".to_vec(),
            "ECHO" => {
                let arg = args.get(1).cloned().unwrap_or_default();
                format!("${}\r\n{}\r\n", arg.len(), arg).into_bytes()
            }
            _ => b"-ERR unknown command\r\n".to_vec(),
        };
        if stream.write_all(&reply).await.is_err() {
            return;
        }

        if !matches!(name, "HELLO" | "CLUSTER") {
            served += 1;
            if limit.is_some_and(|l| served >= l) {
                return; // drop the connection
            }
        }
    }
}

/// Bind a local server answering every accepted connection.
async fn spawn_server(limit: Option<usize>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    tokio::spawn(serve_connection(stream, limit));
                }
                Err(_) => return,
            }
        }
    });
    port
}

#[tokio::test]
async fn commands_round_trip_over_tcp() {
    let port = spawn_server(None).await;
    let client = Client::start("127.0.0.1", port, ClientConfig::new()).unwrap();

    let pong = timeout(STEP, client.command(Payload::command(["PING"])))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pong, RespValue::SimpleString("PONG".to_string()));

    let echoed = timeout(STEP, client.command(Payload::command(["ECHO", "hello"])))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(echoed.as_string().unwrap(), "hello");

    client.stop().await;
}

#[tokio::test]
async fn pipelined_payload_yields_grouped_reply() {
    let port = spawn_server(None).await;
    let client = Client::start("127.0.0.1", port, ClientConfig::new()).unwrap();

    let batch = Payload::pipeline([
        Payload::command(["PING"]),
        Payload::command(["ECHO", "x"]),
    ]);
    let reply = timeout(STEP, client.command(batch)).await.unwrap().unwrap();

    match reply {
        RespValue::Array(items) => {
            assert_eq!(items.len(), 2);
            assert_eq!(items[0], RespValue::SimpleString("PONG".to_string()));
            assert_eq!(items[1].as_string().unwrap(), "x");
        }
        other => panic!("expected grouped reply, got {other:?}"),
    }

    client.stop().await;
}

#[tokio::test]
async fn handshake_reports_cluster_id() {
    let port = spawn_server(None).await;
    let (status_tx, mut status_rx) = mpsc::unbounded_channel::<StatusEvent>();
    let client = Client::start(
        "127.0.0.1",
        port,
        ClientConfig::new()
            .with_cluster_id(true)
            .with_status_channel(status_tx),
    )
    .unwrap();

    let up = timeout(STEP, status_rx.recv()).await.unwrap().unwrap();
    assert_eq!(up.status, ConnectionStatus::Up);
    assert_eq!(up.cluster_id, Some("fake-node-id".into()));

    client.stop().await;
}

#[tokio::test]
async fn reconnects_after_server_drops_connection() {
    // each connection serves exactly one command, forcing a reconnect
    let port = spawn_server(Some(1)).await;
    let client = Client::start(
        "127.0.0.1",
        port,
        ClientConfig::new()
            .with_resp_version(ProtocolVersion::Resp2)
            .with_reconnect_wait(Duration::from_millis(50))
            .with_node_down_timeout(Duration::from_secs(30)),
    )
    .unwrap();

    for _ in 0..3 {
        let pong = timeout(STEP, client.command(Payload::command(["PING"])))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pong, RespValue::SimpleString("PONG".to_string()));
    }

    client.stop().await;
}
