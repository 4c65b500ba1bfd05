//! End-to-end tests for CONNECT tunnelling.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use warp_proxy::config::ProxyConfig;
use warp_proxy::http::CONNECT_ESTABLISHED;

mod common;

async fn open_tunnel(proxy: std::net::SocketAddr, authority: &str) -> TcpStream {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    let request = format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n\r\n", authority, authority);
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut reply = vec![0u8; CONNECT_ESTABLISHED.len()];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, CONNECT_ESTABLISHED);
    stream
}

#[tokio::test]
async fn tunnel_echoes_bytes_in_order() {
    let (echo, _closed) = common::start_echo_server().await;
    let proxy = common::start_proxy(ProxyConfig::default()).await;

    let mut stream = open_tunnel(proxy.addr, &echo.to_string()).await;

    let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    let (mut reader, mut writer) = stream.split();
    let expected = payload.clone();
    let (sent, received) = tokio::join!(
        async move { writer.write_all(&payload).await },
        async move {
            let mut buf = vec![0u8; expected.len()];
            reader.read_exact(&mut buf).await.map(|_| buf == expected)
        }
    );
    sent.unwrap();
    assert!(received.unwrap());
}

#[tokio::test]
async fn client_close_closes_target() {
    let (echo, mut closed) = common::start_echo_server().await;
    let proxy = common::start_proxy(ProxyConfig::default()).await;

    let mut stream = open_tunnel(proxy.addr, &echo.to_string()).await;
    stream.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");

    drop(stream);
    tokio::time::timeout(Duration::from_secs(1), closed.recv())
        .await
        .expect("target side should close promptly")
        .unwrap();
}

#[tokio::test]
async fn unreachable_tunnel_target_closes_after_success_line() {
    let proxy = common::start_proxy(ProxyConfig::default()).await;
    let port = common::closed_port().await;

    let mut stream = open_tunnel(proxy.addr, &format!("127.0.0.1:{}", port)).await;
    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rest))
        .await
        .expect("proxy should close the connection")
        .unwrap_or_default();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn idle_tunnel_is_closed() {
    let (echo, mut closed) = common::start_echo_server().await;
    let mut config = ProxyConfig::default();
    config.timeouts.idle_secs = 1;
    let proxy = common::start_proxy(config).await;

    let _stream = open_tunnel(proxy.addr, &echo.to_string()).await;
    tokio::time::timeout(Duration::from_secs(3), closed.recv())
        .await
        .expect("idle tunnel should be torn down")
        .unwrap();
}

#[tokio::test]
async fn bytes_sent_with_the_connect_head_reach_the_target() {
    let (echo, _closed) = common::start_echo_server().await;
    let proxy = common::start_proxy(ProxyConfig::default()).await;

    let mut stream = TcpStream::connect(proxy.addr).await.unwrap();
    let request = format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n\r\nEARLY", echo, echo);
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut reply = vec![0u8; CONNECT_ESTABLISHED.len()];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, CONNECT_ESTABLISHED);

    let mut early = [0u8; 5];
    tokio::time::timeout(Duration::from_secs(2), stream.read_exact(&mut early))
        .await
        .expect("early bytes should be echoed")
        .unwrap();
    assert_eq!(&early, b"EARLY");

    stream.write_all(b"LATE").await.unwrap();
    let mut late = [0u8; 4];
    stream.read_exact(&mut late).await.unwrap();
    assert_eq!(&late, b"LATE");
}
