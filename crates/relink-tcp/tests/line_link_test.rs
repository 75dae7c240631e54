//! LineLink over real TCP streams

use std::time::Duration;

use relink_tcp::{
    LineLink, Link, LinkState, Stream, StreamFactory, TcpStreamFactory, TransportError,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

async fn bound_link(address: &str) -> LineLink {
    let factory = TcpStreamFactory::builder().connect_timeout_ms(2000).build();
    let mut stream = factory.create(address).unwrap();
    stream.set_char_timeout(Duration::from_millis(500));
    stream.open().await.unwrap();
    stream.flush().await.unwrap();

    let mut link = LineLink::new();
    link.set_io(stream);
    assert_eq!(link.open().await.unwrap(), 0);
    link
}

#[tokio::test]
async fn test_query_reply_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 6];
        socket.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"*IDN?\n");
        // Reply split across writes
        socket.write_all(b"ACME,PSU-").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        socket.write_all(b"3000,0,1.2\r\n").await.unwrap();
    });

    let mut link = bound_link(&address).await;
    assert_eq!(link.endpoint().as_deref(), Some(address.as_str()));

    link.send_line("*IDN?").await.unwrap();
    assert_eq!(
        link.recv_line().await.unwrap().as_deref(),
        Some("ACME,PSU-3000,0,1.2")
    );

    server.await.unwrap();
    // Server hung up after replying
    assert_eq!(link.recv_line().await.unwrap(), None);
    assert!(matches!(link.state(), LinkState::Failed { .. }));

    link.close().await;
    assert_eq!(link.state(), LinkState::Closed);
}

#[tokio::test]
async fn test_silent_peer_hits_char_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_millis(800)).await;
        drop(socket);
    });

    let mut link = bound_link(&address).await;
    assert!(matches!(
        link.recv_line().await,
        Err(TransportError::ReadTimeout { .. })
    ));

    link.close().await;
    server.await.unwrap();
}
