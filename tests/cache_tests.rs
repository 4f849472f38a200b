//! Black-box tests of the public `Cache` surface, including the
//! `with_connector` seam used to substitute a fake origin in-process
//! instead of dialing real TCP.

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use teeproxy::connector::{AsyncDuplex, Connector};
use teeproxy::Cache;
use tokio::io::{duplex, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

struct FakeConnector {
    response: &'static [u8],
    connects: Arc<AtomicUsize>,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _host: &str) -> std::io::Result<Box<dyn AsyncDuplex>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let (remote, local) = duplex(4096);
        let response = self.response;
        tokio::spawn(async move {
            let mut remote = remote;
            let mut req = vec![0u8; 512];
            let _ = tokio::io::AsyncReadExt::read(&mut remote, &mut req).await;
            let _ = remote.write_all(response).await;
        });
        Ok(Box::new(local))
    }
}

#[tokio::test]
async fn with_connector_substitutes_a_fake_origin() {
    let connects = Arc::new(AtomicUsize::new(0));
    let connector = Arc::new(FakeConnector {
        response: b"HTTP/1.1 200 OK\r\n\r\nfake",
        connects: connects.clone(),
    });
    let cache = Arc::new(Cache::with_connector(
        3,
        1024,
        connector,
        Duration::from_secs(1),
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cache_for_task = cache.clone();
    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            let cache = cache_for_task.clone();
            tokio::spawn(async move { cache.handle(stream).await });
        }
    });

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /fake HTTP/1.1\r\nHost: wherever\r\n\r\n")
        .await
        .unwrap();
    let response = support::read_to_eof_or_idle(&mut stream).await;
    assert_eq!(response, b"HTTP/1.1 200 OK\r\n\r\nfake".to_vec());
    assert_eq!(connects.load(Ordering::SeqCst), 1);

    let mut stream2 = TcpStream::connect(addr).await.unwrap();
    stream2
        .write_all(b"GET /fake HTTP/1.1\r\nHost: wherever\r\n\r\n")
        .await
        .unwrap();
    let _ = support::read_to_eof_or_idle(&mut stream2).await;
    assert_eq!(
        connects.load(Ordering::SeqCst),
        1,
        "second request is a cache hit, not a second connect"
    );
}

#[tokio::test]
async fn len_reports_the_configured_slot_count() {
    let cache = Cache::new(5, 1024);
    assert_eq!(cache.len(), 5);
}
