use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

/// CONNACK, session not present, connection accepted
const CONNACK_ACCEPTED: [u8; 4] = [0x20, 0x02, 0x00, 0x00];
pub const DISCONNECT_PACKET: [u8; 2] = [0xE0, 0x00];

/// A broker that accepts every client and records the raw bytes they send after
/// CONNECT. It never acknowledges publishes.
pub struct FakeBroker {
    port: u16,
    received: Arc<Mutex<Vec<u8>>>,
    connections: Arc<AtomicUsize>,
    accept_task: JoinHandle<()>,
}

impl FakeBroker {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Binding the fake broker failed");
        let port = listener
            .local_addr()
            .expect("Fake broker has no local address")
            .port();

        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let accept_task = tokio::spawn({
            let received = received.clone();
            let connections = connections.clone();
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve_client(stream, received.clone()));
                }
            }
        });

        Self {
            port,
            received,
            connections,
            accept_task,
        }
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// How many times a client has connected
    #[must_use]
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn has_received(&self, needle: &[u8]) -> bool {
        let received = self.received.lock().expect("Fake broker lock poisoned");
        !needle.is_empty() && received.windows(needle.len()).any(|w| w == needle)
    }

    /// Returns false if `needle` did not show up within `timeout`
    pub async fn wait_for_bytes(&self, needle: &[u8], timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            while !self.has_received(needle) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .is_ok()
    }
}

impl Drop for FakeBroker {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve_client(mut stream: TcpStream, received: Arc<Mutex<Vec<u8>>>) {
    let mut buf = vec![0u8; 64 * 1024];

    // Clients send nothing else until CONNECT is answered
    match stream.read(&mut buf).await {
        Ok(n) if n > 0 => (),
        _ => return,
    }
    if stream.write_all(&CONNACK_ACCEPTED).await.is_err() {
        return;
    }

    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => received
                .lock()
                .expect("Fake broker lock poisoned")
                .extend_from_slice(&buf[..n]),
        }
    }
}
