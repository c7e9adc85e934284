//! TCP listener transports
//!
//! Both directions listen on a bound address and serve any number of
//! clients. A source reads sentences from every connected client; a sink
//! writes every frame to every connected client. Client failures only
//! affect that client.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nmea_protocol::{Frame, SentenceCodec};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::{FrameSink, FrameSource, NETWORK_TERMINATOR};
use crate::error::TransportError;
use crate::queue::FrameQueue;

/// Frames buffered between client readers and the source loop
const READER_CHANNEL_SIZE: usize = 64;

async fn bind(address: SocketAddr) -> Result<TcpListener, TransportError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| TransportError::Bind { address, source })
}

/// Accepts clients and reads sentences from all of them
#[derive(Debug)]
pub struct TcpSource {
    name: String,
    listener: TcpListener,
    frames_tx: mpsc::Sender<Frame>,
    frames_rx: mpsc::Receiver<Frame>,
    readers: JoinSet<()>,
    read_timeout: Duration,
}

impl TcpSource {
    pub async fn bind(
        name: &str,
        address: SocketAddr,
        read_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let listener = bind(address).await?;
        info!("{}: listening on {}", name, address);

        let (frames_tx, frames_rx) = mpsc::channel(READER_CHANNEL_SIZE);
        Ok(Self {
            name: name.to_string(),
            listener,
            frames_tx,
            frames_rx,
            readers: JoinSet::new(),
            read_timeout,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Currently connected clients
    pub fn client_count(&self) -> usize {
        self.readers.len()
    }
}

impl FrameSource for TcpSource {
    async fn receive(&mut self) -> Result<Option<Frame>, TransportError> {
        while self.readers.try_join_next().is_some() {}

        tokio::select! {
            Some(frame) = self.frames_rx.recv() => Ok(Some(frame)),

            accepted = self.listener.accept() => {
                let (stream, peer) = accepted.map_err(TransportError::Accept)?;
                info!("{}: client {} connected", self.name, peer);
                self.readers.spawn(read_client(
                    self.name.clone(),
                    peer,
                    stream,
                    self.frames_tx.clone(),
                ));
                Ok(None)
            }

            _ = tokio::time::sleep(self.read_timeout) => Ok(None),
        }
    }
}

/// Per-client reader; ends when the client disconnects
async fn read_client(name: String, peer: SocketAddr, mut stream: TcpStream, tx: mpsc::Sender<Frame>) {
    let mut codec = SentenceCodec::new();
    let mut buffer = vec![0u8; 1024];

    loop {
        match stream.read(&mut buffer).await {
            Ok(0) => {
                info!("{}: client {} disconnected", name, peer);
                break;
            }
            Ok(n) => {
                codec.push_bytes(&buffer[..n]);
                while let Some(frame) = codec.next_frame() {
                    if tx.send(frame).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                warn!("{}: client {} read error: {}", name, peer, e);
                break;
            }
        }
    }
}

struct ClientSlot {
    peer: SocketAddr,
    queue: Arc<FrameQueue>,
    writer: JoinHandle<()>,
}

type ClientList = Arc<Mutex<Vec<ClientSlot>>>;

fn lock_clients(clients: &ClientList) -> std::sync::MutexGuard<'_, Vec<ClientSlot>> {
    clients.lock().unwrap_or_else(|e| e.into_inner())
}

/// Accepts clients and writes every frame to each of them
///
/// Each client has its own drop-oldest queue and writer task, so a slow
/// client only loses its own backlog.
pub struct TcpSink {
    name: String,
    local_addr: SocketAddr,
    clients: ClientList,
    acceptor: JoinHandle<()>,
}

impl TcpSink {
    pub async fn bind(
        name: &str,
        address: SocketAddr,
        client_capacity: usize,
        poll_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let listener = bind(address).await?;
        let local_addr = listener.local_addr()?;
        info!("{}: serving clients on {}", name, local_addr);

        let clients = ClientList::default();
        let acceptor = tokio::spawn(accept_clients(
            name.to_string(),
            listener,
            clients.clone(),
            client_capacity,
            poll_timeout,
        ));

        Ok(Self {
            name: name.to_string(),
            local_addr,
            clients,
            acceptor,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Clients whose writer is still running
    pub fn client_count(&self) -> usize {
        lock_clients(&self.clients)
            .iter()
            .filter(|client| !client.queue.is_closed())
            .count()
    }
}

impl std::fmt::Debug for TcpSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpSink")
            .field("name", &self.name)
            .field("local_addr", &self.local_addr)
            .field("clients", &self.client_count())
            .finish()
    }
}

impl FrameSink for TcpSink {
    async fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let mut clients = lock_clients(&self.clients);
        clients.retain(|client| {
            let alive = !client.queue.is_closed();
            if !alive {
                debug!("{}: forgetting client {}", self.name, client.peer);
            }
            alive
        });
        for client in clients.iter() {
            client.queue.push(frame.clone());
        }
        Ok(())
    }
}

impl Drop for TcpSink {
    fn drop(&mut self) {
        self.acceptor.abort();
        for client in lock_clients(&self.clients).drain(..) {
            client.queue.close();
            client.writer.abort();
        }
    }
}

async fn accept_clients(
    name: String,
    listener: TcpListener,
    clients: ClientList,
    capacity: usize,
    poll_timeout: Duration,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                info!("{}: client {} connected", name, peer);
                let queue = Arc::new(FrameQueue::new(format!("{} ({})", name, peer), capacity));
                let writer = tokio::spawn(write_client(
                    name.clone(),
                    peer,
                    stream,
                    queue.clone(),
                    poll_timeout,
                ));
                lock_clients(&clients).push(ClientSlot {
                    peer,
                    queue,
                    writer,
                });
            }
            Err(e) => {
                warn!("{}: accept failed: {}", name, e);
                tokio::time::sleep(poll_timeout).await;
            }
        }
    }
}

/// Per-client writer; closes its queue when the client goes away
async fn write_client(
    name: String,
    peer: SocketAddr,
    mut stream: TcpStream,
    queue: Arc<FrameQueue>,
    poll_timeout: Duration,
) {
    while !queue.is_closed() {
        let Some(frame) = queue.pop_timeout(poll_timeout).await else {
            continue;
        };
        if let Err(e) = stream.write_all(&frame.to_wire(NETWORK_TERMINATOR)).await {
            warn!("{}: dropping client {}: {}", name, peer, e);
            break;
        }
    }
    queue.close();
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, BufReader};

    use super::*;

    fn any_local() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    async fn wait_for_clients(sink: &TcpSink, count: usize) {
        for _ in 0..100 {
            if sink.client_count() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} clients, have {}", count, sink.client_count());
    }

    #[tokio::test]
    async fn test_source_reads_from_client() {
        let mut source = TcpSource::bind("tcp in", any_local(), Duration::from_millis(50))
            .await
            .unwrap();
        let addr = source.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"$GPGLL,1*00\r\n$IIMTW,2*00\r\n").await.unwrap();

        let mut frames = Vec::new();
        for _ in 0..20 {
            if let Some(frame) = source.receive().await.unwrap() {
                frames.push(frame);
            }
            if frames.len() == 2 {
                break;
            }
        }
        assert_eq!(
            frames,
            vec![Frame::from("$GPGLL,1*00"), Frame::from("$IIMTW,2*00")]
        );
    }

    #[tokio::test]
    async fn test_source_survives_client_disconnect() {
        let mut source = TcpSource::bind("tcp in", any_local(), Duration::from_millis(20))
            .await
            .unwrap();
        let addr = source.local_addr().unwrap();

        let first = TcpStream::connect(addr).await.unwrap();
        source.receive().await.unwrap();
        drop(first);

        let mut second = TcpStream::connect(addr).await.unwrap();
        second.write_all(b"$B\r\n").await.unwrap();

        let mut got = None;
        for _ in 0..20 {
            if let Some(frame) = source.receive().await.unwrap() {
                got = Some(frame);
                break;
            }
        }
        assert_eq!(got, Some(Frame::from("$B")));
    }

    #[tokio::test]
    async fn test_sink_writes_to_every_client() {
        let mut sink = TcpSink::bind("tcp out", any_local(), 10, Duration::from_millis(20))
            .await
            .unwrap();

        let a = TcpStream::connect(sink.local_addr()).await.unwrap();
        let b = TcpStream::connect(sink.local_addr()).await.unwrap();
        wait_for_clients(&sink, 2).await;

        sink.send(&Frame::from("$GPGLL,1*00")).await.unwrap();

        for stream in [a, b] {
            let mut line = String::new();
            BufReader::new(stream).read_line(&mut line).await.unwrap();
            assert_eq!(line, "$GPGLL,1*00\r\n");
        }
    }

    #[tokio::test]
    async fn test_sink_forgets_dead_client() {
        let mut sink = TcpSink::bind("tcp out", any_local(), 10, Duration::from_millis(20))
            .await
            .unwrap();

        let dead = TcpStream::connect(sink.local_addr()).await.unwrap();
        let live = TcpStream::connect(sink.local_addr()).await.unwrap();
        wait_for_clients(&sink, 2).await;
        drop(dead);

        // Writes to the closed peer fail after the reset arrives
        for _ in 0..50 {
            sink.send(&Frame::from("$X")).await.unwrap();
            if sink.client_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sink.client_count(), 1);

        let mut line = String::new();
        BufReader::new(live).read_line(&mut line).await.unwrap();
        assert_eq!(line, "$X\r\n");
    }

    #[tokio::test]
    async fn test_bind_conflict_is_fatal() {
        let taken = TcpListener::bind(any_local()).await.unwrap();
        let addr = taken.local_addr().unwrap();

        let err = TcpSource::bind("tcp in", addr, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Bind { address, .. } if address == addr));
        assert!(err.is_fatal());
    }
}
