//! UDP datagram transports

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use nmea_protocol::Frame;
use tokio::net::UdpSocket;
use tracing::info;

use super::{FrameSink, FrameSource, NETWORK_TERMINATOR};
use crate::error::TransportError;

/// Largest datagram accepted
const MAX_DATAGRAM: usize = 2048;

async fn bind(address: SocketAddr) -> Result<UdpSocket, TransportError> {
    UdpSocket::bind(address)
        .await
        .map_err(|source| TransportError::Bind { address, source })
}

/// Receives one sentence per datagram from any sender
#[derive(Debug)]
pub struct UdpSource {
    socket: UdpSocket,
    buffer: Vec<u8>,
    read_timeout: Duration,
}

impl UdpSource {
    pub async fn bind(address: SocketAddr, read_timeout: Duration) -> Result<Self, TransportError> {
        let socket = bind(address).await?;
        info!("UDP source bound to {}", socket.local_addr()?);
        Ok(Self {
            socket,
            buffer: vec![0u8; MAX_DATAGRAM],
            read_timeout,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl FrameSource for UdpSource {
    async fn receive(&mut self) -> Result<Option<Frame>, TransportError> {
        match tokio::time::timeout(self.read_timeout, self.socket.recv_from(&mut self.buffer)).await
        {
            Ok(Ok((n, _peer))) => {
                let frame = Frame::from_line(&self.buffer[..n]);
                Ok((!frame.is_empty()).then_some(frame))
            }
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Err(_) => Ok(None),
        }
    }
}

/// Sends every frame to one fixed destination
#[derive(Debug)]
pub struct UdpSink {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl UdpSink {
    /// Bind `local` (or an ephemeral port of the destination's family)
    pub async fn bind(
        local: Option<SocketAddr>,
        destination: SocketAddr,
        broadcast: bool,
    ) -> Result<Self, TransportError> {
        let local = local.unwrap_or_else(|| match destination {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        });
        let socket = bind(local).await?;
        if broadcast {
            socket.set_broadcast(true)?;
        }
        info!("UDP sink sending to {}", destination);
        Ok(Self {
            socket,
            destination,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }
}

impl FrameSink for UdpSink {
    async fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        self.socket
            .send_to(&frame.to_wire(NETWORK_TERMINATOR), self.destination)
            .await
            .map_err(|source| TransportError::Send {
                destination: self.destination,
                source,
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn any_local() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_source_trims_terminator() {
        let mut source = UdpSource::bind(any_local(), Duration::from_millis(500))
            .await
            .unwrap();
        let sender = UdpSocket::bind(any_local()).await.unwrap();
        sender
            .send_to(b"$GPGLL,1*00\r\n", source.local_addr().unwrap())
            .await
            .unwrap();

        assert_eq!(
            source.receive().await.unwrap(),
            Some(Frame::from("$GPGLL,1*00"))
        );
    }

    #[tokio::test]
    async fn test_source_idle_times_out() {
        let mut source = UdpSource::bind(any_local(), Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(source.receive().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sink_sends_to_destination() {
        let receiver = UdpSocket::bind(any_local()).await.unwrap();
        let mut sink = UdpSink::bind(None, receiver.local_addr().unwrap(), false)
            .await
            .unwrap();

        sink.send(&Frame::from("$IIMTW,2*00")).await.unwrap();

        let mut buf = [0u8; 64];
        let (n, from) = tokio::time::timeout(Duration::from_secs(1), receiver.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"$IIMTW,2*00\r\n");
        assert_eq!(from.port(), sink.local_addr().unwrap().port());
    }

    #[test]
    fn test_send_failure_is_not_fatal() {
        let err = TransportError::Send {
            destination: "192.168.1.50:10110".parse().unwrap(),
            source: std::io::Error::other("unreachable"),
        };
        assert!(!err.is_fatal());
    }
}
