//! Serial device transport

use std::fmt;
use std::io::ErrorKind;
use std::time::Duration;

use nmea_protocol::{Frame, SentenceCodec};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_serial::SerialPortBuilderExt;

use super::{FrameSink, FrameSource, SERIAL_TERMINATOR};
use crate::error::TransportError;

type Reader = Box<dyn AsyncRead + Send + Unpin>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

fn open_port(port: &str, baud: u32) -> Result<tokio_serial::SerialStream, TransportError> {
    tokio_serial::new(port, baud)
        .timeout(Duration::from_millis(100))
        .open_native_async()
        .map_err(|source| TransportError::SerialOpen {
            port: port.to_string(),
            source,
        })
}

/// Reads CR/LF-delimited sentences from a serial device
pub struct SerialSource {
    io: Reader,
    codec: SentenceCodec,
    buffer: Vec<u8>,
    read_timeout: Duration,
}

impl SerialSource {
    /// Open `port` at `baud`
    pub fn open(port: &str, baud: u32, read_timeout: Duration) -> Result<Self, TransportError> {
        let stream = open_port(port, baud)?;
        Ok(Self::from_io(stream, read_timeout))
    }

    /// Wrap any byte stream (a pseudo-terminal, a test duplex)
    pub fn from_io<T>(io: T, read_timeout: Duration) -> Self
    where
        T: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            io: Box::new(io),
            codec: SentenceCodec::new(),
            buffer: vec![0u8; 256],
            read_timeout,
        }
    }
}

impl fmt::Debug for SerialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialSource")
            .field("pending", &self.codec.pending())
            .field("read_timeout", &self.read_timeout)
            .finish_non_exhaustive()
    }
}

impl FrameSource for SerialSource {
    async fn receive(&mut self) -> Result<Option<Frame>, TransportError> {
        // A single read can carry several sentences
        if let Some(frame) = self.codec.next_frame() {
            return Ok(Some(frame));
        }

        match tokio::time::timeout(self.read_timeout, self.io.read(&mut self.buffer)).await {
            Ok(Ok(0)) => Err(TransportError::Closed),
            Ok(Ok(n)) => {
                self.codec.push_bytes(&self.buffer[..n]);
                Ok(self.codec.next_frame())
            }
            Ok(Err(e)) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Ok(None)
            }
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Err(_) => Ok(None),
        }
    }
}

/// Writes sentences to a serial device, each ending in a carriage return
pub struct SerialSink {
    io: Writer,
}

impl SerialSink {
    /// Open `port` at `baud`
    pub fn open(port: &str, baud: u32) -> Result<Self, TransportError> {
        let stream = open_port(port, baud)?;
        Ok(Self::from_io(stream))
    }

    pub fn from_io<T>(io: T) -> Self
    where
        T: AsyncWrite + Send + Unpin + 'static,
    {
        Self { io: Box::new(io) }
    }
}

impl fmt::Debug for SerialSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialSink").finish_non_exhaustive()
    }
}

impl FrameSink for SerialSink {
    async fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        self.io.write_all(&frame.to_wire(SERIAL_TERMINATOR)).await?;
        self.io.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;

    #[tokio::test]
    async fn test_reads_split_sentences() {
        let (mut device, host) = duplex(64);
        let mut source = SerialSource::from_io(host, Duration::from_millis(50));

        device.write_all(b"$GPGLL,1*00\r\n$II").await.unwrap();
        assert_eq!(
            source.receive().await.unwrap(),
            Some(Frame::from("$GPGLL,1*00"))
        );

        device.write_all(b"MTW,2*00\r").await.unwrap();
        assert_eq!(
            source.receive().await.unwrap(),
            Some(Frame::from("$IIMTW,2*00"))
        );
    }

    #[tokio::test]
    async fn test_buffered_sentences_returned_without_reading() {
        let (mut device, host) = duplex(64);
        let mut source = SerialSource::from_io(host, Duration::from_millis(50));

        device.write_all(b"$A\r\n$B\r\n").await.unwrap();
        assert_eq!(source.receive().await.unwrap(), Some(Frame::from("$A")));
        assert_eq!(source.receive().await.unwrap(), Some(Frame::from("$B")));
    }

    #[tokio::test]
    async fn test_idle_device_times_out() {
        let (_device, host) = duplex(64);
        let mut source = SerialSource::from_io(host, Duration::from_millis(20));
        assert_eq!(source.receive().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_disconnected_device_is_fatal() {
        let (device, host) = duplex(64);
        let mut source = SerialSource::from_io(host, Duration::from_millis(50));
        drop(device);

        let err = source.receive().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_sink_appends_carriage_return() {
        let (host, mut device) = duplex(64);
        let mut sink = SerialSink::from_io(host);

        sink.send(&Frame::from("$GPGLL,1*00")).await.unwrap();

        let mut buf = [0u8; 12];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"$GPGLL,1*00\r");
    }

    #[tokio::test]
    async fn test_missing_device_reports_port() {
        let err = SerialSource::open("/dev/nmea-mux-missing", 4800, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, TransportError::SerialOpen { ref port, .. } if port == "/dev/nmea-mux-missing"));
    }
}
