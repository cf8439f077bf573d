pub mod doctor;

use anyhow::{Context, Result};
use bytes::Bytes;
use serde::Deserialize;
use std::{fmt, io, net::SocketAddr};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::mpsc,
};
use tracing::{info, warn};

/// Matches the firmware's 256-byte receive buffer.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 256;
pub const DEFAULT_EVENT_QUEUE: usize = 64;

#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    /// Listen address, e.g. "0.0.0.0:8080".
    pub bind: String,

    /// Longer frames are dropped, not truncated.
    pub max_frame_bytes: Option<usize>,

    /// Depth of the channel between connection tasks and the event loop.
    pub event_queue: Option<usize>,
}

impl LinkConfig {
    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes.unwrap_or(DEFAULT_MAX_FRAME_BYTES)
    }

    pub fn event_queue(&self) -> usize {
        self.event_queue.unwrap_or(DEFAULT_EVENT_QUEUE).max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u32);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum LinkEvent {
    Connected { id: ClientId, peer: SocketAddr },
    Disconnected { id: ClientId },
    /// One newline-delimited frame, line ending stripped.
    Message { id: ClientId, payload: Bytes },
}

/// Line-framed TCP endpoint. Frames bytes into [`LinkEvent`]s and nothing
/// else; what a frame means is decided by whoever drains the channel.
pub struct LinkServer {
    listener: TcpListener,
    max_frame: usize,
}

impl LinkServer {
    pub async fn bind(cfg: &LinkConfig) -> Result<Self> {
        let listener = TcpListener::bind(&cfg.bind)
            .await
            .with_context(|| format!("bind link listener {}", cfg.bind))?;
        Ok(Self { listener, max_frame: cfg.max_frame_bytes() })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().context("link local_addr")
    }

    /// Accept loop. Returns once the event receiver is gone.
    pub async fn serve(self, tx: mpsc::Sender<LinkEvent>) -> Result<()> {
        let mut next_id: u32 = 0;
        loop {
            let (stream, peer) = self.listener.accept().await.context("link accept")?;
            next_id = next_id.wrapping_add(1);
            let id = ClientId(next_id);
            info!("link: client {} connected from {}", id, peer);

            if tx.send(LinkEvent::Connected { id, peer }).await.is_err() {
                return Ok(());
            }
            tokio::spawn(read_frames(id, stream, self.max_frame, tx.clone()));
        }
    }
}

async fn read_frames(id: ClientId, stream: TcpStream, max_frame: usize, tx: mpsc::Sender<LinkEvent>) {
    let mut reader = BufReader::new(stream);
    let mut line = Vec::with_capacity(max_frame + 2);

    loop {
        match next_frame(&mut reader, &mut line, max_frame).await {
            Ok(None) => break,
            Ok(Some(Frame::Oversized)) => {
                warn!("link: client {} sent a frame over {} bytes, dropped", id, max_frame);
            }
            Ok(Some(Frame::Line)) => {
                let frame = strip_line_ending(&line);
                if frame.is_empty() {
                    continue;
                }
                let payload = Bytes::copy_from_slice(frame);
                if tx.send(LinkEvent::Message { id, payload }).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!("link: client {} read error: {}", id, e);
                break;
            }
        }
    }

    info!("link: client {} disconnected", id);
    let _ = tx.send(LinkEvent::Disconnected { id }).await;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    /// `line` holds one frame of at most `max_frame` bytes plus its line ending.
    Line,
    /// Frame was too long; its bytes were discarded up to and including the newline.
    Oversized,
}

/// Read one newline-terminated frame into `line`, never buffering more than
/// `max_frame` bytes plus a CRLF. `Ok(None)` on EOF.
async fn next_frame<R>(reader: &mut R, line: &mut Vec<u8>, max_frame: usize) -> io::Result<Option<Frame>>
where
    R: AsyncBufRead + Unpin,
{
    line.clear();
    let cap = max_frame as u64 + 2;
    let n = (&mut *reader).take(cap).read_until(b'\n', line).await?;
    if n == 0 {
        return Ok(None);
    }

    if line.last() != Some(&b'\n') && n as u64 == cap {
        line.clear();
        skip_past_newline(reader).await?;
        return Ok(Some(Frame::Oversized));
    }
    if strip_line_ending(line).len() > max_frame {
        line.clear();
        return Ok(Some(Frame::Oversized));
    }
    Ok(Some(Frame::Line))
}

/// Consume input through the next `\n` (or EOF) without keeping it.
async fn skip_past_newline<R>(reader: &mut R) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Ok(());
        }
        match buf.iter().position(|&b| b == b'\n') {
            Some(i) => {
                reader.consume(i + 1);
                return Ok(());
            }
            None => {
                let n = buf.len();
                reader.consume(n);
            }
        }
    }
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::time::timeout;

    async fn start(max_frame: usize) -> (SocketAddr, mpsc::Receiver<LinkEvent>) {
        let cfg = LinkConfig {
            bind: "127.0.0.1:0".into(),
            max_frame_bytes: Some(max_frame),
            event_queue: None,
        };
        let server = LinkServer::bind(&cfg).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (tx, rx) = mpsc::channel(cfg.event_queue());
        tokio::spawn(server.serve(tx));
        (addr, rx)
    }

    async fn next(rx: &mut mpsc::Receiver<LinkEvent>) -> LinkEvent {
        timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap()
    }

    #[test]
    fn strips_lf_and_crlf() {
        assert_eq!(strip_line_ending(b"abc\n"), b"abc");
        assert_eq!(strip_line_ending(b"abc\r\n"), b"abc");
        assert_eq!(strip_line_ending(b"abc"), b"abc");
    }

    #[tokio::test]
    async fn frames_lines_and_reports_lifecycle() {
        let (addr, mut rx) = start(DEFAULT_MAX_FRAME_BYTES).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        let id = match next(&mut rx).await {
            LinkEvent::Connected { id, .. } => id,
            other => panic!("expected connect, got {:?}", other),
        };

        client
            .write_all(b"{\"cmd\":\"setMode\",\"mode\":0}\r\n\n{\"cmd\":\"x\"}\n")
            .await
            .unwrap();

        match next(&mut rx).await {
            LinkEvent::Message { id: got, payload } => {
                assert_eq!(got, id);
                assert_eq!(&payload[..], br#"{"cmd":"setMode","mode":0}"#);
            }
            other => panic!("expected message, got {:?}", other),
        }
        match next(&mut rx).await {
            LinkEvent::Message { payload, .. } => assert_eq!(&payload[..], br#"{"cmd":"x"}"#),
            other => panic!("expected message, got {:?}", other),
        }

        drop(client);
        match next(&mut rx).await {
            LinkEvent::Disconnected { id: got } => assert_eq!(got, id),
            other => panic!("expected disconnect, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn oversized_frame_is_dropped() {
        let (addr, mut rx) = start(16).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        assert!(matches!(next(&mut rx).await, LinkEvent::Connected { .. }));

        let mut big = vec![b'a'; 64];
        big.push(b'\n');
        client.write_all(&big).await.unwrap();
        client.write_all(b"short\n").await.unwrap();

        match next(&mut rx).await {
            LinkEvent::Message { payload, .. } => assert_eq!(&payload[..], b"short"),
            other => panic!("expected message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unterminated_flood_is_skipped_without_buffering_it() {
        let mut input = vec![b'a'; 100_000];
        input.extend_from_slice(b"\nshort\r\n");
        let mut reader: &[u8] = &input;
        let mut line = Vec::new();

        let frame = next_frame(&mut reader, &mut line, 16).await.unwrap();
        assert_eq!(frame, Some(Frame::Oversized));
        assert!(line.capacity() <= 64, "line grew to {}", line.capacity());

        let frame = next_frame(&mut reader, &mut line, 16).await.unwrap();
        assert_eq!(frame, Some(Frame::Line));
        assert_eq!(strip_line_ending(&line), b"short");

        assert_eq!(next_frame(&mut reader, &mut line, 16).await.unwrap(), None);
    }

    #[tokio::test]
    async fn frame_limit_counts_payload_not_line_ending() {
        let mut reader: &[u8] = b"0123456789abcdef\r\n0123456789abcdefg\n";
        let mut line = Vec::new();
        assert_eq!(next_frame(&mut reader, &mut line, 16).await.unwrap(), Some(Frame::Line));
        assert_eq!(strip_line_ending(&line), b"0123456789abcdef");
        assert_eq!(next_frame(&mut reader, &mut line, 16).await.unwrap(), Some(Frame::Oversized));
        assert_eq!(next_frame(&mut reader, &mut line, 16).await.unwrap(), None);
    }

    #[tokio::test]
    async fn megabyte_without_newline_does_not_stall_the_link() {
        let (addr, mut rx) = start(16).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        assert!(matches!(next(&mut rx).await, LinkEvent::Connected { .. }));

        let flood = vec![b'x'; 1 << 20];
        client.write_all(&flood).await.unwrap();
        client.write_all(b"\nshort\n").await.unwrap();

        match next(&mut rx).await {
            LinkEvent::Message { payload, .. } => assert_eq!(&payload[..], b"short"),
            other => panic!("expected message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn clients_get_distinct_ids() {
        let (addr, mut rx) = start(DEFAULT_MAX_FRAME_BYTES).await;
        let _a = TcpStream::connect(addr).await.unwrap();
        let first = next(&mut rx).await;
        let _b = TcpStream::connect(addr).await.unwrap();
        let second = next(&mut rx).await;
        match (first, second) {
            (LinkEvent::Connected { id: a, .. }, LinkEvent::Connected { id: b, .. }) => assert_ne!(a, b),
            other => panic!("expected two connects, got {:?}", other),
        }
    }
}
