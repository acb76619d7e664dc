//! Transport-agnostic abstraction over a duplex byte stream.
//!
//! The core (`Connection`) never touches `TcpStream` directly; it only knows about
//! [`ByteTransport`]. [`crate::listener::Listener`] supplies the one concrete TCP
//! implementation this crate ships.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

#[async_trait]
pub trait ByteTransport: Send {
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
    async fn write_all(&mut self, data: &[u8]) -> std::io::Result<()>;
    fn local_addr(&self) -> SocketAddr;
    fn peer_addr(&self) -> SocketAddr;
}

/// A split, buffered reader/writer pair over any `AsyncRead + AsyncWrite` half, the Rust-side
/// analogue of the teacher's `TcpReader`/`TcpWriter` split.
pub struct SplitTransport<R, W> {
    reader: BufReader<R>,
    writer: BufWriter<W>,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
}

impl<R, W> SplitTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W, local_addr: SocketAddr, peer_addr: SocketAddr) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            local_addr,
            peer_addr,
        }
    }
}

#[async_trait]
impl<R, W> ByteTransport for SplitTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf).await
    }

    async fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(data).await?;
        self.writer.flush().await
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}
