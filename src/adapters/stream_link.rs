//! Byte-link halves over `std::io` streams.
//!
//! Adapts any `Read` / `Write` pair (a `TcpStream`, a pipe, a host serial
//! device) to [`LinkRx`] / [`LinkTx`]. The stream's own read timeout is the
//! poll interval: a timed-out read is reported as "nothing yet" (`Ok(0)`),
//! a zero-length read as [`LinkError::Closed`].

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::error::LinkError;
use crate::rpc::transport::{LinkRx, LinkTx};

pub struct StreamRx<R>(R);

pub struct StreamTx<W>(W);

impl<R: Read + Send + 'static> StreamRx<R> {
    pub fn new(reader: R) -> Self {
        Self(reader)
    }

    pub fn into_inner(self) -> R {
        self.0
    }
}

impl<W: Write + Send + 'static> StreamTx<W> {
    pub fn new(writer: W) -> Self {
        Self(writer)
    }

    pub fn into_inner(self) -> W {
        self.0
    }
}

/// Split a TCP stream into link halves polling every `poll`.
pub fn split_tcp(
    stream: TcpStream,
    poll: Duration,
) -> io::Result<(StreamRx<TcpStream>, StreamTx<TcpStream>)> {
    stream.set_read_timeout(Some(poll))?;
    stream.set_nodelay(true)?;
    let writer = stream.try_clone()?;
    Ok((StreamRx::new(stream), StreamTx::new(writer)))
}

fn is_idle(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

impl<R: Read + Send + 'static> LinkRx for StreamRx<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        match self.0.read(buf) {
            Ok(0) => Err(LinkError::Closed),
            Ok(n) => Ok(n),
            Err(e) if is_idle(&e) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

impl<W: Write + Send + 'static> LinkTx for StreamTx<W> {
    fn write_all(&mut self, data: &[u8]) -> Result<(), LinkError> {
        self.0.write_all(data).map_err(LinkError::from)
    }

    fn flush(&mut self) -> Result<(), LinkError> {
        self.0.flush().map_err(LinkError::from)
    }
}
