//! Non-blocking UDP transport for the command channel.
//!
//! Errors are returned as-is; the channel reports them through its sink.

use std::io;
use std::net::{SocketAddr, UdpSocket};

use trainer_core::channel::{DatagramTransport, RemoteEndpoint};

use crate::error::EmulatorError;

pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Binds `addr` and switches the socket to non-blocking mode.
    pub fn bind(addr: SocketAddr) -> Result<Self, EmulatorError> {
        let socket = UdpSocket::bind(addr).map_err(|source| EmulatorError::Bind { addr, source })?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl DatagramTransport for UdpTransport {
    type Error = io::Error;

    fn try_recv(
        &mut self,
        buffer: &mut [u8],
    ) -> Result<Option<(usize, RemoteEndpoint)>, Self::Error> {
        match self.socket.recv_from(buffer) {
            Ok((len, from)) => Ok(Some((len, RemoteEndpoint::from(from)))),
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(error),
        }
    }

    fn send_to(&mut self, endpoint: RemoteEndpoint, payload: &[u8]) -> Result<(), Self::Error> {
        self.socket
            .send_to(payload, SocketAddr::from(endpoint))
            .map(|_| ())
    }
}
