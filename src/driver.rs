//! Blocking transport driver.
//!
//! The engine itself is sans-IO. This module supplies the obvious way to run
//! it over anything implementing `Read + Write`, mostly so the crate is
//! usable out of the box and the tests can exercise a full connection.

use std::io::{self, Read, Write};

use thiserror::Error;
use zeroize::Zeroizing;

use crate::{Client, Error as TlsError, HandshakeState, Output, Server};

/// Either side of a connection, as the driver sees it.
pub trait Endpoint {
    fn handle_input(&mut self, data: &[u8]) -> Result<(), TlsError>;
    fn poll_output<'a>(&mut self, buf: &'a mut [u8]) -> Result<Output<'a>, TlsError>;
    fn send_application_data(&mut self, data: &[u8]) -> Result<(), TlsError>;
    fn state(&self) -> HandshakeState;
    fn abort(&mut self);
    fn session_blob(&self) -> Option<Zeroizing<Vec<u8>>>;
}

macro_rules! impl_endpoint {
    ($t:ty) => {
        impl Endpoint for $t {
            fn handle_input(&mut self, data: &[u8]) -> Result<(), TlsError> {
                <$t>::handle_input(self, data)
            }
            fn poll_output<'a>(&mut self, buf: &'a mut [u8]) -> Result<Output<'a>, TlsError> {
                <$t>::poll_output(self, buf)
            }
            fn send_application_data(&mut self, data: &[u8]) -> Result<(), TlsError> {
                <$t>::send_application_data(self, data)
            }
            fn state(&self) -> HandshakeState {
                <$t>::state(self)
            }
            fn abort(&mut self) {
                <$t>::abort(self)
            }
            fn session_blob(&self) -> Option<Zeroizing<Vec<u8>>> {
                <$t>::session_blob(self)
            }
        }
    };
}

impl_endpoint!(Client);
impl_endpoint!(Server);

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("tls error: {0}")]
    Tls(#[from] TlsError),
}

/// Drives an endpoint over a blocking stream.
pub struct BlockingDriver<S, E> {
    stream: S,
    endpoint: E,
    scratch: Vec<u8>,
    app_rx: Vec<u8>,
}

impl<S: Read + Write, E: Endpoint> BlockingDriver<S, E> {
    pub fn new(stream: S, endpoint: E) -> Self {
        BlockingDriver {
            stream,
            endpoint,
            scratch: vec![0u8; 32 * 1024],
            app_rx: Vec::new(),
        }
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn endpoint_mut(&mut self) -> &mut E {
        &mut self.endpoint
    }

    /// Run the handshake to completion.
    pub fn handshake(&mut self) -> Result<(), DriverError> {
        loop {
            self.flush()?;
            if self.endpoint.state() == HandshakeState::Established {
                return Ok(());
            }
            self.read_more()?;
        }
    }

    /// Send application data and push the resulting records to the stream.
    pub fn send(&mut self, data: &[u8]) -> Result<(), DriverError> {
        self.endpoint.send_application_data(data)?;
        self.flush()
    }

    /// Receive application data, blocking until at least one byte arrives.
    pub fn recv(&mut self) -> Result<Vec<u8>, DriverError> {
        loop {
            self.flush()?;
            if !self.app_rx.is_empty() {
                return Ok(std::mem::take(&mut self.app_rx));
            }
            self.read_more()?;
        }
    }

    /// Drain the endpoint: write out packets, stash application data.
    fn flush(&mut self) -> Result<(), DriverError> {
        loop {
            match self.endpoint.poll_output(&mut self.scratch)? {
                Output::Packet(packet) => {
                    self.stream.write_all(packet)?;
                }
                Output::ApplicationData(data) => {
                    self.app_rx.extend_from_slice(data);
                }
                Output::Connected => {
                    debug!("Connection established");
                }
                Output::NeedInput => {
                    self.stream.flush()?;
                    return Ok(());
                }
            }
        }
    }

    fn read_more(&mut self) -> Result<(), DriverError> {
        let mut buf = [0u8; 16 * 1024];
        let n = self.stream.read(&mut buf)?;
        if n == 0 {
            return Err(DriverError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "transport closed",
            )));
        }
        self.endpoint.handle_input(&buf[..n])?;
        Ok(())
    }
}
