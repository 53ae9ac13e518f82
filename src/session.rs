//! Transport session: single point of truth for the TCP connection.
//!
//! The session connects lazily, applies a per-request timeout, and marks
//! itself disconnected on any connection-level fault. It never retries on
//! its own; retry policy lives with the poll loop and the write path.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;
use tokio::time::error::Elapsed;
use tokio::time::timeout;
use tokio_modbus::prelude::*;
use tokio_modbus::ExceptionCode;

use crate::registers::RegisterSpace;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not connect to {endpoint}: {detail}")]
    Connect { endpoint: String, detail: String },
    #[error("request timed out after {:.1}s", .0.as_secs_f32())]
    Timeout(Duration),
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("no active connection")]
    NotConnected,
    #[error("device returned Modbus exception: {0}")]
    Protocol(ExceptionCode),
}

impl SessionError {
    /// Connection-level errors invalidate the session and count toward the
    /// poll loop's failure threshold; protocol errors affect one block only.
    pub fn is_connection_level(&self) -> bool {
        !matches!(self, SessionError::Protocol(_))
    }
}

/// Values read from one register block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockValues {
    Words(Vec<u16>),
    Bits(Vec<bool>),
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    pub request_timeout: Duration,
}

pub struct Session {
    config: SessionConfig,
    ctx: Option<tokio_modbus::client::Context>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Session { config, ctx: None }
    }

    pub fn is_connected(&self) -> bool {
        self.ctx.is_some()
    }

    /// Establish the connection if there is none. A no-op when already
    /// connected; ordinary network failures come back as `Err`, not panics.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        if self.ctx.is_some() {
            return Ok(());
        }

        let endpoint = format!("{}:{}", self.config.host, self.config.port);
        let addr = resolve(&self.config.host, self.config.port, &endpoint)?;

        match timeout(self.config.request_timeout, tcp::connect_slave(addr, Slave(self.config.unit_id))).await {
            Err(_) => Err(SessionError::Timeout(self.config.request_timeout)),
            Ok(Err(e)) => Err(SessionError::Connect {
                endpoint,
                detail: e.to_string(),
            }),
            Ok(Ok(ctx)) => {
                log::info!("Connected to {} (unit {})", endpoint, self.config.unit_id);
                self.ctx = Some(ctx);
                Ok(())
            }
        }
    }

    /// Drop the connection. Safe to call when already closed.
    pub async fn close(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            if let Err(e) = ctx.disconnect().await {
                log::debug!("Error while disconnecting: {e}");
            }
        }
    }

    /// Read one contiguous block of registers, in ascending address order.
    pub async fn read_block(
        &mut self,
        space: RegisterSpace,
        start: u16,
        count: u16,
    ) -> Result<BlockValues, SessionError> {
        let request_timeout = self.config.request_timeout;
        let ctx = self.ctx.as_mut().ok_or(SessionError::NotConnected)?;

        let result = match space {
            RegisterSpace::Holding => {
                classify(timeout(request_timeout, ctx.read_holding_registers(start, count)).await, request_timeout)
                    .map(BlockValues::Words)
            }
            RegisterSpace::Input => {
                classify(timeout(request_timeout, ctx.read_input_registers(start, count)).await, request_timeout)
                    .map(BlockValues::Words)
            }
            RegisterSpace::Coil => {
                classify(timeout(request_timeout, ctx.read_coils(start, count)).await, request_timeout)
                    .map(BlockValues::Bits)
            }
        };

        self.invalidate_on_connection_error(&result);
        result
    }

    /// Write a single holding register.
    pub async fn write_single(&mut self, address: u16, value: u16) -> Result<(), SessionError> {
        let request_timeout = self.config.request_timeout;
        let ctx = self.ctx.as_mut().ok_or(SessionError::NotConnected)?;

        let result = classify(
            timeout(request_timeout, ctx.write_single_register(address, value)).await,
            request_timeout,
        );

        self.invalidate_on_connection_error(&result);
        result
    }

    fn invalidate_on_connection_error<T>(&mut self, result: &Result<T, SessionError>) {
        if let Err(e) = result {
            if e.is_connection_level() {
                // The wire may hold a half-finished exchange; the socket is
                // unusable until a fresh connect.
                self.ctx = None;
            }
        }
    }
}

fn resolve(host: &str, port: u16, endpoint: &str) -> Result<SocketAddr, SessionError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| SessionError::Connect {
            endpoint: endpoint.to_string(),
            detail: e.to_string(),
        })?;
    addrs.next().ok_or_else(|| SessionError::Connect {
        endpoint: endpoint.to_string(),
        detail: "hostname did not resolve".to_string(),
    })
}

fn classify<T>(
    outcome: Result<tokio_modbus::Result<T>, Elapsed>,
    waited: Duration,
) -> Result<T, SessionError> {
    match outcome {
        Err(_) => Err(SessionError::Timeout(waited)),
        Ok(Err(e)) => Err(SessionError::ConnectionLost(e.to_string())),
        Ok(Ok(Err(code))) => Err(SessionError::Protocol(code)),
        Ok(Ok(Ok(value))) => Ok(value),
    }
}
