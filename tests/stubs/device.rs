//! In-process Modbus TCP server standing in for the recuperator.
//!
//! Serves configurable holding/input/coil tables and can be told to answer
//! input-register reads with an exception, or to stop answering them at all
//! (which the client observes as a timeout).

use std::collections::HashMap;
use std::future::{self, Future};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_modbus::prelude::*;
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};
use tokio_modbus::ExceptionCode;

use recupoll::registers::{self, RegisterSpace};

#[derive(Clone, Default)]
pub struct DeviceState {
    holding: Arc<Mutex<HashMap<u16, u16>>>,
    input: Arc<Mutex<HashMap<u16, u16>>>,
    coils: Arc<Mutex<HashMap<u16, bool>>>,
    nak_input: Arc<AtomicBool>,
    hang_input: Arc<AtomicBool>,
}

impl DeviceState {
    /// Every mapped word address answers with its own address, every mapped
    /// coil with `address % 4 == 1`, so tests can predict each value.
    pub fn seeded() -> Self {
        let state = DeviceState::default();
        for block in registers::blocks(RegisterSpace::Holding) {
            for addr in block.addresses() {
                state.set_holding(addr, addr);
            }
        }
        for block in registers::blocks(RegisterSpace::Input) {
            for addr in block.addresses() {
                state.set_input(addr, addr);
            }
        }
        for block in registers::blocks(RegisterSpace::Coil) {
            for addr in block.addresses() {
                state.set_coil(addr, addr % 4 == 1);
            }
        }
        state
    }

    pub fn set_holding(&self, address: u16, value: u16) {
        self.holding.lock().unwrap().insert(address, value);
    }

    pub fn set_input(&self, address: u16, value: u16) {
        self.input.lock().unwrap().insert(address, value);
    }

    pub fn set_coil(&self, address: u16, value: bool) {
        self.coils.lock().unwrap().insert(address, value);
    }

    /// Answer input-register reads with IllegalDataAddress.
    pub fn set_input_exception(&self, on: bool) {
        self.nak_input.store(on, Ordering::Relaxed);
    }

    /// Leave input-register reads unanswered forever.
    pub fn set_input_hang(&self, on: bool) {
        self.hang_input.store(on, Ordering::Relaxed);
    }
}

struct RecuperatorStub {
    state: DeviceState,
}

impl tokio_modbus::server::Service for RecuperatorStub {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = Pin<Box<dyn Future<Output = Result<Response, ExceptionCode>> + Send>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        if matches!(req, Request::ReadInputRegisters(..))
            && self.state.hang_input.load(Ordering::Relaxed)
        {
            return Box::pin(future::pending());
        }

        let res = match req {
            Request::ReadHoldingRegisters(addr, cnt) => {
                read_words(&self.state.holding.lock().unwrap(), addr, cnt)
                    .map(Response::ReadHoldingRegisters)
            }
            Request::ReadInputRegisters(addr, cnt) => {
                if self.state.nak_input.load(Ordering::Relaxed) {
                    Err(ExceptionCode::IllegalDataAddress)
                } else {
                    read_words(&self.state.input.lock().unwrap(), addr, cnt)
                        .map(Response::ReadInputRegisters)
                }
            }
            Request::ReadCoils(addr, cnt) => {
                read_bits(&self.state.coils.lock().unwrap(), addr, cnt).map(Response::ReadCoils)
            }
            Request::WriteSingleRegister(addr, value) => {
                self.state.holding.lock().unwrap().insert(addr, value);
                Ok(Response::WriteSingleRegister(addr, value))
            }
            _ => Err(ExceptionCode::IllegalFunction),
        };
        Box::pin(future::ready(res))
    }
}

fn read_words(
    table: &HashMap<u16, u16>,
    addr: u16,
    cnt: u16,
) -> Result<Vec<u16>, ExceptionCode> {
    let mut values = Vec::with_capacity(cnt as usize);
    for offset in 0..cnt {
        match table.get(&(addr + offset)) {
            Some(value) => values.push(*value),
            None => return Err(ExceptionCode::IllegalDataAddress),
        }
    }
    Ok(values)
}

fn read_bits(
    table: &HashMap<u16, bool>,
    addr: u16,
    cnt: u16,
) -> Result<Vec<bool>, ExceptionCode> {
    let mut values = Vec::with_capacity(cnt as usize);
    for offset in 0..cnt {
        match table.get(&(addr + offset)) {
            Some(value) => values.push(*value),
            None => return Err(ExceptionCode::IllegalDataAddress),
        }
    }
    Ok(values)
}

/// Start the stub on an OS-assigned port.
pub async fn spawn(state: DeviceState) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (addr, serve(listener, state))
}

/// Start the stub on a specific address, e.g. one reserved earlier.
pub async fn spawn_at(addr: SocketAddr, state: DeviceState) -> JoinHandle<()> {
    let listener = TcpListener::bind(addr).await.unwrap();
    serve(listener, state)
}

fn serve(listener: TcpListener, state: DeviceState) -> JoinHandle<()> {
    let server = Server::new(listener);
    tokio::spawn(async move {
        let on_connected = move |stream, socket_addr| {
            let state = state.clone();
            async move {
                accept_tcp_connection(stream, socket_addr, move |_addr| {
                    Ok(Some(RecuperatorStub { state: state.clone() }))
                })
            }
        };
        let on_process_error = |err| {
            eprintln!("stub device error: {err}");
        };
        if let Err(e) = server.serve(&on_connected, on_process_error).await {
            eprintln!("stub device stopped: {e}");
        }
    })
}
