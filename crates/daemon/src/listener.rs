// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket listener: one connection, one request, one reply.
//!
//! Each accepted connection is handled on its own thread with plain
//! blocking I/O. Shutdown drains in-flight handlers before the accept loop
//! returns.

use crate::handlers::{handle_request, HandlerCtx};
use crate::protocol::{self, ErrorKind, ProtocolError, Reply};
use parking_lot::{Condvar, Mutex};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Per-connection read/write timeout.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Counts running connection handlers so shutdown can drain them.
#[derive(Default)]
struct Inflight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Inflight {
    fn enter(&self) {
        *self.count.lock() += 1;
    }

    fn exit(&self) {
        let mut count = self.count.lock();
        *count -= 1;
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.idle.wait(&mut count);
        }
    }
}

/// The daemon's accept loop.
pub struct Server {
    listener: UnixListener,
    ctx: Arc<HandlerCtx>,
    inflight: Arc<Inflight>,
}

impl Server {
    pub fn new(listener: UnixListener, ctx: Arc<HandlerCtx>) -> Self {
        Self {
            listener,
            ctx,
            inflight: Arc::new(Inflight::default()),
        }
    }

    /// Accept connections until a shutdown request arrives, then drain
    /// in-flight handlers.
    pub fn run(self) {
        for stream in self.listener.incoming() {
            if self.ctx.shutdown.load(Ordering::SeqCst) {
                break;
            }
            match stream {
                Ok(stream) => {
                    let ctx = Arc::clone(&self.ctx);
                    let inflight = Arc::clone(&self.inflight);
                    inflight.enter();
                    std::thread::spawn(move || {
                        if let Err(e) = handle_connection(stream, &ctx) {
                            match e {
                                ProtocolError::ConnectionClosed => debug!("client disconnected"),
                                _ => error!(error = %e, "connection error"),
                            }
                        }
                        if ctx.shutdown.load(Ordering::SeqCst) {
                            wake_acceptor(&ctx);
                        }
                        inflight.exit();
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept error");
                }
            }
        }

        info!("draining in-flight handlers");
        self.inflight.wait_idle();
    }
}

/// Handle one client connection: read a request line, dispatch, write the
/// reply, close.
fn handle_connection(stream: UnixStream, ctx: &HandlerCtx) -> Result<(), ProtocolError> {
    stream.set_read_timeout(Some(CONNECTION_TIMEOUT))?;
    stream.set_write_timeout(Some(CONNECTION_TIMEOUT))?;

    let mut reader = stream.try_clone()?;
    let mut writer = stream;

    let line = protocol::read_line(&mut reader)?;
    let reply = match protocol::decode_request(&line) {
        Ok(request) => {
            debug!(request = ?request, "received request");
            match handle_request(ctx, request) {
                Ok(data) => Reply::ok(data),
                Err(e) => {
                    warn!(error = %e, "handler failed");
                    Reply::error(e.kind(), e.to_string())
                }
            }
        }
        Err(e) => Reply::error(ErrorKind::InvalidRequest, e.to_string()),
    };

    protocol::write_line(&mut writer, &reply)
}

/// Unblock the accept loop after the shutdown flag is set.
fn wake_acceptor(ctx: &HandlerCtx) {
    if let Err(e) = UnixStream::connect(&ctx.socket_path) {
        warn!(error = %e, "failed to nudge acceptor for shutdown");
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
