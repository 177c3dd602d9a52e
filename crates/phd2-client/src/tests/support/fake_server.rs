//! Scripted guiding server listening on a loopback TCP port.
//!
//! The server accepts one connection at a time, records every request it
//! receives and answers with whatever lines the responder returns. Tests can
//! also push unsolicited lines and drop the connection.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use phd2_config::{Config, SocketEndpoint};
use serde_json::{Value, json};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

type Responder = Box<dyn FnMut(&Value) -> Vec<String> + Send>;

#[derive(Default)]
struct Shared {
    stream: Mutex<Option<TcpStream>>,
    requests: Mutex<Vec<Value>>,
    connections: Mutex<usize>,
    stop: AtomicBool,
}

impl Shared {
    fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut guard = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        let stream = guard.as_mut().ok_or(ErrorKind::NotConnected)?;
        stream.write_all(line.as_bytes())?;
        stream.write_all(b"\r\n")?;
        stream.flush()
    }
}

/// Loopback server double.
pub(crate) struct FakeServer {
    port: u16,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl FakeServer {
    /// Starts a server whose `responder` maps each request to reply lines.
    pub(crate) fn spawn<F>(responder: F) -> Result<Self>
    where
        F: FnMut(&Value) -> Vec<String> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").context("bind loopback listener")?;
        listener
            .set_nonblocking(true)
            .context("make listener non-blocking")?;
        let port = listener.local_addr().context("listener address")?.port();
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("fake-phd2".to_owned())
            .spawn(move || serve(&listener, &worker_shared, Box::new(responder)))
            .context("spawn fake server thread")?;
        Ok(Self {
            port,
            shared,
            worker: Some(worker),
        })
    }

    /// Starts a server that answers every request with `answer(method)`.
    pub(crate) fn answering<F>(mut answer: F) -> Result<Self>
    where
        F: FnMut(&str) -> Value + Send + 'static,
    {
        Self::spawn(move |request| {
            let method = request
                .get("method")
                .and_then(Value::as_str)
                .unwrap_or_default();
            vec![success(request, &answer(method))]
        })
    }

    pub(crate) fn endpoint(&self) -> SocketEndpoint {
        SocketEndpoint::tcp("127.0.0.1", self.port)
    }

    /// Client configuration pointing at this server with short timeouts.
    pub(crate) fn config(&self) -> Config {
        Config {
            endpoint: self.endpoint(),
            connect_timeout_ms: 2_000,
            command_timeout_ms: 2_000,
            ..Config::default()
        }
    }

    /// Sends an unsolicited line on the current connection.
    pub(crate) fn push(&self, line: &str) -> Result<()> {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            match self.shared.write_line(line) {
                Ok(()) => return Ok(()),
                Err(error) if error.kind() == ErrorKind::NotConnected => {
                    if Instant::now() >= deadline {
                        bail!("no client connected");
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(error) => return Err(error).context("write pushed line"),
            }
        }
    }

    /// Closes the current connection from the server side.
    pub(crate) fn hang_up(&self) {
        let stream = self
            .shared
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(open) = stream {
            drop(open.shutdown(Shutdown::Both));
        }
    }

    /// Every request received so far, in arrival order.
    pub(crate) fn requests(&self) -> Vec<Value> {
        self.shared
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Waits until at least `count` requests have arrived.
    pub(crate) fn wait_for_requests(&self, count: usize) -> Result<()> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while self.requests().len() < count {
            if Instant::now() >= deadline {
                bail!("expected {count} requests, saw {}", self.requests().len());
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }

    /// Number of connections accepted so far.
    pub(crate) fn connections(&self) -> usize {
        *self
            .shared
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits until a client has connected `count` times.
    pub(crate) fn wait_for_connections(&self, count: usize) -> Result<()> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while self.connections() < count {
            if Instant::now() >= deadline {
                bail!("expected {count} connections, saw {}", self.connections());
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.hang_up();
        if let Some(worker) = self.worker.take() {
            drop(worker.join());
        }
    }
}

/// A successful response line for `request`.
pub(crate) fn success(request: &Value, result: &Value) -> String {
    json!({"jsonrpc": "2.0", "result": result, "id": request["id"]}).to_string()
}

/// An error response line for `request`.
pub(crate) fn failure(request: &Value, code: i64, message: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "error": {"code": code, "message": message},
        "id": request["id"],
    })
    .to_string()
}

fn serve(listener: &TcpListener, shared: &Shared, mut responder: Responder) {
    while !shared.stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                if handle(stream, shared, &mut responder).is_err() {
                    continue;
                }
            }
            Err(error) if error.kind() == ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
            Err(_) => return,
        }
    }
}

fn handle(stream: TcpStream, shared: &Shared, responder: &mut Responder) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    let reader = BufReader::new(stream.try_clone()?);
    *shared.stream.lock().unwrap_or_else(PoisonError::into_inner) = Some(stream);
    *shared
        .connections
        .lock()
        .unwrap_or_else(PoisonError::into_inner) += 1;

    for line in reader.lines() {
        let text = line?;
        let Ok(request) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        shared
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        for reply in responder(&request) {
            shared.write_line(&reply)?;
        }
    }
    shared
        .stream
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    Ok(())
}
