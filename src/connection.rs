//! Asynchronous pipeline-mode connection.
//!
//! The connection owns the socket, the protocol [`Session`], and the FIFO
//! of result handlers. [`Connection::run`] must be active concurrently with
//! any exec: it is the only task that moves bytes, racing a writer half
//! (drains the session's output whenever an exec signals the write wakeup)
//! against a reader half (feeds inbound bytes to the session and forwards
//! completed results to the handler at the head of the queue).
//!
//! Everything is single-threaded: the run-loop and all execs on one
//! connection must be co-scheduled on the same executor, typically by
//! racing them with `tokio::select!` or `tokio::join!` in one task.

use std::cell::{Cell, OnceCell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use tokio::net::TcpStream;
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::handler::{DumifyGuard, HandlerStatus, ResultHandler};
use crate::oid_map::OidMap;
use crate::opts::Opts;
use crate::params::{Params, ToParams};
use crate::pipeline::Pipeline;
use crate::protocol::codec::split_frame;
use crate::protocol::frontend::write_terminate;
use crate::protocol::types::Oid;
use crate::result::QueryResult;
use crate::session::Session;
use crate::startup::{Startup, StartupStep};

const TYPE_LOOKUP_QUERY: &str =
    "SELECT typname, oid, typarray FROM pg_type WHERE typname = ANY($1)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Fresh,
    Connecting,
    Ready,
    Closed,
}

/// An asynchronous PostgreSQL connection in pipeline mode.
pub struct Connection {
    state: Cell<ConnState>,
    socket: OnceCell<TcpStream>,
    session: RefCell<Session>,
    handlers: RefCell<VecDeque<Rc<ResultHandler>>>,
    write_wakeup: Notify,
    oid_map: RefCell<OidMap>,
    server_params: RefCell<Vec<(String, String)>>,
    backend_pid: Cell<u32>,
}

impl Connection {
    /// Create an idle connection. [`Connection::connect`] makes it usable.
    pub fn new() -> Self {
        Self {
            state: Cell::new(ConnState::Fresh),
            socket: OnceCell::new(),
            session: RefCell::new(Session::new()),
            handlers: RefCell::new(VecDeque::new()),
            write_wakeup: Notify::new(),
            oid_map: RefCell::new(OidMap::new()),
            server_params: RefCell::new(Vec::new()),
            backend_pid: Cell::new(0),
        }
    }

    /// Establish the connection: TCP connect, startup handshake,
    /// authentication, then pipeline mode.
    pub async fn connect(&self, uri: &str) -> Result<()> {
        if self.state.get() != ConnState::Fresh {
            return Err(Error::InvalidUsage(
                "connect may only be called on a fresh connection".into(),
            ));
        }
        self.state.set(ConnState::Connecting);

        match self.connect_inner(uri).await {
            Ok(()) => {
                self.state.set(ConnState::Ready);
                Ok(())
            }
            Err(e) => {
                self.state.set(ConnState::Closed);
                Err(e)
            }
        }
    }

    async fn connect_inner(&self, uri: &str) -> Result<()> {
        let opts = Opts::try_from(uri)?;
        if opts.user.is_empty() {
            return Err(Error::InvalidUsage("connection URI has no user".into()));
        }

        debug!(host = %opts.host, port = opts.port, "connecting");
        let socket = TcpStream::connect((opts.host.as_str(), opts.port)).await?;
        socket.set_nodelay(true)?;

        let mut startup = Startup::new(&opts);
        let mut out = Vec::new();
        startup.start(&mut out);

        let mut inbuf: Vec<u8> = Vec::new();
        let mut pos = 0;

        'handshake: loop {
            // Flush whatever the machine queued.
            let mut written = 0;
            while written < out.len() {
                socket.writable().await?;
                match socket.try_write(&out[written..]) {
                    Ok(n) => written += n,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(e.into()),
                }
            }
            out.clear();

            // Feed buffered messages until the machine responds or needs
            // more bytes.
            while let Some((type_byte, payload, consumed)) = split_frame(&inbuf[pos..])? {
                let step = startup.on_message(type_byte, payload, &mut out)?;
                pos += consumed;
                match step {
                    StartupStep::Done => break 'handshake,
                    StartupStep::Continue if !out.is_empty() => continue 'handshake,
                    StartupStep::Continue => {}
                }
            }

            socket.readable().await?;
            let mut chunk = [0_u8; 8192];
            match socket.try_read(&mut chunk) {
                Ok(0) => return Err(Error::Io(io::ErrorKind::UnexpectedEof.into())),
                Ok(n) => inbuf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e.into()),
            }
        }

        // Enter pipeline mode: bytes past the handshake belong to the
        // session.
        self.session.borrow_mut().feed(&inbuf[pos..]);
        self.backend_pid.set(startup.backend_pid());
        *self.server_params.borrow_mut() = startup.take_server_params();
        self.socket
            .set(socket)
            .map_err(|_| Error::InvalidUsage("connection already has a socket".into()))?;

        debug!(backend_pid = self.backend_pid.get(), "connection ready");
        Ok(())
    }

    /// Drive the connection's I/O until an error occurs.
    ///
    /// Races the writer half against the reader half; the first to fail
    /// ends the loop, every pending handler is cancelled, and subsequent
    /// execs fail fast with [`Error::ConnectionLost`].
    pub async fn run(&self) -> Result<()> {
        let socket = self.require_socket()?;

        let result = tokio::select! {
            r = self.write_half(socket) => r,
            r = self.read_half(socket) => r,
        };

        debug!(
            error = ?result,
            unparsed = self.session.borrow().in_flight(),
            "run-loop terminated"
        );
        self.shutdown();
        result
    }

    async fn write_half(&self, socket: &TcpStream) -> Result<()> {
        loop {
            self.write_wakeup.notified().await;
            loop {
                if !self.session.borrow().has_output() {
                    break;
                }
                socket.writable().await?;
                let mut session = self.session.borrow_mut();
                match socket.try_write(session.output()) {
                    Ok(n) => session.consume_output(n),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    async fn read_half(&self, socket: &TcpStream) -> Result<()> {
        let mut chunk = vec![0_u8; 16 * 1024];
        loop {
            loop {
                let next = self.session.borrow_mut().next_result()?;
                let Some(result) = next else { break };
                // Sync markers fence a batch; they are consumed here and
                // never forwarded.
                if result.status() == crate::result::ResultStatus::PipelineSync {
                    trace!("pipeline sync consumed");
                    continue;
                }
                self.dispatch(result)?;
            }

            socket.readable().await?;
            match socket.try_read(&mut chunk) {
                Ok(0) => return Err(Error::Io(io::ErrorKind::UnexpectedEof.into())),
                Ok(n) => self.session.borrow_mut().feed(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Forward one result to the handler at the head of the FIFO.
    fn dispatch(&self, result: QueryResult) -> Result<()> {
        let mut handlers = self.handlers.borrow_mut();
        let Some(head) = handlers.front() else {
            return Err(Error::Protocol(
                "result arrived with no in-flight operation".into(),
            ));
        };
        head.handle(result);
        if head.status() == HandlerStatus::Completed {
            handlers.pop_front();
        }
        Ok(())
    }

    /// Execute one query and await its result.
    ///
    /// Pass `()` for a query without parameters. Server-side SQL errors are
    /// returned as a [`QueryResult`] with an error status, not as an `Err`.
    pub async fn exec<P: ToParams>(&self, query: &str, params: P) -> Result<QueryResult> {
        self.ensure_ready()?;
        validate_query(query)?;

        let mut new_udts = Vec::new();
        params.collect_new_udts(&self.oid_map.borrow(), &mut new_udts);
        self.resolve_types(new_udts).await?;

        let encoded = Params::build(&self.oid_map.borrow(), &params)?;
        trace!(query, params = encoded.count(), "exec");
        self.submit_and_wait(query, &encoded).await
    }

    /// Execute a batch of queries as one pipeline and await all results.
    ///
    /// The closure pushes `(query, params)` pairs; push order is
    /// transmission order and result order. The returned vector holds one
    /// result per pushed query.
    pub async fn exec_pipeline<'q, F>(&self, build: F) -> Result<Vec<QueryResult>>
    where
        F: FnOnce(&mut Pipeline<'q>) -> Result<()>,
    {
        self.ensure_ready()?;

        let mut pipeline = Pipeline::new();
        build(&mut pipeline)?;
        if pipeline.is_empty() {
            return Ok(Vec::new());
        }
        for item in &pipeline.items {
            validate_query(&item.query)?;
        }

        let mut new_udts = Vec::new();
        {
            let map = self.oid_map.borrow();
            for item in &pipeline.items {
                item.params.collect_new_udts(&map, &mut new_udts);
            }
        }
        self.resolve_types(new_udts).await?;

        // Encode every pack before any bytes are queued, so a failing
        // value cannot leave a partial batch on the wire.
        let encoded: Vec<(String, Params)> = {
            let map = self.oid_map.borrow();
            pipeline
                .items
                .iter()
                .map(|item| Ok((item.query.clone(), item.params.encode(&map)?)))
                .collect::<Result<_>>()?
        };

        trace!(queries = encoded.len(), "exec_pipeline");
        let handler = {
            let mut session = self.session.borrow_mut();
            for (query, params) in &encoded {
                session.send_query_params(query, params);
            }
            session.pipeline_sync();
            self.enqueue(ResultHandler::pipeline(encoded.len()))
        };
        self.write_wakeup.notify_one();

        let mut guard = DumifyGuard::new(handler.clone());
        handler.wait().await;
        guard.disarm();

        match handler.status() {
            HandlerStatus::Completed => Ok(handler.take_pipeline()),
            _ => Err(Error::ConnectionLost),
        }
    }

    /// Register a user-defined type's OIDs, skipping the automatic lookup.
    pub fn register_type(&self, name: &'static str, oid: Oid, array_oid: Oid) {
        self.oid_map.borrow_mut().register(name, oid, array_oid);
    }

    /// Snapshot of the connection's type registry, for decoding rows.
    pub fn oid_map(&self) -> OidMap {
        self.oid_map.borrow().clone()
    }

    /// Server parameters announced during startup.
    pub fn server_params(&self) -> Vec<(String, String)> {
        self.server_params.borrow().clone()
    }

    /// Backend process ID, or 0 before connecting.
    pub fn backend_pid(&self) -> u32 {
        self.backend_pid.get()
    }

    /// Cancel pending operations and close the connection, sending a
    /// best-effort Terminate message.
    pub async fn close(&self) {
        if self.state.get() == ConnState::Closed {
            return;
        }
        self.shutdown();

        let Some(socket) = self.socket.get() else {
            return;
        };
        let mut buf = Vec::new();
        write_terminate(&mut buf);
        let mut written = 0;
        while written < buf.len() {
            if socket.writable().await.is_err() {
                break;
            }
            match socket.try_write(&buf[written..]) {
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(_) => break,
            }
        }
    }

    async fn submit_and_wait(&self, query: &str, params: &Params) -> Result<QueryResult> {
        let handler = {
            let mut session = self.session.borrow_mut();
            session.send_query_params(query, params);
            session.pipeline_sync();
            self.enqueue(ResultHandler::single())
        };
        self.write_wakeup.notify_one();

        let mut guard = DumifyGuard::new(handler.clone());
        handler.wait().await;
        guard.disarm();

        match handler.status() {
            HandlerStatus::Completed => handler
                .take_single()
                .ok_or_else(|| Error::Protocol("completed handler holds no result".into())),
            _ => Err(Error::ConnectionLost),
        }
    }

    /// Look up not-yet-registered type names in `pg_type` and register
    /// them. The lookup query travels through the same pipeline as any
    /// other exec.
    async fn resolve_types(&self, mut names: Vec<&'static str>) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        names.sort_unstable();
        names.dedup();
        debug!(?names, "resolving user-defined types");

        let encoded = Params::build(&self.oid_map.borrow(), &(names.clone(),))?;
        let result = self.submit_and_wait(TYPE_LOOKUP_QUERY, &encoded).await?;
        if result.status().is_error() {
            return Err(match result.error() {
                Some(fields) => Error::Server(fields.clone()),
                None => Error::ConnectionLost,
            });
        }

        let resolved: Vec<(&'static str, u32, u32)> = {
            let map = self.oid_map.borrow();
            let mut resolved = Vec::new();
            for row in result.rows() {
                let (typname, oid, array_oid): (String, u32, u32) = row.decode(&map)?;
                if let Some(name) = names.iter().copied().find(|n| *n == typname) {
                    resolved.push((name, oid, array_oid));
                }
            }
            resolved
        };

        let mut map = self.oid_map.borrow_mut();
        for (name, oid, array_oid) in resolved {
            map.register(name, oid, array_oid);
        }
        for name in names {
            if !map.contains(name) {
                return Err(Error::UnknownOid(name.to_string()));
            }
        }
        Ok(())
    }

    fn enqueue(&self, handler: ResultHandler) -> Rc<ResultHandler> {
        let handler = Rc::new(handler);
        self.handlers.borrow_mut().push_back(handler.clone());
        handler
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state.get() {
            ConnState::Ready => Ok(()),
            ConnState::Closed => Err(Error::ConnectionLost),
            _ => Err(Error::InvalidUsage("connection is not connected".into())),
        }
    }

    fn require_socket(&self) -> Result<&TcpStream> {
        self.socket
            .get()
            .ok_or_else(|| Error::InvalidUsage("connection is not connected".into()))
    }

    /// Cancel every pending handler and mark the connection unusable.
    fn shutdown(&self) {
        self.state.set(ConnState::Closed);
        let mut handlers = self.handlers.borrow_mut();
        while let Some(handler) = handlers.pop_front() {
            handler.cancel();
        }
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn validate_query(query: &str) -> Result<()> {
    if query.as_bytes().contains(&0) {
        return Err(Error::InvalidUsage("query contains a NUL byte".into()));
    }
    Ok(())
}
