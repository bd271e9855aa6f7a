//! Non-blocking sockets: connect and a session-per-connection server.
//!
//! [`connect`] performs the classic non-blocking connect dance:
//! `EINPROGRESS` suspends on one-shot write readiness, then the socket
//! error is inspected. [`Server`] accepts connections behind a rotating
//! readiness promise and runs each session as a fiber on a shared pool.

use crate::fiber::{self, Ivar};
use crate::io::{create_rw, Reader, Writer};
use crate::reactor::io::{Interest, IoWatcher};
use crate::scheduler::Scheduler;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, IntoRawFd};
use std::rc::Rc;
use tracing::debug;

/// An established connection: a buffered reader/writer pair sharing one
/// descriptor (refcount 2).
pub struct Session {
    /// Receiving side.
    pub reader: Reader,
    /// Sending side.
    pub writer: Writer,
    peer: Option<SocketAddr>,
}

impl Session {
    fn new(socket: Socket, peer: Option<SocketAddr>) -> io::Result<Self> {
        let (reader, writer) = create_rw(socket.into_raw_fd())?;
        Ok(Self {
            reader,
            writer,
            peer,
        })
    }

    /// The peer address, when known.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Closes both sides, releasing the shared descriptor.
    pub fn close(mut self) {
        self.reader.close();
        self.writer.close();
    }
}

/// Connects to `addr` without blocking the loop.
///
/// `EISCONN` is tolerated; `EINPROGRESS` registers a one-shot
/// write-readiness watcher, suspends until it fires, and then raises the
/// socket error if one is pending.
pub async fn connect(addr: SocketAddr) -> io::Result<Session> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nonblocking(true)?;
    match socket.connect(&SockAddr::from(addr)) {
        Ok(()) => {}
        Err(err) if err.raw_os_error() == Some(libc::EINPROGRESS) => {
            wait_connected(&socket).await?;
        }
        Err(err) if err.raw_os_error() == Some(libc::EISCONN) => {}
        Err(err) => return Err(err),
    }
    Session::new(socket, Some(addr))
}

/// Suspends on one-shot write readiness, then checks `SO_ERROR`.
async fn wait_connected(socket: &Socket) -> io::Result<()> {
    let sched = Scheduler::current();
    let ivar: Ivar<()> = Ivar::new();
    let on_ready = sched.clone();
    let to_fill = ivar.clone();
    let watcher = IoWatcher::new(sched.ev(), socket.as_raw_fd(), move |_ready| {
        on_ready.fill(&to_fill, ());
    })?;
    watcher.set_interest(Interest::WRITE)?;
    ivar.read().await;
    watcher.destroy();
    match socket.take_error()? {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct ServerShared {
    sched: Scheduler,
    listener: RefCell<Option<Socket>>,
    watcher: RefCell<Option<IoWatcher>>,
    /// Rotating accept promise: filled once per readiness event (or by
    /// `close`), swapped for a fresh one each accept-loop turn.
    ready: RefCell<Ivar<()>>,
    closed: Cell<bool>,
    pool: fiber::pool::Pool,
}

impl ServerShared {
    fn rearm(&self) {
        if let Some(watcher) = self.watcher.borrow().as_ref() {
            let _ = watcher.set_interest(Interest::READ);
        }
    }
}

/// A listening socket that runs one fiber per accepted connection.
/// Cloning shares the server.
#[derive(Clone)]
pub struct Server {
    shared: Rc<ServerShared>,
}

impl Server {
    /// Binds `addr`, listens with `backlog`, and registers the accept
    /// watcher. The listener is non-blocking and close-on-exec.
    pub fn bind(addr: SocketAddr, backlog: i32) -> io::Result<Self> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let listener = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        listener.set_cloexec(true)?;
        listener.set_reuse_address(true)?;
        listener.bind(&SockAddr::from(addr))?;
        listener.listen(backlog)?;
        listener.set_nonblocking(true)?;

        let sched = Scheduler::current();
        let raw = listener.as_raw_fd();
        let shared = Rc::new(ServerShared {
            sched: sched.clone(),
            listener: RefCell::new(Some(listener)),
            watcher: RefCell::new(None),
            ready: RefCell::new(Ivar::new()),
            closed: Cell::new(false),
            pool: fiber::pool::Pool::new(),
        });
        let in_callback = Rc::clone(&shared);
        let watcher = IoWatcher::new(sched.ev(), raw, move |_ready| {
            let promise = in_callback.ready.borrow().clone();
            in_callback.sched.fill(&promise, ());
            in_callback.rearm();
        })?;
        watcher.set_interest(Interest::READ)?;
        *shared.watcher.borrow_mut() = Some(watcher);
        Ok(Self { shared })
    }

    /// The bound local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        let listener = self.shared.listener.borrow();
        let listener = listener
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "server closed"))?;
        listener
            .local_addr()?
            .as_socket()
            .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "non-inet listener"))
    }

    /// Serves until [`close`](Self::close): runs the session pool and the
    /// accept loop in parallel. Each accepted connection becomes a
    /// [`Session`] handed to `handler` as a pooled fiber.
    pub async fn serve<F, Fut>(&self, handler: F) -> io::Result<()>
    where
        F: Fn(Session) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let pool = self.shared.pool.clone();
        let accept_loop = async move {
            let outcome = self.accept_loop(handler).await;
            // Let `serve` return even when accepting failed.
            self.shared.pool.stop();
            outcome
        };
        let ((), outcome) = fiber::join(pool.run(), accept_loop).await;
        outcome
    }

    async fn accept_loop<F, Fut>(&self, handler: F) -> io::Result<()>
    where
        F: Fn(Session) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        loop {
            if self.shared.closed.get() {
                return Ok(());
            }
            let promise = self.shared.ready.borrow().clone();
            promise.read().await;
            if self.shared.closed.get() {
                return Ok(());
            }
            *self.shared.ready.borrow_mut() = Ivar::new();

            let accepted = {
                let listener = self.shared.listener.borrow();
                match listener.as_ref() {
                    None => return Ok(()),
                    Some(listener) => listener.accept(),
                }
            };
            match accepted {
                Ok((socket, peer)) => {
                    socket.set_nonblocking(true)?;
                    debug!(peer = ?peer.as_socket(), "accepted connection");
                    let session = Session::new(socket, peer.as_socket())?;
                    self.shared.pool.task(handler(session));
                }
                // Readiness went stale (the connection vanished or another
                // event raced); wait for the next edge.
                Err(err)
                    if err.kind() == io::ErrorKind::WouldBlock
                        || err.raw_os_error() == Some(libc::ECONNABORTED) => {}
                Err(err) => return Err(err),
            }
        }
    }

    /// Closes the server: closes the listener, destroys the accept
    /// watcher, stops the pool, and fills the pending accept promise so
    /// the loop exits. Idempotent.
    pub fn close(&self) {
        if self.shared.closed.replace(true) {
            return;
        }
        if let Some(watcher) = self.shared.watcher.borrow_mut().take() {
            watcher.destroy();
        }
        // Dropping the socket closes the descriptor.
        self.shared.listener.borrow_mut().take();
        self.shared.pool.stop();
        self.shared.ready.borrow().clone().try_fill(());
    }
}
