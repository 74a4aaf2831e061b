//! A pool of connections to a single carbon endpoint
//!
//! The pool is an unbounded LIFO stack of idle connections. A write pops
//! the most recently returned connection (or dials a new one when the
//! stack is empty), writes the whole payload and pushes the connection
//! back on success. On any error the connection is dropped, which closes
//! it. There is no idle eviction and no limit on the number of
//! connections: colder connections at the bottom of the stack simply stop
//! being used.
//!
//! The pool lives on a single reactor (it holds a `Handle`, so it can't be
//! sent to another thread). Concurrent writes are futures polled by that
//! reactor, and the stack is a `RefCell` borrowed only for a push or a pop.
//!
//! Note: a write may succeed on a connection that the peer has already
//! closed, the kernel happily buffers the bytes. Detecting that requires
//! either probing the socket before every write or shrinking the send
//! buffer on each call, and both cost too much throughput. So health of
//! pooled connections is optimistic and lost writes of this kind are not
//! reported.
use std::cell::{RefCell, RefMut};
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::{Duration, Instant};

use futures::{Future, Async, Poll};
use tokio_core::net::{TcpStream, TcpStreamNew};
use tokio_core::reactor::{Handle, Timeout};
use tokio_io::AsyncWrite;

use crate::error::SendError;


/// Establishes new connections for the pool
pub trait Dial {
    /// Connection type, dropping it must close the connection
    type Connection: AsyncWrite + 'static;
    /// Future returned by `dial`
    type Future: Future<Item=Self::Connection, Error=io::Error> + 'static;
    /// Start connecting to the address
    ///
    /// The pool applies the timeout itself, so the future may never
    /// resolve.
    fn dial(&self, addr: &SocketAddr) -> Self::Future;
}

/// Dials plain TCP connections on a tokio-core reactor
#[derive(Clone)]
pub struct TcpDialer {
    handle: Handle,
}

/// Pool of connections to a single endpoint
///
/// Clones share the same set of idle connections.
pub struct Pool<D: Dial> {
    inner: Rc<Inner<D>>,
}

struct Inner<D: Dial> {
    addresses: Vec<SocketAddr>,
    timeout: Duration,
    dialer: D,
    handle: Handle,
    idle: RefCell<Vec<D::Connection>>,
}

enum State<C, F> {
    /// Connecting to the address with this index
    Dialing(usize, F),
    Writing(C),
    Done,
}

/// Future that writes one payload using a pooled connection
///
/// Resolves to the number of bytes written (always the whole payload).
pub struct PoolWrite<D: Dial> {
    pool: Pool<D>,
    state: State<D::Connection, D::Future>,
    payload: Vec<u8>,
    written: usize,
    deadline: Instant,
    timer: Option<Timeout>,
}

impl TcpDialer {
    /// Create a dialer that registers connections in the reactor of
    /// `handle`
    pub fn new(handle: &Handle) -> TcpDialer {
        TcpDialer { handle: handle.clone() }
    }
}

impl Dial for TcpDialer {
    type Connection = TcpStream;
    type Future = TcpStreamNew;
    fn dial(&self, addr: &SocketAddr) -> TcpStreamNew {
        TcpStream::connect(addr, &self.handle)
    }
}

impl<D: Dial> Clone for Pool<D> {
    fn clone(&self) -> Pool<D> {
        Pool { inner: self.inner.clone() }
    }
}

impl<D: Dial> Pool<D> {
    /// Create an empty pool, connections are dialed lazily
    ///
    /// New connections try `addresses` in order until one of them accepts.
    /// A `timeout` of zero makes every write that can't complete in its
    /// first poll fail.
    ///
    /// # Panics
    ///
    /// When `addresses` is empty.
    pub fn new(addresses: Vec<SocketAddr>, timeout: Duration,
        dialer: D, handle: &Handle)
        -> Pool<D>
    {
        assert!(!addresses.is_empty(), "pool needs at least one address");
        Pool {
            inner: Rc::new(Inner {
                addresses: addresses,
                timeout: timeout,
                dialer: dialer,
                handle: handle.clone(),
                idle: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Address new connections are tried first
    pub fn address(&self) -> SocketAddr {
        self.inner.addresses[0]
    }

    /// All addresses new connections may be made to
    pub fn addresses(&self) -> &[SocketAddr] {
        &self.inner.addresses
    }

    /// Write the whole payload using an idle or a freshly dialed connection
    ///
    /// The timeout counts from this call, so time spent dialing is
    /// subtracted from the time left for the write.
    pub fn write(&self, payload: Vec<u8>) -> PoolWrite<D> {
        let start = Instant::now();
        let state = match self.pop() {
            Some(conn) => {
                trace!("Reusing idle connection to {}", self.address());
                State::Writing(conn)
            }
            None => State::Dialing(0, self.dial(0)),
        };
        PoolWrite {
            pool: self.clone(),
            state: state,
            payload: payload,
            written: 0,
            deadline: start + self.inner.timeout,
            timer: None,
        }
    }

    /// Number of idle connections in the pool
    pub fn idle(&self) -> usize {
        self.stack().len()
    }

    /// Close all idle connections, returns how many were closed
    ///
    /// Connections being written to at the moment are not affected. If such
    /// a write succeeds the connection is put back into the pool as usual.
    pub fn close(&self) -> usize {
        let conns = mem::replace(&mut *self.stack(), Vec::new());
        conns.len()
    }

    fn dial(&self, index: usize) -> D::Future {
        let addr = &self.inner.addresses[index];
        debug!("Connecting to {}", addr);
        self.inner.dialer.dial(addr)
    }

    fn stack(&self) -> RefMut<Vec<D::Connection>> {
        self.inner.idle.borrow_mut()
    }

    fn pop(&self) -> Option<D::Connection> {
        self.stack().pop()
    }

    fn push(&self, conn: D::Connection) {
        self.stack().push(conn);
    }
}

impl<D: Dial> PoolWrite<D> {
    fn past_deadline(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Returns true if the deadline has passed
    ///
    /// Schedules a wakeup at the deadline otherwise.
    fn expired(&mut self) -> io::Result<bool> {
        if self.past_deadline() {
            return Ok(true);
        }
        if self.timer.is_none() {
            self.timer = Some(
                Timeout::new_at(self.deadline, &self.pool.inner.handle)?);
        }
        match self.timer.as_mut().map(|t| t.poll()) {
            Some(Ok(Async::Ready(()))) => Ok(true),
            Some(Ok(Async::NotReady)) | None => Ok(false),
            Some(Err(e)) => Err(e),
        }
    }

    fn write_payload(&mut self, conn: &mut D::Connection)
        -> Poll<(), io::Error>
    {
        // a connection acquired too late must not get even a partial line
        if self.written == 0 && self.past_deadline() {
            return Err(io::ErrorKind::TimedOut.into());
        }
        while self.written < self.payload.len() {
            match conn.poll_write(&self.payload[self.written..])? {
                Async::Ready(0) => {
                    return Err(io::ErrorKind::WriteZero.into());
                }
                Async::Ready(n) => self.written += n,
                Async::NotReady => {
                    if self.expired()? {
                        return Err(io::ErrorKind::TimedOut.into());
                    }
                    return Ok(Async::NotReady);
                }
            }
        }
        match conn.poll_flush()? {
            Async::Ready(()) => Ok(Async::Ready(())),
            Async::NotReady => {
                if self.expired()? {
                    return Err(io::ErrorKind::TimedOut.into());
                }
                Ok(Async::NotReady)
            }
        }
    }

    fn dial_error(&self, index: usize, e: io::Error) -> SendError {
        SendError::Dial {
            address: self.pool.inner.addresses[index],
            source: e,
        }
    }
}

impl<D: Dial> Future for PoolWrite<D> {
    type Item = usize;
    type Error = SendError;
    fn poll(&mut self) -> Poll<usize, SendError> {
        loop {
            match mem::replace(&mut self.state, State::Done) {
                State::Dialing(idx, mut future) => match future.poll() {
                    Ok(Async::Ready(conn)) => {
                        debug!("Connected to {}",
                            self.pool.inner.addresses[idx]);
                        self.state = State::Writing(conn);
                    }
                    Ok(Async::NotReady) => match self.expired() {
                        Ok(false) => {
                            self.state = State::Dialing(idx, future);
                            return Ok(Async::NotReady);
                        }
                        Ok(true) => {
                            return Err(self.dial_error(idx,
                                io::ErrorKind::TimedOut.into()));
                        }
                        Err(e) => return Err(self.dial_error(idx, e)),
                    },
                    Err(e) => {
                        let next = idx + 1;
                        if next < self.pool.inner.addresses.len()
                            && !self.past_deadline()
                        {
                            debug!("Can't connect to {}: {}",
                                self.pool.inner.addresses[idx], e);
                            self.state = State::Dialing(next,
                                self.pool.dial(next));
                        } else {
                            return Err(self.dial_error(idx, e));
                        }
                    }
                },
                State::Writing(mut conn) => {
                    let result = self.write_payload(&mut conn);
                    match result {
                        Ok(Async::Ready(())) => {
                            trace!("Returning connection to {} into the pool",
                                self.pool.address());
                            self.pool.push(conn);
                            return Ok(Async::Ready(self.written));
                        }
                        Ok(Async::NotReady) => {
                            self.state = State::Writing(conn);
                            return Ok(Async::NotReady);
                        }
                        Err(e) => {
                            debug!("Closing connection to {} after error: {}",
                                self.pool.address(), e);
                            drop(conn);
                            return Err(SendError::Write {
                                address: self.pool.address(),
                                written: self.written,
                                source: e,
                            });
                        }
                    }
                }
                State::Done => panic!("PoolWrite polled after completion"),
            }
        }
    }
}
