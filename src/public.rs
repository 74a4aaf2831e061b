use std::fmt;
use std::net::SocketAddr;

use futures::{Future, Async, Poll};
use tokio_core::reactor::Handle;

use crate::element::MetricRecord;
use crate::error::{ConfigError, SendError};
use crate::pool::{Dial, Pool, PoolWrite, TcpDialer};
use crate::proto::Encoder;
use crate::Config;


/// The two hooks a host framework drives an exporter with
pub trait Export {
    /// Future returned by `send`
    type Future: Future<Item=SendReport, Error=SendError>;
    /// Encode and deliver a batch of records
    fn send(&self, records: &[MetricRecord]) -> Self::Future;
    /// Release resources, calling it more than once is fine
    fn shutdown(&self);
}

/// Outcome of a successful send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReport {
    /// Records written to the backend
    pub accepted: usize,
    /// Records skipped because carbon can't express their value
    pub dropped: usize,
    /// Size of the payload written
    pub bytes: usize,
}

/// A structure that is used to submit batches of values to carbon
///
/// Clones share the same pool of connections, so sends made through any
/// of them reuse each other's connections. Sends don't wait for each
/// other, each one gets a connection of its own.
pub struct Sender<D: Dial = TcpDialer> {
    pool: Pool<D>,
    encoder: Encoder,
}

/// Future returned by `Sender::send`
pub struct SendFuture<D: Dial> {
    report: SendReport,
    write: Option<PoolWrite<D>>,
}

impl Sender<TcpDialer> {
    /// Create a sender connecting over TCP
    ///
    /// Fails if the timeout is negative or the endpoint can't be resolved.
    /// No connection is made until the first send.
    pub fn new(config: &Config, handle: &Handle)
        -> Result<Sender<TcpDialer>, ConfigError>
    {
        Sender::with_dialer(config, TcpDialer::new(handle), handle)
    }
}

impl<D: Dial> Sender<D> {
    /// Create a sender that uses a custom way of establishing connections
    pub fn with_dialer(config: &Config, dialer: D, handle: &Handle)
        -> Result<Sender<D>, ConfigError>
    {
        let valid = config.validate()?;
        debug!("Carbon sender for {:?} with timeout {:?}",
            valid.addresses, valid.timeout);
        Ok(Sender {
            pool: Pool::new(valid.addresses, valid.timeout, dialer, handle),
            encoder: config.tag_style.encoder(),
        })
    }

    /// Replace the encoder, e.g. to use a custom `PathFormat`
    pub fn set_encoder(&mut self, encoder: Encoder) {
        self.encoder = encoder;
    }

    /// Address of the carbon backend that is tried first
    pub fn address(&self) -> SocketAddr {
        self.pool.address()
    }

    /// Number of connections currently idle in the pool
    pub fn idle_connections(&self) -> usize {
        self.pool.idle()
    }

    /// Encode the records and write them using a pooled connection
    ///
    /// Failure means the whole batch is lost. Nothing is retried, it's up
    /// to the caller to send the batch again.
    ///
    /// A batch that encodes to nothing (empty, or every record dropped)
    /// resolves successfully without acquiring a connection. So unlike a
    /// non-empty batch it succeeds even when the backend is unreachable.
    pub fn send(&self, records: &[MetricRecord]) -> SendFuture<D> {
        let payload = self.encoder.encode(records);
        let report = SendReport {
            accepted: payload.accepted,
            dropped: payload.dropped,
            bytes: payload.bytes.len(),
        };
        if payload.bytes.is_empty() {
            trace!("Nothing to send out of {} metrics", records.len());
            return SendFuture { report: report, write: None };
        }
        SendFuture {
            report: report,
            write: Some(self.pool.write(payload.bytes)),
        }
    }

    /// Close all idle connections
    ///
    /// Sends that are in progress are not interrupted. A connection of a
    /// send that completes after shutdown goes back to the pool, so the
    /// sender stays usable.
    pub fn shutdown(&self) {
        let closed = self.pool.close();
        info!("Carbon sender for {} shut down, {} connections closed",
            self.pool.address(), closed);
    }
}

impl<D: Dial> Clone for Sender<D> {
    fn clone(&self) -> Sender<D> {
        Sender {
            pool: self.pool.clone(),
            encoder: self.encoder.clone(),
        }
    }
}

impl<D: Dial> Export for Sender<D> {
    type Future = SendFuture<D>;
    fn send(&self, records: &[MetricRecord]) -> SendFuture<D> {
        Sender::send(self, records)
    }
    fn shutdown(&self) {
        Sender::shutdown(self)
    }
}

impl<D: Dial> Future for SendFuture<D> {
    type Item = SendReport;
    type Error = SendError;
    fn poll(&mut self) -> Poll<SendReport, SendError> {
        let bytes = match self.write {
            Some(ref mut write) => match write.poll() {
                Ok(Async::Ready(bytes)) => bytes,
                Ok(Async::NotReady) => return Ok(Async::NotReady),
                Err(e) => {
                    warn!("Failed to send {} metrics: {}",
                        self.report.accepted, e);
                    return Err(e);
                }
            },
            None => 0,
        };
        debug!("Sent {} metrics ({} bytes, {} dropped)",
            self.report.accepted, bytes, self.report.dropped);
        Ok(Async::Ready(self.report))
    }
}

impl<D: Dial> fmt::Debug for Sender<D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Sender({}, {} idle)",
            self.pool.address(), self.pool.idle())
    }
}

#[cfg(test)]
mod test {
    use std::f64;
    use std::time::Duration;

    use futures::Future;
    use futures::future::join_all;
    use tk_easyloop;

    use crate::element::MetricRecord;
    use crate::pool::mock::{MockDialer, DialMode, WriteMode};
    use crate::proto::{Encoder, Dotted};
    use super::{Sender, Export, SendReport};
    use crate::Config;

    fn sender(dialer: &MockDialer) -> Sender<MockDialer> {
        let cfg = Config::new()
            .endpoint("127.0.0.1:2003")
            .timeout(Duration::from_secs(1))
            .done();
        Sender::with_dialer(&cfg, dialer.clone(), &tk_easyloop::handle())
            .unwrap()
    }

    #[test]
    fn negative_timeout() {
        let cfg = Config::new()
            .endpoint("127.0.0.1:2003")
            .timeout_ms(-1000)
            .done();
        tk_easyloop::run(|| {
            assert!(Sender::new(&cfg, &tk_easyloop::handle()).is_err());
            Ok::<(), ()>(())
        }).unwrap();
    }

    #[test]
    fn reports_counts() {
        tk_easyloop::run(|| {
            let dialer = MockDialer::new(&tk_easyloop::handle());
            let sender = sender(&dialer);
            sender.send(&[
                MetricRecord::new("app.cpu", 42.0, 1000),
                MetricRecord::new("app.mem", f64::NAN, 1000),
            ]).map(move |report| {
                assert_eq!(report, SendReport {
                    accepted: 1,
                    dropped: 1,
                    bytes: 16,
                });
                assert_eq!(&dialer.shared.received.borrow()[..],
                    &b"app.cpu 42 1000\n"[..]);
                assert_eq!(sender.idle_connections(), 1);
            })
        }).unwrap();
    }

    #[test]
    fn empty_batch_skips_pool() {
        tk_easyloop::run(|| {
            let dialer = MockDialer::new(&tk_easyloop::handle());
            let sender = sender(&dialer);
            sender.send(&[MetricRecord::new("nan", f64::NAN, 1)])
            .map(move |report| {
                assert_eq!(report.accepted, 0);
                assert_eq!(report.dropped, 1);
                assert_eq!(dialer.shared.dials.get(), 0);
                assert_eq!(sender.idle_connections(), 0);
            })
        }).unwrap();
    }

    #[test]
    fn zero_timeout_send() {
        let cfg = Config::new()
            .endpoint("127.0.0.1:2003")
            .timeout_ms(0)
            .done();
        tk_easyloop::run(|| {
            let dialer = MockDialer::new(&tk_easyloop::handle());
            dialer.then(DialMode::Connect).then(DialMode::Hang);
            let sender = Sender::with_dialer(&cfg, dialer.clone(),
                &tk_easyloop::handle()).unwrap();
            let s2 = sender.clone();
            let batch = vec![MetricRecord::new("a", 1, 1)];
            sender.send(&batch).then(move |res| {
                let err = res.unwrap_err();
                assert!(err.is_write() && err.is_timeout());
                s2.send(&batch)
            })
            .then(move |res| {
                let err = res.unwrap_err();
                assert!(err.is_dial() && err.is_timeout());
                assert!(dialer.shared.received.borrow().is_empty());
                assert_eq!(sender.idle_connections(), 0);
                Ok::<(), ()>(())
            })
        }).unwrap();
    }

    #[test]
    fn failure_then_redial() {
        tk_easyloop::run(|| {
            let dialer = MockDialer::new(&tk_easyloop::handle());
            dialer.then(DialMode::Connect).then(DialMode::Refuse);
            let sender = sender(&dialer);
            let s2 = sender.clone();
            let d2 = dialer.clone();
            let batch = vec![MetricRecord::new("a", 1, 1)];
            sender.send(&batch)
            .and_then(move |_| {
                d2.shared.set_write_mode(WriteMode::Fail);
                s2.send(&batch).then(move |res| {
                    assert!(res.unwrap_err().is_write());
                    assert_eq!(s2.idle_connections(), 0);
                    d2.shared.set_write_mode(WriteMode::Accept);
                    s2.send(&batch)
                })
            })
            .then(move |res| {
                let err = res.unwrap_err();
                assert!(err.is_dial());
                assert_eq!(dialer.shared.dials.get(), 2);
                assert_eq!(sender.idle_connections(), 0);
                Ok::<(), ()>(())
            })
        }).unwrap();
    }

    #[test]
    fn custom_encoder() {
        tk_easyloop::run(|| {
            let dialer = MockDialer::new(&tk_easyloop::handle());
            let mut sender = sender(&dialer);
            sender.set_encoder(Encoder::new(Dotted));
            sender.send(&[MetricRecord::new("cpu", 1, 5).tag("host", "a")])
            .map(move |_| {
                assert_eq!(&dialer.shared.received.borrow()[..],
                    &b"cpu.host.a 1 5\n"[..]);
            })
        }).unwrap();
    }

    #[test]
    fn shutdown_through_trait() {
        fn stop<E: Export>(exporter: &E) {
            exporter.shutdown();
            exporter.shutdown();
        }
        tk_easyloop::run(|| {
            let dialer = MockDialer::new(&tk_easyloop::handle());
            dialer.shared.set_write_mode(WriteMode::YieldOnce);
            let sender = sender(&dialer);
            let sends = (0..4)
                .map(|i| Export::send(&sender,
                    &[MetricRecord::new(format!("m{}", i), i, 1)]))
                .collect::<Vec<_>>();
            join_all(sends).map(move |reports| {
                assert_eq!(reports.len(), 4);
                assert_eq!(sender.idle_connections(), 4);
                stop(&sender);
                assert_eq!(sender.idle_connections(), 0);
                assert_eq!(dialer.shared.closed.get(), 4);
            })
        }).unwrap();
    }
}
