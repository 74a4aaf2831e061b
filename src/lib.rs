//! Sender of metrics over the carbon (graphite) plaintext protocol
//!
//! Batches of records are rendered as `<path> <value> <timestamp>\n` lines
//! and written to the backend over TCP. Connections are pooled and reused
//! across sends, each send is bounded by a single timeout.
//!
//! # Example
//!
//! ```ignore
//! let mut core = Core::new()?;
//! let config = Config::new()
//!     .endpoint("127.0.0.1:2003")
//!     .timeout(Duration::from_secs(1))
//!     .done();
//! let sender = Sender::new(&config, &core.handle())?;
//! core.run(sender.send(&[MetricRecord::now("app.cpu", 42)]))?;
//! sender.shutdown();
//! ```
#![warn(missing_docs)]

extern crate futures;
extern crate num_traits;
extern crate thiserror;
extern crate tokio_core;
extern crate tokio_io;

#[macro_use] extern crate log;

#[cfg(test)] extern crate tk_easyloop;
#[cfg(test)] #[macro_use] extern crate proptest;

mod config;
mod element;
mod error;
mod pool;
mod proto;
mod public;

pub use config::Validated;
pub use element::MetricRecord;
pub use error::{ConfigError, SendError};
pub use pool::{Dial, Pool, PoolWrite, TcpDialer};
pub use proto::{Encoder, EncodedPayload, PathFormat, Tagged, Dotted, TagStyle};
pub use public::{Sender, SendFuture, SendReport, Export};


/// Configuration of the carbon sender
///
/// Built with `Config::new()` and the setters, the endpoint and the timeout
/// are checked when a `Sender` is created.
#[derive(Debug, Clone)]
pub struct Config {
    endpoint: String,
    timeout_ms: i64,
    tag_style: TagStyle,
}
