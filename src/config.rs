use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;
use crate::proto::TagStyle;
use crate::Config;


/// Configuration checked by `Config::validate`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validated {
    /// Every address the endpoint resolves to, tried in order when dialing
    pub addresses: Vec<SocketAddr>,
    /// Budget of a single send, counted from its start
    pub timeout: Duration,
}

pub fn to_ms(dur: Duration) -> i64 {
    let ms = dur.as_secs()
        .saturating_mul(1000)
        .saturating_add((dur.subsec_nanos() / 1_000_000) as u64);
    if ms > i64::max_value() as u64 {
        i64::max_value()
    } else {
        ms as i64
    }
}

pub fn from_ms(ms: i64) -> Option<Duration> {
    if ms < 0 {
        return None;
    }
    let ms = ms as u64;
    Some(Duration::new(ms / 1000, (ms % 1000) as u32 * 1_000_000))
}


impl Config {
    /// Create the config builder with all defaults
    ///
    /// Sends go to `localhost:2003` with a 5 second timeout and tags
    /// rendered as graphite tagged series.
    pub fn new() -> Config {
        Config {
            endpoint: "localhost:2003".to_string(),
            timeout_ms: 5000,
            tag_style: TagStyle::Tagged,
        }
    }

    /// Set the `host:port` of the carbon backend
    ///
    /// Host name is resolved once, when the sender is created. If it
    /// resolves to several addresses, new connections try them in order.
    pub fn endpoint(&mut self, endpoint: &str) -> &mut Self {
        self.endpoint = endpoint.to_string();
        self
    }

    /// Timeout of a single send
    ///
    /// This bounds dialing a new connection and is the total budget for
    /// acquiring a connection and writing the payload, counted from the
    /// start of the send. With zero every send fails with a timeout unless
    /// it completes within the very first poll.
    pub fn timeout(&mut self, dur: Duration) -> &mut Self {
        self.timeout_ms = to_ms(dur);
        self
    }

    /// Same as `timeout` but in (signed) milliseconds
    ///
    /// This is useful when the value comes from a user-supplied setting.
    /// Negative values are rejected by `validate`.
    pub fn timeout_ms(&mut self, ms: i64) -> &mut Self {
        self.timeout_ms = ms;
        self
    }

    /// How tags are rendered into the metric path
    pub fn tag_style(&mut self, style: TagStyle) -> &mut Self {
        self.tag_style = style;
        self
    }

    /// Create a Arc'd config clone to pass to the constructor
    ///
    /// This is just a convenience method.
    pub fn done(&mut self) -> Arc<Config> {
        Arc::new(self.clone())
    }

    /// Check the timeout and resolve the endpoint
    ///
    /// It's better to fail here than on every send.
    pub fn validate(&self) -> Result<Validated, ConfigError> {
        let timeout = match from_ms(self.timeout_ms) {
            Some(dur) => dur,
            None => {
                return Err(ConfigError::NegativeTimeout(self.timeout_ms));
            }
        };
        Ok(Validated {
            addresses: self.resolve()?,
            timeout: timeout,
        })
    }

    fn resolve(&self) -> Result<Vec<SocketAddr>, ConfigError> {
        let invalid = |e: io::Error| ConfigError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            source: e,
        };
        if self.endpoint.is_empty() {
            return Err(invalid(io::Error::new(io::ErrorKind::InvalidInput,
                "endpoint is empty")));
        }
        let addrs = self.endpoint.as_str().to_socket_addrs()
            .map_err(invalid)?
            .collect::<Vec<_>>();
        if addrs.is_empty() {
            return Err(ConfigError::NoAddress(self.endpoint.clone()));
        }
        Ok(addrs)
    }
}

impl Default for Config {
    fn default() -> Config {
        Config::new()
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::error::ConfigError;
    use crate::proto::TagStyle;
    use super::{to_ms, from_ms};
    use crate::Config;

    #[test]
    fn ms_conversion() {
        assert_eq!(to_ms(Duration::from_millis(1500)), 1500);
        assert_eq!(to_ms(Duration::new(u64::max_value(), 0)),
            i64::max_value());
        assert_eq!(from_ms(2250), Some(Duration::from_millis(2250)));
        assert_eq!(from_ms(0), Some(Duration::new(0, 0)));
        assert_eq!(from_ms(-1), None);
    }

    #[test]
    fn defaults() {
        let cfg = Config::new();
        assert_eq!(cfg.endpoint, "localhost:2003");
        assert_eq!(cfg.timeout_ms, 5000);
        assert_eq!(cfg.tag_style, TagStyle::Tagged);
    }

    #[test]
    fn valid() {
        let v = Config::new()
            .endpoint("127.0.0.1:2003")
            .timeout(Duration::from_secs(1))
            .validate().unwrap();
        assert_eq!(v.addresses, vec!["127.0.0.1:2003".parse().unwrap()]);
        assert_eq!(v.timeout, Duration::from_secs(1));

        let v = Config::new().endpoint("[::1]:2004").validate().unwrap();
        assert_eq!(v.addresses, vec!["[::1]:2004".parse().unwrap()]);
    }

    #[test]
    fn zero_timeout_is_kept() {
        let v = Config::new()
            .endpoint("127.0.0.1:2003")
            .timeout_ms(0)
            .validate().unwrap();
        assert_eq!(v.timeout, Duration::new(0, 0));
    }

    #[test]
    fn negative_timeout() {
        match Config::new().endpoint("127.0.0.1:2003").timeout_ms(-1000)
            .validate()
        {
            Err(ConfigError::NegativeTimeout(-1000)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn invalid_endpoints() {
        for endpoint in &["", "127.0.0.1", "127.0.0.1:99999",
                          "127.0.0.1:port", ":::"]
        {
            match Config::new().endpoint(endpoint).validate() {
                Err(ConfigError::InvalidEndpoint { .. }) => {}
                other => panic!("{:?} gives {:?}", endpoint, other),
            }
        }
    }
}
