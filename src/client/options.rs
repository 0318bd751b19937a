
use std::{
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
    time::Duration,
};

use serde::{de::Error as SerdeError, Deserialize, Deserializer};
use typed_builder::TypedBuilder;

use crate::{
    concern::WriteConcern,
    error::{Error, Result},
    selection_criteria::SelectionCriteria,
};

pub(crate) const DEFAULT_PORT: u16 = 27017;
pub(crate) const DEFAULT_LOCAL_THRESHOLD: Duration = Duration::from_millis(15);
pub(crate) const DEFAULT_SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const DEFAULT_MAX_POOL_SIZE: u32 = 100;
pub(crate) const DEFAULT_MAX_MESSAGE_SIZE_BYTES: i32 = 48 * 1024 * 1024;

/// A hostname:port address pair identifying one server of a deployment.
#[derive(Clone, Debug, Eq)]
#[non_exhaustive]
pub struct ServerAddress {
    /// The hostname of the address.
    pub host: String,

    /// The port of the address. The default is 27017.
    pub port: Option<u16>,
}

impl ServerAddress {
    /// Creates an address from a host and port.
    pub fn new(host: impl Into<String>, port: impl Into<Option<u16>>) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
        }
    }

    /// Parses an address string of the form `host[:port]`.
    pub fn parse(address: impl AsRef<str>) -> Result<Self> {
        let address = address.as_ref();
        let invalid = || Error::invalid_argument(format!("invalid server address: {address:?}"));

        let mut parts = address.split(':');
        let host = match parts.next() {
            Some(host) if !host.is_empty() => host,
            _ => return Err(invalid()),
        };
        let port = match parts.next() {
            Some(port) => {
                let port = u16::from_str(port).map_err(|_| invalid())?;
                if port == 0 || parts.next().is_some() {
                    return Err(invalid());
                }
                Some(port)
            }
            None => None,
        };

        Ok(Self::new(host.to_lowercase(), port))
    }

    pub(crate) fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }
}

impl PartialEq for ServerAddress {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port_or_default() == other.port_or_default()
    }
}

impl Hash for ServerAddress {
    fn hash<H>(&self, state: &mut H)
    where
        H: Hasher,
    {
        self.host.hash(state);
        self.port_or_default().hash(state);
    }
}

impl<'de> Deserialize<'de> for ServerAddress {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(|e| D::Error::custom(e.to_string()))
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}:{}", self.host, self.port_or_default())
    }
}

/// Contains the options that can be used to create a new [`Client`](crate::Client).
#[derive(Clone, Debug, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct ClientOptions {
    /// A name attached to log events emitted by this client.
    pub app_name: Option<String>,

    /// The latency window: a server is eligible if its average round trip time is no more than
    /// this much above the fastest suitable server's.
    ///
    /// The default value is 15 ms.
    pub local_threshold: Option<Duration>,

    /// How long server selection waits for a suitable server before failing.
    ///
    /// The default value is 30 seconds.
    pub server_selection_timeout: Option<Duration>,

    /// The maximum number of connections open to any one server at once.
    ///
    /// The default value is 100. Zero is rejected.
    pub max_pool_size: Option<u32>,

    /// Connections idle for longer than this are closed instead of reused.
    pub max_idle_time: Option<Duration>,

    /// How long a checkout waits for a connection to become available before failing.
    ///
    /// By default, checkout is bounded only by the operation deadline.
    pub wait_queue_timeout: Option<Duration>,

    /// Bound on establishing each new connection.
    ///
    /// The default value is 10 seconds.
    pub connect_timeout: Option<Duration>,

    /// Overall deadline applied to each operation, covering selection, checkout and I/O.
    pub timeout: Option<Duration>,

    /// Whether retryable reads are retried once after a network error. Defaults to true.
    pub retry_reads: Option<bool>,

    /// Whether retryable writes are retried once after a network error. Defaults to true.
    pub retry_writes: Option<bool>,

    /// The default write concern for operations of this client.
    pub write_concern: Option<WriteConcern>,

    /// The default selection criteria for reads of this client. Defaults to primary.
    pub selection_criteria: Option<SelectionCriteria>,

    /// The largest reply frame accepted from a server.
    ///
    /// The default value is 48 MB.
    pub max_message_size_bytes: Option<i32>,
}

impl ClientOptions {
    /// Checks that the options are internally consistent.
    pub fn validate(&self) -> Result<()> {
        if self.max_pool_size == Some(0) {
            return Err(Error::invalid_argument("max_pool_size must be greater than 0"));
        }
        if let Some(wc) = &self.write_concern {
            wc.validate()?;
        }
        if matches!(self.max_message_size_bytes, Some(size) if size <= 0) {
            return Err(Error::invalid_argument(
                "max_message_size_bytes must be positive",
            ));
        }
        if self.server_selection_timeout == Some(Duration::ZERO) {
            return Err(Error::invalid_argument(
                "server_selection_timeout must be greater than 0",
            ));
        }
        Ok(())
    }

    pub(crate) fn local_threshold(&self) -> Duration {
        self.local_threshold.unwrap_or(DEFAULT_LOCAL_THRESHOLD)
    }

    pub(crate) fn server_selection_timeout(&self) -> Duration {
        self.server_selection_timeout
            .unwrap_or(DEFAULT_SERVER_SELECTION_TIMEOUT)
    }

    pub(crate) fn retry_reads(&self) -> bool {
        self.retry_reads.unwrap_or(true)
    }

    pub(crate) fn retry_writes(&self) -> bool {
        self.retry_writes.unwrap_or(true)
    }
}

/// Options for a connection pool, derived from [`ClientOptions`].
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct ConnectionPoolOptions {
    pub(crate) max_pool_size: Option<u32>,
    pub(crate) max_idle_time: Option<Duration>,
    pub(crate) wait_queue_timeout: Option<Duration>,
    pub(crate) connect_timeout: Option<Duration>,
    pub(crate) max_message_size_bytes: Option<i32>,
}

impl ConnectionPoolOptions {
    pub(crate) fn from_client_options(options: &ClientOptions) -> Self {
        Self {
            max_pool_size: options.max_pool_size,
            max_idle_time: options.max_idle_time,
            wait_queue_timeout: options.wait_queue_timeout,
            connect_timeout: options.connect_timeout,
            max_message_size_bytes: options.max_message_size_bytes,
        }
    }
}
