use futures_util::{future::BoxFuture, FutureExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};

use crate::options::ServerAddress;

/// A bidirectional byte stream to a server.
pub trait AsyncReadWrite: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncReadWrite for T {}

/// A boxed transport stream, as produced by a [`Connector`].
pub type AsyncStream = Box<dyn AsyncReadWrite>;

/// Opens transport streams to servers. The pool calls this whenever it needs a new connection
/// and bounds the call with the connect timeout and the operation deadline.
pub trait Connector: Send + Sync + std::fmt::Debug + 'static {
    /// Opens a new stream to `address`.
    fn connect<'a>(&'a self, address: &'a ServerAddress)
        -> BoxFuture<'a, std::io::Result<AsyncStream>>;
}

/// Plain TCP with `TCP_NODELAY` set.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect<'a>(
        &'a self,
        address: &'a ServerAddress,
    ) -> BoxFuture<'a, std::io::Result<AsyncStream>> {
        async move {
            let stream =
                TcpStream::connect((address.host.as_str(), address.port_or_default())).await?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream) as AsyncStream)
        }
        .boxed()
    }
}
