use crate::{
    cmap::conn::wire::WireShape,
    options::{ServerAddress, DEFAULT_MAX_MESSAGE_SIZE_BYTES},
    sdam::{ServerDescription, ServerType},
};

/// What an operation may assume about the server on the other end of a connection. Refreshed from
/// the selected server's description at each checkout.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StreamDescription {
    /// The address of the server.
    pub(crate) server_address: ServerAddress,

    /// The type of the server when the connection was checked out.
    pub(crate) server_type: ServerType,

    /// The maximum wire version that the server understands.
    pub(crate) max_wire_version: Option<i32>,

    /// The largest reply frame accepted from the server.
    pub(crate) max_message_size_bytes: i32,
}

impl StreamDescription {
    pub(crate) fn from_server(server: &ServerDescription, max_message_size_bytes: i32) -> Self {
        Self {
            server_address: server.address.clone(),
            server_type: server.server_type,
            max_wire_version: server.max_wire_version,
            max_message_size_bytes,
        }
    }

    pub(crate) fn wire_shape(&self) -> WireShape {
        WireShape::for_max_wire_version(self.max_wire_version)
    }

    pub(crate) fn supports_sessions(&self) -> bool {
        self.server_type.is_data_bearing() && self.wire_shape() == WireShape::GenericCommand
    }

    pub(crate) fn supports_retryable_writes(&self) -> bool {
        self.server_type != ServerType::Standalone && self.supports_sessions()
    }

    /// Gets a description of a stream for a 4.2 replica set primary, for use in tests.
    #[cfg(test)]
    pub(crate) fn new_testing() -> Self {
        Self::with_wire_version(8)
    }

    /// Gets a description of a replica set primary with the given max wire version.
    #[cfg(test)]
    pub(crate) fn with_wire_version(max_wire_version: i32) -> Self {
        Self {
            server_address: ServerAddress::new("localhost", None),
            server_type: ServerType::RsPrimary,
            max_wire_version: Some(max_wire_version),
            max_message_size_bytes: DEFAULT_MAX_MESSAGE_SIZE_BYTES,
        }
    }
}
