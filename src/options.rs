//! Contains all of the types needed to specify options to operations.
//!
//! Most of the options structs in this module use the
//! [`typed-builder`](https://crates.io/crates/typed-builder) crate to derive a type-safe builder
//! API on them. For example, to create an instance of
//! [`FindOptions`](struct.FindOptions.html) with only `limit` and `batch_size` set, the builder
//! API can be used as follows:
//!
//! ```rust
//! # use mongo_exec::options::FindOptions;
//! #
//! # let options = FindOptions::builder()
//! #                   .limit(20)
//! #                   .batch_size(5)
//! #                   .build();
//! ```

pub use crate::{
    client::{options::*, session::SessionOptions},
    coll::options::*,
    concern::*,
    selection_criteria::*,
};

pub(crate) use crate::client::options::{
    ConnectionPoolOptions,
    DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_LOCAL_THRESHOLD,
    DEFAULT_MAX_MESSAGE_SIZE_BYTES,
    DEFAULT_MAX_POOL_SIZE,
    DEFAULT_PORT,
    DEFAULT_SERVER_SELECTION_TIMEOUT,
};

/// Updates an options struct with the selection criteria or write concern of a
/// database/collection, unless the options already set it.
macro_rules! resolve_options {
    ($obj:expr, $opts:expr, [$( $field:ident ),+] ) => {
        $(
            if let Some(option) = $obj.$field() {
                if !$opts
                    .as_ref()
                    .map(|opts| opts.$field.is_some())
                    .unwrap_or(false)
                {
                    $opts.get_or_insert_with(Default::default).$field = Some(option.clone());
                }
            }
        )+
    };
}
