use std::time::Duration;

use super::CollRef;
use crate::{
    bson::Bson,
    error::Result,
    operation::DropIndexes as Op,
    options::{DropIndexOptions, WriteConcern},
    ClientSession,
    Collection,
};

impl<T: Send + Sync> Collection<T> {
    /// Drops the index specified by `name` from this collection. The `*` wildcard is rejected.
    ///
    /// `await` will return [`Result<()>`].
    pub fn drop_index(&self, name: impl AsRef<str>) -> DropIndex<'_> {
        DropIndex {
            coll: CollRef::new(self),
            name: name.as_ref().to_string(),
            options: None,
            session: None,
        }
    }
}

/// Drops a specific index from the collection. Construct with [`Collection::drop_index`].
#[derive(Clone, Debug)]
#[must_use]
pub struct DropIndex<'a> {
    coll: CollRef<'a>,
    name: String,
    options: Option<DropIndexOptions>,
    session: Option<&'a ClientSession>,
}

impl<'a> DropIndex<'a> {
    option_setters! { options: DropIndexOptions;
        max_time: Duration,
        write_concern: WriteConcern,
        comment: Bson,
        timeout: Duration,
    }

    /// Use the provided session when running the operation.
    pub fn session(mut self, value: &'a ClientSession) -> Self {
        self.session = Some(value);
        self
    }

    async fn execute(mut self) -> Result<()> {
        resolve_options!(self.coll, self.options, [write_concern]);

        let op = Op::new(self.coll.namespace(), self.name, self.options)?;
        self.coll.client().execute_operation(op, self.session).await
    }
}

action_impl!(DropIndex<'a> => ());
