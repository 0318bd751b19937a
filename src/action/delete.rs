use std::time::Duration;

use super::CollRef;
use crate::{
    bson::{Bson, Document},
    error::Result,
    operation::Delete as Op,
    options::{DeleteOptions, Hint, WriteConcern},
    results::WriteResult,
    ClientSession,
    Collection,
};

impl<T: Send + Sync> Collection<T> {
    /// Deletes up to one document found matching `query`.
    ///
    /// This operation will retry once upon failure if the connection and encountered error support
    /// retryability.
    ///
    /// `await` will return [`Result<WriteResult>`].
    pub fn delete_one(&self, query: Document) -> Delete<'_> {
        Delete {
            coll: CollRef::new(self),
            query,
            options: None,
            session: None,
            limit: Some(1),
        }
    }

    /// Deletes all documents stored in the collection matching `query`. This operation is never
    /// retried.
    ///
    /// `await` will return [`Result<WriteResult>`].
    pub fn delete_many(&self, query: Document) -> Delete<'_> {
        Delete {
            coll: CollRef::new(self),
            query,
            options: None,
            session: None,
            limit: None,
        }
    }
}

/// Deletes documents matching a query. Construct with [`Collection::delete_one`] or
/// [`Collection::delete_many`].
#[derive(Clone, Debug)]
#[must_use]
pub struct Delete<'a> {
    coll: CollRef<'a>,
    query: Document,
    options: Option<DeleteOptions>,
    session: Option<&'a ClientSession>,
    limit: Option<u32>,
}

impl<'a> Delete<'a> {
    option_setters! { options: DeleteOptions;
        write_concern: WriteConcern,
        hint: Hint,
        comment: Bson,
        timeout: Duration,
    }

    /// Use the provided session when running the operation.
    pub fn session(mut self, value: &'a ClientSession) -> Self {
        self.session = Some(value);
        self
    }

    async fn execute(mut self) -> Result<WriteResult> {
        resolve_options!(self.coll, self.options, [write_concern]);

        let op = Op::new(self.coll.namespace(), self.query, self.limit, self.options);
        self.coll.client().execute_operation(op, self.session).await
    }
}

action_impl!(Delete<'a> => WriteResult);
