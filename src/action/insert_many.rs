use std::borrow::Borrow;

use serde::Serialize;

use super::{to_document, CollRef};
use crate::{
    bson::{Bson, Document},
    error::Result,
    operation::Insert as Op,
    options::{InsertManyOptions, WriteConcern},
    results::WriteResult,
    ClientSession,
    Collection,
};

impl<T: Serialize + Send + Sync> Collection<T> {
    /// Inserts the data in `docs` into the collection.
    ///
    /// Note that this method accepts both owned and borrowed values, so the input documents
    /// do not need to be cloned in order to be passed in. Inserts are ordered unless
    /// [`InsertMany::ordered`] is set to `false`; an empty `docs` fails before anything is sent.
    ///
    /// When some documents fail to insert, the error is an
    /// [`ErrorKind::BulkWrite`](crate::error::ErrorKind::BulkWrite) that lists the failed indexes
    /// and carries the counts of the documents that were inserted.
    ///
    /// This operation will retry once upon failure if the connection and encountered error support
    /// retryability.
    ///
    /// `await` will return [`Result<WriteResult>`].
    pub fn insert_many(&self, docs: impl IntoIterator<Item = impl Borrow<T>>) -> InsertMany<'_> {
        InsertMany {
            coll: CollRef::new(self),
            docs: docs
                .into_iter()
                .map(|d| to_document(d.borrow()))
                .collect(),
            options: None,
            session: None,
        }
    }
}

/// Inserts documents into a collection. Construct with [`Collection::insert_many`].
#[derive(Clone, Debug)]
#[must_use]
pub struct InsertMany<'a> {
    coll: CollRef<'a>,
    docs: Result<Vec<Document>>,
    options: Option<InsertManyOptions>,
    session: Option<&'a ClientSession>,
}

impl<'a> InsertMany<'a> {
    option_setters! { options: InsertManyOptions;
        bypass_document_validation: bool,
        ordered: bool,
        write_concern: WriteConcern,
        comment: Bson,
        timeout: std::time::Duration,
    }

    /// Use the provided session when running the operation.
    pub fn session(mut self, value: &'a ClientSession) -> Self {
        self.session = Some(value);
        self
    }

    async fn execute(mut self) -> Result<WriteResult> {
        resolve_options!(self.coll, self.options, [write_concern]);

        let insert = Op::new(self.coll.namespace(), self.docs?, self.options)?;
        self.coll
            .client()
            .execute_operation(insert, self.session)
            .await
    }
}

action_impl!(InsertMany<'a> => WriteResult);
