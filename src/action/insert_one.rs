use std::borrow::Borrow;

use serde::Serialize;

use super::{to_document, CollRef};
use crate::{
    bson::{Bson, Document},
    error::Result,
    operation::Insert as Op,
    options::{InsertManyOptions, InsertOneOptions, WriteConcern},
    results::WriteResult,
    ClientSession,
    Collection,
};

impl<T: Serialize + Send + Sync> Collection<T> {
    /// Inserts `doc` into the collection.
    ///
    /// Note that either an owned or borrowed value can be inserted here, so the input document
    /// does not need to be cloned to be passed in. A document without an `_id` gets a generated
    /// one, reported through [`WriteResult::inserted_id`].
    ///
    /// This operation will retry once upon failure if the connection and encountered error support
    /// retryability.
    ///
    /// `await` will return [`Result<WriteResult>`].
    pub fn insert_one(&self, doc: impl Borrow<T>) -> InsertOne<'_> {
        InsertOne {
            coll: CollRef::new(self),
            doc: to_document(doc.borrow()),
            options: None,
            session: None,
        }
    }
}

/// Inserts a document into a collection. Construct with [`Collection::insert_one`].
#[derive(Clone, Debug)]
#[must_use]
pub struct InsertOne<'a> {
    coll: CollRef<'a>,
    doc: Result<Document>,
    options: Option<InsertOneOptions>,
    session: Option<&'a ClientSession>,
}

impl<'a> InsertOne<'a> {
    option_setters! { options: InsertOneOptions;
        bypass_document_validation: bool,
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

        let insert = Op::new(
            self.coll.namespace(),
            vec![self.doc?],
            self.options.map(InsertManyOptions::from_insert_one_options),
        )?;
        self.coll
            .client()
            .execute_operation(insert, self.session)
            .await
    }
}

action_impl!(InsertOne<'a> => WriteResult);
