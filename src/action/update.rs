use std::time::Duration;

use super::CollRef;
use crate::{
    bson::{Bson, Document},
    error::Result,
    operation::{Update as Op, UpdateOrReplace},
    options::{Hint, UpdateModifications, UpdateOptions, WriteConcern},
    results::WriteResult,
    ClientSession,
    Collection,
};

impl<T: Send + Sync> Collection<T> {
    /// Updates all documents matching `query` in the collection.
    ///
    /// Both `Document` and `Vec<Document>` implement `Into<UpdateModifications>`, so either can be
    /// passed in place of constructing the enum case. An update document must consist of update
    /// operators (keys starting with `$`).
    ///
    /// This operation is never retried.
    ///
    /// `await` will return [`Result<WriteResult>`].
    pub fn update_many(
        &self,
        query: Document,
        update: impl Into<UpdateModifications>,
    ) -> Update<'_> {
        Update {
            coll: CollRef::new(self),
            query,
            update: update.into(),
            multi: true,
            options: None,
            session: None,
        }
    }

    /// Updates up to one document matching `query` in the collection.
    ///
    /// Both `Document` and `Vec<Document>` implement `Into<UpdateModifications>`, so either can be
    /// passed in place of constructing the enum case.
    ///
    /// This operation will retry once upon failure if the connection and encountered error support
    /// retryability.
    ///
    /// `await` will return [`Result<WriteResult>`].
    pub fn update_one(
        &self,
        query: Document,
        update: impl Into<UpdateModifications>,
    ) -> Update<'_> {
        Update {
            coll: CollRef::new(self),
            query,
            update: update.into(),
            multi: false,
            options: None,
            session: None,
        }
    }
}

/// Update documents matching a query. Construct with [`Collection::update_one`] or
/// [`Collection::update_many`].
#[derive(Clone, Debug)]
#[must_use]
pub struct Update<'a> {
    coll: CollRef<'a>,
    query: Document,
    update: UpdateModifications,
    multi: bool,
    options: Option<UpdateOptions>,
    session: Option<&'a ClientSession>,
}

impl<'a> Update<'a> {
    option_setters! { options: UpdateOptions;
        array_filters: Vec<Document>,
        bypass_document_validation: bool,
        upsert: bool,
        hint: Hint,
        write_concern: WriteConcern,
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

        let op = Op::new(
            self.coll.namespace(),
            self.query,
            UpdateOrReplace::UpdateModifications(self.update),
            self.multi,
            self.options,
        )?;
        self.coll.client().execute_operation(op, self.session).await
    }
}

action_impl!(Update<'a> => WriteResult);
