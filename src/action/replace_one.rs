use std::{borrow::Borrow, time::Duration};

use serde::Serialize;

use super::{to_document, CollRef};
use crate::{
    bson::{Bson, Document},
    error::Result,
    operation::{Update as Op, UpdateOrReplace},
    options::{Hint, ReplaceOptions, UpdateOptions, WriteConcern},
    results::WriteResult,
    ClientSession,
    Collection,
};

impl<T: Serialize + Send + Sync> Collection<T> {
    /// Replaces up to one document matching `query` in the collection with `replacement`. The
    /// replacement must not contain update operators.
    ///
    /// This operation will retry once upon failure if the connection and encountered error support
    /// retryability.
    ///
    /// `await` will return [`Result<WriteResult>`].
    pub fn replace_one(&self, query: Document, replacement: impl Borrow<T>) -> ReplaceOne<'_> {
        ReplaceOne {
            coll: CollRef::new(self),
            query,
            replacement: to_document(replacement.borrow()),
            options: None,
            session: None,
        }
    }
}

/// Replace up to one document matching a query. Construct with [`Collection::replace_one`].
#[derive(Clone, Debug)]
#[must_use]
pub struct ReplaceOne<'a> {
    coll: CollRef<'a>,
    query: Document,
    replacement: Result<Document>,
    options: Option<ReplaceOptions>,
    session: Option<&'a ClientSession>,
}

impl<'a> ReplaceOne<'a> {
    option_setters! { options: ReplaceOptions;
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

        let update = Op::new(
            self.coll.namespace(),
            self.query,
            UpdateOrReplace::Replacement(self.replacement?),
            false,
            self.options.map(UpdateOptions::from_replace_options),
        )?;
        self.coll
            .client()
            .execute_operation(update, self.session)
            .await
    }
}

action_impl!(ReplaceOne<'a> => WriteResult);
