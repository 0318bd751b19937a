use std::{borrow::Borrow, marker::PhantomData, time::Duration};

use derive_where::derive_where;
use serde::{de::DeserializeOwned, Serialize};

use super::{to_document, CollRef};
use crate::{
    bson::{self, Bson, Document},
    error::Result,
    operation::{
        FindAndModify as Op,
        FindAndModifyOptions,
        Modification,
        UpdateOrReplace,
    },
    options::{
        FindOneAndDeleteOptions,
        FindOneAndReplaceOptions,
        FindOneAndUpdateOptions,
        Hint,
        ReturnDocument,
        UpdateModifications,
        WriteConcern,
    },
    ClientSession,
    Collection,
};

impl<T: DeserializeOwned + Send + Sync> Collection<T> {
    /// Atomically finds up to one document in the collection matching `filter` and deletes it.
    ///
    /// This operation will retry once upon failure if the connection and encountered error support
    /// retryability.
    ///
    /// `await` will return [`Result<Option<T>>`].
    pub fn find_one_and_delete(&self, filter: Document) -> FindOneAndDelete<'_, T> {
        FindOneAndDelete {
            coll: CollRef::new(self),
            filter,
            options: None,
            session: None,
            _phantom: PhantomData,
        }
    }

    /// Atomically finds up to one document in the collection matching `filter` and updates it.
    /// Both `Document` and `Vec<Document>` implement `Into<UpdateModifications>`, so either can be
    /// passed in place of constructing the enum case.
    ///
    /// This operation will retry once upon failure if the connection and encountered error support
    /// retryability.
    ///
    /// `await` will return [`Result<Option<T>>`].
    pub fn find_one_and_update(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> FindOneAndUpdate<'_, T> {
        FindOneAndUpdate {
            coll: CollRef::new(self),
            filter,
            update: update.into(),
            options: None,
            session: None,
            _phantom: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned + Send + Sync> Collection<T> {
    /// Atomically finds up to one document in the collection matching `filter` and replaces it
    /// with `replacement`.
    ///
    /// This operation will retry once upon failure if the connection and encountered error support
    /// retryability.
    ///
    /// `await` will return [`Result<Option<T>>`].
    pub fn find_one_and_replace(
        &self,
        filter: Document,
        replacement: impl Borrow<T>,
    ) -> FindOneAndReplace<'_, T> {
        FindOneAndReplace {
            coll: CollRef::new(self),
            filter,
            replacement: to_document(replacement.borrow()),
            options: None,
            session: None,
            _phantom: PhantomData,
        }
    }
}

/// Runs `findAndModify` and deserializes the document it returns.
async fn find_and_modify<T: DeserializeOwned>(
    coll: CollRef<'_>,
    filter: Document,
    modification: Modification,
    options: Option<FindAndModifyOptions>,
    session: Option<&ClientSession>,
) -> Result<Option<T>> {
    let op = Op::new(coll.namespace(), filter, modification, options)?;
    match coll.client().execute_operation(op, session).await? {
        Some(document) => Ok(Some(bson::from_document(document)?)),
        None => Ok(None),
    }
}

/// Atomically finds up to one document in the collection matching a filter and deletes it.
/// Construct with [`Collection::find_one_and_delete`].
#[derive_where(Clone, Debug)]
#[must_use]
pub struct FindOneAndDelete<'a, T: Send + Sync> {
    coll: CollRef<'a>,
    filter: Document,
    options: Option<FindOneAndDeleteOptions>,
    session: Option<&'a ClientSession>,
    _phantom: PhantomData<fn() -> T>,
}

impl<'a, T: Send + Sync> FindOneAndDelete<'a, T> {
    option_setters! { options: FindOneAndDeleteOptions;
        max_time: Duration,
        projection: Document,
        sort: Document,
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
}

impl<T: DeserializeOwned + Send + Sync> FindOneAndDelete<'_, T> {
    async fn execute(mut self) -> Result<Option<T>> {
        resolve_options!(self.coll, self.options, [write_concern]);

        find_and_modify(
            self.coll,
            self.filter,
            Modification::Delete,
            self.options.map(FindAndModifyOptions::from),
            self.session,
        )
        .await
    }
}

action_impl!(FindOneAndDelete<'a, T: { DeserializeOwned + Send + Sync + 'a }> => Option<T>);

/// Atomically finds up to one document in the collection matching a filter and updates it.
/// Construct with [`Collection::find_one_and_update`].
#[derive_where(Clone, Debug)]
#[must_use]
pub struct FindOneAndUpdate<'a, T: Send + Sync> {
    coll: CollRef<'a>,
    filter: Document,
    update: UpdateModifications,
    options: Option<FindOneAndUpdateOptions>,
    session: Option<&'a ClientSession>,
    _phantom: PhantomData<fn() -> T>,
}

impl<'a, T: Send + Sync> FindOneAndUpdate<'a, T> {
    option_setters! { options: FindOneAndUpdateOptions;
        array_filters: Vec<Document>,
        bypass_document_validation: bool,
        max_time: Duration,
        projection: Document,
        return_document: ReturnDocument,
        sort: Document,
        upsert: bool,
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
}

impl<T: DeserializeOwned + Send + Sync> FindOneAndUpdate<'_, T> {
    async fn execute(mut self) -> Result<Option<T>> {
        resolve_options!(self.coll, self.options, [write_concern]);

        find_and_modify(
            self.coll,
            self.filter,
            Modification::Update(UpdateOrReplace::UpdateModifications(self.update)),
            self.options.map(FindAndModifyOptions::from),
            self.session,
        )
        .await
    }
}

action_impl!(FindOneAndUpdate<'a, T: { DeserializeOwned + Send + Sync + 'a }> => Option<T>);

/// Atomically finds up to one document in the collection matching a filter and replaces it.
/// Construct with [`Collection::find_one_and_replace`].
#[derive_where(Clone, Debug)]
#[must_use]
pub struct FindOneAndReplace<'a, T: Send + Sync> {
    coll: CollRef<'a>,
    filter: Document,
    replacement: Result<Document>,
    options: Option<FindOneAndReplaceOptions>,
    session: Option<&'a ClientSession>,
    _phantom: PhantomData<fn() -> T>,
}

impl<'a, T: Send + Sync> FindOneAndReplace<'a, T> {
    option_setters! { options: FindOneAndReplaceOptions;
        bypass_document_validation: bool,
        max_time: Duration,
        projection: Document,
        return_document: ReturnDocument,
        sort: Document,
        upsert: bool,
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
}

impl<T: DeserializeOwned + Send + Sync> FindOneAndReplace<'_, T> {
    async fn execute(mut self) -> Result<Option<T>> {
        resolve_options!(self.coll, self.options, [write_concern]);

        find_and_modify(
            self.coll,
            self.filter,
            Modification::Update(UpdateOrReplace::Replacement(self.replacement?)),
            self.options.map(FindAndModifyOptions::from),
            self.session,
        )
        .await
    }
}

action_impl!(FindOneAndReplace<'a, T: { DeserializeOwned + Send + Sync + 'a }> => Option<T>);
