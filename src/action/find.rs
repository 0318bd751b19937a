use std::{marker::PhantomData, time::Duration};

use derive_where::derive_where;
use serde::de::DeserializeOwned;

use super::CollRef;
use crate::{
    bson::{Bson, Document},
    error::Result,
    operation::Find as Op,
    options::{CursorType, FindOneOptions, FindOptions, Hint, SelectionCriteria},
    ClientSession,
    Collection,
    Cursor,
};

impl<T: Send + Sync> Collection<T> {
    /// Finds the documents in the collection matching `filter`.
    ///
    /// The initial query is retried once upon a network or checkout failure if retryable reads
    /// are enabled; the `getMore`s issued by the returned cursor are not.
    ///
    /// `await` will return [`Result<Cursor<T>>`].
    pub fn find(&self, filter: Document) -> Find<'_, T> {
        Find {
            coll: CollRef::new(self),
            filter,
            options: None,
            session: None,
            _phantom: PhantomData,
        }
    }

    /// Finds a single document in the collection matching `filter`.
    ///
    /// `await` will return [`Result<Option<T>>`].
    pub fn find_one(&self, filter: Document) -> FindOne<'_, T> {
        FindOne {
            coll: CollRef::new(self),
            filter,
            options: None,
            session: None,
            _phantom: PhantomData,
        }
    }
}

/// Finds the documents in a collection matching a filter. Construct with [`Collection::find`].
#[derive_where(Clone, Debug)]
#[must_use]
pub struct Find<'a, T: Send + Sync> {
    coll: CollRef<'a>,
    filter: Document,
    options: Option<FindOptions>,
    session: Option<&'a ClientSession>,
    _phantom: PhantomData<fn() -> T>,
}

impl<'a, T: Send + Sync> Find<'a, T> {
    option_setters! { options: FindOptions;
        allow_partial_results: bool,
        batch_size: u32,
        comment: Bson,
        cursor_type: CursorType,
        hint: Hint,
        limit: i64,
        max_await_time: Duration,
        max_time: Duration,
        no_cursor_timeout: bool,
        projection: Document,
        return_key: bool,
        selection_criteria: SelectionCriteria,
        show_record_id: bool,
        skip: i64,
        sort: Document,
        timeout: Duration,
    }

    /// Use the provided session when running the operation. The returned cursor keeps using it
    /// for its `getMore`s.
    pub fn session(mut self, value: &'a ClientSession) -> Self {
        self.session = Some(value);
        self
    }

    async fn execute(mut self) -> Result<Cursor<T>> {
        resolve_options!(self.coll, self.options, [selection_criteria]);

        let find = Op::new(self.coll.namespace(), self.filter, self.options)?;
        self.coll
            .client()
            .execute_cursor_operation(find, self.session)
            .await
    }
}

action_impl!(Find<'a, T: { Send + Sync + 'a }> => Cursor<T>);

/// Finds a single document in a collection matching a filter. Construct with
/// [`Collection::find_one`].
#[derive_where(Clone, Debug)]
#[must_use]
pub struct FindOne<'a, T: Send + Sync> {
    coll: CollRef<'a>,
    filter: Document,
    options: Option<FindOneOptions>,
    session: Option<&'a ClientSession>,
    _phantom: PhantomData<fn() -> T>,
}

impl<'a, T: Send + Sync> FindOne<'a, T> {
    option_setters! { options: FindOneOptions;
        allow_partial_results: bool,
        comment: Bson,
        hint: Hint,
        max_time: Duration,
        projection: Document,
        selection_criteria: SelectionCriteria,
        skip: i64,
        sort: Document,
        timeout: Duration,
    }

    /// Use the provided session when running the operation.
    pub fn session(mut self, value: &'a ClientSession) -> Self {
        self.session = Some(value);
        self
    }
}

impl<T: DeserializeOwned + Send + Sync> FindOne<'_, T> {
    async fn execute(mut self) -> Result<Option<T>> {
        resolve_options!(self.coll, self.options, [selection_criteria]);

        let options: FindOptions = self.options.unwrap_or_default().into();
        let find = Op::new(self.coll.namespace(), self.filter, Some(options))?;
        let mut cursor: Cursor<T> = self
            .coll
            .client()
            .execute_cursor_operation(find, self.session)
            .await?;
        cursor.try_next().await
    }
}

action_impl!(FindOne<'a, T: { DeserializeOwned + Send + Sync + 'a }> => Option<T>);
