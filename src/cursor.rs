#[cfg(test)]
mod test;

use std::{collections::VecDeque, marker::PhantomData, time::Duration};

use futures_core::Stream;
use serde::de::DeserializeOwned;

use crate::{
    bson::{Bson, Document},
    error::{Error, Result},
    operation::{GetMore, KillCursors},
    options::{CursorType, ServerAddress},
    trace::COMMAND_TRACING_EVENT_TARGET,
    Client,
    ClientSession,
    Namespace,
};

/// What a cursor needs to know to fetch more results from the server that opened it.
#[derive(Debug, Clone)]
pub(crate) struct CursorInformation {
    pub(crate) ns: Namespace,
    pub(crate) address: ServerAddress,
    pub(crate) id: i64,
    pub(crate) batch_size: Option<u32>,
    pub(crate) max_time: Option<Duration>,
    pub(crate) comment: Option<Bson>,
    pub(crate) cursor_type: CursorType,
}

/// The outcome of a cursor-opening operation: where the cursor lives and its first batch.
#[derive(Debug, Clone)]
pub(crate) struct CursorSpecification {
    pub(crate) info: CursorInformation,
    pub(crate) initial_buffer: VecDeque<Document>,
}

/// A cursor over the results of a query.
///
/// The first batch comes back with the query itself; further batches are fetched with `getMore`
/// from the same server, using the same session, as the cursor is advanced. A cursor that is
/// dropped before it is exhausted is closed on the server in the background.
///
/// ```no_run
/// # use mongo_exec::{bson::{doc, Document}, Collection, error::Result};
/// # async fn run(coll: Collection<Document>) -> Result<()> {
/// let mut cursor = coll.find(doc! { "name": "X" }).batch_size(100).await?;
/// while cursor.advance().await? {
///     println!("{:?}", cursor.current());
/// }
/// # Ok(())
/// # }
/// ```
///
/// Tailable cursors stay open once their results run out. [`Cursor::advance`] then returns
/// `false` without exhausting the cursor, and a later call asks the server for new results.
#[derive(Debug)]
pub struct Cursor<T> {
    client: Client,
    session: Option<ClientSession>,
    info: CursorInformation,
    buffer: VecDeque<Document>,
    current: Option<Document>,
    exhausted: bool,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Cursor<T> {
    pub(crate) fn new(
        client: Client,
        spec: CursorSpecification,
        session: Option<ClientSession>,
    ) -> Self {
        Self {
            client,
            session,
            exhausted: spec.info.id == 0,
            info: spec.info,
            buffer: spec.initial_buffer,
            current: None,
            _phantom: PhantomData,
        }
    }

    /// Moves the cursor to the next result, fetching a new batch from the server if the current
    /// one is used up. Returns `false` once the cursor is exhausted, or for a tailable cursor,
    /// when no new results are available yet.
    pub async fn advance(&mut self) -> Result<bool> {
        loop {
            if let Some(document) = self.buffer.pop_front() {
                self.current = Some(document);
                return Ok(true);
            }
            self.current = None;
            if self.exhausted {
                return Ok(false);
            }

            let result = self
                .client
                .execute_operation(GetMore::new(&self.info), self.session.as_ref())
                .await?;
            self.info.id = result.id;
            self.exhausted = result.exhausted;
            self.buffer = result.batch;

            if self.buffer.is_empty() && !self.exhausted && self.is_tailable() {
                return Ok(false);
            }
        }
    }

    /// The result the cursor is positioned at, if any.
    pub fn current(&self) -> Option<&Document> {
        self.current.as_ref()
    }

    /// The server-side id of the cursor; zero once the server has closed it.
    pub fn id(&self) -> i64 {
        self.info.id
    }

    /// Whether the server has closed the cursor. Buffered results may still remain.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// The server the cursor lives on.
    pub fn address(&self) -> &ServerAddress {
        &self.info.address
    }

    /// The number of results buffered client side.
    pub fn batch_len(&self) -> usize {
        self.buffer.len()
    }

    fn is_tailable(&self) -> bool {
        matches!(
            self.info.cursor_type,
            CursorType::Tailable | CursorType::TailableAwait
        )
    }
}

impl<T: DeserializeOwned> Cursor<T> {
    /// Deserializes the current result.
    pub fn deserialize_current(&self) -> Result<T> {
        match self.current {
            Some(ref document) => Ok(crate::bson::from_document(document.clone())?),
            None => Err(Error::invalid_argument(
                "cursor is not positioned at a result; call advance first",
            )),
        }
    }

    /// Advances the cursor and deserializes the next result.
    pub async fn try_next(&mut self) -> Result<Option<T>> {
        if self.advance().await? {
            self.deserialize_current().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Converts the cursor into a stream of results. For tailable cursors the stream ends when no
    /// new results are available.
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> + Send
    where
        T: Send,
    {
        futures_util::stream::try_unfold(self, |mut cursor| async move {
            Ok(cursor.try_next().await?.map(|item| (item, cursor)))
        })
    }
}

impl<T> Drop for Cursor<T> {
    fn drop(&mut self) {
        if self.exhausted || self.info.id == 0 {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let client = self.client.clone();
        let session = self.session.take();
        let kill = KillCursors::new(
            self.info.ns.clone(),
            vec![self.info.id],
            self.info.address.clone(),
        );
        handle.spawn(async move {
            if let Err(error) = client.execute_operation(kill, session.as_ref()).await {
                tracing::debug!(
                    target: COMMAND_TRACING_EVENT_TARGET,
                    %error,
                    "Failed to kill cursor",
                );
            }
        });
    }
}
