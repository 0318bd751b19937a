
use std::{collections::HashMap, time::Duration};

use crate::{
    bson::{doc, oid::ObjectId, Bson, Document},
    cmap::{Command, RawCommandResponse, StreamDescription},
    error::{Error, Result},
    operation::{
        append_options,
        remove_empty_write_concern,
        Operation,
        Retryability,
        WriteResponseBody,
    },
    options::{InsertManyOptions, WriteConcern},
    results::{WriteCounts, WriteResult},
    Namespace,
};

#[derive(Debug)]
pub(crate) struct Insert {
    ns: Namespace,
    documents: Vec<Document>,
    inserted_ids: Vec<Bson>,
    options: InsertManyOptions,
}

impl Insert {
    /// Documents without an `_id` get a generated `ObjectId` prepended. Fails if `documents` is
    /// empty.
    pub(crate) fn new(
        ns: Namespace,
        documents: Vec<Document>,
        options: Option<InsertManyOptions>,
    ) -> Result<Self> {
        if documents.is_empty() {
            return Err(Error::invalid_argument("no documents provided to insert"));
        }

        let mut options = options.unwrap_or_default();
        if options.ordered.is_none() {
            options.ordered = Some(true);
        }
        remove_empty_write_concern(&mut options.write_concern);

        let mut inserted_ids = Vec::with_capacity(documents.len());
        let documents = documents
            .into_iter()
            .map(|document| {
                let (id, document) = with_id(document);
                inserted_ids.push(id);
                document
            })
            .collect();

        Ok(Self {
            ns,
            documents,
            inserted_ids,
            options,
        })
    }

    fn inserted_id_map(&self) -> HashMap<usize, Bson> {
        self.inserted_ids.iter().cloned().enumerate().collect()
    }
}

/// Returns the document's `_id`, generating one first if it is missing.
fn with_id(mut document: Document) -> (Bson, Document) {
    if let Some(id) = document.get("_id") {
        return (id.clone(), document);
    }
    let id = Bson::ObjectId(ObjectId::new());
    let mut with_id = doc! { "_id": id.clone() };
    with_id.extend(std::mem::take(&mut document));
    (id, with_id)
}

impl Operation for Insert {
    type O = WriteResult;

    const NAME: &'static str = "insert";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
        };
        append_options(&mut body, Some(&self.options))?;

        let mut command = Command::new(Self::NAME, &self.ns.db, body);
        command.add_document_sequence("documents", self.documents.clone());
        Ok(command)
    }

    fn handle_response(
        &self,
        raw_response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        let response: WriteResponseBody = raw_response.body()?;

        let mut inserted_ids = HashMap::new();
        if self.options.ordered == Some(true) {
            // in ordered inserts, only the first n were attempted.
            for (i, id) in self
                .inserted_ids
                .iter()
                .enumerate()
                .take(response.n as usize)
            {
                inserted_ids.insert(i, id.clone());
            }
        } else {
            // for unordered, add all the attempted ids and then remove the ones that have
            // associated write errors.
            inserted_ids = self.inserted_id_map();
            if let Some(write_errors) = response.write_errors.as_ref() {
                for err in write_errors {
                    inserted_ids.remove(&err.index);
                }
            }
        }

        let counts = WriteCounts {
            n: response.n,
            inserted: response.n,
            ..Default::default()
        };
        let mut result = WriteResult::acknowledged(raw_response.into_document(), counts);
        result.inserted_ids = inserted_ids;
        response.validate(result)
    }

    fn handle_unacknowledged(&self) -> Result<Self::O> {
        Ok(WriteResult::unacknowledged(self.inserted_id_map()))
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.options.write_concern.as_ref()
    }

    fn retryability(&self) -> Retryability {
        Retryability::Write
    }

    fn timeout(&self) -> Option<Duration> {
        self.options.timeout
    }
}
