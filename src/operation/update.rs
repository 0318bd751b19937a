#[cfg(test)]
mod test;

use std::time::Duration;

use serde::Deserialize;

use crate::{
    bson::{doc, Bson, Document},
    bson_util,
    cmap::{Command, RawCommandResponse, StreamDescription},
    error::Result,
    operation::{Operation, Retryability, UpsertedId, WriteResponseBody},
    options::{UpdateModifications, UpdateOptions, WriteConcern},
    results::{WriteCounts, WriteResult},
    Namespace,
};

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum UpdateOrReplace {
    UpdateModifications(UpdateModifications),
    Replacement(Document),
}

impl UpdateOrReplace {
    /// Fails if an update document does not consist of operators, or if a replacement does.
    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            Self::UpdateModifications(UpdateModifications::Document(document)) => {
                bson_util::update_document_check(document)
            }
            Self::UpdateModifications(UpdateModifications::Pipeline(_)) => Ok(()),
            Self::Replacement(replacement) => bson_util::replacement_document_check(replacement),
        }
    }

    pub(crate) fn to_bson(&self) -> Bson {
        match self {
            Self::UpdateModifications(update_modifications) => update_modifications.to_bson(),
            Self::Replacement(replacement) => Bson::Document(replacement.clone()),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Update {
    ns: Namespace,
    filter: Document,
    update: UpdateOrReplace,
    multi: bool,
    options: UpdateOptions,
}

impl Update {
    pub(crate) fn new(
        ns: Namespace,
        filter: Document,
        update: UpdateOrReplace,
        multi: bool,
        options: Option<UpdateOptions>,
    ) -> Result<Self> {
        update.validate()?;
        let mut options = options.unwrap_or_default();
        super::remove_empty_write_concern(&mut options.write_concern);
        Ok(Self {
            ns,
            filter,
            update,
            multi,
            options,
        })
    }
}

impl Operation for Update {
    type O = WriteResult;

    const NAME: &'static str = "update";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
        };

        let mut update = doc! {
            "q": self.filter.clone(),
            "u": self.update.to_bson(),
        };

        let options = &self.options;
        if let Some(upsert) = options.upsert {
            update.insert("upsert", upsert);
        }
        if let Some(ref array_filters) = options.array_filters {
            update.insert("arrayFilters", bson_util::to_bson_array(array_filters));
        }
        if let Some(ref hint) = options.hint {
            update.insert("hint", crate::bson::to_bson(hint)?);
        }
        if self.multi {
            update.insert("multi", true);
        }

        if let Some(bypass_doc_validation) = options.bypass_document_validation {
            body.insert("bypassDocumentValidation", bypass_doc_validation);
        }
        if let Some(ref write_concern) = options.write_concern {
            body.insert("writeConcern", crate::bson::to_document(write_concern)?);
        }
        if let Some(ref comment) = options.comment {
            body.insert("comment", comment.clone());
        }

        body.insert("updates", vec![Bson::Document(update)]);
        body.insert("ordered", true);

        Ok(Command::new(Self::NAME, &self.ns.db, body))
    }

    fn handle_response(
        &self,
        raw_response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        let response: WriteResponseBody<UpdateBody> = raw_response.body()?;

        let upserted_ids: std::collections::HashMap<usize, Bson> = response
            .upserted
            .iter()
            .flatten()
            .map(|upserted| (upserted.index, upserted.id.clone()))
            .collect();

        // an upsert matches nothing; `n` counts the upserted document instead.
        let matched = response.n.saturating_sub(upserted_ids.len() as u64);
        let counts = WriteCounts {
            n: response.n,
            matched,
            modified: response.n_modified,
            upserted_ids,
            ..Default::default()
        };
        let result = WriteResult::acknowledged(raw_response.into_document(), counts);
        response.validate(result)
    }

    fn handle_unacknowledged(&self) -> Result<Self::O> {
        Ok(WriteResult::unacknowledged(Default::default()))
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.options.write_concern.as_ref()
    }

    fn retryability(&self) -> Retryability {
        if self.multi {
            Retryability::None
        } else {
            Retryability::Write
        }
    }

    fn timeout(&self) -> Option<Duration> {
        self.options.timeout
    }
}

#[derive(Deserialize, Debug)]
pub(crate) struct UpdateBody {
    #[serde(rename = "nModified", default)]
    n_modified: u64,

    upserted: Option<Vec<UpsertedId>>,
}
