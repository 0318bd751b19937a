
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use super::{
    append_options,
    remove_empty_write_concern,
    Operation,
    Retryability,
    UpdateOrReplace,
    WriteConcernOnlyBody,
};
use crate::{
    bson::{doc, Bson, Document},
    cmap::{Command, RawCommandResponse, StreamDescription},
    error::{Error, Result},
    options::{
        FindOneAndDeleteOptions,
        FindOneAndReplaceOptions,
        FindOneAndUpdateOptions,
        Hint,
        WriteConcern,
    },
    serde_util,
    Namespace,
};

/// What a `findAndModify` does to the document it finds.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Modification {
    Delete,
    Update(UpdateOrReplace),
}

/// The options of a `findAndModify` command, in the server's field names.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FindAndModifyOptions {
    pub(crate) sort: Option<Document>,

    pub(crate) new: Option<bool>,

    pub(crate) upsert: Option<bool>,

    pub(crate) bypass_document_validation: Option<bool>,

    pub(crate) write_concern: Option<WriteConcern>,

    pub(crate) array_filters: Option<Vec<Document>>,

    #[serde(
        serialize_with = "serde_util::serialize_duration_option_as_int_millis",
        rename = "maxTimeMS"
    )]
    pub(crate) max_time: Option<Duration>,

    #[serde(rename = "fields")]
    pub(crate) projection: Option<Document>,

    pub(crate) hint: Option<Hint>,

    pub(crate) comment: Option<Bson>,

    #[serde(skip)]
    pub(crate) timeout: Option<Duration>,
}

impl From<FindOneAndDeleteOptions> for FindAndModifyOptions {
    fn from(opts: FindOneAndDeleteOptions) -> Self {
        Self {
            max_time: opts.max_time,
            projection: opts.projection,
            sort: opts.sort,
            write_concern: opts.write_concern,
            hint: opts.hint,
            comment: opts.comment,
            timeout: opts.timeout,
            ..Default::default()
        }
    }
}

impl From<FindOneAndReplaceOptions> for FindAndModifyOptions {
    fn from(opts: FindOneAndReplaceOptions) -> Self {
        Self {
            bypass_document_validation: opts.bypass_document_validation,
            max_time: opts.max_time,
            projection: opts.projection,
            new: opts.return_document.map(|rd| rd.as_bool()),
            sort: opts.sort,
            upsert: opts.upsert,
            write_concern: opts.write_concern,
            hint: opts.hint,
            comment: opts.comment,
            timeout: opts.timeout,
            ..Default::default()
        }
    }
}

impl From<FindOneAndUpdateOptions> for FindAndModifyOptions {
    fn from(opts: FindOneAndUpdateOptions) -> Self {
        Self {
            array_filters: opts.array_filters,
            bypass_document_validation: opts.bypass_document_validation,
            max_time: opts.max_time,
            projection: opts.projection,
            new: opts.return_document.map(|rd| rd.as_bool()),
            sort: opts.sort,
            upsert: opts.upsert,
            write_concern: opts.write_concern,
            hint: opts.hint,
            comment: opts.comment,
            timeout: opts.timeout,
        }
    }
}

#[derive(Debug)]
pub(crate) struct FindAndModify {
    ns: Namespace,
    query: Document,
    modification: Modification,
    options: FindAndModifyOptions,
}

impl FindAndModify {
    pub(crate) fn new(
        ns: Namespace,
        query: Document,
        modification: Modification,
        options: impl Into<Option<FindAndModifyOptions>>,
    ) -> Result<Self> {
        if let Modification::Update(ref update) = modification {
            update.validate()?;
        }
        let mut options = options.into().unwrap_or_default();
        remove_empty_write_concern(&mut options.write_concern);
        Ok(Self {
            ns,
            query,
            modification,
            options,
        })
    }
}

impl Operation for FindAndModify {
    type O = Option<Document>;

    const NAME: &'static str = "findAndModify";

    fn build(&mut self, description: &StreamDescription) -> Result<Command> {
        if self.options.hint.is_some() && description.max_wire_version.unwrap_or(0) < 8 {
            return Err(Error::invalid_argument(
                "specifying a hint to find_one_and_x is not supported on server versions < 4.4",
            ));
        }

        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "query": self.query.clone(),
        };

        match self.modification {
            Modification::Delete => {
                body.insert("remove", true);
            }
            Modification::Update(ref update) => {
                body.insert("update", update.to_bson());
            }
        }
        append_options(&mut body, Some(&self.options))?;

        Ok(Command::new(Self::NAME, &self.ns.db, body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        #[derive(Debug, Deserialize)]
        struct Response {
            #[serde(default)]
            value: Bson,

            #[serde(flatten)]
            write_concern_info: WriteConcernOnlyBody,
        }
        let response: Response = response.body()?;
        response.write_concern_info.validate()?;

        match response.value {
            Bson::Document(doc) => Ok(Some(doc)),
            Bson::Null => Ok(None),
            other => Err(Error::invalid_response(format!(
                "expected document for value field of findAndModify response, but instead got \
                 {other:?}"
            ))),
        }
    }

    fn handle_unacknowledged(&self) -> Result<Self::O> {
        Ok(None)
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
