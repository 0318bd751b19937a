use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use typed_builder::TypedBuilder;

use crate::{
    bson::{Bson, Document},
    concern::WriteConcern,
    selection_criteria::SelectionCriteria,
    serde_util,
};

/// These are the valid options for creating a [`Collection`](crate::Collection) with
/// [`Database::collection_with_options`](crate::Database::collection_with_options).
#[derive(Clone, Debug, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option)))]
#[non_exhaustive]
pub struct CollectionOptions {
    /// The default read preference for operations.
    pub selection_criteria: Option<SelectionCriteria>,

    /// The default write concern for operations.
    pub write_concern: Option<WriteConcern>,
}

/// Specifies whether a `find_one_and_replace` or `find_one_and_update` operation should return
/// the document before or after modification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReturnDocument {
    /// Return the document after modification.
    After,
    /// Return the document before modification.
    #[default]
    Before,
}

impl ReturnDocument {
    pub(crate) fn as_bool(&self) -> bool {
        match self {
            ReturnDocument::After => true,
            ReturnDocument::Before => false,
        }
    }
}

/// Specifies the index to use for an operation.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum Hint {
    /// Specifies the keys of the index to use.
    Keys(Document),
    /// Specifies the name of the index to use.
    Name(String),
}

/// Specifies the type of cursor to return from a find operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum CursorType {
    /// Default; close the cursor after the last document is received from the server.
    #[default]
    NonTailable,

    /// Do not close the cursor after the last document is received from the server. If more
    /// results become available later, the cursor will return them.
    Tailable,

    /// Similar to `Tailable`, except that the server waits up to `max_await_time` for more
    /// results before answering a `getMore` with an empty batch.
    TailableAwait,
}

/// The update applied by `update_one`, `update_many` and `find_one_and_update`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum UpdateModifications {
    /// A document that contains only update operator expressions.
    Document(Document),

    /// An aggregation pipeline.
    Pipeline(Vec<Document>),
}

impl UpdateModifications {
    pub(crate) fn to_bson(&self) -> Bson {
        match self {
            UpdateModifications::Document(ref d) => Bson::Document(d.clone()),
            UpdateModifications::Pipeline(ref p) => {
                Bson::Array(p.iter().map(|d| Bson::Document(d.clone())).collect())
            }
        }
    }
}

impl From<Document> for UpdateModifications {
    fn from(item: Document) -> Self {
        UpdateModifications::Document(item)
    }
}

impl From<Vec<Document>> for UpdateModifications {
    fn from(item: Vec<Document>) -> Self {
        UpdateModifications::Pipeline(item)
    }
}

/// Specifies the options to a [`Collection::insert_one`](crate::Collection::insert_one)
/// operation.
#[derive(Clone, Debug, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option)))]
#[non_exhaustive]
pub struct InsertOneOptions {
    /// Opt out of document-level validation.
    pub bypass_document_validation: Option<bool>,

    /// The write concern for the operation.
    pub write_concern: Option<WriteConcern>,

    /// Tags the operation with an arbitrary value to help trace it through the database profiler,
    /// currentOp and logs.
    pub comment: Option<Bson>,

    /// Bounds the whole execution of the operation, retry included.
    pub timeout: Option<Duration>,
}

/// Specifies the options to a [`Collection::insert_many`](crate::Collection::insert_many)
/// operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(strip_option)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct InsertManyOptions {
    /// Opt out of document-level validation.
    pub bypass_document_validation: Option<bool>,

    /// If true, when an insert fails, return without performing the remaining writes. If false,
    /// when a write fails, continue with the remaining writes, if any.
    ///
    /// Defaults to true.
    pub ordered: Option<bool>,

    /// The write concern for the operation.
    pub write_concern: Option<WriteConcern>,

    /// Tags the operation with an arbitrary value to help trace it through the database profiler,
    /// currentOp and logs.
    pub comment: Option<Bson>,

    /// Bounds the whole execution of the operation, retry included.
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl InsertManyOptions {
    pub(crate) fn from_insert_one_options(options: InsertOneOptions) -> Self {
        Self {
            bypass_document_validation: options.bypass_document_validation,
            ordered: None,
            write_concern: options.write_concern,
            comment: options.comment,
            timeout: options.timeout,
        }
    }
}

/// Specifies the options to a [`Collection::update_one`](crate::Collection::update_one) or
/// [`Collection::update_many`](crate::Collection::update_many) operation.
#[derive(Clone, Debug, Default, PartialEq, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option)))]
#[non_exhaustive]
pub struct UpdateOptions {
    /// A set of filters specifying to which array elements an update should apply.
    pub array_filters: Option<Vec<Document>>,

    /// Opt out of document-level validation.
    pub bypass_document_validation: Option<bool>,

    /// If true, insert a document if no matching document is found.
    pub upsert: Option<bool>,

    /// The index to use for the operation.
    pub hint: Option<Hint>,

    /// The write concern for the operation.
    pub write_concern: Option<WriteConcern>,

    /// Tags the operation with an arbitrary value to help trace it through the database profiler,
    /// currentOp and logs.
    pub comment: Option<Bson>,

    /// Bounds the whole execution of the operation, retry included.
    pub timeout: Option<Duration>,
}

impl UpdateOptions {
    pub(crate) fn from_replace_options(options: ReplaceOptions) -> Self {
        Self {
            bypass_document_validation: options.bypass_document_validation,
            upsert: options.upsert,
            hint: options.hint,
            write_concern: options.write_concern,
            comment: options.comment,
            timeout: options.timeout,
            array_filters: None,
        }
    }
}

/// Specifies the options to a [`Collection::replace_one`](crate::Collection::replace_one)
/// operation.
#[derive(Clone, Debug, Default, PartialEq, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option)))]
#[non_exhaustive]
pub struct ReplaceOptions {
    /// Opt out of document-level validation.
    pub bypass_document_validation: Option<bool>,

    /// If true, insert a document if no matching document is found.
    pub upsert: Option<bool>,

    /// The index to use for the operation.
    pub hint: Option<Hint>,

    /// The write concern for the operation.
    pub write_concern: Option<WriteConcern>,

    /// Tags the operation with an arbitrary value to help trace it through the database profiler,
    /// currentOp and logs.
    pub comment: Option<Bson>,

    /// Bounds the whole execution of the operation, retry included.
    pub timeout: Option<Duration>,
}

/// Specifies the options to a [`Collection::delete_one`](crate::Collection::delete_one) or
/// [`Collection::delete_many`](crate::Collection::delete_many) operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(strip_option)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct DeleteOptions {
    /// The write concern for the operation.
    pub write_concern: Option<WriteConcern>,

    /// The index to use for the operation.
    #[serde(skip)]
    pub hint: Option<Hint>,

    /// Tags the operation with an arbitrary value to help trace it through the database profiler,
    /// currentOp and logs.
    pub comment: Option<Bson>,

    /// Bounds the whole execution of the operation, retry included.
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

/// Specifies the options to a [`Collection::find`](crate::Collection::find) operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(strip_option)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct FindOptions {
    /// If true, partial results will be returned from a mongos rather than an error being
    /// returned if one or more shards is down.
    pub allow_partial_results: Option<bool>,

    /// The number of documents the server should return per cursor batch.
    ///
    /// Note that this does not have any affect on the documents that are returned by a cursor,
    /// only the number of documents kept in memory at a given time (and by extension, the
    /// number of round trips needed to return the entire set of documents returned by the
    /// query).
    #[serde(serialize_with = "serde_util::serialize_u32_option_as_i32")]
    pub batch_size: Option<u32>,

    /// Tags the query with an arbitrary value to help trace the operation through the database
    /// profiler, currentOp and logs.
    pub comment: Option<Bson>,

    /// The type of cursor to return.
    #[serde(skip)]
    pub cursor_type: Option<CursorType>,

    /// The index to use for the operation.
    pub hint: Option<Hint>,

    /// The maximum number of documents to query. Must not be negative; zero means no limit.
    pub limit: Option<i64>,

    /// The maximum amount of time for the server to wait on new documents to satisfy a tailable
    /// await cursor. Sent as the `maxTimeMS` of each `getMore`.
    #[serde(skip)]
    pub max_await_time: Option<Duration>,

    /// The maximum amount of time to allow the query to run.
    ///
    /// This options maps to the `maxTimeMS` MongoDB query option, so the duration will be sent
    /// across the wire as an integer number of milliseconds.
    #[serde(
        rename = "maxTimeMS",
        serialize_with = "serde_util::serialize_duration_option_as_int_millis"
    )]
    pub max_time: Option<Duration>,

    /// Whether the server should close the cursor after a period of inactivity.
    pub no_cursor_timeout: Option<bool>,

    /// Limits the fields of the document being returned.
    pub projection: Option<Document>,

    /// Whether to return only the index keys in the documents.
    pub return_key: Option<bool>,

    /// The criteria used to select a server for this find query.
    ///
    /// If none specified, the default set on the collection will be used.
    #[serde(skip)]
    pub selection_criteria: Option<SelectionCriteria>,

    /// Whether to return the record identifier for each document.
    pub show_record_id: Option<bool>,

    /// The number of documents to skip before returning. Must not be negative.
    pub skip: Option<i64>,

    /// The order of the documents for the purposes of the operation.
    pub sort: Option<Document>,

    /// Bounds the whole execution of the initial query, retry included.
    #[serde(skip)]
    pub timeout: Option<Duration>,

    /// Return at most one batch and close the cursor.
    #[builder(setter(skip))]
    pub(crate) single_batch: Option<bool>,
}

/// Specifies the options to a [`Collection::find_one`](crate::Collection::find_one) operation.
#[derive(Clone, Debug, Default, PartialEq, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option)))]
#[non_exhaustive]
pub struct FindOneOptions {
    /// If true, partial results will be returned from a mongos rather than an error being
    /// returned if one or more shards is down.
    pub allow_partial_results: Option<bool>,

    /// Tags the query with an arbitrary value to help trace the operation through the database
    /// profiler, currentOp and logs.
    pub comment: Option<Bson>,

    /// The index to use for the operation.
    pub hint: Option<Hint>,

    /// The maximum amount of time to allow the query to run.
    pub max_time: Option<Duration>,

    /// Limits the fields of the document being returned.
    pub projection: Option<Document>,

    /// The criteria used to select a server for this operation.
    pub selection_criteria: Option<SelectionCriteria>,

    /// The number of documents to skip before returning.
    pub skip: Option<i64>,

    /// The order of the documents for the purposes of the operation.
    pub sort: Option<Document>,

    /// Bounds the whole execution of the operation, retry included.
    pub timeout: Option<Duration>,
}

impl From<FindOneOptions> for FindOptions {
    fn from(options: FindOneOptions) -> Self {
        FindOptions {
            allow_partial_results: options.allow_partial_results,
            comment: options.comment,
            hint: options.hint,
            max_time: options.max_time,
            projection: options.projection,
            selection_criteria: options.selection_criteria,
            skip: options.skip,
            sort: options.sort,
            timeout: options.timeout,
            limit: Some(1),
            single_batch: Some(true),
            ..Default::default()
        }
    }
}

/// Specifies the options to a
/// [`Collection::find_one_and_delete`](crate::Collection::find_one_and_delete) operation.
#[derive(Clone, Debug, Default, PartialEq, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option)))]
#[non_exhaustive]
pub struct FindOneAndDeleteOptions {
    /// The maximum amount of time to allow the query to run.
    pub max_time: Option<Duration>,

    /// Limits the fields of the document being returned.
    pub projection: Option<Document>,

    /// The order of the documents for the purposes of the operation.
    pub sort: Option<Document>,

    /// The level of the write concern
    pub write_concern: Option<WriteConcern>,

    /// The index to use for the operation.
    pub hint: Option<Hint>,

    /// Tags the operation with an arbitrary value.
    pub comment: Option<Bson>,

    /// Bounds the whole execution of the operation, retry included.
    pub timeout: Option<Duration>,
}

/// Specifies the options to a
/// [`Collection::find_one_and_replace`](crate::Collection::find_one_and_replace) operation.
#[derive(Clone, Debug, Default, PartialEq, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option)))]
#[non_exhaustive]
pub struct FindOneAndReplaceOptions {
    /// Opt out of document-level validation.
    pub bypass_document_validation: Option<bool>,

    /// The maximum amount of time to allow the query to run.
    pub max_time: Option<Duration>,

    /// Limits the fields of the document being returned.
    pub projection: Option<Document>,

    /// Whether the operation should return the document before or after modification.
    pub return_document: Option<ReturnDocument>,

    /// The order of the documents for the purposes of the operation.
    pub sort: Option<Document>,

    /// If true, insert a document if no matching document is found.
    pub upsert: Option<bool>,

    /// The level of the write concern
    pub write_concern: Option<WriteConcern>,

    /// The index to use for the operation.
    pub hint: Option<Hint>,

    /// Tags the operation with an arbitrary value.
    pub comment: Option<Bson>,

    /// Bounds the whole execution of the operation, retry included.
    pub timeout: Option<Duration>,
}

/// Specifies the options to a
/// [`Collection::find_one_and_update`](crate::Collection::find_one_and_update) operation.
#[derive(Clone, Debug, Default, PartialEq, TypedBuilder)]
#[builder(field_defaults(default, setter(strip_option)))]
#[non_exhaustive]
pub struct FindOneAndUpdateOptions {
    /// A set of filters specifying to which array elements an update should apply.
    pub array_filters: Option<Vec<Document>>,

    /// Opt out of document-level validation.
    pub bypass_document_validation: Option<bool>,

    /// The maximum amount of time to allow the query to run.
    pub max_time: Option<Duration>,

    /// Limits the fields of the document being returned.
    pub projection: Option<Document>,

    /// Whether the operation should return the document before or after modification.
    pub return_document: Option<ReturnDocument>,

    /// The order of the documents for the purposes of the operation.
    pub sort: Option<Document>,

    /// If true, insert a document if no matching document is found.
    pub upsert: Option<bool>,

    /// The level of the write concern
    pub write_concern: Option<WriteConcern>,

    /// The index to use for the operation.
    pub hint: Option<Hint>,

    /// Tags the operation with an arbitrary value.
    pub comment: Option<Bson>,

    /// Bounds the whole execution of the operation, retry included.
    pub timeout: Option<Duration>,
}

/// Specifies the options to a [`Collection::drop_index`](crate::Collection::drop_index)
/// operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(strip_option)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct DropIndexOptions {
    /// The maximum amount of time to allow the command to run.
    #[serde(
        rename = "maxTimeMS",
        serialize_with = "serde_util::serialize_duration_option_as_int_millis"
    )]
    pub max_time: Option<Duration>,

    /// The write concern for the operation.
    pub write_concern: Option<WriteConcern>,

    /// Tags the operation with an arbitrary value.
    pub comment: Option<Bson>,

    /// Bounds the whole execution of the operation.
    #[serde(skip)]
    pub timeout: Option<Duration>,
}
