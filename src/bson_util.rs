use crate::{
    bson::{Bson, Document},
    error::{Error, Result},
};

/// Coerce numeric types into an `i64` if it would be lossless to do so. If this Bson is not numeric
/// or the conversion would be lossy (e.g. 1.5 -> 1), this returns `None`.
#[cfg(test)]
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn get_int(val: &Bson) -> Option<i64> {
    match *val {
        Bson::Int32(i) => Some(i64::from(i)),
        Bson::Int64(i) => Some(i),
        Bson::Double(f) if (f - (f as i64 as f64)).abs() <= f64::EPSILON => Some(f as i64),
        _ => None,
    }
}

/// The truthiness of a server `ok` field: non-zero numbers and `true`.
pub(crate) fn is_truthy(val: &Bson) -> bool {
    match *val {
        Bson::Boolean(b) => b,
        Bson::Int32(i) => i != 0,
        Bson::Int64(i) => i != 0,
        Bson::Double(f) => f != 0.0 && !f.is_nan(),
        _ => false,
    }
}

pub(crate) fn to_bson_array(docs: &[Document]) -> Bson {
    Bson::Array(docs.iter().map(|doc| Bson::Document(doc.clone())).collect())
}

pub(crate) fn first_key(document: &Document) -> Option<&str> {
    document.keys().next().map(String::as_str)
}

pub(crate) fn replacement_document_check(replacement: &Document) -> Result<()> {
    match first_key(replacement) {
        Some(key) if key.starts_with('$') => Err(Error::invalid_argument(
            "replace document must have first key not starting with '$'",
        )),
        _ => Ok(()),
    }
}

pub(crate) fn update_document_check(update: &Document) -> Result<()> {
    match first_key(update) {
        Some(key) if key.starts_with('$') => Ok(()),
        _ => Err(Error::invalid_argument(
            "update document must have first key starting with '$'",
        )),
    }
}
