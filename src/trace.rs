use bson::{Bson, Document};

use crate::{
    error::Error,
    sdam::TopologyDescription,
    selection_criteria::SelectionCriteria,
};

pub(crate) const COMMAND_TRACING_EVENT_TARGET: &str = "mongo_exec::command";
pub(crate) const CONNECTION_TRACING_EVENT_TARGET: &str = "mongo_exec::connection";
pub(crate) const SERVER_SELECTION_TRACING_EVENT_TARGET: &str = "mongo_exec::server_selection";
pub(crate) const SESSION_TRACING_EVENT_TARGET: &str = "mongo_exec::session";

/// Commands and replies are cut to this many bytes of extended JSON in tracing events.
pub(crate) const DEFAULT_MAX_DOCUMENT_LENGTH_BYTES: usize = 1000;

pub(crate) trait TracingRepresentation {
    fn tracing_representation(&self) -> String;
}

impl TracingRepresentation for Document {
    fn tracing_representation(&self) -> String {
        let mut json = Bson::Document(self.clone())
            .into_relaxed_extjson()
            .to_string();
        truncate_on_char_boundary(&mut json, DEFAULT_MAX_DOCUMENT_LENGTH_BYTES);
        json
    }
}

impl TracingRepresentation for Error {
    fn tracing_representation(&self) -> String {
        self.to_string()
    }
}

impl TracingRepresentation for SelectionCriteria {
    fn tracing_representation(&self) -> String {
        self.to_string()
    }
}

impl TracingRepresentation for TopologyDescription {
    fn tracing_representation(&self) -> String {
        self.to_string()
    }
}

/// Truncates `s` to at most `new_length` bytes, backing off to the nearest character boundary and
/// appending "..." if anything was cut.
pub(crate) fn truncate_on_char_boundary(s: &mut String, new_length: usize) {
    let original_length = s.len();
    if original_length > new_length {
        let mut truncate_length = new_length;
        while !s.is_char_boundary(truncate_length) {
            truncate_length -= 1;
        }
        s.truncate(truncate_length);
        // only add the ellipses if we actually truncated
        if s.len() < original_length {
            s.push_str("...");
        }
    }
}

#[cfg(test)]
mod test {
    use super::{truncate_on_char_boundary, TracingRepresentation};
    use crate::bson::doc;

    #[test]
    fn truncation_respects_char_boundaries() {
        let mut s = "héllo".to_string();
        truncate_on_char_boundary(&mut s, 2);
        assert_eq!(s, "h...");

        let mut short = "abc".to_string();
        truncate_on_char_boundary(&mut short, 10);
        assert_eq!(short, "abc");
    }

    #[test]
    fn long_documents_are_truncated() {
        let doc = doc! { "x": "a".repeat(5000) };
        let repr = doc.tracing_representation();
        assert!(repr.ends_with("..."));
        assert_eq!(repr.len(), super::DEFAULT_MAX_DOCUMENT_LENGTH_BYTES + 3);
    }
}
