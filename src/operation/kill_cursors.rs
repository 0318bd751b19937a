use crate::{
    bson::doc,
    cmap::{Command, RawCommandResponse, StreamDescription},
    error::Result,
    operation::Operation,
    options::{ServerAddress, SelectionCriteria},
    Namespace,
};

/// Closes cursors on the server that opened them. Sent when a cursor is dropped before it is
/// exhausted.
#[derive(Debug)]
pub(crate) struct KillCursors {
    ns: Namespace,
    cursor_ids: Vec<i64>,
    selection_criteria: SelectionCriteria,
}

impl KillCursors {
    pub(crate) fn new(ns: Namespace, cursor_ids: Vec<i64>, address: ServerAddress) -> Self {
        Self {
            ns,
            cursor_ids,
            selection_criteria: SelectionCriteria::from_address(address),
        }
    }
}

impl Operation for KillCursors {
    type O = ();

    const NAME: &'static str = "killCursors";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "cursors": self.cursor_ids.clone(),
        };
        Ok(Command::new(Self::NAME, &self.ns.db, body))
    }

    fn handle_response(
        &self,
        _response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        Ok(())
    }

    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        Some(&self.selection_criteria)
    }
}
