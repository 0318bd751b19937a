use crate::{
    bson::{doc, Document},
    cmap::{Command, RawCommandResponse, StreamDescription},
    error::Result,
    operation::Operation,
    selection_criteria::{ReadPreference, ReadPreferenceOptions, SelectionCriteria},
};

/// Releases server sessions. Sent to the admin database of any data-bearing server.
#[derive(Debug)]
pub(crate) struct EndSessions {
    session_ids: Vec<Document>,
    selection_criteria: SelectionCriteria,
}

impl EndSessions {
    pub(crate) fn new(session_ids: Vec<Document>) -> Self {
        Self {
            session_ids,
            selection_criteria: SelectionCriteria::ReadPreference(ReadPreference::PrimaryPreferred {
                options: ReadPreferenceOptions::default(),
            }),
        }
    }
}

impl Operation for EndSessions {
    type O = ();

    const NAME: &'static str = "endSessions";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let body = doc! {
            Self::NAME: self.session_ids.clone(),
        };
        Ok(Command::new(Self::NAME, "admin", body))
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

    fn supports_sessions(&self) -> bool {
        false
    }
}
