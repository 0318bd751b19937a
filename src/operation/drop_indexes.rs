#[cfg(test)]
mod test;

use std::time::Duration;

use crate::{
    bson::doc,
    cmap::{Command, RawCommandResponse, StreamDescription},
    error::{Error, Result},
    operation::{append_options, remove_empty_write_concern, Operation, WriteConcernOnlyBody},
    options::{DropIndexOptions, WriteConcern},
    Namespace,
};

#[derive(Debug)]
pub(crate) struct DropIndexes {
    ns: Namespace,
    name: String,
    options: Option<DropIndexOptions>,
}

impl DropIndexes {
    /// Fails for the `*` wildcard, which would drop every index.
    pub(crate) fn new(
        ns: Namespace,
        name: String,
        mut options: Option<DropIndexOptions>,
    ) -> Result<Self> {
        if name == "*" {
            return Err(Error::invalid_argument(
                "dropping all indexes with '*' is not supported by drop_index",
            ));
        }
        if let Some(options) = options.as_mut() {
            remove_empty_write_concern(&mut options.write_concern);
        }
        Ok(Self { ns, name, options })
    }
}

impl Operation for DropIndexes {
    type O = ();

    const NAME: &'static str = "dropIndexes";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "index": self.name.clone(),
        };
        append_options(&mut body, self.options.as_ref())?;

        Ok(Command::new(Self::NAME, &self.ns.db, body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        let response: WriteConcernOnlyBody = response.body()?;
        response.validate()
    }

    fn handle_unacknowledged(&self) -> Result<Self::O> {
        Ok(())
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.options
            .as_ref()
            .and_then(|opts| opts.write_concern.as_ref())
    }

    fn timeout(&self) -> Option<Duration> {
        self.options.as_ref().and_then(|opts| opts.timeout)
    }
}
