use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use futures_util::{future::BoxFuture, FutureExt};
use tokio::io::{AsyncWriteExt, DuplexStream};

use crate::{
    bson::{doc, Bson, Document},
    bson_util,
    cmap::{
        conn::wire::{
            next_request_id,
            read_frame,
            Header,
            Message,
            MessageFlags,
            OpCode,
            Query,
            QueryFlags,
            Reply,
            ResponseFlags,
        },
        establish::{AsyncStream, Connector},
        WireShape,
    },
    options::{ClientOptions, ServerAddress, DEFAULT_MAX_MESSAGE_SIZE_BYTES},
    sdam::{
        topology_channel,
        ServerDescription,
        ServerType,
        TopologyDescription,
        TopologyType,
        TopologyUpdater,
    },
    Client,
};

/// A command as received by the mock server.
#[derive(Debug, Clone)]
pub(crate) struct ReceivedCommand {
    pub(crate) address: ServerAddress,
    pub(crate) shape: WireShape,
    pub(crate) name: String,
    pub(crate) db: String,
    /// The full command: the OP_MSG payload with document sequences folded in, or the OP_QUERY
    /// query document with any `$query` wrapper removed.
    pub(crate) document: Document,
    /// The `$readPreference` of a wrapped legacy query.
    pub(crate) legacy_read_preference: Option<Document>,
    pub(crate) secondary_ok: bool,
    pub(crate) more_to_come: bool,
}

/// What the mock server does with the next command of a given name.
#[derive(Debug, Clone)]
pub(crate) enum MockReply {
    /// Answer with this document.
    Document(Document),
    /// Close the connection without answering.
    Hangup,
    /// Never answer; the connection stays open until the client drops it.
    Stall,
}

#[derive(Debug, Default)]
struct MockState {
    received: Vec<ReceivedCommand>,
    scripted: HashMap<String, VecDeque<MockReply>>,
    connections_opened: usize,
    refuse_connections: usize,
}

/// An in-process server reachable through [`MockServer::connector`]. Every connection is a tokio
/// duplex stream served by its own task; both wire shapes are understood and every command is
/// recorded.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockServer {
    state: Arc<Mutex<MockState>>,
}

impl MockServer {
    pub(crate) fn new() -> Self {
        Default::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(MockConnector {
            server: self.clone(),
        })
    }

    /// Queues `reply` for the next command named `command_name`. Unscripted commands get a
    /// plausible default reply.
    pub(crate) fn script(&self, command_name: &str, reply: MockReply) {
        self.state()
            .scripted
            .entry(command_name.to_string())
            .or_default()
            .push_back(reply);
    }

    pub(crate) fn reply_next(&self, command_name: &str, reply: Document) {
        self.script(command_name, MockReply::Document(reply));
    }

    pub(crate) fn hang_up_next(&self, command_name: &str, times: usize) {
        for _ in 0..times {
            self.script(command_name, MockReply::Hangup);
        }
    }

    /// Makes the next `times` connection attempts fail.
    pub(crate) fn refuse_connections(&self, times: usize) {
        self.state().refuse_connections = times;
    }

    pub(crate) fn received(&self) -> Vec<ReceivedCommand> {
        self.state().received.clone()
    }

    /// The received commands named `name`, in arrival order.
    pub(crate) fn received_named(&self, name: &str) -> Vec<ReceivedCommand> {
        self.received()
            .into_iter()
            .filter(|command| command.name == name)
            .collect()
    }

    pub(crate) fn connections_opened(&self) -> usize {
        self.state().connections_opened
    }

    fn next_reply(&self, command: &ReceivedCommand) -> MockReply {
        let mut state = self.state();
        state.received.push(command.clone());
        state
            .scripted
            .get_mut(&command.name)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| MockReply::Document(default_reply(command)))
    }

    async fn serve(self, mut stream: DuplexStream, address: ServerAddress) {
        loop {
            let Ok(bytes) = read_frame(&mut stream, DEFAULT_MAX_MESSAGE_SIZE_BYTES).await else {
                return;
            };
            let Some((command, request_id)) = decode_command(&bytes, &address) else {
                return;
            };

            match self.next_reply(&command) {
                _ if command.more_to_come => {}
                MockReply::Document(reply) => {
                    let Some(bytes) = encode_reply(command.shape, reply, request_id) else {
                        return;
                    };
                    if stream.write_all(&bytes).await.is_err() {
                        return;
                    }
                }
                MockReply::Hangup => return,
                MockReply::Stall => {}
            }
        }
    }
}

#[derive(Debug)]
struct MockConnector {
    server: MockServer,
}

impl Connector for MockConnector {
    fn connect<'a>(
        &'a self,
        address: &'a ServerAddress,
    ) -> BoxFuture<'a, std::io::Result<AsyncStream>> {
        async move {
            {
                let mut state = self.server.state();
                if state.refuse_connections > 0 {
                    state.refuse_connections -= 1;
                    return Err(std::io::ErrorKind::ConnectionRefused.into());
                }
                state.connections_opened += 1;
            }
            let (client, server) = tokio::io::duplex(64 * 1024);
            tokio::spawn(self.server.clone().serve(server, address.clone()));
            Ok(Box::new(client) as AsyncStream)
        }
        .boxed()
    }
}

fn decode_command(bytes: &[u8], address: &ServerAddress) -> Option<(ReceivedCommand, i32)> {
    let mut reader = bytes;
    let header = Header::read_from(&mut reader).ok()?;
    let command = match header.op_code {
        OpCode::Message => {
            let message = Message::read_body(&header, reader).ok()?;
            let document = message.get_command_document();
            ReceivedCommand {
                address: address.clone(),
                shape: WireShape::GenericCommand,
                name: bson_util::first_key(&document)?.to_string(),
                db: document.get_str("$db").ok()?.to_string(),
                document,
                legacy_read_preference: None,
                secondary_ok: false,
                more_to_come: message.flags.contains(MessageFlags::MORE_TO_COME),
            }
        }
        OpCode::Query => {
            let query = Query::read_body(&header, reader).ok()?;
            let db = query.full_collection_name.strip_suffix(".$cmd")?.to_string();
            let (document, legacy_read_preference) = match query.query.get_document("$query") {
                Ok(inner) => (
                    inner.clone(),
                    query.query.get_document("$readPreference").ok().cloned(),
                ),
                Err(_) => (query.query.clone(), None),
            };
            ReceivedCommand {
                address: address.clone(),
                shape: WireShape::Legacy,
                name: bson_util::first_key(&document)?.to_string(),
                db,
                document,
                legacy_read_preference,
                secondary_ok: query.flags.contains(QueryFlags::SECONDARY_OK),
                more_to_come: false,
            }
        }
        OpCode::Reply => return None,
    };
    Some((command, header.request_id))
}

fn encode_reply(shape: WireShape, reply: Document, response_to: i32) -> Option<Vec<u8>> {
    match shape {
        WireShape::GenericCommand => Message {
            document_payload: reply,
            document_sequences: Vec::new(),
            response_to,
            flags: MessageFlags::empty(),
            request_id: next_request_id(),
        }
        .to_bytes()
        .ok(),
        WireShape::Legacy => Reply {
            response_to,
            response_flags: ResponseFlags::empty(),
            cursor_id: 0,
            starting_from: 0,
            num_returned: 1,
            docs: vec![reply],
        }
        .to_bytes(next_request_id())
        .ok(),
    }
}

/// A successful reply shaped like the server's answer to `command`.
fn default_reply(command: &ReceivedCommand) -> Document {
    let document = &command.document;
    let ns = |coll: &str| format!("{}.{}", command.db, coll);
    match command.name.as_str() {
        "insert" => doc! {
            "ok": 1,
            "n": document.get_array("documents").map_or(0, |docs| docs.len() as i64),
        },
        "update" | "delete" => doc! { "ok": 1, "n": 1, "nModified": 1 },
        "find" => doc! {
            "ok": 1,
            "cursor": {
                "id": 0_i64,
                "ns": ns(document.get_str("find").unwrap_or_default()),
                "firstBatch": [],
            },
        },
        "getMore" => doc! {
            "ok": 1,
            "cursor": {
                "id": 0_i64,
                "ns": ns(document.get_str("collection").unwrap_or_default()),
                "nextBatch": [],
            },
        },
        "findAndModify" => doc! { "ok": 1, "value": Bson::Null },
        _ => doc! { "ok": 1 },
    }
}

pub(crate) fn localhost(port: u16) -> ServerAddress {
    ServerAddress::new("localhost", port)
}

/// A standalone server at `localhost:27017` with the given max wire version.
pub(crate) fn standalone(max_wire_version: i32) -> ServerDescription {
    ServerDescription::new(localhost(27017), ServerType::Standalone)
        .with_max_wire_version(max_wire_version)
}

pub(crate) fn single_topology(server: ServerDescription) -> TopologyDescription {
    TopologyDescription::new(TopologyType::Single).with_server(server)
}

/// A replica set primary at `localhost:27017` speaking the generic command shape.
pub(crate) fn replica_set_primary() -> TopologyDescription {
    TopologyDescription::new(TopologyType::ReplicaSetWithPrimary).with_server(
        ServerDescription::new(localhost(27017), ServerType::RsPrimary).with_max_wire_version(17),
    )
}

/// A client wired to a fresh mock server, along with the handle that publishes topology updates.
pub(crate) struct TestClient {
    pub(crate) client: Client,
    pub(crate) server: MockServer,
    pub(crate) updater: TopologyUpdater,
}

impl TestClient {
    pub(crate) fn new(topology: TopologyDescription) -> Self {
        Self::with_options(topology, ClientOptions::default())
    }

    pub(crate) fn with_options(topology: TopologyDescription, options: ClientOptions) -> Self {
        let server = MockServer::new();
        let (updater, watcher) = topology_channel(topology);
        let client = Client::with_connector(options, watcher, server.connector())
            .expect("valid client options");
        Self {
            client,
            server,
            updater,
        }
    }
}
