#![allow(dead_code)]

use async_trait::async_trait;
use chatflow::core::flow_graph::channel::ChannelError;
use chatflow::core::flow_graph::model::ActionParams;
use chatflow::core::flow_graph::{
    Connection, Flow, InMemoryGraphStore, MediaKind, MessagingChannel, Node, RunTarget, VarValue,
    Variables,
};
use std::sync::{Arc, Mutex};

/// One delivery observed by [`RecordingChannel`].
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text {
        recipient: String,
        text: String,
    },
    Media {
        recipient: String,
        url: String,
        caption: String,
        kind: MediaKind,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Accept,
    Reject,
    Hang,
}

/// In-memory channel that records every send and can be told to fail or hang.
pub struct RecordingChannel {
    sent: Mutex<Vec<Sent>>,
    mode: Mode,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            mode: Mode::Accept,
        })
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            mode: Mode::Reject,
        })
    }

    /// Never acknowledges a send; used to exercise send timeouts.
    pub fn hanging() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            mode: Mode::Hang,
        })
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Text { text, .. } => Some(text),
                Sent::Media { .. } => None,
            })
            .collect()
    }

    async fn deliver(&self, sent: Sent) -> Result<(), ChannelError> {
        match self.mode {
            Mode::Accept => {
                self.sent.lock().unwrap().push(sent);
                Ok(())
            }
            Mode::Reject => Err(ChannelError::Rejected("recipient blocked".to_string())),
            Mode::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl MessagingChannel for RecordingChannel {
    async fn send_text(&self, target: &RunTarget, text: &str) -> Result<(), ChannelError> {
        self.deliver(Sent::Text {
            recipient: target.recipient.clone(),
            text: text.to_string(),
        })
        .await
    }

    async fn send_media(
        &self,
        target: &RunTarget,
        url: &str,
        caption: &str,
        kind: MediaKind,
    ) -> Result<(), ChannelError> {
        self.deliver(Sent::Media {
            recipient: target.recipient.clone(),
            url: url.to_string(),
            caption: caption.to_string(),
            kind,
        })
        .await
    }
}

pub fn target() -> RunTarget {
    RunTarget::new("whatsapp-main", "5511999990000")
}

pub fn vars(pairs: &[(&str, VarValue)]) -> Variables {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

pub fn params(pairs: &[(&str, &str)]) -> ActionParams {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), VarValue::from(*value)))
        .collect()
}

pub fn store_with(flows: Vec<Flow>) -> Arc<InMemoryGraphStore> {
    let store = InMemoryGraphStore::new();
    for flow in flows {
        store.save_draft(flow);
    }
    Arc::new(store)
}

/// start -> check(age >= 18) -> adult|minor message -> end1|end2
pub fn age_branch_flow() -> Flow {
    let mut flow = Flow::new("age-check", "owner-1", "Age check");
    flow.add_node(Node::start("start"))
        .add_node(Node::condition("check", "age >= 18"))
        .add_node(Node::message("adult", "Welcome adult"))
        .add_node(Node::message("minor", "Welcome minor"))
        .add_node(Node::end("end1"))
        .add_node(Node::end("end2"));
    flow.connect("start", "check")
        .connect_when("check", "adult", "true")
        .connect_when("check", "minor", "false")
        .connect("adult", "end1")
        .connect("minor", "end2");
    flow
}

/// `x == 1` with only a `true` branch.
pub fn dead_end_flow() -> Flow {
    let mut flow = Flow::new("dead-end", "owner-1", "Dead end");
    flow.add_node(Node::start("start"))
        .add_node(Node::condition("check", "x == 1"))
        .add_node(Node::message("one", "x is one"))
        .add_node(Node::end("end"));
    flow.connect("start", "check")
        .connect_when("check", "one", "true")
        .connect("one", "end");
    flow
}

/// start -> set city=SP -> "You are in {{city}}" -> end
pub fn city_flow() -> Flow {
    let mut flow = Flow::new("city", "owner-1", "City");
    flow.add_node(Node::start("start"))
        .add_node(Node::action(
            "set",
            "set_variable",
            params(&[("name", "city"), ("value", "SP")]),
        ))
        .add_node(Node::message("say", "You are in {{city}}"))
        .add_node(Node::end("end"));
    flow.connect("start", "set")
        .connect("set", "say")
        .connect("say", "end");
    flow
}

/// start -> first -> second -> end; `first` waits `node_delay` seconds after sending.
pub fn delayed_flow(node_delay: u64, connection_delay: Option<u64>) -> Flow {
    let mut flow = Flow::new("delayed", "owner-1", "Delayed");
    flow.add_node(Node::start("start"))
        .add_node(Node::message("first", "first").with_delay(node_delay))
        .add_node(Node::message("second", "second"))
        .add_node(Node::end("end"));
    flow.connect("start", "first");
    match connection_delay {
        Some(seconds) => {
            flow.add_connection(Connection::new("c-delay", "first", "second").with_delay(seconds));
        }
        None => {
            flow.connect("first", "second");
        }
    }
    flow.connect("second", "end");
    flow
}
