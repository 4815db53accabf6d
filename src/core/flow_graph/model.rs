use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Run-time variable bag threaded through one execution.
pub type Variables = IndexMap<String, VarValue>;

/// Parameters attached to an action node.
pub type ActionParams = IndexMap<String, VarValue>;

/// A variable or parameter value: text, number or boolean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl VarValue {
    /// Convert a JSON scalar into a variable value. Arrays and objects are kept as JSON text.
    pub fn from_json(value: &serde_json::Value) -> Option<VarValue> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(VarValue::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(VarValue::Number),
            serde_json::Value::String(s) => Some(VarValue::Text(s.clone())),
            other => Some(VarValue::Text(other.to_string())),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            VarValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarValue::Bool(b) => write!(f, "{}", b),
            VarValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            VarValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for VarValue {
    fn from(value: &str) -> Self {
        VarValue::Text(value.to_string())
    }
}

impl From<String> for VarValue {
    fn from(value: String) -> Self {
        VarValue::Text(value)
    }
}

impl From<f64> for VarValue {
    fn from(value: f64) -> Self {
        VarValue::Number(value)
    }
}

impl From<i64> for VarValue {
    fn from(value: i64) -> Self {
        VarValue::Number(value as f64)
    }
}

impl From<i32> for VarValue {
    fn from(value: i32) -> Self {
        VarValue::Number(f64::from(value))
    }
}

impl From<bool> for VarValue {
    fn from(value: bool) -> Self {
        VarValue::Bool(value)
    }
}

/// Canvas position, persisted for the editor only.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Kind of media attached to a message node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Document => write!(f, "document"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub reference: String,
    pub kind: MediaKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Text template; doubles as the caption when media is attached.
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaAttachment>,
    /// Seconds to wait after the message is delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionPayload {
    pub expression: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPayload {
    pub action: String,
    #[serde(default)]
    pub params: ActionParams,
}

/// Type-specific node payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    Message(MessagePayload),
    Condition(ConditionPayload),
    Action(ActionPayload),
    End,
}

/// Payload-free discriminant of [`NodeKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Start,
    Message,
    Condition,
    Action,
    End,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeType::Start => "start",
            NodeType::Message => "message",
            NodeType::Condition => "condition",
            NodeType::Action => "action",
            NodeType::End => "end",
        };
        write!(f, "{}", name)
    }
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Start => NodeType::Start,
            NodeKind::Message(_) => NodeType::Message,
            NodeKind::Condition(_) => NodeType::Condition,
            NodeKind::Action(_) => NodeType::Action,
            NodeKind::End => NodeType::End,
        }
    }
}

/// One step in a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub flow_id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub position: Position,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            flow_id: String::new(),
            label: String::new(),
            position: Position::default(),
            kind,
        }
    }

    pub fn start(id: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Start)
    }

    pub fn end(id: impl Into<String>) -> Self {
        Self::new(id, NodeKind::End)
    }

    pub fn message(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeKind::Message(MessagePayload {
                text: text.into(),
                media: None,
                delay_secs: None,
            }),
        )
    }

    pub fn condition(id: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeKind::Condition(ConditionPayload {
                expression: expression.into(),
            }),
        )
    }

    pub fn action(id: impl Into<String>, action: impl Into<String>, params: ActionParams) -> Self {
        Self::new(
            id,
            NodeKind::Action(ActionPayload {
                action: action.into(),
                params,
            }),
        )
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    /// Attach media to a message node. Other node kinds are returned unchanged.
    pub fn with_media(mut self, reference: impl Into<String>, kind: MediaKind) -> Self {
        if let NodeKind::Message(payload) = &mut self.kind {
            payload.media = Some(MediaAttachment {
                reference: reference.into(),
                kind,
            });
        }
        self
    }

    /// Set the post-send delay of a message node. Other node kinds are returned unchanged.
    pub fn with_delay(mut self, seconds: u64) -> Self {
        if let NodeKind::Message(payload) = &mut self.kind {
            payload.delay_secs = Some(seconds);
        }
        self
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }
}

/// A directed edge between two nodes of the same flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    #[serde(default)]
    pub flow_id: String,
    pub source: String,
    pub target: String,
    /// Branch label, `"true"` or `"false"` on edges leaving a condition node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_secs: Option<u64>,
}

impl Connection {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            flow_id: String::new(),
            source: source.into(),
            target: target.into(),
            condition: None,
            delay_secs: None,
        }
    }

    pub fn when(mut self, label: impl Into<String>) -> Self {
        self.condition = Some(label.into());
        self
    }

    pub fn with_delay(mut self, seconds: u64) -> Self {
        self.delay_secs = Some(seconds);
        self
    }
}

/// A user-defined automation: metadata plus the owned node/connection graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub id: String,
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub published: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl Flow {
    /// Create an empty draft flow.
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            name: name.into(),
            published: false,
            version: None,
            created_at: now,
            updated_at: now,
            nodes: Vec::new(),
            connections: Vec::new(),
        }
    }

    pub fn add_node(&mut self, mut node: Node) -> &mut Self {
        node.flow_id = self.id.clone();
        self.nodes.push(node);
        self
    }

    pub fn add_connection(&mut self, mut connection: Connection) -> &mut Self {
        connection.flow_id = self.id.clone();
        self.connections.push(connection);
        self
    }

    /// Add an unlabelled connection with a generated id.
    pub fn connect(&mut self, source: &str, target: &str) -> &mut Self {
        let id = self.next_connection_id();
        self.add_connection(Connection::new(id, source, target))
    }

    /// Add a labelled connection with a generated id.
    pub fn connect_when(&mut self, source: &str, target: &str, label: &str) -> &mut Self {
        let id = self.next_connection_id();
        self.add_connection(Connection::new(id, source, target).when(label))
    }

    fn next_connection_id(&self) -> String {
        format!("c{}", self.connections.len() + 1)
    }

    /// Stamp this flow's id on every node and connection that lacks one.
    pub fn adopt_children(&mut self) {
        for node in &mut self.nodes {
            if node.flow_id.is_empty() {
                node.flow_id = self.id.clone();
            }
        }
        for connection in &mut self.connections {
            if connection.flow_id.is_empty() {
                connection.flow_id = self.id.clone();
            }
        }
    }

    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == node_id)
    }

    /// All connections where `node_id` is the source or the target.
    pub fn connections_for(&self, node_id: &str) -> Vec<&Connection> {
        self.connections
            .iter()
            .filter(|c| c.source == node_id || c.target == node_id)
            .collect()
    }

    /// Outgoing connections of `node_id` in declaration order.
    pub fn outgoing(&self, node_id: &str) -> Vec<&Connection> {
        self.connections
            .iter()
            .filter(|c| c.source == node_id)
            .collect()
    }

    pub fn nodes_of_type(&self, node_type: NodeType) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(move |node| node.node_type() == node_type)
    }

    /// SHA-256 over the canonical JSON of the node and connection sets.
    pub fn content_hash(&self) -> String {
        let bytes = serde_json::to_vec(&(&self.nodes, &self.connections)).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}
