use crate::core::signal::{HierarchyLevel, Status};
use serde::Serialize;

/// One element of the assembled legal-document tree.
///
/// Everything except `children` is fixed when the node is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    level: HierarchyLevel,
    display_name: String,
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    enumerator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    heading: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    #[serde(skip_serializing_if = "is_no_status")]
    status: Status,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<Node>,
}

fn is_no_status(status: &Status) -> bool {
    *status == Status::None
}

impl Node {
    pub fn new(
        level: HierarchyLevel,
        id: String,
        enumerator: Option<String>,
        heading: Option<String>,
        body: Option<String>,
        status: Status,
    ) -> Self {
        let display_name = match &enumerator {
            Some(e) => format!("{} {}", level.capitalized(), e),
            None => level.capitalized(),
        };
        Self {
            level,
            display_name,
            id,
            enumerator,
            heading,
            body,
            status,
            children: Vec::new(),
        }
    }

    pub fn level(&self) -> HierarchyLevel {
        self.level
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn enumerator(&self) -> Option<&str> {
        self.enumerator.as_deref()
    }

    pub fn heading(&self) -> Option<&str> {
        self.heading.as_deref()
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub(crate) fn push_child(&mut self, child: Node) {
        self.children.push(child);
    }

    /// Depth-first, pre-order traversal including `self`.
    pub fn iter(&self) -> NodeIter<'_> {
        NodeIter { stack: vec![self] }
    }

    pub fn find(&self, id: &str) -> Option<&Node> {
        self.iter().find(|node| node.id == id)
    }

    pub fn node_count(&self) -> usize {
        self.iter().count()
    }
}

pub struct NodeIter<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for NodeIter<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Run-level information attached to the synthetic root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    pub sources: Vec<String>,
}

/// Synthetic root holding one tree per input document, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentTree {
    pub metadata: DocumentMetadata,
    pub documents: Vec<Node>,
}

impl DocumentTree {
    pub fn new(metadata: DocumentMetadata) -> Self {
        Self {
            metadata,
            documents: Vec::new(),
        }
    }

    pub fn push_document(&mut self, root: Node) {
        self.documents.push(root);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.documents.iter().flat_map(Node::iter)
    }

    pub fn find(&self, id: &str) -> Option<&Node> {
        self.iter().find(|node| node.id() == id)
    }
}
