//! Tree assembler.
//!
//! Nodes live in an arena while the document streams in; the current path
//! is a fixed array of arena indices, one slot per hierarchy level. The
//! arena is folded into an owned [`Node`] tree once the stream ends.

use crate::config::{AssemblerConfig, RomanRule};
use crate::core::layout::Node;
use crate::core::signal::{HierarchyLevel, SignalLevel, Status, StructuralSignal};
use crate::error::AssembleError;
use log::{debug, warn};

// 临时节点，children 保存 arena 下标
#[derive(Debug)]
struct TempNode {
    level: HierarchyLevel,
    id: String,
    enumerator: Option<String>,
    heading: Option<String>,
    body: Option<String>,
    status: Status,
    children: Vec<usize>,
}

/// Result of assembling one document.
#[derive(Debug)]
pub struct AssembledDocument {
    /// Outermost node still open when the stream ended.
    pub root: Option<Node>,
    pub nodes_built: usize,
    /// Nodes created with no open ancestor; built but unreachable from `root`.
    pub orphans: usize,
}

pub struct TreeAssembler {
    arena: Vec<Option<TempNode>>,
    current_path: [Option<usize>; HierarchyLevel::COUNT],
    roman_rules: Vec<RomanRule>,
    orphans: usize,
}

impl TreeAssembler {
    pub fn new(config: &AssemblerConfig) -> Self {
        Self {
            arena: Vec::new(),
            current_path: [None; HierarchyLevel::COUNT],
            roman_rules: config.roman_rules.clone(),
            orphans: 0,
        }
    }

    /// Levels that currently have an open node, top-down.
    pub fn open_levels(&self) -> Vec<HierarchyLevel> {
        HierarchyLevel::ALL
            .into_iter()
            .filter(|level| self.current_path[level.index()].is_some())
            .collect()
    }

    /// Id of the node open at `level`, if any.
    pub fn open_id(&self, level: HierarchyLevel) -> Option<&str> {
        self.current_path[level.index()]
            .and_then(|idx| self.temp(idx))
            .map(|node| node.id.as_str())
    }

    /// Creates the node described by `signal` and makes it the tail of the
    /// current path at its level.
    pub fn push(&mut self, signal: StructuralSignal) -> Result<(), AssembleError> {
        let level = self.resolve_level(&signal)?;
        let parent = self.nearest_open_above(level);
        let id = self.compute_id(level, signal.enumerator.as_deref(), parent)?;

        let idx = self.arena.len();
        self.arena.push(Some(TempNode {
            level,
            id,
            enumerator: signal.enumerator,
            heading: signal.heading,
            body: signal.body,
            status: signal.status,
            children: Vec::new(),
        }));

        match parent {
            Some(parent_idx) => {
                if let Some(parent_node) = self.arena[parent_idx].as_mut() {
                    parent_node.children.push(idx);
                }
            }
            None if level == HierarchyLevel::TOPMOST => {
                if let Some(previous) = self.open_id(level) {
                    warn!("root {} superseded by a new {}", previous, level);
                }
            }
            None => {
                self.orphans += 1;
                warn!(
                    "orphan node {}: no open ancestor above {}",
                    self.temp(idx).map(|n| n.id.as_str()).unwrap_or_default(),
                    level
                );
            }
        }

        self.current_path[level.index()] = Some(idx);
        for slot in &mut self.current_path[level.index() + 1..] {
            *slot = None;
        }
        Ok(())
    }

    /// Returns the outermost open node as the document root.
    pub fn finish(mut self) -> AssembledDocument {
        let nodes_built = self.arena.len();
        let root = self
            .current_path
            .iter()
            .flatten()
            .next()
            .copied()
            .and_then(|idx| self.convert_to_final(idx));
        debug!("assembled {} nodes ({} orphans)", nodes_built, self.orphans);
        AssembledDocument {
            root,
            nodes_built,
            orphans: self.orphans,
        }
    }

    fn temp(&self, idx: usize) -> Option<&TempNode> {
        self.arena.get(idx).and_then(Option::as_ref)
    }

    fn resolve_level(&self, signal: &StructuralSignal) -> Result<HierarchyLevel, AssembleError> {
        match &signal.level {
            SignalLevel::Resolved(level) => Ok(*level),
            SignalLevel::Keyword(keyword) => keyword.parse(),
            SignalLevel::Unresolved => Ok(self.infer_level(signal.enumerator.as_deref().unwrap_or(""))),
        }
    }

    /// Infers the level of a parenthesised enumerator from its shape.
    fn infer_level(&self, enumerator: &str) -> HierarchyLevel {
        // ranges ("a to c") are judged by their first label
        let label = enumerator.split_whitespace().next().unwrap_or("");

        if !label.is_empty() && label.chars().all(|c| c.is_ascii_digit()) {
            return HierarchyLevel::Subsection;
        }
        if label.chars().any(char::is_alphabetic) && !label.chars().any(char::is_uppercase) {
            return HierarchyLevel::Paragraph;
        }
        if !label.contains(['I', 'V', 'X']) {
            return HierarchyLevel::Subsubparagraph;
        }

        let previous = self.current_path[HierarchyLevel::Subsubparagraph.index()]
            .and_then(|idx| self.temp(idx))
            .and_then(|node| node.enumerator.as_deref())
            .and_then(|e| e.chars().next());
        self.roman_rules
            .iter()
            .find(|rule| rule.label == label && previous == Some(rule.after))
            .map(|rule| rule.level)
            .unwrap_or(HierarchyLevel::Subparagraph)
    }

    fn nearest_open_above(&self, level: HierarchyLevel) -> Option<usize> {
        self.current_path[..level.index()]
            .iter()
            .rev()
            .flatten()
            .next()
            .copied()
    }

    /// Outermost open node above section level; sections are identified
    /// relative to it whatever their typographic parent.
    fn super_parent(&self) -> Option<usize> {
        self.current_path[..HierarchyLevel::Section.index()]
            .iter()
            .flatten()
            .next()
            .copied()
    }

    fn compute_id(
        &self,
        level: HierarchyLevel,
        enumerator: Option<&str>,
        parent: Option<usize>,
    ) -> Result<String, AssembleError> {
        let named = match enumerator {
            Some(e) => format!("{}-{}", level, e),
            None => level.to_string(),
        };

        if level == HierarchyLevel::Section {
            let root = self
                .super_parent()
                .and_then(|idx| self.temp(idx))
                .ok_or_else(|| AssembleError::MissingSuperParent {
                    enumerator: enumerator.unwrap_or_default().to_string(),
                })?;
            return Ok(format!("{}/{}", root.id, named));
        }

        let Some(parent) = parent.and_then(|idx| self.temp(idx)) else {
            return Ok(format!("/{}", named));
        };
        if level.is_above_section() {
            Ok(format!("{}/{}", parent.id, named))
        } else {
            let segment = enumerator.map(str::to_string).unwrap_or(named);
            Ok(format!("{}/{}", parent.id, segment))
        }
    }

    fn convert_to_final(&mut self, idx: usize) -> Option<Node> {
        let temp = self.arena.get_mut(idx)?.take()?;
        let mut node = Node::new(
            temp.level,
            temp.id,
            temp.enumerator,
            temp.heading,
            temp.body,
            temp.status,
        );
        for child_idx in temp.children {
            if let Some(child) = self.convert_to_final(child_idx) {
                node.push_child(child);
            }
        }
        Some(node)
    }
}
