use crate::error::SourceError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Non-breaking space, the field separator used by the source corpus.
pub const NBSP: char = '\u{a0}';

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Block,
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    #[default]
    Normal,
    Bold,
    Unknown,
}

/// One rendered paragraph as emitted by a rendering worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParagraphRecord {
    pub text: String,
    #[serde(default)]
    pub alignment: Alignment,
    /// Left indent in layout units; 0 means no indent.
    #[serde(default)]
    pub left_indent: f64,
    #[serde(default)]
    pub font_weight: FontWeight,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_name: Option<String>,
}

impl ParagraphRecord {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            alignment: Alignment::Left,
            left_indent: 0.0,
            font_weight: FontWeight::Normal,
            style_name: None,
        }
    }

    pub fn centered(text: impl Into<String>) -> Self {
        Self::new(text).with_alignment(Alignment::Center)
    }

    pub fn blank() -> Self {
        Self::new("")
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_indent(mut self, left_indent: f64) -> Self {
        self.left_indent = left_indent;
        self
    }

    pub fn bold(mut self) -> Self {
        self.font_weight = FontWeight::Bold;
        self
    }

    pub fn with_style(mut self, style_name: impl Into<String>) -> Self {
        self.style_name = Some(style_name.into());
        self
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn is_centered(&self) -> bool {
        self.alignment == Alignment::Center
    }

    pub fn is_indented(&self) -> bool {
        self.left_indent > 0.0
    }

    pub fn is_bold(&self) -> bool {
        self.font_weight == FontWeight::Bold
    }
}

/// Result of one pull from a paragraph source.
#[derive(Debug)]
pub enum SourceEvent {
    Record(ParagraphRecord),
    End,
    Error(SourceError),
}

/// Blocking pull interface over the paragraphs of one document.
///
/// Implementations must eventually return exactly one terminal event,
/// either [`SourceEvent::End`] or [`SourceEvent::Error`].
pub trait ParagraphSource {
    fn pull(&mut self) -> SourceEvent;
}

/// In-memory source over already rendered records.
#[derive(Debug, Default)]
pub struct RecordSource {
    records: VecDeque<ParagraphRecord>,
    finished: bool,
}

impl RecordSource {
    pub fn new(records: Vec<ParagraphRecord>) -> Self {
        Self {
            records: records.into(),
            finished: false,
        }
    }
}

impl ParagraphSource for RecordSource {
    fn pull(&mut self) -> SourceEvent {
        match self.records.pop_front() {
            Some(record) => SourceEvent::Record(record),
            None if !self.finished => {
                self.finished = true;
                SourceEvent::End
            }
            None => SourceEvent::Error(SourceError::Protocol(
                "pull after end of document".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_source_terminates_once() {
        let mut source = RecordSource::new(vec![ParagraphRecord::new("a")]);
        assert!(matches!(source.pull(), SourceEvent::Record(r) if r.text == "a"));
        assert!(matches!(source.pull(), SourceEvent::End));
        assert!(matches!(source.pull(), SourceEvent::Error(_)));
    }

    #[test]
    fn record_deserializes_with_defaults() {
        let record: ParagraphRecord = serde_json::from_str(r#"{"text":"TITLE 8"}"#).unwrap();
        assert_eq!(record.alignment, Alignment::Left);
        assert_eq!(record.font_weight, FontWeight::Normal);
        assert!(!record.is_indented());
        assert_eq!(record.style_name, None);
    }
}
