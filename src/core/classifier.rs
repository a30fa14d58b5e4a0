//! Line classifier.
//!
//! A Mealy machine over paragraph records. Each record moves the machine to
//! its next state and yields zero or more [`StructuralSignal`]s. The most
//! recent signal is held back in a one-slot stash so multi-line headings and
//! body continuation lines can still be folded into it; the stash is emitted
//! ahead of whatever the next structural line produces, or by [`finish`].
//!
//! [`finish`]: LineClassifier::finish

use crate::config::{ClassifierConfig, Substitution};
use crate::core::patterns::{
    ends_with_colon, is_anonymous_heading, is_section_line, is_subsection_line, HeadingLine,
    HeadingMatcher,
};
use crate::core::record::ParagraphRecord;
use crate::core::signal::StructuralSignal;
use crate::core::tokenizer::{tokenize_section, tokenize_subsection};
use crate::error::ClassifyError;
use log::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierState {
    Init,
    Idle,
    Heading,
    Section,
    SectionNoteSeen,
    SectionNoteBlank1,
    SectionNoteBlank2,
    Text,
}

impl ClassifierState {
    pub fn as_str(self) -> &'static str {
        match self {
            ClassifierState::Init => "init",
            ClassifierState::Idle => "idle",
            ClassifierState::Heading => "heading",
            ClassifierState::Section => "section",
            ClassifierState::SectionNoteSeen => "sectionNoteSeen",
            ClassifierState::SectionNoteBlank1 => "sectionNoteBlank1",
            ClassifierState::SectionNoteBlank2 => "sectionNoteBlank2",
            ClassifierState::Text => "text",
        }
    }
}

type Step = (ClassifierState, Vec<StructuralSignal>);

#[derive(Debug, Clone)]
pub struct LineClassifier {
    state: ClassifierState,
    last_line_colon: bool,
    stash: Option<StructuralSignal>,
    headings: HeadingMatcher,
    substitutions: Vec<Substitution>,
    text_continuations: Vec<String>,
    note_marker: String,
}

impl LineClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            state: ClassifierState::Init,
            last_line_colon: false,
            stash: None,
            headings: HeadingMatcher::new(&config.level_keywords)?,
            substitutions: config.substitutions.clone(),
            text_continuations: config.text_continuations.clone(),
            note_marker: config.note_marker.clone(),
        })
    }

    pub fn state(&self) -> ClassifierState {
        self.state
    }

    /// Consumes one record, returning the signals that are now complete.
    pub fn feed(&mut self, mut record: ParagraphRecord) -> Result<Vec<StructuralSignal>, ClassifyError> {
        record.text = self.apply_substitutions(&record.text);

        let current = self.state;
        let (next, emitted) = match current {
            // first record is a document banner, never structural
            ClassifierState::Init => (ClassifierState::Idle, Vec::new()),
            ClassifierState::Idle => self.on_idle(&record),
            ClassifierState::Heading => self.on_heading(&record),
            ClassifierState::Section => self.on_section(&record),
            ClassifierState::SectionNoteSeen => self.on_note_seen(&record)?,
            ClassifierState::SectionNoteBlank1 => self.on_note_blank1(&record)?,
            ClassifierState::SectionNoteBlank2 => self.on_note_blank2(&record),
            ClassifierState::Text => self.on_text(&record),
        };

        if current != ClassifierState::Init && !record.is_blank() {
            self.last_line_colon = ends_with_colon(&record.text);
        }
        if next != current {
            debug!("classifier {} -> {}", current.as_str(), next.as_str());
        }
        self.state = next;
        Ok(emitted)
    }

    /// Flushes the stash at end of document.
    pub fn finish(&mut self) -> Vec<StructuralSignal> {
        let mut emitted: Vec<_> = self.stash.take().into_iter().collect();
        emitted.iter_mut().for_each(StructuralSignal::settle_status);
        emitted
    }

    fn apply_substitutions(&self, text: &str) -> String {
        self.substitutions
            .iter()
            .fold(text.to_string(), |acc, s| acc.replace(&s.from, &s.to))
    }

    fn is_text_continuation(&self, record: &ParagraphRecord) -> bool {
        self.text_continuations
            .iter()
            .any(|prefix| record.text.starts_with(prefix.as_str()))
    }

    fn on_idle(&mut self, record: &ParagraphRecord) -> Step {
        if record.is_blank() {
            return (ClassifierState::Idle, Vec::new());
        }
        if record.is_indented() {
            return self.continue_text(record);
        }
        if let Some(step) = self.try_structural(record, true) {
            return step;
        }
        if is_anonymous_heading(record) {
            debug!("ignoring anonymous heading {:?}", record.text);
            return (ClassifierState::Idle, Vec::new());
        }
        if record.is_centered() && !self.last_line_colon {
            return self.subheader(record);
        }
        self.continue_text(record)
    }

    fn on_heading(&mut self, record: &ParagraphRecord) -> Step {
        if record.is_blank() {
            return (ClassifierState::Heading, Vec::new());
        }
        if let Some(step) = self.try_structural(record, true) {
            return step;
        }
        if record.is_centered() {
            return self.subheader(record);
        }
        self.continue_text(record)
    }

    fn on_section(&mut self, record: &ParagraphRecord) -> Step {
        if record.is_blank() {
            return (ClassifierState::Idle, Vec::new());
        }
        if self.is_text_continuation(record) {
            return self.continue_text(record);
        }
        if record.text.contains(self.note_marker.as_str()) {
            debug!("skipping note block {:?}", record.text);
            return (ClassifierState::SectionNoteSeen, Vec::new());
        }
        if let Some(step) = self.try_structural(record, false) {
            return step;
        }
        self.continue_text(record)
    }

    fn on_note_seen(&mut self, record: &ParagraphRecord) -> Result<Step, ClassifyError> {
        if record.is_blank() {
            return Ok((ClassifierState::SectionNoteBlank1, Vec::new()));
        }
        Err(self.malformed_note(record))
    }

    fn on_note_blank1(&mut self, record: &ParagraphRecord) -> Result<Step, ClassifyError> {
        if record.is_blank() {
            return Ok((ClassifierState::SectionNoteBlank2, Vec::new()));
        }
        self.try_structural(record, false)
            .ok_or_else(|| self.malformed_note(record))
    }

    fn on_note_blank2(&mut self, record: &ParagraphRecord) -> Step {
        if record.is_blank() {
            return (ClassifierState::Idle, Vec::new());
        }
        if let Some(step) = self.try_structural(record, false) {
            return step;
        }
        warn!("assuming missed heading after note block: {:?}", record.text);
        match self.headings.parse(&record.text) {
            Some(line) => self.open_heading(line),
            None => self.subheader(record),
        }
    }

    fn on_text(&mut self, record: &ParagraphRecord) -> Step {
        if record.is_blank() || record.is_indented() || self.is_text_continuation(record) {
            return (ClassifierState::Text, self.append_body(record));
        }
        if let Some(step) = self.try_structural(record, true) {
            return step;
        }
        self.continue_text(record)
    }

    /// Section, subsection and (optionally) heading transitions shared by
    /// several states.
    fn try_structural(&mut self, record: &ParagraphRecord, headings: bool) -> Option<Step> {
        if is_section_line(record) {
            let signals = tokenize_section(&record.text);
            return Some((ClassifierState::Section, self.open(signals)));
        }
        if is_subsection_line(record) {
            let signals = tokenize_subsection(&record.text);
            return Some((ClassifierState::Section, self.open(signals)));
        }
        if headings {
            if let Some(line) = self.headings.parse(&record.text) {
                return Some(self.open_heading(line));
            }
        }
        None
    }

    fn open_heading(&mut self, line: HeadingLine) -> Step {
        let mut signal = StructuralSignal::keyword(line.keyword, line.enumerator);
        signal.heading = line.heading;
        (ClassifierState::Heading, self.open(vec![signal]))
    }

    /// Emits the stash followed by all but the last new signal, which
    /// becomes the new stash. Emitted signals are final, so their status is
    /// settled here.
    fn open(&mut self, mut signals: Vec<StructuralSignal>) -> Vec<StructuralSignal> {
        let mut emitted = Vec::with_capacity(signals.len() + 1);
        emitted.extend(self.stash.take());
        self.stash = signals.pop();
        emitted.extend(signals);
        emitted.iter_mut().for_each(StructuralSignal::settle_status);
        emitted
    }

    fn continue_text(&mut self, record: &ParagraphRecord) -> Step {
        (ClassifierState::Text, self.append_body(record))
    }

    fn append_body(&mut self, record: &ParagraphRecord) -> Vec<StructuralSignal> {
        if record.is_blank() {
            return Vec::new();
        }
        match self.stash.as_mut() {
            Some(signal) => signal.append_body(&record.text),
            None => debug!("dropping text before first structural line: {:?}", record.text),
        }
        Vec::new()
    }

    /// Typeless centered line: a subheading of the stashed heading.
    fn subheader(&mut self, record: &ParagraphRecord) -> Step {
        match self.stash.as_mut() {
            Some(signal) if signal.is_heading_level() => signal.append_heading(&record.text),
            _ => warn!("dropping subheader with no open heading: {:?}", record.text),
        }
        (ClassifierState::Heading, Vec::new())
    }

    fn malformed_note(&self, record: &ParagraphRecord) -> ClassifyError {
        ClassifyError::MalformedNoteBlock {
            state: self.state.as_str(),
            line: record.text.clone(),
        }
    }
}
