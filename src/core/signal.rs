use crate::error::AssembleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed, totally ordered set of hierarchy levels. Declaration order is
/// the nesting order; `Subdivision` is only produced by the roman-numeral
/// disambiguation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HierarchyLevel {
    Title,
    Article,
    Part,
    Subpart,
    Section,
    Subsection,
    Paragraph,
    Subparagraph,
    Subsubparagraph,
    Subdivision,
}

impl HierarchyLevel {
    pub const COUNT: usize = 10;

    pub const ALL: [HierarchyLevel; Self::COUNT] = [
        HierarchyLevel::Title,
        HierarchyLevel::Article,
        HierarchyLevel::Part,
        HierarchyLevel::Subpart,
        HierarchyLevel::Section,
        HierarchyLevel::Subsection,
        HierarchyLevel::Paragraph,
        HierarchyLevel::Subparagraph,
        HierarchyLevel::Subsubparagraph,
        HierarchyLevel::Subdivision,
    ];

    pub const TOPMOST: HierarchyLevel = HierarchyLevel::Title;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HierarchyLevel::Title => "title",
            HierarchyLevel::Article => "article",
            HierarchyLevel::Part => "part",
            HierarchyLevel::Subpart => "subpart",
            HierarchyLevel::Section => "section",
            HierarchyLevel::Subsection => "subsection",
            HierarchyLevel::Paragraph => "paragraph",
            HierarchyLevel::Subparagraph => "subparagraph",
            HierarchyLevel::Subsubparagraph => "subsubparagraph",
            HierarchyLevel::Subdivision => "subdivision",
        }
    }

    /// Level name with the first letter upper-cased, used for display names.
    pub fn capitalized(self) -> String {
        let name = self.as_str();
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    pub fn is_above_section(self) -> bool {
        self < HierarchyLevel::Section
    }
}

impl fmt::Display for HierarchyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HierarchyLevel {
    type Err = AssembleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        HierarchyLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == lowered)
            .ok_or_else(|| AssembleError::UnknownStructuralSignal(s.to_string()))
    }
}

/// Level carried by a signal before assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalLevel {
    Resolved(HierarchyLevel),
    /// Raw heading keyword (e.g. `PART`), mapped by name during assembly.
    Keyword(String),
    /// Parenthesised sub-enumerator whose level is inferred from its shape.
    Unresolved,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    None,
    Reserved,
    Repealed,
}

impl Status {
    pub fn as_attr(self) -> Option<&'static str> {
        match self {
            Status::None => None,
            Status::Reserved => Some("reserved"),
            Status::Repealed => Some("repealed"),
        }
    }
}

/// Unit of classifier output describing one node to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralSignal {
    pub level: SignalLevel,
    pub enumerator: Option<String>,
    pub heading: Option<String>,
    pub body: Option<String>,
    pub status: Status,
}

impl StructuralSignal {
    pub fn new(level: SignalLevel) -> Self {
        Self {
            level,
            enumerator: None,
            heading: None,
            body: None,
            status: Status::None,
        }
    }

    pub fn section(enumerator: impl Into<String>) -> Self {
        Self::new(SignalLevel::Resolved(HierarchyLevel::Section)).with_enumerator(enumerator)
    }

    pub fn unresolved(enumerator: impl Into<String>) -> Self {
        Self::new(SignalLevel::Unresolved).with_enumerator(enumerator)
    }

    pub fn keyword(keyword: impl Into<String>, enumerator: impl Into<String>) -> Self {
        Self::new(SignalLevel::Keyword(keyword.into())).with_enumerator(enumerator)
    }

    pub fn with_enumerator(mut self, enumerator: impl Into<String>) -> Self {
        self.enumerator = Some(enumerator.into());
        self
    }

    pub fn with_heading(mut self, heading: impl Into<String>) -> Self {
        self.heading = Some(heading.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// True when the signal opens a node above section level, judged from
    /// its resolved level or its heading keyword.
    pub fn is_heading_level(&self) -> bool {
        match &self.level {
            SignalLevel::Resolved(level) => level.is_above_section(),
            SignalLevel::Keyword(keyword) => keyword
                .parse::<HierarchyLevel>()
                .map(HierarchyLevel::is_above_section)
                .unwrap_or(true),
            SignalLevel::Unresolved => false,
        }
    }

    pub fn append_body(&mut self, text: &str) {
        append_joined(&mut self.body, text);
    }

    pub fn append_heading(&mut self, text: &str) {
        append_joined(&mut self.heading, text);
    }

    /// Turns a body of exactly `Repealed` or `Reserved` (period optional)
    /// into the matching status. Only meaningful once no more continuation
    /// text can be appended.
    pub fn settle_status(&mut self) {
        let status = match self.body.as_deref() {
            Some("Repealed.") | Some("Repealed") => Status::Repealed,
            Some("Reserved.") | Some("Reserved") => Status::Reserved,
            _ => return,
        };
        self.status = status;
        self.body = None;
    }
}

fn append_joined(slot: &mut Option<String>, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    match slot {
        Some(existing) if !existing.is_empty() => {
            existing.push(' ');
            existing.push_str(text);
        }
        _ => *slot = Some(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered_by_nesting() {
        assert!(HierarchyLevel::Title < HierarchyLevel::Article);
        assert!(HierarchyLevel::Subpart < HierarchyLevel::Section);
        assert!(HierarchyLevel::Subsubparagraph < HierarchyLevel::Subdivision);
        for (i, level) in HierarchyLevel::ALL.iter().enumerate() {
            assert_eq!(level.index(), i);
        }
    }

    #[test]
    fn level_names_round_trip_through_from_str() {
        for level in HierarchyLevel::ALL {
            assert_eq!(level.as_str().parse::<HierarchyLevel>().unwrap(), level);
        }
        assert_eq!("PART".parse::<HierarchyLevel>().unwrap(), HierarchyLevel::Part);
        assert!(matches!(
            "chapter".parse::<HierarchyLevel>(),
            Err(AssembleError::UnknownStructuralSignal(_))
        ));
    }

    #[test]
    fn settled_status_bodies_are_cleared() {
        let mut repealed = StructuralSignal::unresolved("3").with_body("Repealed.");
        repealed.settle_status();
        assert_eq!(repealed.status, Status::Repealed);
        assert_eq!(repealed.body, None);

        let mut cited = StructuralSignal::unresolved("3").with_body("Repealed. by L. 2004");
        cited.settle_status();
        assert_eq!(cited.status, Status::None);
        assert_eq!(cited.body.as_deref(), Some("Repealed. by L. 2004"));
    }

    #[test]
    fn capitalized_names() {
        assert_eq!(HierarchyLevel::Subsubparagraph.capitalized(), "Subsubparagraph");
        assert_eq!(HierarchyLevel::Title.capitalized(), "Title");
    }

    #[test]
    fn append_body_joins_with_single_space() {
        let mut signal = StructuralSignal::section("1-1-101");
        signal.append_body("  first ");
        signal.append_body("");
        signal.append_body("second");
        assert_eq!(signal.body.as_deref(), Some("first second"));
    }
}
