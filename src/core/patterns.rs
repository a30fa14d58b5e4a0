//! Lexical and typographic line tests.
//!
//! These heuristics are tuned to one document family and must keep their
//! exact shape; the classifier only decides what to do with the answers.

use crate::core::record::{ParagraphRecord, NBSP};
use regex::Regex;

const ANONYMOUS_MARKERS: [&str; 4] = ["A.", "B.", "C.", "D."];

/// `8-1-101.\u{a0}Short title.` style lines.
pub fn is_section_line(record: &ParagraphRecord) -> bool {
    let text = record.text.as_str();
    if text.is_empty() || record.is_centered() {
        return false;
    }
    if !text.contains(".\u{a0}") || !text.starts_with(|c: char| c.is_ascii_digit()) {
        return false;
    }
    match text.find('-') {
        Some(pos) => text[..pos].chars().last().is_some_and(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// `(2)\u{a0}Text` style lines.
pub fn is_subsection_line(record: &ParagraphRecord) -> bool {
    let text = record.text.as_str();
    if text.is_empty() || record.is_centered() {
        return false;
    }
    if !text.contains(NBSP) || !text.starts_with('(') {
        return false;
    }
    match text.find(')') {
        Some(pos) => !text[..pos].contains([' ', '_', NBSP]),
        None => false,
    }
}

/// Centered bold lines and centered `A.`-`D.` lines look like headings but
/// never open one.
pub fn is_anonymous_heading(record: &ParagraphRecord) -> bool {
    record.is_centered()
        && (record.is_bold()
            || ANONYMOUS_MARKERS
                .iter()
                .any(|marker| record.text.starts_with(marker)))
}

pub fn ends_with_colon(text: &str) -> bool {
    text.trim_end().ends_with(':')
}

/// A heading line split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingLine {
    pub keyword: String,
    pub enumerator: String,
    pub heading: Option<String>,
}

/// Matches `KEYWORD <alnum>...` lines for the configured keyword vocabulary.
#[derive(Debug, Clone)]
pub struct HeadingMatcher {
    pattern: Regex,
}

impl HeadingMatcher {
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Result<Self, regex::Error> {
        let mut keywords: Vec<&str> = keywords
            .iter()
            .map(|k| k.as_ref().trim())
            .filter(|k| !k.is_empty())
            .collect();
        // longest first so the alternation never stops at a shorter prefix
        keywords.sort_by_key(|k| std::cmp::Reverse(k.len()));
        let alternation = keywords
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!(r"^({}) ([[:alnum:]].*)$", alternation))?;
        Ok(Self { pattern })
    }

    pub fn is_match(&self, text: &str) -> bool {
        !text.trim_end().ends_with('.') && self.pattern.is_match(text)
    }

    pub fn parse(&self, text: &str) -> Option<HeadingLine> {
        if text.trim_end().ends_with('.') {
            return None;
        }
        let caps = self.pattern.captures(text)?;
        let keyword = caps.get(1)?.as_str().to_string();
        let rest = caps.get(2)?.as_str().trim();
        let (enumerator, remainder) = match rest.find(|c: char| c.is_whitespace()) {
            Some(pos) => (&rest[..pos], rest[pos..].trim()),
            None => (rest, ""),
        };
        Some(HeadingLine {
            keyword,
            enumerator: enumerator.to_string(),
            heading: (!remainder.is_empty()).then(|| remainder.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::Alignment;
    use rstest::rstest;

    fn matcher() -> HeadingMatcher {
        HeadingMatcher::new(&["TITLE", "ARTICLE", "PART", "SUBPART"]).unwrap()
    }

    #[rstest]
    #[case("8-1-101.\u{a0}\u{a0}Short title.\u{a0}\u{a0}This title...", true)]
    #[case("14-5-609.\u{a0}Definitions.", true)]
    #[case("8-1-101. Short title.", false)] // plain spaces
    #[case("Part 8-1.\u{a0}Text", false)] // does not start with a digit
    #[case("8a-1.\u{a0}Text", false)] // hyphen preceded by a letter
    #[case("1.\u{a0}Text without hyphen", false)]
    #[case("", false)]
    fn section_pattern(#[case] text: &str, #[case] expected: bool) {
        assert_eq!(is_section_line(&ParagraphRecord::new(text)), expected);
    }

    #[test]
    fn centered_section_line_is_not_a_section() {
        let record = ParagraphRecord::centered("8-1-101.\u{a0}Short title.");
        assert!(!is_section_line(&record));
    }

    #[rstest]
    #[case("(1)\u{a0}The department shall", true)]
    #[case("(a) to (c)\u{a0}text", true)]
    #[case("(iv)\u{a0}text", true)]
    #[case("(a) The department", false)] // no NBSP
    #[case("(Effective\u{a0}July 1)\u{a0}text", false)] // NBSP before `)`
    #[case("(see rule) text\u{a0}x", false)] // space before `)`
    #[case("(a_1)\u{a0}x", false)]
    #[case("(1\u{a0}text", false)] // no `)`
    #[case("1)\u{a0}text", false)]
    fn subsection_pattern(#[case] text: &str, #[case] expected: bool) {
        assert_eq!(is_subsection_line(&ParagraphRecord::new(text)), expected);
    }

    #[rstest]
    #[case("TITLE 8", true)]
    #[case("PART 1 GENERAL PROVISIONS", true)]
    #[case("SUBPART A", true)]
    #[case("ARTICLE IV", true)]
    #[case("PART 1.", false)]
    #[case("PARTIAL 1", false)]
    #[case("PART  1", false)]
    #[case("Part 1", false)]
    #[case("CHAPTER 1", false)]
    fn heading_pattern(#[case] text: &str, #[case] expected: bool) {
        assert_eq!(matcher().is_match(text), expected);
    }

    #[test]
    fn heading_parse_splits_enumerator_and_text() {
        let line = matcher().parse("PART 1 GENERAL PROVISIONS").unwrap();
        assert_eq!(line.keyword, "PART");
        assert_eq!(line.enumerator, "1");
        assert_eq!(line.heading.as_deref(), Some("GENERAL PROVISIONS"));

        let line = matcher().parse("SUBPART B").unwrap();
        assert_eq!(line.keyword, "SUBPART");
        assert_eq!(line.enumerator, "B");
        assert_eq!(line.heading, None);
    }

    #[test]
    fn anonymous_heading_requires_centering() {
        assert!(is_anonymous_heading(&ParagraphRecord::centered("GENERAL").bold()));
        assert!(is_anonymous_heading(&ParagraphRecord::centered("A. Scope")));
        assert!(!is_anonymous_heading(&ParagraphRecord::centered("GENERAL")));
        assert!(!is_anonymous_heading(
            &ParagraphRecord::new("A. Scope").with_alignment(Alignment::Left)
        ));
    }
}
