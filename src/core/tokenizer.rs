//! Splits section and subsection lines into signals.
//!
//! Fields are separated by non-breaking spaces. A section line carries
//! `enumerator`, `heading` and body tokens; any token shaped like `(x)`
//! opens a nested sub-enumerator signal that collects the tokens after it.

use crate::core::record::NBSP;
use crate::core::signal::{Status, StructuralSignal};

const REPEALED_MARKER: &str = "(Repealed)";
const DELETED_PREFIX: &str = "(Deleted";
const RANGE_WORDS: [&str; 2] = ["to", "and"];

fn split_fields(text: &str) -> Vec<&str> {
    text.split(NBSP)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}

fn strip_trailing_period(s: &str) -> &str {
    s.strip_suffix('.').unwrap_or(s).trim_end()
}

/// Tokenizes a line that matched the section pattern.
pub fn tokenize_section(text: &str) -> Vec<StructuralSignal> {
    let fields = split_fields(text);
    let Some((first, rest)) = fields.split_first() else {
        return Vec::new();
    };

    let mut section = StructuralSignal::section(strip_trailing_period(first));
    let mut body_fields = rest;
    if let Some((heading, tail)) = rest.split_first() {
        let (heading, status) = parse_heading(heading);
        section.heading = heading;
        section.status = status;
        body_fields = tail;
    }

    let mut signals = vec![section];
    collect_fields(&mut signals, body_fields);
    signals
}

/// Tokenizes a line that matched the subsection pattern. Everything after
/// the leading enumerator is body text.
pub fn tokenize_subsection(text: &str) -> Vec<StructuralSignal> {
    let fields = split_fields(text);
    let Some((first, rest)) = fields.split_first() else {
        return Vec::new();
    };

    let mut signals = Vec::new();
    match parse_sub_enumerator(first) {
        Some(sub) => push_sub_enumerator(&mut signals, sub),
        // pattern guarantees a `(x)` prefix, keep the raw token as a label otherwise
        None => signals.push(StructuralSignal::unresolved(strip_trailing_period(first))),
    }
    collect_fields(&mut signals, rest);
    signals
}

fn parse_heading(field: &str) -> (Option<String>, Status) {
    let mut heading = field.trim();
    let mut status = Status::None;
    if let Some(stripped) = heading.strip_suffix(REPEALED_MARKER) {
        heading = stripped.trim_end();
        status = Status::Repealed;
    }
    let heading = strip_trailing_period(heading);
    ((!heading.is_empty()).then(|| heading.to_string()), status)
}

fn collect_fields(signals: &mut Vec<StructuralSignal>, fields: &[&str]) {
    for field in fields {
        if is_deleted_marker(field) {
            if let Some(current) = signals.last_mut() {
                current.status = Status::Repealed;
            }
            continue;
        }
        if is_sub_enumerator(field) {
            if let Some(sub) = parse_sub_enumerator(field) {
                push_sub_enumerator(signals, sub);
                continue;
            }
        }
        if let Some(current) = signals.last_mut() {
            current.append_body(field);
        }
    }
}

/// Pushes one signal per enumerator found at the start of the field, the
/// last one taking the remaining text as body.
fn push_sub_enumerator(signals: &mut Vec<StructuralSignal>, first: SubEnumerator<'_>) {
    let mut next = Some(first);
    while let Some(sub) = next.take() {
        signals.push(StructuralSignal::unresolved(sub.label));
        let rest = sub.rest.trim();
        if rest.is_empty() {
            break;
        }
        if rest.starts_with('(') && !is_deleted_marker(rest) {
            if let Some(nested) = parse_sub_enumerator(rest) {
                next = Some(nested);
                continue;
            }
        }
        if is_deleted_marker(rest) {
            if let Some(current) = signals.last_mut() {
                current.status = Status::Repealed;
            }
        } else if let Some(current) = signals.last_mut() {
            current.append_body(rest);
        }
    }
}

fn is_deleted_marker(field: &str) -> bool {
    field.starts_with(DELETED_PREFIX) && field.ends_with(')')
}

/// A field that starts with `(` or ends with `)` (but not `.)`) and is at
/// least three characters long.
pub fn is_sub_enumerator(field: &str) -> bool {
    if field.chars().count() < 3 {
        return false;
    }
    if field.ends_with(".)") {
        return false;
    }
    field.starts_with('(') || field.ends_with(')')
}

#[derive(Debug, PartialEq, Eq)]
struct SubEnumerator<'a> {
    label: String,
    rest: &'a str,
}

fn is_label(s: &str) -> bool {
    !s.is_empty() && !s.contains(|c: char| c.is_whitespace() || c == '_')
}

/// Parses `(a)`, `(a) to (c)`, `(a) and (c)` or `a)` at the start of
/// `field`, returning the label and whatever text follows.
fn parse_sub_enumerator(field: &str) -> Option<SubEnumerator<'_>> {
    let Some(inner_start) = field.strip_prefix('(') else {
        let label = field.strip_suffix(')')?;
        return is_label(label).then(|| SubEnumerator {
            label: label.to_string(),
            rest: "",
        });
    };

    let close = inner_start.find(')')?;
    let first = &inner_start[..close];
    if !is_label(first) {
        return None;
    }
    let after = inner_start[close + 1..].trim_start();

    for word in RANGE_WORDS {
        let Some(tail) = after.strip_prefix(word) else {
            continue;
        };
        let Some(second_start) = tail.trim_start().strip_prefix('(') else {
            continue;
        };
        if !tail.starts_with(char::is_whitespace) {
            continue;
        }
        let Some(close) = second_start.find(')') else {
            continue;
        };
        let second = &second_start[..close];
        if is_label(second) {
            return Some(SubEnumerator {
                label: format!("{} {} {}", first, word, second),
                rest: second_start[close + 1..].trim_start(),
            });
        }
    }

    Some(SubEnumerator {
        label: first.to_string(),
        rest: after,
    })
}
