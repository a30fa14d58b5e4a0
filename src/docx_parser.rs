// src/docx_parser.rs
//! In-process rendering of `.docx` files into paragraph records.

use crate::core::record::{Alignment, FontWeight, ParagraphRecord};
use crate::error::SourceError;
use crate::utils::mmap_reader::MmapFileReader;
use log::debug;
use roxmltree::{Document, Node};
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use zip::ZipArchive;

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// Files above this size are memory mapped instead of read into memory.
const MMAP_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Twentieths of a point per point.
const TWIPS_PER_POINT: f64 = 20.0;

#[derive(Debug, Clone)]
struct StyleDefinition {
    name: String,
    based_on: Option<String>,
    paragraph_props: ParagraphProperties,
    run_props: RunProperties,
}

#[derive(Debug, Clone, Default)]
struct ParagraphProperties {
    style: Option<String>,
    alignment: Option<Alignment>,
    left_indent: Option<f64>,
}

#[derive(Debug, Clone, Default)]
struct RunProperties {
    bold: Option<bool>,
}

/// Renders `.docx` packages into [`ParagraphRecord`]s, one per body paragraph.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocxRenderer;

impl DocxRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Renders the document at `path`.
    pub fn render(&self, path: &Path) -> Result<Vec<ParagraphRecord>, SourceError> {
        self.render_cancellable(path, &CancellationToken::new())
    }

    /// Renders the document at `path`, giving up with
    /// [`SourceError::Cancelled`] once `token` is cancelled.
    pub fn render_cancellable(
        &self,
        path: &Path,
        token: &CancellationToken,
    ) -> Result<Vec<ParagraphRecord>, SourceError> {
        if token.is_cancelled() {
            return Err(SourceError::Cancelled);
        }
        let render_error = |e: anyhow::Error| {
            if token.is_cancelled() {
                SourceError::Cancelled
            } else {
                SourceError::Render {
                    path: path.to_path_buf(),
                    reason: format!("{:#}", e),
                }
            }
        };

        let file_size = std::fs::metadata(path)?.len();
        if file_size > MMAP_THRESHOLD {
            debug!("memory mapping {} ({} bytes)", path.display(), file_size);
            let mmap = MmapFileReader::new(path)?;
            parse_archive(Cursor::new(mmap), token).map_err(render_error)
        } else {
            let bytes = std::fs::read(path)?;
            parse_archive(Cursor::new(bytes), token).map_err(render_error)
        }
    }

    /// Renders a package already held in memory.
    pub fn render_bytes(&self, bytes: &[u8]) -> anyhow::Result<Vec<ParagraphRecord>> {
        parse_archive(Cursor::new(bytes), &CancellationToken::new())
    }
}

fn parse_archive<R: Read + Seek>(reader: R, token: &CancellationToken) -> anyhow::Result<Vec<ParagraphRecord>> {
    let mut archive = ZipArchive::new(reader)?;

    let mut styles = StyleSheet::default();
    let mut styles_xml = String::new();
    if let Ok(mut file) = archive.by_name("word/styles.xml") {
        file.read_to_string(&mut styles_xml)?;
        styles.parse_styles_xml(&styles_xml)?;
    }

    let mut doc_xml = String::new();
    archive.by_name("word/document.xml")?.read_to_string(&mut doc_xml)?;
    let doc = Document::parse(&doc_xml)?;

    let mut records = Vec::new();
    for para in doc
        .root_element()
        .descendants()
        .filter(|node| node.has_tag_name((W_NS, "p")))
        .filter(|node| !is_nested_paragraph(node))
    {
        if token.is_cancelled() {
            anyhow::bail!("rendering cancelled after {} paragraphs", records.len());
        }
        records.push(styles.parse_paragraph(&para));
    }
    debug!("rendered {} paragraphs", records.len());
    Ok(records)
}

/// Style definitions of one package, keyed by style id.
#[derive(Debug, Default)]
struct StyleSheet {
    styles: HashMap<String, StyleDefinition>,
}

impl StyleSheet {
    fn parse_styles_xml(&mut self, xml: &str) -> anyhow::Result<()> {
        let doc = Document::parse(xml)?;
        let root = doc.root_element();

        for style_node in root.children().filter(|n| n.has_tag_name((W_NS, "style"))) {
            let Some(style_id) = style_node.attribute((W_NS, "styleId")) else {
                continue;
            };
            let name = child(&style_node, "name")
                .and_then(|n| n.attribute((W_NS, "val")))
                .unwrap_or(style_id);
            let based_on = child(&style_node, "basedOn").and_then(|n| n.attribute((W_NS, "val")));

            let paragraph_props = child(&style_node, "pPr")
                .map(|ppr| parse_paragraph_properties(&ppr))
                .unwrap_or_default();
            let run_props = child(&style_node, "rPr")
                .map(|rpr| parse_run_properties(&rpr))
                .unwrap_or_default();

            self.styles.insert(
                style_id.to_string(),
                StyleDefinition {
                    name: name.to_string(),
                    based_on: based_on.map(str::to_string),
                    paragraph_props,
                    run_props,
                },
            );
        }
        Ok(())
    }

    fn resolve_style(&self, style_id: &str) -> Option<StyleDefinition> {
        let mut current_style_id = style_id;
        let mut chain: Vec<&str> = Vec::new();

        while let Some(style_def) = self.styles.get(current_style_id) {
            if chain.contains(&current_style_id) {
                break;
            }
            chain.push(current_style_id);
            match &style_def.based_on {
                Some(base) => current_style_id = base.as_str(),
                None => break,
            }
        }

        let requested = self.styles.get(*chain.first()?)?;
        Some(self.apply_inherited_properties(requested, &chain))
    }

    fn apply_inherited_properties(&self, style_def: &StyleDefinition, chain: &[&str]) -> StyleDefinition {
        let mut final_style = style_def.clone();

        // nearest ancestor first, so closer styles take precedence
        for &style_id in chain.iter().skip(1) {
            let Some(inherited) = self.styles.get(style_id) else {
                continue;
            };
            let props = &mut final_style.paragraph_props;
            if props.alignment.is_none() {
                props.alignment = inherited.paragraph_props.alignment;
            }
            if props.left_indent.is_none() {
                props.left_indent = inherited.paragraph_props.left_indent;
            }
            if final_style.run_props.bold.is_none() {
                final_style.run_props.bold = inherited.run_props.bold;
            }
        }

        final_style
    }

    fn parse_paragraph(&self, para: &Node) -> ParagraphRecord {
        let own_props = child(para, "pPr")
            .map(|ppr| parse_paragraph_properties(&ppr))
            .unwrap_or_default();
        let style = own_props
            .style
            .as_deref()
            .and_then(|id| self.resolve_style(id));
        let style_props = style.as_ref().map(|s| &s.paragraph_props);

        let alignment = own_props
            .alignment
            .or_else(|| style_props.and_then(|p| p.alignment))
            .unwrap_or_default();
        let left_indent = own_props
            .left_indent
            .or_else(|| style_props.and_then(|p| p.left_indent))
            .unwrap_or(0.0);
        let style_bold = style.as_ref().and_then(|s| s.run_props.bold).unwrap_or(false);

        let mut text = String::new();
        let mut text_runs = 0usize;
        let mut bold_runs = 0usize;
        for run in para
            .descendants()
            .filter(|n| n.has_tag_name((W_NS, "r")))
            .filter(|n| !is_nested_paragraph_content(n, para))
        {
            let run_text = extract_run_text(&run);
            if run_text.is_empty() {
                continue;
            }
            text_runs += 1;
            let bold = child(&run, "rPr")
                .and_then(|rpr| parse_run_properties(&rpr).bold)
                .unwrap_or(style_bold);
            if bold {
                bold_runs += 1;
            }
            text.push_str(&run_text);
        }

        let font_weight = if text_runs > 0 && bold_runs == text_runs {
            FontWeight::Bold
        } else {
            FontWeight::Normal
        };

        ParagraphRecord {
            text: text.replace(['\r', '\n'], ""),
            alignment,
            left_indent,
            font_weight,
            style_name: style.map(|s| s.name),
        }
    }
}

fn child<'a, 'input: 'a>(node: &Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name((W_NS, name)))
}

fn is_nested_paragraph(node: &Node) -> bool {
    node.ancestors().skip(1).any(|a| a.has_tag_name((W_NS, "p")))
}

/// True when `run` sits inside a paragraph nested below `para` (text boxes).
fn is_nested_paragraph_content(run: &Node, para: &Node) -> bool {
    run.ancestors()
        .take_while(|a| a != para)
        .any(|a| a.has_tag_name((W_NS, "p")))
}

fn extract_run_text(run: &Node) -> String {
    let mut text = String::new();
    for node in run.children() {
        if node.has_tag_name((W_NS, "t")) {
            text.push_str(node.text().unwrap_or_default());
        } else if node.has_tag_name((W_NS, "tab")) {
            text.push('\t');
        }
    }
    text
}

fn parse_alignment(val: &str) -> Alignment {
    match val {
        "left" | "start" => Alignment::Left,
        "center" => Alignment::Center,
        "both" | "distribute" => Alignment::Block,
        _ => Alignment::Unknown,
    }
}

fn parse_paragraph_properties(ppr: &Node) -> ParagraphProperties {
    let mut props = ParagraphProperties::default();

    for node in ppr.children() {
        match node.tag_name().name() {
            "pStyle" => props.style = node.attribute((W_NS, "val")).map(str::to_string),
            "jc" => props.alignment = node.attribute((W_NS, "val")).map(parse_alignment),
            "ind" => {
                props.left_indent = node
                    .attribute((W_NS, "left"))
                    .or_else(|| node.attribute((W_NS, "start")))
                    .and_then(|v| v.parse::<f64>().ok())
                    .map(|twips| twips / TWIPS_PER_POINT);
            }
            _ => {}
        }
    }
    props
}

fn parse_run_properties(rpr: &Node) -> RunProperties {
    let bold = child(rpr, "b").map(|b| {
        !matches!(b.attribute((W_NS, "val")), Some("0") | Some("false") | Some("off"))
    });
    RunProperties { bold }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    const DOC_HEAD: &str = r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#;
    const DOC_TAIL: &str = "</w:body></w:document>";

    fn package(body: &str, styles: Option<&str>) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("word/document.xml", FileOptions::default()).unwrap();
        zip.write_all(format!("{}{}{}", DOC_HEAD, body, DOC_TAIL).as_bytes()).unwrap();
        if let Some(styles) = styles {
            zip.start_file("word/styles.xml", FileOptions::default()).unwrap();
            zip.write_all(styles.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn paragraph_properties_map_to_record() {
        let body = concat!(
            r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:rPr><w:b/></w:rPr><w:t>TITLE 8</w:t></w:r></w:p>"#,
            r#"<w:p/>"#,
            r#"<w:p><w:pPr><w:jc w:val="both"/><w:ind w:left="720"/></w:pPr><w:r><w:t xml:space="preserve">(1) </w:t></w:r><w:r><w:t>Text</w:t></w:r></w:p>"#,
        );
        let records = DocxRenderer::new().render_bytes(&package(body, None)).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].text, "TITLE 8");
        assert_eq!(records[0].alignment, Alignment::Center);
        assert_eq!(records[0].font_weight, FontWeight::Bold);
        assert!(records[1].is_blank());
        assert_eq!(records[2].text, "(1) Text");
        assert_eq!(records[2].alignment, Alignment::Block);
        assert_eq!(records[2].left_indent, 36.0);
        assert_eq!(records[2].font_weight, FontWeight::Normal);
    }

    #[test]
    fn style_inheritance_supplies_missing_properties() {
        let styles = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:style w:styleId="Base"><w:name w:val="Base"/><w:pPr><w:jc w:val="center"/></w:pPr><w:rPr><w:b/></w:rPr></w:style>
  <w:style w:styleId="Heading"><w:name w:val="Statute Heading"/><w:basedOn w:val="Base"/><w:pPr><w:ind w:start="360"/></w:pPr></w:style>
  <w:style w:styleId="Loop"><w:name w:val="Loop"/><w:basedOn w:val="Loop"/></w:style>
</w:styles>"#;
        let body = concat!(
            r#"<w:p><w:pPr><w:pStyle w:val="Heading"/></w:pPr><w:r><w:t>PART 1</w:t></w:r></w:p>"#,
            r#"<w:p><w:pPr><w:pStyle w:val="Loop"/></w:pPr><w:r><w:rPr><w:b w:val="0"/></w:rPr><w:t>plain</w:t></w:r></w:p>"#,
        );
        let records = DocxRenderer::new().render_bytes(&package(body, Some(styles))).unwrap();

        assert_eq!(records[0].style_name.as_deref(), Some("Statute Heading"));
        assert_eq!(records[0].alignment, Alignment::Center);
        assert_eq!(records[0].left_indent, 18.0);
        assert_eq!(records[0].font_weight, FontWeight::Bold);

        assert_eq!(records[1].style_name.as_deref(), Some("Loop"));
        assert_eq!(records[1].alignment, Alignment::Left);
        assert_eq!(records[1].font_weight, FontWeight::Normal);
    }

    #[test]
    fn unknown_justification_is_reported() {
        let body = r#"<w:p><w:pPr><w:jc w:val="right"/></w:pPr><w:r><w:t>x</w:t></w:r></w:p>"#;
        let records = DocxRenderer::new().render_bytes(&package(body, None)).unwrap();
        assert_eq!(records[0].alignment, Alignment::Unknown);
    }

    #[test]
    fn missing_file_is_a_source_error() {
        let err = DocxRenderer::new()
            .render(Path::new("/nonexistent/title.docx"))
            .unwrap_err();
        assert!(matches!(err, SourceError::Io(_)));
    }

    #[test]
    fn corrupt_package_is_a_render_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not a zip").unwrap();
        let err = DocxRenderer::new().render(file.path()).unwrap_err();
        assert!(matches!(err, SourceError::Render { .. }));
    }

    #[test]
    fn cancelled_render_stops_with_cancelled() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let body = r#"<w:p><w:r><w:t>TITLE 8</w:t></w:r></w:p>"#;
        file.write_all(&package(body, None)).unwrap();

        let token = CancellationToken::new();
        assert_eq!(DocxRenderer::new().render_cancellable(file.path(), &token).unwrap().len(), 1);
        token.cancel();
        let err = DocxRenderer::new().render_cancellable(file.path(), &token).unwrap_err();
        assert!(matches!(err, SourceError::Cancelled));
    }

    #[test]
    fn styles_do_not_leak_between_packages() {
        let styles = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:style w:styleId="Centered"><w:name w:val="Centered"/><w:pPr><w:jc w:val="center"/></w:pPr></w:style>
</w:styles>"#;
        let body = r#"<w:p><w:pPr><w:pStyle w:val="Centered"/></w:pPr><w:r><w:t>x</w:t></w:r></w:p>"#;
        let renderer = DocxRenderer::new();
        let styled = renderer.render_bytes(&package(body, Some(styles))).unwrap();
        let unstyled = renderer.render_bytes(&package(body, None)).unwrap();
        assert_eq!(styled[0].alignment, Alignment::Center);
        assert_eq!(unstyled[0].alignment, Alignment::Left);
        assert_eq!(unstyled[0].style_name, None);
    }
}
