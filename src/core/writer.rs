use crate::core::layout::{DocumentTree, Node};
use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writer serializes an assembled tree into an output format.
pub trait Writer {
    fn write_tree<W: Write>(&self, tree: &DocumentTree, out: W) -> Result<()>;

    fn write_to_path<P: AsRef<Path>>(&self, tree: &DocumentTree, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut out = BufWriter::new(file);
        self.write_tree(tree, &mut out)?;
        out.flush()?;
        Ok(())
    }
}

/// Akoma Ntoso style XML: one element per node, named after its level.
pub struct XmlWriter {
    indent: usize,
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self { indent: 2 }
    }
}

impl XmlWriter {
    pub fn new(indent: usize) -> Self {
        Self { indent }
    }

    fn write_node<W: Write>(&self, writer: &mut quick_xml::Writer<W>, node: &Node) -> Result<()> {
        let tag = node.level().as_str();
        let mut start = BytesStart::new(tag);
        start.push_attribute(("name", node.display_name()));
        start.push_attribute(("id", node.id()));
        if let Some(status) = node.status().as_attr() {
            start.push_attribute(("status", status));
        }
        writer.write_event(Event::Start(start))?;

        if let Some(num) = node.enumerator() {
            write_text_element(writer, "num", num)?;
        }
        if let Some(heading) = node.heading() {
            write_text_element(writer, "heading", heading)?;
        }
        if let Some(body) = node.body() {
            writer.write_event(Event::Start(BytesStart::new("content")))?;
            write_text_element(writer, "p", body)?;
            writer.write_event(Event::End(BytesEnd::new("content")))?;
        }
        for child in node.children() {
            self.write_node(writer, child)?;
        }

        writer.write_event(Event::End(BytesEnd::new(tag)))?;
        Ok(())
    }
}

fn write_text_element<W: Write>(writer: &mut quick_xml::Writer<W>, tag: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

impl Writer for XmlWriter {
    fn write_tree<W: Write>(&self, tree: &DocumentTree, out: W) -> Result<()> {
        let mut writer = if self.indent > 0 {
            quick_xml::Writer::new_with_indent(out, b' ', self.indent)
        } else {
            quick_xml::Writer::new(out)
        };
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new("akomaNtoso")))?;
        writer.write_event(Event::Start(BytesStart::new("act")))?;

        let mut meta = BytesStart::new("meta");
        meta.push_attribute(("runId", tree.metadata.run_id.as_str()));
        if let Some(generated_at) = &tree.metadata.generated_at {
            meta.push_attribute(("generatedAt", generated_at.as_str()));
        }
        if tree.metadata.sources.is_empty() {
            writer.write_event(Event::Empty(meta))?;
        } else {
            writer.write_event(Event::Start(meta))?;
            for source in &tree.metadata.sources {
                let mut element = BytesStart::new("source");
                element.push_attribute(("href", source.as_str()));
                writer.write_event(Event::Empty(element))?;
            }
            writer.write_event(Event::End(BytesEnd::new("meta")))?;
        }

        writer.write_event(Event::Start(BytesStart::new("body")))?;
        for document in &tree.documents {
            self.write_node(&mut writer, document)?;
        }
        writer.write_event(Event::End(BytesEnd::new("body")))?;
        writer.write_event(Event::End(BytesEnd::new("act")))?;
        writer.write_event(Event::End(BytesEnd::new("akomaNtoso")))?;
        writer.get_mut().write_all(b"\n")?;
        Ok(())
    }
}

/// Pretty-printed JSON of the whole tree including metadata.
#[derive(Default)]
pub struct JsonWriter;

impl Writer for JsonWriter {
    fn write_tree<W: Write>(&self, tree: &DocumentTree, mut out: W) -> Result<()> {
        serde_json::to_writer_pretty(&mut out, tree)?;
        out.write_all(b"\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::layout::DocumentMetadata;
    use crate::core::signal::{HierarchyLevel, Status};

    fn sample_tree() -> DocumentTree {
        let mut title = Node::new(
            HierarchyLevel::Title,
            "/title-8".into(),
            Some("8".into()),
            Some("Labor & Employment".into()),
            None,
            Status::None,
        );
        title.push_child(Node::new(
            HierarchyLevel::Section,
            "/title-8/section-8-1-101".into(),
            Some("8-1-101".into()),
            Some("Short title".into()),
            Some("This title <may> be cited.".into()),
            Status::None,
        ));
        title.push_child(Node::new(
            HierarchyLevel::Section,
            "/title-8/section-8-1-102".into(),
            Some("8-1-102".into()),
            None,
            None,
            Status::Repealed,
        ));
        let mut tree = DocumentTree::new(DocumentMetadata {
            run_id: "run-1".into(),
            generated_at: None,
            sources: vec!["title8.docx".into()],
        });
        tree.push_document(title);
        tree
    }

    fn render(writer: &impl Writer) -> String {
        let mut buf = Vec::new();
        writer.write_tree(&sample_tree(), &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn xml_nests_levels_and_escapes_text() {
        let xml = render(&XmlWriter::new(0));
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<title name=\"Title 8\" id=\"/title-8\"><num>8</num><heading>Labor &amp; Employment</heading>"));
        assert!(xml.contains("<section name=\"Section 8-1-101\" id=\"/title-8/section-8-1-101\">"));
        assert!(xml.contains("<content><p>This title &lt;may&gt; be cited.</p></content>"));
        assert!(xml.contains("status=\"repealed\""));
        assert!(xml.contains("<source href=\"title8.docx\"/>"));
        assert!(xml.trim_end().ends_with("</body></act></akomaNtoso>"));
    }

    #[test]
    fn xml_output_parses_back() {
        let xml = render(&XmlWriter::default());
        let doc = roxmltree::Document::parse(&xml).unwrap();
        let sections: Vec<_> = doc
            .descendants()
            .filter(|n| n.has_tag_name("section"))
            .map(|n| n.attribute("id").unwrap_or_default().to_string())
            .collect();
        assert_eq!(sections, vec!["/title-8/section-8-1-101", "/title-8/section-8-1-102"]);
    }

    #[test]
    fn json_includes_metadata_and_children() {
        let json: serde_json::Value = serde_json::from_str(&render(&JsonWriter)).unwrap();
        assert_eq!(json["metadata"]["run_id"], "run-1");
        assert_eq!(json["documents"][0]["children"][1]["status"], "repealed");
    }
}
