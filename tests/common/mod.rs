#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;

pub const NBSP: &str = "\u{a0}";

pub enum Para {
    Left(String),
    Centered(String),
    Blank,
}

pub fn left(text: impl Into<String>) -> Para {
    Para::Left(text.into())
}

pub fn centered(text: impl Into<String>) -> Para {
    Para::Centered(text.into())
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Minimal WordprocessingML package holding `paragraphs`.
pub fn docx_bytes(paragraphs: &[Para]) -> Vec<u8> {
    let mut body = String::new();
    for para in paragraphs {
        match para {
            Para::Blank => body.push_str("<w:p/>"),
            Para::Left(text) => body.push_str(&format!(
                r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
                escape(text)
            )),
            Para::Centered(text) => body.push_str(&format!(
                r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
                escape(text)
            )),
        }
    }
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
        body
    );

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("word/document.xml", FileOptions::default()).unwrap();
    zip.write_all(document.as_bytes()).unwrap();
    zip.finish().unwrap().into_inner()
}

pub fn write_docx(dir: &Path, name: &str, paragraphs: &[Para]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, docx_bytes(paragraphs)).unwrap();
    path
}

/// Banner, title heading and one section per entry of `sections`.
pub fn title_document(title: u32, sections: &[&str]) -> Vec<Para> {
    let mut paragraphs = vec![
        centered("STATUTES OF THE STATE"),
        centered(format!("TITLE {}", title)),
    ];
    for (i, heading) in sections.iter().enumerate() {
        paragraphs.push(left(format!(
            "{t}-1-{n}.{s}{s}{h}.{s}{s}Text of section {n}.",
            t = title,
            n = 101 + i,
            s = NBSP,
            h = heading
        )));
        paragraphs.push(Para::Blank);
    }
    paragraphs
}
