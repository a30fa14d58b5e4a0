use statute_parser::docx_parser::DocxRenderer;
use std::io::Write;
use std::path::Path;

/// Prints the paragraph records of each given document as JSON lines.
fn main() -> anyhow::Result<()> {
    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("usage: dump_paragraphs <file.docx>...");
        std::process::exit(2);
    }

    let renderer = DocxRenderer::new();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for path in &paths {
        let records = renderer.render(Path::new(path))?;
        eprintln!("{}: {} paragraphs", path, records.len());
        for record in &records {
            serde_json::to_writer(&mut out, record)?;
            out.write_all(b"\n")?;
        }
    }

    Ok(())
}
