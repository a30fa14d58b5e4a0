use crate::config::AppConfig;
use crate::core::layout::DocumentTree;
use crate::core::writer::{JsonWriter, Writer, XmlWriter};
use crate::pipeline::Orchestrator;
use crate::worker::WorkerPool;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Xml,
    Json,
}

/// Runs a batch of documents and writes the merged tree.
pub struct DocumentProcessor {
    orchestrator: Orchestrator,
    format: OutputFormat,
}

impl DocumentProcessor {
    pub fn new(config: AppConfig, format: OutputFormat) -> Result<Self> {
        let pool = WorkerPool::from_config(&config.workers);
        let orchestrator = Orchestrator::new(config, pool)?;
        Ok(Self { orchestrator, format })
    }

    /// Expands `paths` into the list of documents to parse: files are kept
    /// as given, directories contribute their `.docx` files in name order.
    pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut inputs = Vec::new();
        for path in paths {
            if path.is_dir() {
                let mut found = Vec::new();
                for entry in fs::read_dir(path)
                    .with_context(|| format!("Failed to read input directory {}", path.display()))?
                {
                    let file_path = entry?.path();
                    if file_path.is_file() && is_docx(&file_path) {
                        found.push(file_path);
                    } else {
                        debug!("Skipping {}", file_path.display());
                    }
                }
                found.sort();
                if found.is_empty() {
                    warn!("No .docx files in {}", path.display());
                }
                inputs.extend(found);
            } else if path.is_file() {
                inputs.push(path.clone());
            } else {
                anyhow::bail!("Input not found: {}", path.display());
            }
        }
        Ok(inputs)
    }

    /// Parses `inputs` and, when every document succeeds, writes the tree to
    /// `output` (stdout if `None`). Nothing is written on failure.
    pub fn process_documents(
        &self,
        inputs: &[PathBuf],
        output: Option<&Path>,
        token: &CancellationToken,
    ) -> Result<DocumentTree> {
        info!("Processing {} documents", inputs.len());
        let tree = self.orchestrator.run(inputs, token)?;

        match output {
            Some(path) => {
                self.write_atomically(&tree, path)?;
                info!("Output saved to {}", path.display());
            }
            None => {
                let stdout = std::io::stdout();
                self.write(&tree, stdout.lock())?;
            }
        }
        Ok(tree)
    }

    fn write<W: std::io::Write>(&self, tree: &DocumentTree, out: W) -> Result<()> {
        match self.format {
            OutputFormat::Xml => XmlWriter::default().write_tree(tree, out),
            OutputFormat::Json => JsonWriter.write_tree(tree, out),
        }
    }

    fn write_atomically(&self, tree: &DocumentTree, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut partial = path.as_os_str().to_owned();
        partial.push(".partial");
        let partial = PathBuf::from(partial);

        let written = match self.format {
            OutputFormat::Xml => XmlWriter::default().write_to_path(tree, &partial),
            OutputFormat::Json => JsonWriter.write_to_path(tree, &partial),
        };
        if let Err(e) = written {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }
        fs::rename(&partial, path)
            .with_context(|| format!("Failed to move output into place at {}", path.display()))?;
        Ok(())
    }
}

fn is_docx(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("docx"))
}
