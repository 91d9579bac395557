//! Read-only access to the source documents questions are asked about.
//!
//! The evaluator never interprets document content. Binary documents are
//! handed to providers as base64 data URLs; text documents can also be
//! inlined into prompts.

use crate::error::{EvalError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// File extensions tried, in order, when a document is looked up by name.
const KNOWN_EXTENSIONS: [&str; 5] = ["pdf", "txt", "md", "png", "jpg"];

/// A source document loaded into memory.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Document name (file stem or caller-provided key).
    pub name: String,
    /// Original file path (if loaded from file).
    pub path: Option<PathBuf>,
    /// MIME type inferred from the file extension.
    pub mime_type: String,
    /// Raw content.
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    /// Load a document from disk.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(EvalError::DocumentNotFound(path.display().to_string()));
        }

        let bytes = std::fs::read(path).map_err(|e| EvalError::io(path, e))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());

        Ok(Self {
            name,
            path: Some(path.to_path_buf()),
            mime_type: mime_for(path).to_string(),
            bytes,
        })
    }

    /// Create an in-memory text document.
    pub fn from_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            mime_type: "text/plain".to_string(),
            bytes: text.into().into_bytes(),
        }
    }

    pub fn is_text(&self) -> bool {
        self.mime_type.starts_with("text/")
    }

    /// Content as UTF-8 text, for text documents only.
    pub fn text(&self) -> Option<&str> {
        if self.is_text() {
            std::str::from_utf8(&self.bytes).ok()
        } else {
            None
        }
    }

    /// File name used when attaching the document to a request.
    pub fn filename(&self) -> String {
        self.path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.name.clone())
    }

    /// `data:<mime>;base64,<content>` URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("md") => "text/markdown",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// Read-only lookup of source documents by name.
pub trait DocumentStore: Send + Sync {
    fn get(&self, name: &str) -> Result<Arc<SourceDocument>>;
}

/// Documents stored as files under a root directory.
///
/// `get("report")` resolves `<root>/report.pdf`, `<root>/report.txt`, ...;
/// a name that is itself an existing path is used as-is. Loaded documents
/// are cached for the lifetime of the store.
pub struct FsDocumentStore {
    root: PathBuf,
    cache: RwLock<HashMap<String, Arc<SourceDocument>>>,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let direct = PathBuf::from(name);
        if direct.is_file() {
            return Some(direct);
        }

        let joined = self.root.join(name);
        if joined.is_file() {
            return Some(joined);
        }

        KNOWN_EXTENSIONS
            .iter()
            .map(|ext| self.root.join(format!("{}.{}", name, ext)))
            .find(|p| p.is_file())
    }
}

impl DocumentStore for FsDocumentStore {
    fn get(&self, name: &str) -> Result<Arc<SourceDocument>> {
        if let Ok(cache) = self.cache.read() {
            if let Some(doc) = cache.get(name) {
                return Ok(Arc::clone(doc));
            }
        }

        let path = self
            .resolve(name)
            .ok_or_else(|| EvalError::DocumentNotFound(name.to_string()))?;
        let doc = Arc::new(SourceDocument::from_file(&path)?);

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(name.to_string(), Arc::clone(&doc));
        }
        Ok(doc)
    }
}

/// Documents held in memory, keyed by name.
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: HashMap<String, Arc<SourceDocument>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, doc: SourceDocument) {
        self.docs.insert(doc.name.clone(), Arc::new(doc));
    }

    pub fn with(mut self, doc: SourceDocument) -> Self {
        self.insert(doc);
        self
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn get(&self, name: &str) -> Result<Arc<SourceDocument>> {
        self.docs
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::DocumentNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_text_document() {
        let doc = SourceDocument::from_text("esg", "Scope 1 emissions: 12,000 t");
        assert!(doc.is_text());
        assert_eq!(doc.text(), Some("Scope 1 emissions: 12,000 t"));
        assert_eq!(doc.filename(), "esg");
    }

    #[test]
    fn test_data_url() {
        let doc = SourceDocument::from_text("t", "hi");
        assert_eq!(doc.to_data_url(), "data:text/plain;base64,aGk=");
    }

    #[test]
    fn test_fs_store_resolves_extension() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("report.pdf"), b"%PDF-1.7").unwrap();

        let store = FsDocumentStore::new(dir.path());
        let doc = store.get("report").unwrap();
        assert_eq!(doc.name, "report");
        assert_eq!(doc.mime_type, "application/pdf");
        assert_eq!(doc.filename(), "report.pdf");
        assert!(doc.text().is_none());

        // Second lookup is served from the cache.
        let again = store.get("report").unwrap();
        assert!(Arc::ptr_eq(&doc, &again));
    }

    #[test]
    fn test_fs_store_missing() {
        let dir = TempDir::new().unwrap();
        let store = FsDocumentStore::new(dir.path());
        assert!(matches!(
            store.get("nope"),
            Err(EvalError::DocumentNotFound(_))
        ));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryDocumentStore::new().with(SourceDocument::from_text("a", "alpha"));
        assert_eq!(store.get("a").unwrap().text(), Some("alpha"));
        assert!(store.get("b").is_err());
    }
}
