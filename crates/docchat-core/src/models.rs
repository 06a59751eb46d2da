//! Core data models used throughout docchat.
//!
//! These types describe the uploaded files, their chunks and the points
//! returned by the vector store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// MIME type of Word documents.
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Which set of uploads a file belongs to.
///
/// Each collection has its own metadata table and its own allow-list of
/// file kinds. Both share the same vector-store collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Documents,
    Cms,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Documents, Collection::Cms];

    /// Name of the metadata table backing this collection.
    pub fn table(self) -> &'static str {
        match self {
            Collection::Documents => "documents",
            Collection::Cms => "cms_files",
        }
    }

    pub fn allows(self, kind: FileKind) -> bool {
        match self {
            Collection::Documents => {
                matches!(kind, FileKind::Pdf | FileKind::Csv | FileKind::Docx)
            }
            Collection::Cms => kind == FileKind::Json,
        }
    }

    /// Human label used in prompts and messages.
    pub fn label(self) -> &'static str {
        match self {
            Collection::Documents => "document",
            Collection::Cms => "CMS content",
        }
    }
}

/// Declared content category of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Csv,
    Docx,
    Json,
}

impl FileKind {
    /// Map a declared MIME type onto a kind. Parameters such as
    /// `; charset=utf-8` are ignored.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "application/pdf" => Some(FileKind::Pdf),
            "text/csv" | "application/csv" => Some(FileKind::Csv),
            MIME_DOCX => Some(FileKind::Docx),
            "application/json" => Some(FileKind::Json),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileKind::Pdf => "pdf",
            FileKind::Csv => "csv",
            FileKind::Docx => "docx",
            FileKind::Json => "json",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pdf" => Some(FileKind::Pdf),
            "csv" => Some(FileKind::Csv),
            "docx" => Some(FileKind::Docx),
            "json" => Some(FileKind::Json),
            _ => None,
        }
    }
}

/// Metadata record of one uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub filename: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub session_id: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Summary returned to the client after a successful upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: FileKind,
}

impl From<&FileRecord> for UploadedFile {
    fn from(record: &FileRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.filename.clone(),
            size: record.size,
            kind: record.kind,
        }
    }
}

/// A contiguous, overlapping slice of a file's extracted text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Hex SHA-256 of the normalized chunk text.
    pub id: String,
    pub file_id: String,
    /// Zero-based position within the file.
    pub order: usize,
    pub text: String,
}

/// A point returned by a filtered similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub text: String,
    pub file_id: String,
    pub order: usize,
    pub score: f32,
}

/// Content-derived file identifier: hex SHA-256 of `bytes ‖ session_id`.
///
/// Identical bytes in the same session always produce the same id; the same
/// bytes under another session produce a different one.
pub fn file_id(bytes: &[u8], session_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.update(session_id.as_bytes());
    hex::encode(hasher.finalize())
}
