//! # docchat
//!
//! **Retrieval-augmented chat over session-scoped document uploads.**
//!
//! Browser sessions upload PDF, DOCX and CSV documents or JSON CMS content.
//! Each file is extracted, chunked into overlapping word windows, embedded
//! by a hosted model and stored as points in Qdrant, tagged with the file
//! id. A chat endpoint answers either directly or grounded on the chunks of
//! one selected file.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │  axum    │──▶│  UploadGate  │──▶│  SQLite   │  metadata, per session
//! │  server  │   │ extract+chunk│   └──────────┘
//! └────┬─────┘   │   +embed     │──▶┌──────────┐
//!      │         └──────────────┘   │  Qdrant  │  one point per chunk
//!      ▼                            └────▲─────┘
//! ┌──────────┐   embed question + filtered search
//! │ Composer │───────────────────────────┘
//! └──────────┘──▶ hosted chat model
//! ```
//!
//! The I/O-free pieces (models, chunker, traits, composer) live in
//! `docchat-core`; this crate provides the concrete adapters and the HTTP
//! surface.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] / [`migrate`] | SQLite pool and schema |
//! | [`sqlite_store`] | `FileStore` over SQLite |
//! | [`qdrant`] | `VectorStore` over the Qdrant REST API |
//! | [`embedding`] | OpenAI-compatible embedding provider |
//! | [`chat`] | Cohere and OpenAI-compatible chat providers |
//! | [`extract`] | PDF / DOCX / CSV / JSON text extraction |
//! | [`session`] | Session cookie parsing and issuing |
//! | [`upload`] | Upload validation, indexing, compensation and deletion |
//! | [`server`] | HTTP routes and error mapping |
//! | [`app`] | Service construction from config |
//! | [`logging`] | tracing subscriber setup |

pub mod app;
pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod logging;
pub mod migrate;
pub mod qdrant;
pub mod server;
pub mod session;
pub mod sqlite_store;
pub mod upload;
