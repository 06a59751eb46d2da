//! # docchat core
//!
//! I/O-free logic for docchat: data models, the word-window chunker,
//! the embedding, chat and storage traits, and the retrieval-augmented
//! answer composer.
//!
//! This crate contains no tokio, sqlx, HTTP clients or filesystem access.
//! Concrete providers and the HTTP surface live in the `docchat` crate and
//! are injected here through the [`embedding::Embedder`],
//! [`chat::ChatModel`], [`store::VectorStore`] and [`store::FileStore`]
//! traits.

pub mod chat;
pub mod chunk;
pub mod compose;
pub mod embedding;
pub mod error;
pub mod models;
pub mod store;
