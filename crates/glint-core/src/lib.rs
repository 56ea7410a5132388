//! Shared, dependency-minimized core types used across glint.
//!
//! This crate holds everything below the tokenizer: character-addressed
//! text coordinates ([`TextPosition`], [`TextRange`]), UTF-8 index
//! conversions ([`utf8`]), and the line-based [`Document`] buffer that
//! supports ranged patches.

pub mod document;
pub mod text;
pub mod utf8;

pub use document::{Document, DocumentError};
pub use text::{InvalidRange, TextPosition, TextRange};
