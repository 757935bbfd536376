//! folio-core library.
//!
//! Core data structures and algorithms behind the folio block editor:
//!
//! - [`model`]: blocks, block types, heading levels and typed payloads.
//! - [`merge`]: three-way merge of ordered block sequences for autosave.
//! - [`outline`]: flat block sequence → nested section tree, plus HTML rendering.
//! - [`session`]: an owned document session with explicit mutations and
//!   change notifications.
//! - [`save`]: debounce / single-in-flight / backoff state machine and the
//!   fetch-merge-store save round.
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums in the library, `anyhow::Result` at the
//!   config and binary boundary. Every error maps to an [`error::ErrorCode`].
//! - **Config**: [`config::FolioConfig`] from `.folio/config.toml`, with
//!   `FOLIO_*` environment overrides.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod error;
pub mod merge;
pub mod model;
pub mod outline;
pub mod save;
pub mod session;

pub use merge::{MergeError, MergeOptions, TieBreak, merge_blocks};
pub use model::block::{Block, BlockType, HeadingLevel, Uid, Version};
pub use outline::render::{RenderContext, render_html};
pub use outline::{Node, parse_blocks};
pub use save::{SaveCoordinator, run_save_round};
pub use session::DocumentSession;
