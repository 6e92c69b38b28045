//! rescope - Prefix and scope rewriting for compiled UIkit builds
//!
//! rescope rewrites the compiled stylesheets and scripts of a UIkit build in
//! place. It can rename the class prefix (`uk-` to anything else) and wrap
//! every stylesheet rule under a scope selector so the framework only styles
//! markup inside an element carrying that class.
//!
//! ## Architecture
//!
//! - [`batch`] runs one operation over all artifacts: load, reduce to a single
//!   [`Snapshot`], resolve the [`Action`], transform in memory, then write.
//! - [`prefix`] and [`scope`] are the two text engines.
//! - [`marker`] reads and writes the `/* scoped: ... */` comment that records
//!   the applied scope chain.
//! - [`storage`], [`render`], [`minify`] and [`prompt`] are the collaborators
//!   the coordinator talks to through traits.

pub mod action;
pub mod batch;
pub mod config;
pub mod error;
pub mod ident;
pub mod marker;
pub mod minify;
pub mod prefix;
pub mod prompt;
pub mod render;
pub mod scope;
pub mod storage;

// Re-export commonly used items
pub use action::{resolve, Action, Operation, Request, Resolution};
pub use batch::{
    run, Artifact, ArtifactKind, Batch, Collaborators, RunOptions, RunReport, Snapshot,
    WrittenArtifact,
};
pub use config::{RenderEngine, Settings};
pub use error::Error;
pub use marker::ScopeMarker;
pub use minify::{CssMinifier, Minify};
pub use prompt::{NonInteractive, Prompter, TerminalPrompter};
pub use render::{LesscRenderer, NestingRenderer, Render, RenderError};
pub use scope::{GlobalExceptions, ScopeEngine};
pub use storage::{FsStorage, Selection, Storage};
