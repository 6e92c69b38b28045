//! Failures that end a run.

use std::path::PathBuf;

use crate::action::Action;
use crate::render::RenderError;

/// Errors raised by the rewrite engines and the batch coordinator.
///
/// I/O and configuration problems travel as `anyhow::Error`; these variants
/// can be recovered from one with `downcast_ref::<Error>()`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("illegal {what}: '{name}' (expected a letter followed by letters, digits or '-')")]
    InvalidName { what: &'static str, name: String },

    #[error("unrecognized argument: '{0}'")]
    UnknownToken(String),

    #[error("multiple actions found: {}", join_actions(.0))]
    AmbiguousAction(Vec<Action>),

    #[error(
        "{what}s differ from file to file: {} has '{first_value}', {} has '{other_value}'",
        .first.display(),
        .other.display()
    )]
    InconsistentState {
        what: &'static str,
        first: PathBuf,
        first_value: String,
        other: PathBuf,
        other_value: String,
    },

    #[error("failed to render {}: {source}", .path.display())]
    Render {
        path: PathBuf,
        #[source]
        source: RenderError,
    },

    #[error("already using {what}: '{name}'")]
    Redundant { what: &'static str, name: String },

    #[error("no {what} given and no terminal to ask for one; pass it on the command line")]
    InputRequired { what: &'static str },
}

fn join_actions(actions: &[Action]) -> String {
    actions
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
