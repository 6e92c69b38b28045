//! Running one operation over every artifact of a build.
//!
//! A run moves through fixed stages: the artifacts are loaded into a
//! [`Batch`], reduced to a single [`Snapshot`] of their current state, an
//! [`Action`] is resolved, every artifact is transformed in memory and only
//! then, when all transformations succeeded, the changed ones are written.
//! Any error before the write stage leaves every file untouched.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::action::{resolve, Action, Operation, Request, Resolution};
use crate::config::Settings;
use crate::error::Error;
use crate::ident;
use crate::marker::{self, ScopeMarker};
use crate::minify::Minify;
use crate::prefix::{self, PrefixRules};
use crate::prompt::Prompter;
use crate::render::Render;
use crate::scope::{self, ScopeEngine};
use crate::storage::{Selection, Storage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Stylesheet,
    Script,
}

/// One loaded file.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub content: String,
    pub kind: ArtifactKind,
}

/// The artifacts of one run, keyed by path.
#[derive(Debug, Default)]
pub struct Batch {
    artifacts: BTreeMap<PathBuf, Artifact>,
}

impl Batch {
    pub fn from_artifacts<I: IntoIterator<Item = Artifact>>(artifacts: I) -> Self {
        Self {
            artifacts: artifacts
                .into_iter()
                .map(|artifact| (artifact.path.clone(), artifact))
                .collect(),
        }
    }

    /// Read every artifact the operation works on. Reads run in parallel and
    /// all of them must succeed.
    pub fn load(storage: &dyn Storage, operation: Operation) -> Result<Self> {
        let selections: &[(Selection, ArtifactKind)] = match operation {
            Operation::Scope => &[(Selection::SourceStylesheets, ArtifactKind::Stylesheet)],
            Operation::Prefix => &[
                (Selection::Stylesheets, ArtifactKind::Stylesheet),
                (Selection::Scripts, ArtifactKind::Script),
            ],
        };

        let mut listed = Vec::new();
        for &(selection, kind) in selections {
            for path in storage.list(selection)? {
                listed.push((path, kind));
            }
        }

        let artifacts = listed
            .into_par_iter()
            .map(|(path, kind)| -> Result<Artifact> {
                let content = storage.read(&path)?;
                Ok(Artifact {
                    path,
                    content,
                    kind,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::from_artifacts(artifacts))
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<&Artifact> {
        self.artifacts.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.values()
    }

    fn stylesheets(&self) -> impl Iterator<Item = &Artifact> {
        self.iter().filter(|a| a.kind == ArtifactKind::Stylesheet)
    }
}

/// State shared by every artifact of a batch, computed once after loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Scope chain of the stylesheets; only reduced for scope runs.
    pub marker: Option<ScopeMarker>,
    /// Class prefix in use, the default when no artifact reveals one.
    pub prefix: String,
}

impl Snapshot {
    /// Reduce the batch to one state, failing if artifacts disagree.
    pub fn reduce(batch: &Batch, operation: Operation, settings: &Settings) -> Result<Self, Error> {
        let marker = match operation {
            Operation::Scope => agree(
                "scope",
                batch.stylesheets().map(|a| {
                    (
                        a.path.as_path(),
                        marker::decode(&a.content, &settings.scope.legacy_selector),
                    )
                }),
                |marker| marker.as_ref().map_or("unscoped".to_string(), |m| m.to_string()),
            )?
            .flatten(),
            Operation::Prefix => None,
        };

        let prefix = agree(
            "prefix",
            batch.iter().filter_map(|a| {
                marker::detect_prefix(&a.content, &settings.library.detection_suffix)
                    .map(|prefix| (a.path.as_path(), prefix))
            }),
            |prefix| prefix.clone(),
        )?
        .unwrap_or_else(|| settings.library.prefix.clone());

        Ok(Self { marker, prefix })
    }

    fn is_applied(&self, operation: Operation, settings: &Settings) -> bool {
        match operation {
            Operation::Scope => self.marker.is_some(),
            Operation::Prefix => self.prefix != settings.library.prefix,
        }
    }

    /// Human readable current state.
    pub fn describe(&self, operation: Operation) -> String {
        match operation {
            Operation::Scope => self
                .marker
                .as_ref()
                .map_or_else(|| "unscoped".to_string(), |m| m.to_string()),
            Operation::Prefix => self.prefix.clone(),
        }
    }
}

/// The value every item agrees on, `None` for no items.
fn agree<'a, T, I, F>(what: &'static str, items: I, show: F) -> Result<Option<T>, Error>
where
    T: PartialEq,
    I: Iterator<Item = (&'a Path, T)>,
    F: Fn(&T) -> String,
{
    let mut first: Option<(&Path, T)> = None;
    for (path, value) in items {
        match &first {
            None => first = Some((path, value)),
            Some((first_path, first_value)) if *first_value != value => {
                return Err(Error::InconsistentState {
                    what,
                    first: first_path.to_path_buf(),
                    first_value: show(first_value),
                    other: path.to_path_buf(),
                    other_value: show(&value),
                });
            }
            Some(_) => {}
        }
    }
    Ok(first.map(|(_, value)| value))
}

/// Flags controlling a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub verbose: bool,
    pub dry_run: bool,
}

/// Everything outside the engines a run talks to.
pub struct Collaborators<'a> {
    pub storage: &'a dyn Storage,
    pub renderer: &'a dyn Render,
    /// `None` skips minification.
    pub minifier: Option<&'a dyn Minify>,
    pub prompter: &'a mut dyn Prompter,
}

/// A file written (or, in a dry run, due to be written).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenArtifact {
    pub path: PathBuf,
    pub bytes: u64,
}

/// What a run did.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub operation: Operation,
    /// `None` when there was nothing to load.
    pub action: Option<Action>,
    pub loaded: usize,
    pub before: Option<String>,
    pub after: Option<String>,
    pub written: Vec<WrittenArtifact>,
    pub minified: Vec<PathBuf>,
    pub dry_run: bool,
}

impl RunReport {
    fn new(operation: Operation, loaded: usize, dry_run: bool) -> Self {
        Self {
            operation,
            action: None,
            loaded,
            before: None,
            after: None,
            written: Vec::new(),
            minified: Vec::new(),
            dry_run,
        }
    }
}

/// The resolved rewrite applied uniformly to the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Transform {
    Scope {
        /// Chain removed first.
        strip: Option<ScopeMarker>,
        /// Scope applied afterwards, with the chain it is nested in.
        apply: Option<(String, Option<ScopeMarker>)>,
    },
    Prefix {
        from: String,
        to: String,
    },
}

impl Transform {
    fn resulting_state(&self) -> String {
        match self {
            Transform::Scope { apply: None, .. } => "unscoped".to_string(),
            Transform::Scope {
                apply: Some((name, existing)),
                ..
            } => existing
                .as_ref()
                .map_or_else(|| ScopeMarker::single(name), |m| m.appended(name))
                .to_string(),
            Transform::Prefix { to, .. } => to.clone(),
        }
    }
}

/// Execute one run of `request` against the build.
pub fn run(
    request: &Request,
    settings: &Settings,
    options: RunOptions,
    mut io: Collaborators<'_>,
) -> Result<RunReport> {
    let operation = request.operation;

    let batch = Batch::load(io.storage, operation)?;
    let mut report = RunReport::new(operation, batch.len(), options.dry_run);
    if options.verbose {
        println!("DEBUG: Loaded {} artifacts", batch.len());
    }
    if batch.is_empty() {
        eprintln!("Warning: No artifacts found, nothing to do.");
        return Ok(report);
    }

    let snapshot = Snapshot::reduce(&batch, operation, settings)?;
    report.before = Some(snapshot.describe(operation));
    if options.verbose {
        println!("DEBUG: Current {}: {}", operation.noun(), snapshot.describe(operation));
    }

    let action = match resolve(
        request.action,
        operation,
        snapshot.is_applied(operation, settings),
    ) {
        Resolution::Chosen(action) => action,
        Resolution::Ask { default } => {
            let message = match operation {
                Operation::Scope => format!(
                    "the css is already scoped with: '{}'. what do you want to do?",
                    snapshot.describe(operation)
                ),
                Operation::Prefix => format!(
                    "this build is already prefixed with: '{}'. what do you want to do?",
                    snapshot.prefix
                ),
            };
            io.prompter.choose_action(&message, default)?
        }
    };
    report.action = Some(action);
    if options.verbose {
        println!("DEBUG: Action: {}", action);
    }

    let Some(transform) = plan(action, request, &snapshot, settings, io.prompter)? else {
        report.after = report.before.clone();
        return Ok(report);
    };
    report.after = Some(transform.resulting_state());

    let rewrites = transform_batch(&batch, &transform, &snapshot, settings, io.renderer)?;
    if options.verbose {
        println!("DEBUG: {} of {} artifacts changed", rewrites.len(), batch.len());
    }

    report.written = rewrites
        .iter()
        .map(|(path, content)| WrittenArtifact {
            path: path.clone(),
            bytes: content.len() as u64,
        })
        .collect();

    if options.dry_run {
        for (path, _) in &rewrites {
            println!("Would write: {}", path.display());
        }
        return Ok(report);
    }
    if options.verbose {
        for written in &report.written {
            println!("DEBUG: Writing {} ({} bytes)", written.path.display(), written.bytes);
        }
    }

    rewrites
        .par_iter()
        .map(|(path, content)| io.storage.write(path, content))
        .collect::<Result<Vec<()>>>()?;

    if let Some(minifier) = io.minifier {
        let suffix = &settings.files.minified_suffix;
        report.minified = rewrites
            .par_iter()
            .filter(|(path, _)| {
                batch
                    .get(path)
                    .is_some_and(|a| a.kind == ArtifactKind::Stylesheet)
                    && !path.to_string_lossy().ends_with(suffix.as_str())
            })
            .map(|(path, _)| minifier.minify(io.storage, path))
            .collect::<Result<Vec<_>>>()?;
    }

    Ok(report)
}

/// Turn the action into a concrete transform, asking for a name if needed.
/// `None` means there is nothing to do.
fn plan(
    action: Action,
    request: &Request,
    snapshot: &Snapshot,
    settings: &Settings,
    prompter: &mut dyn Prompter,
) -> Result<Option<Transform>> {
    let operation = request.operation;
    let mut new_name = |default: Option<&str>| -> Result<String> {
        match &request.name {
            Some(name) => Ok(name.clone()),
            None => {
                let answer = prompter.ask_name(operation.noun(), default)?;
                Ok(ident::validate(operation.noun(), &answer)?)
            }
        }
    };

    let transform = match (operation, action) {
        (_, Action::Nothing) => return Ok(None),

        (Operation::Scope, Action::Cleanup) => Transform::Scope {
            strip: snapshot.marker.clone(),
            apply: None,
        },
        (Operation::Scope, Action::Replace) => {
            let name = new_name(Some(settings.scope.default_name.as_str()))?;
            if snapshot.marker.as_ref() == Some(&ScopeMarker::single(&name)) {
                return Err(Error::Redundant {
                    what: "scope",
                    name,
                }
                .into());
            }
            Transform::Scope {
                strip: snapshot.marker.clone(),
                apply: Some((name, None)),
            }
        }
        (Operation::Scope, Action::Append) => {
            let name = new_name(Some(settings.scope.default_name.as_str()))?;
            Transform::Scope {
                strip: None,
                apply: Some((name, snapshot.marker.clone())),
            }
        }

        (Operation::Prefix, Action::Cleanup) => Transform::Prefix {
            from: snapshot.prefix.clone(),
            to: settings.library.prefix.clone(),
        },
        (Operation::Prefix, Action::Replace) => {
            let name = new_name(None)?;
            if name == snapshot.prefix {
                return Err(Error::Redundant {
                    what: "prefix",
                    name,
                }
                .into());
            }
            Transform::Prefix {
                from: snapshot.prefix.clone(),
                to: name,
            }
        }
        (Operation::Prefix, Action::Append) => {
            let name = new_name(None)?;
            Transform::Prefix {
                from: snapshot.prefix.clone(),
                to: format!("{}{}", snapshot.prefix, name),
            }
        }
    };

    Ok(Some(transform))
}

/// Transform every artifact in memory and return the changed ones.
fn transform_batch(
    batch: &Batch,
    transform: &Transform,
    snapshot: &Snapshot,
    settings: &Settings,
    renderer: &dyn Render,
) -> Result<Vec<(PathBuf, String)>> {
    let exceptions = settings.global_exceptions();
    let engine = ScopeEngine::new(renderer, &exceptions, &snapshot.prefix);
    let rules = PrefixRules {
        default_prefix: &settings.library.prefix,
        global_symbol: &settings.library.global_symbol,
    };

    let progress = ProgressBar::new(batch.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{pos}/{len}] {msg}") {
        progress.set_style(style);
    }
    progress.set_message("Rewriting artifacts...");

    let results = batch
        .artifacts
        .par_iter()
        .map(|(path, artifact)| -> Result<Option<(PathBuf, String)>> {
            let rewritten = match transform {
                Transform::Scope { strip, apply } => {
                    let mut text = match strip {
                        Some(marker) => scope::strip(&artifact.content, Some(marker)),
                        None => artifact.content.clone(),
                    };
                    if let Some((name, existing)) = apply {
                        text = engine
                            .apply(&text, name, existing.as_ref())
                            .map_err(|source| Error::Render {
                                path: path.clone(),
                                source,
                            })?;
                    }
                    text
                }
                Transform::Prefix { from, to } => {
                    prefix::rewrite(&artifact.content, from, to, artifact.kind, &rules)
                }
            };
            progress.inc(1);
            Ok((rewritten != artifact.content).then(|| (path.clone(), rewritten)))
        })
        .collect::<Result<Vec<_>>>();

    progress.finish_and_clear();
    Ok(results?.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stylesheet(path: &str, content: &str) -> Artifact {
        Artifact {
            path: PathBuf::from(path),
            content: content.to_string(),
            kind: ArtifactKind::Stylesheet,
        }
    }

    fn script(path: &str, content: &str) -> Artifact {
        Artifact {
            path: PathBuf::from(path),
            content: content.to_string(),
            kind: ArtifactKind::Script,
        }
    }

    #[test]
    fn test_snapshot_agreeing_markers() {
        let settings = Settings::embedded().unwrap();
        let batch = Batch::from_artifacts([
            stylesheet("a.css", "/* scoped: s */.s .uk-grid{}"),
            stylesheet("b.css", "/* scoped: s */.s .uk-card{}"),
        ]);
        let snapshot = Snapshot::reduce(&batch, Operation::Scope, &settings).unwrap();
        assert_eq!(snapshot.marker, Some(ScopeMarker::single("s")));
        assert_eq!(snapshot.prefix, "uk");
    }

    #[test]
    fn test_snapshot_conflicting_markers() {
        let settings = Settings::embedded().unwrap();
        let batch = Batch::from_artifacts([
            stylesheet("a.css", "/* scoped: a */.a .x{}"),
            stylesheet("b.css", "/* scoped: b */.b .x{}"),
        ]);
        let err = Snapshot::reduce(&batch, Operation::Scope, &settings).unwrap_err();
        match err {
            Error::InconsistentState {
                what,
                first_value,
                other_value,
                ..
            } => {
                assert_eq!(what, "scope");
                assert_eq!(first_value, "a");
                assert_eq!(other_value, "b");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_snapshot_marked_and_unmarked_conflict() {
        let settings = Settings::embedded().unwrap();
        let batch = Batch::from_artifacts([
            stylesheet("a.css", ".x{}"),
            stylesheet("b.css", "/* scoped: b */.b .x{}"),
        ]);
        assert!(matches!(
            Snapshot::reduce(&batch, Operation::Scope, &settings),
            Err(Error::InconsistentState { .. })
        ));
    }

    #[test]
    fn test_snapshot_prefix_discovery() {
        let settings = Settings::embedded().unwrap();
        let batch = Batch::from_artifacts([
            stylesheet("a.css", ".xy-grid{}"),
            script("b.js", "xyUIkit.util"),
            script("c.js", "addClass(el, 'xy-grid')"),
        ]);
        let snapshot = Snapshot::reduce(&batch, Operation::Prefix, &settings).unwrap();
        assert_eq!(snapshot.prefix, "xy");
        assert_eq!(snapshot.marker, None);
        assert!(snapshot.is_applied(Operation::Prefix, &settings));
    }

    #[test]
    fn test_snapshot_conflicting_prefixes() {
        let settings = Settings::embedded().unwrap();
        let batch = Batch::from_artifacts([
            stylesheet("a.css", ".xy-grid{}"),
            stylesheet("b.css", ".zz-grid{}"),
        ]);
        assert!(matches!(
            Snapshot::reduce(&batch, Operation::Prefix, &settings),
            Err(Error::InconsistentState { what: "prefix", .. })
        ));
    }

    #[test]
    fn test_snapshot_defaults_to_library_prefix() {
        let settings = Settings::embedded().unwrap();
        let batch = Batch::from_artifacts([stylesheet("a.css", ".card{}")]);
        let snapshot = Snapshot::reduce(&batch, Operation::Prefix, &settings).unwrap();
        assert_eq!(snapshot.prefix, "uk");
        assert!(!snapshot.is_applied(Operation::Prefix, &settings));
    }

    #[test]
    fn test_resulting_state() {
        let append = Transform::Scope {
            strip: None,
            apply: Some(("b".to_string(), Some(ScopeMarker::single("a")))),
        };
        assert_eq!(append.resulting_state(), "a b");
        let cleanup = Transform::Scope {
            strip: Some(ScopeMarker::single("a")),
            apply: None,
        };
        assert_eq!(cleanup.resulting_state(), "unscoped");
    }
}
