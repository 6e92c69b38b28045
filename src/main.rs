use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use humansize::{format_size, BINARY};
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use rescope::{
    run, Collaborators, CssMinifier, FsStorage, LesscRenderer, Minify, NestingRenderer,
    NonInteractive, Operation, Prompter, Render, RenderEngine, Request, RunOptions, RunReport,
    Settings, TerminalPrompter,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Rename the class prefix of a UIkit build or scope its stylesheets under a selector",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rename the class prefix in stylesheets and scripts
    Prefix(PrefixArgs),
    /// Wrap stylesheet rules under a scope selector
    Scope(ScopeArgs),
}

#[derive(Args, Debug)]
struct PrefixArgs {
    /// Action (replace, append, cleanup, nothing) and/or `prefix=NAME`
    tokens: Vec<String>,

    /// New prefix
    #[arg(long, short)]
    prefix: Option<String>,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct ScopeArgs {
    /// Action (replace, append, cleanup, nothing) and/or `scope=NAME`
    tokens: Vec<String>,

    /// Scope name
    #[arg(long, short)]
    scope: Option<String>,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Build directory to rewrite (defaults to `files.root` from the config)
    #[arg(long, short = 'C')]
    dir: Option<PathBuf>,

    /// TOML file merged over the built-in settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stylesheet renderer used when scoping
    #[arg(long, value_enum)]
    renderer: Option<RendererArg>,

    /// Don't regenerate minified stylesheets
    #[arg(long)]
    no_minify: bool,

    /// Show what would be written, but don't write anything
    #[arg(long)]
    dry_run: bool,

    /// Show detailed information about each step
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RendererArg {
    Builtin,
    Lessc,
}

/// Turn single-dash spellings such as `-scope=NAME` into the long option.
fn normalize_arg(arg: OsString) -> OsString {
    let Some(text) = arg.to_str() else {
        return arg;
    };
    if let Some(rest) = text.strip_prefix('-') {
        let rest = rest.trim_start_matches('-');
        if let Some((key, value)) = rest.split_once('=') {
            if key == "scope" || key == "prefix" {
                return OsString::from(format!("--{}={}", key, value));
            }
        }
    }
    arg
}

fn main() -> Result<()> {
    let cli = Cli::parse_from(std::env::args_os().map(normalize_arg));

    let (operation, tokens, option, common) = match &cli.command {
        Command::Prefix(args) => (Operation::Prefix, &args.tokens, &args.prefix, &args.common),
        Command::Scope(args) => (Operation::Scope, &args.tokens, &args.scope, &args.common),
    };

    // All input validation happens before any file is read
    let request = Request::from_tokens(operation, tokens, option.as_deref())?;

    let settings = match &common.config {
        Some(path) => Settings::load(path)?,
        None => Settings::embedded()?,
    };
    let root = common
        .dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&settings.files.root));

    if common.verbose {
        println!("DEBUG: Request: {:?}", request);
        println!("DEBUG: Build directory: {}", root.display());
    }

    let storage = FsStorage::new(&root, settings.files.clone());

    let engine = match common.renderer {
        Some(RendererArg::Builtin) => RenderEngine::Builtin,
        Some(RendererArg::Lessc) => RenderEngine::Lessc,
        None => settings.render.engine,
    };
    let renderer: Box<dyn Render> = match engine {
        RenderEngine::Builtin => Box::new(NestingRenderer),
        RenderEngine::Lessc => Box::new(LesscRenderer::new(settings.render.lessc.clone())),
    };

    let minifier = CssMinifier::new(settings.files.minified_suffix.clone());
    let minifier: Option<&dyn Minify> =
        (settings.minify.enabled && !common.no_minify).then_some(&minifier as &dyn Minify);

    let mut prompter: Box<dyn Prompter> = if io::stdin().is_terminal() {
        Box::new(TerminalPrompter::new()?)
    } else {
        Box::new(NonInteractive)
    };

    let report = run(
        &request,
        &settings,
        RunOptions {
            verbose: common.verbose,
            dry_run: common.dry_run,
        },
        Collaborators {
            storage: &storage,
            renderer: renderer.as_ref(),
            minifier,
            prompter: prompter.as_mut(),
        },
    )?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    let Some(action) = report.action else {
        println!("No artifacts found.");
        return;
    };

    let label = match report.operation {
        Operation::Prefix => "Prefix",
        Operation::Scope => "Scope",
    };
    let before = report.before.as_deref().unwrap_or_default();
    let after = report.after.as_deref().unwrap_or_default();
    println!(
        "{}",
        format!("{}: {} -> {} ({})", label, before, after, action).bold()
    );

    for written in &report.written {
        println!(
            "  - {} ({})",
            written.path.display(),
            format_size(written.bytes, BINARY)
        );
    }
    for path in &report.minified {
        println!("  - {} {}", path.display(), "(minified)".dimmed());
    }

    let total: u64 = report.written.iter().map(|w| w.bytes).sum();
    println!("========================================");
    println!(
        "Files changed: {} of {} ({})",
        report.written.len().to_string().bold(),
        report.loaded,
        format_size(total, BINARY).bold()
    );
    if report.dry_run {
        println!("Dry run mode: No files were written.");
    } else if report.written.is_empty() {
        println!("{}", "Nothing to change.".green());
    } else {
        println!("{}", "Done.".green());
    }
}
