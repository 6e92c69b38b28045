//! Interactive input, used only when the command line leaves a choice open.

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::action::Action;
use crate::error::Error;
use crate::ident;

pub trait Prompter {
    /// Pick one action from [`Action::ALL`].
    fn choose_action(&mut self, message: &str, default: Action) -> Result<Action>;

    /// Ask for a name matching the identifier grammar.
    fn ask_name(&mut self, what: &'static str, default: Option<&str>) -> Result<String>;
}

/// Reads answers from the terminal, asking again until the answer is valid.
pub struct TerminalPrompter {
    editor: DefaultEditor,
}

impl TerminalPrompter {
    pub fn new() -> Result<Self> {
        let editor = DefaultEditor::new().context("Failed to open the terminal for input")?;
        Ok(Self { editor })
    }

    fn read(&mut self, prompt: &str) -> Result<String> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(line.trim().to_string()),
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                anyhow::bail!("input aborted")
            }
            Err(err) => Err(err).context("Failed to read input"),
        }
    }
}

impl Prompter for TerminalPrompter {
    fn choose_action(&mut self, message: &str, default: Action) -> Result<Action> {
        println!("{}", message);
        for (i, action) in Action::ALL.iter().enumerate() {
            println!("  {}) {}", i + 1, action);
        }

        loop {
            let answer = self.read(&format!("choose an action [{}]: ", default))?;
            if answer.is_empty() {
                return Ok(default);
            }
            if let Ok(n) = answer.parse::<usize>() {
                if let Some(action) = n.checked_sub(1).and_then(|i| Action::ALL.get(i)) {
                    return Ok(*action);
                }
            }
            match answer.parse::<Action>() {
                Ok(action) => return Ok(action),
                Err(_) => eprintln!("unknown action: {}", answer),
            }
        }
    }

    fn ask_name(&mut self, what: &'static str, default: Option<&str>) -> Result<String> {
        let prompt = match default {
            Some(default) => format!("enter a {} [{}]: ", what, default),
            None => format!("enter a {}: ", what),
        };

        loop {
            let answer = self.read(&prompt)?;
            let answer = match default {
                Some(default) if answer.is_empty() => default.to_string(),
                _ => answer,
            };
            if ident::is_valid(&answer) {
                return Ok(answer);
            }
            eprintln!("invalid {}", what);
        }
    }
}

/// Used when stdin is not a terminal: every question is an error.
pub struct NonInteractive;

impl Prompter for NonInteractive {
    fn choose_action(&mut self, _message: &str, _default: Action) -> Result<Action> {
        Err(Error::InputRequired { what: "action" }.into())
    }

    fn ask_name(&mut self, what: &'static str, _default: Option<&str>) -> Result<String> {
        Err(Error::InputRequired { what }.into())
    }
}
