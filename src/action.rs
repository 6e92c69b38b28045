//! What a run should do, as requested on the command line.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::ident;

/// The transformation applied to every artifact of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Drop the current scope/prefix and apply a new one.
    Replace,
    /// Keep the current scope/prefix and extend it.
    Append,
    /// Restore the unscoped / default-prefixed build.
    Cleanup,
    /// Leave everything as it is.
    Nothing,
}

impl Action {
    pub const ALL: [Action; 4] = [
        Action::Replace,
        Action::Append,
        Action::Cleanup,
        Action::Nothing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Replace => "replace",
            Action::Append => "append",
            Action::Cleanup => "cleanup",
            Action::Nothing => "nothing",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| Error::UnknownToken(s.to_string()))
    }
}

/// Which of the two operations a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Prefix,
    Scope,
}

impl Operation {
    /// Label used in prompts and error messages.
    pub fn noun(self) -> &'static str {
        match self {
            Operation::Prefix => "prefix",
            Operation::Scope => "scope-name",
        }
    }

    /// Action taken silently when nothing has been applied yet.
    pub fn primary_action(self) -> Action {
        match self {
            Operation::Prefix => Action::Replace,
            Operation::Scope => Action::Append,
        }
    }

    /// Keys accepted in `key=value` tokens.
    fn keys(self) -> &'static [&'static str] {
        match self {
            Operation::Prefix => &["prefix", "p"],
            Operation::Scope => &["scope", "s"],
        }
    }
}

/// Validated user input for one run. Building one performs every check that
/// must happen before any file is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub operation: Operation,
    pub action: Option<Action>,
    pub name: Option<String>,
}

impl Request {
    /// Parse positional tokens such as `replace` or `scope=my-scope`.
    ///
    /// `option` is the value of the equivalent named flag; a token assignment
    /// takes precedence over it.
    pub fn from_tokens<I, S>(operation: Operation, tokens: I, option: Option<&str>) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut actions = Vec::new();
        let mut name = option.map(str::to_string);

        for token in tokens {
            let token = token.as_ref();
            if let Some((key, value)) = token.split_once('=') {
                if !operation.keys().contains(&key.trim_start_matches('-')) {
                    return Err(Error::UnknownToken(token.to_string()));
                }
                name = Some(value.to_string());
            } else {
                let action = token.parse::<Action>()?;
                if !actions.contains(&action) {
                    actions.push(action);
                }
            }
        }

        if actions.len() > 1 {
            return Err(Error::AmbiguousAction(actions));
        }

        let name = name
            .map(|name| ident::validate(operation.noun(), &name))
            .transpose()?;

        Ok(Self {
            operation,
            action: actions.pop(),
            name,
        })
    }
}

/// Outcome of [`resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Chosen(Action),
    /// The build is already transformed and no action was given; ask.
    Ask { default: Action },
}

/// Decide the action from the request and whether a scope/prefix is present.
pub fn resolve(requested: Option<Action>, operation: Operation, already_applied: bool) -> Resolution {
    match requested {
        Some(action) => Resolution::Chosen(action),
        None if !already_applied => Resolution::Chosen(operation.primary_action()),
        None => Resolution::Ask {
            default: Action::Replace,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action_and_assignment() {
        let request =
            Request::from_tokens(Operation::Scope, ["replace", "scope=my-scope"], None).unwrap();
        assert_eq!(request.action, Some(Action::Replace));
        assert_eq!(request.name.as_deref(), Some("my-scope"));
    }

    #[test]
    fn test_parse_dashed_assignment() {
        let request = Request::from_tokens(Operation::Prefix, ["-p=xy"], None).unwrap();
        assert_eq!(request.action, None);
        assert_eq!(request.name.as_deref(), Some("xy"));

        let request = Request::from_tokens(Operation::Scope, ["-scope=a1"], None).unwrap();
        assert_eq!(request.name.as_deref(), Some("a1"));
    }

    #[test]
    fn test_named_option_is_used() {
        let request =
            Request::from_tokens(Operation::Prefix, ["append"], Some("abc")).unwrap();
        assert_eq!(request.action, Some(Action::Append));
        assert_eq!(request.name.as_deref(), Some("abc"));
    }

    #[test]
    fn test_multiple_actions_are_ambiguous() {
        let err = Request::from_tokens(Operation::Scope, ["replace", "cleanup"], None).unwrap_err();
        assert!(matches!(err, Error::AmbiguousAction(ref a) if a == &[Action::Replace, Action::Cleanup]));
        assert!(err.to_string().contains("multiple actions found: replace, cleanup"));
    }

    #[test]
    fn test_repeated_action_is_not_ambiguous() {
        let request = Request::from_tokens(Operation::Scope, ["append", "append"], None).unwrap();
        assert_eq!(request.action, Some(Action::Append));
    }

    #[test]
    fn test_invalid_name_is_rejected() {
        let err = Request::from_tokens(Operation::Scope, ["scope=2bad"], None).unwrap_err();
        assert!(matches!(err, Error::InvalidName { .. }));
        let err = Request::from_tokens(Operation::Prefix, [] as [&str; 0], Some("")).unwrap_err();
        assert!(matches!(err, Error::InvalidName { .. }));
    }

    #[test]
    fn test_unknown_tokens_are_rejected() {
        assert!(matches!(
            Request::from_tokens(Operation::Scope, ["explode"], None),
            Err(Error::UnknownToken(_))
        ));
        assert!(matches!(
            Request::from_tokens(Operation::Scope, ["prefix=xy"], None),
            Err(Error::UnknownToken(_))
        ));
    }

    #[test]
    fn test_resolve() {
        assert_eq!(
            resolve(Some(Action::Cleanup), Operation::Scope, false),
            Resolution::Chosen(Action::Cleanup)
        );
        assert_eq!(
            resolve(None, Operation::Scope, false),
            Resolution::Chosen(Action::Append)
        );
        assert_eq!(
            resolve(None, Operation::Prefix, false),
            Resolution::Chosen(Action::Replace)
        );
        assert_eq!(
            resolve(None, Operation::Scope, true),
            Resolution::Ask {
                default: Action::Replace
            }
        );
    }
}
