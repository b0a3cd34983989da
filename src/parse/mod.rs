use std::borrow::Cow;

use itertools::Itertools;
use logos::Logos;
use thiserror::Error;

use self::token::{Fragment, LexerError};

pub mod token;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandParseError {
    #[error("failed to tokenize command")]
    Lexer(#[from] LexerError),
    #[error("unterminated single-quoted string")]
    UnterminatedSingleQuote,
    #[error("unterminated double-quoted string")]
    UnterminatedDoubleQuote,
    #[error("unterminated backslash escape")]
    UnterminatedEscape,
    #[error("no arguments in command {0:?}")]
    Empty(String),
}

/// Splits a command line into its arguments the way a POSIX shell would,
/// without performing any expansion.
///
/// Fails if a quote or escape is left open, or if the line holds no words.
pub fn split_command(cmd: &str) -> Result<Vec<String>, CommandParseError> {
    let mut args = Vec::new();
    // `None` until something (possibly an empty quoted string) starts a word
    let mut current: Option<String> = None;

    for fragment in Fragment::lexer(cmd) {
        match fragment? {
            Fragment::Blank => {
                if let Some(arg) = current.take() {
                    args.push(arg);
                }
            }
            Fragment::Bare(seg) | Fragment::SingleQuoted(seg) => {
                current.get_or_insert_with(String::new).push_str(seg);
            }
            Fragment::DoubleQuoted(seg) => {
                current.get_or_insert_with(String::new).push_str(&seg);
            }
            Fragment::Escaped(c) => {
                current.get_or_insert_with(String::new).push(c);
            }
            Fragment::LineContinuation => continue,
            Fragment::UnterminatedSingleQuote => {
                return Err(CommandParseError::UnterminatedSingleQuote)
            }
            Fragment::UnterminatedDoubleQuote => {
                return Err(CommandParseError::UnterminatedDoubleQuote)
            }
            Fragment::UnterminatedEscape => return Err(CommandParseError::UnterminatedEscape),
        }
    }

    if let Some(arg) = current {
        args.push(arg);
    }

    if args.is_empty() {
        return Err(CommandParseError::Empty(cmd.to_owned()));
    }

    Ok(args)
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | ',' | '+' | '=' | '@' | '%')
}

/// Quotes a single argument so that [`split_command`] reads it back unchanged.
pub fn quote(arg: &str) -> Cow<'_, str> {
    if !arg.is_empty() && arg.chars().all(is_shell_safe) {
        return Cow::Borrowed(arg);
    }

    Cow::Owned(format!("'{}'", arg.replace('\'', r"'\''")))
}

/// Renders an argument vector back into a single command line.
pub fn join_command<S: AsRef<str>>(args: &[S]) -> String {
    args.iter().map(|arg| quote(arg.as_ref())).join(" ")
}
