use std::{fmt, str::FromStr};

use crate::parse::{join_command, split_command, CommandParseError};

/// Behaviour fixed on a [`Command`] when it is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandOption {
    /// Print the command line to stdout as soon as the command is built.
    EchoCommand,
    /// Write output to our own stdout/stderr as it arrives instead of
    /// buffering it.
    StreamOutput,
}

/// One external program invocation. Holds no process state, so the same
/// `Command` can be run any number of times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    argv: Vec<String>,
    echo_command: bool,
    stream_output: bool,
}

impl Command {
    pub fn new(cmd: &str, options: &[CommandOption]) -> Result<Self, CommandParseError> {
        Self::from_argv(split_command(cmd)?, options)
    }

    pub fn from_argv(argv: Vec<String>, options: &[CommandOption]) -> Result<Self, CommandParseError> {
        if argv.is_empty() {
            return Err(CommandParseError::Empty(String::new()));
        }

        let mut cmd = Self {
            argv,
            echo_command: false,
            stream_output: false,
        };

        for option in options {
            match option {
                CommandOption::EchoCommand => cmd.echo_command = true,
                CommandOption::StreamOutput => cmd.stream_output = true,
            }
        }

        if cmd.echo_command {
            println!("{}", cmd.command_line());
        }

        Ok(cmd)
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn streams_output(&self) -> bool {
        self.stream_output
    }

    pub fn echoes_command(&self) -> bool {
        self.echo_command
    }

    /// The argument vector rendered back into one line, quoted where needed.
    pub fn command_line(&self) -> String {
        join_command(&self.argv)
    }
}

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s, &[])
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_program_and_args() {
        let cmd: Command = "grep -e 'a b' file".parse().unwrap();
        assert_eq!(cmd.program(), "grep");
        assert_eq!(cmd.args(), ["-e", "a b", "file"]);
        assert_eq!(cmd.command_line(), "grep -e 'a b' file");
        assert!(!cmd.streams_output());
    }

    #[test]
    fn options_compose() {
        let cmd = Command::new(
            "true",
            &[CommandOption::StreamOutput, CommandOption::EchoCommand],
        )
        .unwrap();
        assert!(cmd.streams_output());
        assert!(cmd.echoes_command());
    }

    #[test]
    fn blank_line_is_rejected() {
        assert!(matches!(
            Command::new("  ", &[CommandOption::StreamOutput]),
            Err(CommandParseError::Empty(_))
        ));
        assert!(Command::from_argv(Vec::new(), &[]).is_err());
    }

    #[test]
    fn same_line_same_command() {
        let a = Command::new("echo hi", &[CommandOption::StreamOutput]).unwrap();
        let b = Command::new("echo hi", &[CommandOption::StreamOutput]).unwrap();
        assert_eq!(a, b);
    }
}
