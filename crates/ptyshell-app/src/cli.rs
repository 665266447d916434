use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for ptyshell
#[derive(Parser, Debug)]
#[command(name = "ptyshell")]
#[command(about = "Interactive shell console over a pseudo-terminal, with history suggestions and job control")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file (default: ~/.ptyshell/config.toml)
    #[arg(long, value_name = "FILE", env = "PTYSHELL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Working directory for the shell and for jobs
    #[arg(short = 'C', long, value_name = "DIR", env = "PTYSHELL_WORKDIR", global = true)]
    pub working_dir: Option<PathBuf>,

    /// History file (JSON lines)
    #[arg(long, value_name = "FILE", env = "PTYSHELL_HISTORY", global = true)]
    pub history_file: Option<PathBuf>,

    /// Directory for the diagnostic log and session transcripts
    #[arg(long, value_name = "DIR", env = "PTYSHELL_LOG_DIR", global = true)]
    pub log_dir: Option<PathBuf>,

    /// Write a JSON-lines transcript of every session
    #[arg(long, global = true)]
    pub transcripts: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run an interactive shell (the default)
    Shell {
        /// Shell program, overriding the config file and $SHELL
        #[arg(value_name = "SHELL", env = "PTYSHELL_SHELL")]
        shell: Option<String>,

        /// Arguments passed to the shell program
        #[arg(last = true, value_name = "ARGS")]
        args: Vec<String>,
    },

    /// Run one command line; a trailing `&` runs it as a background job
    Exec {
        #[arg(
            value_name = "LINE",
            required = true,
            num_args = 1..,
            trailing_var_arg = true,
            allow_hyphen_values = true
        )]
        line: Vec<String>,
    },

    /// Search the command history, or show the most used commands
    History {
        /// Fuzzy query; without it the most recent commands are listed
        #[arg(value_name = "QUERY")]
        query: Option<String>,

        /// Show the N most used commands instead
        #[arg(long, value_name = "N", conflicts_with = "query")]
        top: Option<usize>,
    },

    /// Show how a line is tokenized and the first diagnostic for it
    Tokenize {
        #[arg(
            value_name = "LINE",
            required = true,
            num_args = 1..,
            trailing_var_arg = true,
            allow_hyphen_values = true
        )]
        line: Vec<String>,

        /// Print tokens as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// The subcommand to run, interactive shell when none was given
    pub fn command_or_default(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Shell {
            shell: None,
            args: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_means_shell() {
        let cli = Cli::try_parse_from(["ptyshell"]).unwrap();
        assert!(matches!(cli.command_or_default(), Commands::Shell { .. }));
    }

    #[test]
    fn test_exec_joins_words() {
        let cli = Cli::try_parse_from(["ptyshell", "exec", "echo", "hi", "&"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Exec {
                line: vec!["echo".to_string(), "hi".to_string(), "&".to_string()],
            })
        );
    }

    #[test]
    fn test_history_top_conflicts_with_query() {
        assert!(Cli::try_parse_from(["ptyshell", "history", "git", "--top", "3"]).is_err());
        let cli = Cli::try_parse_from(["ptyshell", "history", "--top", "3"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::History { query: None, top: Some(3) })
        );
    }

    #[test]
    fn test_flags_and_line_words() {
        let cli = Cli::try_parse_from(["ptyshell", "history", "--transcripts"]).unwrap();
        assert!(cli.transcripts);

        // Everything after the first word of a line belongs to the line
        let cli = Cli::try_parse_from(["ptyshell", "exec", "ls", "-la", "--transcripts"]).unwrap();
        assert!(!cli.transcripts);
        assert_eq!(
            cli.command,
            Some(Commands::Exec {
                line: vec!["ls".to_string(), "-la".to_string(), "--transcripts".to_string()],
            })
        );
    }
}
