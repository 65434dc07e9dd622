use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "groovelog", version, about = "Track practice progress on grooves")]
pub struct Cli {
    /// Store file to use instead of the default
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,
    /// Config file to read instead of the platform default
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Raise log verbosity (repeatable)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List grooves through the saved filters
    List {
        /// Title/artist substring, case-insensitive
        #[arg(long)]
        filter: Option<String>,
    },
    /// Add a new groove
    Add {
        /// Title of the groove
        title: String,
        #[arg(long)]
        artist: Option<String>,
        #[arg(long)]
        note: Option<String>,
        /// Tags (repeatable)
        #[arg(long = "tag", short = 't')]
        tags: Vec<String>,
        /// Reference link as NAME=URL, up to three (repeatable)
        #[arg(long = "link", short = 'l')]
        links: Vec<String>,
    },
    /// Edit an existing groove
    Edit {
        /// Groove id to edit
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        artist: Option<String>,
        #[arg(long)]
        note: Option<String>,
        /// Add tags (repeatable)
        #[arg(long = "tag", short = 't')]
        tags: Vec<String>,
        /// Remove all tags before adding
        #[arg(long)]
        clear_tags: bool,
        /// Set a link slot as SLOT:NAME=URL, slot 1-3 (repeatable)
        #[arg(long = "link", short = 'l')]
        links: Vec<String>,
        /// Blank a link slot, 1-3 (repeatable)
        #[arg(long = "clear-link")]
        clear_links: Vec<usize>,
    },
    /// Set practice progress (1-5, 5 = complete)
    Progress {
        id: String,
        level: u8,
    },
    /// Delete a groove
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Move incomplete grooves ahead of complete ones
    Sort,
    /// Show every tag in use
    Tags,
    /// Save the tag filter, or clear it
    Tag {
        tag: Option<String>,
        #[arg(long, conflicts_with = "tag")]
        clear: bool,
    },
    /// Save the incomplete-only filter
    Incomplete {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Show, set or clear the goal note
    Goal {
        text: Option<String>,
        #[arg(long, conflicts_with = "text")]
        clear: bool,
        /// Skip the confirmation prompt when clearing
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Write every groove to grooves.json
    Export {
        /// Directory to write into (defaults to the current directory)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Replace every groove with the contents of a JSON file
    Import {
        file: PathBuf,
    },
    /// Launch the interactive TUI
    Tui,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Toggle {
    On,
    Off,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_invocation_has_no_subcommand() {
        let cli = Cli::try_parse_from(["groovelog"]).expect("parse");
        assert!(cli.command.is_none());
    }

    #[test]
    fn add_collects_repeated_tags_and_links() {
        let cli = Cli::try_parse_from([
            "groovelog",
            "add",
            "Chameleon",
            "-t",
            "funk",
            "-t",
            "jazz",
            "-l",
            "live=https://example.com",
        ])
        .expect("parse");
        match cli.command {
            Some(Command::Add { title, tags, links, .. }) => {
                assert_eq!(title, "Chameleon");
                assert_eq!(tags, vec!["funk", "jazz"]);
                assert_eq!(links, vec!["live=https://example.com"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn tag_and_clear_conflict() {
        assert!(Cli::try_parse_from(["groovelog", "tag", "jazz", "--clear"]).is_err());
    }

    #[test]
    fn global_store_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["groovelog", "sort", "--store", "/tmp/s.yml"])
            .expect("parse");
        assert_eq!(cli.store, Some(PathBuf::from("/tmp/s.yml")));
    }
}
