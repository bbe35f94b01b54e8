use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mediarelay")]
#[command(author, version, about = "Telegram bot that relays Facebook, TikTok and YouTube media", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the bot with long polling
    Run,

    /// Resolve a link without Telegram and print the result
    ///
    /// A redirect-page link is decoded back into its fields instead.
    Resolve {
        /// Facebook, TikTok or YouTube URL
        url: String,

        /// Print the resolved media as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search YouTube and list the hits
    Search {
        /// Search query
        query: String,

        /// Number of results (1-50)
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolve() {
        let cli = Cli::try_parse_from(["mediarelay", "resolve", "https://youtu.be/x", "--json"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Resolve {
                url: "https://youtu.be/x".to_string(),
                json: true,
            })
        );
    }

    #[test]
    fn test_parse_search_limit() {
        let cli = Cli::try_parse_from(["mediarelay", "search", "alan walker", "-l", "3"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Search {
                query: "alan walker".to_string(),
                limit: Some(3),
            })
        );
    }

    #[test]
    fn test_no_subcommand_defaults_to_none() {
        let cli = Cli::try_parse_from(["mediarelay"]).unwrap();
        assert!(cli.command.is_none());
    }
}
