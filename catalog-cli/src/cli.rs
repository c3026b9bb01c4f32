use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "CATALOG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database URL, overrides the configured one
    #[arg(long, global = true, env = "CATALOG_DATABASE_URL")]
    pub database: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rebuild the catalog of the configured instance and print it
    Build {
        /// Print the catalog as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve the playable stream of one channel
    Resolve {
        /// Channel id as listed by the provider
        channel_id: String,
    },

    /// Print the reference list grouped by zone
    References,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let args = Args::try_parse_from(["catalog", "build", "--json", "-v"]).unwrap();
        assert!(args.verbose);
        assert!(matches!(args.command, Commands::Build { json: true }));
    }

    #[test]
    fn resolve_requires_channel_id() {
        assert!(Args::try_parse_from(["catalog", "resolve"]).is_err());
        let args = Args::try_parse_from(["catalog", "resolve", "51"]).unwrap();
        assert!(matches!(args.command, Commands::Resolve { channel_id } if channel_id == "51"));
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Args::try_parse_from(["catalog", "-v", "-q", "references"]).is_err());
    }
}
