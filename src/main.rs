use clap::{Parser, Subcommand};
use semantic_db::{Result, SemanticError};
use semantic_db::commands::{list_records, reload, search, serve_mcp, show_status, sync};
use semantic_db::config::{CONFIG_DIR_ENV, get_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "semantic-db")]
#[command(about = "Semantic search over named JSON record collections, with an MCP server")]
#[command(version)]
struct Cli {
    /// Configuration directory (default: platform config dir + /semantic-db)
    #[arg(long, global = true, env = CONFIG_DIR_ENV)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and collection sources
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Load every collection and start the MCP server on stdio
    Serve,
    /// Search a collection with a natural-language query
    Search {
        /// Collection name, e.g. "abilities"
        collection: String,
        /// Query text
        query: String,
        /// Maximum number of results (default from config)
        #[arg(long, short = 'k')]
        top_k: Option<usize>,
    },
    /// Print every record of a collection
    List {
        /// Collection name
        collection: String,
    },
    /// Reload every collection from disk
    Reload,
    /// Pull the data directory, then reload every collection
    Sync,
    /// Show embedding server health and collection load status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries MCP traffic and command output
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir().map_err(|e| SemanticError::Config(e.to_string()))?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Serve => {
            serve_mcp(&config_dir).await?;
        }
        Commands::Search {
            collection,
            query,
            top_k,
        } => {
            search(&config_dir, &collection, &query, top_k)?;
        }
        Commands::List { collection } => {
            list_records(&config_dir, &collection)?;
        }
        Commands::Reload => {
            reload(&config_dir)?;
        }
        Commands::Sync => {
            sync(&config_dir)?;
        }
        Commands::Status => {
            show_status(&config_dir)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["semantic-db", "reload"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Reload));
        }
    }

    #[test]
    fn search_command_with_defaults() {
        let cli = Cli::try_parse_from(["semantic-db", "search", "abilities", "teleport"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search {
                collection,
                query,
                top_k,
            } = parsed.command
            {
                assert_eq!(collection, "abilities");
                assert_eq!(query, "teleport");
                assert_eq!(top_k, None);
            } else {
                panic!("expected search command");
            }
        }
    }

    #[test]
    fn search_command_with_top_k() {
        let cli = Cli::try_parse_from([
            "semantic-db",
            "search",
            "shaders",
            "glowing water",
            "--top-k",
            "5",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search { top_k, .. } = parsed.command {
                assert_eq!(top_k, Some(5));
            } else {
                panic!("expected search command");
            }
        }
    }

    #[test]
    fn global_config_dir() {
        let cli = Cli::try_parse_from([
            "semantic-db",
            "list",
            "objectives",
            "--config-dir",
            "/tmp/sdb",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert_eq!(parsed.config_dir, Some(PathBuf::from("/tmp/sdb")));
            assert!(matches!(
                parsed.command,
                Commands::List { collection } if collection == "objectives"
            ));
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["semantic-db", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Config { show: true }));
        }
    }

    #[test]
    fn missing_query_is_rejected() {
        let cli = Cli::try_parse_from(["semantic-db", "search", "abilities"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["semantic-db", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["semantic-db", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
