use clap::{Parser, Subcommand};

/// MCP gateway: token-authenticated tool surface for AI agents
#[derive(Parser)]
#[command(name = "mcp-gateway", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to bind (defaults to MCP_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage bearer tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Inspect or change the persisted feature switches
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },

    /// Enable or disable individual tools
    Tool {
        #[command(subcommand)]
        command: ToolCommands,
    },

    /// User directory helpers
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Issue a token for a directory user
    Issue {
        /// Login of the user the token acts as
        #[arg(long)]
        user: String,
        /// Lifetime in seconds
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// List live tokens
    List,
    /// Revoke a token
    Revoke {
        #[arg(long)]
        jti: String,
    },
    /// Discard the signing secret and every issued token
    Reset,
}

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Print the current switches
    Show,
    /// Set one switch, e.g. `settings set enabled true`
    Set {
        flag: String,
        #[arg(action = clap::ArgAction::Set)]
        value: bool,
    },
}

#[derive(Subcommand)]
pub enum ToolCommands {
    Enable { name: String },
    Disable { name: String },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Hash a password for the YAML user directory
    HashPassword {
        #[arg(long, env = "MCP_PASSWORD")]
        password: String,
    },
}
