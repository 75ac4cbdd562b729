//! Switchboard CLI - serve and administer the inter-agent messaging backend.
//!
//! Reuses the same core services (switchboard-core) and server bootstrap
//! (switchboard-server) as the HTTP API.

use clap::{Parser, Subcommand};

use switchboard_cli::commands;

/// Switchboard CLI - Permissioned messaging between tenant agents
#[derive(Parser)]
#[command(name = "switchboard", version, about = "Switchboard CLI - Permissioned messaging between tenant agents")]
pub struct Cli {
    /// Path to the SQLite database file
    #[arg(long, env = "SWITCHBOARD_DB_PATH", default_value = "switchboard.db")]
    db: String,

    /// HS256 secret for bearer tokens
    #[arg(long, env = "SWITCHBOARD_JWT_SECRET", default_value = "dev-secret")]
    jwt_secret: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Switchboard HTTP backend server
    Server {
        /// Host to bind to
        #[arg(long, env = "SWITCHBOARD_HOST", default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(long, env = "SWITCHBOARD_PORT", default_value_t = 3210)]
        port: u16,
    },

    /// Manage agents
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },

    /// Inspect or replace an agent's allowlist
    Allowlist {
        #[command(subcommand)]
        action: AllowlistAction,
    },

    /// Print the tenant's communication graph
    Graph {
        #[arg(long)]
        tenant: String,
    },

    /// Message log views
    Messages {
        #[command(subcommand)]
        action: MessagesAction,
    },

    /// Manage workflow templates
    Templates {
        #[command(subcommand)]
        action: TemplatesAction,
    },

    /// Mint a bearer token for a tenant
    Token {
        #[arg(long)]
        tenant: String,
        /// Actor id carried in the `sub` claim
        #[arg(long, default_value = "cli")]
        actor: String,
        #[arg(long, default_value_t = 24)]
        ttl_hours: i64,
    },
}

#[derive(Subcommand)]
enum AgentAction {
    /// List agents of a tenant
    List {
        #[arg(long)]
        tenant: String,
    },
    /// Register an agent
    Add {
        #[arg(long)]
        tenant: String,
        /// Agent ID (generated when omitted)
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        name: String,
        #[arg(long)]
        role: Option<String>,
    },
}

#[derive(Subcommand)]
enum AllowlistAction {
    /// Show an agent's outbound entries
    Show {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        agent: String,
    },
    /// Replace an agent's entries
    Set {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        agent: String,
        /// Entries as `agent-id[:direction]` (comma-separated); empty clears
        #[arg(long, value_delimiter = ',')]
        allow: Vec<String>,
        #[arg(long, default_value = "cli")]
        actor: String,
    },
}

#[derive(Subcommand)]
enum MessagesAction {
    /// Status counts, active threads and delivery latency
    Stats {
        #[arg(long)]
        tenant: String,
    },
    /// Bulk export, capped at the export ceiling
    Export {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        correlation_id: Option<String>,
    },
}

#[derive(Subcommand)]
enum TemplatesAction {
    /// List templates visible to a tenant
    List {
        #[arg(long)]
        tenant: String,
    },
    /// Register a tenant template from a YAML file
    Add {
        #[arg(long)]
        tenant: String,
        /// Path to the template YAML file
        file: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "switchboard_core=warn,switchboard_server=info,switchboard_cli=info".into()
            }),
        )
        .init();

    let result = match cli.command {
        Some(Commands::Server { host, port }) => {
            commands::server::run(host, port, cli.db, cli.jwt_secret).await
        }
        Some(Commands::Token {
            tenant,
            actor,
            ttl_hours,
        }) => commands::token::issue(&cli.jwt_secret, &tenant, &actor, ttl_hours)
            .map(|v| commands::print_json(&v)),
        Some(command) => run_with_state(&cli.db, &cli.jwt_secret, command).await,
        None => {
            use clap::CommandFactory;
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run_with_state(db: &str, jwt_secret: &str, command: Commands) -> Result<(), String> {
    let state = commands::init_state(db, jwt_secret).await?;

    let output = match command {
        Commands::Agent { action } => match action {
            AgentAction::List { tenant } => commands::agent::list(&state, &tenant).await,
            AgentAction::Add {
                tenant,
                id,
                name,
                role,
            } => commands::agent::add(&state, &tenant, id.as_deref(), &name, role.as_deref()).await,
        },
        Commands::Allowlist { action } => match action {
            AllowlistAction::Show { tenant, agent } => {
                commands::allowlist::show(&state, &tenant, &agent).await
            }
            AllowlistAction::Set {
                tenant,
                agent,
                allow,
                actor,
            } => commands::allowlist::set(&state, &tenant, &agent, &allow, &actor).await,
        },
        Commands::Graph { tenant } => commands::allowlist::graph(&state, &tenant).await,
        Commands::Messages { action } => match action {
            MessagesAction::Stats { tenant } => commands::messages::stats(&state, &tenant).await,
            MessagesAction::Export {
                tenant,
                correlation_id,
            } => commands::messages::export(&state, &tenant, correlation_id.as_deref()).await,
        },
        Commands::Templates { action } => match action {
            TemplatesAction::List { tenant } => commands::workflow::list(&state, &tenant).await,
            TemplatesAction::Add { tenant, file } => {
                commands::workflow::add(&state, &tenant, &file).await
            }
        },
        Commands::Server { .. } | Commands::Token { .. } => {
            return Err("command does not use local state".to_string())
        }
    }?;

    commands::print_json(&output);
    Ok(())
}
