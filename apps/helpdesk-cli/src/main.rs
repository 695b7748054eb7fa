//! Helpdesk CLI
//!
//! Load tickets into all three stores, apply cross-store updates, and
//! inspect what each store holds.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use helpdesk_core::{TicketPriority, TicketStatus};

#[derive(Parser)]
#[command(name = "helpdesk", version, about = "Cross-store helpdesk ticket tool")]
struct Cli {
    /// Configuration file (defaults to the platform config dir)
    #[arg(long, global = true, env = "HELPDESK_CONFIG")]
    config: Option<PathBuf>,

    /// Open the document database directly instead of going through the API
    #[arg(long, global = true, default_value_t = false)]
    direct: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create store files and write a default config if none exists.
    Init,
    /// Load tickets (with their customer and agent) from a JSON file.
    Load {
        /// JSON array of `{ticket, customer, agent}` records
        file: PathBuf,
    },
    /// Change a ticket's status and/or priority in every store.
    Update {
        #[arg(long)]
        ticket: String,
        /// Agent the ticket is filed under
        #[arg(long)]
        agent: String,
        /// open, in_progress or resolved
        #[arg(long)]
        status: Option<TicketStatus>,
        /// high, medium or low
        #[arg(long)]
        priority: Option<TicketPriority>,
    },
    /// Show a ticket's document, graph node, and activity log.
    Show { ticket: String },
    /// List tickets created by or assigned to a user.
    Tickets {
        user: String,
        /// Follow created_by instead of assigned_to
        #[arg(long, default_value_t = false)]
        created: bool,
    },
    /// Ticket messages.
    #[command(subcommand)]
    Message(MessageCommand),
}

#[derive(Subcommand)]
enum MessageCommand {
    /// Append a customer message to a ticket.
    Add {
        #[arg(long)]
        ticket: String,
        #[arg(long)]
        customer: String,
        #[arg(long)]
        text: String,
    },
    /// Full-text search over message bodies.
    Search { text: String },
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let cli = Cli::parse();

    if let Command::Init = cli.command {
        return commands::init(cli.config.as_deref(), cli.direct);
    }

    let config = helpdesk_core::HelpdeskConfig::resolve(cli.config.as_deref())?;
    let updater = commands::open_stores(&config, cli.direct)?;

    match cli.command {
        Command::Init => Ok(()),
        Command::Load { file } => commands::load(&updater, &file),
        Command::Update {
            ticket,
            agent,
            status,
            priority,
        } => commands::update(&updater, &ticket, &agent, status, priority),
        Command::Show { ticket } => commands::show(&updater, &ticket),
        Command::Tickets { user, created } => commands::tickets(&updater, &user, created),
        Command::Message(MessageCommand::Add {
            ticket,
            customer,
            text,
        }) => commands::add_message(&updater, &ticket, &customer, &text),
        Command::Message(MessageCommand::Search { text }) => {
            commands::search_messages(&updater, &text)
        }
    }
}
