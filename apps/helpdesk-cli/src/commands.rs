//! Command implementations

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use helpdesk_core::{
    CrossStoreUpdater, DocumentStore, GraphUser, HelpdeskConfig, HttpDocumentStore, StoreError,
    SqliteDocumentStore, SqliteGraphStore, SqliteWideColumnStore, Ticket, TicketPriority,
    TicketStatus, TicketUpdate, UpdateError, UserEdge,
};

type CliResult = Result<(), Box<dyn Error>>;

/// One entry of a load file.
#[derive(Debug, Deserialize)]
pub struct LoadRecord {
    pub ticket: Ticket,
    pub customer: GraphUser,
    pub agent: GraphUser,
}

pub fn parse_load_file(json: &str) -> Result<Vec<LoadRecord>, serde_json::Error> {
    serde_json::from_str(json)
}

fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|e| StoreError::Storage(format!("create {}: {}", parent.display(), e))),
        _ => Ok(()),
    }
}

/// Open all three stores described by `config`.
///
/// With `direct` the document database is opened in-process instead of
/// through the document API.
pub fn open_stores(config: &HelpdeskConfig, direct: bool) -> Result<CrossStoreUpdater, Box<dyn Error>> {
    config.validate()?;

    let documents: Arc<dyn DocumentStore> = if direct {
        ensure_parent(&config.server.database_path)?;
        Arc::new(SqliteDocumentStore::open(&config.server.database_path)?)
    } else {
        Arc::new(HttpDocumentStore::new(
            &config.document_store.base_url,
            config.document_store.timeout(),
        )?)
    };

    ensure_parent(&config.wide_column.path)?;
    let projections = Arc::new(SqliteWideColumnStore::open(&config.wide_column.path)?);
    ensure_parent(&config.graph.path)?;
    let graph = Arc::new(SqliteGraphStore::open(&config.graph.path)?);

    tracing::debug!(
        wide_column = %config.wide_column.path.display(),
        graph = %config.graph.path.display(),
        direct,
        "stores opened"
    );
    Ok(CrossStoreUpdater::new(documents, projections, graph))
}

pub fn init(config_path: Option<&Path>, direct: bool) -> CliResult {
    let path = match config_path {
        Some(path) => Some(path.to_path_buf()),
        None => HelpdeskConfig::default_path(),
    };
    if let Some(path) = &path {
        if !path.exists() {
            ensure_parent(path)?;
            std::fs::write(path, HelpdeskConfig::default().to_toml()?)?;
            println!("Wrote default config to {}", path.display());
        }
    }

    let config = HelpdeskConfig::resolve(path.as_deref())?;
    config.validate()?;
    // Schemas are created on open. Without --direct the server owns the document database.
    if direct {
        ensure_parent(&config.server.database_path)?;
        SqliteDocumentStore::open(&config.server.database_path)?;
        println!("Documents:   {}", config.server.database_path.display());
    }
    ensure_parent(&config.wide_column.path)?;
    SqliteWideColumnStore::open(&config.wide_column.path)?;
    ensure_parent(&config.graph.path)?;
    SqliteGraphStore::open(&config.graph.path)?;
    println!("Wide column: {}", config.wide_column.path.display());
    println!("Graph:       {}", config.graph.path.display());
    Ok(())
}

pub fn load(updater: &CrossStoreUpdater, file: &Path) -> CliResult {
    let records = parse_load_file(&std::fs::read_to_string(file)?)?;
    let total = records.len();
    for record in records {
        let ticket = updater.load_ticket(&record.ticket, &record.customer, &record.agent)?;
        println!("Loaded {} ({} / {})", ticket.uuid, ticket.status, ticket.priority);
    }
    println!("{} ticket(s) loaded", total);
    Ok(())
}

pub fn update(
    updater: &CrossStoreUpdater,
    ticket_id: &str,
    agent_id: &str,
    status: Option<TicketStatus>,
    priority: Option<TicketPriority>,
) -> CliResult {
    let update = TicketUpdate { status, priority };
    match updater.update_ticket(ticket_id, agent_id, &update) {
        Ok(outcome) => {
            println!(
                "Updated {}: status={} priority={}",
                outcome.ticket.uuid, outcome.ticket.status, outcome.ticket.priority
            );
            for activity in &outcome.activities {
                println!(
                    "  {} {} -> {}",
                    activity.activity_timestamp.to_rfc3339(),
                    activity.activity_type,
                    activity.status
                );
            }
            if let Some(err) = outcome.mirror_error {
                eprintln!("warning: {}", err);
            }
            Ok(())
        }
        Err(UpdateError::PartialUpdate {
            ticket_id,
            committed,
            failed,
            displaced,
            source,
        }) => {
            let committed: Vec<String> = committed.iter().map(|t| t.to_string()).collect();
            eprintln!("Ticket {} partially updated", ticket_id);
            eprintln!("  committed: document, {}", committed.join(", "));
            eprintln!("  failed:    {} ({})", failed, source);
            if let Some(table) = displaced {
                eprintln!("  displaced: {} row removed and not restored", table);
            }
            Err(format!("partial update of {}", ticket_id).into())
        }
        Err(err) => Err(err.into()),
    }
}

pub fn show(updater: &CrossStoreUpdater, ticket_id: &str) -> CliResult {
    let ticket = updater
        .documents()
        .get_ticket(ticket_id)?
        .ok_or_else(|| format!("ticket {} not found", ticket_id))?;
    println!("{}", serde_json::to_string_pretty(&ticket)?);

    match updater.graph().find_ticket(ticket_id)? {
        Some(node) => {
            let user = |r: &Option<helpdesk_core::graph::UserRef>| {
                r.as_ref().map(|r| r.user_id.clone()).unwrap_or_else(|| "-".to_string())
            };
            println!(
                "\nGraph node {}: status={} priority={} created_by={} assigned_to={}",
                node.uid,
                node.status,
                node.priority,
                user(&node.created_by),
                user(&node.assigned_to)
            );
        }
        None => println!("\nGraph node: none"),
    }

    let log = updater.activity_log(ticket_id)?;
    println!("\nActivity ({}):", log.len());
    for row in log {
        let cell = |name: &str| row.get(name).map(|v| v.to_string()).unwrap_or_default();
        println!(
            "  {} {} {} by {}",
            cell("activity_timestamp"),
            cell("activity_type"),
            cell("status"),
            cell("agent_id")
        );
    }
    Ok(())
}

pub fn tickets(updater: &CrossStoreUpdater, user_id: &str, created: bool) -> CliResult {
    let edge = if created {
        UserEdge::CreatedBy
    } else {
        UserEdge::AssignedTo
    };
    for node in updater.graph().tickets_for_user(user_id, edge)? {
        println!(
            "{}  {:<11} {:<6} {}",
            node.ticket_id,
            node.status,
            node.priority,
            node.created_at.to_rfc3339()
        );
    }
    Ok(())
}

pub fn add_message(
    updater: &CrossStoreUpdater,
    ticket_id: &str,
    customer_id: &str,
    text: &str,
) -> CliResult {
    let outcome = updater.add_message(ticket_id, customer_id, text)?;
    match outcome.node {
        Some(node) => println!(
            "Message added at {} (node {})",
            outcome.message.timestamp.to_rfc3339(),
            node.uid
        ),
        None => println!("Message added at {}", outcome.message.timestamp.to_rfc3339()),
    }
    if let Some(err) = outcome.mirror_error {
        eprintln!("warning: {}", err);
    }
    Ok(())
}

pub fn search_messages(updater: &CrossStoreUpdater, text: &str) -> CliResult {
    let hits = updater.graph().search_messages(text)?;
    if hits.is_empty() {
        println!("No messages match {:?}", text);
    }
    for hit in hits {
        println!(
            "{} [{}] {}",
            hit.timestamp.to_rfc3339(),
            hit.ticket_id,
            hit.message_text
        );
    }
    Ok(())
}
