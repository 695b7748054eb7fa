//! Cross-store update integration tests

mod common;

use std::sync::Arc;

use common::{text, Harness, AGENT, CUSTOMER};
use helpdesk_core::{
    CrossStoreUpdater, DocumentStore, GraphStore, GraphUser, Missing, Role, SqliteGraphStore,
    StoreError, Table, Ticket, TicketNode, TicketPriority, TicketStatus, TicketUpdate,
    UpdateError, UserEdge, WideColumnStore,
};

// === Consistency ===

#[test]
fn test_status_reaches_every_status_projection() {
    let (h, ticket) = Harness::with_ticket(TicketPriority::Medium);

    let outcome = h
        .updater
        .update_ticket(&ticket.uuid, AGENT, &TicketUpdate::status(TicketStatus::InProgress))
        .unwrap();
    assert_eq!(outcome.ticket.status, TicketStatus::InProgress);
    assert!(outcome.mirror_error.is_none());

    for table in Table::TICKET_PROJECTIONS {
        if let Some(column) = table.status_column() {
            let row = h.only_row(table, &ticket);
            assert_eq!(row[column], text("in_progress"), "status in {}", table);
        }
    }
    let doc = h.docs.get_ticket(&ticket.uuid).unwrap().unwrap();
    assert_eq!(doc.status, TicketStatus::InProgress);
    let node = h.graph.find_ticket(&ticket.uuid).unwrap().unwrap();
    assert_eq!(node.status, TicketStatus::InProgress);
}

#[test]
fn test_priority_change_leaves_one_urgent_row() {
    let (h, ticket) = Harness::with_ticket(TicketPriority::Low);

    for priority in [TicketPriority::Medium, TicketPriority::High] {
        h.updater
            .update_ticket(&ticket.uuid, AGENT, &TicketUpdate::priority(priority))
            .unwrap();
        let urgent = h.only_row(Table::UrgentTicketsByTime, &ticket);
        assert_eq!(urgent["priority_level"], text(priority.as_str()));
        assert_eq!(urgent["description"], text("Cannot reset password"));
        assert_eq!(urgent["customer_id"], text(CUSTOMER));
    }

    assert_eq!(
        h.only_row(Table::TicketsByCustomer, &ticket)["priority"],
        text("high")
    );
    assert_eq!(
        h.only_row(Table::TicketsByAgentDate, &ticket)["priority"],
        text("high")
    );
}

#[test]
fn test_same_priority_keeps_row_in_place() {
    let (h, ticket) = Harness::with_ticket(TicketPriority::High);
    let before = h.only_row(Table::UrgentTicketsByTime, &ticket);

    let outcome = h
        .updater
        .update_ticket(&ticket.uuid, AGENT, &TicketUpdate::priority(TicketPriority::High))
        .unwrap();

    assert_eq!(h.only_row(Table::UrgentTicketsByTime, &ticket), before);
    assert_eq!(outcome.activities.len(), 1);
}

#[test]
fn test_repeated_resolve_is_idempotent() {
    let (h, ticket) = Harness::with_ticket(TicketPriority::Medium);
    let update = TicketUpdate::status(TicketStatus::Resolved);

    h.updater.update_ticket(&ticket.uuid, AGENT, &update).unwrap();
    let first: Vec<_> = Table::TICKET_PROJECTIONS
        .iter()
        .map(|t| h.only_row(*t, &ticket))
        .collect();

    h.updater.update_ticket(&ticket.uuid, AGENT, &update).unwrap();
    let second: Vec<_> = Table::TICKET_PROJECTIONS
        .iter()
        .map(|t| h.only_row(*t, &ticket))
        .collect();

    assert_eq!(first, second);
    let log = h.updater.activity_log(&ticket.uuid).unwrap();
    assert_eq!(log.len(), 2);
    assert!(log
        .iter()
        .all(|row| row["activity_type"] == text("status_updated") && row["status"] == text("resolved")));
}

#[test]
fn test_resolved_ticket_can_be_reopened() {
    let (h, ticket) = Harness::with_ticket(TicketPriority::Medium);
    h.updater
        .update_ticket(&ticket.uuid, AGENT, &TicketUpdate::status(TicketStatus::Resolved))
        .unwrap();
    let outcome = h
        .updater
        .update_ticket(&ticket.uuid, AGENT, &TicketUpdate::status(TicketStatus::Open))
        .unwrap();
    assert_eq!(outcome.ticket.status, TicketStatus::Open);
}

// === The T1 scenario ===

#[test]
fn test_escalating_open_medium_ticket_to_high() {
    let (h, ticket) = Harness::with_ticket(TicketPriority::Medium);
    assert_eq!(ticket.status, TicketStatus::Open);

    let outcome = h
        .updater
        .update_ticket(&ticket.uuid, AGENT, &TicketUpdate::priority(TicketPriority::High))
        .unwrap();

    let doc = h.docs.get_ticket(&ticket.uuid).unwrap().unwrap();
    assert_eq!(doc.priority, TicketPriority::High);
    assert_eq!(doc.status, TicketStatus::Open);
    assert_eq!(outcome.ticket, doc);

    let high = h
        .wide
        .scan_partition(Table::UrgentTicketsByTime, &[text("high")])
        .unwrap();
    assert_eq!(high.len(), 1);
    assert!(h
        .wide
        .scan_partition(Table::UrgentTicketsByTime, &[text("medium")])
        .unwrap()
        .is_empty());

    assert_eq!(outcome.activities.len(), 1);
    assert_eq!(outcome.activities[0].activity_type, "priority_updated");
    assert_eq!(outcome.activities[0].status, "high");
    assert_eq!(outcome.activities[0].agent_id, AGENT);
    let log = h.updater.activity_log(&ticket.uuid).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0]["activity_type"], text("priority_updated"));

    let node = h.graph.find_ticket(&ticket.uuid).unwrap().unwrap();
    assert_eq!(node.priority, TicketPriority::High);
}

#[test]
fn test_combined_update_writes_one_activity_per_field() {
    let (h, ticket) = Harness::with_ticket(TicketPriority::Low);
    let outcome = h
        .updater
        .update_ticket(
            &ticket.uuid,
            AGENT,
            &TicketUpdate::status(TicketStatus::InProgress).with_priority(TicketPriority::High),
        )
        .unwrap();

    let types: Vec<_> = outcome
        .activities
        .iter()
        .map(|a| a.activity_type.as_str())
        .collect();
    assert_eq!(types, vec!["status_updated", "priority_updated"]);
    // same timestamp, distinct records
    assert_eq!(h.updater.activity_log(&ticket.uuid).unwrap().len(), 2);
}

// === Aborts before any write ===

#[test]
fn test_empty_update_is_invalid() {
    let (h, ticket) = Harness::with_ticket(TicketPriority::Low);
    let err = h
        .updater
        .update_ticket(&ticket.uuid, AGENT, &TicketUpdate::default())
        .unwrap_err();
    assert!(matches!(err, UpdateError::InvalidUpdate(_)));
    assert_eq!(h.wide.writes(), 0);
}

#[test]
fn test_unknown_ticket_is_not_found() {
    let (h, _) = Harness::with_ticket(TicketPriority::Low);
    let err = h
        .updater
        .update_ticket("no-such-ticket", AGENT, &TicketUpdate::status(TicketStatus::Resolved))
        .unwrap_err();
    assert!(matches!(
        err,
        UpdateError::NotFound {
            missing: Missing::Ticket,
            ..
        }
    ));
    assert_eq!(h.wide.writes(), 0);
}

#[test]
fn test_missing_projection_row_aborts_cleanly() {
    for table in Table::TICKET_PROJECTIONS {
        let (h, ticket) = Harness::with_ticket(TicketPriority::Medium);
        h.drop_row(table, &ticket);
        let before = snapshot(&h, &ticket.uuid);

        let err = h
            .updater
            .update_ticket(
                &ticket.uuid,
                AGENT,
                &TicketUpdate::status(TicketStatus::Resolved).with_priority(TicketPriority::High),
            )
            .unwrap_err();

        match err {
            UpdateError::NotFound { missing, .. } => {
                assert_eq!(missing, Missing::ProjectionRow(table))
            }
            other => panic!("expected NotFound for {}, got {:?}", table, other),
        }
        assert!(err_is_clean(&h, &ticket.uuid, before));
    }
}

#[test]
fn test_failed_fetch_aborts_cleanly() {
    for table in Table::TICKET_PROJECTIONS {
        let (h, ticket) = Harness::with_ticket(TicketPriority::Medium);
        h.wide.fail_fetch_on(table);
        let before = snapshot(&h, &ticket.uuid);

        let err = h
            .updater
            .update_ticket(&ticket.uuid, AGENT, &TicketUpdate::priority(TicketPriority::Low))
            .unwrap_err();
        assert!(matches!(err, UpdateError::Store(_)), "{:?}", err);
        assert!(err.is_clean_abort());
        assert!(err_is_clean(&h, &ticket.uuid, before));
    }
}

#[test]
fn test_wrong_agent_is_not_found_in_agent_table() {
    let (h, ticket) = Harness::with_ticket(TicketPriority::Medium);
    let err = h
        .updater
        .update_ticket(&ticket.uuid, "agent-other", &TicketUpdate::status(TicketStatus::Resolved))
        .unwrap_err();
    match err {
        UpdateError::NotFound { missing, .. } => {
            assert_eq!(missing, Missing::ProjectionRow(Table::TicketsByAgentDate))
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(h.wide.writes(), 0);
}

#[test]
fn test_missing_graph_node_fails_resolution() {
    let (h, ticket) = Harness::with_ticket(TicketPriority::Medium);
    let empty_graph = Arc::new(SqliteGraphStore::open_in_memory().unwrap());
    let updater = CrossStoreUpdater::new(h.docs.clone(), h.wide.clone(), empty_graph);
    let before = snapshot(&h, &ticket.uuid);

    let err = updater
        .update_ticket(&ticket.uuid, AGENT, &TicketUpdate::priority(TicketPriority::High))
        .unwrap_err();
    assert!(matches!(err, UpdateError::Resolution { .. }));
    assert!(err_is_clean(&h, &ticket.uuid, before));
}

#[test]
fn test_missing_creator_edge_fails_resolution() {
    let h = Harness::new();
    let ticket = Ticket::new("ghost", "who filed this?", TicketPriority::Low, "chat");
    h.docs.insert_ticket(&ticket).unwrap();
    h.graph.upsert_ticket(&ticket).unwrap();

    let err = h
        .updater
        .update_ticket(&ticket.uuid, AGENT, &TicketUpdate::status(TicketStatus::Resolved))
        .unwrap_err();
    match err {
        UpdateError::Resolution { reason, .. } => assert!(reason.contains("created_by")),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(h.wide.writes(), 0);
}

// === Partial updates ===

#[test]
fn test_mid_write_failure_names_committed_tables() {
    let (h, ticket) = Harness::with_ticket(TicketPriority::Medium);
    h.wide.fail_write_on(Table::TicketsByCustomer);

    let err = h
        .updater
        .update_ticket(
            &ticket.uuid,
            AGENT,
            &TicketUpdate::status(TicketStatus::Resolved).with_priority(TicketPriority::High),
        )
        .unwrap_err();

    match &err {
        UpdateError::PartialUpdate {
            committed, failed, ..
        } => {
            assert_eq!(
                committed,
                &vec![Table::TicketByDate, Table::TicketsByAgentDate]
            );
            assert_eq!(*failed, Table::TicketsByCustomer);
        }
        other => panic!("expected PartialUpdate, got {:?}", other),
    }
    assert!(!err.is_clean_abort());
    let msg = err.to_string();
    assert!(msg.contains("[ticket_by_date, tickets_by_agent_date]"));
    assert!(msg.contains("tickets_by_customer failed"));

    // Committed writes stay; later tables keep the old values.
    let doc = h.docs.get_ticket(&ticket.uuid).unwrap().unwrap();
    assert_eq!(doc.status, TicketStatus::Resolved);
    assert_eq!(h.only_row(Table::TicketByDate, &ticket)["status"], text("resolved"));
    assert_eq!(h.only_row(Table::TicketsByCustomer, &ticket)["status"], text("open"));
    assert_eq!(
        h.only_row(Table::UrgentTicketsByTime, &ticket)["priority_level"],
        text("medium")
    );
    assert!(h.updater.activity_log(&ticket.uuid).unwrap().is_empty());
}

#[test]
fn test_failed_relocation_is_reported() {
    let (h, ticket) = Harness::with_ticket(TicketPriority::Medium);
    h.wide.fail_write_on(Table::UrgentTicketsByTime);

    let err = h
        .updater
        .update_ticket(&ticket.uuid, AGENT, &TicketUpdate::priority(TicketPriority::Low))
        .unwrap_err();
    match err {
        UpdateError::PartialUpdate {
            committed,
            failed,
            displaced,
            ..
        } => {
            assert_eq!(
                committed,
                vec![Table::TicketsByAgentDate, Table::TicketsByCustomer]
            );
            assert_eq!(failed, Table::UrgentTicketsByTime);
            assert_eq!(displaced, None);
        }
        other => panic!("expected PartialUpdate, got {:?}", other),
    }
    assert_eq!(
        h.only_row(Table::UrgentTicketsByTime, &ticket)["priority_level"],
        text("medium")
    );
}

#[test]
fn test_failed_row_move_restores_the_old_row() {
    let (h, ticket) = Harness::with_ticket(TicketPriority::Medium);
    h.wide.fail_inserts_on(Table::UrgentTicketsByTime, 1);

    let err = h
        .updater
        .update_ticket(&ticket.uuid, AGENT, &TicketUpdate::priority(TicketPriority::High))
        .unwrap_err();
    match &err {
        UpdateError::PartialUpdate {
            committed,
            failed,
            displaced,
            ..
        } => {
            assert_eq!(
                committed,
                &vec![Table::TicketsByAgentDate, Table::TicketsByCustomer]
            );
            assert_eq!(*failed, Table::UrgentTicketsByTime);
            assert_eq!(*displaced, None);
        }
        other => panic!("expected PartialUpdate, got {:?}", other),
    }
    let urgent = h.only_row(Table::UrgentTicketsByTime, &ticket);
    assert_eq!(urgent["priority_level"], text("medium"));
    assert_eq!(urgent["description"], text("Cannot reset password"));
}

#[test]
fn test_unrestorable_row_move_is_reported_as_displaced() {
    let (h, ticket) = Harness::with_ticket(TicketPriority::Medium);
    h.wide.fail_inserts_on(Table::UrgentTicketsByTime, 2);

    let err = h
        .updater
        .update_ticket(&ticket.uuid, AGENT, &TicketUpdate::priority(TicketPriority::High))
        .unwrap_err();
    match &err {
        UpdateError::PartialUpdate {
            failed, displaced, ..
        } => {
            assert_eq!(*failed, Table::UrgentTicketsByTime);
            assert_eq!(*displaced, Some(Table::UrgentTicketsByTime));
        }
        other => panic!("expected PartialUpdate, got {:?}", other),
    }
    assert!(err.to_string().contains("not restored"));
    assert!(h.rows_of(Table::UrgentTicketsByTime, &ticket).is_empty());
}

#[test]
fn test_retry_after_failed_row_move_heals_the_urgent_table() {
    let (h, ticket) = Harness::with_ticket(TicketPriority::Medium);
    h.wide.fail_write_on(Table::UrgentTicketsByTime);
    let escalate = TicketUpdate::priority(TicketPriority::High);
    assert!(h.updater.update_ticket(&ticket.uuid, AGENT, &escalate).is_err());
    assert_eq!(
        h.docs.get_ticket(&ticket.uuid).unwrap().unwrap().priority,
        TicketPriority::High
    );

    h.wide.clear_failures();
    let outcome = h.updater.update_ticket(&ticket.uuid, AGENT, &escalate).unwrap();
    assert_eq!(outcome.ticket.priority, TicketPriority::High);
    assert_eq!(
        h.only_row(Table::UrgentTicketsByTime, &ticket)["priority_level"],
        text("high")
    );
    assert_eq!(
        h.graph.find_ticket(&ticket.uuid).unwrap().unwrap().priority,
        TicketPriority::High
    );
}

#[test]
fn test_status_update_moves_a_row_left_at_a_stale_priority() {
    let (h, ticket) = Harness::with_ticket(TicketPriority::Medium);
    h.wide.fail_write_on(Table::UrgentTicketsByTime);
    assert!(h
        .updater
        .update_ticket(&ticket.uuid, AGENT, &TicketUpdate::priority(TicketPriority::Low))
        .is_err());

    h.wide.clear_failures();
    h.updater
        .update_ticket(&ticket.uuid, AGENT, &TicketUpdate::status(TicketStatus::InProgress))
        .unwrap();
    assert_eq!(
        h.only_row(Table::UrgentTicketsByTime, &ticket)["priority_level"],
        text("low")
    );
}

#[test]
fn test_activity_failure_lists_every_projection() {
    let (h, ticket) = Harness::with_ticket(TicketPriority::Medium);
    h.wide.fail_write_on(Table::ActivityByTicket);

    let err = h
        .updater
        .update_ticket(&ticket.uuid, AGENT, &TicketUpdate::status(TicketStatus::Resolved))
        .unwrap_err();
    match err {
        UpdateError::PartialUpdate {
            committed, failed, ..
        } => {
            assert_eq!(
                committed,
                vec![
                    Table::TicketByDate,
                    Table::TicketsByAgentDate,
                    Table::TicketsByCustomer
                ]
            );
            assert_eq!(failed, Table::ActivityByTicket);
        }
        other => panic!("expected PartialUpdate, got {:?}", other),
    }
}

// === Graph mirror ===

#[test]
fn test_mirror_failure_still_succeeds() {
    let (h, ticket) = Harness::with_ticket(TicketPriority::Medium);
    h.graph.fail_mirror();

    let outcome = h
        .updater
        .update_ticket(&ticket.uuid, AGENT, &TicketUpdate::status(TicketStatus::Resolved))
        .unwrap();

    let mirror = outcome.mirror_error.expect("mirror error reported");
    assert_eq!(mirror.ticket_id, ticket.uuid);
    assert_eq!(outcome.ticket.status, TicketStatus::Resolved);
    assert_eq!(h.only_row(Table::TicketsByAgentDate, &ticket)["status"], text("resolved"));
    assert_eq!(h.updater.activity_log(&ticket.uuid).unwrap().len(), 1);
    let node = h.graph.find_ticket(&ticket.uuid).unwrap().unwrap();
    assert_eq!(node.status, TicketStatus::Open);
}

#[test]
fn test_stale_graph_priority_does_not_block_updates() {
    let (h, ticket) = Harness::with_ticket(TicketPriority::Medium);
    h.graph.fail_mirror();
    h.updater
        .update_ticket(&ticket.uuid, AGENT, &TicketUpdate::priority(TicketPriority::High))
        .unwrap();

    // Graph still says medium; projections are keyed by the document.
    let outcome = h
        .updater
        .update_ticket(&ticket.uuid, AGENT, &TicketUpdate::priority(TicketPriority::Low))
        .unwrap();
    assert_eq!(outcome.ticket.priority, TicketPriority::Low);
    assert_eq!(
        h.only_row(Table::UrgentTicketsByTime, &ticket)["priority_level"],
        text("low")
    );
}

// === Loading and messages ===

#[test]
fn test_load_populates_every_store() {
    let (h, ticket) = Harness::with_ticket(TicketPriority::High);
    assert_eq!(ticket.agent_id.as_deref(), Some(AGENT));

    for table in Table::TICKET_PROJECTIONS {
        h.only_row(table, &ticket);
    }
    assert_eq!(
        h.wide
            .scan_partition(Table::UsersById, &[text(CUSTOMER)])
            .unwrap()
            .len(),
        1
    );
    let assigned = h.graph.tickets_for_user(AGENT, UserEdge::AssignedTo).unwrap();
    assert_eq!(assigned.len(), 1);
    assert_eq!(assigned[0].ticket_id, ticket.uuid);
}

#[test]
fn test_load_rejects_duplicate_ticket() {
    let (h, ticket) = Harness::with_ticket(TicketPriority::High);
    let customer = h.graph.find_user(CUSTOMER).unwrap().unwrap().1;
    let agent = h.graph.find_user(AGENT).unwrap().unwrap().1;
    assert!(h.updater.load_ticket(&ticket, &customer, &agent).is_err());
}

#[test]
fn test_load_rejects_ticket_assigned_to_another_agent() {
    let h = Harness::new();
    let customer = GraphUser::new(CUSTOMER, "Casey Customer", Role::Customer);
    let agent = GraphUser::new(AGENT, "Avery Agent", Role::Agent);
    let ticket = Ticket::new(CUSTOMER, "Printer offline", TicketPriority::Low, "phone")
        .with_agent("agent-other");

    let err = h.updater.load_ticket(&ticket, &customer, &agent).unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert!(h.docs.get_ticket(&ticket.uuid).unwrap().is_none());
    assert!(h.graph.find_ticket(&ticket.uuid).unwrap().is_none());
    assert_eq!(h.wide.writes(), 0);
}

#[test]
fn test_load_files_feedback_under_the_agent() {
    let h = Harness::new();
    let customer = GraphUser::new(CUSTOMER, "Casey Customer", Role::Customer);
    let agent = GraphUser::new(AGENT, "Avery Agent", Role::Agent);
    let mut ticket = Ticket::new(CUSTOMER, "Slow wifi", TicketPriority::Low, "chat");
    ticket.feedback.rating = Some(5);
    ticket.feedback.comments = Some("fixed fast".into());
    h.updater.load_ticket(&ticket, &customer, &agent).unwrap();

    let feedback = h
        .wide
        .scan_partition(Table::FeedbackByAgent, &[text(AGENT)])
        .unwrap();
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0]["ticket_id"], text(&ticket.uuid));
    assert_eq!(feedback[0]["feedback_comments"], text("fixed fast"));
}

#[test]
fn test_message_is_searchable_in_graph() {
    let (h, ticket) = Harness::with_ticket(TicketPriority::Medium);
    let outcome = h
        .updater
        .add_message(&ticket.uuid, CUSTOMER, "The reset email never arrives")
        .unwrap();
    assert!(outcome.mirror_error.is_none());

    let doc = h.docs.get_ticket(&ticket.uuid).unwrap().unwrap();
    assert_eq!(doc.messages.len(), 1);
    assert_eq!(doc.messages[0].sender_id, CUSTOMER);

    let hits = h.graph.search_messages("reset email").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].ticket_id, ticket.uuid);
}

#[test]
fn test_message_on_unknown_ticket_is_not_found() {
    let h = Harness::new();
    let err = h.updater.add_message("nope", CUSTOMER, "hello").unwrap_err();
    assert!(matches!(err, UpdateError::NotFound { .. }));
}

fn snapshot(h: &Harness, ticket_id: &str) -> (Option<Ticket>, Option<TicketNode>) {
    (
        h.docs.get_ticket(ticket_id).unwrap(),
        h.graph.find_ticket(ticket_id).unwrap(),
    )
}

/// Document and graph node unchanged, and no projection writes.
fn err_is_clean(
    h: &Harness,
    ticket_id: &str,
    before: (Option<Ticket>, Option<TicketNode>),
) -> bool {
    h.wide.writes() == 0 && snapshot(h, ticket_id) == before
}
