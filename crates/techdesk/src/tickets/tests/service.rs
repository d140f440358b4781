use std::sync::Arc;
use std::thread;

use chrono::{Duration, NaiveDate, TimeZone, Utc};

use super::common::{
    two_channel_dispatcher, CollidingStore, FailingNotifier, RecordingNotifier, World,
};
use crate::directory::DirectoryRepository;
use crate::identity::UserRepository;
use crate::ids::{TicketId, UserId};
use crate::notifications::NotificationEvent;
use crate::store::{InMemoryStore, StoreError};
use crate::tickets::{
    ExportRange, Lifecycle, PageRequest, Priority, Ticket, TicketEdit, TicketQuery,
    TicketRepository, TicketService, TicketServiceConfig, TicketServiceError, TicketStatus,
    TransitionError, EXPORT_HEADERS,
};

#[test]
fn create_numbers_titles_and_notifies() {
    let world = World::new();
    let (service, notifier) = world.service(TicketServiceConfig::default());

    let view = service
        .create(
            &world.identity("mwila"),
            world.request("Lumezi Primary", "Tablet screen cracked during class"),
        )
        .expect("ticket created");

    assert_eq!(view.number.0, 1);
    assert_eq!(view.title, "1-HWE-TAB-Tablet screen cracke");
    assert_eq!(view.status, TicketStatus::Open);
    assert_eq!(view.centre, "Lumezi Primary");
    assert_eq!(view.region, "Eastern Region");
    assert_eq!(view.submitted_by, "mwila");
    assert_eq!(notifier.events(), vec![NotificationEvent::TicketCreated]);

    let notice = &notifier.notices()[0];
    assert_eq!(notice.recipient.as_deref(), Some("mwila@example.org"));
    assert_eq!(notice.category, "Hardware");
}

#[test]
fn concurrent_creates_receive_consecutive_numbers() {
    let world = World::new();
    let (service, notifier) = world.service(TicketServiceConfig::default());
    let service = Arc::new(service);
    let actor = world.identity("mwila");

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let service = service.clone();
            let actor = actor.clone();
            let request = world.request("Lumezi Primary", &format!("Router {worker} offline"));
            thread::spawn(move || {
                (0..5)
                    .map(|_| {
                        service
                            .create(&actor, request.clone())
                            .expect("ticket created")
                            .number
                            .0
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut numbers: Vec<u64> = handles
        .into_iter()
        .flat_map(|handle| handle.join().expect("worker finished"))
        .collect();
    numbers.sort_unstable();

    assert_eq!(numbers, (1..=40).collect::<Vec<u64>>());
    assert_eq!(notifier.events().len(), 40);
}

#[test]
fn mismatched_subcategory_stores_nothing() {
    let world = World::new();
    let (service, notifier) = world.service(TicketServiceConfig::default());
    let mut request = world.request("Lumezi Primary", "Kolibri will not sync");
    request.category = Some(world.category("Software"));

    let error = service
        .create(&world.identity("mwila"), request)
        .expect_err("subcategory belongs to Hardware");

    match error {
        TicketServiceError::Validation(errors) => assert!(errors.has("subcategory")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(world.store.tickets().expect("tickets").is_empty());
    assert!(notifier.events().is_empty());
}

#[test]
fn creation_retries_lost_number_races() {
    let world = World::new();
    let store = Arc::new(CollidingStore::new((*world.store).clone(), 2));
    let service = TicketService::new(
        store,
        Arc::new(super::common::RecordingNotifier::default()),
        TicketServiceConfig::default(),
    );

    let view = service
        .create(
            &world.identity("mwila"),
            world.request("Lumezi Primary", "Stock sheet missing"),
        )
        .expect("third attempt succeeds");
    assert_eq!(view.number.0, 1);
}

#[test]
fn creation_gives_up_after_configured_attempts() {
    let world = World::new();
    let store = Arc::new(CollidingStore::new((*world.store).clone(), 10));
    let service = TicketService::new(
        store,
        Arc::new(super::common::RecordingNotifier::default()),
        TicketServiceConfig {
            number_attempts: 3,
            ..TicketServiceConfig::default()
        },
    );

    let error = service
        .create(
            &world.identity("mwila"),
            world.request("Lumezi Primary", "Stock sheet missing"),
        )
        .expect_err("every attempt collides");

    assert!(matches!(error, TicketServiceError::Concurrency));
    assert!(world.store.tickets().expect("tickets").is_empty());
}

#[test]
fn resolve_dispatches_once_per_channel() {
    let world = World::new();
    let (dispatcher, log) = two_channel_dispatcher();
    let service = TicketService::new(
        world.store.clone(),
        Arc::new(dispatcher),
        TicketServiceConfig::default(),
    );
    let ticket = service
        .create(
            &world.identity("mwila"),
            world.request("Lumezi Primary", "Laptop battery swollen"),
        )
        .expect("ticket created");
    log.lock().expect("log").clear();

    let error = service
        .resolve(&world.identity("levy"), ticket.id, "   ")
        .expect_err("notes required");
    assert!(matches!(error, TicketServiceError::Validation(_)));
    assert!(log.lock().expect("log").is_empty());

    let resolved = service
        .resolve(&world.identity("levy"), ticket.id, "Battery replaced")
        .expect("resolved");
    assert_eq!(resolved.status, TicketStatus::Resolved);
    assert_eq!(resolved.resolved_by.as_deref(), Some("levy"));
    assert_eq!(
        *log.lock().expect("log"),
        vec![
            ("email", NotificationEvent::Resolved),
            ("webhook", NotificationEvent::Resolved),
        ]
    );
}

#[test]
fn notifier_failure_does_not_undo_the_change() {
    let world = World::new();
    let service = TicketService::new(
        world.store.clone(),
        Arc::new(FailingNotifier),
        TicketServiceConfig::default(),
    );

    let created = service
        .create(
            &world.identity("mwila"),
            world.request("Lumezi Primary", "Headphones missing"),
        )
        .expect("created despite notifier failure");
    service
        .start_progress(&world.identity("levy"), created.id)
        .expect("started despite notifier failure");

    let stored = world
        .store
        .ticket(created.id)
        .expect("lookup")
        .expect("ticket stored");
    assert_eq!(stored.status, TicketStatus::InProgress);
}

#[test]
fn out_of_scope_and_missing_tickets_look_the_same_to_scoped_users() {
    let world = World::new();
    let (service, _) = world.service(TicketServiceConfig::default());
    let lumezi = service
        .create(
            &world.identity("mwila"),
            world.request("Lumezi Primary", "Projector broken"),
        )
        .expect("created");
    let chipo = world.identity("chipo");

    assert!(matches!(
        service.get(&chipo, lumezi.id),
        Err(TicketServiceError::NotAuthorized)
    ));
    assert!(matches!(
        service.get(&chipo, TicketId::new()),
        Err(TicketServiceError::NotAuthorized)
    ));
    assert!(matches!(
        service.get(&world.identity("levy"), TicketId::new()),
        Err(TicketServiceError::NotFound)
    ));
    assert!(service.get(&world.identity("mwila"), lumezi.id).is_ok());
}

#[test]
fn scoped_staff_cannot_act_outside_geography() {
    let world = World::new();
    let (service, _) = world.service(TicketServiceConfig::default());
    let umlazi = world.insert_ticket_at("superadmin", "Umlazi Learning Centre", Utc::now());

    assert!(matches!(
        service.archive(&world.identity("admin.zm"), umlazi.id),
        Err(TicketServiceError::NotAuthorized)
    ));
    assert!(service
        .archive(&world.identity("superadmin"), umlazi.id)
        .is_ok());
}

#[test]
fn archive_round_trip_through_the_service() {
    let world = World::new();
    let (service, notifier) = world.service(TicketServiceConfig::default());
    let ticket = world.insert_ticket_at("mwila", "Lumezi Primary", Utc::now());
    let admin = world.identity("admin.zm");

    let archived = service.archive(&admin, ticket.id).expect("archived");
    assert!(archived.archived);
    assert_eq!(archived.status, TicketStatus::Closed);
    assert!(matches!(
        service.archive(&admin, ticket.id),
        Err(TicketServiceError::Transition(_))
    ));

    service.unarchive(&admin, ticket.id).expect("unarchived");
    let restored = world
        .store
        .ticket(ticket.id)
        .expect("lookup")
        .expect("stored");
    assert_eq!(restored.revision, 2);
    assert_eq!(
        Ticket {
            revision: ticket.revision,
            ..restored
        },
        ticket
    );
    assert_eq!(
        notifier.events(),
        vec![NotificationEvent::StatusChanged, NotificationEvent::StatusChanged]
    );
}

#[test]
fn assigning_an_unknown_technician_is_a_field_error() {
    let world = World::new();
    let (service, _) = world.service(TicketServiceConfig::default());
    let ticket = world.insert_ticket_at("mwila", "Lumezi Primary", Utc::now());

    let error = service
        .assign(&world.identity("levy"), ticket.id, UserId::new())
        .expect_err("unknown user");
    match error {
        TicketServiceError::Validation(errors) => assert!(errors.has("technician")),
        other => panic!("unexpected error: {other:?}"),
    }

    let view = service
        .assign(&world.identity("levy"), ticket.id, world.user_id("ntipa"))
        .expect("assigned");
    assert_eq!(view.assigned_to.as_deref(), Some("ntipa"));
}

#[test]
fn edit_keeps_title_and_updates_description() {
    let world = World::new();
    let (service, _) = world.service(TicketServiceConfig::default());
    let ticket = world.insert_ticket_at("mwila", "Lumezi Primary", Utc::now());

    let view = service
        .edit(
            &world.identity("mwila"),
            ticket.id,
            &TicketEdit {
                title: None,
                description: Some("Two tablets now affected".to_string()),
            },
        )
        .expect("edited");

    assert_eq!(view.title, ticket.title);
    assert_eq!(view.description, "Two tablets now affected");
}

#[test]
fn protected_reference_data_reports_dependents() {
    let world = World::new();
    let eastern = world.catalog.region("Eastern Region").expect("region");

    let error = world
        .store
        .delete_region(eastern)
        .expect_err("region still has a centre");
    assert!(matches!(error, StoreError::ReferentialIntegrity { .. }));

    match TicketServiceError::from(error) {
        TicketServiceError::ReferentialIntegrity(message) => {
            assert!(message.contains("centre"), "{message}")
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(world.store.region(eastern).expect("lookup").is_some());
}

#[test]
fn list_pages_and_clamps() {
    let world = World::new();
    let (service, _) = world.service(TicketServiceConfig::default());
    let base = Utc::now() - Duration::days(1);
    for offset in 0..23 {
        world.insert_ticket_at("mwila", "Lumezi Primary", base + Duration::minutes(offset));
    }
    let levy = world.identity("levy");

    let first = service
        .list(&levy, &TicketQuery::default(), PageRequest::default())
        .expect("listed");
    assert_eq!(first.total, 23);
    assert_eq!(first.pages, 3);
    assert_eq!(first.items.len(), 10);
    assert_eq!(first.items[0].number.0, 23);

    let beyond = service
        .list(
            &levy,
            &TicketQuery::default(),
            PageRequest {
                page: 99,
                per_page: 10,
            },
        )
        .expect("listed");
    assert_eq!(beyond.page, 3);
    assert_eq!(
        beyond
            .items
            .iter()
            .map(|view| view.number.0)
            .collect::<Vec<_>>(),
        vec![3, 2, 1]
    );
}

#[test]
fn dashboard_aggregates_visible_tickets() {
    let world = World::new();
    let (service, _) = world.service(TicketServiceConfig::default());
    let levy = world.identity("levy");
    let now = Utc::now();

    let slow = world.insert_ticket_at("mwila", "Lumezi Primary", now - Duration::hours(4));
    let quick = world.insert_ticket_at("mwila", "Lumezi Primary", now - Duration::hours(2));
    let busy = world.insert_ticket_at("chipo", "Kanyajalo", now - Duration::hours(1));
    let mut urgent = world.insert_ticket_at("chipo", "Kanyajalo", now);
    urgent.priority = Priority::High;
    world.store.update_ticket(urgent).expect("priority raised");
    world.insert_ticket_at("superadmin", "Umlazi Learning Centre", now);

    service.resolve(&levy, slow.id, "Rebooted").expect("resolved");
    service.resolve(&levy, quick.id, "Recharged").expect("resolved");
    service
        .assign(&levy, busy.id, world.user_id("levy"))
        .expect("assigned");
    service.start_progress(&levy, busy.id).expect("started");

    let summary = service
        .dashboard(&world.identity("admin.zm"), &TicketQuery::default())
        .expect("dashboard");

    assert_eq!(summary.total, 4);
    assert_eq!(summary.by_status["Open"], 1);
    assert_eq!(summary.by_status["In Progress"], 1);
    assert_eq!(summary.by_status["Resolved"], 2);
    assert_eq!(summary.by_status["Closed"], 0);
    assert_eq!(summary.by_priority["High"], 1);
    assert_eq!(summary.high_priority_open, 1);

    let centres: Vec<(&str, usize)> = summary
        .by_centre
        .iter()
        .map(|entry| (entry.label.as_str(), entry.count))
        .collect();
    assert_eq!(centres, vec![("Kanyajalo", 2), ("Lumezi Primary", 2)]);

    let workload: Vec<(&str, usize)> = summary
        .technician_workload
        .iter()
        .map(|entry| (entry.label.as_str(), entry.count))
        .collect();
    assert_eq!(workload, vec![("levy", 1), ("ntipa", 0)]);

    let average = summary
        .average_resolution_hours
        .expect("two resolved tickets");
    assert!((average - 3.0).abs() < 0.1, "average was {average}");
    assert_eq!(summary.recent.len(), 4);
    assert_eq!(summary.filters.regions.len(), 4);
}

#[test]
fn export_is_scoped_ranged_and_ascending() {
    let world = World::new();
    let (service, _) = world.service(TicketServiceConfig::default());
    let day = |d: u32| Utc.with_ymd_and_hms(2024, 3, d, 9, 30, 0).single().expect("date");

    world.insert_ticket_at("mwila", "Lumezi Primary", day(1));
    let archived = world.insert_ticket_at("mwila", "Lumezi Primary", day(5));
    world.insert_ticket_at("chipo", "Kanyajalo", day(5));
    world.insert_ticket_at("mwila", "Lumezi Primary", day(10));
    service
        .archive(&world.identity("superadmin"), archived.id)
        .expect("archived");

    let range = ExportRange::new(
        NaiveDate::from_ymd_opt(2024, 3, 5).expect("date"),
        NaiveDate::from_ymd_opt(2024, 3, 10).expect("date"),
    )
    .expect("valid range");

    let csv = service
        .export_csv(&world.identity("levy"), range)
        .expect("exported");
    let mut reader = csv::Reader::from_reader(csv.as_slice());
    let headers: Vec<String> = reader
        .headers()
        .expect("headers")
        .iter()
        .map(str::to_string)
        .collect();
    assert_eq!(headers, EXPORT_HEADERS);
    let rows: Vec<csv::StringRecord> = reader.records().map(|row| row.expect("row")).collect();
    let numbers: Vec<&str> = rows.iter().map(|row| &row[0]).collect();
    assert_eq!(numbers, vec!["2", "3", "4"]);
    assert_eq!(&rows[0][2], "Closed");
    assert_eq!(&rows[0][1], "2024-03-05 09:30");

    let mine = service
        .export_csv(&world.identity("chipo"), range)
        .expect("exported");
    let mut reader = csv::Reader::from_reader(mine.as_slice());
    assert_eq!(reader.records().count(), 1);
}

#[test]
fn subcategory_lookup_tolerates_garbage() {
    let world = World::new();
    let (service, _) = world.service(TicketServiceConfig::default());

    assert!(service.subcategories_for("not-an-id").is_empty());
    assert!(service.subcategories_for(&UserId::new().to_string()).is_empty());

    let hardware = service.subcategories_for(&world.category("Hardware").to_string());
    assert_eq!(hardware.len(), 7);
    assert!(hardware.iter().any(|option| option.name == "Tablet Issues"));
}

#[test]
fn technicians_are_listed_for_workers_only() {
    let world = World::new();
    let (service, _) = world.service(TicketServiceConfig::default());

    assert!(matches!(
        service.technicians(&world.identity("mwila")),
        Err(TicketServiceError::NotAuthorized)
    ));
    let names: Vec<String> = service
        .technicians(&world.identity("admin.zm"))
        .expect("listed")
        .into_iter()
        .map(|summary| summary.username)
        .collect();
    assert_eq!(names, vec!["levy", "ntipa"]);
}

#[test]
fn stale_copy_cannot_undo_a_committed_resolution() {
    let world = World::new();
    let (service, _) = world.service(TicketServiceConfig::default());
    let ticket = world.insert_ticket_at("mwila", "Lumezi Primary", Utc::now());
    let stale = world
        .store
        .ticket(ticket.id)
        .expect("lookup")
        .expect("stored");

    service
        .resolve(&world.identity("levy"), ticket.id, "Cleared the jam")
        .expect("resolved");

    let ntipa = world
        .store
        .user(world.user_id("ntipa"))
        .expect("lookup")
        .expect("technician");
    let late_assign = Lifecycle::default()
        .assign(&world.identity("admin.zm"), &stale, &ntipa)
        .expect("guards pass on the stale copy");
    assert!(matches!(
        world.store.update_ticket(late_assign.ticket),
        Err(StoreError::StaleWrite { expected: 0, stored: 1, .. })
    ));

    let stored = world
        .store
        .ticket(ticket.id)
        .expect("lookup")
        .expect("stored");
    assert_eq!(stored.status, TicketStatus::Resolved);
    assert_eq!(stored.resolved_by, Some(world.user_id("levy")));
    assert_eq!(stored.resolution_notes.as_deref(), Some("Cleared the jam"));
    assert_eq!(stored.assigned_to, None);
}

#[test]
fn assign_that_loses_to_a_resolve_rechecks_the_fresh_ticket() {
    let world = World::new();
    let ticket = world.insert_ticket_at("mwila", "Lumezi Primary", Utc::now());
    let levy = world.identity("levy");
    let id = ticket.id;
    let store = CollidingStore::new((*world.store).clone(), 0).with_interleaved_write(
        move |inner| {
            let current = inner.ticket(id).expect("lookup").expect("stored");
            let resolved = Lifecycle::default()
                .resolve(&levy, &current, "Cleared the jam", Utc::now())
                .expect("resolves");
            inner.update_ticket(resolved.ticket).expect("committed first");
        },
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let service = TicketService::new(
        Arc::new(store),
        notifier.clone(),
        TicketServiceConfig::default(),
    );

    let error = service
        .assign(&world.identity("admin.zm"), id, world.user_id("ntipa"))
        .expect_err("assignment no longer allowed");
    assert!(matches!(
        error,
        TicketServiceError::Transition(TransitionError::InvalidState { .. })
    ));
    assert!(notifier.events().is_empty());

    let stored = world.store.ticket(id).expect("lookup").expect("stored");
    assert_eq!(stored.status, TicketStatus::Resolved);
    assert_eq!(stored.resolution_notes.as_deref(), Some("Cleared the jam"));
    assert_eq!(stored.revision, 1);
}

#[test]
fn contended_write_is_retried_and_keeps_both_changes() {
    let world = World::new();
    let ticket = world.insert_ticket_at("mwila", "Lumezi Primary", Utc::now());
    let id = ticket.id;
    let store = CollidingStore::new((*world.store).clone(), 0).with_interleaved_write(
        move |inner| {
            let mut current = inner.ticket(id).expect("lookup").expect("stored");
            current.priority = Priority::High;
            inner.update_ticket(current).expect("committed first");
        },
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let service = TicketService::new(
        Arc::new(store),
        notifier.clone(),
        TicketServiceConfig::default(),
    );

    let view = service
        .resolve(&world.identity("levy"), id, "Replaced the cable")
        .expect("second attempt succeeds");
    assert_eq!(view.status, TicketStatus::Resolved);
    assert_eq!(notifier.events(), vec![NotificationEvent::Resolved]);

    let stored = world.store.ticket(id).expect("lookup").expect("stored");
    assert_eq!(stored.priority, Priority::High);
    assert_eq!(stored.status, TicketStatus::Resolved);
    assert_eq!(stored.revision, 2);
}

#[test]
fn endless_contention_gives_up_without_notifying() {
    let world = World::new();
    let ticket = world.insert_ticket_at("mwila", "Lumezi Primary", Utc::now());
    let id = ticket.id;
    let bump = move |inner: &InMemoryStore| {
        let current = inner.ticket(id).expect("lookup").expect("stored");
        inner.update_ticket(current).expect("committed first");
    };
    let store = CollidingStore::new((*world.store).clone(), 0)
        .with_interleaved_write(bump)
        .with_interleaved_write(bump);
    let notifier = Arc::new(RecordingNotifier::default());
    let service = TicketService::new(
        Arc::new(store),
        notifier.clone(),
        TicketServiceConfig {
            number_attempts: 2,
            ..TicketServiceConfig::default()
        },
    );

    let error = service
        .start_progress(&world.identity("levy"), id)
        .expect_err("every attempt is stale");
    assert!(matches!(error, TicketServiceError::Concurrency));
    assert!(notifier.events().is_empty());
    let stored = world.store.ticket(id).expect("lookup").expect("stored");
    assert_eq!(stored.status, TicketStatus::Open);
}
