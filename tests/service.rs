mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};

use support::{file, FailingCalendar, HangingCalendar, Harness};
use taskline::calendar::MemoryCalendar;
use taskline::error::ServiceError;
use taskline::events::LiveEvent;
use taskline::models::{
    CategoryPatch, FieldUpdate, NewCategory, NewTask, TaskFilter, TaskPatch, TaskPriority,
    TaskStatus,
};
use taskline::repository::TaskRepository;

const ALICE: &str = "alice";
const BOB: &str = "bob";

fn new_task(title: &str) -> NewTask {
    NewTask {
        title: title.to_string(),
        ..NewTask::default()
    }
}

fn category(name: &str) -> NewCategory {
    NewCategory {
        name: name.to_string(),
        color: None,
    }
}

// ─── CATEGORIES ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn category_names_are_unique_per_owner_ignoring_case() {
    let h = Harness::new();
    h.service.create_category(ALICE, category("Work")).await.unwrap();

    let err = h.service.create_category(ALICE, category("work")).await.unwrap_err();
    assert!(matches!(err, ServiceError::DuplicateName(_)));

    // Another owner has its own namespace.
    h.service.create_category(BOB, category("WORK")).await.unwrap();
    assert_eq!(h.service.list_categories(ALICE).await.unwrap().len(), 1);
}

#[tokio::test]
async fn renaming_checks_other_categories_only() {
    let h = Harness::new();
    let work = h.service.create_category(ALICE, category("Work")).await.unwrap();
    h.service.create_category(ALICE, category("Home")).await.unwrap();

    let renamed = h
        .service
        .update_category(
            &work.id,
            ALICE,
            CategoryPatch { name: Some("WORK".into()), color: Some("#ff0000".into()) },
        )
        .await
        .unwrap();
    assert_eq!(renamed.name, "WORK");
    assert_eq!(renamed.color, "#ff0000");

    let err = h
        .service
        .update_category(&work.id, ALICE, CategoryPatch { name: Some("home".into()), color: None })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::DuplicateName(_)));
}

#[tokio::test]
async fn concurrent_creates_with_one_name_admit_a_single_category() {
    let h = Harness::new();
    let names = ["Work", "work", "WORK", " Work ", "wOrK"];

    let results = futures::future::join_all(
        names.iter().map(|name| h.service.create_category(ALICE, category(name))),
    )
    .await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, ServiceError::DuplicateName(_))));
    assert_eq!(h.service.list_categories(ALICE).await.unwrap().len(), 1);
}

#[tokio::test]
async fn blank_rename_is_rejected() {
    let h = Harness::new();
    let work = h.service.create_category(ALICE, category("Work")).await.unwrap();

    let err = h
        .service
        .update_category(&work.id, ALICE, CategoryPatch { name: Some("   ".into()), color: None })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let listed = h.service.list_categories(ALICE).await.unwrap();
    assert_eq!(listed[0].name, "Work");
}

#[tokio::test]
async fn deleting_an_unused_category() {
    let h = Harness::new();
    let work = h.service.create_category(ALICE, category("Work")).await.unwrap();
    h.service.create_task(ALICE, new_task("loose"), vec![], false).await.unwrap();

    h.service.delete_category(&work.id, ALICE).await.unwrap();

    assert!(h.service.list_categories(ALICE).await.unwrap().is_empty());
    assert_eq!(h.service.list_tasks(ALICE, &TaskFilter::default()).await.unwrap().len(), 1);
    assert_eq!(h.events.names_for(ALICE).last(), Some(&"categoryDeleted"));
}

#[tokio::test]
async fn deleting_a_category_uncategorizes_all_its_tasks() {
    let h = Harness::new();
    let work = h.service.create_category(ALICE, category("Work")).await.unwrap();
    let home = h.service.create_category(ALICE, category("Home")).await.unwrap();

    for i in 0..1000 {
        let fields = NewTask {
            category_id: Some(work.id.clone()),
            ..new_task(&format!("task {}", i))
        };
        h.service.create_task(ALICE, fields, vec![], false).await.unwrap();
    }
    let kept = NewTask {
        category_id: Some(home.id.clone()),
        ..new_task("stays")
    };
    h.service.create_task(ALICE, kept, vec![], false).await.unwrap();

    h.service.delete_category(&work.id, ALICE).await.unwrap();

    let tasks = h.service.list_tasks(ALICE, &TaskFilter::default()).await.unwrap();
    assert_eq!(tasks.len(), 1001);
    let still_home = tasks
        .iter()
        .filter(|t| t.task.category_id.as_deref() == Some(home.id.as_str()))
        .count();
    assert_eq!(still_home, 1);
    assert!(tasks
        .iter()
        .filter(|t| t.task.title != "stays")
        .all(|t| t.task.category_id.is_none() && t.category.is_none()));

    let err = h.service.delete_category(&work.id, ALICE).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

// ─── TASKS ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_applies_defaults_and_joins_category() {
    let h = Harness::new();
    let work = h.service.create_category(ALICE, category("Work")).await.unwrap();

    let fields = NewTask {
        category_id: Some(work.id.clone()),
        ..new_task("  Write report  ")
    };
    let view = h.service.create_task(ALICE, fields, vec![], false).await.unwrap();

    assert_eq!(view.task.title, "Write report");
    assert_eq!(view.task.status, TaskStatus::Pending);
    assert_eq!(view.task.priority, TaskPriority::Medium);
    assert_eq!(view.task.owner_id, ALICE);
    assert_eq!(view.category.as_ref().map(|c| c.name.as_str()), Some("Work"));
    assert!(view.task.updated_at >= view.task.created_at);
}

#[tokio::test]
async fn blank_title_is_rejected() {
    let h = Harness::new();
    let err = h.service.create_task(ALICE, new_task("   "), vec![], false).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    assert!(h.events.events().is_empty());
}

#[tokio::test]
async fn unknown_or_foreign_category_is_an_invalid_reference() {
    let h = Harness::new();
    let bobs = h.service.create_category(BOB, category("Bob's")).await.unwrap();

    let fields = NewTask {
        category_id: Some(bobs.id.clone()),
        ..new_task("sneaky")
    };
    let err = h.service.create_task(ALICE, fields, vec![], false).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidReference(_)));

    let task = h.service.create_task(ALICE, new_task("mine"), vec![], false).await.unwrap();
    let patch = TaskPatch {
        category_id: FieldUpdate::Set("missing".into()),
        ..TaskPatch::default()
    };
    let err = h.service.update_task(&task.task.id, ALICE, patch, vec![]).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidReference(_)));
}

#[tokio::test]
async fn other_owners_tasks_look_missing() {
    let h = Harness::new();
    let task = h.service.create_task(ALICE, new_task("private"), vec![], false).await.unwrap();
    let id = task.task.id;

    assert!(matches!(h.service.get_task(&id, BOB).await, Err(ServiceError::NotFound(_))));
    assert!(matches!(
        h.service.update_task(&id, BOB, TaskPatch::default(), vec![]).await,
        Err(ServiceError::NotFound(_))
    ));
    assert!(matches!(h.service.delete_task(&id, BOB).await, Err(ServiceError::NotFound(_))));
    assert!(h.service.list_tasks(BOB, &TaskFilter::default()).await.unwrap().is_empty());

    // Still intact for its owner.
    assert_eq!(h.service.get_task(&id, ALICE).await.unwrap().task.title, "private");
}

#[tokio::test]
async fn empty_description_clears_but_omitted_keeps() {
    let h = Harness::new();
    let fields = NewTask {
        description: Some("details".into()),
        ..new_task("task")
    };
    let task = h.service.create_task(ALICE, fields, vec![], false).await.unwrap();
    let id = task.task.id;

    let omitted = TaskPatch {
        title: Some("renamed".into()),
        ..TaskPatch::default()
    };
    let view = h.service.update_task(&id, ALICE, omitted, vec![]).await.unwrap();
    assert_eq!(view.task.description.as_deref(), Some("details"));

    let emptied = TaskPatch {
        description: FieldUpdate::Set(String::new()),
        ..TaskPatch::default()
    };
    let view = h.service.update_task(&id, ALICE, emptied, vec![]).await.unwrap();
    assert_eq!(view.task.description, None);
    assert_eq!(view.task.title, "renamed");
}

#[tokio::test]
async fn resubmitting_current_values_changes_nothing_but_updated_at() {
    let h = Harness::new();
    let work = h.service.create_category(ALICE, category("Work")).await.unwrap();
    let fields = NewTask {
        title: "Ship it".into(),
        description: Some("v1".into()),
        status: Some(TaskStatus::InProgress),
        due_date: Some(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()),
        priority: Some(TaskPriority::High),
        category_id: Some(work.id.clone()),
    };
    let before = h.service.create_task(ALICE, fields, vec![], false).await.unwrap().task;

    let patch = TaskPatch {
        title: Some(before.title.clone()),
        description: before.description.clone().map_or(FieldUpdate::Clear, FieldUpdate::Set),
        status: Some(before.status),
        due_date: before.due_date.map_or(FieldUpdate::Clear, FieldUpdate::Set),
        priority: Some(before.priority),
        category_id: before.category_id.clone().map_or(FieldUpdate::Clear, FieldUpdate::Set),
    };
    let after = h.service.update_task(&before.id, ALICE, patch, vec![]).await.unwrap().task;

    assert_eq!(after.title, before.title);
    assert_eq!(after.description, before.description);
    assert_eq!(after.status, before.status);
    assert_eq!(after.due_date, before.due_date);
    assert_eq!(after.priority, before.priority);
    assert_eq!(after.category_id, before.category_id);
    assert_eq!(after.created_at, before.created_at);
    assert!(after.updated_at >= before.updated_at);
}

#[tokio::test]
async fn a_single_field_update_reads_back_exactly() {
    let h = Harness::new();
    let work = h.service.create_category(ALICE, category("Work")).await.unwrap();
    let fields = NewTask {
        title: "Quarterly report".into(),
        description: Some("numbers for Q3".into()),
        status: Some(TaskStatus::InProgress),
        due_date: Some(Utc.with_ymd_and_hms(2025, 9, 30, 17, 0, 0).unwrap()),
        priority: Some(TaskPriority::Low),
        category_id: Some(work.id.clone()),
    };
    let created = h.service.create_task(ALICE, fields, vec![file("draft.txt")], false).await.unwrap().task;

    let read = h.service.get_task(&created.id, ALICE).await.unwrap().task;
    assert_eq!(read, created);

    tokio::time::sleep(Duration::from_millis(5)).await;
    let patch = TaskPatch {
        priority: Some(TaskPriority::High),
        ..TaskPatch::default()
    };
    h.service.update_task(&created.id, ALICE, patch, vec![]).await.unwrap();

    let after = h.service.get_task(&created.id, ALICE).await.unwrap().task;
    assert!(after.updated_at > read.updated_at);
    let mut expected = read.clone();
    expected.priority = TaskPriority::High;
    expected.updated_at = after.updated_at;
    assert_eq!(after, expected);
}

#[tokio::test]
async fn listing_filters_and_searches() {
    let h = Harness::new();
    let groceries = NewTask {
        description: Some("Milk and EGGS".into()),
        priority: Some(TaskPriority::Low),
        ..new_task("Shopping")
    };
    h.service.create_task(ALICE, groceries, vec![], false).await.unwrap();
    let done = NewTask {
        status: Some(TaskStatus::Completed),
        ..new_task("Tax return (2024)")
    };
    h.service.create_task(ALICE, done, vec![], false).await.unwrap();

    let by_text = TaskFilter {
        search: Some("eggs".into()),
        ..TaskFilter::default()
    };
    let found = h.service.list_tasks(ALICE, &by_text).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].task.title, "Shopping");

    // Regex metacharacters are matched literally.
    let literal = TaskFilter {
        search: Some("(2024)".into()),
        ..TaskFilter::default()
    };
    assert_eq!(h.service.list_tasks(ALICE, &literal).await.unwrap().len(), 1);

    let completed = TaskFilter {
        status: Some(TaskStatus::Completed),
        ..TaskFilter::default()
    };
    let found = h.service.list_tasks(ALICE, &completed).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].task.title, "Tax return (2024)");
}

// ─── ATTACHMENTS ────────────────────────────────────────────────────────────

#[tokio::test]
async fn attachments_are_appended_on_update() {
    let h = Harness::new();
    let task = h
        .service
        .create_task(ALICE, new_task("docs"), vec![file("a.txt")], false)
        .await
        .unwrap();
    assert_eq!(task.task.attachments.len(), 1);

    let view = h
        .service
        .update_task(&task.task.id, ALICE, TaskPatch::default(), vec![file("b.txt"), file("c.txt")])
        .await
        .unwrap();
    let names: Vec<_> = view.task.attachments.iter().map(|a| a.original_name.as_str()).collect();
    assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
    assert!(view.task.attachments.iter().all(|a| a.storage_path.starts_with("/uploads/")));
}

#[tokio::test]
async fn a_file_the_store_rejects_is_left_out() {
    let h = Harness::new();
    h.files.fail_store_of("broken.pdf");

    let view = h
        .service
        .create_task(ALICE, new_task("docs"), vec![file("ok.txt"), file("broken.pdf")], false)
        .await
        .unwrap();
    assert_eq!(view.task.attachments.len(), 1);
    assert_eq!(view.task.attachments[0].original_name, "ok.txt");
}

#[tokio::test]
async fn delete_attempts_every_file_even_when_one_fails() {
    let h = Harness::new();
    h.files.fail_delete_of("two.txt");
    let task = h
        .service
        .create_task(
            ALICE,
            new_task("with files"),
            vec![file("one.txt"), file("two.txt"), file("three.txt")],
            false,
        )
        .await
        .unwrap();
    h.events.clear();

    h.service.delete_task(&task.task.id, ALICE).await.unwrap();

    assert_eq!(h.files.delete_attempts(), 3);
    assert_eq!(h.files.stored_count(), 1);
    assert!(h.tasks.find_one(&task.task.id, ALICE).await.unwrap().is_none());
    assert_eq!(h.events.names_for(ALICE), vec!["taskDeleted"]);
}

#[tokio::test]
async fn removing_an_unknown_attachment_changes_nothing() {
    let h = Harness::new();
    let task = h
        .service
        .create_task(ALICE, new_task("docs"), vec![file("a.txt")], false)
        .await
        .unwrap()
        .task;
    h.events.clear();

    let err = h
        .service
        .remove_attachment(&task.id, "no-such-attachment", ALICE)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let stored = h.tasks.find_one(&task.id, ALICE).await.unwrap().unwrap();
    assert_eq!(stored.attachments, task.attachments);
    assert_eq!(stored.updated_at, task.updated_at);
    assert_eq!(h.files.delete_attempts(), 0);
    assert!(h.events.events().is_empty());
}

#[tokio::test]
async fn removing_an_attachment() {
    let h = Harness::new();
    let task = h
        .service
        .create_task(ALICE, new_task("docs"), vec![file("a.txt"), file("b.txt")], false)
        .await
        .unwrap()
        .task;

    let view = h
        .service
        .remove_attachment(&task.id, &task.attachments[0].id, ALICE)
        .await
        .unwrap();
    assert_eq!(view.task.attachments.len(), 1);
    assert_eq!(view.task.attachments[0].original_name, "b.txt");
    assert_eq!(h.files.delete_attempts(), 1);
    assert_eq!(h.events.names_for(ALICE).last(), Some(&"taskUpdated"));
}

#[tokio::test]
async fn slow_upload_does_not_restore_a_removed_attachment() {
    let h = Harness::new();
    let task = h
        .service
        .create_task(ALICE, new_task("docs"), vec![file("old.txt")], false)
        .await
        .unwrap()
        .task;
    h.files.delay_stores(Duration::from_millis(50));

    let (updated, removed) = tokio::join!(
        h.service.update_task(&task.id, ALICE, TaskPatch::default(), vec![file("new.txt")]),
        h.service.remove_attachment(&task.id, &task.attachments[0].id, ALICE),
    );
    updated.unwrap();
    removed.unwrap();

    let stored = h.service.get_task(&task.id, ALICE).await.unwrap().task;
    let names: Vec<_> = stored.attachments.iter().map(|a| a.original_name.as_str()).collect();
    assert_eq!(names, vec!["new.txt"]);
}

// ─── CALENDAR ───────────────────────────────────────────────────────────────

fn dated(title: &str) -> NewTask {
    NewTask {
        due_date: Some(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()),
        ..new_task(title)
    }
}

#[tokio::test]
async fn failing_calendar_does_not_fail_create() {
    let calendar = Arc::new(FailingCalendar::default());
    let h = Harness::with_calendar(calendar.clone());

    let view = h.service.create_task(ALICE, dated("dentist"), vec![], true).await.unwrap();

    assert_eq!(view.task.external_event_id, None);
    assert_eq!(calendar.calls.load(Ordering::SeqCst), 1);
    assert!(h.tasks.find_one(&view.task.id, ALICE).await.unwrap().is_some());
    assert_eq!(h.events.names_for(ALICE), vec!["taskCreated"]);
}

#[tokio::test]
async fn hanging_calendar_is_cut_off_by_the_timeout() {
    let h = Harness::with_calendar(Arc::new(HangingCalendar));

    let started = Instant::now();
    let view = h.service.create_task(ALICE, dated("dentist"), vec![], true).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(view.task.external_event_id, None);
}

#[tokio::test]
async fn calendar_sync_requires_a_due_date() {
    let calendar = Arc::new(MemoryCalendar::new());
    let h = Harness::with_calendar(calendar.clone());

    let undated = h.service.create_task(ALICE, new_task("someday"), vec![], true).await.unwrap();
    assert_eq!(undated.task.external_event_id, None);
    assert_eq!(calendar.len().await, 0);

    let err = h.service.link_calendar(&undated.task.id, ALICE).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn linked_task_follows_updates_and_deletion() {
    let calendar = Arc::new(MemoryCalendar::new());
    let h = Harness::with_calendar(calendar.clone());

    let view = h.service.create_task(ALICE, dated("dentist"), vec![], true).await.unwrap();
    let event_id = view.task.external_event_id.clone().expect("linked");

    let later = Utc.with_ymd_and_hms(2025, 6, 2, 14, 30, 0).unwrap();
    let patch = TaskPatch {
        title: Some("orthodontist".into()),
        due_date: FieldUpdate::Set(later),
        ..TaskPatch::default()
    };
    h.service.update_task(&view.task.id, ALICE, patch, vec![]).await.unwrap();

    let entry = calendar.get(&event_id).await.unwrap();
    assert_eq!(entry.title, "orthodontist");
    assert_eq!(entry.due, later);

    h.service.delete_task(&view.task.id, ALICE).await.unwrap();
    assert!(calendar.get(&event_id).await.is_none());
}

#[tokio::test]
async fn update_racing_a_link_keeps_the_event_id() {
    let calendar = Arc::new(MemoryCalendar::new());
    let h = Harness::with_calendar(calendar.clone());
    let task = h.service.create_task(ALICE, dated("dentist"), vec![], false).await.unwrap().task;
    h.files.delay_stores(Duration::from_millis(50));

    let patch = TaskPatch {
        title: Some("orthodontist".into()),
        ..TaskPatch::default()
    };
    let (updated, linked) = tokio::join!(
        h.service.update_task(&task.id, ALICE, patch, vec![file("referral.pdf")]),
        h.service.link_calendar(&task.id, ALICE),
    );
    let event_id = linked.unwrap().task.external_event_id.expect("linked");
    updated.unwrap();

    let stored = h.service.get_task(&task.id, ALICE).await.unwrap().task;
    assert_eq!(stored.external_event_id.as_deref(), Some(event_id.as_str()));
    assert_eq!(stored.title, "orthodontist");
    assert_eq!(stored.attachments.len(), 1);
    assert_eq!(calendar.len().await, 1);
}

#[tokio::test]
async fn link_unlink_and_bulk_sync() {
    let calendar = Arc::new(MemoryCalendar::new());
    let h = Harness::with_calendar(calendar.clone());

    let first = h.service.create_task(ALICE, dated("first"), vec![], false).await.unwrap();
    h.service.create_task(ALICE, dated("second"), vec![], false).await.unwrap();
    h.service.create_task(ALICE, new_task("undated"), vec![], false).await.unwrap();

    let linked = h.service.link_calendar(&first.task.id, ALICE).await.unwrap();
    assert!(linked.task.external_event_id.is_some());

    let report = h.service.sync_calendar(ALICE).await.unwrap();
    assert_eq!((report.created, report.updated, report.failed), (1, 1, 0));
    assert_eq!(calendar.len().await, 2);

    let unlinked = h.service.unlink_calendar(&first.task.id, ALICE).await.unwrap();
    assert_eq!(unlinked.task.external_event_id, None);
    assert_eq!(calendar.len().await, 1);

    let err = h.service.unlink_calendar(&first.task.id, ALICE).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn bulk_sync_counts_failures() {
    let h = Harness::with_calendar(Arc::new(FailingCalendar::default()));
    h.service.create_task(ALICE, dated("a"), vec![], false).await.unwrap();
    h.service.create_task(ALICE, dated("b"), vec![], false).await.unwrap();

    let report = h.service.sync_calendar(ALICE).await.unwrap();
    assert_eq!((report.created, report.updated, report.failed), (0, 0, 2));
}

// ─── EVENTS ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn events_reach_only_the_owner_after_each_write() {
    let h = Harness::new();
    let work = h.service.create_category(ALICE, category("Work")).await.unwrap();
    let task = h.service.create_task(ALICE, new_task("t"), vec![], false).await.unwrap();
    h.service
        .update_task(&task.task.id, ALICE, TaskPatch::default(), vec![])
        .await
        .unwrap();
    h.service.delete_task(&task.task.id, ALICE).await.unwrap();
    h.service.delete_category(&work.id, ALICE).await.unwrap();

    assert_eq!(
        h.events.names_for(ALICE),
        vec!["categoryCreated", "taskCreated", "taskUpdated", "taskDeleted", "categoryDeleted"]
    );
    assert!(h.events.names_for(BOB).is_empty());

    let deleted = h
        .events
        .events()
        .into_iter()
        .find_map(|(_, e)| match e {
            LiveEvent::TaskDeleted(id) => Some(id),
            _ => None,
        });
    assert_eq!(deleted, Some(task.task.id));
}
