//! Integration tests for the notification dispatcher
//!
//! Run with: cargo test --test dispatcher_tests

mod common;

use std::sync::Arc;

use tokio::sync::watch;

use common::{
    at, capture_logs, dispatcher, fixed_clock, init_tracing, student, CapturedLogs, FixedClock,
    InMemoryStore, RecordingTransport, ADMIN, FROM,
};
use studytrack_notifier::models::{NotificationKind, User};

const MORNING_SUBJECT: &str = "🌅 Morning Study Reminder - Start Your Day Right!";

#[tokio::test]
async fn end_to_end_morning_dispatch_tolerates_one_failing_user() {
    let logs = CapturedLogs::default();
    let _guard = capture_logs(&logs);
    let store = Arc::new(InMemoryStore::with_users(vec![
        student("alice"),
        student("bob"),
        student("carol"),
    ]));
    let transport = Arc::new(RecordingTransport::failing_for(&["bob@example.com"]));
    let dispatcher = dispatcher(store, Arc::clone(&transport), fixed_clock(7, 0));

    let sent = dispatcher.send_morning_reminder().await;

    assert_eq!(sent, 2);
    assert_eq!(transport.attempts(), 3);
    assert_eq!(
        transport.recipients(),
        vec!["alice@example.com", "carol@example.com"]
    );
    assert!(transport.subjects().iter().all(|s| s == MORNING_SUBJECT));
    assert!(transport.sent().iter().all(|email| email.from == FROM));

    let output = logs.contents();
    assert!(output.contains("✅ Morning reminder sent to alice@example.com"));
    assert!(output.contains("❌ Failed to send Morning reminder to bob@example.com"));
    assert!(output.contains("✅ Morning reminder sent to carol@example.com"));
    assert!(output.contains("🎯 Morning reminder: 2/3 sent successfully"));
}

#[tokio::test]
async fn panic_while_sending_to_one_user_does_not_stop_the_others() {
    init_tracing();
    let store = Arc::new(InMemoryStore::with_users(vec![
        student("alice"),
        student("bob"),
        student("carol"),
    ]));
    let transport = Arc::new(RecordingTransport::panicking_for(&["bob@example.com"]));
    let dispatcher = dispatcher(store, Arc::clone(&transport), fixed_clock(7, 0));

    let report = dispatcher
        .dispatch(NotificationKind::MorningMotivation, None)
        .await;

    assert_eq!(report.targeted, 3);
    assert_eq!(report.sent, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(transport.attempts(), 3);
    assert_eq!(
        transport.recipients(),
        vec!["alice@example.com", "carol@example.com"]
    );
}

#[tokio::test]
async fn panic_is_logged_as_a_failed_send() {
    let logs = CapturedLogs::default();
    let _guard = capture_logs(&logs);
    let store = Arc::new(InMemoryStore::with_users(vec![student("bob")]));
    let transport = Arc::new(RecordingTransport::panicking_for(&["bob@example.com"]));
    let dispatcher = dispatcher(store, transport, fixed_clock(22, 0));

    assert_eq!(dispatcher.send_night_motivation().await, 0);

    let output = logs.contents();
    assert!(output.contains("❌ Failed to send Night motivation to bob@example.com: panicked: transport exploded"));
    assert!(output.contains("🎯 Night motivation: 0/1 sent successfully"));
}

#[tokio::test]
async fn partial_failure_reports_every_attempt() {
    let users = (1..=5).map(|i| student(&format!("user{i}"))).collect();
    let store = Arc::new(InMemoryStore::with_users(users));
    let transport = Arc::new(RecordingTransport::failing_for(&["user4@example.com"]));
    let dispatcher = dispatcher(store, Arc::clone(&transport), fixed_clock(13, 0));

    let report = dispatcher
        .dispatch(NotificationKind::AfternoonCheckin, None)
        .await;

    assert_eq!(report.targeted, 5);
    assert_eq!(report.sent, 4);
    assert_eq!(report.failed, 1);
    assert!(!report.interrupted);
    assert!(report.is_success());
    assert_eq!(transport.attempts(), 5);
}

#[tokio::test]
async fn users_without_email_are_skipped_and_not_counted() {
    let store = Arc::new(InMemoryStore::with_users(vec![
        student("alice"),
        User::student("blank", ""),
        User::student("spaces", "   "),
    ]));
    let transport = Arc::new(RecordingTransport::new());
    let dispatcher = dispatcher(store, Arc::clone(&transport), fixed_clock(18, 0));

    let report = dispatcher
        .dispatch(NotificationKind::EveningReview, None)
        .await;

    assert_eq!(report.targeted, 1);
    assert_eq!(report.sent, 1);
    assert_eq!(report.skipped, 2);
    assert_eq!(transport.attempts(), 1);
}

#[tokio::test]
async fn inactive_users_are_not_targeted() {
    let mut dormant = student("dormant");
    dormant.is_active = false;
    let store = Arc::new(InMemoryStore::with_users(vec![student("alice"), dormant]));
    let transport = Arc::new(RecordingTransport::new());
    let dispatcher = dispatcher(store, Arc::clone(&transport), fixed_clock(22, 0));

    assert_eq!(dispatcher.send_night_motivation().await, 1);
    assert_eq!(transport.recipients(), vec!["alice@example.com"]);
}

#[tokio::test]
async fn greeting_follows_the_clock_hour() {
    for (hour, greeting) in [(9, "Morning"), (15, "Afternoon"), (20, "Evening")] {
        let store = Arc::new(InMemoryStore::with_users(vec![student("alice")]));
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = dispatcher(store, Arc::clone(&transport), fixed_clock(hour, 0));

        assert_eq!(dispatcher.send_study_reminders().await, 1);
        assert_eq!(
            transport.subjects(),
            vec![format!("📚 {greeting} Study Reminder - 2026-03-02")]
        );
    }
}

#[tokio::test]
async fn store_failure_yields_an_empty_report() {
    let store = Arc::new(InMemoryStore::with_users(vec![student("alice")]).failing_listing());
    let transport = Arc::new(RecordingTransport::new());
    let dispatcher = dispatcher(store, Arc::clone(&transport), fixed_clock(8, 0));

    let report = dispatcher
        .dispatch(NotificationKind::CourseCompletion, None)
        .await;

    assert_eq!(report.targeted, 0);
    assert_eq!(report.sent, 0);
    assert!(!report.is_success());
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn missing_progress_still_sends_default_content() {
    let store = Arc::new(InMemoryStore::with_users(vec![student("alice")]).failing_progress());
    let transport = Arc::new(RecordingTransport::new());
    let dispatcher = dispatcher(store, Arc::clone(&transport), fixed_clock(8, 0));

    assert_eq!(dispatcher.send_course_completion_reminders().await, 1);

    let email = &transport.sent()[0];
    assert_eq!(email.subject, "🎓 Morning Course Update - 2026-03-02");
    assert!(email.plain_body.contains("Completed courses: 0 of 0"));
    assert!(email.plain_body.contains("Next up: No courses enrolled"));
}

#[tokio::test]
async fn quiz_reminder_sends_course_content() {
    let store = Arc::new(InMemoryStore::with_users(vec![student("alice")]));
    let transport = Arc::new(RecordingTransport::new());
    let dispatcher = dispatcher(store, Arc::clone(&transport), fixed_clock(11, 0));

    assert_eq!(dispatcher.send_quiz_reminders().await, 1);

    let email = &transport.sent()[0];
    assert_eq!(email.subject, "🎓 Morning Course Update - 2026-03-02");
    assert!(email.html_body.contains("Course progress"));
    assert!(email.plain_body.contains("Start your first course!"));
}

#[tokio::test]
async fn emails_carry_plain_and_html_bodies() {
    let store = Arc::new(InMemoryStore::with_users(vec![student("alice")]));
    let transport = Arc::new(RecordingTransport::new());
    let dispatcher = dispatcher(store, Arc::clone(&transport), fixed_clock(7, 0));

    dispatcher.send_morning_reminder().await;

    let email = &transport.sent()[0];
    assert!(email.html_body.contains("<h2>Hello alice!</h2>"));
    assert!(email.plain_body.contains("Hello alice!"));
    assert!(email.plain_body.contains("March 02, 2026"));
    assert!(!email.plain_body.contains("<h2>"));
}

#[tokio::test]
async fn explicit_target_only_reaches_that_user() {
    let store = Arc::new(InMemoryStore::with_users(vec![
        student("alice"),
        student("bob"),
    ]));
    let transport = Arc::new(RecordingTransport::new());
    let dispatcher = dispatcher(store, Arc::clone(&transport), fixed_clock(7, 0));

    let report = dispatcher
        .dispatch(NotificationKind::MorningMotivation, Some(&student("bob")))
        .await;

    assert_eq!(report.sent, 1);
    assert_eq!(transport.recipients(), vec!["bob@example.com"]);
}

#[tokio::test]
async fn test_notification_goes_to_first_active_user() {
    let store = Arc::new(InMemoryStore::with_users(vec![
        student("zoe"),
        student("adam"),
    ]));
    let transport = Arc::new(RecordingTransport::new());
    let dispatcher = dispatcher(store, Arc::clone(&transport), fixed_clock(10, 0));

    assert!(dispatcher.send_test_notification().await);
    assert_eq!(transport.recipients(), vec!["adam@example.com"]);
    assert_eq!(
        transport.subjects(),
        vec!["🧪 Test Notification - Study Tracker"]
    );
}

#[tokio::test]
async fn test_notification_falls_back_to_admin_with_sample_content() {
    let store = Arc::new(InMemoryStore::default());
    let transport = Arc::new(RecordingTransport::new());
    let dispatcher = dispatcher(store, Arc::clone(&transport), fixed_clock(10, 0));

    assert!(dispatcher.send_test_notification().await);

    let email = &transport.sent()[0];
    assert_eq!(email.recipients, vec![ADMIN]);
    assert!(email.plain_body.contains("Hello Test User!"));
    assert!(email.plain_body.contains("Test Assignment - Tomorrow"));
}

#[tokio::test]
async fn test_notification_reports_delivery_failure() {
    let store = Arc::new(InMemoryStore::default());
    let transport = Arc::new(RecordingTransport::always_failing());
    let dispatcher = dispatcher(store, Arc::clone(&transport), fixed_clock(10, 0));

    assert!(!dispatcher.send_test_notification().await);
    assert_eq!(transport.attempts(), 1);
}

#[tokio::test]
async fn course_test_notification_goes_to_first_active_user() {
    let store = Arc::new(InMemoryStore::with_users(vec![
        student("zoe"),
        student("adam"),
    ]));
    let transport = Arc::new(RecordingTransport::new());
    let dispatcher = dispatcher(store, Arc::clone(&transport), fixed_clock(10, 0));

    assert!(dispatcher.send_course_test_notification().await);

    let email = &transport.sent()[0];
    assert_eq!(email.recipients, vec!["adam@example.com"]);
    assert_eq!(email.subject, "🧪 Test Course Notification - Study Tracker");
    assert!(email.html_body.contains("Course progress"));
    assert!(email.plain_body.contains("Hello adam!"));
}

#[tokio::test]
async fn course_test_notification_falls_back_to_admin_with_sample_courses() {
    let store = Arc::new(InMemoryStore::default());
    let transport = Arc::new(RecordingTransport::new());
    let dispatcher = dispatcher(store, Arc::clone(&transport), fixed_clock(10, 0));

    assert!(dispatcher.send_course_test_notification().await);

    let email = &transport.sent()[0];
    assert_eq!(email.recipients, vec![ADMIN]);
    assert_eq!(email.subject, "🧪 Test Course Notification - Study Tracker");
    assert!(email.plain_body.contains("Completed courses: 3 of 8"));
    assert!(email.plain_body.contains("Mathematics"));
    assert!(email.plain_body.contains("Next up: Advanced Programming"));
}

#[tokio::test]
async fn test_notification_survives_a_panicking_admin_send() {
    init_tracing();
    let store = Arc::new(InMemoryStore::default());
    let transport = Arc::new(RecordingTransport::panicking());
    let dispatcher = dispatcher(store, Arc::clone(&transport), fixed_clock(10, 0));

    assert!(!dispatcher.send_test_notification().await);
    assert_eq!(transport.attempts(), 1);
}

#[tokio::test]
async fn send_all_runs_every_type_in_order() {
    let store = Arc::new(InMemoryStore::with_users(vec![student("alice")]));
    let transport = Arc::new(RecordingTransport::new());
    let dispatcher = dispatcher(store, Arc::clone(&transport), fixed_clock(12, 0));

    let reports = dispatcher.send_all().await;

    let kinds: Vec<_> = reports.iter().map(|report| report.kind).collect();
    assert_eq!(kinds, NotificationKind::SELF_TEST_ORDER.to_vec());
    assert!(reports.iter().all(|report| report.sent == 1));
    assert_eq!(
        transport.subjects(),
        vec![
            "🎓 Afternoon Course Update - 2026-03-02",
            "🌅 Morning Study Reminder - Start Your Day Right!",
            "☀️ Afternoon Study Check-in - Keep Going!",
            "🌙 Evening Study Review - Great Work Today!",
            "🌌 Night Motivation - Plan for Tomorrow!",
        ]
    );
}

#[tokio::test]
async fn shutdown_stops_between_users() {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let store = Arc::new(InMemoryStore::with_users(vec![
        student("alice"),
        student("bob"),
        student("carol"),
    ]));
    let transport = Arc::new(RecordingTransport::stopping(shutdown_tx));
    let dispatcher = dispatcher(store, Arc::clone(&transport), fixed_clock(7, 0))
        .with_shutdown(shutdown_rx);

    let report = dispatcher
        .dispatch(NotificationKind::MorningMotivation, None)
        .await;

    assert!(report.interrupted);
    assert_eq!(report.sent, 1);
    assert_eq!(transport.attempts(), 1);
}

#[tokio::test]
async fn content_is_built_for_the_clock_date() {
    let store = Arc::new(InMemoryStore::with_users(vec![student("alice")]));
    let transport = Arc::new(RecordingTransport::new());
    let clock = Arc::new(FixedClock(at(23, 59)));
    let dispatcher = dispatcher(Arc::clone(&store), transport, clock);

    dispatcher.send_night_motivation().await;

    assert_eq!(
        *store.progress_days.lock().unwrap(),
        vec![common::date(3, 2)]
    );
}
