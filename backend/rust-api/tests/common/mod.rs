#![allow(dead_code)]

use std::{
    collections::HashMap,
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use tokio::sync::watch;
use tracing_subscriber::fmt::MakeWriter;

use studytrack_notifier::{
    models::{ProgressSnapshot, User},
    services::{
        email_service::{EmailError, EmailTransport, OutgoingEmail},
        notification_dispatcher::NotificationDispatcher,
        user_store::UserStore,
    },
    utils::clock::Clock,
};

pub const FROM: &str = "StudyTrack <noreply@studytrack.com>";
pub const ADMIN: &str = "admin@example.com";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// In-memory log sink for asserting on formatted log lines.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Routes this thread's logs into `logs` until the guard is dropped.
pub fn capture_logs(logs: &CapturedLogs) -> tracing::subscriber::DefaultGuard {
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_default(subscriber)
}

/// Monday 2026-03-02 at `hour:minute` UTC.
pub fn at(hour: u32, minute: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2026, 3, 2, hour, minute, 0)
        .unwrap()
}

pub fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, month, day).unwrap()
}

pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

pub fn fixed_clock(hour: u32, minute: u32) -> Arc<dyn Clock> {
    Arc::new(FixedClock(at(hour, minute)))
}

pub fn student(username: &str) -> User {
    User::student(username, format!("{username}@example.com"))
}

/// In-memory stand-in for the MongoDB store.
#[derive(Default)]
pub struct InMemoryStore {
    users: Vec<User>,
    snapshots: HashMap<String, ProgressSnapshot>,
    fail_listing: bool,
    panic_listing: bool,
    fail_progress: bool,
    pub progress_days: Mutex<Vec<NaiveDate>>,
}

impl InMemoryStore {
    pub fn with_users(users: Vec<User>) -> Self {
        Self {
            users,
            ..Default::default()
        }
    }

    pub fn snapshot(mut self, username: &str, snapshot: ProgressSnapshot) -> Self {
        self.snapshots.insert(username.to_string(), snapshot);
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    pub fn panicking_listing(mut self) -> Self {
        self.panic_listing = true;
        self
    }

    pub fn failing_progress(mut self) -> Self {
        self.fail_progress = true;
        self
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn active_users(&self) -> Result<Vec<User>> {
        if self.panic_listing {
            panic!("user collection cursor exploded");
        }
        if self.fail_listing {
            return Err(anyhow!("connection refused"));
        }
        let mut users: Vec<User> = self.users.iter().filter(|u| u.is_active).cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn first_active_user(&self) -> Result<Option<User>> {
        Ok(self.active_users().await?.into_iter().next())
    }

    async fn progress_snapshot(&self, user: &User, today: NaiveDate) -> Result<ProgressSnapshot> {
        self.progress_days.lock().unwrap().push(today);
        if self.fail_progress {
            return Err(anyhow!("progress collection unavailable"));
        }
        Ok(self
            .snapshots
            .get(&user.username)
            .cloned()
            .unwrap_or_default())
    }
}

/// Records every delivery attempt. Can be told to fail, panic or raise
/// the shutdown flag after a successful send.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutgoingEmail>>,
    attempts: AtomicUsize,
    failing: Vec<String>,
    fail_all: bool,
    panic_on_send: bool,
    panicking: Vec<String>,
    stop_after_send: Option<watch::Sender<bool>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(addresses: &[&str]) -> Self {
        Self {
            failing: addresses.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn always_failing() -> Self {
        Self {
            fail_all: true,
            ..Default::default()
        }
    }

    pub fn panicking() -> Self {
        Self {
            panic_on_send: true,
            ..Default::default()
        }
    }

    pub fn panicking_for(addresses: &[&str]) -> Self {
        Self {
            panicking: addresses.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn stopping(shutdown: watch::Sender<bool>) -> Self {
        Self {
            stop_after_send: Some(shutdown),
            ..Default::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn recipients(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .flat_map(|email| email.recipients)
            .collect()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent().into_iter().map(|email| email.subject).collect()
    }
}

#[async_trait]
impl EmailTransport for RecordingTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let recipient = email.recipients.join(",");
        if self.panic_on_send || self.panicking.contains(&recipient) {
            panic!("transport exploded");
        }

        if self.fail_all || self.failing.contains(&recipient) {
            return Err(EmailError::Smtp(format!(
                "550 mailbox unavailable: {recipient}"
            )));
        }

        self.sent.lock().unwrap().push(email.clone());

        if let Some(shutdown) = &self.stop_after_send {
            let _ = shutdown.send(true);
        }
        Ok(())
    }
}

pub fn dispatcher(
    store: Arc<InMemoryStore>,
    transport: Arc<RecordingTransport>,
    clock: Arc<dyn Clock>,
) -> NotificationDispatcher {
    NotificationDispatcher::new(store, transport, clock, FROM, ADMIN).unwrap()
}
