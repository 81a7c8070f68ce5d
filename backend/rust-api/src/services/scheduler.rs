use std::{fmt, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use chrono::{DateTime, FixedOffset, NaiveTime, TimeDelta};
use futures::FutureExt;
use tokio::{sync::watch, time::sleep};
use tracing::{error, info};

use crate::{
    config::SchedulerSettings,
    metrics::{SCHEDULER_TICKS_TOTAL, SCHEDULER_TRIGGER_FIRES_TOTAL},
    models::{DispatchReport, NotificationKind},
    services::notification_dispatcher::NotificationDispatcher,
    utils::{clock::Clock, panic::panic_message},
};

/// When a trigger becomes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleRule {
    /// Every day at the given local time.
    DailyAt(NaiveTime),
    /// Repeats the given number of minutes after the previous run.
    Every { minutes: u32 },
}

impl ScheduleRule {
    pub fn daily(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(ScheduleRule::DailyAt)
    }

    /// First occurrence strictly after `now`.
    pub fn next_after(&self, now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        match *self {
            ScheduleRule::DailyAt(at) => {
                let today = now + (at - now.time());
                if today > now {
                    today
                } else {
                    today + TimeDelta::days(1)
                }
            }
            ScheduleRule::Every { minutes } => now + TimeDelta::minutes(i64::from(minutes.max(1))),
        }
    }
}

impl fmt::Display for ScheduleRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleRule::DailyAt(at) => write!(f, "daily at {}", at.format("%H:%M")),
            ScheduleRule::Every { minutes } => write!(f, "every {minutes} minutes"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAction {
    Dispatch(NotificationKind),
    SendAll,
}

impl TriggerAction {
    pub fn label(&self) -> &'static str {
        match self {
            TriggerAction::Dispatch(kind) => kind.label(),
            TriggerAction::SendAll => "send_all",
        }
    }
}

impl fmt::Display for TriggerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerAction::Dispatch(kind) => f.write_str(kind.description()),
            TriggerAction::SendAll => f.write_str("All notifications (test)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub rule: ScheduleRule,
    pub action: TriggerAction,
}

/// Ordered list of triggers. Due triggers fire in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleTable {
    triggers: Vec<Trigger>,
}

impl ScheduleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, rule: ScheduleRule, action: TriggerAction) -> Self {
        self.triggers.push(Trigger { rule, action });
        self
    }

    /// Production schedule, plus the fast self-test trigger in test mode.
    pub fn standard(settings: &SchedulerSettings) -> Self {
        use NotificationKind as Kind;

        let daily = [
            (8, 0, Kind::CourseCompletion),
            (14, 0, Kind::CourseCompletion),
            (19, 0, Kind::CourseCompletion),
            (11, 0, Kind::QuizReminder),
            (7, 0, Kind::MorningMotivation),
            (13, 0, Kind::AfternoonCheckin),
            (18, 0, Kind::EveningReview),
            (22, 0, Kind::NightMotivation),
        ];

        let mut table = Self::new();
        for (hour, minute, kind) in daily {
            if let Some(rule) = ScheduleRule::daily(hour, minute) {
                table = table.with(rule, TriggerAction::Dispatch(kind));
            }
        }

        if settings.test_mode {
            table = table.with(
                ScheduleRule::Every {
                    minutes: settings.test_interval_minutes,
                },
                TriggerAction::SendAll,
            );
        }

        table
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredTrigger {
    pub action: TriggerAction,
    pub reports: Vec<DispatchReport>,
    /// The action panicked; the loop carried on
    pub panicked: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub fired: u64,
    pub panics: u64,
}

struct ScheduledTrigger {
    trigger: Trigger,
    next_run: DateTime<FixedOffset>,
}

pub struct Scheduler {
    triggers: Vec<ScheduledTrigger>,
    dispatcher: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    tick: Duration,
    test_mode: bool,
}

impl Scheduler {
    pub fn new(
        table: ScheduleTable,
        dispatcher: Arc<NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        settings: &SchedulerSettings,
    ) -> Self {
        let now = clock.now();
        let triggers = table
            .triggers
            .into_iter()
            .map(|trigger| ScheduledTrigger {
                next_run: trigger.rule.next_after(now),
                trigger,
            })
            .collect();

        Self {
            triggers,
            dispatcher,
            clock,
            tick: settings.tick_interval(),
            test_mode: settings.test_mode,
        }
    }

    /// Next due time of every trigger, in registration order.
    pub fn next_runs(&self) -> Vec<(Trigger, DateTime<FixedOffset>)> {
        self.triggers
            .iter()
            .map(|scheduled| (scheduled.trigger, scheduled.next_run))
            .collect()
    }

    /// Fires every trigger due at `now` and reschedules it.
    pub async fn run_pending(&mut self, now: DateTime<FixedOffset>) -> Vec<FiredTrigger> {
        let mut fired = Vec::new();

        for index in 0..self.triggers.len() {
            if self.triggers[index].next_run > now {
                continue;
            }

            let action = self.triggers[index].trigger.action;
            fired.push(self.fire(action).await);

            // a long send may run past `now`
            let reference = now.max(self.clock.now());
            let scheduled = &mut self.triggers[index];
            scheduled.next_run = scheduled.trigger.rule.next_after(reference);
        }

        fired
    }

    async fn fire(&self, action: TriggerAction) -> FiredTrigger {
        SCHEDULER_TRIGGER_FIRES_TOTAL
            .with_label_values(&[action.label()])
            .inc();
        info!("⏰ Running {action}");

        let dispatcher = Arc::clone(&self.dispatcher);
        let outcome = AssertUnwindSafe(async move {
            match action {
                TriggerAction::Dispatch(kind) => vec![dispatcher.dispatch(kind, None).await],
                TriggerAction::SendAll => dispatcher.send_all().await,
            }
        })
        .catch_unwind()
        .await;

        match outcome {
            Ok(reports) => FiredTrigger {
                action,
                reports,
                panicked: false,
            },
            Err(payload) => {
                error!(
                    panic = %panic_message(payload.as_ref()),
                    "❌ Scheduled job {action} crashed, scheduler keeps running"
                );
                FiredTrigger {
                    action,
                    reports: Vec::new(),
                    panicked: true,
                }
            }
        }
    }

    /// Runs until `true` is published on `shutdown` or its sender is dropped.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> SchedulerStats {
        let mut stats = SchedulerStats::default();
        self.log_banner();

        if self.test_mode {
            info!("🧪 Test mode: sending every notification type once at startup");
            let fired = self.fire(TriggerAction::SendAll).await;
            stats.fired += 1;
            stats.panics += u64::from(fired.panicked);
        }

        loop {
            if *shutdown.borrow() {
                break;
            }

            let fired = self.run_pending(self.clock.now()).await;
            let panics = fired.iter().filter(|f| f.panicked).count() as u64;

            stats.ticks += 1;
            stats.fired += fired.len() as u64;
            stats.panics += panics;

            let status = if panics == 0 { "success" } else { "error" };
            SCHEDULER_TICKS_TOTAL.with_label_values(&[status]).inc();

            tokio::select! {
                _ = sleep(self.tick) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(
            ticks = stats.ticks,
            fired = stats.fired,
            panics = stats.panics,
            "🛑 Scheduler stopped"
        );
        stats
    }

    fn log_banner(&self) {
        info!(
            tick_secs = self.tick.as_secs(),
            test_mode = self.test_mode,
            "🚀 StudyTrack notification scheduler started"
        );
        info!("📅 Scheduled notifications:");
        for scheduled in &self.triggers {
            info!(
                next_run = %scheduled.next_run.format("%Y-%m-%d %H:%M"),
                "   • {}: {}",
                scheduled.trigger.rule,
                scheduled.trigger.action
            );
        }
        info!("Press Ctrl+C to stop the scheduler");
    }
}
