use std::{panic::AssertUnwindSafe, sync::Arc, time::Instant};

use anyhow::{anyhow, Result};
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::{
    metrics::{record_delivery, DISPATCH_DURATION_SECONDS},
    models::{DispatchReport, NotificationContext, NotificationKind, User},
    services::{
        content_builder::ContentBuilder,
        email_service::{EmailTransport, OutgoingEmail},
        templates::TemplateRenderer,
        user_store::UserStore,
    },
    utils::{clock::Clock, panic::panic_message},
};

/// Sends one kind of notification to one user or to every active user.
pub struct NotificationDispatcher {
    store: Arc<dyn UserStore>,
    transport: Arc<dyn EmailTransport>,
    clock: Arc<dyn Clock>,
    content: ContentBuilder,
    renderer: TemplateRenderer,
    from_address: String,
    admin_email: String,
    shutdown: Option<watch::Receiver<bool>>,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn UserStore>,
        transport: Arc<dyn EmailTransport>,
        clock: Arc<dyn Clock>,
        from_address: impl Into<String>,
        admin_email: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            content: ContentBuilder::new(Arc::clone(&store), Arc::clone(&clock)),
            renderer: TemplateRenderer::new()?,
            store,
            transport,
            clock,
            from_address: from_address.into(),
            admin_email: admin_email.into(),
            shutdown: None,
        })
    }

    /// Stops multi-user runs between two sends once `true` is published.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Sends `kind` to `target`, or to every active user when `None`.
    ///
    /// Never fails: listing errors yield an empty report and a failed send
    /// for one user does not stop the others.
    pub async fn dispatch(&self, kind: NotificationKind, target: Option<&User>) -> DispatchReport {
        let span = tracing::info_span!("dispatch", kind = %kind, run_id = %Uuid::new_v4());
        self.dispatch_inner(kind, target).instrument(span).await
    }

    async fn dispatch_inner(&self, kind: NotificationKind, target: Option<&User>) -> DispatchReport {
        let started = Instant::now();
        let mut report = DispatchReport::new(kind);

        let users = match target {
            Some(user) => vec![user.clone()],
            None => match self.store.active_users().await {
                Ok(users) => users,
                Err(e) => {
                    error!(error = %format!("{e:#}"), "Error in {}", kind.description());
                    return report;
                }
            },
        };

        for user in &users {
            if self.shutdown_requested() {
                warn!(
                    remaining = users.len() - report.targeted - report.skipped,
                    "Shutdown requested, stopping {}",
                    kind.description()
                );
                report.interrupted = true;
                break;
            }

            if !user.has_email() {
                report.skipped += 1;
                continue;
            }

            report.targeted += 1;

            match self.send_to_user(kind, user).await {
                Ok(()) => {
                    report.sent += 1;
                    record_delivery(kind.label(), true);
                    info!("✅ {} sent to {}", kind.description(), user.email);
                }
                Err(e) => {
                    report.failed += 1;
                    record_delivery(kind.label(), false);
                    warn!("❌ Failed to send {} to {}: {e:#}", kind.description(), user.email);
                }
            }
        }

        DISPATCH_DURATION_SECONDS
            .with_label_values(&[kind.label()])
            .observe(started.elapsed().as_secs_f64());

        info!(
            skipped = report.skipped,
            "🎯 {}: {}/{} sent successfully",
            kind.description(),
            report.sent,
            report.targeted
        );

        report
    }

    /// Builds and sends one user's email. A panic on the way counts as a
    /// failed send for that user only.
    async fn send_to_user(&self, kind: NotificationKind, user: &User) -> Result<()> {
        AssertUnwindSafe(async {
            let context = self.content.build(user, kind.family()).await;
            self.deliver(kind, &context, &user.email).await
        })
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(anyhow!("panicked: {}", panic_message(payload.as_ref()))))
    }

    async fn deliver(
        &self,
        kind: NotificationKind,
        context: &NotificationContext,
        recipient: &str,
    ) -> Result<()> {
        let body = self.renderer.render(kind.template(), context)?;
        let email = OutgoingEmail {
            subject: kind.subject(&self.clock.now()),
            plain_body: body.plain,
            html_body: body.html,
            from: self.from_address.clone(),
            recipients: vec![recipient.trim().to_string()],
        };

        self.transport.send(&email).await?;
        Ok(())
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false)
    }

    pub async fn send_morning_reminder(&self) -> usize {
        self.dispatch(NotificationKind::MorningMotivation, None).await.sent
    }

    pub async fn send_afternoon_checkin(&self) -> usize {
        self.dispatch(NotificationKind::AfternoonCheckin, None).await.sent
    }

    pub async fn send_evening_review(&self) -> usize {
        self.dispatch(NotificationKind::EveningReview, None).await.sent
    }

    pub async fn send_night_motivation(&self) -> usize {
        self.dispatch(NotificationKind::NightMotivation, None).await.sent
    }

    pub async fn send_study_reminders(&self) -> usize {
        self.dispatch(NotificationKind::StudyReminder, None).await.sent
    }

    pub async fn send_course_completion_reminders(&self) -> usize {
        self.dispatch(NotificationKind::CourseCompletion, None).await.sent
    }

    pub async fn send_quiz_reminders(&self) -> usize {
        self.dispatch(NotificationKind::QuizReminder, None).await.sent
    }

    /// One test email to the first active user, or to the admin address
    /// with sample content when there is nobody to send to.
    pub async fn send_test_notification(&self) -> bool {
        self.send_test(NotificationKind::Test).await
    }

    /// Course flavoured variant of [`Self::send_test_notification`].
    pub async fn send_course_test_notification(&self) -> bool {
        self.send_test(NotificationKind::CourseTest).await
    }

    async fn send_test(&self, kind: NotificationKind) -> bool {
        match self.store.first_active_user().await {
            Ok(Some(user)) if user.has_email() => {
                return self.dispatch(kind, Some(&user)).await.sent == 1;
            }
            Ok(Some(user)) => {
                warn!(user = %user.username, "First active user has no email address");
            }
            Ok(None) => info!("No active users found, sending {} to admin", kind.description()),
            Err(e) => warn!(error = %format!("{e:#}"), "Could not look up a test recipient"),
        }

        let context = ContentBuilder::sample(&self.clock.now());
        let delivered = AssertUnwindSafe(self.deliver(kind, &context, &self.admin_email))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(anyhow!("panicked: {}", panic_message(payload.as_ref())))
            });
        record_delivery(kind.label(), delivered.is_ok());

        match delivered {
            Ok(()) => {
                info!("✅ {} sent to {}", kind.description(), self.admin_email);
                true
            }
            Err(e) => {
                warn!("❌ Failed to send {} to {}: {e:#}", kind.description(), self.admin_email);
                false
            }
        }
    }

    /// Self-test pass over every scheduled notification type.
    pub async fn send_all(&self) -> Vec<DispatchReport> {
        info!("🧪 Sending all notification types");

        let mut reports = Vec::with_capacity(NotificationKind::SELF_TEST_ORDER.len());
        for kind in NotificationKind::SELF_TEST_ORDER {
            reports.push(self.dispatch(kind, None).await);
        }

        let sent: usize = reports.iter().map(|report| report.sent).sum();
        let targeted: usize = reports.iter().map(|report| report.targeted).sum();
        info!("🎯 All notifications: {sent}/{targeted} sent successfully");

        reports
    }
}
