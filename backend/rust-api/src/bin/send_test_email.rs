//! One-shot delivery check.
//!
//! `send_test_email [--course] <address>` renders the sample test
//! notification and sends it straight through SMTP. Without an address the
//! regular test notification path runs against MongoDB (first active user,
//! else the admin address). `--course` sends the course flavoured variant.

use std::sync::Arc;

use anyhow::{bail, Context};

use studytrack_notifier::{
    config::Config,
    models::NotificationKind,
    services::{
        connect_mongo,
        content_builder::ContentBuilder,
        email_service::{EmailTransport, OutgoingEmail, SmtpEmailTransport},
        notification_dispatcher::NotificationDispatcher,
        templates::TemplateRenderer,
        user_store::MongoUserStore,
    },
    telemetry,
    utils::clock::{Clock, SystemClock},
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let telemetry = telemetry::init("studytrack-send-test-email")?;

    let config = Config::load().context("Failed to load configuration")?;
    let offset = config
        .scheduler
        .utc_offset()
        .context("Invalid scheduler.utc_offset_minutes")?;
    let clock = Arc::new(SystemClock::new(offset));
    let transport = Arc::new(SmtpEmailTransport::new(&config.email)?);

    tracing::info!(
        server = %config.email.server,
        port = config.email.port,
        tls = config.email.use_tls,
        "Sending test email"
    );

    let mut course = false;
    let mut recipient = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--course" => course = true,
            _ => recipient = Some(arg),
        }
    }
    let kind = if course {
        NotificationKind::CourseTest
    } else {
        NotificationKind::Test
    };

    let delivered = match recipient {
        Some(recipient) => {
            let now = clock.now();
            let body = TemplateRenderer::new()?
                .render(kind.template(), &ContentBuilder::sample(&now))?;
            let email = OutgoingEmail {
                subject: kind.subject(&now),
                plain_body: body.plain,
                html_body: body.html,
                from: config.email.from_email.clone(),
                recipients: vec![recipient.clone()],
            };

            match transport.send(&email).await {
                Ok(()) => {
                    tracing::info!("✅ {} sent to {}", kind.description(), recipient);
                    true
                }
                Err(e) => {
                    tracing::error!("❌ {} to {} failed: {}", kind.description(), recipient, e);
                    false
                }
            }
        }
        None => {
            let mongo_client = connect_mongo(&config).await?;
            let store = Arc::new(MongoUserStore::new(
                mongo_client.database(&config.database.mongo_database),
            ));
            let dispatcher = NotificationDispatcher::new(
                store,
                transport,
                clock,
                config.email.from_email.clone(),
                config.email.admin_email.clone(),
            )?;
            if course {
                dispatcher.send_course_test_notification().await
            } else {
                dispatcher.send_test_notification().await
            }
        }
    };

    telemetry.shutdown();

    if !delivered {
        bail!("test email was not delivered");
    }
    Ok(())
}
