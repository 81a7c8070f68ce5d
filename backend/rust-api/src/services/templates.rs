use anyhow::{Context, Result};
use handlebars::Handlebars;

use crate::{
    models::{EmailTemplate, NotificationContext},
    utils::html::html_to_plain,
};

const STUDY_REMINDER_HTML: &str = include_str!("../../templates/emails/study_reminder.html.hbs");
const COURSE_REMINDER_HTML: &str = include_str!("../../templates/emails/course_reminder.html.hbs");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBody {
    pub html: String,
    pub plain: String,
}

/// Renders notification bodies from the embedded Handlebars templates.
pub struct TemplateRenderer {
    handlebars: Handlebars<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);

        for template in EmailTemplate::ALL {
            handlebars
                .register_template_string(template.name(), source_for(template))
                .with_context(|| format!("Failed to compile template '{}'", template.name()))?;
        }

        Ok(Self { handlebars })
    }

    pub fn render(
        &self,
        template: EmailTemplate,
        context: &NotificationContext,
    ) -> Result<RenderedBody> {
        let html = self
            .handlebars
            .render(template.name(), context)
            .with_context(|| format!("Failed to render template '{}'", template.name()))?;
        let plain = html_to_plain(&html);

        Ok(RenderedBody { html, plain })
    }
}

fn source_for(template: EmailTemplate) -> &'static str {
    match template {
        EmailTemplate::StudyReminder => STUDY_REMINDER_HTML,
        EmailTemplate::CourseReminder => COURSE_REMINDER_HTML,
    }
}
