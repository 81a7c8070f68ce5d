use std::fmt;

use chrono::{DateTime, FixedOffset, Timelike};
use serde::Serialize;

/// Which content variant a notification is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationFamily {
    StudyHabit,
    Course,
}

/// Email body templates shipped with the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmailTemplate {
    StudyReminder,
    CourseReminder,
}

impl EmailTemplate {
    pub const ALL: [EmailTemplate; 2] = [EmailTemplate::StudyReminder, EmailTemplate::CourseReminder];

    pub fn name(&self) -> &'static str {
        match self {
            EmailTemplate::StudyReminder => "study_reminder",
            EmailTemplate::CourseReminder => "course_reminder",
        }
    }
}

/// Closed set of notifications the dispatcher knows how to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    MorningMotivation,
    AfternoonCheckin,
    EveningReview,
    NightMotivation,
    StudyReminder,
    CourseCompletion,
    QuizReminder,
    Test,
    CourseTest,
}

impl NotificationKind {
    /// Order used by the "send everything" self-test pass.
    pub const SELF_TEST_ORDER: [NotificationKind; 5] = [
        NotificationKind::CourseCompletion,
        NotificationKind::MorningMotivation,
        NotificationKind::AfternoonCheckin,
        NotificationKind::EveningReview,
        NotificationKind::NightMotivation,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            NotificationKind::MorningMotivation => "morning_motivation",
            NotificationKind::AfternoonCheckin => "afternoon_checkin",
            NotificationKind::EveningReview => "evening_review",
            NotificationKind::NightMotivation => "night_motivation",
            NotificationKind::StudyReminder => "study_reminder",
            NotificationKind::CourseCompletion => "course_completion",
            NotificationKind::QuizReminder => "quiz_reminder",
            NotificationKind::Test => "test",
            NotificationKind::CourseTest => "course_test",
        }
    }

    /// Human wording used in per-send log lines.
    pub fn description(&self) -> &'static str {
        match self {
            NotificationKind::MorningMotivation => "Morning reminder",
            NotificationKind::AfternoonCheckin => "Afternoon check-in",
            NotificationKind::EveningReview => "Evening review",
            NotificationKind::NightMotivation => "Night motivation",
            NotificationKind::StudyReminder => "Study reminder",
            NotificationKind::CourseCompletion => "Course reminder",
            NotificationKind::QuizReminder => "Quiz reminder",
            NotificationKind::Test => "Test notification",
            NotificationKind::CourseTest => "Test course notification",
        }
    }

    /// Kind whose content is actually sent. Quiz reminders have no content
    /// of their own yet and reuse the course completion reminder.
    pub fn content_kind(self) -> NotificationKind {
        match self {
            NotificationKind::QuizReminder => NotificationKind::CourseCompletion,
            other => other,
        }
    }

    pub fn family(&self) -> NotificationFamily {
        match self.content_kind() {
            NotificationKind::CourseCompletion | NotificationKind::CourseTest => {
                NotificationFamily::Course
            }
            _ => NotificationFamily::StudyHabit,
        }
    }

    pub fn template(&self) -> EmailTemplate {
        match self.family() {
            NotificationFamily::StudyHabit => EmailTemplate::StudyReminder,
            NotificationFamily::Course => EmailTemplate::CourseReminder,
        }
    }

    /// Subject line for a send happening at `now`.
    pub fn subject(&self, now: &DateTime<FixedOffset>) -> String {
        match self.content_kind() {
            NotificationKind::MorningMotivation => {
                "🌅 Morning Study Reminder - Start Your Day Right!".to_string()
            }
            NotificationKind::AfternoonCheckin => {
                "☀️ Afternoon Study Check-in - Keep Going!".to_string()
            }
            NotificationKind::EveningReview => {
                "🌙 Evening Study Review - Great Work Today!".to_string()
            }
            NotificationKind::NightMotivation => {
                "🌌 Night Motivation - Plan for Tomorrow!".to_string()
            }
            NotificationKind::StudyReminder => format!(
                "📚 {} Study Reminder - {}",
                greeting_for_hour(now.hour()),
                now.format("%Y-%m-%d")
            ),
            NotificationKind::CourseCompletion | NotificationKind::QuizReminder => format!(
                "🎓 {} Course Update - {}",
                greeting_for_hour(now.hour()),
                now.format("%Y-%m-%d")
            ),
            NotificationKind::Test => "🧪 Test Notification - Study Tracker".to_string(),
            NotificationKind::CourseTest => {
                "🧪 Test Course Notification - Study Tracker".to_string()
            }
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Time-of-day greeting: before noon, before 17:00, otherwise evening.
pub fn greeting_for_hour(hour: u32) -> &'static str {
    if hour < 12 {
        "Morning"
    } else if hour < 17 {
        "Afternoon"
    } else {
        "Evening"
    }
}

/// Values rendered into an email body. Built fresh for every send.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationContext {
    pub student_name: String,
    pub current_date: String,
    pub pending_assignments: u32,
    pub upcoming_deadlines: Vec<String>,
    pub study_hours_today: f64,
    pub target_hours: u32,
    pub completed_courses: u32,
    pub total_courses: u32,
    pub progress_percentage: f64,
    pub recent_courses: Vec<String>,
    pub next_recommended_course: String,
}

/// Outcome of one dispatch run for a single notification kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub kind: NotificationKind,
    /// Users with an email address that a send was attempted for
    pub targeted: usize,
    pub sent: usize,
    pub failed: usize,
    /// Users without an email address
    pub skipped: usize,
    /// Shutdown was requested before every target was reached
    pub interrupted: bool,
}

impl DispatchReport {
    pub fn new(kind: NotificationKind) -> Self {
        Self {
            kind,
            targeted: 0,
            sent: 0,
            failed: 0,
            skipped: 0,
            interrupted: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.sent > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 2, hour, 15, 0)
            .unwrap()
    }

    #[test]
    fn greeting_buckets() {
        assert_eq!(greeting_for_hour(0), "Morning");
        assert_eq!(greeting_for_hour(11), "Morning");
        assert_eq!(greeting_for_hour(12), "Afternoon");
        assert_eq!(greeting_for_hour(16), "Afternoon");
        assert_eq!(greeting_for_hour(17), "Evening");
        assert_eq!(greeting_for_hour(23), "Evening");
    }

    #[test]
    fn dated_subjects_include_greeting_and_date() {
        assert_eq!(
            NotificationKind::StudyReminder.subject(&at(9)),
            "📚 Morning Study Reminder - 2026-03-02"
        );
        assert_eq!(
            NotificationKind::CourseCompletion.subject(&at(20)),
            "🎓 Evening Course Update - 2026-03-02"
        );
    }

    #[test]
    fn quiz_reminder_falls_back_to_course_content() {
        let kind = NotificationKind::QuizReminder;
        assert_eq!(kind.content_kind(), NotificationKind::CourseCompletion);
        assert_eq!(kind.family(), NotificationFamily::Course);
        assert_eq!(kind.template(), EmailTemplate::CourseReminder);
        assert_eq!(
            kind.subject(&at(15)),
            NotificationKind::CourseCompletion.subject(&at(15))
        );
        assert_eq!(kind.label(), "quiz_reminder");
    }

    #[test]
    fn study_kinds_use_study_template() {
        for kind in [
            NotificationKind::MorningMotivation,
            NotificationKind::AfternoonCheckin,
            NotificationKind::EveningReview,
            NotificationKind::NightMotivation,
            NotificationKind::StudyReminder,
            NotificationKind::Test,
        ] {
            assert_eq!(kind.template(), EmailTemplate::StudyReminder, "{kind}");
        }
    }

    #[test]
    fn fixed_subjects_ignore_the_clock() {
        assert_eq!(
            NotificationKind::MorningMotivation.subject(&at(21)),
            "🌅 Morning Study Reminder - Start Your Day Right!"
        );
        assert_eq!(
            NotificationKind::Test.subject(&at(3)),
            "🧪 Test Notification - Study Tracker"
        );
        assert_eq!(
            NotificationKind::CourseTest.subject(&at(3)),
            "🧪 Test Course Notification - Study Tracker"
        );
    }

    #[test]
    fn course_test_uses_course_template() {
        let kind = NotificationKind::CourseTest;
        assert_eq!(kind.family(), NotificationFamily::Course);
        assert_eq!(kind.template(), EmailTemplate::CourseReminder);
        assert_eq!(kind.label(), "course_test");
    }
}
