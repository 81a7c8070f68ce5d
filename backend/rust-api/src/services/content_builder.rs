use std::sync::Arc;

use chrono::{DateTime, FixedOffset};

use crate::{
    models::{NotificationContext, NotificationFamily, ProgressSnapshot, User},
    services::user_store::{round_one_decimal, UserStore},
    utils::clock::Clock,
};

/// Daily study goal shown in every email.
pub const TARGET_STUDY_HOURS: u32 = 4;

const NO_COURSES: &str = "No courses enrolled";
const FIRST_COURSE: &str = "Start your first course!";

/// Builds the per-user values rendered into a notification body.
pub struct ContentBuilder {
    store: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
}

impl ContentBuilder {
    pub fn new(store: Arc<dyn UserStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Never fails: when progress cannot be read the default bundle is used.
    pub async fn build(&self, user: &User, family: NotificationFamily) -> NotificationContext {
        let now = self.clock.now();

        match self.store.progress_snapshot(user, now.date_naive()).await {
            Ok(snapshot) => from_snapshot(user, &now, family, snapshot),
            Err(e) => {
                tracing::warn!(
                    user = %user.username,
                    error = %e,
                    "Progress unavailable, using default notification content"
                );
                fallback(user, &now)
            }
        }
    }

    /// Fixed context for test sends when no active user exists.
    pub fn sample(now: &DateTime<FixedOffset>) -> NotificationContext {
        NotificationContext {
            student_name: "Test User".to_string(),
            current_date: format_date(now),
            pending_assignments: 2,
            upcoming_deadlines: vec!["Test Assignment - Tomorrow".to_string()],
            study_hours_today: 1.0,
            target_hours: TARGET_STUDY_HOURS,
            completed_courses: 3,
            total_courses: 8,
            progress_percentage: 37.5,
            recent_courses: vec![
                "Mathematics".to_string(),
                "Science".to_string(),
                "History".to_string(),
            ],
            next_recommended_course: "Advanced Programming".to_string(),
        }
    }
}

fn from_snapshot(
    user: &User,
    now: &DateTime<FixedOffset>,
    family: NotificationFamily,
    snapshot: ProgressSnapshot,
) -> NotificationContext {
    let next_recommended_course = match family {
        NotificationFamily::Course => recommend_next(&snapshot),
        NotificationFamily::StudyHabit => snapshot
            .recent_courses
            .first()
            .cloned()
            .unwrap_or_else(|| NO_COURSES.to_string()),
    };

    NotificationContext {
        student_name: user.display_name(),
        current_date: format_date(now),
        pending_assignments: snapshot.pending_assignments,
        upcoming_deadlines: snapshot
            .upcoming_deadlines
            .iter()
            .map(|deadline| deadline.label())
            .collect(),
        study_hours_today: round_one_decimal(f64::from(snapshot.study_minutes_today) / 60.0),
        target_hours: TARGET_STUDY_HOURS,
        completed_courses: snapshot.completed_courses,
        total_courses: snapshot.total_courses,
        progress_percentage: round_one_decimal(snapshot.progress_percentage),
        recent_courses: snapshot.recent_courses,
        next_recommended_course,
    }
}

fn recommend_next(snapshot: &ProgressSnapshot) -> String {
    if snapshot.total_courses == 0 {
        return FIRST_COURSE.to_string();
    }

    match snapshot.recent_courses.first() {
        Some(course) => format!("Continue {course}"),
        None => NO_COURSES.to_string(),
    }
}

fn fallback(user: &User, now: &DateTime<FixedOffset>) -> NotificationContext {
    NotificationContext {
        student_name: user.display_name(),
        current_date: format_date(now),
        pending_assignments: 0,
        upcoming_deadlines: Vec::new(),
        study_hours_today: 0.0,
        target_hours: TARGET_STUDY_HOURS,
        completed_courses: 0,
        total_courses: 0,
        progress_percentage: 0.0,
        recent_courses: Vec::new(),
        next_recommended_course: NO_COURSES.to_string(),
    }
}

fn format_date(now: &DateTime<FixedOffset>) -> String {
    now.format("%B %d, %Y").to_string()
}
