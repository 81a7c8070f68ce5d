use chrono::{DateTime, NaiveDate, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::user::{bson_datetime_as_chrono, bson_datetime_as_chrono_option};

/// Row of the "enrollments" collection, written by the web application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub course_id: ObjectId,
    /// Percentage completion, 0..=100
    #[serde(default)]
    pub progress: f64,
    #[serde(with = "bson_datetime_as_chrono")]
    pub enrolled_at: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TaskStatus {
    #[default]
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
}

/// Row of the "tasks" collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub student_id: ObjectId,
    pub title: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deadline {
    pub title: String,
    pub due: NaiveDate,
}

impl Deadline {
    /// "Essay draft - Mar 04"
    pub fn label(&self) -> String {
        format!("{} - {}", self.title, self.due.format("%b %d"))
    }
}

/// Per-user progress aggregate consumed by notification content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    pub completed_courses: u32,
    pub total_courses: u32,
    pub progress_percentage: f64,
    pub pending_assignments: u32,
    /// Earliest first
    pub upcoming_deadlines: Vec<Deadline>,
    pub study_minutes_today: u32,
    /// Most recently enrolled first
    pub recent_courses: Vec<String>,
}
