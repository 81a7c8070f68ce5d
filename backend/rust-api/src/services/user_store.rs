use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Bson, Document},
    Database,
};

use crate::{
    metrics::track_db_operation,
    models::{
        progress::{EnrollmentRecord, TaskRecord, TaskStatus},
        Deadline, ProgressSnapshot, User,
    },
    utils::time::day_bounds,
};

const UPCOMING_DEADLINES_LIMIT: i64 = 5;
const RECENT_COURSES_LIMIT: i64 = 3;

/// Read access to accounts and progress aggregates.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Every user whose active flag is set, ordered by username.
    async fn active_users(&self) -> Result<Vec<User>>;

    async fn first_active_user(&self) -> Result<Option<User>>;

    /// Progress aggregate for `user` as of `today`.
    async fn progress_snapshot(&self, user: &User, today: NaiveDate) -> Result<ProgressSnapshot>;
}

pub struct MongoUserStore {
    mongo: Database,
}

impl MongoUserStore {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    async fn enrollment_totals(&self, user_id: ObjectId) -> Result<(u32, u32, f64)> {
        let pipeline = vec![
            doc! { "$match": { "user_id": user_id } },
            doc! {
                "$group": {
                    "_id": Bson::Null,
                    "total": { "$sum": 1 },
                    "completed": {
                        "$sum": {
                            "$cond": [
                                { "$gt": [ { "$ifNull": ["$completed_at", Bson::Null] }, Bson::Null ] },
                                1,
                                0
                            ]
                        }
                    },
                    "avg_progress": { "$avg": "$progress" }
                }
            },
        ];

        let mut cursor = self
            .mongo
            .collection::<Document>("enrollments")
            .aggregate(pipeline)
            .await
            .context("Failed to aggregate enrollments")?;

        match cursor.try_next().await.context("Failed to read enrollment totals")? {
            Some(totals) => Ok((
                read_count(&totals, "total"),
                read_count(&totals, "completed"),
                read_number(&totals, "avg_progress"),
            )),
            None => Ok((0, 0, 0.0)),
        }
    }

    async fn pending_assignments(&self, user_id: ObjectId) -> Result<u32> {
        let pending = self
            .mongo
            .collection::<TaskRecord>("tasks")
            .count_documents(doc! {
                "student_id": user_id,
                "status": { "$ne": completed_status() },
            })
            .await
            .context("Failed to count pending tasks")?;

        Ok(u32::try_from(pending).unwrap_or(u32::MAX))
    }

    async fn upcoming_deadlines(&self, user_id: ObjectId, today: NaiveDate) -> Result<Vec<Deadline>> {
        let (start_of_today, _) = day_bounds(today);

        let mut cursor = self
            .mongo
            .collection::<TaskRecord>("tasks")
            .find(doc! {
                "student_id": user_id,
                "status": { "$ne": completed_status() },
                "deadline": { "$gte": start_of_today },
            })
            .sort(doc! { "deadline": 1 })
            .limit(UPCOMING_DEADLINES_LIMIT)
            .await
            .context("Failed to query upcoming tasks")?;

        let mut deadlines = Vec::new();
        while let Some(task) = cursor.try_next().await.context("Failed to read task")? {
            if let Some(due) = task.deadline.map(|deadline| deadline.date_naive()) {
                deadlines.push(Deadline {
                    title: task.title,
                    due,
                });
            }
        }

        Ok(deadlines)
    }

    async fn study_minutes_on(&self, user_id: ObjectId, day: NaiveDate) -> Result<u32> {
        let (start, end) = day_bounds(day);
        let pipeline = vec![
            doc! {
                "$match": {
                    "student_id": user_id,
                    "session_date": { "$gte": start, "$lt": end },
                }
            },
            doc! {
                "$group": {
                    "_id": Bson::Null,
                    "minutes": { "$sum": "$duration_minutes" }
                }
            },
        ];

        let mut cursor = self
            .mongo
            .collection::<Document>("study_sessions")
            .aggregate(pipeline)
            .await
            .context("Failed to aggregate study sessions")?;

        Ok(cursor
            .try_next()
            .await
            .context("Failed to read study minutes")?
            .map(|totals| read_count(&totals, "minutes"))
            .unwrap_or(0))
    }

    async fn recent_courses(&self, user_id: ObjectId) -> Result<Vec<String>> {
        let mut enrollments = self
            .mongo
            .collection::<EnrollmentRecord>("enrollments")
            .find(doc! { "user_id": user_id })
            .sort(doc! { "enrolled_at": -1 })
            .limit(RECENT_COURSES_LIMIT)
            .await
            .context("Failed to query recent enrollments")?;

        let mut course_ids = Vec::new();
        while let Some(enrollment) = enrollments
            .try_next()
            .await
            .context("Failed to read enrollment")?
        {
            course_ids.push(enrollment.course_id);
        }

        if course_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Bson> = course_ids.iter().cloned().map(Bson::ObjectId).collect();
        let mut courses = self
            .mongo
            .collection::<Document>("courses")
            .find(doc! { "_id": { "$in": ids } })
            .await
            .context("Failed to query courses")?;

        let mut titles = Vec::new();
        while let Some(course) = courses.try_next().await.context("Failed to read course")? {
            if let (Ok(id), Ok(title)) = (course.get_object_id("_id"), course.get_str("title")) {
                titles.push((id, title.to_string()));
            }
        }

        // keep enrollment recency order
        Ok(course_ids
            .iter()
            .filter_map(|id| {
                titles
                    .iter()
                    .find(|(course_id, _)| course_id == id)
                    .map(|(_, title)| title.clone())
            })
            .collect())
    }
}

#[async_trait]
impl UserStore for MongoUserStore {
    async fn active_users(&self) -> Result<Vec<User>> {
        track_db_operation("find", "users", async {
            let mut cursor = self
                .mongo
                .collection::<User>("users")
                .find(doc! { "is_active": true })
                .sort(doc! { "username": 1 })
                .await
                .context("Failed to query active users")?;

            let mut users = Vec::new();
            while let Some(user) = cursor.try_next().await.context("Failed to read user")? {
                users.push(user);
            }
            Ok(users)
        })
        .await
    }

    async fn first_active_user(&self) -> Result<Option<User>> {
        track_db_operation("find_one", "users", async {
            self.mongo
                .collection::<User>("users")
                .find_one(doc! { "is_active": true })
                .sort(doc! { "username": 1 })
                .await
                .context("Failed to query first active user")
        })
        .await
    }

    async fn progress_snapshot(&self, user: &User, today: NaiveDate) -> Result<ProgressSnapshot> {
        let Some(user_id) = user.id else {
            return Ok(ProgressSnapshot::default());
        };

        track_db_operation("aggregate", "progress", async {
            let (total_courses, completed_courses, avg_progress) =
                self.enrollment_totals(user_id).await?;

            Ok(ProgressSnapshot {
                completed_courses,
                total_courses,
                progress_percentage: round_one_decimal(avg_progress),
                pending_assignments: self.pending_assignments(user_id).await?,
                upcoming_deadlines: self.upcoming_deadlines(user_id, today).await?,
                study_minutes_today: self.study_minutes_on(user_id, today).await?,
                recent_courses: self.recent_courses(user_id).await?,
            })
        })
        .await
    }
}

fn completed_status() -> Bson {
    mongodb::bson::to_bson(&TaskStatus::Completed)
        .unwrap_or_else(|_| Bson::String("Completed".to_string()))
}

fn read_count(doc: &Document, key: &str) -> u32 {
    doc.get_i64(key)
        .or_else(|_| doc.get_i32(key).map(i64::from))
        .ok()
        .and_then(|value| u32::try_from(value).ok())
        .unwrap_or(0)
}

fn read_number(doc: &Document, key: &str) -> f64 {
    doc.get_f64(key)
        .or_else(|_| doc.get_i64(key).map(|v| v as f64))
        .or_else(|_| doc.get_i32(key).map(f64::from))
        .unwrap_or(0.0)
}

pub(crate) fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_counts_of_any_integer_width() {
        let totals = doc! { "total": 3i32, "completed": 2i64, "avg_progress": 41.25 };
        assert_eq!(read_count(&totals, "total"), 3);
        assert_eq!(read_count(&totals, "completed"), 2);
        assert_eq!(read_count(&totals, "missing"), 0);
        assert_eq!(read_number(&totals, "avg_progress"), 41.25);
        assert_eq!(read_number(&doc! { "avg_progress": Bson::Null }, "avg_progress"), 0.0);
    }

    #[test]
    fn negative_counts_are_clamped_to_zero() {
        assert_eq!(read_count(&doc! { "minutes": -5i32 }, "minutes"), 0);
    }

    #[test]
    fn completed_status_serializes_to_stored_label() {
        assert_eq!(completed_status(), Bson::String("Completed".to_string()));
    }

    #[test]
    fn rounds_percentages() {
        assert_eq!(round_one_decimal(37.54), 37.5);
        assert_eq!(round_one_decimal(0.0), 0.0);
    }
}
