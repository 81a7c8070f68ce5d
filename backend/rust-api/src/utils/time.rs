use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;

pub fn chrono_to_bson(dt: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(dt.timestamp_millis())
}

/// Half-open `[start, end)` range covering a calendar day in UTC.
pub fn day_bounds(date: NaiveDate) -> (BsonDateTime, BsonDateTime) {
    let start = date.and_time(NaiveTime::MIN).and_utc();
    let end = start + chrono::Duration::days(1);
    (chrono_to_bson(start), chrono_to_bson(end))
}
