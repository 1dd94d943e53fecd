//! Schedule persistence: abstract store trait and the SQLite backend
//!
//! Everything above this layer talks to `ScheduleStore`; the SQLite
//! implementation is the bundled reference backend. Ids, instants and
//! dates are stored as TEXT (uuid hyphenated, RFC 3339, `YYYY-MM-DD`)
//! and converted at this boundary.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::attendance::{AttendanceRecord, AttendanceStatus};
use crate::db::models::{Band, Member, OccurrenceOverride, Rehearsal};
use crate::recurrence::RecurrenceSpec;
use crate::{Error, Result};

/// Persistence operations the scheduling service depends on.
///
/// Callers must persist through this trait before publishing any event
/// for the mutation; the store never publishes anything itself.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn insert_rehearsal(&self, rehearsal: &Rehearsal) -> Result<()>;
    async fn update_rehearsal(&self, rehearsal: &Rehearsal) -> Result<()>;
    async fn delete_rehearsal(&self, id: Uuid) -> Result<()>;
    async fn rehearsal(&self, id: Uuid) -> Result<Option<Rehearsal>>;
    async fn rehearsals_for_band(&self, band_id: Uuid) -> Result<Vec<Rehearsal>>;

    /// Record an exception date. Idempotent.
    async fn add_cancelled_date(&self, rehearsal_id: Uuid, date: NaiveDate) -> Result<()>;
    /// Remove an exception date. Removing an absent date is a no-op.
    async fn remove_cancelled_date(&self, rehearsal_id: Uuid, date: NaiveDate) -> Result<()>;

    async fn upsert_override(&self, ov: &OccurrenceOverride) -> Result<()>;
    async fn overrides_for(
        &self,
        rehearsal_id: Uuid,
    ) -> Result<BTreeMap<NaiveDate, OccurrenceOverride>>;

    /// Upsert one member's status for one occurrence. Last write wins.
    async fn set_attendance(&self, record: &AttendanceRecord) -> Result<()>;
    async fn attendance_for_occurrence(
        &self,
        rehearsal_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>>;
    async fn attendance_for_rehearsal(
        &self,
        rehearsal_id: Uuid,
    ) -> Result<Vec<AttendanceRecord>>;
}

/// SQLite-backed `ScheduleStore`
#[derive(Clone)]
pub struct SqliteScheduleStore {
    pool: SqlitePool,
}

impl SqliteScheduleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Seed a band row (band management itself lives outside this
    /// service; this exists for bootstrap and tests)
    pub async fn insert_band(&self, band: &Band) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO bands (id, name) VALUES (?, ?)")
            .bind(band.id.to_string())
            .bind(&band.name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Seed a member row (see `insert_band`)
    pub async fn insert_member(&self, member: &Member) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO users (id, name) VALUES (?, ?)")
            .bind(member.id.to_string())
            .bind(&member.name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn cancelled_dates_for(&self, rehearsal_id: Uuid) -> Result<BTreeSet<NaiveDate>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT date FROM rehearsal_cancellations WHERE rehearsal_id = ? ORDER BY date",
        )
        .bind(rehearsal_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|(d,)| parse_date(&d)).collect()
    }

    async fn replace_cancelled_dates(
        &self,
        rehearsal_id: Uuid,
        dates: &BTreeSet<NaiveDate>,
    ) -> Result<()> {
        sqlx::query("DELETE FROM rehearsal_cancellations WHERE rehearsal_id = ?")
            .bind(rehearsal_id.to_string())
            .execute(&self.pool)
            .await?;
        for date in dates {
            sqlx::query(
                "INSERT INTO rehearsal_cancellations (rehearsal_id, date) VALUES (?, ?)",
            )
            .bind(rehearsal_id.to_string())
            .bind(format_date(*date))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

type RehearsalRow = (
    String,         // id
    String,         // title
    Option<String>, // description
    Option<String>, // location
    String,         // start_time
    String,         // end_time
    i64,            // tz_offset_minutes
    String,         // band_id
    String,         // created_by
    Option<String>, // recurrence JSON
    String,         // created_at
    String,         // updated_at
);

const REHEARSAL_COLUMNS: &str = "id, title, description, location, start_time, end_time, \
     tz_offset_minutes, band_id, created_by, recurrence, created_at, updated_at";

fn row_to_rehearsal(row: RehearsalRow, cancelled_dates: BTreeSet<NaiveDate>) -> Result<Rehearsal> {
    let recurrence = row
        .9
        .as_deref()
        .map(|json| {
            serde_json::from_str::<RecurrenceSpec>(json)
                .map_err(|e| Error::Internal(format!("stored recurrence is corrupt: {}", e)))
        })
        .transpose()?;

    Ok(Rehearsal {
        id: parse_uuid(&row.0)?,
        title: row.1,
        description: row.2,
        location: row.3,
        start_time: parse_instant(&row.4)?,
        end_time: parse_instant(&row.5)?,
        tz_offset_minutes: row.6 as i32,
        band_id: parse_uuid(&row.7)?,
        created_by: parse_uuid(&row.8)?,
        recurrence,
        cancelled_dates,
        created_at: parse_instant(&row.10)?,
        updated_at: parse_instant(&row.11)?,
    })
}

fn recurrence_json(rehearsal: &Rehearsal) -> Result<Option<String>> {
    rehearsal
        .recurrence
        .as_ref()
        .map(|spec| {
            serde_json::to_string(spec)
                .map_err(|e| Error::Internal(format!("recurrence serialization: {}", e)))
        })
        .transpose()
}

#[async_trait]
impl ScheduleStore for SqliteScheduleStore {
    async fn insert_rehearsal(&self, rehearsal: &Rehearsal) -> Result<()> {
        rehearsal.validate()?;
        sqlx::query(
            "INSERT INTO rehearsals (id, title, description, location, start_time, end_time, \
             tz_offset_minutes, band_id, created_by, recurrence, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(rehearsal.id.to_string())
        .bind(&rehearsal.title)
        .bind(&rehearsal.description)
        .bind(&rehearsal.location)
        .bind(format_instant(rehearsal.start_time))
        .bind(format_instant(rehearsal.end_time))
        .bind(rehearsal.tz_offset_minutes as i64)
        .bind(rehearsal.band_id.to_string())
        .bind(rehearsal.created_by.to_string())
        .bind(recurrence_json(rehearsal)?)
        .bind(format_instant(rehearsal.created_at))
        .bind(format_instant(rehearsal.updated_at))
        .execute(&self.pool)
        .await?;

        self.replace_cancelled_dates(rehearsal.id, &rehearsal.cancelled_dates)
            .await
    }

    async fn update_rehearsal(&self, rehearsal: &Rehearsal) -> Result<()> {
        rehearsal.validate()?;
        let result = sqlx::query(
            "UPDATE rehearsals SET title = ?, description = ?, location = ?, start_time = ?, \
             end_time = ?, tz_offset_minutes = ?, recurrence = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&rehearsal.title)
        .bind(&rehearsal.description)
        .bind(&rehearsal.location)
        .bind(format_instant(rehearsal.start_time))
        .bind(format_instant(rehearsal.end_time))
        .bind(rehearsal.tz_offset_minutes as i64)
        .bind(recurrence_json(rehearsal)?)
        .bind(format_instant(rehearsal.updated_at))
        .bind(rehearsal.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("rehearsal {}", rehearsal.id)));
        }

        self.replace_cancelled_dates(rehearsal.id, &rehearsal.cancelled_dates)
            .await
    }

    async fn delete_rehearsal(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM rehearsals WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("rehearsal {}", id)));
        }
        Ok(())
    }

    async fn rehearsal(&self, id: Uuid) -> Result<Option<Rehearsal>> {
        let row: Option<RehearsalRow> = sqlx::query_as(&format!(
            "SELECT {} FROM rehearsals WHERE id = ?",
            REHEARSAL_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Ok(None),
            Some(row) => {
                let cancelled = self.cancelled_dates_for(id).await?;
                Ok(Some(row_to_rehearsal(row, cancelled)?))
            }
        }
    }

    async fn rehearsals_for_band(&self, band_id: Uuid) -> Result<Vec<Rehearsal>> {
        let rows: Vec<RehearsalRow> = sqlx::query_as(&format!(
            "SELECT {} FROM rehearsals WHERE band_id = ? ORDER BY start_time",
            REHEARSAL_COLUMNS
        ))
        .bind(band_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut rehearsals = Vec::with_capacity(rows.len());
        for row in rows {
            let id = parse_uuid(&row.0)?;
            let cancelled = self.cancelled_dates_for(id).await?;
            rehearsals.push(row_to_rehearsal(row, cancelled)?);
        }
        Ok(rehearsals)
    }

    async fn add_cancelled_date(&self, rehearsal_id: Uuid, date: NaiveDate) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO rehearsal_cancellations (rehearsal_id, date) VALUES (?, ?)",
        )
        .bind(rehearsal_id.to_string())
        .bind(format_date(date))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_cancelled_date(&self, rehearsal_id: Uuid, date: NaiveDate) -> Result<()> {
        sqlx::query("DELETE FROM rehearsal_cancellations WHERE rehearsal_id = ? AND date = ?")
            .bind(rehearsal_id.to_string())
            .bind(format_date(date))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_override(&self, ov: &OccurrenceOverride) -> Result<()> {
        ov.validate()?;
        sqlx::query(
            "INSERT INTO rehearsal_overrides (rehearsal_id, date, start_time, end_time, location) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(rehearsal_id, date) DO UPDATE SET \
             start_time = excluded.start_time, end_time = excluded.end_time, \
             location = excluded.location",
        )
        .bind(ov.rehearsal_id.to_string())
        .bind(format_date(ov.date))
        .bind(ov.start_time.map(format_instant))
        .bind(ov.end_time.map(format_instant))
        .bind(&ov.location)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn overrides_for(
        &self,
        rehearsal_id: Uuid,
    ) -> Result<BTreeMap<NaiveDate, OccurrenceOverride>> {
        let rows: Vec<(String, Option<String>, Option<String>, Option<String>)> =
            sqlx::query_as(
                "SELECT date, start_time, end_time, location FROM rehearsal_overrides \
                 WHERE rehearsal_id = ?",
            )
            .bind(rehearsal_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        let mut overrides = BTreeMap::new();
        for (date, start, end, location) in rows {
            let date = parse_date(&date)?;
            overrides.insert(
                date,
                OccurrenceOverride {
                    rehearsal_id,
                    date,
                    start_time: start.as_deref().map(parse_instant).transpose()?,
                    end_time: end.as_deref().map(parse_instant).transpose()?,
                    location,
                },
            );
        }
        Ok(overrides)
    }

    async fn set_attendance(&self, record: &AttendanceRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO attendance (rehearsal_id, date, member_id, status, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(rehearsal_id, date, member_id) DO UPDATE SET \
             status = excluded.status, updated_at = excluded.updated_at",
        )
        .bind(record.rehearsal_id.to_string())
        .bind(format_date(record.date))
        .bind(record.member_id.to_string())
        .bind(record.status.as_str())
        .bind(format_instant(record.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn attendance_for_occurrence(
        &self,
        rehearsal_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT member_id, status, updated_at FROM attendance \
             WHERE rehearsal_id = ? AND date = ? ORDER BY member_id",
        )
        .bind(rehearsal_id.to_string())
        .bind(format_date(date))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(member_id, status, updated_at)| {
                Ok(AttendanceRecord {
                    rehearsal_id,
                    date,
                    member_id: parse_uuid(&member_id)?,
                    status: AttendanceStatus::parse(&status)?,
                    updated_at: parse_instant(&updated_at)?,
                })
            })
            .collect()
    }

    async fn attendance_for_rehearsal(
        &self,
        rehearsal_id: Uuid,
    ) -> Result<Vec<AttendanceRecord>> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT date, member_id, status, updated_at FROM attendance \
             WHERE rehearsal_id = ? ORDER BY date, member_id",
        )
        .bind(rehearsal_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(date, member_id, status, updated_at)| {
                Ok(AttendanceRecord {
                    rehearsal_id,
                    date: parse_date(&date)?,
                    member_id: parse_uuid(&member_id)?,
                    status: AttendanceStatus::parse(&status)?,
                    updated_at: parse_instant(&updated_at)?,
                })
            })
            .collect()
    }
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Internal(format!("stored id '{}' is corrupt: {}", s, e)))
}

fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339()
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("stored instant '{}' is corrupt: {}", s, e)))
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| Error::Internal(format!("stored date '{}' is corrupt: {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::create_schema;
    use chrono::{Duration, TimeZone};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> SqliteScheduleStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();
        SqliteScheduleStore::new(pool)
    }

    async fn seeded_store() -> (SqliteScheduleStore, Band, Member) {
        let store = memory_store().await;
        let band = Band {
            id: Uuid::new_v4(),
            name: "The Offbeats".into(),
        };
        let member = Member {
            id: Uuid::new_v4(),
            name: "Sam".into(),
        };
        store.insert_band(&band).await.unwrap();
        store.insert_member(&member).await.unwrap();
        (store, band, member)
    }

    fn sample_rehearsal(band_id: Uuid, created_by: Uuid) -> Rehearsal {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap();
        Rehearsal {
            id: Uuid::new_v4(),
            title: "Monday practice".into(),
            description: Some("Full set run-through".into()),
            location: Some("Studio A".into()),
            start_time: start,
            end_time: start + Duration::hours(2),
            tz_offset_minutes: 0,
            band_id,
            created_by,
            recurrence: Some(
                serde_json::from_str(r#"{"frequency":"weekly","interval":1,"weekdays":[1]}"#)
                    .unwrap(),
            ),
            cancelled_dates: BTreeSet::new(),
            created_at: start,
            updated_at: start,
        }
    }

    #[tokio::test]
    async fn test_rehearsal_round_trip() {
        let (store, band, member) = seeded_store().await;
        let rehearsal = sample_rehearsal(band.id, member.id);
        store.insert_rehearsal(&rehearsal).await.unwrap();

        let loaded = store.rehearsal(rehearsal.id).await.unwrap().unwrap();
        assert_eq!(loaded, rehearsal);
    }

    #[tokio::test]
    async fn test_missing_rehearsal_is_none() {
        let (store, ..) = seeded_store().await;
        assert!(store.rehearsal(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_rehearsal_is_not_found() {
        let (store, band, member) = seeded_store().await;
        let rehearsal = sample_rehearsal(band.id, member.id);
        let err = store.update_rehearsal(&rehearsal).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cancellations_persist_and_remove() {
        let (store, band, member) = seeded_store().await;
        let rehearsal = sample_rehearsal(band.id, member.id);
        store.insert_rehearsal(&rehearsal).await.unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        store.add_cancelled_date(rehearsal.id, date).await.unwrap();
        // idempotent
        store.add_cancelled_date(rehearsal.id, date).await.unwrap();

        let loaded = store.rehearsal(rehearsal.id).await.unwrap().unwrap();
        assert_eq!(loaded.cancelled_dates, BTreeSet::from([date]));

        store
            .remove_cancelled_date(rehearsal.id, date)
            .await
            .unwrap();
        let loaded = store.rehearsal(rehearsal.id).await.unwrap().unwrap();
        assert!(loaded.cancelled_dates.is_empty());
    }

    #[tokio::test]
    async fn test_override_upsert_round_trip() {
        let (store, band, member) = seeded_store().await;
        let rehearsal = sample_rehearsal(band.id, member.id);
        store.insert_rehearsal(&rehearsal).await.unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let mut ov = OccurrenceOverride {
            rehearsal_id: rehearsal.id,
            date,
            start_time: Some(Utc.with_ymd_and_hms(2024, 1, 8, 20, 0, 0).unwrap()),
            end_time: None,
            location: None,
        };
        store.upsert_override(&ov).await.unwrap();

        ov.location = Some("Basement".into());
        store.upsert_override(&ov).await.unwrap();

        let overrides = store.overrides_for(rehearsal.id).await.unwrap();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[&date], ov);
    }

    #[tokio::test]
    async fn test_attendance_last_write_wins() {
        let (store, band, member) = seeded_store().await;
        let rehearsal = sample_rehearsal(band.id, member.id);
        store.insert_rehearsal(&rehearsal).await.unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let mut record = AttendanceRecord {
            rehearsal_id: rehearsal.id,
            date,
            member_id: member.id,
            status: AttendanceStatus::Attending,
            updated_at: Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap(),
        };
        store.set_attendance(&record).await.unwrap();

        record.status = AttendanceStatus::Declined;
        record.updated_at = Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap();
        store.set_attendance(&record).await.unwrap();

        let records = store
            .attendance_for_occurrence(rehearsal.id, date)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AttendanceStatus::Declined);
    }
}
