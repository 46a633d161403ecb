//! Row types and row mapping. Ids, dates and timestamps are stored as TEXT
//! and parsed back into the resale-types models here.

use std::error::Error as StdError;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use resale_types::models::{ArchivedTicket, NewsletterSubscriber, Role, Ticket, UserProfile};

/// A user row including the password hash. Never leaves the server.
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Created,
    AlreadySubscribed,
    Reactivated,
}

macro_rules! ticket_fields {
    () => {
        "seller_id, owner_id, buyer_id, title, description, category, venue, event_date, \
         event_time, price_cents, price_per_unit_cents, quantity, status, file_url, \
         created_at, updated_at"
    };
}
pub(crate) use ticket_fields;

macro_rules! archive_fields {
    () => {
        concat!("id, original_id, ", ticket_fields!(), ", archived_at, confirmed_at")
    };
}
pub(crate) use archive_fields;

pub(crate) fn timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339()
}

/// RFC 3339, falling back to SQLite's `datetime('now')` format.
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn StdError + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Into<Box<dyn StdError + Send + Sync>>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_error(idx, e))
}

fn parse_opt_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: Into<Box<dyn StdError + Send + Sync>>,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| s.parse::<T>().map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn timestamp_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).map_err(|e| conversion_error(idx, e))
}

fn opt_timestamp_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| parse_timestamp(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

/// Reads `ticket_fields!()` starting at column `start`.
fn ticket_body(row: &Row<'_>, id: Uuid, start: usize) -> rusqlite::Result<Ticket> {
    let quantity: i64 = row.get(start + 11)?;
    Ok(Ticket {
        id,
        seller_id: parse_col(row, start)?,
        owner_id: parse_col(row, start + 1)?,
        buyer_id: parse_opt_col(row, start + 2)?,
        title: row.get(start + 3)?,
        description: row.get(start + 4)?,
        category: row.get(start + 5)?,
        venue: row.get(start + 6)?,
        event_date: parse_col(row, start + 7)?,
        event_time: parse_opt_col(row, start + 8)?,
        price_cents: row.get(start + 9)?,
        price_per_unit_cents: row.get(start + 10)?,
        quantity: u32::try_from(quantity).map_err(|e| conversion_error(start + 11, e))?,
        status: parse_col(row, start + 12)?,
        file_url: row.get(start + 13)?,
        created_at: timestamp_col(row, start + 14)?,
        updated_at: timestamp_col(row, start + 15)?,
    })
}

/// Maps `SELECT id, ticket_fields!()`.
pub(crate) fn ticket_from_row(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    let id = parse_col(row, 0)?;
    ticket_body(row, id, 1)
}

/// Maps `SELECT archive_fields!()`.
pub(crate) fn archived_from_row(row: &Row<'_>) -> rusqlite::Result<ArchivedTicket> {
    let id = parse_col(row, 0)?;
    let original_id = parse_col(row, 1)?;
    let ticket = ticket_body(row, original_id, 2)?;
    let archived_at = timestamp_col(row, 18)?;

    let mut archived = ArchivedTicket::from_ticket(&ticket, archived_at);
    archived.id = id;
    archived.confirmed_at = opt_timestamp_col(row, 19)?;
    Ok(archived)
}

/// Maps `SELECT id, email, display_name, role, created_at, last_seen_at`.
pub(crate) fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        id: parse_col(row, 0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        role: parse_col(row, 3)?,
        created_at: timestamp_col(row, 4)?,
        last_seen_at: opt_timestamp_col(row, 5)?,
    })
}

/// Maps `SELECT email, locale, subscribed_at, unsubscribed_at`.
pub(crate) fn subscriber_from_row(row: &Row<'_>) -> rusqlite::Result<NewsletterSubscriber> {
    Ok(NewsletterSubscriber {
        email: row.get(0)?,
        locale: row.get(1)?,
        subscribed_at: timestamp_col(row, 2)?,
        unsubscribed_at: opt_timestamp_col(row, 3)?,
    })
}

/// Maps `SELECT id, email, display_name, password, role`.
pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: parse_col(row, 0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        password: row.get(3)?,
        role: parse_col(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_and_sqlite_timestamps() {
        let rfc = parse_timestamp("2026-05-01T18:30:00+02:00").unwrap();
        assert_eq!(rfc.to_rfc3339(), "2026-05-01T16:30:00+00:00");

        let sqlite = parse_timestamp("2026-05-01 16:30:00").unwrap();
        assert_eq!(sqlite, rfc);

        assert!(parse_timestamp("yesterday").is_err());
    }
}
