use crate::Database;
use crate::models::{
    SubscribeOutcome, UserRow, archive_fields, archived_from_row, profile_from_row,
    subscriber_from_row, ticket_fields, ticket_from_row, timestamp, user_from_row,
};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use resale_types::api::AdminStats;
use resale_types::models::{
    ArchivedTicket, NewsletterSubscriber, Role, Ticket, TicketStatus, UserProfile,
};

const PROFILE_COLUMNS: &str = "id, email, display_name, role, created_at, last_seen_at";

impl Database {
    // -- Users --

    /// Returns false if the email is already taken.
    pub fn create_user(
        &self,
        id: Uuid,
        email: &str,
        display_name: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, email, display_name, password, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(email) DO NOTHING",
                params![
                    id.to_string(),
                    email,
                    display_name,
                    password_hash,
                    role.as_str(),
                    timestamp(&Utc::now()),
                ],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, email, display_name, password, role FROM users WHERE email = ?1",
                    [email],
                    user_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_profile(&self, id: Uuid) -> Result<Option<UserProfile>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users WHERE id = ?1", PROFILE_COLUMNS);
            let row = conn
                .query_row(&sql, [id.to_string()], profile_from_row)
                .optional()?;
            Ok(row)
        })
    }

    /// Records that the user bootstrapped a session. Returns false if the
    /// profile no longer exists.
    pub fn touch_user(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET last_seen_at = ?1 WHERE id = ?2",
                params![timestamp(&now), id.to_string()],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn list_profiles(&self) -> Result<Vec<UserProfile>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users ORDER BY created_at", PROFILE_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], profile_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Tickets --

    pub fn insert_ticket(&self, ticket: &Ticket) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                concat!(
                    "INSERT INTO tickets (id, ",
                    ticket_fields!(),
                    ") VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
                ),
                params![
                    ticket.id.to_string(),
                    ticket.seller_id.to_string(),
                    ticket.owner_id.to_string(),
                    ticket.buyer_id.map(|id| id.to_string()),
                    ticket.title,
                    ticket.description,
                    ticket.category,
                    ticket.venue,
                    ticket.event_date.to_string(),
                    ticket.event_time.map(|t| t.to_string()),
                    ticket.price_cents,
                    ticket.price_per_unit_cents,
                    ticket.quantity as i64,
                    ticket.status.as_str(),
                    ticket.file_url,
                    timestamp(&ticket.created_at),
                    timestamp(&ticket.updated_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_ticket(&self, id: Uuid) -> Result<Option<Ticket>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    concat!("SELECT id, ", ticket_fields!(), " FROM tickets WHERE id = ?1"),
                    [id.to_string()],
                    ticket_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn list_tickets_by_status(&self, status: TicketStatus) -> Result<Vec<Ticket>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(concat!(
                "SELECT id, ",
                ticket_fields!(),
                " FROM tickets WHERE status = ?1 ORDER BY event_date, created_at"
            ))?;
            let rows = stmt
                .query_map([status.as_str()], ticket_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_all_tickets(&self) -> Result<Vec<Ticket>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(concat!(
                "SELECT id, ",
                ticket_fields!(),
                " FROM tickets ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map([], ticket_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Tickets the user sells, holds or bought.
    pub fn list_tickets_for_user(&self, user_id: Uuid) -> Result<Vec<Ticket>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(concat!(
                "SELECT id, ",
                ticket_fields!(),
                " FROM tickets WHERE seller_id = ?1 OR owner_id = ?1 OR buyer_id = ?1
                  ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map([user_id.to_string()], ticket_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Writes the editable fields of `ticket` back, but only while the row is
    /// still unsold and held by its seller `acting_user`. Returns rows affected.
    pub fn update_unsold_ticket(&self, ticket: &Ticket, acting_user: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE tickets SET
                    title = ?1, description = ?2, category = ?3, venue = ?4,
                    event_date = ?5, event_time = ?6, price_cents = ?7,
                    price_per_unit_cents = ?8, quantity = ?9, file_url = ?10,
                    updated_at = ?11
                 WHERE id = ?12 AND seller_id = ?13 AND owner_id = ?13 AND buyer_id IS NULL",
                params![
                    ticket.title,
                    ticket.description,
                    ticket.category,
                    ticket.venue,
                    ticket.event_date.to_string(),
                    ticket.event_time.map(|t| t.to_string()),
                    ticket.price_cents,
                    ticket.price_per_unit_cents,
                    ticket.quantity as i64,
                    ticket.file_url,
                    timestamp(&ticket.updated_at),
                    ticket.id.to_string(),
                    acting_user.to_string(),
                ],
            )?;
            Ok(changed)
        })
    }

    /// Assigns `buyer_id` to an available ticket the buyer is not selling.
    /// Ownership moves to the buyer. Returns rows affected.
    pub fn purchase_ticket(&self, id: Uuid, buyer_id: Uuid, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE tickets SET buyer_id = ?1, owner_id = ?1, status = 'sold', updated_at = ?2
                 WHERE id = ?3 AND buyer_id IS NULL AND status = 'available' AND seller_id != ?1",
                params![buyer_id.to_string(), timestamp(&now), id.to_string()],
            )?;
            Ok(changed)
        })
    }

    /// Conditional delete: the row must still be unsold, both sold and held by
    /// `acting_user`, and unchanged since `updated_at`. Returns rows affected.
    pub fn delete_unsold_ticket(
        &self,
        id: Uuid,
        acting_user: Uuid,
        updated_at: DateTime<Utc>,
    ) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM tickets
                 WHERE id = ?1 AND seller_id = ?2 AND owner_id = ?2 AND buyer_id IS NULL
                   AND updated_at = ?3",
                params![id.to_string(), acting_user.to_string(), timestamp(&updated_at)],
            )?;
            Ok(changed)
        })
    }

    /// Marks unsold listings whose event date lies before `today` as expired.
    pub fn expire_tickets_before(&self, today: NaiveDate, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE tickets SET status = 'expired', updated_at = ?1
                 WHERE status = 'available' AND buyer_id IS NULL AND event_date < ?2",
                params![timestamp(&now), today.to_string()],
            )?;
            Ok(changed)
        })
    }

    // -- Archive --

    pub fn insert_archived(&self, archived: &ArchivedTicket) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                concat!(
                    "INSERT INTO tickets_archive (",
                    archive_fields!(),
                    ") VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"
                ),
                params![
                    archived.id.to_string(),
                    archived.original_id.to_string(),
                    archived.seller_id.to_string(),
                    archived.owner_id.to_string(),
                    archived.buyer_id.map(|id| id.to_string()),
                    archived.title,
                    archived.description,
                    archived.category,
                    archived.venue,
                    archived.event_date.to_string(),
                    archived.event_time.map(|t| t.to_string()),
                    archived.price_cents,
                    archived.price_per_unit_cents,
                    archived.quantity as i64,
                    archived.status.as_str(),
                    archived.file_url,
                    timestamp(&archived.created_at),
                    timestamp(&archived.updated_at),
                    timestamp(&archived.archived_at),
                    archived.confirmed_at.as_ref().map(timestamp),
                ],
            )?;
            Ok(())
        })
    }

    /// The open (not abandoned) copy of `original_id`, if any.
    pub fn get_archived_by_original(&self, original_id: Uuid) -> Result<Option<ArchivedTicket>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    concat!(
                        "SELECT ",
                        archive_fields!(),
                        " FROM tickets_archive WHERE original_id = ?1 AND abandoned_at IS NULL"
                    ),
                    [original_id.to_string()],
                    archived_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Records that the transfer saw its archive write succeed. Returns false
    /// if the copy was abandoned in the meantime.
    pub fn confirm_archived(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE tickets_archive SET confirmed_at = COALESCE(confirmed_at, ?1)
                 WHERE id = ?2 AND abandoned_at IS NULL",
                params![timestamp(&now), id.to_string()],
            )?;
            Ok(changed == 1)
        })
    }

    /// Retires a copy that no longer describes its live ticket. The row is
    /// kept but never used to remove the ticket.
    pub fn abandon_archived(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE tickets_archive SET abandoned_at = ?1 WHERE id = ?2 AND abandoned_at IS NULL",
                params![timestamp(&now), id.to_string()],
            )?;
            Ok(changed == 1)
        })
    }

    /// Confirmed, open copies, newest first.
    pub fn list_archived(&self) -> Result<Vec<ArchivedTicket>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(concat!(
                "SELECT ",
                archive_fields!(),
                " FROM tickets_archive
                  WHERE confirmed_at IS NOT NULL AND abandoned_at IS NULL
                  ORDER BY archived_at DESC"
            ))?;
            let rows = stmt
                .query_map([], archived_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Confirmed, open copies whose live ticket still exists: transfers that
    /// stopped between archive and delete.
    pub fn list_unreconciled(&self) -> Result<Vec<ArchivedTicket>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT a.id, a.original_id, a.seller_id, a.owner_id, a.buyer_id, a.title,
                        a.description, a.category, a.venue, a.event_date, a.event_time,
                        a.price_cents, a.price_per_unit_cents, a.quantity, a.status,
                        a.file_url, a.created_at, a.updated_at, a.archived_at, a.confirmed_at
                 FROM tickets_archive a
                 JOIN tickets t ON t.id = a.original_id
                 WHERE a.confirmed_at IS NOT NULL AND a.abandoned_at IS NULL
                 ORDER BY a.archived_at",
            )?;
            let rows = stmt
                .query_map([], archived_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Newsletter --

    pub fn subscribe(&self, email: &str, locale: &str, now: DateTime<Utc>) -> Result<SubscribeOutcome> {
        self.with_conn(|conn| {
            let existing: Option<Option<String>> = conn
                .query_row(
                    "SELECT unsubscribed_at FROM newsletter_subscribers WHERE email = ?1",
                    [email],
                    |row| row.get(0),
                )
                .optional()?;

            match existing {
                None => {
                    conn.execute(
                        "INSERT INTO newsletter_subscribers (email, locale, subscribed_at)
                         VALUES (?1, ?2, ?3)",
                        params![email, locale, timestamp(&now)],
                    )?;
                    Ok(SubscribeOutcome::Created)
                }
                Some(None) => Ok(SubscribeOutcome::AlreadySubscribed),
                Some(Some(_)) => {
                    conn.execute(
                        "UPDATE newsletter_subscribers
                         SET locale = ?1, subscribed_at = ?2, unsubscribed_at = NULL
                         WHERE email = ?3",
                        params![locale, timestamp(&now), email],
                    )?;
                    Ok(SubscribeOutcome::Reactivated)
                }
            }
        })
    }

    /// Returns false if the address was never subscribed.
    pub fn unsubscribe(&self, email: &str, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let known: Option<String> = conn
                .query_row(
                    "SELECT email FROM newsletter_subscribers WHERE email = ?1",
                    [email],
                    |row| row.get(0),
                )
                .optional()?;
            if known.is_none() {
                return Ok(false);
            }

            conn.execute(
                "UPDATE newsletter_subscribers SET unsubscribed_at = COALESCE(unsubscribed_at, ?1)
                 WHERE email = ?2",
                params![timestamp(&now), email],
            )?;
            Ok(true)
        })
    }

    pub fn list_subscribers(&self) -> Result<Vec<NewsletterSubscriber>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT email, locale, subscribed_at, unsubscribed_at
                 FROM newsletter_subscribers ORDER BY subscribed_at DESC",
            )?;
            let rows = stmt
                .query_map([], subscriber_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Stats --

    pub fn stats(&self) -> Result<AdminStats> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> rusqlite::Result<i64> { conn.query_row(sql, [], |r| r.get(0)) };
            Ok(AdminStats {
                users: count("SELECT COUNT(*) FROM users")?,
                available: count("SELECT COUNT(*) FROM tickets WHERE status = 'available'")?,
                sold: count("SELECT COUNT(*) FROM tickets WHERE status = 'sold'")?,
                expired: count("SELECT COUNT(*) FROM tickets WHERE status = 'expired'")?,
                archived: count(
                    "SELECT COUNT(*) FROM tickets_archive
                     WHERE confirmed_at IS NOT NULL AND abandoned_at IS NULL",
                )?,
                subscribers: count(
                    "SELECT COUNT(*) FROM newsletter_subscribers WHERE unsubscribed_at IS NULL",
                )?,
            })
        })
    }
}
