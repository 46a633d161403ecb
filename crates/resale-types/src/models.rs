use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Available,
    Sold,
    Expired,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Sold => "sold",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "sold" => Ok(Self::Sold),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown ticket status '{}'", other)),
        }
    }
}

/// A live ticket listing.
///
/// The ownership triple decides who may change the row: the seller lists it,
/// the owner currently holds it, and `buyer_id` is set exactly once on sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub owner_id: Uuid,
    pub buyer_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub venue: String,
    pub event_date: NaiveDate,
    pub event_time: Option<NaiveTime>,
    pub price_cents: i64,
    pub price_per_unit_cents: i64,
    pub quantity: u32,
    pub status: TicketStatus,
    pub file_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn is_sold(&self) -> bool {
        self.buyer_id.is_some()
    }
}

/// Copy of a ticket taken by an archival transfer.
///
/// `confirmed_at` is set once the transfer saw the write succeed. Only a
/// confirmed copy that still equals the live row may be used to remove it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedTicket {
    pub id: Uuid,
    pub original_id: Uuid,
    pub seller_id: Uuid,
    pub owner_id: Uuid,
    pub buyer_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub venue: String,
    pub event_date: NaiveDate,
    pub event_time: Option<NaiveTime>,
    pub price_cents: i64,
    pub price_per_unit_cents: i64,
    pub quantity: u32,
    pub status: TicketStatus,
    pub file_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: DateTime<Utc>,
    #[serde(default)]
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl ArchivedTicket {
    /// Copies every field of `ticket` verbatim under a fresh archive id.
    pub fn from_ticket(ticket: &Ticket, archived_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_id: ticket.id,
            seller_id: ticket.seller_id,
            owner_id: ticket.owner_id,
            buyer_id: ticket.buyer_id,
            title: ticket.title.clone(),
            description: ticket.description.clone(),
            category: ticket.category.clone(),
            venue: ticket.venue.clone(),
            event_date: ticket.event_date,
            event_time: ticket.event_time,
            price_cents: ticket.price_cents,
            price_per_unit_cents: ticket.price_per_unit_cents,
            quantity: ticket.quantity,
            status: ticket.status,
            file_url: ticket.file_url.clone(),
            created_at: ticket.created_at,
            updated_at: ticket.updated_at,
            archived_at,
            confirmed_at: None,
        }
    }

    /// Whether this copy still describes `ticket` field for field.
    pub fn matches(&self, ticket: &Ticket) -> bool {
        self.to_ticket() == *ticket
    }

    /// Rebuilds the live record this archive row was taken from.
    pub fn to_ticket(&self) -> Ticket {
        Ticket {
            id: self.original_id,
            seller_id: self.seller_id,
            owner_id: self.owner_id,
            buyer_id: self.buyer_id,
            title: self.title.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            venue: self.venue.clone(),
            event_date: self.event_date,
            event_time: self.event_time,
            price_cents: self.price_cents,
            price_per_unit_cents: self.price_per_unit_cents,
            quantity: self.quantity,
            status: self.status,
            file_url: self.file_url.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Application-level profile backing an authenticated session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsletterSubscriber {
    pub email: String,
    pub locale: String,
    pub subscribed_at: DateTime<Utc>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
}
