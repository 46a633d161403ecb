use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::models::{Role, Ticket};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the function invocation
/// endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub exp: usize,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub display_name: String,
    pub role: Role,
    pub token: String,
}

// -- Tickets --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewTicket {
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub venue: String,
    pub event_date: NaiveDate,
    pub event_time: Option<NaiveTime>,
    pub price_cents: i64,
    /// Derived from `price_cents / quantity` when omitted.
    pub price_per_unit_cents: Option<i64>,
    pub quantity: u32,
    pub file_url: Option<String>,
}

/// Partial update of a listing. Absent fields are left untouched; `null`
/// clears the optional ones.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TicketPatch {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    pub category: Option<String>,
    pub venue: Option<String>,
    pub event_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "present")]
    pub event_time: Option<Option<NaiveTime>>,
    pub price_cents: Option<i64>,
    pub price_per_unit_cents: Option<i64>,
    pub quantity: Option<u32>,
    #[serde(default, deserialize_with = "present")]
    pub file_url: Option<Option<String>>,
}

/// Tells a field sent as `null` apart from one that was left out.
fn present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl TicketPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.venue.is_none()
            && self.event_date.is_none()
            && self.event_time.is_none()
            && self.price_cents.is_none()
            && self.price_per_unit_cents.is_none()
            && self.quantity.is_none()
            && self.file_url.is_none()
    }

    /// Applies the patch to `ticket` in place.
    pub fn apply_to(&self, ticket: &mut Ticket) {
        if let Some(v) = &self.title {
            ticket.title = v.clone();
        }
        if let Some(v) = &self.description {
            ticket.description = v.clone();
        }
        if let Some(v) = &self.category {
            ticket.category = v.clone();
        }
        if let Some(v) = &self.venue {
            ticket.venue = v.clone();
        }
        if let Some(v) = self.event_date {
            ticket.event_date = v;
        }
        if let Some(v) = self.event_time {
            ticket.event_time = v;
        }
        if let Some(v) = self.price_cents {
            ticket.price_cents = v;
        }
        if let Some(v) = self.price_per_unit_cents {
            ticket.price_per_unit_cents = v;
        }
        if let Some(v) = self.quantity {
            ticket.quantity = v;
        }
        if let Some(v) = &self.file_url {
            ticket.file_url = v.clone();
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TicketPage {
    pub items: Vec<Ticket>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
}

// -- Function invocation --

/// Body of `POST /functions/ticket-actions`, tagged by `action`.
#[derive(Debug, Deserialize)]
#[serde(
    tag = "action",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum TicketAction {
    SoftDeleteTicket { ticket_id: Uuid },
    CreateTicket { ticket: NewTicket },
    UpdateTicket { ticket_id: Uuid, patch: TicketPatch },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<Ticket>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// -- Newsletter --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscribeRequest {
    pub email: String,
    pub locale: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnsubscribeRequest {
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubscribeResponse {
    pub email: String,
    pub subscribed: bool,
}

// -- Admin --

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AdminStats {
    pub users: i64,
    pub available: i64,
    pub sold: i64,
    pub expired: i64,
    pub archived: i64,
    pub subscribers: i64,
}

/// Outcome of one maintenance pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    /// Partial transfers whose live row was removed.
    pub reconciled: usize,
    /// Copies abandoned because their live ticket was sold or edited.
    pub stale: usize,
    /// Retries that errored and will be attempted again next pass.
    pub failed: usize,
    pub expired: usize,
}
