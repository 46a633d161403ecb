use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Ticket;

/// Marketplace events published after a confirmed write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MarketEvent {
    /// A seller listed a new ticket
    TicketListed { ticket: Ticket },

    /// A seller edited an unsold listing
    TicketUpdated { ticket: Ticket },

    /// A buyer purchased a listing
    TicketSold { ticket_id: Uuid, buyer_id: Uuid },

    /// A listing was moved to the archive and removed from the live table
    TicketArchived { ticket_id: Uuid, archive_id: Uuid },
}

impl MarketEvent {
    pub fn ticket_id(&self) -> Uuid {
        match self {
            Self::TicketListed { ticket } | Self::TicketUpdated { ticket } => ticket.id,
            Self::TicketSold { ticket_id, .. } | Self::TicketArchived { ticket_id, .. } => *ticket_id,
        }
    }

    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TicketListed { .. } => "ticket_listed",
            Self::TicketUpdated { .. } => "ticket_updated",
            Self::TicketSold { .. } => "ticket_sold",
            Self::TicketArchived { .. } => "ticket_archived",
        }
    }
}
