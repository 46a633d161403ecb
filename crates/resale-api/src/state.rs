use std::sync::Arc;
use std::time::Duration;

use resale_db::Database;

use crate::archival::ArchivalTransfer;
use crate::events::EventBus;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    /// Lower-cased addresses that receive the admin role on registration.
    pub admin_emails: Vec<String>,
    /// Upper bound for any single backend call.
    pub backend_timeout: Duration,
    pub events: EventBus,
}

impl AppStateInner {
    pub fn new(db: Database, jwt_secret: impl Into<String>) -> Self {
        Self {
            db: Arc::new(db),
            jwt_secret: jwt_secret.into(),
            token_ttl_hours: 24 * 30,
            admin_emails: Vec::new(),
            backend_timeout: Duration::from_secs(5),
            events: EventBus::new(),
        }
    }

    pub fn archival(&self) -> ArchivalTransfer<Database> {
        ArchivalTransfer::new(self.db.clone(), self.backend_timeout)
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails.iter().any(|e| e == email)
    }
}
