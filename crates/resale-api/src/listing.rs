//! Search, filtering, sorting and paging of listings. Runs over rows that were
//! already fetched; no query building.

use serde::Deserialize;

use resale_types::api::TicketPage;
use resale_types::models::Ticket;

const DEFAULT_PER_PAGE: usize = 20;
const MAX_PER_PAGE: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Newest,
    PriceAsc,
    PriceDesc,
    #[default]
    EventDate,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    #[serde(default)]
    pub sort: SortOrder,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl ListingQuery {
    fn matches(&self, ticket: &Ticket, needle: Option<&str>) -> bool {
        if let Some(needle) = needle {
            let hit = ticket.title.to_lowercase().contains(needle)
                || ticket.venue.to_lowercase().contains(needle)
                || ticket
                    .description
                    .as_deref()
                    .is_some_and(|d| d.to_lowercase().contains(needle));
            if !hit {
                return false;
            }
        }
        if let Some(category) = self.category.as_deref().filter(|c| !c.is_empty()) {
            if !ticket.category.eq_ignore_ascii_case(category) {
                return false;
            }
        }
        if self.min_price.is_some_and(|min| ticket.price_cents < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| ticket.price_cents > max) {
            return false;
        }
        true
    }

    pub fn apply(&self, tickets: Vec<Ticket>) -> TicketPage {
        let needle = self
            .q
            .as_deref()
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty());

        let mut items: Vec<Ticket> = tickets
            .into_iter()
            .filter(|t| self.matches(t, needle.as_deref()))
            .collect();

        match self.sort {
            SortOrder::Newest => items.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            SortOrder::PriceAsc => items.sort_by_key(|t| t.price_cents),
            SortOrder::PriceDesc => items.sort_by(|a, b| b.price_cents.cmp(&a.price_cents)),
            SortOrder::EventDate => items.sort_by_key(|t| (t.event_date, t.event_time)),
        }

        let per_page = self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
        let page = self.page.unwrap_or(1).max(1);
        let total = items.len();
        let total_pages = total.div_ceil(per_page);

        let items = items
            .into_iter()
            .skip((page - 1).saturating_mul(per_page))
            .take(per_page)
            .collect();

        TicketPage {
            items,
            total,
            page,
            per_page,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archival::tests::ticket;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn catalogue() -> Vec<Ticket> {
        let seller = Uuid::new_v4();
        let mut out = Vec::new();
        for (i, (title, venue, category, price, day)) in [
            ("Opera Gala", "Staatsoper", "classical", 9_000, 3),
            ("Rock am See", "Seepark", "festival", 4_500, 1),
            ("Jazz Brunch", "Blue Note", "concert", 2_000, 2),
            ("Symphony No. 9", "Philharmonie", "classical", 6_500, 5),
        ]
        .into_iter()
        .enumerate()
        {
            let mut t = ticket(seller, seller, None);
            t.title = title.into();
            t.venue = venue.into();
            t.category = category.into();
            t.price_cents = price;
            t.event_date = NaiveDate::from_ymd_opt(2027, 4, day).unwrap();
            t.event_time = None;
            t.created_at = t.created_at + chrono::Duration::seconds(i as i64);
            out.push(t);
        }
        out
    }

    #[test]
    fn default_sort_is_by_event_date() {
        let page = ListingQuery::default().apply(catalogue());
        let titles: Vec<_> = page.items.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["Rock am See", "Jazz Brunch", "Opera Gala", "Symphony No. 9"]);
        assert_eq!(page.total, 4);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn search_is_case_insensitive_over_title_and_venue() {
        let query = ListingQuery { q: Some("  PHIL ".into()), ..Default::default() };
        let page = query.apply(catalogue());
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].title, "Symphony No. 9");
    }

    #[test]
    fn category_and_price_filters_combine() {
        let query = ListingQuery {
            category: Some("Classical".into()),
            max_price: Some(7_000),
            sort: SortOrder::PriceDesc,
            ..Default::default()
        };
        let page = query.apply(catalogue());
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].price_cents, 6_500);
    }

    #[test]
    fn paging_clamps_and_counts_pages() {
        let query = ListingQuery {
            sort: SortOrder::PriceAsc,
            page: Some(2),
            per_page: Some(3),
            ..Default::default()
        };
        let page = query.apply(catalogue());
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].price_cents, 9_000);

        let beyond = ListingQuery { page: Some(9), per_page: Some(0), ..Default::default() }
            .apply(catalogue());
        assert_eq!(beyond.per_page, 1);
        assert!(beyond.items.is_empty());
    }

    #[test]
    fn newest_first() {
        let page = ListingQuery { sort: SortOrder::Newest, ..Default::default() }.apply(catalogue());
        assert_eq!(page.items[0].title, "Symphony No. 9");
    }
}
