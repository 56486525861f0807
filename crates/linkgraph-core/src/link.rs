//! Link type: one crawled page.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::LinkId;

/// A crawled page, keyed by its URL.
///
/// Two links with the same URL are the same entity. The store assigns
/// `id` on first upsert and never changes it afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Assigned by the store; [`LinkId::nil`] until then.
    pub id: LinkId,

    /// Natural key of the link.
    pub url: String,

    /// Earliest time this URL was observed. Repeated upserts keep the minimum.
    pub retrieved_at: DateTime<Utc>,
}

impl Link {
    /// Build an unassigned link ready for upsert.
    #[must_use]
    pub fn new(url: impl Into<String>, retrieved_at: DateTime<Utc>) -> Self {
        Self {
            id: LinkId::nil(),
            url: url.into(),
            retrieved_at,
        }
    }

    /// Overwrite this (stored) link with an incoming observation of the
    /// same URL, keeping its id and the earlier of the two timestamps.
    pub fn merge_from(&mut self, incoming: &Link) {
        let earliest = self.retrieved_at.min(incoming.retrieved_at);
        self.url.clone_from(&incoming.url);
        self.retrieved_at = earliest;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn link_serialization_roundtrip() {
        let mut link = Link::new("https://example.com", Utc::now());
        link.id = LinkId::new_random();

        let json = serde_json::to_string(&link).expect("serialize");
        assert!(json.contains(&link.id.to_string()));
        let deserialized: Link = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(link, deserialized);
    }

    #[test]
    fn merge_keeps_id_and_earliest_timestamp() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut stored = Link::new("https://example.com", t0);
        stored.id = LinkId::new_random();
        let id = stored.id;

        stored.merge_from(&Link::new("https://example.com", t0 + Duration::hours(3)));
        assert_eq!(stored.id, id);
        assert_eq!(stored.retrieved_at, t0);

        stored.merge_from(&Link::new("https://example.com", t0 - Duration::hours(3)));
        assert_eq!(stored.id, id);
        assert_eq!(stored.retrieved_at, t0 - Duration::hours(3));
    }
}
