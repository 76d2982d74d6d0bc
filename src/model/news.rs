//! Per-rubric news slots.
//!
//! A rubric carries at most [`NEWS_SLOTS`] news items. Items posted without a
//! slot number are pushed to the front and older items shift back; items with
//! a slot number replace that slot.

use super::entities::Validity;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of news items kept per rubric.
pub const NEWS_SLOTS: usize = 10;

/// Single news item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct News {
    pub text: String,
    pub rubric_name: String,
    /// Slot number; 0 means "push to front".
    #[serde(default)]
    pub number: u32,
    pub timestamp: DateTime<Utc>,
    pub owner_name: String,
    #[serde(default)]
    pub validity: Option<Validity>,
}

impl News {
    /// Whether this item has passed its time-to-live or validity end.
    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        if now > self.timestamp + ttl {
            return true;
        }
        matches!(self.validity, Some(Validity { end: Some(end), .. }) if now > end)
    }
}

/// Ordered news slots of one rubric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsList {
    items: Vec<News>,
}

impl NewsList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[News] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert a news item according to its slot number.
    pub fn post(&mut self, news: News) {
        let slot = news.number as usize;
        if slot < 1 || self.items.is_empty() {
            self.items.insert(0, news);
            self.items.truncate(NEWS_SLOTS);
        } else {
            let index = slot.min(NEWS_SLOTS) - 1;
            if index < self.items.len() {
                self.items[index] = news;
            } else {
                self.items.push(news);
            }
        }
        self.renumber();
    }

    /// Drop items whose time-to-live or validity window has passed.
    ///
    /// Returns the number of removed items.
    pub fn remove_expired(&mut self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let before = self.items.len();
        self.items.retain(|news| !news.is_expired_at(now, ttl));
        let removed = before - self.items.len();
        if removed > 0 {
            self.renumber();
        }
        removed
    }

    /// Drop items posted by the given owner.
    pub fn remove_owned_by(&mut self, owner_key: &str) -> usize {
        let before = self.items.len();
        self.items
            .retain(|news| !super::refers_to(&news.owner_name, owner_key));
        let removed = before - self.items.len();
        if removed > 0 {
            self.renumber();
        }
        removed
    }

    fn renumber(&mut self) {
        for (index, news) in self.items.iter_mut().enumerate() {
            news.number = index as u32 + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn news(text: &str, number: u32, timestamp: DateTime<Utc>) -> News {
        News {
            text: text.to_string(),
            rubric_name: "weather".to_string(),
            number,
            timestamp,
            owner_name: "admin".to_string(),
            validity: None,
        }
    }

    #[test]
    fn push_front_shifts_and_caps() {
        let now = Utc::now();
        let mut list = NewsList::new();
        for i in 0..12 {
            list.post(news(&format!("item-{}", i), 0, now));
        }
        assert_eq!(list.len(), NEWS_SLOTS);
        assert_eq!(list.items()[0].text, "item-11");
        assert_eq!(list.items()[0].number, 1);
        assert_eq!(list.items()[9].text, "item-2");
        assert_eq!(list.items()[9].number, 10);
    }

    #[test]
    fn numbered_post_replaces_slot() {
        let now = Utc::now();
        let mut list = NewsList::new();
        list.post(news("first", 0, now));
        list.post(news("second", 0, now));
        list.post(news("replacement", 2, now));

        let texts: Vec<_> = list.items().iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["second", "replacement"]);
    }

    #[test]
    fn numbered_post_past_end_appends() {
        let now = Utc::now();
        let mut list = NewsList::new();
        list.post(news("first", 0, now));
        list.post(news("fifth", 5, now));
        assert_eq!(list.len(), 2);
        assert_eq!(list.items()[1].number, 2);
    }

    #[test]
    fn expiry_uses_ttl_and_validity_end() {
        let now = Utc::now();
        let mut list = NewsList::new();
        list.post(news("old", 0, now - Duration::hours(30)));
        let mut bounded = news("bounded", 0, now);
        bounded.validity = Some(Validity {
            start: None,
            end: Some(now - Duration::minutes(1)),
        });
        list.post(bounded);
        list.post(news("fresh", 0, now));

        let removed = list.remove_expired(now, Duration::hours(24));
        assert_eq!(removed, 2);
        assert_eq!(list.items()[0].text, "fresh");
        assert_eq!(list.items()[0].number, 1);
    }
}
