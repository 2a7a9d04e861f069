//! Serde-deserializable types matching the tracker API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::types::{
  Initiator, NotificationCategory, NotificationItem, NotificationPage, WatchRecord, WatchStatus,
};

// ============================================================================
// Common nested field types
// ============================================================================

/// User ids arrive as numbers from some endpoints and strings from others.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ApiId {
  Number(i64),
  Text(String),
}

impl ApiId {
  fn into_string(self) -> String {
    match self {
      ApiId::Number(n) => n.to_string(),
      ApiId::Text(s) => s,
    }
  }
}

/// Timestamps arrive as unix seconds or RFC 3339 strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ApiTimestamp {
  Unix(i64),
  Text(String),
}

impl ApiTimestamp {
  fn to_datetime(&self) -> Option<DateTime<Utc>> {
    match self {
      ApiTimestamp::Unix(secs) => Utc.timestamp_opt(*secs, 0).single(),
      ApiTimestamp::Text(s) => DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc)),
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiUser {
  pub id: Option<ApiId>,
  pub reference: Option<String>,
  pub username: Option<String>,
  pub avatar: Option<String>,
}

impl From<ApiUser> for Initiator {
  fn from(user: ApiUser) -> Self {
    Initiator {
      id: user.id.map(ApiId::into_string).or(user.reference),
      username: user.username,
      avatar: user.avatar,
    }
  }
}

// ============================================================================
// Watch endpoints
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiWatch {
  pub status: WatchStatus,
  #[serde(default)]
  pub score: u8,
  #[serde(default)]
  pub episodes: u32,
  #[serde(default)]
  pub rewatches: u32,
  pub note: Option<String>,
}

impl From<ApiWatch> for WatchRecord {
  fn from(watch: ApiWatch) -> Self {
    WatchRecord {
      status: watch.status,
      score: watch.score,
      episodes: watch.episodes,
      rewatches: watch.rewatches,
      note: watch.note,
    }
  }
}

impl From<&WatchRecord> for ApiWatch {
  fn from(record: &WatchRecord) -> Self {
    ApiWatch {
      status: record.status,
      score: record.score,
      episodes: record.episodes,
      rewatches: record.rewatches,
      note: record.note.clone(),
    }
  }
}

// ============================================================================
// Favourite endpoint
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiFavourite {
  pub reference: Option<String>,
}

impl ApiFavourite {
  pub fn is_favourite(&self) -> bool {
    self.reference.as_deref().is_some_and(|r| !r.is_empty())
  }
}

// ============================================================================
// Notification endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiNotification {
  #[serde(rename = "notification_type", alias = "type")]
  pub notification_type: String,
  pub reference: Option<String>,
  pub initiator_user: Option<ApiUser>,
  #[serde(default)]
  pub data: serde_json::Value,
  #[serde(default)]
  pub seen: bool,
  pub created: Option<ApiTimestamp>,
}

impl ApiNotification {
  pub fn into_item(self) -> NotificationItem {
    NotificationItem {
      category: NotificationCategory::from(self.notification_type),
      reference: self.reference.filter(|r| !r.is_empty()),
      initiator: self.initiator_user.map(Initiator::from),
      data: self.data,
      seen: self.seen,
      created: self
        .created
        .as_ref()
        .and_then(ApiTimestamp::to_datetime)
        .unwrap_or_else(Utc::now),
    }
  }
}

#[derive(Debug, Deserialize, Default)]
pub struct ApiPagination {
  #[serde(default)]
  pub pages: u32,
}

#[derive(Debug, Deserialize)]
pub struct ApiNotificationsResponse {
  #[serde(default)]
  pub list: Vec<ApiNotification>,
  #[serde(default)]
  pub pagination: ApiPagination,
}

impl From<ApiNotificationsResponse> for NotificationPage {
  fn from(response: ApiNotificationsResponse) -> Self {
    NotificationPage {
      items: response
        .list
        .into_iter()
        .map(ApiNotification::into_item)
        .collect(),
      pages: response.pagination.pages,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiUnseenCount {
  #[serde(default)]
  pub unseen: u32,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_notification_accepts_numeric_initiator_id() {
    let raw = json!({
      "type": "follow",
      "initiator_user": {"id": 42, "username": "kira"},
      "seen": false,
      "created": 1700000000
    });

    let item = serde_json::from_value::<ApiNotification>(raw)
      .unwrap()
      .into_item();

    assert_eq!(item.category, NotificationCategory::Follow);
    assert_eq!(item.actor_id(), Some("42"));
    assert_eq!(item.actor_name(), Some("kira"));
    assert_eq!(item.created.timestamp(), 1700000000);
    assert!(item.reference.is_none());
  }

  #[test]
  fn test_notifications_page() {
    let raw = json!({
      "list": [{
        "notification_type": "schedule_anime",
        "reference": "n-1",
        "data": {"slug": "abc", "after": {"episodes_released": 3}},
        "seen": true,
        "created": "2024-05-01T10:00:00Z"
      }],
      "pagination": {"pages": 4, "total": 61, "page": 1}
    });

    let page: NotificationPage = serde_json::from_value::<ApiNotificationsResponse>(raw)
      .unwrap()
      .into();

    assert_eq!(page.pages, 4);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].reference.as_deref(), Some("n-1"));
    assert!(page.items[0].seen);
  }

  #[test]
  fn test_favourite_reference_presence() {
    let yes: ApiFavourite = serde_json::from_value(json!({"reference": "x"})).unwrap();
    let no: ApiFavourite = serde_json::from_value(json!({})).unwrap();
    assert!(yes.is_favourite());
    assert!(!no.is_favourite());
  }
}
