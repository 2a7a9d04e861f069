//! Human-readable rendering of notification payloads.
//!
//! Every function here is a pure function of the item.

use serde_json::json;

use crate::api::types::{NotificationCategory, NotificationItem};

/// What the user sees for one notification
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
  pub title: String,
  pub body: String,
  pub image: Option<String>,
  /// Routing data attached to the notification
  pub data: serde_json::Value,
}

pub fn render(item: &NotificationItem) -> PushMessage {
  let (title, body) = title_and_body(item);
  PushMessage {
    title,
    body,
    image: image(item),
    data: json!({
      "category": item.category.as_str(),
      "reference": item.reference,
      "slug": item.data_str("slug"),
    }),
  }
}

fn title_and_body(item: &NotificationItem) -> (String, String) {
  let who = actor(item);
  match &item.category {
    NotificationCategory::EpisodeReleased => {
      let title = content_title(item).unwrap_or_else(|| "New episode".to_string());
      let body = match episode(item) {
        Some(n) => format!("Episode {} is out", n),
        None => "A new episode is out".to_string(),
      };
      (title, body)
    }
    NotificationCategory::Follow => {
      ("New follower".to_string(), format!("{} started following you", who))
    }
    NotificationCategory::CommentReply => (
      "New reply".to_string(),
      with_excerpt(format!("{} replied to your comment", who), item),
    ),
    NotificationCategory::CommentTag => (
      "You were mentioned".to_string(),
      with_excerpt(format!("{} mentioned you in a comment", who), item),
    ),
    NotificationCategory::CommentVote => {
      ("New like".to_string(), format!("{} liked your comment", who))
    }
    NotificationCategory::CollectionVote => {
      ("New like".to_string(), format!("{} liked your collection", who))
    }
    NotificationCategory::ArticleVote => {
      ("New like".to_string(), format!("{} liked your article", who))
    }
    NotificationCategory::CollectionComment => (
      "New comment".to_string(),
      with_excerpt(format!("{} commented on your collection", who), item),
    ),
    NotificationCategory::ArticleComment => (
      "New comment".to_string(),
      with_excerpt(format!("{} commented on your article", who), item),
    ),
    NotificationCategory::EditAccepted => ("Edit accepted".to_string(), edit_body(item, "accepted")),
    NotificationCategory::EditDenied => ("Edit rejected".to_string(), edit_body(item, "rejected")),
    NotificationCategory::EditUpdated => ("Edit updated".to_string(), edit_body(item, "updated")),
    NotificationCategory::ServiceUpdate => (
      item
        .data_str("title")
        .unwrap_or_else(|| "Service update".to_string()),
      item.data_str("description").unwrap_or_default(),
    ),
    NotificationCategory::Other(tag) => (
      humanize(tag),
      item
        .data_str("description")
        .or_else(|| item.data_str("content"))
        .unwrap_or_default(),
    ),
  }
}

/// Display name of whoever triggered the notification.
pub fn actor(item: &NotificationItem) -> String {
  item
    .actor_name()
    .map(str::to_string)
    .unwrap_or_else(|| "Someone".to_string())
}

/// Title of the content a notification refers to, in preference order.
pub fn content_title(item: &NotificationItem) -> Option<String> {
  ["title_ua", "title_en", "title_ja", "title", "content_title"]
    .iter()
    .find_map(|field| item.data_str(field))
}

pub fn episode(item: &NotificationItem) -> Option<String> {
  item
    .data_str("after.episodes_released")
    .or_else(|| item.data_str("episode"))
}

fn image(item: &NotificationItem) -> Option<String> {
  item.data_str("image").or_else(|| {
    item
      .initiator
      .as_ref()
      .and_then(|user| user.avatar.clone())
  })
}

fn edit_body(item: &NotificationItem, outcome: &str) -> String {
  match item.data_str("edit_id") {
    Some(id) => format!("Your edit #{} was {}", id, outcome),
    None => format!("Your edit was {}", outcome),
  }
}

fn with_excerpt(summary: String, item: &NotificationItem) -> String {
  match item.data_str("content") {
    Some(text) => format!("{}: {}", summary, excerpt(&text, 80)),
    None => summary,
  }
}

fn excerpt(text: &str, max_chars: usize) -> String {
  let text = text.trim();
  if text.chars().count() <= max_chars {
    return text.to_string();
  }
  let cut: String = text.chars().take(max_chars).collect();
  format!("{}…", cut.trim_end())
}

fn humanize(tag: &str) -> String {
  let spaced = tag.replace('_', " ");
  let mut chars = spaced.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => "Notification".to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::Initiator;
  use chrono::Utc;
  use serde_json::Value;

  fn item(category: &str, data: Value, username: Option<&str>) -> NotificationItem {
    NotificationItem {
      category: NotificationCategory::from(category.to_string()),
      reference: Some("ref-1".to_string()),
      initiator: username.map(|name| Initiator {
        id: Some("7".to_string()),
        username: Some(name.to_string()),
        avatar: Some("https://cdn.test/a.png".to_string()),
      }),
      data,
      seen: false,
      created: Utc::now(),
    }
  }

  #[test]
  fn test_episode_release() {
    let message = render(&item(
      "schedule_anime",
      json!({"title_en": "Frieren", "slug": "frieren", "image": "https://cdn.test/f.jpg",
             "after": {"episodes_released": 12}}),
      None,
    ));

    assert_eq!(message.title, "Frieren");
    assert_eq!(message.body, "Episode 12 is out");
    assert_eq!(message.image.as_deref(), Some("https://cdn.test/f.jpg"));
    assert_eq!(message.data["slug"], "frieren");
    assert_eq!(message.data["category"], "schedule_anime");
  }

  #[test]
  fn test_follow_uses_avatar() {
    let message = render(&item("follow", json!({}), Some("kira")));
    assert_eq!(message.body, "kira started following you");
    assert_eq!(message.image.as_deref(), Some("https://cdn.test/a.png"));
  }

  #[test]
  fn test_reply_excerpt_is_truncated() {
    let long = "a".repeat(200);
    let message = render(&item("comment_reply", json!({ "content": long }), None));
    assert!(message.body.starts_with("Someone replied to your comment: "));
    assert!(message.body.ends_with('…'));
  }

  #[test]
  fn test_unknown_category_is_humanized() {
    let message = render(&item("season_recap", json!({"description": "Your year"}), None));
    assert_eq!(message.title, "Season recap");
    assert_eq!(message.body, "Your year");
  }

  #[test]
  fn test_edit_outcome() {
    let message = render(&item("edit_denied", json!({"edit_id": 99}), None));
    assert_eq!(message.body, "Your edit #99 was rejected");
  }
}
