use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable identifier of a tracked entity (a content slug).
pub type EntityKey = String;

/// Watch-list status tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchStatus {
  Watching,
  Planned,
  Completed,
  OnHold,
  Dropped,
}

impl WatchStatus {
  pub const ALL: [WatchStatus; 5] = [
    WatchStatus::Watching,
    WatchStatus::Planned,
    WatchStatus::Completed,
    WatchStatus::OnHold,
    WatchStatus::Dropped,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      WatchStatus::Watching => "watching",
      WatchStatus::Planned => "planned",
      WatchStatus::Completed => "completed",
      WatchStatus::OnHold => "on_hold",
      WatchStatus::Dropped => "dropped",
    }
  }
}

impl fmt::Display for WatchStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for WatchStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
    WatchStatus::ALL
      .into_iter()
      .find(|status| status.as_str() == normalized)
      .ok_or_else(|| format!("unknown watch status '{}'", s))
  }
}

/// A user's watch record for one entity.
///
/// Status and episode progress always travel together so that a status
/// write can never leave progress from a previous record behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchRecord {
  pub status: WatchStatus,
  pub score: u8,
  pub episodes: u32,
  pub rewatches: u32,
  pub note: Option<String>,
}

impl WatchRecord {
  pub fn new(status: WatchStatus, episodes: u32) -> Self {
    Self {
      status,
      score: 0,
      episodes,
      rewatches: 0,
      note: None,
    }
  }
}

/// Content kinds that can be favourited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FavouriteKind {
  Anime,
  Manga,
  Novel,
  Character,
  Person,
  Collection,
}

impl FavouriteKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      FavouriteKind::Anime => "anime",
      FavouriteKind::Manga => "manga",
      FavouriteKind::Novel => "novel",
      FavouriteKind::Character => "character",
      FavouriteKind::Person => "person",
      FavouriteKind::Collection => "collection",
    }
  }
}

impl fmt::Display for FavouriteKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for FavouriteKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "anime" => Ok(FavouriteKind::Anime),
      "manga" => Ok(FavouriteKind::Manga),
      "novel" => Ok(FavouriteKind::Novel),
      "character" => Ok(FavouriteKind::Character),
      "person" => Ok(FavouriteKind::Person),
      "collection" => Ok(FavouriteKind::Collection),
      other => Err(format!("unknown favourite kind '{}'", other)),
    }
  }
}

/// Notification category tag as sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationCategory {
  /// A new episode of a tracked title was released
  EpisodeReleased,
  Follow,
  CommentReply,
  CommentVote,
  CommentTag,
  CollectionComment,
  CollectionVote,
  ArticleComment,
  ArticleVote,
  EditAccepted,
  EditDenied,
  EditUpdated,
  ServiceUpdate,
  /// Anything this client does not know about yet
  Other(String),
}

impl NotificationCategory {
  /// Categories with a dedicated preference toggle.
  pub const KNOWN: [NotificationCategory; 13] = [
    NotificationCategory::EpisodeReleased,
    NotificationCategory::Follow,
    NotificationCategory::CommentReply,
    NotificationCategory::CommentVote,
    NotificationCategory::CommentTag,
    NotificationCategory::CollectionComment,
    NotificationCategory::CollectionVote,
    NotificationCategory::ArticleComment,
    NotificationCategory::ArticleVote,
    NotificationCategory::EditAccepted,
    NotificationCategory::EditDenied,
    NotificationCategory::EditUpdated,
    NotificationCategory::ServiceUpdate,
  ];

  pub fn as_str(&self) -> &str {
    match self {
      NotificationCategory::EpisodeReleased => "schedule_anime",
      NotificationCategory::Follow => "follow",
      NotificationCategory::CommentReply => "comment_reply",
      NotificationCategory::CommentVote => "comment_vote",
      NotificationCategory::CommentTag => "comment_tag",
      NotificationCategory::CollectionComment => "collection_comment",
      NotificationCategory::CollectionVote => "collection_vote",
      NotificationCategory::ArticleComment => "article_comment",
      NotificationCategory::ArticleVote => "article_vote",
      NotificationCategory::EditAccepted => "edit_accepted",
      NotificationCategory::EditDenied => "edit_denied",
      NotificationCategory::EditUpdated => "edit_updated",
      NotificationCategory::ServiceUpdate => "hikka_update",
      NotificationCategory::Other(tag) => tag,
    }
  }

  /// Social events are identified by who triggered them.
  pub fn is_social(&self) -> bool {
    matches!(
      self,
      NotificationCategory::Follow
        | NotificationCategory::CommentVote
        | NotificationCategory::CollectionVote
        | NotificationCategory::ArticleVote
    )
  }
}

impl From<String> for NotificationCategory {
  fn from(tag: String) -> Self {
    let normalized = tag.trim().to_lowercase();
    NotificationCategory::KNOWN
      .into_iter()
      .find(|c| c.as_str() == normalized)
      .unwrap_or(NotificationCategory::Other(normalized))
  }
}

impl From<NotificationCategory> for String {
  fn from(category: NotificationCategory) -> Self {
    category.as_str().to_string()
  }
}

impl fmt::Display for NotificationCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The user who triggered a notification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Initiator {
  pub id: Option<String>,
  pub username: Option<String>,
  pub avatar: Option<String>,
}

/// A notification as fetched from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationItem {
  pub category: NotificationCategory,
  pub reference: Option<String>,
  pub initiator: Option<Initiator>,
  /// Category-specific payload
  pub data: serde_json::Value,
  pub seen: bool,
  pub created: DateTime<Utc>,
}

impl NotificationItem {
  /// Read a string field from the payload, following a dotted path.
  pub fn data_str(&self, path: &str) -> Option<String> {
    let value = path
      .split('.')
      .try_fold(&self.data, |value, segment| value.get(segment))?;
    match value {
      serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
      serde_json::Value::Number(n) => Some(n.to_string()),
      _ => None,
    }
  }

  pub fn actor_id(&self) -> Option<&str> {
    self.initiator.as_ref()?.id.as_deref()
  }

  pub fn actor_name(&self) -> Option<&str> {
    self.initiator.as_ref()?.username.as_deref()
  }
}

/// One page of the notification feed
#[derive(Debug, Clone)]
pub struct NotificationPage {
  pub items: Vec<NotificationItem>,
  pub pages: u32,
}
