//! Per-category notification preferences.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::api::types::NotificationCategory;
use crate::cache::KvStore;

pub const SETTINGS_STORAGE_KEY: &str = "notification_settings";

/// Category tag → enabled. Categories without an entry are enabled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
  #[serde(default)]
  categories: BTreeMap<String, bool>,
}

impl NotificationSettings {
  /// Load from storage, falling back to defaults on any problem.
  pub fn load(storage: &dyn KvStore) -> Self {
    let raw = match storage.get(SETTINGS_STORAGE_KEY) {
      Ok(Some(raw)) => raw,
      Ok(None) => return Self::default(),
      Err(e) => {
        warn!(error = %e, "Failed to read notification settings");
        return Self::default();
      }
    };

    serde_json::from_str(&raw).unwrap_or_else(|e| {
      warn!(error = %e, "Ignoring unreadable notification settings");
      Self::default()
    })
  }

  pub fn save(&self, storage: &dyn KvStore) -> Result<()> {
    let raw =
      serde_json::to_string(self).map_err(|e| eyre!("Failed to serialize settings: {}", e))?;
    storage.set(SETTINGS_STORAGE_KEY, &raw)
  }

  pub fn is_enabled(&self, category: &NotificationCategory) -> bool {
    self
      .categories
      .get(category.as_str())
      .copied()
      .unwrap_or(true)
  }

  pub fn set_enabled(&mut self, category: &NotificationCategory, enabled: bool) {
    self
      .categories
      .insert(category.as_str().to_string(), enabled);
  }

  /// Every known category plus any custom entries, with their state.
  pub fn entries(&self) -> Vec<(String, bool)> {
    let mut entries: BTreeMap<String, bool> = NotificationCategory::KNOWN
      .iter()
      .map(|c| (c.as_str().to_string(), true))
      .collect();
    entries.extend(self.categories.iter().map(|(k, v)| (k.clone(), *v)));
    entries.into_iter().collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryKvStore;

  #[test]
  fn test_defaults_enable_everything() {
    let settings = NotificationSettings::default();
    assert!(settings.is_enabled(&NotificationCategory::Follow));
    assert!(settings.is_enabled(&NotificationCategory::Other("x".into())));
  }

  #[test]
  fn test_round_trip_through_storage() {
    let storage = MemoryKvStore::new();
    let mut settings = NotificationSettings::load(&storage);
    settings.set_enabled(&NotificationCategory::Follow, false);
    settings.save(&storage).unwrap();

    let reloaded = NotificationSettings::load(&storage);
    assert!(!reloaded.is_enabled(&NotificationCategory::Follow));
    assert!(reloaded.is_enabled(&NotificationCategory::EpisodeReleased));
    assert!(reloaded
      .entries()
      .contains(&("follow".to_string(), false)));
  }

  #[test]
  fn test_corrupt_settings_fall_back_to_defaults() {
    let storage = MemoryKvStore::new();
    storage.set(SETTINGS_STORAGE_KEY, "{not json").unwrap();
    assert_eq!(
      NotificationSettings::load(&storage),
      NotificationSettings::default()
    );
  }
}
