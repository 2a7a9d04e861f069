//! Control commands accepted while polling, with autocomplete logic.

use crate::notify::{AppState, NetworkClass, Signal};

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
  pub signal: fn() -> Signal,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "foreground",
    aliases: &["fg", "front", "active"],
    description: "App is visible to the user",
    signal: || Signal::App(AppState::Foreground),
  },
  Command {
    name: "background",
    aliases: &["bg", "hidden", "inactive"],
    description: "App is in the background",
    signal: || Signal::App(AppState::Background),
  },
  Command {
    name: "wifi",
    aliases: &["unmetered", "ethernet", "lan"],
    description: "Unmetered network",
    signal: || Signal::Network(NetworkClass::Unmetered),
  },
  Command {
    name: "cellular",
    aliases: &["metered", "mobile", "lte"],
    description: "Metered network",
    signal: || Signal::Network(NetworkClass::Metered),
  },
  Command {
    name: "check",
    aliases: &["now", "refresh", "poll"],
    description: "Check for notifications immediately",
    signal: || Signal::CheckNow,
  },
  Command {
    name: "reload",
    aliases: &["prefs", "settings"],
    description: "Reload notification preferences",
    signal: || Signal::SettingsChanged,
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Stop polling",
    signal: || Signal::Shutdown,
  },
];

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.trim().to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    // Exact match on name
    if cmd.name == input_lower {
      matches.push((cmd, 0)); // Highest priority
      continue;
    }

    // Exact match on alias
    if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
      continue;
    }

    // Prefix match on name
    if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
      continue;
    }

    // Prefix match on alias
    if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((cmd, 3));
      continue;
    }

    // Fuzzy match (contains)
    if cmd.name.contains(&input_lower) {
      matches.push((cmd, 4));
      continue;
    }

    // Fuzzy match on alias
    if cmd.aliases.iter().any(|a| a.contains(&input_lower)) {
      matches.push((cmd, 5));
    }
  }

  // Sort by priority
  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Resolve input to a single command. Blank input resolves to nothing.
pub fn resolve(input: &str) -> Option<&'static Command> {
  if input.trim().is_empty() {
    return None;
  }
  get_suggestions(input).into_iter().next()
}

/// One line per command, for help output.
pub fn help() -> String {
  COMMANDS
    .iter()
    .map(|cmd| format!("  {:<12} {} ({})", cmd.name, cmd.description, cmd.aliases.join(", ")))
    .collect::<Vec<_>>()
    .join("\n")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_input_returns_all() {
    let suggestions = get_suggestions("");
    assert_eq!(suggestions.len(), COMMANDS.len());
    assert!(resolve("  ").is_none());
  }

  #[test]
  fn test_exact_match() {
    let suggestions = get_suggestions("background");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "background");
  }

  #[test]
  fn test_alias_match() {
    let command = resolve("bg").unwrap();
    assert_eq!(command.name, "background");
    assert_eq!((command.signal)(), Signal::App(AppState::Background));
  }

  #[test]
  fn test_prefix_match() {
    let command = resolve("cell").unwrap();
    assert_eq!((command.signal)(), Signal::Network(NetworkClass::Metered));
  }

  #[test]
  fn test_fuzzy_match() {
    let suggestions = get_suggestions("ifi");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "wifi");
  }

  #[test]
  fn test_help_lists_every_command() {
    let help = help();
    for cmd in COMMANDS {
      assert!(help.contains(cmd.name));
    }
  }
}
