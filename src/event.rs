use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::commands;
use crate::notify::Signal;

/// Reads control commands line by line and forwards them as poller signals.
///
/// Stands in for the platform's app-visibility and connectivity listeners.
pub struct ControlHandler {
  task: JoinHandle<()>,
}

impl ControlHandler {
  /// Read commands from stdin.
  pub fn stdin(tx: mpsc::UnboundedSender<Signal>) -> Self {
    Self::from_reader(BufReader::new(tokio::io::stdin()), tx)
  }

  pub fn from_reader<R>(reader: R, tx: mpsc::UnboundedSender<Signal>) -> Self
  where
    R: AsyncBufRead + Unpin + Send + 'static,
  {
    let task = tokio::spawn(async move {
      let mut lines = reader.lines();
      while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
          continue;
        }
        let Some(command) = commands::resolve(&line) else {
          continue;
        };

        debug!(input = %line.trim(), command = command.name, "Control command");
        let signal = (command.signal)();
        let quit = signal == Signal::Shutdown;
        if tx.send(signal).is_err() || quit {
          break;
        }
      }
    });

    Self { task }
  }

  pub fn stop(self) {
    self.task.abort();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_lines_become_signals() {
    let input: &[u8] = b"bg\n\nwifi\nnonsense-xyz\ncheck\nquit\nfg\n";
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _handler = ControlHandler::from_reader(BufReader::new(input), tx);

    let mut received = Vec::new();
    while let Some(signal) = rx.recv().await {
      received.push(signal);
    }

    use crate::notify::{AppState, NetworkClass};
    assert_eq!(
      received,
      vec![
        Signal::App(AppState::Background),
        Signal::Network(NetworkClass::Unmetered),
        Signal::CheckNow,
        Signal::Shutdown,
      ]
    );
  }
}
