//! Progress bar for a single fetch.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;

/// Spawns a bar that follows `progress` until the fetch drops its sender.
///
/// Returns `None` when `quiet` is set. Servers that do not declare a length
/// never move the fraction, so the bar shows a spinner until completion.
pub(crate) fn spawn_progress_bar(
    quiet: bool,
    title: &str,
    mut progress: watch::Receiver<f64>,
) -> Option<tokio::task::JoinHandle<()>> {
    if quiet {
        return None;
    }

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg} [{bar:30}] {pos:>3}%")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.set_message(title.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));

    Some(tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            bar.set_position(percent(*progress.borrow_and_update()));
        }
        bar.finish_and_clear();
    }))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percent(fraction: f64) -> u64 {
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u64
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_rounds_and_clamps() {
        assert_eq!(percent(0.0), 0);
        assert_eq!(percent(0.556), 56);
        assert_eq!(percent(1.0), 100);
        assert_eq!(percent(2.0), 100);
    }

    #[tokio::test]
    async fn test_quiet_mode_spawns_nothing() {
        let (_tx, rx) = watch::channel(0.0);
        assert!(spawn_progress_bar(true, "Dune", rx).is_none());
    }

    #[tokio::test]
    async fn test_bar_task_ends_when_sender_drops() {
        let (tx, rx) = watch::channel(0.0);
        let handle = spawn_progress_bar(false, "Dune", rx).unwrap();
        tx.send_replace(0.5);
        tx.send_replace(1.0);
        drop(tx);
        handle.await.unwrap();
    }
}
