//! Live sync session (`board-sync watch`).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use board_sync::sync_config::SyncConfig;
use board_sync::{
    InMemoryQueryCache, PollStart, ProjectId, SyncCoordinator, SyncSnapshot, SyncStatus,
};

pub async fn cmd_watch(
    project_dir: &Path,
    project: ProjectId,
    url: Option<&str>,
    poll_start: Option<PollStart>,
    exit_after: Option<Duration>,
) -> Result<()> {
    let mut config =
        SyncConfig::load(project_dir, url).context("Failed to load sync configuration")?;
    if let Some(poll_start) = poll_start {
        config.options.poll_start = poll_start;
    }
    let connector = config.connector();
    println!(
        "Watching project {} via {}",
        project,
        connector.channel_url(&project)
    );

    let cache = Arc::new(InMemoryQueryCache::new());
    let coordinator = SyncCoordinator::spawn(Arc::new(connector), cache.clone(), config.options);
    let mut updates = coordinator.subscribe();
    coordinator.set_target(Some(project.clone()));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let deadline = async {
        match exit_after {
            Some(after) => tokio::time::sleep(after).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut last_status = SyncStatus::Disconnected;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                println!("Interrupted");
                break;
            }
            _ = &mut deadline => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if snapshot.status != last_status {
                    last_status = snapshot.status;
                    println!("{}", status_line(&snapshot, cache.project_invalidations(&project)));
                }
            }
        }
    }

    coordinator.shutdown().await;
    println!(
        "Stopped after {} invalidation(s) for project {}",
        cache.project_invalidations(&project),
        project
    );
    Ok(())
}

fn status_line(snapshot: &SyncSnapshot, invalidations: u64) -> String {
    let last_update = snapshot
        .last_update
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    let mode = if snapshot.status.is_live() {
        "live"
    } else if snapshot.status.is_degraded() {
        "fallback"
    } else {
        "idle"
    };
    let mut line = format!(
        "{:<12} [{}] last update {}  invalidations {}",
        snapshot.status.to_string(),
        mode,
        last_update,
        invalidations
    );
    if let Some(delay) = snapshot.next_reconnect {
        line.push_str(&format!(
            "  reconnect #{} in {:.1}s",
            snapshot.reconnect_attempt,
            delay.as_secs_f64()
        ));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_status_line_without_reconnect() {
        let snapshot = SyncSnapshot {
            status: SyncStatus::Connected,
            last_update: Some(Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap()),
            ..Default::default()
        };
        let line = status_line(&snapshot, 3);
        assert!(line.starts_with("connected"));
        assert!(line.contains("[live]"));
        assert!(line.contains("last update 03:04:05"));
        assert!(line.contains("invalidations 3"));
        assert!(!line.contains("reconnect"));
    }

    #[test]
    fn test_status_line_with_pending_reconnect() {
        let snapshot = SyncSnapshot {
            status: SyncStatus::Polling,
            reconnect_attempt: 2,
            next_reconnect: Some(Duration::from_millis(2500)),
            ..Default::default()
        };
        let line = status_line(&snapshot, 0);
        assert!(line.contains("[fallback]"));
        assert!(line.contains("last update never"));
        assert!(line.contains("reconnect #2 in 2.5s"));
    }

    #[test]
    fn test_status_line_when_disconnected() {
        let line = status_line(&SyncSnapshot::default(), 0);
        assert!(line.starts_with("disconnected"));
        assert!(line.contains("[idle]"));
    }
}
