// src/watch/system.rs

//! Polling sources for volume mounts and network availability.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::engine::{DaemonEvent, WatchNotification};

pub const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";
pub const NET_CLASS_PATH: &str = "/sys/class/net";

/// Mount points listed in a `mountinfo` file (fifth field of each line).
pub fn parse_mount_points(contents: &str) -> BTreeSet<String> {
    contents
        .lines()
        .filter_map(|line| line.split_whitespace().nth(4))
        .map(str::to_string)
        .collect()
}

/// Whether any non-loopback interface below `net_dir` reports `up`.
pub fn network_available(net_dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(net_dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        entry.file_name() != "lo"
            && std::fs::read_to_string(entry.path().join("operstate"))
                .is_ok_and(|state| state.trim() == "up")
    })
}

/// Report `VolumeMounted`/`VolumeUnmounted` whenever the set of mount
/// points grows or shrinks.
pub fn spawn_volume_poller(
    mountinfo: PathBuf,
    events: mpsc::Sender<DaemonEvent>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let read = |path: &Path| {
            std::fs::read_to_string(path)
                .map(|contents| parse_mount_points(&contents))
                .unwrap_or_default()
        };
        let mut known = read(&mountinfo);
        debug!(mounts = known.len(), "volume watcher started");

        loop {
            tokio::time::sleep(interval).await;
            let current = read(&mountinfo);
            let mounted = current.difference(&known).count();
            let unmounted = known.difference(&current).count();
            known = current;

            for _ in 0..mounted {
                if events
                    .send(DaemonEvent::Watch(WatchNotification::VolumeMounted))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            if unmounted > 0
                && events
                    .send(DaemonEvent::Watch(WatchNotification::VolumeUnmounted))
                    .await
                    .is_err()
            {
                return;
            }
        }
    })
}

/// Report the current network state right away and again on every change.
pub fn spawn_network_poller(
    net_dir: PathBuf,
    events: mpsc::Sender<DaemonEvent>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last: Option<bool> = None;
        loop {
            let available = network_available(&net_dir);
            if last != Some(available) {
                debug!(available, "network state changed");
                let notification = WatchNotification::NetworkChanged { available };
                if events.send(DaemonEvent::Watch(notification)).await.is_err() {
                    return;
                }
                last = Some(available);
            }
            tokio::time::sleep(interval).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mountinfo_mount_points() {
        let contents = "\
22 1 8:2 / / rw,relatime shared:1 - ext4 /dev/sda2 rw
45 22 8:17 / /boot/home rw shared:20 - ext4 /dev/sdb1 rw
";
        let mounts = parse_mount_points(contents);
        assert!(mounts.contains("/"));
        assert!(mounts.contains("/boot/home"));
        assert_eq!(mounts.len(), 2);
    }

    #[test]
    fn loopback_does_not_count_as_network() {
        let dir = tempfile::tempdir().unwrap();
        let lo = dir.path().join("lo");
        std::fs::create_dir(&lo).unwrap();
        std::fs::write(lo.join("operstate"), "up\n").unwrap();
        assert!(!network_available(dir.path()));

        let eth = dir.path().join("eth0");
        std::fs::create_dir(&eth).unwrap();
        std::fs::write(eth.join("operstate"), "up\n").unwrap();
        assert!(network_available(dir.path()));
    }
}
