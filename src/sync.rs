use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::types::Device;

/// Which ids a snapshot added, changed or dropped relative to the previous one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
}

/// Holds the last full device list. Every snapshot replaces it wholesale.
#[derive(Debug, Default)]
pub struct SnapshotSync {
    devices: Vec<Device>,
    generation: u64,
}

impl SnapshotSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn device(&self, device_id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.device_id == device_id)
    }

    pub fn ids(&self) -> HashSet<&str> {
        self.devices.iter().map(|d| d.device_id.as_str()).collect()
    }

    pub fn apply(&mut self, snapshot: Vec<Device>) -> SnapshotDiff {
        let mut previous: HashMap<String, Device> = self
            .devices
            .drain(..)
            .map(|d| (d.device_id.clone(), d))
            .collect();
        let mut diff = SnapshotDiff::default();
        let mut seen = HashSet::new();

        for device in snapshot {
            if device.device_id.trim().is_empty() {
                warn!("dropping device without an id");
                continue;
            }
            if !seen.insert(device.device_id.clone()) {
                warn!(device_id = %device.device_id, "duplicate device id in snapshot, keeping the first");
                continue;
            }
            match previous.remove(&device.device_id) {
                None => diff.added.push(device.device_id.clone()),
                Some(old) if old != device => diff.changed.push(device.device_id.clone()),
                Some(_) => {}
            }
            self.devices.push(device);
        }

        diff.removed = previous.into_keys().collect();
        diff.removed.sort();
        self.generation += 1;
        debug!(
            generation = self.generation,
            added = diff.added.len(),
            changed = diff.changed.len(),
            removed = diff.removed.len(),
            "snapshot applied"
        );
        diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Tag;
    use pretty_assertions::assert_eq;

    #[test]
    fn diff_tracks_membership_and_changes() {
        let mut sync = SnapshotSync::new();
        let first = sync.apply(vec![Device::new("sw1"), Device::new("sw2")]);
        assert_eq!(first.added, vec!["sw1", "sw2"]);

        let reserved = Device {
            tag: Tag::Reserved,
            ..Device::new("sw2")
        };
        let second = sync.apply(vec![reserved, Device::new("sw3")]);
        assert_eq!(second.added, vec!["sw3"]);
        assert_eq!(second.changed, vec!["sw2"]);
        assert_eq!(second.removed, vec!["sw1"]);

        assert_eq!(sync.apply(sync.current_devices().to_vec()), SnapshotDiff::default());
    }

    #[test]
    fn first_duplicate_wins() {
        let mut sync = SnapshotSync::new();
        let dup = Device {
            model_name: Some("later".into()),
            ..Device::new("sw1")
        };
        sync.apply(vec![Device::new("sw1"), dup, Device::new("")]);
        assert_eq!(sync.current_devices().len(), 1);
        assert_eq!(sync.device("sw1").unwrap().model_name, None);
    }
}
