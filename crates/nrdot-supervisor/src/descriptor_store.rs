// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! On-disk descriptor persistence: generation-scoped files under a state
//! directory, written via write-then-atomic-rename, with a `last-good`
//! symlink pointing at the most recently healthy generation.

use std::path::{Path, PathBuf};

use nrdot_types::descriptor::{Generation, PipelineDescriptor};

use crate::error::SupervisorError;

/// Owns the on-disk descriptor layout under one state directory.
#[derive(Debug, Clone)]
pub struct DescriptorStore {
    state_dir: PathBuf,
}

fn write_failed(path: &Path, source: std::io::Error) -> SupervisorError {
    SupervisorError::DescriptorWriteFailed {
        path: path.display().to_string(),
        source,
    }
}

impl DescriptorStore {
    /// Opens a store rooted at `state_dir` (created if absent).
    pub fn new(state_dir: impl Into<PathBuf>) -> Result<Self, SupervisorError> {
        let state_dir = state_dir.into();
        std::fs::create_dir_all(&state_dir).map_err(|e| write_failed(&state_dir, e))?;
        Ok(Self { state_dir })
    }

    /// Path a descriptor of the given generation is stored at.
    #[must_use]
    pub fn path_for(&self, generation: Generation) -> PathBuf {
        self.state_dir.join(format!("descriptor-{generation}.json"))
    }

    /// Path of the `last-good` symlink.
    #[must_use]
    pub fn last_good_path(&self) -> PathBuf {
        self.state_dir.join("last-good")
    }

    /// Serializes `descriptor` to its generation-scoped path via
    /// write-to-temp-then-rename, so a reader never observes a
    /// partially-written file.
    pub fn persist(&self, descriptor: &PipelineDescriptor) -> Result<PathBuf, SupervisorError> {
        let final_path = self.path_for(descriptor.generation);
        let tmp_path = self.state_dir.join(format!(".descriptor-{}.tmp", descriptor.generation));

        let body = serde_json::to_vec_pretty(descriptor).map_err(|e| write_failed(&final_path, std::io::Error::other(e)))?;
        std::fs::write(&tmp_path, &body).map_err(|e| write_failed(&tmp_path, e))?;
        std::fs::rename(&tmp_path, &final_path).map_err(|e| write_failed(&final_path, e))?;
        Ok(final_path)
    }

    /// Repoints the `last-good` symlink at the given generation's
    /// descriptor file, replacing any existing symlink atomically (write a
    /// new symlink under a temp name, then rename over the old one).
    pub fn mark_last_good(&self, generation: Generation) -> Result<(), SupervisorError> {
        let target = self.path_for(generation);
        let link_path = self.last_good_path();
        let tmp_link = self.state_dir.join(".last-good.tmp");

        let _ = std::fs::remove_file(&tmp_link);
        std::os::unix::fs::symlink(&target, &tmp_link).map_err(|e| write_failed(&tmp_link, e))?;
        std::fs::rename(&tmp_link, &link_path).map_err(|e| write_failed(&link_path, e))?;
        Ok(())
    }

    /// Reads the descriptor the `last-good` symlink currently points at, if
    /// any has been recorded yet.
    pub fn read_last_good(&self) -> Result<Option<PipelineDescriptor>, SupervisorError> {
        let link_path = self.last_good_path();
        if !link_path.exists() {
            return Ok(None);
        }
        let body = std::fs::read(&link_path).map_err(|e| write_failed(&link_path, e))?;
        let descriptor = serde_json::from_slice(&body).map_err(|e| write_failed(&link_path, std::io::Error::other(e)))?;
        Ok(Some(descriptor))
    }

    /// Path of the file recording the currently-active instance's
    /// process-group id, used to detect an orphaned child left behind by a
    /// supervisor process that crashed or was killed mid-reload.
    #[must_use]
    pub fn active_pgid_path(&self) -> PathBuf {
        self.state_dir.join("active.pgid")
    }

    /// Records `pgid` as the active instance's process group, via
    /// write-then-rename like every other file this store writes.
    pub fn record_active_pgid(&self, pgid: u32) -> Result<(), SupervisorError> {
        let path = self.active_pgid_path();
        let tmp_path = self.state_dir.join(".active.pgid.tmp");
        std::fs::write(&tmp_path, pgid.to_string()).map_err(|e| write_failed(&tmp_path, e))?;
        std::fs::rename(&tmp_path, &path).map_err(|e| write_failed(&path, e))?;
        Ok(())
    }

    /// Reads back a previously recorded active process-group id, if any.
    /// Absence (the common case: a clean prior shutdown cleared it) is not
    /// an error.
    #[must_use]
    pub fn read_active_pgid(&self) -> Option<u32> {
        std::fs::read_to_string(self.active_pgid_path()).ok()?.trim().parse().ok()
    }

    /// Clears the recorded active process-group id, called on a clean
    /// shutdown so the next startup doesn't mistake a properly-stopped
    /// instance for an orphan.
    pub fn clear_active_pgid(&self) {
        let _ = std::fs::remove_file(self.active_pgid_path());
    }

    /// Removes every generation-scoped descriptor file older than
    /// `keep_last_n` generations, oldest-first, leaving `last-good` and the
    /// most recent `keep_last_n` files untouched. Errors removing an
    /// individual stale file are logged by the caller's choosing and do not
    /// abort the sweep; this function simply reports which paths were
    /// removed.
    pub fn prune_to(&self, keep_last_n: usize) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.state_dir) else {
            return Vec::new();
        };
        let mut descriptor_files: Vec<(Generation, PathBuf)> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                let name = path.file_name()?.to_str()?;
                let number = name.strip_prefix("descriptor-")?.strip_suffix(".json")?;
                let generation = Generation(number.parse::<u64>().ok()?);
                Some((generation, path))
            })
            .collect();
        descriptor_files.sort_by_key(|(generation, _)| *generation);

        let excess = descriptor_files.len().saturating_sub(keep_last_n);
        let mut removed = Vec::new();
        for (_, path) in descriptor_files.into_iter().take(excess) {
            if std::fs::remove_file(&path).is_ok() {
                removed.push(path);
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use nrdot_types::descriptor::PipelineKind;
    use std::collections::BTreeMap;

    use super::*;

    fn descriptor(generation: u64) -> PipelineDescriptor {
        PipelineDescriptor::new(BTreeMap::new(), BTreeMap::new(), BTreeMap::new(), BTreeMap::<PipelineKind, _>::new(), Generation(generation))
    }

    #[test]
    fn persist_then_read_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DescriptorStore::new(tmp.path()).unwrap();
        let descriptor = descriptor(1);
        let path = store.persist(&descriptor).unwrap();
        assert!(path.exists());
        store.mark_last_good(Generation(1)).unwrap();

        let read_back = store.read_last_good().unwrap().unwrap();
        assert_eq!(read_back.generation, Generation(1));
    }

    #[test]
    fn last_good_with_no_prior_write_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DescriptorStore::new(tmp.path()).unwrap();
        assert!(store.read_last_good().unwrap().is_none());
    }

    #[test]
    fn prune_keeps_only_the_most_recent_generations() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DescriptorStore::new(tmp.path()).unwrap();
        for generation in 1..=7 {
            store.persist(&descriptor(generation)).unwrap();
        }
        let removed = store.prune_to(5);
        assert_eq!(removed.len(), 2);
        assert!(!store.path_for(Generation(1)).exists());
        assert!(!store.path_for(Generation(2)).exists());
        assert!(store.path_for(Generation(7)).exists());
    }

    #[test]
    fn active_pgid_round_trips_and_clears() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DescriptorStore::new(tmp.path()).unwrap();
        assert_eq!(store.read_active_pgid(), None);
        store.record_active_pgid(4242).unwrap();
        assert_eq!(store.read_active_pgid(), Some(4242));
        store.clear_active_pgid();
        assert_eq!(store.read_active_pgid(), None);
    }

    #[test]
    fn mark_last_good_can_be_repointed() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DescriptorStore::new(tmp.path()).unwrap();
        store.persist(&descriptor(1)).unwrap();
        store.persist(&descriptor(2)).unwrap();
        store.mark_last_good(Generation(1)).unwrap();
        store.mark_last_good(Generation(2)).unwrap();
        assert_eq!(store.read_last_good().unwrap().unwrap().generation, Generation(2));
    }
}
