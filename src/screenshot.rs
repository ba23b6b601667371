//! Screenshot files: one "latest", one "previous", nothing else.
//!
//! Each capture renames the current latest file to the previous slot
//! (replacing whatever was there) before the new image lands, so at most
//! two screenshots ever exist on disk.

use crate::error::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::fs;
use std::path::{Path, PathBuf};

pub const LATEST_FILE: &str = "latest_screenshot.png";
pub const PREVIOUS_FILE: &str = "previous_screenshot.png";

#[derive(Debug, Clone)]
pub struct ScreenshotStore {
    dir: PathBuf,
}

impl ScreenshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join(LATEST_FILE)
    }

    pub fn previous_path(&self) -> PathBuf {
        self.dir.join(PREVIOUS_FILE)
    }

    /// Latest path, if a capture has ever landed.
    pub fn latest(&self) -> Option<PathBuf> {
        let path = self.latest_path();
        path.exists().then_some(path)
    }

    pub fn previous(&self) -> Option<PathBuf> {
        let path = self.previous_path();
        path.exists().then_some(path)
    }

    /// Move latest into the previous slot.  No-op when there is no latest.
    pub fn rotate(&self) -> Result<()> {
        let latest = self.latest_path();
        if latest.exists() {
            // rename() replaces the target on Unix but not on Windows.
            let previous = self.previous_path();
            if previous.exists() {
                fs::remove_file(&previous)?;
            }
            fs::rename(&latest, &previous)?;
        }
        Ok(())
    }

    /// Rotate, then write `png` as the new latest file.
    pub fn store(&self, png: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        self.rotate()?;
        let latest = self.latest_path();
        fs::write(&latest, png)?;
        log::info!("Screenshot saved to: {}", latest.display());
        Ok(latest)
    }

    /// [`ScreenshotStore::store`] for a base64 payload, with or without a
    /// `data:image/png;base64,` prefix.
    pub fn store_base64(&self, encoded: &str) -> Result<PathBuf> {
        let payload = encoded
            .split_once(";base64,")
            .map_or(encoded, |(_, data)| data);
        let bytes = STANDARD.decode(payload.trim()).map_err(|e| {
            crate::error::ClientError::Protocol(format!("screenshot is not valid base64: {e}"))
        })?;
        self.store(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn two_captures_leave_latest_and_previous() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ScreenshotStore::new(tmp.path().join("shots"));

        store.store(b"first").unwrap();
        assert!(store.previous().is_none());

        store.store(b"second").unwrap();
        assert_eq!(
            files_in(store.dir()),
            vec![LATEST_FILE.to_string(), PREVIOUS_FILE.to_string()]
        );
        assert_eq!(fs::read(store.latest_path()).unwrap(), b"second");
        assert_eq!(fs::read(store.previous_path()).unwrap(), b"first");
    }

    #[test]
    fn third_capture_drops_the_oldest() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ScreenshotStore::new(tmp.path());

        for shot in [&b"one"[..], &b"two"[..], &b"three"[..]] {
            store.store(shot).unwrap();
        }
        assert_eq!(files_in(tmp.path()).len(), 2);
        assert_eq!(fs::read(store.previous_path()).unwrap(), b"two");
    }

    #[test]
    fn accepts_data_urls() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ScreenshotStore::new(tmp.path());
        let encoded = format!("data:image/png;base64,{}", STANDARD.encode(b"png-bytes"));

        let path = store.store_base64(&encoded).unwrap();
        assert_eq!(fs::read(path).unwrap(), b"png-bytes");
        assert!(store.store_base64("***").is_err());
    }
}
