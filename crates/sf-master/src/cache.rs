//! Decoded audio shared between segments that use the same file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use log::debug;
use sf_formats::FormatError;
use sf_ir::RawDataProvider;

/// Path-keyed cache of decoded WAV files.
///
/// Every hit hands out a fresh provider over the same sample data, so each
/// segment keeps its own read position.
#[derive(Debug, Default)]
pub struct ProviderCache {
    entries: HashMap<PathBuf, RawDataProvider>,
}

impl ProviderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(&mut self, path: &Path, cancel: &AtomicBool) -> Result<RawDataProvider, FormatError> {
        if let Some(cached) = self.entries.get(path) {
            debug!("Provider cache hit: {}", path.display());
            return Ok(cached.share());
        }
        let provider = sf_formats::load_wav_file(path, cancel)?;
        let handle = provider.share();
        self.entries.insert(path.to_path_buf(), provider);
        Ok(handle)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn evict(&mut self, path: &Path) -> bool {
        self.entries.remove(path).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_ir::SoundDataProvider;

    fn temp_wav(name: &str, samples: &[f32]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("soundflow-cache-{}-{}.wav", std::process::id(), name));
        sf_formats::write_wav_file(&path, samples, 1, 8000).unwrap();
        path
    }

    #[test]
    fn second_load_shares_data_with_independent_position() {
        let path = temp_wav("share", &[0.5, -0.5, 0.25]);
        let cancel = AtomicBool::new(false);
        let mut cache = ProviderCache::new();

        let mut first = cache.get_or_load(&path, &cancel).unwrap();
        let mut buf = [0.0f32; 2];
        first.read(&mut buf);
        assert_eq!(first.position(), 2);

        let second = cache.get_or_load(&path, &cancel).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(second.position(), 0);
        assert_eq!(second.samples().len(), 3);

        assert!(cache.evict(&path));
        assert!(cache.is_empty());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn failed_load_is_not_cached() {
        let cancel = AtomicBool::new(false);
        let mut cache = ProviderCache::new();
        let missing = Path::new("/nonexistent/soundflow-missing.wav");
        assert!(cache.get_or_load(missing, &cancel).is_err());
        assert!(!cache.contains(missing));
    }
}
