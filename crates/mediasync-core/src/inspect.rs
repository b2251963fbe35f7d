//! Media inspection collaborator
//!
//! The authoritative state does not track media duration. A status snapshot
//! reports it only if an inspector that knows it is wired in.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::state::MediaRef;

/// Source of media metadata
pub trait MediaInspector: Send + Sync {
    /// Duration in seconds, `None` when unknown
    fn duration(&self, media: &MediaRef) -> Option<f64>;
}

/// Inspector that knows nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInspector;

impl MediaInspector for NoInspector {
    fn duration(&self, _media: &MediaRef) -> Option<f64> {
        None
    }
}

/// Inspector backed by durations registered per URL
#[derive(Debug, Default)]
pub struct DurationTable {
    durations: RwLock<HashMap<String, f64>>,
}

impl DurationTable {
    /// Build a table from `(url, seconds)` pairs; non-positive or non-finite
    /// durations are skipped
    pub fn from_entries(entries: impl IntoIterator<Item = (String, f64)>) -> Self {
        let table = Self::default();
        for (url, seconds) in entries {
            table.insert(url, seconds);
        }
        table
    }

    /// Register a duration
    pub fn insert(&self, url: impl Into<String>, seconds: f64) {
        if seconds.is_finite() && seconds > 0.0 {
            self.durations.write().insert(url.into(), seconds);
        }
    }
}

impl MediaInspector for DurationTable {
    fn duration(&self, media: &MediaRef) -> Option<f64> {
        self.durations.read().get(&media.url).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MediaType;

    #[test]
    fn test_duration_table() {
        let table = DurationTable::from_entries(vec![
            ("http://x/a.mp4".to_string(), 120.0),
            ("http://x/bad.mp4".to_string(), -1.0),
        ]);
        let a = MediaRef::new("http://x/a.mp4", MediaType::Video);
        let bad = MediaRef::new("http://x/bad.mp4", MediaType::Video);
        assert_eq!(table.duration(&a), Some(120.0));
        assert_eq!(table.duration(&bad), None);
        assert_eq!(NoInspector.duration(&a), None);
    }
}
