// src/pipeline/edge_trigger.rs
//
// Rising-edge dispatcher for per-track "approaching" flags.
//
// The action runs only on a false → true transition for a given
// (stream, track id) key. Unknown keys read as false, so a track that is
// already approaching on its first report fires once.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    pub stream: String,
    pub track_id: u64,
}

impl EdgeKey {
    pub fn new(stream: impl Into<String>, track_id: u64) -> Self {
        Self {
            stream: stream.into(),
            track_id,
        }
    }
}

impl std::fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.stream, self.track_id)
    }
}

#[derive(Debug, Default)]
pub struct EdgeTrigger {
    last_state: HashMap<EdgeKey, bool>,
}

impl EdgeTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `approaching` for `key`, running `action` on a rising edge.
    /// Returns whether the action ran.
    pub fn update(&mut self, key: EdgeKey, approaching: bool, action: impl FnOnce()) -> bool {
        let prev = self.last_state.insert(key, approaching).unwrap_or(false);
        let rising = !prev && approaching;
        if rising {
            action();
        }
        rising
    }

    pub fn last_state(&self, key: &EdgeKey) -> bool {
        self.last_state.get(key).copied().unwrap_or(false)
    }

    /// Forget every key of `stream` whose track id is not in `live_ids`.
    pub fn retain_tracks(&mut self, stream: &str, live_ids: &[u64]) {
        self.last_state
            .retain(|k, _| k.stream != stream || live_ids.contains(&k.track_id));
    }

    pub fn len(&self) -> usize {
        self.last_state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_state.is_empty()
    }
}
