//! Known remote streams
//!
//! The registry keeps the remote streams announced by the transport in arrival
//! order, without duplicates, and classifies them by video type.

use crate::session::{Stream, StreamId, VideoType};

/// Classification used to route a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamClass {
    Camera,
    Screen,
    /// Unrecognised video type; destruction triggers the recovery path
    Other,
}

/// Classify a stream by its video type
pub fn classify(stream: &Stream) -> StreamClass {
    match stream.video_type {
        VideoType::Camera => StreamClass::Camera,
        VideoType::Screen => StreamClass::Screen,
        VideoType::Other(_) => StreamClass::Other,
    }
}

/// Ordered set of known remote streams
#[derive(Debug, Clone, Default)]
pub struct StreamRegistry {
    streams: Vec<Stream>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stream. Returns `false` if a stream with the same id is already known.
    pub fn add(&mut self, stream: Stream) -> bool {
        if self.contains(&stream.id) {
            return false;
        }
        self.streams.push(stream);
        true
    }

    /// Remove a stream by id. Unknown ids are ignored.
    pub fn remove(&mut self, id: &StreamId) -> Option<Stream> {
        let index = self.streams.iter().position(|s| &s.id == id)?;
        Some(self.streams.remove(index))
    }

    pub fn contains(&self, id: &StreamId) -> bool {
        self.streams.iter().any(|s| &s.id == id)
    }

    pub fn get(&self, id: &StreamId) -> Option<&Stream> {
        self.streams.iter().find(|s| &s.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stream> {
        self.streams.iter()
    }

    /// Copy of the streams in arrival order
    pub fn snapshot(&self) -> Vec<Stream> {
        self.streams.clone()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn clear(&mut self) {
        self.streams.clear();
    }
}

impl FromIterator<Stream> for StreamRegistry {
    fn from_iter<I: IntoIterator<Item = Stream>>(iter: I) -> Self {
        let mut registry = StreamRegistry::new();
        for stream in iter {
            registry.add(stream);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(classify(&Stream::camera("a", "c")), StreamClass::Camera);
        assert_eq!(classify(&Stream::screen("b", "c")), StreamClass::Screen);
        assert_eq!(classify(&Stream::new("d", "custom", "c")), StreamClass::Other);
    }

    #[test]
    fn test_no_duplicate_identities() {
        let mut registry = StreamRegistry::new();
        assert!(registry.add(Stream::camera("s1", "c1")));
        assert!(!registry.add(Stream::camera("s1", "c1")));
        // Same id with different attributes is still the same stream
        assert!(!registry.add(Stream::screen("s1", "c9")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry: StreamRegistry = vec![
            Stream::camera("s1", "c1"),
            Stream::screen("s2", "c1"),
            Stream::camera("s3", "c2"),
        ]
        .into_iter()
        .collect();

        let removed = registry.remove(&StreamId::from("s2"));
        assert_eq!(removed.map(|s| s.id), Some(StreamId::from("s2")));
        assert!(registry.remove(&StreamId::from("s2")).is_none());
        assert!(registry.remove(&StreamId::from("missing")).is_none());

        let order: Vec<&str> = registry.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(order, vec!["s1", "s3"]);
    }
}
