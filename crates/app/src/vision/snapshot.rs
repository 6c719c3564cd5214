use std::sync::Arc;

use parking_lot::RwLock;

use crate::vision::data::DetectionSnapshot;

/// Holder of the latest [`DetectionSnapshot`].
///
/// The snapshot is swapped as one `Arc`, so readers get either the previous
/// or the new value in full. The lock is only held for the pointer swap or
/// clone, never while a snapshot is built or serialised.
#[derive(Clone, Default)]
pub struct SnapshotPublisher {
    latest: Arc<RwLock<Arc<DetectionSnapshot>>>,
}

impl SnapshotPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: DetectionSnapshot) {
        let snapshot = Arc::new(snapshot);
        *self.latest.write() = snapshot;
    }

    pub fn read(&self) -> Arc<DetectionSnapshot> {
        self.latest.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use chrono::Utc;

    use super::*;
    use crate::vision::data::Detection;

    fn snapshot_for_cycle(cycle: u64) -> DetectionSnapshot {
        let detections = (0..cycle % 4)
            .map(|i| Detection {
                class_id: 0,
                label: "person".into(),
                bbox: [cycle as i32, i as i32, 0, 0],
                confidence: 0.9,
                timestamp: Utc::now(),
            })
            .collect();
        DetectionSnapshot {
            detections,
            fps: cycle as f32,
            inference_ms: 1.0,
            frame_number: cycle,
        }
    }

    #[test]
    fn starts_empty() {
        let publisher = SnapshotPublisher::new();
        let snapshot = publisher.read();
        assert!(snapshot.detections.is_empty());
        assert_eq!(snapshot.fps, 0.0);
    }

    #[test]
    fn read_returns_latest_publish() {
        let publisher = SnapshotPublisher::new();
        publisher.publish(snapshot_for_cycle(1));
        publisher.publish(snapshot_for_cycle(2));
        assert_eq!(publisher.read().frame_number, 2);
    }

    #[test]
    fn readers_never_see_mixed_cycles() {
        let publisher = SnapshotPublisher::new();
        let writer = {
            let publisher = publisher.clone();
            thread::spawn(move || {
                for cycle in 1..=5_000 {
                    publisher.publish(snapshot_for_cycle(cycle));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let publisher = publisher.clone();
                thread::spawn(move || {
                    for _ in 0..5_000 {
                        let snapshot = publisher.read();
                        let cycle = snapshot.frame_number;
                        assert_eq!(snapshot.fps, cycle as f32);
                        assert_eq!(snapshot.detections.len() as u64, cycle % 4);
                        assert!(snapshot
                            .detections
                            .iter()
                            .all(|det| det.bbox[0] == cycle as i32));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
