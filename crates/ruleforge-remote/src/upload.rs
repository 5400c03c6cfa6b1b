//! The upload gate: decides which blobs a remote action's input tree
//! actually requires before dispatch, and lazily produces their bytes.

use std::collections::BTreeMap;
use std::sync::Arc;

use ruleforge_core::digest::Digest;
use ruleforge_core::error::Result;

/// Lazily produces the bytes for one blob. Never called unless the blob is
/// actually needed, so a blob referenced by many rules but already present
/// on the remote store is never read or serialized twice.
pub trait BlobProducer: Send + Sync {
    fn produce(&self) -> Result<Vec<u8>>;
}

impl<F> BlobProducer for F
where
    F: Fn() -> Result<Vec<u8>> + Send + Sync,
{
    fn produce(&self) -> Result<Vec<u8>> {
        (self)()
    }
}

/// Filters a set of candidate blobs down to the ones a caller-supplied
/// `needs_upload` predicate says the remote store is missing.
pub struct UploadPlanner<'a> {
    needs_upload: &'a dyn Fn(Digest) -> bool,
}

impl<'a> UploadPlanner<'a> {
    pub fn new(needs_upload: &'a dyn Fn(Digest) -> bool) -> Self {
        Self { needs_upload }
    }

    pub fn plan(&self, blobs: &BTreeMap<Digest, Arc<dyn BlobProducer>>) -> Vec<(Digest, Arc<dyn BlobProducer>)> {
        blobs
            .iter()
            .filter(|(digest, _)| (self.needs_upload)(**digest))
            .map(|(digest, producer)| (*digest, producer.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn only_missing_blobs_are_planned_and_producers_stay_lazy() {
        let present = Digest::of_bytes(b"already-on-remote");
        let missing = Digest::of_bytes(b"needs-upload");
        let calls = Arc::new(AtomicUsize::new(0));

        let mut blobs: BTreeMap<Digest, Arc<dyn BlobProducer>> = BTreeMap::new();
        blobs.insert(present, Arc::new(|| -> Result<Vec<u8>> { panic!("should never be produced") }));
        let produce_calls = calls.clone();
        blobs.insert(
            missing,
            Arc::new(move || -> Result<Vec<u8>> {
                produce_calls.fetch_add(1, Ordering::SeqCst);
                Ok(b"payload".to_vec())
            }),
        );

        let needs_upload = |d: Digest| d == missing;
        let planner = UploadPlanner::new(&needs_upload);
        let plan = planner.plan(&blobs);

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].0, missing);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        plan[0].1.produce().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
