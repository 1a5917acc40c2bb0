//! Shared ownership of scanned tag batches
//!
//! A scan returns every tag in the field as one [`TagBatch`]. Drivers often
//! allocate such a batch as a single block that must be released as a
//! whole, so the batch stays alive until the last card created from it is
//! gone. The release hook runs exactly once, after the last holder drops.

use std::{fmt, sync::Arc};

use tracing::trace;

type ReleaseHook = Box<dyn FnOnce() + Send + Sync>;

/// All tags returned by a single scan
pub struct TagBatch<T> {
    tags: Vec<T>,
    on_release: Option<ReleaseHook>,
}

impl<T> TagBatch<T> {
    /// Wrap the tags of one scan
    pub const fn new(tags: Vec<T>) -> Self {
        Self { tags, on_release: None }
    }

    /// Wrap the tags of one scan and run `hook` when the batch is released
    pub fn with_release_hook(tags: Vec<T>, hook: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self { tags, on_release: Some(Box::new(hook)) }
    }

    /// A scan that found nothing
    pub const fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Number of tags
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether the scan found no tags
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Tags in scan order
    pub fn tags(&self) -> &[T] {
        &self.tags
    }
}

impl<T> Drop for TagBatch<T> {
    fn drop(&mut self) {
        self.tags.clear();
        if let Some(hook) = self.on_release.take() {
            trace!("Releasing tag batch");
            hook();
        }
    }
}

impl<T> fmt::Debug for TagBatch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagBatch")
            .field("len", &self.tags.len())
            .field("has_release_hook", &self.on_release.is_some())
            .finish()
    }
}

/// Reference counted owner of a [`TagBatch`]
pub struct TagSetOwner<T> {
    batch: Arc<TagBatch<T>>,
}

impl<T> TagSetOwner<T> {
    /// Take ownership of `batch`
    pub fn new(batch: TagBatch<T>) -> Self {
        Self { batch: Arc::new(batch) }
    }

    /// Reference to the tag at `index`
    pub fn tag(&self, index: usize) -> Option<TagRef<T>> {
        (index < self.batch.len()).then(|| TagRef { owner: self.clone(), index })
    }

    /// The owned batch
    pub fn batch(&self) -> &TagBatch<T> {
        &self.batch
    }

    /// Number of live owners and tag references
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.batch)
    }
}

impl<T> Clone for TagSetOwner<T> {
    fn clone(&self) -> Self {
        Self { batch: Arc::clone(&self.batch) }
    }
}

impl<T> fmt::Debug for TagSetOwner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagSetOwner")
            .field("batch", &self.batch)
            .field("holders", &self.holders())
            .finish()
    }
}

/// One tag of a batch, keeping the whole batch alive
pub struct TagRef<T> {
    owner: TagSetOwner<T>,
    index: usize,
}

impl<T> TagRef<T> {
    /// The referenced tag
    pub fn get(&self) -> &T {
        // index is checked when the reference is created
        &self.owner.batch.tags[self.index]
    }

    /// Position of the tag within its batch
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Owner of the batch this tag belongs to
    pub const fn owner(&self) -> &TagSetOwner<T> {
        &self.owner
    }
}

impl<T> Clone for TagRef<T> {
    fn clone(&self) -> Self {
        Self { owner: self.owner.clone(), index: self.index }
    }
}

impl<T> fmt::Debug for TagRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagRef").field("index", &self.index).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counted_batch(len: usize) -> (TagBatch<usize>, Arc<AtomicUsize>) {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let batch = TagBatch::with_release_hook((0..len).collect(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (batch, released)
    }

    #[test]
    fn test_release_after_last_reference() {
        for order in [[0, 1, 2], [2, 0, 1], [1, 2, 0]] {
            let (batch, released) = counted_batch(3);
            let owner = TagSetOwner::new(batch);
            let mut refs: Vec<Option<TagRef<usize>>> =
                (0..3).map(|i| owner.tag(i)).collect();
            drop(owner);

            for (step, index) in order.into_iter().enumerate() {
                assert_eq!(released.load(Ordering::SeqCst), 0, "released early at step {step}");
                refs[index] = None;
            }
            assert_eq!(released.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_tag_ref_reads_its_tag() {
        let owner = TagSetOwner::new(TagBatch::new(vec!["a", "b"]));
        let tag = owner.tag(1).unwrap();
        assert_eq!(*tag.get(), "b");
        assert_eq!(owner.holders(), 2);
        assert!(owner.tag(2).is_none());
    }

    #[test]
    fn test_unreferenced_batch_released_on_drop() {
        let (batch, released) = counted_batch(2);
        drop(TagSetOwner::new(batch));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
