use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub type JobKey = usize;

/// Which data rows were disabled for each job key.
pub type JobKeyMap = BTreeMap<JobKey, Vec<usize>>;

/// One atomic unit of dispatch: job items keyed by a unique job key.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkBatch<T> {
    items: BTreeMap<JobKey, T>,
}

impl<T> Default for WorkBatch<T> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }
}

impl<T> WorkBatch<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(key: JobKey, item: T) -> Self {
        let mut batch = Self::new();
        batch.insert(key, item);
        batch
    }

    /// Adds an item, returning the one it displaced if the key was taken.
    pub fn insert(&mut self, key: JobKey, item: T) -> Option<T> {
        self.items.insert(key, item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = JobKey> + '_ {
        self.items.keys().copied()
    }

    pub fn into_items(self) -> impl Iterator<Item = (JobKey, T)> {
        self.items.into_iter()
    }
}

/// Cooperative cancellation flag shared between a queue and its controllers.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// FIFO of work batches drained concurrently by workers.
///
/// All mutation happens under one mutex, so a batch is delivered to exactly
/// one caller of [`demand`](Self::demand). Once interrupted the queue reports
/// exhaustion until the shared [`InterruptHandle`] is reset by its owner.
#[derive(Debug)]
pub struct WorkQueue<T> {
    batches: Mutex<VecDeque<WorkBatch<T>>>,
    interrupt: InterruptHandle,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::with_interrupt(InterruptHandle::new())
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interrupt(interrupt: InterruptHandle) -> Self {
        Self {
            batches: Mutex::new(VecDeque::new()),
            interrupt,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<WorkBatch<T>>> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, batch: WorkBatch<T>) {
        if !batch.is_empty() {
            self.lock().push_back(batch);
        }
    }

    /// Splits `items` into batches of at most `batch_size` and enqueues them.
    /// Returns the number of batches created.
    pub fn enqueue_chunked<I>(&self, items: I, batch_size: usize) -> usize
    where
        I: IntoIterator<Item = (JobKey, T)>,
    {
        let batch_size = batch_size.max(1);
        let mut queue = self.lock();
        let before = queue.len();
        let mut current = WorkBatch::new();
        for (key, item) in items {
            current.insert(key, item);
            if current.len() == batch_size {
                queue.push_back(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            queue.push_back(current);
        }
        queue.len() - before
    }

    /// Pops the head batch, or `None` once the queue is exhausted or interrupted.
    pub fn demand(&self) -> Option<WorkBatch<T>> {
        let mut queue = self.lock();
        if self.interrupt.is_interrupted() {
            queue.clear();
            return None;
        }
        queue.pop_front()
    }

    /// Raises the interrupt flag and drops every batch not yet handed out.
    pub fn interrupt(&self) {
        self.interrupt.interrupt();
        self.lock().clear();
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_interrupted()
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Drops queued batches. The interrupt flag is left as it is.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn demand_is_fifo_and_reports_exhaustion() {
        let queue = WorkQueue::new();
        queue.enqueue(WorkBatch::single(0, "a"));
        queue.enqueue(WorkBatch::single(1, "b"));
        assert_eq!(queue.len(), 2);

        let first: Vec<_> = queue.demand().unwrap().into_items().collect();
        assert_eq!(first, vec![(0, "a")]);
        let second: Vec<_> = queue.demand().unwrap().into_items().collect();
        assert_eq!(second, vec![(1, "b")]);
        assert!(queue.demand().is_none());
        assert!(queue.demand().is_none());
    }

    #[test]
    fn empty_batches_are_not_enqueued() {
        let queue: WorkQueue<u8> = WorkQueue::new();
        queue.enqueue(WorkBatch::new());
        assert!(queue.is_empty());
    }

    #[test]
    fn enqueue_chunked_respects_batch_size() {
        let queue = WorkQueue::new();
        let batches = queue.enqueue_chunked((0..10).map(|k| (k, k * 2)), 4);
        assert_eq!(batches, 3);
        let sizes: Vec<usize> = std::iter::from_fn(|| queue.demand())
            .map(|b| b.len())
            .collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn zero_batch_size_falls_back_to_single_items() {
        let queue = WorkQueue::new();
        assert_eq!(queue.enqueue_chunked((0..3).map(|k| (k, ())), 0), 3);
    }

    #[test]
    fn batch_insert_reports_duplicate_keys() {
        let mut batch = WorkBatch::new();
        assert_eq!(batch.insert(5, 'x'), None);
        assert_eq!(batch.insert(5, 'y'), Some('x'));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.keys().collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn interrupt_outlives_clear_until_reset() {
        let queue = WorkQueue::new();
        queue.enqueue_chunked((0..5).map(|k| (k, k)), 1);
        queue.interrupt();
        assert!(queue.is_interrupted());
        assert!(queue.demand().is_none());
        assert!(queue.is_empty());

        queue.clear();
        assert!(queue.is_interrupted());
        queue.enqueue(WorkBatch::single(8, 8));
        assert!(queue.demand().is_none());

        queue.interrupt_handle().reset();
        queue.enqueue(WorkBatch::single(9, 9));
        assert!(queue.demand().is_some());
    }

    #[test]
    fn external_handle_stops_demand() {
        let queue = WorkQueue::new();
        let handle = queue.interrupt_handle();
        queue.enqueue_chunked((0..5).map(|k| (k, k)), 1);
        handle.interrupt();
        assert!(queue.demand().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn concurrent_demand_delivers_every_batch_exactly_once() {
        let queue = WorkQueue::new();
        queue.enqueue_chunked((0..1000).map(|k| (k, k)), 3);

        let delivered: Vec<JobKey> = thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        let mut keys = Vec::new();
                        while let Some(batch) = queue.demand() {
                            keys.extend(batch.keys());
                        }
                        keys
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        assert_eq!(delivered.len(), 1000);
        let unique: HashSet<_> = delivered.into_iter().collect();
        assert_eq!(unique.len(), 1000);
    }
}
