use crossbeam::queue::SegQueue;

/// Pool reusing same-typed allocations up to a fixed cap.
///
/// `get` hands back a recycled object when one is queued, otherwise builds
/// a fresh one. `release` recycles while the queue is under the cap and
/// frees the object otherwise. Memory given back may be handed to another
/// caller before it is freed, so callers must not touch an object after
/// releasing it.
pub struct ObjectPool<T> {
    reuse: SegQueue<Box<T>>,
    reuse_limit: usize,
    build: fn() -> Box<T>,
}

impl<T> ObjectPool<T> {
    pub fn new(reuse_limit: usize, build: fn() -> Box<T>) -> Self {
        ObjectPool {
            reuse: SegQueue::new(),
            reuse_limit,
            build,
        }
    }

    pub fn get(&self) -> Box<T> {
        match self.reuse.pop() {
            Some(obj) => obj,
            None => (self.build)(),
        }
    }

    pub fn release(&self, obj: Box<T>) {
        if self.reuse.len() < self.reuse_limit {
            self.reuse.push(obj);
        }
    }
}
