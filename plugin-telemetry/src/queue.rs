//! The async queue shared by plugin event pumps, service sub-queues, and
//! telemetry consumers.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::Stream;
use tokio::sync::Notify;

use crate::sync::Mutex;

/// An unbounded FIFO with urgent-front insertion and cooperative stop.
///
/// Each queue has one logical reader. Non-urgent items preserve FIFO order;
/// an item inserted with [`push_first`](AsyncQueue::push_first) is dequeued
/// before every item already queued. After [`stop`](AsyncQueue::stop), reads
/// observe end-of-stream and further pushes are silently ignored.
#[derive(Debug)]
pub struct AsyncQueue<T> {
    state: Mutex<State<T>>,
    notify: Notify,
}

#[derive(Debug)]
struct State<T> {
    items: VecDeque<T>,
    stopped: bool,
}

impl<T> Default for AsyncQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AsyncQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                stopped: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Appends an item. Ignored after [`stop`](AsyncQueue::stop).
    pub fn push(&self, item: T) {
        {
            let mut state = self.state.lock();
            if state.stopped {
                return;
            }
            state.items.push_back(item);
        }
        self.notify.notify_one();
    }

    /// Prepends an item, jumping ahead of everything already queued.
    /// Ignored after [`stop`](AsyncQueue::stop).
    pub fn push_first(&self, item: T) {
        {
            let mut state = self.state.lock();
            if state.stopped {
                return;
            }
            state.items.push_front(item);
        }
        self.notify.notify_one();
    }

    /// Current queue depth.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Ends the stream. Idempotent; wakes a blocked reader, discards anything
    /// still queued, and turns later pushes into no-ops.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            state.stopped = true;
            state.items.clear();
        }
        self.notify.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    /// Awaits the next item; `None` once the queue is stopped.
    pub async fn recv(&self) -> Option<T> {
        loop {
            {
                let mut state = self.state.lock();
                if state.stopped {
                    return None;
                }
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
            }
            self.notify.notified().await;
        }
    }
}

impl<T: Send + 'static> AsyncQueue<T> {
    /// The queue as a [`Stream`], ending when the queue is stopped.
    pub fn into_stream(self: Arc<Self>) -> impl Stream<Item = T> {
        futures::stream::unfold(self, |queue| async move {
            queue.recv().await.map(|item| (item, queue))
        })
    }
}
