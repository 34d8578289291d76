use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use super::StageQueue;
use crate::catalog::Item;

#[derive(Debug, Default)]
struct Queues {
    /// Indexed by `Stage::queue_slot`.
    lanes: [VecDeque<Item>; 3],
    closed: bool,
}

impl Queues {
    fn pop_most_advanced(&mut self) -> Option<Item> {
        self.lanes.iter_mut().rev().find_map(VecDeque::pop_front)
    }

    fn len(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }
}

/// Stage queues behind one mutex; idle workers sleep on a condition variable.
#[derive(Debug, Default)]
pub struct BlockingPriorityQueue {
    queues: Mutex<Queues>,
    not_empty: Condvar,
}

impl BlockingPriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StageQueue for BlockingPriorityQueue {
    fn enqueue(&self, item: Item) {
        let Some(slot) = item.stage().queue_slot() else {
            panic!("finished item {} enqueued", item.id());
        };
        let mut queues = self.queues.lock();
        queues.lanes[slot].push_back(item);
        self.not_empty.notify_one();
    }

    fn dequeue_next(&self) -> Option<Item> {
        let mut queues = self.queues.lock();
        loop {
            if let Some(item) = queues.pop_most_advanced() {
                return Some(item);
            }
            if queues.closed {
                return None;
            }
            self.not_empty.wait(&mut queues);
        }
    }

    fn shutdown(&self, _workers: usize) {
        self.queues.lock().closed = true;
        self.not_empty.notify_all();
    }

    fn len(&self) -> usize {
        self.queues.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::catalog::Stage;

    fn item_at(id: usize, stage: Stage) -> Item {
        let mut item = Item::new(id, 1);
        while item.stage() < stage {
            item.advance();
        }
        item
    }

    #[test]
    fn most_advanced_stage_is_served_first() {
        let queue = BlockingPriorityQueue::new();
        queue.enqueue(item_at(0, Stage::Pending));
        queue.enqueue(item_at(1, Stage::Pending));
        queue.enqueue(item_at(2, Stage::Stage1Done));
        queue.enqueue(item_at(3, Stage::Stage2Done));

        let order: Vec<usize> = (0..4).map(|_| queue.dequeue_next().unwrap().id()).collect();
        assert_eq!(order, vec![3, 2, 0, 1]);
    }

    #[test]
    fn fifo_within_a_stage() {
        let queue = BlockingPriorityQueue::new();
        for id in 0..5 {
            queue.enqueue(item_at(id, Stage::Stage1Done));
        }
        let order: Vec<usize> = (0..5).map(|_| queue.dequeue_next().unwrap().id()).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn blocked_worker_wakes_on_enqueue() {
        let queue = Arc::new(BlockingPriorityQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.dequeue_next().map(|item| item.id()))
        };
        thread::sleep(Duration::from_millis(20));
        queue.enqueue(item_at(7, Stage::Pending));
        assert_eq!(consumer.join().unwrap(), Some(7));
    }

    #[test]
    fn shutdown_releases_every_waiter() {
        let queue = Arc::new(BlockingPriorityQueue::new());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.dequeue_next().is_none())
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        queue.shutdown(4);
        for w in waiters {
            assert!(w.join().unwrap());
        }
    }

    #[test]
    fn shutdown_still_drains_remaining_items() {
        let queue = BlockingPriorityQueue::new();
        queue.enqueue(item_at(1, Stage::Pending));
        queue.shutdown(1);
        assert_eq!(queue.dequeue_next().map(|i| i.id()), Some(1));
        assert!(queue.dequeue_next().is_none());
    }

    #[test]
    fn concurrent_producers_and_consumers_lose_nothing() {
        let queue = Arc::new(BlockingPriorityQueue::new());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..250 {
                        queue.enqueue(item_at(p * 250 + i, Stage::Pending));
                    }
                })
            })
            .collect();
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let mut ids = Vec::new();
                    while let Some(item) = queue.dequeue_next() {
                        ids.push(item.id());
                    }
                    ids
                })
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }
        while !queue.is_empty() {
            thread::yield_now();
        }
        queue.shutdown(4);

        let mut ids: Vec<usize> = consumers.into_iter().flat_map(|c| c.join().unwrap()).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..1000).collect::<Vec<_>>());
    }
}
