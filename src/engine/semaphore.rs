use std::collections::VecDeque;
use std::hint::spin_loop;

use parking_lot::Mutex;

use super::spin::AtomicSemaphore;
use super::StageQueue;
use crate::catalog::Item;

/// Entry in a polled lane. `Shutdown` tells exactly one worker to exit.
#[derive(Debug)]
enum Ticket {
    Work(Item),
    Shutdown,
}

/// Stage queues arbitrated by one counting semaphore per stage.
///
/// Workers never sleep: `dequeue_next` polls the semaphores from the most
/// advanced stage down and spins until one yields a permit.
#[derive(Debug, Default)]
pub struct PollingSemaphoreQueue {
    /// Indexed by `Stage::queue_slot`.
    lanes: [Mutex<VecDeque<Ticket>>; 3],
    available: [AtomicSemaphore; 3],
}

const FINAL_LANE: usize = 2;

impl PollingSemaphoreQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, slot: usize, ticket: Ticket) {
        let mut lane = self.lanes[slot].lock();
        lane.push_back(ticket);
        // Posting under the lane lock keeps permits in ticket order, so every
        // posted ticket is claimed before any later one.
        self.available[slot].post();
    }

    fn try_take(&self) -> Option<Ticket> {
        (0..3).rev().find_map(|slot| {
            if !self.available[slot].try_acquire() {
                return None;
            }
            // A permit is only posted after its ticket is pushed, so the lane
            // cannot be empty here.
            let ticket = self.lanes[slot].lock().pop_front();
            debug_assert!(ticket.is_some(), "permit without ticket in lane {slot}");
            ticket
        })
    }
}

impl StageQueue for PollingSemaphoreQueue {
    fn enqueue(&self, item: Item) {
        let Some(slot) = item.stage().queue_slot() else {
            panic!("finished item {} enqueued", item.id());
        };
        self.push(slot, Ticket::Work(item));
    }

    fn dequeue_next(&self) -> Option<Item> {
        loop {
            match self.try_take() {
                Some(Ticket::Work(item)) => return Some(item),
                Some(Ticket::Shutdown) => return None,
                None => spin_loop(),
            }
        }
    }

    fn shutdown(&self, workers: usize) {
        for _ in 0..workers {
            self.push(FINAL_LANE, Ticket::Shutdown);
        }
    }

    fn len(&self) -> usize {
        self.lanes
            .iter()
            .map(|lane| {
                lane.lock()
                    .iter()
                    .filter(|t| matches!(t, Ticket::Work(_)))
                    .count()
            })
            .sum()
    }
}
