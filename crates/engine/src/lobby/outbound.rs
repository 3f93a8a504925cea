//! Per-session outbound queue.
//!
//! Producers (the registry, the dispatcher, the session's own reader) push
//! without blocking; the session's writer task is the only consumer. The
//! queue has a soft capacity: once it is reached, the oldest droppable entry
//! makes room for the new one. Control traffic is never discarded. If control
//! traffic alone piles up past [`HARD_LIMIT_FACTOR`] times the capacity the
//! queue is poisoned and the writer tears the session down as a slow consumer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

use gamelobby_shared::ServerMessage;

use super::session::SendError;

/// Multiple of the soft capacity at which a queue is declared overflowed.
pub const HARD_LIMIT_FACTOR: usize = 4;

/// What happened to a pushed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Appended without displacing anything
    Queued,
    /// Appended after discarding the oldest droppable entry
    Displaced,
    /// The message itself was droppable and the queue had no room for it
    Discarded,
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<Arc<ServerMessage>>,
    closed: bool,
    overflowed: bool,
    overflow_reported: bool,
    dropped: u64,
}

/// Everything the writer should do after one wake-up.
#[derive(Debug, Default)]
pub struct Drained {
    pub messages: Vec<Arc<ServerMessage>>,
    /// The queue is closed and `messages` is the final batch
    pub closed: bool,
    /// The queue overflowed since the last drain
    pub overflowed: bool,
}

pub struct OutboundQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A panicking producer cannot leave the deque half-updated.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue a message under the slow-consumer policy.
    pub fn push(&self, message: Arc<ServerMessage>) -> Result<PushOutcome, SendError> {
        let mut state = self.lock();
        if state.closed {
            return Err(SendError::Closed);
        }
        if state.overflowed {
            return Err(SendError::SlowConsumer);
        }

        let mut outcome = PushOutcome::Queued;
        if state.items.len() >= self.capacity {
            if let Some(index) = state.items.iter().position(|m| m.is_droppable()) {
                state.items.remove(index);
                state.dropped += 1;
                outcome = PushOutcome::Displaced;
            } else if message.is_droppable() {
                state.dropped += 1;
                return Ok(PushOutcome::Discarded);
            }
        }

        state.items.push_back(message);
        if state.items.len() > self.capacity * HARD_LIMIT_FACTOR {
            state.items.clear();
            state.overflowed = true;
            drop(state);
            self.notify.notify_one();
            return Err(SendError::SlowConsumer);
        }
        drop(state);
        self.notify.notify_one();
        Ok(outcome)
    }

    /// Enqueue the last message a closing session sends, bypassing the
    /// capacity policy and an overflow. Ignored once the queue is closed.
    pub fn push_final(&self, message: Arc<ServerMessage>) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.items.push_back(message);
        drop(state);
        self.notify.notify_one();
    }

    /// Stop accepting messages. Already queued messages are still drained.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of droppable messages discarded so far.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    /// Take everything currently queued.
    pub fn drain(&self) -> Drained {
        let mut state = self.lock();
        let overflowed = state.overflowed && !state.overflow_reported;
        if overflowed {
            state.overflow_reported = true;
        }
        Drained {
            messages: state.items.drain(..).collect(),
            closed: state.closed,
            overflowed,
        }
    }

    /// Wait until a producer pushes or the queue closes.
    ///
    /// A notification sent while nobody waits is kept, so a push between
    /// `drain` and this call is not lost.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamelobby_shared::{EventPayload, PlayerInfo};

    fn chat(seq: u64) -> Arc<ServerMessage> {
        Arc::new(ServerMessage::Event {
            room: "alpha".to_string(),
            seq,
            sender: PlayerInfo {
                player_id: "a".to_string(),
                display_name: "A".to_string(),
            },
            payload: EventPayload::Chat {
                body: format!("line {seq}"),
            },
        })
    }

    fn control() -> Arc<ServerMessage> {
        Arc::new(ServerMessage::LeaveAck)
    }

    fn sequences(drained: &Drained) -> Vec<Option<u64>> {
        drained.messages.iter().map(|m| m.sequence()).collect()
    }

    #[test]
    fn full_queue_drops_oldest_chat_first() {
        let queue = OutboundQueue::new(3);
        for seq in 0..3 {
            assert_eq!(queue.push(chat(seq)).expect("push"), PushOutcome::Queued);
        }
        assert_eq!(queue.push(chat(3)).expect("push"), PushOutcome::Displaced);
        assert_eq!(queue.dropped(), 1);

        let drained = queue.drain();
        assert_eq!(sequences(&drained), vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn control_messages_displace_chat_and_are_never_dropped() {
        let queue = OutboundQueue::new(2);
        queue.push(control()).expect("push");
        queue.push(chat(0)).expect("push");
        assert_eq!(queue.push(control()).expect("push"), PushOutcome::Displaced);
        assert_eq!(queue.push(chat(1)).expect("push"), PushOutcome::Discarded);

        let drained = queue.drain();
        assert_eq!(drained.messages.len(), 2);
        assert!(drained.messages.iter().all(|m| !m.is_droppable()));
    }

    #[test]
    fn control_backlog_past_hard_limit_poisons_queue() {
        let queue = OutboundQueue::new(2);
        for _ in 0..(2 * HARD_LIMIT_FACTOR) {
            queue.push(control()).expect("within hard limit");
        }
        let err = queue.push(control()).expect_err("past hard limit");
        assert_eq!(err, SendError::SlowConsumer);
        assert_eq!(queue.push(control()), Err(SendError::SlowConsumer));

        let drained = queue.drain();
        assert!(drained.overflowed);
        assert!(drained.messages.is_empty());
        assert!(!queue.drain().overflowed, "overflow is reported once");

        queue.push_final(control());
        assert_eq!(queue.drain().messages.len(), 1);
    }

    #[test]
    fn closed_queue_refuses_but_still_drains() {
        let queue = OutboundQueue::new(4);
        queue.push(control()).expect("push");
        queue.close();
        assert_eq!(queue.push(control()), Err(SendError::Closed));
        queue.push_final(control());

        let drained = queue.drain();
        assert!(drained.closed);
        assert_eq!(drained.messages.len(), 1);
    }

    #[tokio::test]
    async fn push_before_wait_is_not_lost() {
        let queue = OutboundQueue::new(4);
        queue.push(control()).expect("push");
        tokio::time::timeout(std::time::Duration::from_secs(1), queue.notified())
            .await
            .expect("stored notification");
    }
}
