//! Per-task mailboxes and the messages exchanged between the tasks.
//!
//! Every long-lived task owns one bounded mailbox. Blocking sends give up
//! after [`SEND_TIMEOUT_MS`]; the non-blocking variant is meant for the tick
//! source and drops instead of waiting. Messages from one sender to one
//! receiver arrive in send order.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, with_timeout};
use portable_atomic::{AtomicU32, Ordering};

use crate::commissioning::AdvanceUnit;
use crate::config::{MAILBOX_DEPTH, SEND_TIMEOUT_MS};
use crate::gps::UtcFix;
use crate::logging::warn;
use crate::state::PersistentState;
use crate::status::StatusCounters;
use crate::timezone::LocalTime;

pub const TASK_COUNT: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskId {
    Gps,
    Timekeep,
    Display,
    Power,
}

impl TaskId {
    /// Tasks that own mutable state and must be quiesced before a power-down flush.
    pub const STATE_OWNERS: [TaskId; 2] = [TaskId::Gps, TaskId::Timekeep];

    const fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LockState {
    /// No fix seen since boot.
    Uninitialized,
    /// No usable fix (or no data at all) for a while.
    Lost,
    Locked,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Press {
    Short,
    Long,
    VeryLong,
}

/// Reply to [`Message::Shutdown`]. The state owner hands over its snapshot so
/// the supervisor can flush it without touching the owner's copy.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Quiescent {
    pub task: TaskId,
    pub state: Option<PersistentState>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Message {
    SecondTick(i64),
    GpsFix(UtcFix),
    LockState(LockState),
    LocalTime(LocalTime),
    Status(StatusCounters),
    StartCommissioning,
    StopCommissioning,
    SlaveAdvance(AdvanceUnit),
    ButtonPress(Press),
    Shutdown,
    Suspended(Quiescent),
    /// The supervisor flushed the snapshot; payload is the new save count.
    Checkpointed(u32),
    Resume,
    RefreshDisplay,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// Non-blocking send found the mailbox full.
    Full,
    /// Blocking send did not find room within the send timeout.
    Timeout,
}

pub type MailboxType = Channel<CriticalSectionRawMutex, Message, MAILBOX_DEPTH>;

pub struct Bus {
    mailboxes: [MailboxType; TASK_COUNT],
    dropped: AtomicU32,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub const fn new() -> Self {
        Self {
            mailboxes: [const { Channel::new() }; TASK_COUNT],
            dropped: AtomicU32::new(0),
        }
    }

    fn mailbox(&self, dst: TaskId) -> &MailboxType {
        &self.mailboxes[dst.index()]
    }

    fn record_drop(&self, dst: TaskId, msg: &Message) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        warn!("Mailbox {:?} full, dropped {:?}", dst, msg);
    }

    /// Send, waiting up to the send timeout for room in the mailbox.
    pub async fn send(&self, dst: TaskId, msg: Message) -> Result<(), BusError> {
        let timeout = Duration::from_millis(SEND_TIMEOUT_MS);
        match with_timeout(timeout, self.mailbox(dst).send(msg)).await {
            Ok(()) => Ok(()),
            Err(_) => {
                self.record_drop(dst, &msg);
                Err(BusError::Timeout)
            }
        }
    }

    /// Send without waiting. Safe to call from the tick source.
    pub fn try_send(&self, dst: TaskId, msg: Message) -> Result<(), BusError> {
        self.mailbox(dst).try_send(msg).map_err(|_| {
            self.record_drop(dst, &msg);
            BusError::Full
        })
    }

    /// Wait for the next message. A timeout is not an error, it just yields `None`.
    pub async fn receive(&self, dst: TaskId, timeout: Duration) -> Option<Message> {
        with_timeout(timeout, self.mailbox(dst).receive()).await.ok()
    }

    pub fn try_receive(&self, dst: TaskId) -> Option<Message> {
        self.mailbox(dst).try_receive().ok()
    }

    /// Total number of messages dropped on full mailboxes since boot.
    pub fn dropped_messages(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_time::Instant;

    #[test_log::test]
    fn delivers_in_send_order() {
        let bus = Bus::new();
        bus.try_send(TaskId::Timekeep, Message::SecondTick(1)).unwrap();
        bus.try_send(TaskId::Timekeep, Message::SecondTick(2)).unwrap();
        bus.try_send(TaskId::Timekeep, Message::Shutdown).unwrap();

        assert_eq!(bus.try_receive(TaskId::Timekeep), Some(Message::SecondTick(1)));
        assert_eq!(bus.try_receive(TaskId::Timekeep), Some(Message::SecondTick(2)));
        assert_eq!(bus.try_receive(TaskId::Timekeep), Some(Message::Shutdown));
        assert_eq!(bus.try_receive(TaskId::Timekeep), None);
    }

    #[test_log::test]
    fn mailboxes_are_per_destination() {
        let bus = Bus::new();
        bus.try_send(TaskId::Display, Message::RefreshDisplay).unwrap();

        assert_eq!(bus.try_receive(TaskId::Timekeep), None);
        assert_eq!(bus.try_receive(TaskId::Display), Some(Message::RefreshDisplay));
    }

    #[test_log::test]
    fn try_send_drops_when_full() {
        let bus = Bus::new();
        for utc in 0..MAILBOX_DEPTH as i64 {
            bus.try_send(TaskId::Timekeep, Message::SecondTick(utc)).unwrap();
        }

        assert_eq!(
            bus.try_send(TaskId::Timekeep, Message::SecondTick(99)),
            Err(BusError::Full)
        );
        assert_eq!(bus.dropped_messages(), 1);
        // The queued messages are untouched
        assert_eq!(bus.try_receive(TaskId::Timekeep), Some(Message::SecondTick(0)));
    }

    #[test_log::test]
    fn blocking_send_times_out_when_full() {
        let bus = Bus::new();
        for _ in 0..MAILBOX_DEPTH {
            bus.try_send(TaskId::Power, Message::Resume).unwrap();
        }

        let start = Instant::now();
        let result = block_on(bus.send(TaskId::Power, Message::Shutdown));

        assert_eq!(result, Err(BusError::Timeout));
        assert!(start.elapsed() >= Duration::from_millis(SEND_TIMEOUT_MS));
        assert_eq!(bus.dropped_messages(), 1);
    }

    #[test_log::test]
    fn receive_timeout_yields_none() {
        let bus = Bus::new();
        let received = block_on(bus.receive(TaskId::Gps, Duration::from_millis(10)));
        assert_eq!(received, None);
    }
}
