//! 重放日志 - 无法立即投递的消息的有序记录
//! Replay Log - the ordered record of messages that could not be delivered right away
//!
//! 日志只追加、先进先出。刷新不会移除条目：日志是跨通道化身的至少一次记录。
//! 保留策略由 `ReplayConfig` 约束。
//!
//! The log is append-only and FIFO. A flush does not remove entries: the log is
//! an at-least-once record across channel incarnations. Retention is bounded by
//! `ReplayConfig`.

use crate::{
    config::ReplayConfig,
    error::{Error, Result},
    exchange::Message,
};
use std::collections::VecDeque;
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// The one-shot handle a caller awaits for a message's outcome.
/// 调用者等待消息结果所用的一次性句柄。
pub type OutcomeHandle = oneshot::Sender<Result<()>>;

/// A single recorded message.
///
/// 一条已记录的消息。
#[derive(Debug)]
pub struct PendingEntry {
    id: u64,
    message: Message,
    /// Present until the first flush that processes the entry settles it.
    /// 在第一次处理该条目的刷新将其结算之前一直存在。
    outcome: Option<OutcomeHandle>,
    flushes: u32,
}

impl PendingEntry {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Whether a caller is still waiting on this entry.
    pub fn is_awaited(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn flushes(&self) -> u32 {
        self.flushes
    }

    /// Sent at least once and nobody is waiting on it.
    fn is_evictable(&self) -> bool {
        self.flushes > 0 && !self.is_awaited()
    }
}

/// A message on its way to the channel, together with the handle to settle
/// once the channel answers.
///
/// 正在发往通道的消息，以及通道应答后需要结算的句柄。
#[derive(Debug)]
pub struct Delivery {
    pub message: Message,
    pub outcome: Option<OutcomeHandle>,
    /// The replay-log entry this delivery replays, if any.
    pub entry: Option<u64>,
}

impl Delivery {
    /// A message sent straight to the channel, bypassing the log.
    pub fn direct(message: Message, outcome: OutcomeHandle) -> Self {
        Self {
            message,
            outcome: Some(outcome),
            entry: None,
        }
    }

    /// Settles the caller's handle. A caller that stopped waiting is ignored.
    /// 结算调用者的句柄。已不再等待的调用者会被忽略。
    pub fn settle(self, result: Result<()>) {
        if let Some(outcome) = self.outcome {
            let _ = outcome.send(result);
        }
    }
}

/// 重放日志
/// Replay log
#[derive(Debug)]
pub struct ReplayLog {
    entries: VecDeque<PendingEntry>,
    next_id: u64,
    config: ReplayConfig,
}

impl ReplayLog {
    pub fn new(config: ReplayConfig) -> Self {
        Self {
            entries: VecDeque::new(),
            next_id: 1,
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingEntry> {
        self.entries.iter()
    }

    /// Number of entries whose caller is still waiting.
    /// 调用者仍在等待的条目数量。
    pub fn awaited(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_awaited()).count()
    }

    /// Appends a message at the tail of the log and returns its entry id.
    /// 在日志尾部追加一条消息并返回其条目 ID。
    pub fn append(&mut self, message: Message, outcome: Option<OutcomeHandle>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push_back(PendingEntry {
            id,
            message,
            outcome,
            flushes: 0,
        });
        trace!(entry = id, entries = self.entries.len(), "Replay entry appended");
        self.enforce_capacity();
        id
    }

    /// Produces the deliveries for one flush, in FIFO order.
    ///
    /// Every entry takes part. Outcome handles move into the deliveries, so
    /// each caller is answered by the first flush only. Entries that reached
    /// `max_flushes_per_entry` with this flush are pruned afterwards.
    ///
    /// 生成一次刷新的投递列表，按先进先出顺序。
    ///
    /// 每个条目都会参与。结果句柄会移入投递中，因此每个调用者只由第一次刷新应答。
    /// 本次刷新后达到 `max_flushes_per_entry` 的条目随后会被清除。
    pub fn flush(&mut self) -> Vec<Delivery> {
        let max_flushes = self.config.max_flushes_per_entry.max(1);
        let deliveries: Vec<Delivery> = self
            .entries
            .iter_mut()
            .map(|entry| {
                entry.flushes += 1;
                Delivery {
                    message: entry.message.clone(),
                    outcome: entry.outcome.take(),
                    entry: Some(entry.id),
                }
            })
            .collect();

        let before = self.entries.len();
        self.entries.retain(|entry| entry.flushes < max_flushes);
        let pruned = before - self.entries.len();
        if pruned > 0 {
            debug!(pruned, remaining = self.entries.len(), "Pruned fully replayed entries");
        }

        deliveries
    }

    /// Answers every waiting caller with `error` while keeping the entries for
    /// a later rebuild.
    ///
    /// 以 `error` 应答所有等待中的调用者，但保留条目以便之后重建时重放。
    pub fn fail_awaited(&mut self, error: &Error) -> usize {
        let mut failed = 0;
        for entry in self.entries.iter_mut() {
            if let Some(outcome) = entry.outcome.take() {
                let _ = outcome.send(Err(error.clone()));
                failed += 1;
            }
        }
        failed
    }

    /// Evicts the oldest settled entries while above `max_entries`.
    ///
    /// Only entries that went out at least once and have no waiting caller
    /// qualify.
    fn enforce_capacity(&mut self) {
        while self.entries.len() > self.config.max_entries {
            match self.entries.iter().position(PendingEntry::is_evictable) {
                Some(index) => {
                    if let Some(evicted) = self.entries.remove(index) {
                        debug!(entry = evicted.id, "Evicted settled replay entry over capacity");
                    }
                }
                // Nothing left that was already sent and settled.
                None => break,
            }
        }
    }
}
