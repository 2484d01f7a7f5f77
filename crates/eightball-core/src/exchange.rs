//! Request/response correlation for the Central role
//!
//! Every question a Central sends opens an exchange. An exchange is closed
//! exactly once: by an answer, a rejection, a failed write, a disconnect, a
//! timeout or shutdown. Closing removes it from the book, so a late answer or
//! a duplicate completion can never produce a second outcome.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::types::{DeviceId, ExchangeId, WriteToken};

// ----------------------------------------------------------------------------
// Pending Exchange
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangePhase {
    /// The question write has not been acknowledged yet
    Sending,
    /// The write completed; waiting for the answer
    AwaitingAnswer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingExchange {
    pub id: ExchangeId,
    pub device: DeviceId,
    pub question: String,
    pub token: WriteToken,
    pub phase: ExchangePhase,
    pub started: Instant,
}

impl PendingExchange {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }
}

// ----------------------------------------------------------------------------
// Exchange Book
// ----------------------------------------------------------------------------

/// Open exchanges, ordered by id
#[derive(Debug, Default)]
pub struct ExchangeBook {
    next_id: u64,
    pending: BTreeMap<ExchangeId, PendingExchange>,
}

impl ExchangeBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an exchange for a question about to be written with `token`
    pub fn open(&mut self, device: DeviceId, question: &str, token: WriteToken) -> ExchangeId {
        self.open_at(device, question, token, Instant::now())
    }

    pub fn open_at(
        &mut self,
        device: DeviceId,
        question: &str,
        token: WriteToken,
        now: Instant,
    ) -> ExchangeId {
        self.next_id += 1;
        let id = ExchangeId::new(self.next_id);
        self.pending.insert(
            id,
            PendingExchange {
                id,
                device,
                question: question.to_string(),
                token,
                phase: ExchangePhase::Sending,
                started: now,
            },
        );
        id
    }

    fn find_by_token(&self, token: WriteToken) -> Option<ExchangeId> {
        self.pending
            .values()
            .find(|exchange| exchange.token == token)
            .map(|exchange| exchange.id)
    }

    /// The question write completed; returns false if the exchange already closed
    pub fn mark_written(&mut self, token: WriteToken) -> bool {
        match self.find_by_token(token) {
            Some(id) => {
                if let Some(exchange) = self.pending.get_mut(&id) {
                    exchange.phase = ExchangePhase::AwaitingAnswer;
                }
                true
            }
            None => false,
        }
    }

    /// The question write failed; closes the exchange
    pub fn write_failed(&mut self, token: WriteToken) -> Option<PendingExchange> {
        let id = self.find_by_token(token)?;
        self.pending.remove(&id)
    }

    /// An answer arrived; closes the exchange
    pub fn complete(&mut self, exchange: ExchangeId) -> Option<PendingExchange> {
        self.pending.remove(&exchange)
    }

    /// The peripheral declined; closes the exchange
    pub fn reject(&mut self, exchange: ExchangeId) -> Option<PendingExchange> {
        self.pending.remove(&exchange)
    }

    /// Close every exchange with `device`
    pub fn fail_device(&mut self, device: &DeviceId) -> Vec<PendingExchange> {
        self.remove_where(|exchange| exchange.device == *device)
    }

    /// Close every exchange older than `timeout`
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<PendingExchange> {
        self.remove_where(|exchange| exchange.age(now) >= timeout)
    }

    /// Close everything
    pub fn drain(&mut self) -> Vec<PendingExchange> {
        std::mem::take(&mut self.pending).into_values().collect()
    }

    fn remove_where<F>(&mut self, predicate: F) -> Vec<PendingExchange>
    where
        F: Fn(&PendingExchange) -> bool,
    {
        let ids: Vec<ExchangeId> = self
            .pending
            .values()
            .filter(|exchange| predicate(exchange))
            .map(|exchange| exchange.id)
            .collect();
        ids.iter()
            .filter_map(|id| self.pending.remove(id))
            .collect()
    }

    pub fn get(&self, exchange: &ExchangeId) -> Option<&PendingExchange> {
        self.pending.get(exchange)
    }

    /// Open exchanges with `device`
    pub fn pending_for(&self, device: &DeviceId) -> usize {
        self.pending
            .values()
            .filter(|exchange| exchange.device == *device)
            .count()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_closes_exactly_once() {
        let mut book = ExchangeBook::new();
        let device = DeviceId::random();
        let id = book.open(device, "Q?", WriteToken::new(1));

        assert!(book.mark_written(WriteToken::new(1)));
        assert_eq!(book.get(&id).unwrap().phase, ExchangePhase::AwaitingAnswer);
        assert!(book.complete(id).is_some());
        assert!(book.complete(id).is_none());
        assert!(book.reject(id).is_none());
        assert!(!book.mark_written(WriteToken::new(1)));
    }

    #[test]
    fn test_answer_before_write_ack() {
        let mut book = ExchangeBook::new();
        let id = book.open(DeviceId::random(), "Q?", WriteToken::new(5));
        let closed = book.complete(id).unwrap();
        assert_eq!(closed.phase, ExchangePhase::Sending);
        assert!(!book.mark_written(WriteToken::new(5)));
        assert!(book.write_failed(WriteToken::new(5)).is_none());
    }

    #[test]
    fn test_fail_device_only_touches_that_device() {
        let mut book = ExchangeBook::new();
        let a = DeviceId::random();
        let b = DeviceId::random();
        book.open(a, "1", WriteToken::new(1));
        book.open(b, "2", WriteToken::new(2));
        book.open(a, "3", WriteToken::new(3));

        let failed = book.fail_device(&a);
        assert_eq!(failed.len(), 2);
        assert_eq!(failed[0].question, "1");
        assert_eq!(book.pending_for(&b), 1);
    }

    #[test]
    fn test_expire_uses_age() {
        let mut book = ExchangeBook::new();
        let start = Instant::now();
        book.open_at(DeviceId::random(), "old", WriteToken::new(1), start);
        book.open_at(
            DeviceId::random(),
            "new",
            WriteToken::new(2),
            start + Duration::from_secs(20),
        );

        let expired = book.expire(start + Duration::from_secs(30), Duration::from_secs(30));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].question, "old");
        assert_eq!(book.drain().len(), 1);
        assert!(book.is_empty());
    }
}
