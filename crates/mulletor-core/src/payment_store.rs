//! ============================================================================
//! Payment Store - Transient payment context between invoice and payment
//! ============================================================================
//! Telegram round-trips the invoice payload verbatim, so a short random id
//! is the only correlation key between "invoice sent" and "payment
//! confirmed". This store parks the photo reference under that id until the
//! payment lands or the entry goes stale.
//! ============================================================================

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::RngCore;

use crate::types::PaymentContext;

/// Entries older than this are dropped by the cleanup sweep (1 hour)
const MAX_AGE_SECS: i64 = 3600;

/// Random bytes in a payment id; 8 bytes hex-encoded is unguessable enough
/// to gate a paid action and short enough for an invoice payload
const PAYMENT_ID_BYTES: usize = 8;

/// Time source, injected so tests can age entries without sleeping
pub trait Clock: Send + Sync {
    /// Current unix timestamp in seconds
    fn now(&self) -> i64;
}

/// Wall-clock time
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// In-memory store for payment contexts, shared across handler tasks.
///
/// All access goes through one mutex; updates never interleave with reads.
pub struct PaymentStore {
    entries: Mutex<HashMap<String, PaymentContext>>,
    clock: Arc<dyn Clock>,
}

impl PaymentStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Generate a unique payment id (16 hex chars)
    pub fn generate_id() -> String {
        let mut bytes = [0u8; PAYMENT_ID_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Store a payment context and return its freshly minted id
    pub fn store(&self, file_id: &str, message_id: Option<i64>, chat_id: i64) -> String {
        let payment_id = Self::generate_id();
        let context = PaymentContext {
            file_id: file_id.to_string(),
            message_id,
            chat_id,
            created_at: self.clock.now(),
        };

        self.entries
            .lock()
            .expect("payment store lock poisoned")
            .insert(payment_id.clone(), context);

        payment_id
    }

    /// Look up a payment context without consuming it
    pub fn retrieve(&self, payment_id: &str) -> Option<PaymentContext> {
        self.entries
            .lock()
            .expect("payment store lock poisoned")
            .get(payment_id)
            .cloned()
    }

    /// Remove a payment context; removing an unknown id is a no-op
    pub fn remove(&self, payment_id: &str) {
        self.entries
            .lock()
            .expect("payment store lock poisoned")
            .remove(payment_id);
    }

    /// Drop every entry older than one hour, returning how many were
    /// removed. The count is taken under the lock so concurrent stores
    /// cannot skew it.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock().expect("payment store lock poisoned");
        let before = entries.len();
        entries.retain(|_, context| now - context.created_at <= MAX_AGE_SECS);
        before - entries.len()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("payment store lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct ManualClock {
        now: AtomicI64,
    }

    impl ManualClock {
        fn new(start: i64) -> Self {
            Self {
                now: AtomicI64::new(start),
            }
        }

        fn advance(&self, secs: i64) {
            self.now.fetch_add(secs, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> i64 {
            self.now.load(Ordering::SeqCst)
        }
    }

    fn store_with_clock(start: i64) -> (PaymentStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start));
        (PaymentStore::new(clock.clone()), clock)
    }

    #[test]
    fn test_store_then_retrieve_round_trip() {
        let (store, _clock) = store_with_clock(1_000);

        let id = store.store("file-abc", Some(42), 777);
        let context = store.retrieve(&id).expect("context should be present");

        assert_eq!(context.file_id, "file-abc");
        assert_eq!(context.message_id, Some(42));
        assert_eq!(context.chat_id, 777);
        assert_eq!(context.created_at, 1_000);
    }

    #[test]
    fn test_retrieve_does_not_consume() {
        let (store, _clock) = store_with_clock(0);
        let id = store.store("file-abc", None, 1);

        assert!(store.retrieve(&id).is_some());
        assert!(store.retrieve(&id).is_some());
    }

    #[test]
    fn test_retrieve_after_remove_is_none() {
        let (store, _clock) = store_with_clock(0);
        let id = store.store("file-abc", None, 1);

        store.remove(&id);
        assert!(store.retrieve(&id).is_none());

        // removing again is a no-op
        store.remove(&id);
    }

    #[test]
    fn test_retrieve_unknown_id_is_none() {
        let (store, _clock) = store_with_clock(0);
        assert!(store.retrieve("deadbeefdeadbeef").is_none());
    }

    #[test]
    fn test_generated_ids_are_hex_and_unique() {
        let id = PaymentStore::generate_id();
        assert_eq!(id.len(), PAYMENT_ID_BYTES * 2);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

        let other = PaymentStore::generate_id();
        assert_ne!(id, other);
    }

    #[test]
    fn test_cleanup_removes_exactly_the_stale_entries() {
        let (store, clock) = store_with_clock(0);

        let old = store.store("old", None, 1);
        clock.advance(1_800);
        let middle = store.store("middle", None, 2);
        clock.advance(1_801); // old is now 3601s, middle 1801s
        let fresh = store.store("fresh", None, 3);

        assert_eq!(store.cleanup(), 1);

        assert!(store.retrieve(&old).is_none());
        assert!(store.retrieve(&middle).is_some());
        assert!(store.retrieve(&fresh).is_some());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_cleanup_counts_only_what_it_removed() {
        let (store, clock) = store_with_clock(0);

        store.store("stale-1", None, 1);
        store.store("stale-2", None, 2);
        clock.advance(MAX_AGE_SECS + 1);

        // entries arriving right before the sweep must not skew the count
        store.store("fresh", None, 3);

        assert_eq!(store.cleanup(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.cleanup(), 0, "second sweep removes nothing");
    }

    #[test]
    fn test_cleanup_keeps_entry_exactly_at_the_boundary() {
        let (store, clock) = store_with_clock(0);
        let id = store.store("boundary", None, 1);

        clock.advance(MAX_AGE_SECS);
        store.cleanup();
        assert!(store.retrieve(&id).is_some(), "age == 3600 is not stale yet");

        clock.advance(1);
        store.cleanup();
        assert!(store.retrieve(&id).is_none());
    }

    #[test]
    fn test_cleanup_on_empty_store_does_not_panic() {
        let (store, _clock) = store_with_clock(0);
        store.cleanup();
        assert!(store.is_empty());
    }
}
