use std::collections::{BTreeSet, VecDeque};

use thiserror::Error;
use tracing::trace;

use crate::core_types::TxHandle;

use super::*;

/// A transaction already has a request of this kind outstanding
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("{kind:?} already pending for {handle:?}")]
pub struct DuplicateRequest {
    pub handle: TxHandle,
    pub kind: MethodKind,
}

/// A finished key keeper request, routed back to the transaction that issued it
#[derive(Debug)]
pub struct Completion {
    pub handle: TxHandle,
    pub kind: MethodKind,
    pub result: Result<Response>,
}

/// Asynchronous front of a [`KeyKeeper`].
///
/// Requests are queued and answered one at a time by [`poll`](Self::poll), so a transaction
/// always observes its own request completing on a later step. A transaction can have at most
/// one request of each kind in flight.
#[derive(Debug)]
pub struct KeyKeeperQueue<K> {
    keeper: K,
    pending: VecDeque<(TxHandle, Method)>,
    in_flight: BTreeSet<(TxHandle, MethodKind)>,
}

impl<K: KeyKeeper> KeyKeeperQueue<K> {
    pub fn new(keeper: K) -> Self {
        Self { keeper, pending: VecDeque::new(), in_flight: BTreeSet::new() }
    }

    pub fn submit(&mut self, handle: TxHandle, method: Method) -> core::result::Result<(), DuplicateRequest> {
        let kind = method.kind();
        if !self.in_flight.insert((handle, kind)) {
            return Err(DuplicateRequest { handle, kind });
        }
        trace!(?handle, ?kind, "key keeper request queued");
        self.pending.push_back((handle, method));
        Ok(())
    }

    #[cfg(test)]
    fn is_pending(&self, handle: TxHandle, kind: MethodKind) -> bool {
        self.in_flight.contains(&(handle, kind))
    }

    /// Whether a transaction is waiting on any request
    pub fn has_pending(&self, handle: TxHandle) -> bool {
        self.in_flight.range((handle, MethodKind::GetIdentity)..).next().is_some_and(|(h, _)| *h == handle)
    }

    /// Drop everything a transaction still has queued
    pub fn cancel(&mut self, handle: TxHandle) {
        self.pending.retain(|(h, _)| *h != handle);
        self.in_flight.retain(|(h, _)| *h != handle);
    }

    /// Answer the oldest request
    pub fn poll(&mut self) -> Option<Completion> {
        let (handle, method) = self.pending.pop_front()?;
        let kind = method.kind();
        self.in_flight.remove(&(handle, kind));
        let result = self.keeper.handle(method);
        Some(Completion { handle, kind, result })
    }

    pub fn keeper(&self) -> &K {
        &self.keeper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl KeyKeeper for Echo {
        fn handle(&mut self, method: Method) -> Result<Response> {
            match method {
                Method::AllocateNonceSlot => Ok(Response::NonceSlot(NonceSlot { index: 7, id: [7u8; 32] })),
                _ => Err(KeyKeeperError::Unspecified),
            }
        }
    }

    #[test]
    fn duplicate_requests_are_refused_until_answered() {
        let mut queue = KeyKeeperQueue::new(Echo);
        let h = TxHandle(1);
        queue.submit(h, Method::AllocateNonceSlot).expect("first");
        assert_eq!(
            queue.submit(h, Method::AllocateNonceSlot),
            Err(DuplicateRequest { handle: h, kind: MethodKind::AllocateNonceSlot })
        );
        queue.submit(TxHandle(2), Method::AllocateNonceSlot).expect("other tx");

        let done = queue.poll().expect("completion");
        assert_eq!(done.handle, h);
        assert!(matches!(done.result, Ok(Response::NonceSlot(NonceSlot { index: 7, .. }))));
        assert!(!queue.is_pending(h, MethodKind::AllocateNonceSlot));
        queue.submit(h, Method::AllocateNonceSlot).expect("resubmit");
    }

    #[test]
    fn cancel_drops_queued_requests() {
        let mut queue = KeyKeeperQueue::new(Echo);
        queue.submit(TxHandle(1), Method::AllocateNonceSlot).expect("queued");
        queue.submit(TxHandle(1), Method::GetIdentity { index: 0 }).expect("queued");
        queue.cancel(TxHandle(1));
        assert!(!queue.has_pending(TxHandle(1)));
        assert!(queue.poll().is_none());
    }
}
