use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use shielded_wallet::core_types::PeerId;
use shielded_wallet::peer::{PeerChannel, PeerMessage};

/// One queue shared by every wallet of a test; messages are delivered by the test
#[derive(Clone, Default)]
pub struct Mailbox(Rc<RefCell<VecDeque<(PeerId, PeerMessage)>>>);

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pop(&self) -> Option<(PeerId, PeerMessage)> {
        self.0.borrow_mut().pop_front()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Drop everything in flight
    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl PeerChannel for Mailbox {
    fn send(&mut self, to: &PeerId, message: PeerMessage) {
        self.0.borrow_mut().push_back((*to, message));
    }
}
