use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use curve25519_dalek::traits::Identity;
use curve25519_dalek::RistrettoPoint;

use shielded_wallet::chain::{ChainTip, NodeGateway, RegistrationStatus};
use shielded_wallet::kernel::{KernelBody, KernelId};
use shielded_wallet::math_utils::ArithmeticMode;
use shielded_wallet::one_of_many::ProofConfig;
use shielded_wallet::shielded::output::ShieldedTxo;
use shielded_wallet::transaction::Transaction;
use shielded_wallet::core_types::{Height, TxoId};

use crate::common::{test_config, START_HEIGHT};

/// In-memory chain: validates what is registered and mines it into the next block
pub struct MockNode {
    pub height: Height,
    pool: Vec<(ShieldedTxo, RistrettoPoint)>,
    kernels: BTreeMap<[u8; 32], Height>,
    mempool: Vec<Transaction>,
    seen: BTreeSet<[u8; 32]>,
    spent_keys: BTreeSet<[u8; 32]>,
    asset_window: ProofConfig,
    mode: ArithmeticMode,
    /// reject every registration with this reason
    pub reject_with: Option<String>,
    pub registered: Vec<Transaction>,
}

impl MockNode {
    fn spends_are_valid(&self, tx: &Transaction) -> Result<(), String> {
        for kernel in &tx.kernels {
            let KernelBody::ShieldedInput { spend } = &kernel.body else {
                continue;
            };
            let header = &spend.header;
            let size = header.config.size();
            let end = header.window_end as usize;
            if end > self.pool.len() {
                return Err("spend window beyond the pool".into());
            }
            let start = end.saturating_sub(size);
            let mut elements = vec![RistrettoPoint::identity(); size - (end - start)];
            elements.extend(self.pool[start..end].iter().map(|(_, element)| *element));
            if !spend.verify(&elements, kernel.id().as_bytes(), &self.asset_window, self.mode) {
                return Err("invalid spend proof".into());
            }
            if self.spent_keys.contains(header.spend_pk.as_bytes()) {
                return Err("double spend".into());
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct SharedNode(Rc<RefCell<MockNode>>);

impl SharedNode {
    pub fn new() -> Self {
        let config = test_config();
        Self(Rc::new(RefCell::new(MockNode {
            height: START_HEIGHT,
            pool: Vec::new(),
            kernels: BTreeMap::new(),
            mempool: Vec::new(),
            seen: BTreeSet::new(),
            spent_keys: BTreeSet::new(),
            asset_window: config.shielded.asset_window,
            mode: config.arithmetic_mode,
            reject_with: None,
            registered: Vec::new(),
        })))
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut MockNode) -> T) -> T {
        f(&mut self.0.borrow_mut())
    }

    pub fn height(&self) -> Height {
        self.0.borrow().height
    }

    /// Put everything registered into a new block
    pub fn mine(&self) -> Height {
        let mut node = self.0.borrow_mut();
        node.height += 1;
        let height = node.height;
        for tx in std::mem::take(&mut node.mempool) {
            for kernel in &tx.kernels {
                node.kernels.insert(*kernel.id().as_bytes(), height);
                match &kernel.body {
                    KernelBody::ShieldedOutput { txo, .. } => {
                        let element = txo.pool_element().expect("pool element");
                        node.pool.push((txo.clone(), element));
                    }
                    KernelBody::ShieldedInput { spend } => {
                        node.spent_keys.insert(*spend.header.spend_pk.as_bytes());
                    }
                    KernelBody::Standard { .. } => {}
                }
            }
        }
        height
    }

    pub fn mine_blocks(&self, count: u64) {
        for _ in 0..count {
            self.mine();
        }
    }

    /// A shielded output from someone else, to grow the pool
    pub fn add_pool_output(&self, txo: ShieldedTxo) {
        let element = txo.pool_element().expect("pool element");
        self.0.borrow_mut().pool.push((txo, element));
    }

    pub fn pool_size(&self) -> usize {
        self.0.borrow().pool.len()
    }

    pub fn registered_count(&self) -> usize {
        self.0.borrow().registered.len()
    }
}

impl NodeGateway for SharedNode {
    fn tip(&self) -> ChainTip {
        let height = self.height();
        let mut hash = [0u8; 32];
        hash[..8].copy_from_slice(&height.to_le_bytes());
        ChainTip { height, hash }
    }

    fn shielded_output_count(&self) -> TxoId {
        self.pool_size() as TxoId
    }

    fn shielded_window(&self, start: TxoId, count: u32) -> Vec<RistrettoPoint> {
        let node = self.0.borrow();
        let start = (start as usize).min(node.pool.len());
        let end = (start + count as usize).min(node.pool.len());
        node.pool[start..end].iter().map(|(_, element)| *element).collect()
    }

    fn shielded_outputs(&self, start: TxoId) -> Vec<(TxoId, ShieldedTxo)> {
        let node = self.0.borrow();
        node.pool
            .iter()
            .enumerate()
            .skip(start as usize)
            .map(|(i, (txo, _))| (i as TxoId, txo.clone()))
            .collect()
    }

    fn kernel_proof(&self, kernel_id: &KernelId) -> Option<Height> {
        self.0.borrow().kernels.get(kernel_id.as_bytes()).copied()
    }

    fn register_transaction(&mut self, tx: &Transaction) -> RegistrationStatus {
        let mut node = self.0.borrow_mut();
        if let Some(reason) = &node.reject_with {
            return RegistrationStatus::Rejected(reason.clone());
        }
        let Some(key) = tx.kernels.first().map(|k| *k.id().as_bytes()) else {
            return RegistrationStatus::Rejected("no kernels".into());
        };
        if node.seen.contains(&key) {
            return RegistrationStatus::AlreadyRegistered;
        }
        if let Err(err) = tx.validate(node.height + 1, &node.asset_window, node.mode) {
            return RegistrationStatus::Rejected(err.to_string());
        }
        if let Err(reason) = node.spends_are_valid(tx) {
            return RegistrationStatus::Rejected(reason);
        }
        node.seen.insert(key);
        node.mempool.push(tx.clone());
        node.registered.push(tx.clone());
        RegistrationStatus::Accepted
    }
}
