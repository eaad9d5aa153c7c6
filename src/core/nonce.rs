//! Nonce 管理模块
//!
//! Per-account nonce reservation and send serialization.
//!
//! The chain's transaction count is always re-read before a reservation; the
//! local counter only covers transactions built but not yet mined.

use ethers::types::Address;
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::core::errors::WorkflowError;

#[derive(Debug, Default)]
pub struct NonceManager {
    next: Mutex<HashMap<Address, u64>>,
    send_locks: Mutex<HashMap<Address, Arc<AsyncMutex<()>>>>,
}

impl NonceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next nonce for `address` given the chain's current count.
    ///
    /// # Errors
    /// 返回`WorkflowError::Nonce`如果nonce溢出
    pub fn reserve(&self, address: Address, on_chain: u64) -> Result<u64, WorkflowError> {
        let mut tracker = self.next.lock();
        let entry = tracker.entry(address).or_insert(on_chain);
        let nonce = (*entry).max(on_chain);
        *entry = nonce
            .checked_add(1)
            .ok_or_else(|| WorkflowError::Nonce(format!("nonce overflow for {:?}", address)))?;
        debug!(address = ?address, on_chain, nonce, "Reserved nonce");
        Ok(nonce)
    }

    /// Give back `nonce` when its transaction never reached the chain.
    ///
    /// Only the most recent reservation can be returned; earlier ones would
    /// leave a gap behind later transactions.
    pub fn release(&self, address: Address, nonce: u64) -> bool {
        let mut tracker = self.next.lock();
        match tracker.get_mut(&address) {
            Some(next) if nonce.checked_add(1) == Some(*next) => {
                *next = nonce;
                info!(address = ?address, nonce, "Released nonce");
                true
            }
            _ => false,
        }
    }

    /// Forget local state for `address`; the next reservation follows the chain.
    pub fn reset(&self, address: Address) {
        info!(address = ?address, "Resetting nonce");
        self.next.lock().remove(&address);
    }

    /// Next nonce that would be handed out, if the account has been seen.
    pub fn peek(&self, address: Address) -> Option<u64> {
        self.next.lock().get(&address).copied()
    }

    /// Exclusive send slot for `address`. Hold it across build, sign and submit.
    pub async fn lock_account(&self, address: Address) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.send_locks.lock();
            locks.entry(address).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    #[test]
    fn test_reserve_first_time_follows_chain() {
        let manager = NonceManager::new();
        assert_eq!(manager.reserve(addr(1), 3).unwrap(), 3);
    }

    #[test]
    fn test_reserve_sequential() {
        let manager = NonceManager::new();
        let n1 = manager.reserve(addr(1), 3).unwrap();
        let n2 = manager.reserve(addr(1), 3).unwrap();
        let n3 = manager.reserve(addr(1), 3).unwrap();
        assert_eq!((n1, n2, n3), (3, 4, 5));
    }

    #[test]
    fn test_chain_ahead_of_local() {
        let manager = NonceManager::new();
        manager.reserve(addr(1), 0).unwrap();
        // transactions sent from elsewhere moved the chain forward
        assert_eq!(manager.reserve(addr(1), 7).unwrap(), 7);
    }

    #[test]
    fn test_different_addresses_independent() {
        let manager = NonceManager::new();
        assert_eq!(manager.reserve(addr(0xaa), 0).unwrap(), 0);
        assert_eq!(manager.reserve(addr(0xbb), 0).unwrap(), 0);
    }

    #[test]
    fn test_release_latest_only() {
        let manager = NonceManager::new();
        let n0 = manager.reserve(addr(1), 0).unwrap();
        let n1 = manager.reserve(addr(1), 0).unwrap();
        assert!(!manager.release(addr(1), n0));
        assert!(manager.release(addr(1), n1));
        assert_eq!(manager.reserve(addr(1), 0).unwrap(), 1);
    }

    #[test]
    fn test_overflow() {
        let manager = NonceManager::new();
        let err = manager.reserve(addr(1), u64::MAX).unwrap_err();
        assert!(matches!(err, WorkflowError::Nonce(_)));
    }

    #[test]
    fn test_reset() {
        let manager = NonceManager::new();
        manager.reserve(addr(9), 5).unwrap();
        manager.reset(addr(9));
        assert_eq!(manager.peek(addr(9)), None);
        assert_eq!(manager.reserve(addr(9), 2).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reserve_concurrent_same_address() {
        let manager = Arc::new(NonceManager::new());
        let mut handles = vec![];
        for _ in 0..10 {
            let m = manager.clone();
            handles.push(tokio::spawn(async move { m.reserve(addr(2), 0).unwrap() }));
        }
        let mut nonces = vec![];
        for handle in handles {
            nonces.push(handle.await.unwrap());
        }
        nonces.sort();
        assert_eq!(nonces, (0..10).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_lock_account_serializes() {
        let manager = Arc::new(NonceManager::new());
        let guard = manager.lock_account(addr(3)).await;

        let m = manager.clone();
        let waiter = tokio::spawn(async move {
            let _g = m.lock_account(addr(3)).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        // other accounts are not blocked
        let _other = manager.lock_account(addr(4)).await;

        drop(guard);
        waiter.await.unwrap();
    }
}
