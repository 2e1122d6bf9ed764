//! ActiveSessions - admission control for connect events
//!
//! A slot is claimed before a session is created and released when its
//! controller finishes (the slot is dropped with the controller).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use contracts::{ContractError, DeviceId, SupervisionConfig};
use observability::record_active_sessions;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct ActiveState {
    per_device: HashMap<DeviceId, usize>,
    total: usize,
}

/// Index of devices that currently have a running controller
#[derive(Debug, Clone)]
pub struct ActiveSessions {
    state: Arc<Mutex<ActiveState>>,
    idle: Arc<Notify>,
    reject_duplicates: bool,
    max_active: Option<usize>,
}

impl ActiveSessions {
    pub fn new(config: &SupervisionConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(ActiveState::default())),
            idle: Arc::new(Notify::new()),
            reject_duplicates: config.reject_duplicate_connect,
            max_active: config.max_active_sessions,
        }
    }

    /// Claim a slot for `device_id`.
    ///
    /// # Errors
    /// - `DuplicateSession` when duplicates are rejected and the device is
    ///   already active
    /// - `CapacityExceeded` when the active session limit is reached
    pub fn try_claim(&self, device_id: DeviceId) -> Result<SessionSlot, ContractError> {
        let mut state = self.lock();

        if self.reject_duplicates && state.per_device.contains_key(&device_id) {
            return Err(ContractError::DuplicateSession {
                device_id: device_id.to_string(),
            });
        }
        if let Some(limit) = self.max_active {
            if state.total >= limit {
                return Err(ContractError::CapacityExceeded { limit });
            }
        }

        *state.per_device.entry(device_id).or_insert(0) += 1;
        state.total += 1;
        record_active_sessions(state.total);

        Ok(SessionSlot {
            owner: self.clone(),
            device_id,
        })
    }

    /// Sessions currently holding a slot
    pub fn len(&self) -> usize {
        self.lock().total
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, device_id: &DeviceId) -> bool {
        self.lock().per_device.contains_key(device_id)
    }

    /// Wait until no slot is held.
    ///
    /// Returns `false` if sessions are still active after `timeout`.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let drained = async {
            loop {
                let notified = self.idle.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if self.is_empty() {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, drained).await.is_ok()
    }

    fn release(&self, device_id: DeviceId) {
        let mut state = self.lock();
        if let Some(count) = state.per_device.get_mut(&device_id) {
            *count -= 1;
            if *count == 0 {
                state.per_device.remove(&device_id);
            }
            state.total -= 1;
        }
        record_active_sessions(state.total);
        if state.total == 0 {
            self.idle.notify_waiters();
        }
    }

    fn lock(&self) -> MutexGuard<'_, ActiveState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ActiveSessions {
    fn default() -> Self {
        Self::new(&SupervisionConfig::default())
    }
}

/// Claimed admission slot, released on drop
#[derive(Debug)]
pub struct SessionSlot {
    owner: ActiveSessions,
    device_id: DeviceId,
}

impl SessionSlot {
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.owner.release(self.device_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervision(reject_duplicate_connect: bool, max_active_sessions: Option<usize>) -> SupervisionConfig {
        SupervisionConfig {
            reject_duplicate_connect,
            max_active_sessions,
            ..SupervisionConfig::default()
        }
    }

    #[test]
    fn test_duplicate_rejected_until_released() {
        let active = ActiveSessions::default();
        let device = DeviceId::random();

        let slot = active.try_claim(device).unwrap();
        assert!(active.contains(&device));
        assert!(matches!(
            active.try_claim(device),
            Err(ContractError::DuplicateSession { .. })
        ));

        drop(slot);
        assert!(active.is_empty());
        assert!(active.try_claim(device).is_ok());
    }

    #[test]
    fn test_duplicates_allowed_when_configured() {
        let active = ActiveSessions::new(&supervision(false, None));
        let device = DeviceId::random();

        let first = active.try_claim(device).unwrap();
        let second = active.try_claim(device).unwrap();
        assert_eq!(active.len(), 2);

        drop(first);
        assert!(active.contains(&device));
        drop(second);
        assert!(!active.contains(&device));
    }

    #[test]
    fn test_capacity_limit() {
        let active = ActiveSessions::new(&supervision(true, Some(2)));
        let _a = active.try_claim(DeviceId::random()).unwrap();
        let b = active.try_claim(DeviceId::random()).unwrap();

        assert!(matches!(
            active.try_claim(DeviceId::random()),
            Err(ContractError::CapacityExceeded { limit: 2 })
        ));

        drop(b);
        assert!(active.try_claim(DeviceId::random()).is_ok());
    }

    #[tokio::test]
    async fn test_wait_idle_wakes_on_last_release() {
        let active = ActiveSessions::new(&supervision(false, None));
        let first = active.try_claim(DeviceId::random()).unwrap();
        let second = active.try_claim(DeviceId::random()).unwrap();

        let waiter = {
            let active = active.clone();
            tokio::spawn(async move { active.wait_idle(Duration::from_secs(60)).await })
        };
        tokio::task::yield_now().await;

        drop(first);
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(second);
        let idle = tokio::time::timeout(Duration::from_secs(5), waiter).await;
        assert!(idle.unwrap().unwrap());
    }

    #[tokio::test]
    async fn test_wait_idle_times_out_while_held() {
        let active = ActiveSessions::default();
        let _slot = active.try_claim(DeviceId::random()).unwrap();

        assert!(!active.wait_idle(Duration::from_millis(20)).await);
        assert!(ActiveSessions::default().wait_idle(Duration::ZERO).await);
    }

    #[test]
    fn test_clones_share_state() {
        let active = ActiveSessions::default();
        let other = active.clone();
        let device = DeviceId::random();

        let _slot = active.try_claim(device).unwrap();
        assert!(other.contains(&device));
    }
}
