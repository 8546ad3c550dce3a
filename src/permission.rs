//! Permission oracle contract.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use uuid::Uuid;

/// Answers permission questions about a player.
///
/// Returns `None` when the player is not reachable (offline), which every
/// caller treats as a denial.
pub trait PermissionOracle: Send + Sync {
    fn has_permission(&self, player: Uuid, permission: &str) -> Option<bool>;
}

/// Every reachable player holds every permission.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl PermissionOracle for AllowAll {
    fn has_permission(&self, _player: Uuid, _permission: &str) -> Option<bool> {
        Some(true)
    }
}

/// Every player is reachable and holds nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

impl PermissionOracle for DenyAll {
    fn has_permission(&self, _player: Uuid, _permission: &str) -> Option<bool> {
        Some(false)
    }
}

/// Explicit grants for online players; players never marked online are unreachable.
#[derive(Debug, Default)]
pub struct PermissionTable {
    online: RwLock<HashMap<Uuid, HashSet<String>>>,
}

impl PermissionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_online(&self, player: Uuid) {
        let mut online = self.online.write().unwrap_or_else(|e| e.into_inner());
        online.entry(player).or_default();
    }

    pub fn set_offline(&self, player: Uuid) {
        let mut online = self.online.write().unwrap_or_else(|e| e.into_inner());
        online.remove(&player);
    }

    /// Grant a permission, marking the player online.
    pub fn grant(&self, player: Uuid, permission: &str) {
        let mut online = self.online.write().unwrap_or_else(|e| e.into_inner());
        online.entry(player).or_default().insert(permission.to_string());
    }
}

impl PermissionOracle for PermissionTable {
    fn has_permission(&self, player: Uuid, permission: &str) -> Option<bool> {
        let online = self.online.read().unwrap_or_else(|e| e.into_inner());
        online.get(&player).map(|grants| grants.contains(permission))
    }
}
