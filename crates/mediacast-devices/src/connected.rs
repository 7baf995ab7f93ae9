//! Live profile instances, keyed by the address their client connected from.

use std::sync::{Arc, Weak};

use dashmap::DashMap;

use mediacast_common::DeviceIdentity;

use crate::models::RendererModel;
use crate::profile::{ProfileContext, ProfileInstance};
use crate::registry::FileChange;

/// Table of connected clients.
///
/// Entries are weak: the session layer owns each [`ProfileInstance`], and
/// once the last strong handle drops the entry is dead and gets pruned.
#[derive(Debug)]
pub struct ConnectedProfiles {
    ctx: Arc<ProfileContext>,
    by_address: DashMap<String, Weak<ProfileInstance>>,
}

impl ConnectedProfiles {
    pub fn new(ctx: Arc<ProfileContext>) -> Self {
        Self {
            ctx,
            by_address: DashMap::new(),
        }
    }

    pub fn context(&self) -> &Arc<ProfileContext> {
        &self.ctx
    }

    /// The profile for a client at `address`, creating a placeholder on first contact.
    ///
    /// If `model` is given and the existing profile has no reference model
    /// yet, or `model` outranks it, the profile is re-bound to `model`.
    pub fn on_device_seen(&self, address: &str, model: Option<RendererModel>) -> Arc<ProfileInstance> {
        let address = address.trim();
        let mut created = false;

        let instance = {
            let mut slot = self.by_address.entry(address.to_string()).or_default();
            match slot.upgrade() {
                Some(existing) => existing,
                None => {
                    let fresh = ProfileInstance::new(DeviceIdentity::from_address(address), self.ctx.clone());
                    *slot = Arc::downgrade(&fresh);
                    created = true;
                    fresh
                }
            }
        };

        if created {
            tracing::debug!(address, model = model.as_ref().map(|m| m.name.as_str()).unwrap_or("-"), "New client");
            instance.bind(model);
        } else if let Some(model) = model {
            let current = instance.reference();
            if model.outranks(current.as_ref()) {
                tracing::info!(
                    address,
                    model = %model.name,
                    previous = current.as_ref().map(|m| m.name.as_str()).unwrap_or("-"),
                    "Re-binding client to renderer model"
                );
                instance.bind(Some(model));
            }
        }

        instance
    }

    /// The protocol layer reported a stable identifier for `instance`.
    pub fn on_device_identified(&self, instance: &Arc<ProfileInstance>, stable_id: &str) -> bool {
        instance.set_identity(stable_id)
    }

    /// Rebuild every live profile touched by `change`. Returns how many rebuilt.
    pub fn rebuild_affected(&self, change: &FileChange) -> usize {
        let affected = change.affected();
        let mut rebuilt = 0;
        for instance in self.live() {
            if instance.is_affected_by(affected.iter().cloned(), &change.path) {
                instance.rebuild();
                rebuilt += 1;
            }
        }
        if rebuilt > 0 {
            tracing::info!(path = %change.path.display(), rebuilt, "Rebuilt profiles after device file change");
        }
        rebuilt
    }

    /// Forget the client at `address`. Existing handles keep working.
    pub fn disconnect(&self, address: &str) -> bool {
        let removed = self.by_address.remove(address.trim()).is_some();
        if removed {
            tracing::debug!(address, "Client disconnected");
        }
        removed
    }

    /// Drop entries whose profile has been released.
    pub fn prune(&self) -> usize {
        let before = self.by_address.len();
        self.by_address.retain(|_, weak| weak.strong_count() > 0);
        before - self.by_address.len()
    }

    /// Every profile still alive.
    pub fn live(&self) -> Vec<Arc<ProfileInstance>> {
        self.by_address.iter().filter_map(|e| e.value().upgrade()).collect()
    }

    /// The live profile for `address`, if any.
    pub fn find(&self, address: &str) -> Option<Arc<ProfileInstance>> {
        self.by_address.get(address.trim()).and_then(|w| w.upgrade())
    }

    /// The live profile known by `stable_id`, if any.
    pub fn find_by_stable_id(&self, stable_id: &str) -> Option<Arc<ProfileInstance>> {
        self.live()
            .into_iter()
            .find(|p| p.identity().stable_id.as_deref() == Some(stable_id))
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}
