//! Live per-client profiles.
//!
//! A [`ProfileInstance`] owns an immutable [`ProfileSnapshot`] (the three-layer
//! cascade plus caches derived from it) behind an `Arc` that is swapped
//! whole on every rebuild. Readers clone the `Arc` and finish against it, so
//! they see either the complete old snapshot or the complete new one.
//!
//! Session state that does not depend on settings, such as the running
//! transcode, lives outside the snapshot and survives rebuilds.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use mediacast_common::{DeviceIdentity, Result};
use mediacast_settings::{Cascade, FromSetting, SettingValue, SettingsStore};

use crate::models::RendererModel;
use crate::registry::DeviceRegistry;

pub const MIME_TYPES_CHANGES_KEY: &str = "MimeTypesChanges";
pub const DLNA_PROFILE_CHANGES_KEY: &str = "DLNAProfileChanges";

/// Shared collaborators every profile rebuild needs.
#[derive(Debug)]
pub struct ProfileContext {
    pub registry: Arc<DeviceRegistry>,
    /// Outermost layer for every cascade.
    pub global: Arc<SettingsStore>,
    pub log_overrides: bool,
}

impl ProfileContext {
    pub fn new(registry: Arc<DeviceRegistry>, global: Arc<SettingsStore>) -> Self {
        Self {
            registry,
            global,
            log_overrides: false,
        }
    }
}

/// Lifecycle state as observed from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileState {
    /// Created but never bound.
    Unbound,
    /// Bound, known only by address.
    Placeholder,
    /// Bound, stable id known.
    Confirmed,
    /// A rebuild is in progress; `confirmed` is the level it returns to.
    Rebuilding { confirmed: bool },
}

/// Handle to the transcode currently serving this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeSession {
    pub source: String,
    pub pid: Option<u32>,
    pub started_at: Instant,
}

impl TranscodeSession {
    pub fn new(source: impl Into<String>, pid: Option<u32>) -> Self {
        Self {
            source: source.into(),
            pid,
            started_at: Instant::now(),
        }
    }
}

/// One complete, immutable view of a client's resolved settings.
#[derive(Debug)]
pub struct ProfileSnapshot {
    generation: u64,
    cascade: Cascade,
    reference: Option<String>,
    mime_changes: OnceLock<HashMap<String, String>>,
    dlna_profile_changes: OnceLock<HashMap<String, String>>,
}

impl ProfileSnapshot {
    fn new(generation: u64, cascade: Cascade, reference: Option<String>) -> Self {
        Self {
            generation,
            cascade,
            reference,
            mime_changes: OnceLock::new(),
            dlna_profile_changes: OnceLock::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cascade(&self) -> &Cascade {
        &self.cascade
    }

    /// The device (innermost) layer.
    pub fn device_store(&self) -> &Arc<SettingsStore> {
        self.cascade.innermost()
    }

    /// The device file backing the innermost layer, if any.
    pub fn device_file(&self) -> Option<&Path> {
        self.device_store().path()
    }

    /// Name of the renderer model bound as the middle layer.
    pub fn reference_name(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    /// Whether the device layer is backed by a real file.
    pub fn is_customized(&self) -> bool {
        self.device_store().is_file_backed()
    }

    pub fn resolve<T: FromSetting>(&self, key: &str, default: T) -> T {
        self.cascade.resolve(key, default)
    }

    /// The MIME type to advertise in place of `mime`.
    pub fn mime_type(&self, mime: &str) -> String {
        let changes = self.mime_changes.get_or_init(|| {
            parse_changes(&self.cascade.get_string(MIME_TYPES_CHANGES_KEY, ""), str::to_lowercase)
        });
        changes
            .get(&mime.to_lowercase())
            .cloned()
            .unwrap_or_else(|| mime.to_string())
    }

    /// The DLNA profile name to advertise in place of `profile`.
    pub fn dlna_profile(&self, profile: &str) -> String {
        let changes = self.dlna_profile_changes.get_or_init(|| {
            parse_changes(&self.cascade.get_string(DLNA_PROFILE_CHANGES_KEY, ""), str::to_uppercase)
        });
        changes
            .get(&profile.to_uppercase())
            .cloned()
            .unwrap_or_else(|| profile.to_string())
    }
}

/// Parse `old=new|old=new` pairs, normalizing both sides with `norm`.
fn parse_changes(raw: &str, norm: fn(&str) -> String) -> HashMap<String, String> {
    raw.split('|')
        .filter_map(|pair| pair.split_once('='))
        .map(|(old, new)| (norm(old.trim()), norm(new.trim())))
        .filter(|(old, _)| !old.is_empty())
        .collect()
}

/// The live profile bound to one connected client.
#[derive(Debug)]
pub struct ProfileInstance {
    ctx: Arc<ProfileContext>,
    identity: RwLock<DeviceIdentity>,
    reference: RwLock<Option<RendererModel>>,
    snapshot: RwLock<Arc<ProfileSnapshot>>,
    /// Serializes rebuilds so snapshots publish in generation order.
    rebuild_lock: Mutex<()>,
    generation: AtomicU64,
    bound: AtomicBool,
    rebuilding: AtomicBool,
    transcode: Mutex<Option<TranscodeSession>>,
}

impl ProfileInstance {
    /// A new, unbound instance. Reads resolve against global defaults only
    /// until [`bind`](Self::bind) is called.
    pub fn new(identity: DeviceIdentity, ctx: Arc<ProfileContext>) -> Arc<Self> {
        let initial = Self::build_snapshot(&ctx, 0, Arc::new(SettingsStore::empty()), None);
        Arc::new(Self {
            ctx,
            identity: RwLock::new(identity),
            reference: RwLock::new(None),
            snapshot: RwLock::new(Arc::new(initial)),
            rebuild_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            bound: AtomicBool::new(false),
            rebuilding: AtomicBool::new(false),
            transcode: Mutex::new(None),
        })
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.identity.read().clone()
    }

    pub fn reference(&self) -> Option<RendererModel> {
        self.reference.read().clone()
    }

    pub fn state(&self) -> ProfileState {
        if !self.bound.load(Ordering::Acquire) {
            return ProfileState::Unbound;
        }
        let confirmed = self.identity.read().is_confirmed();
        if self.rebuilding.load(Ordering::Acquire) {
            ProfileState::Rebuilding { confirmed }
        } else if confirmed {
            ProfileState::Confirmed
        } else {
            ProfileState::Placeholder
        }
    }

    /// Whether the stable identifier has been learned.
    pub fn is_confirmed(&self) -> bool {
        self.identity.read().is_confirmed()
    }

    /// The current snapshot. Holding it pins a consistent view.
    pub fn snapshot(&self) -> Arc<ProfileSnapshot> {
        self.snapshot.read().clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Bind (or rebind) to `reference` as the middle layer and rebuild.
    pub fn bind(&self, reference: Option<RendererModel>) {
        *self.reference.write() = reference;
        self.rebuild();
    }

    /// Re-resolve the device store for the current identity and swap in a
    /// fresh snapshot. Derived caches are discarded; the transcode session is kept.
    pub fn rebuild(&self) {
        let _guard = self.rebuild_lock.lock();
        self.rebuilding.store(true, Ordering::Release);

        let identity = self.identity();
        let reference = self.reference();
        let device = self.ctx.registry.lookup(&identity).unwrap_or_else(|| {
            // Writes to a client without a device file live only in memory;
            // keep them rather than starting over.
            let current = self.snapshot.read().device_store().clone();
            if current.is_file_backed() {
                Arc::new(SettingsStore::empty())
            } else {
                current
            }
        });
        let generation = self.generation.load(Ordering::Acquire) + 1;
        let snapshot = Self::build_snapshot(&self.ctx, generation, device, reference.as_ref());

        tracing::debug!(
            device = %identity,
            generation,
            customized = snapshot.is_customized(),
            reference = snapshot.reference_name().unwrap_or("-"),
            "Rebuilt profile"
        );

        *self.snapshot.write() = Arc::new(snapshot);
        self.generation.store(generation, Ordering::Release);
        self.bound.store(true, Ordering::Release);
        self.rebuilding.store(false, Ordering::Release);
    }

    fn build_snapshot(
        ctx: &ProfileContext,
        generation: u64,
        device: Arc<SettingsStore>,
        reference: Option<&RendererModel>,
    ) -> ProfileSnapshot {
        let middle = reference
            .map(|m| m.store.clone())
            .unwrap_or_else(|| Arc::new(SettingsStore::empty().into_read_only()));
        let mut cascade = Cascade::three_layer(device, middle, ctx.global.clone());
        if ctx.log_overrides {
            cascade = cascade.with_override_logging();
        }
        ProfileSnapshot::new(generation, cascade, reference.map(|m| m.name.clone()))
    }

    /// Learn the client's stable identifier.
    ///
    /// Returns `true` if the identity changed. The first call moves a
    /// placeholder to confirmed; the address, if known, is cross-referenced
    /// so later lookups by either name find the same store.
    pub fn set_identity(&self, stable_id: &str) -> bool {
        let stable_id = stable_id.trim();
        if stable_id.is_empty() {
            return false;
        }

        let (previous, address) = {
            let mut identity = self.identity.write();
            if identity.stable_id.as_deref() == Some(stable_id) {
                return false;
            }
            let previous = identity.stable_id.replace(stable_id.to_string());
            (previous, identity.address.clone())
        };

        if let Some(ref addr) = address {
            self.ctx.registry.cross_reference(stable_id, addr);
        }

        match previous {
            None => tracing::info!(device = stable_id, address = address.as_deref().unwrap_or("-"), "Device identified"),
            Some(ref old) => tracing::info!(device = stable_id, previous = %old, "Device identity changed"),
        }

        self.rebuild();
        true
    }

    /// Check that the bound device file still exists.
    ///
    /// If it has been deleted, the file's registrations are removed, the
    /// profile rebuilds onto defaults, and `false` is returned.
    pub fn is_valid(&self) -> bool {
        let snapshot = self.snapshot();
        let Some(path) = snapshot.device_file().map(Path::to_path_buf) else {
            return true;
        };
        if path.exists() {
            return true;
        }

        tracing::info!(device = %self.identity(), path = %path.display(), "Device file deleted; reverting to defaults");
        self.ctx.registry.remove_file(&path);
        self.rebuild();
        false
    }

    /// Whether the device layer is backed by a real file.
    pub fn is_customized(&self) -> bool {
        self.snapshot().is_customized()
    }

    pub fn device_file(&self) -> Option<PathBuf> {
        self.snapshot().device_file().map(Path::to_path_buf)
    }

    /// Whether this instance answers to any identifier in `ids`, directly or
    /// through the stable id its address is cross-referenced to, or is
    /// bound to `path`.
    pub fn is_affected_by(&self, ids: impl IntoIterator<Item = String>, path: &Path) -> bool {
        let ids: Vec<String> = ids.into_iter().collect();
        let identity = self.identity();
        if identity.matches_any(ids.iter()) || self.snapshot().device_file() == Some(path) {
            return true;
        }
        identity
            .address
            .as_deref()
            .and_then(|addr| self.ctx.registry.stable_id_for(addr))
            .is_some_and(|id| ids.contains(&id))
    }

    pub fn resolve<T: FromSetting>(&self, key: &str, default: T) -> T {
        self.snapshot().resolve(key, default)
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.snapshot().cascade().get_string(key, default)
    }

    pub fn get_int(&self, key: &str, default: i32) -> i32 {
        self.snapshot().cascade().get_int(key, default)
    }

    pub fn get_long(&self, key: &str, default: i64) -> i64 {
        self.snapshot().cascade().get_long(key, default)
    }

    pub fn get_double(&self, key: &str, default: f64) -> f64 {
        self.snapshot().cascade().get_double(key, default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.snapshot().cascade().get_bool(key, default)
    }

    pub fn get_string_list(&self, key: &str, default: &[&str]) -> Vec<String> {
        self.snapshot().cascade().get_string_list(key, default)
    }

    /// Write to the device layer of the current snapshot.
    pub fn write(&self, key: &str, value: impl Into<SettingValue>) -> Result<()> {
        self.snapshot().cascade().write(key, value)
    }

    pub fn set_transcode(&self, session: TranscodeSession) -> Option<TranscodeSession> {
        self.transcode.lock().replace(session)
    }

    pub fn transcode(&self) -> Option<TranscodeSession> {
        self.transcode.lock().clone()
    }

    pub fn take_transcode(&self) -> Option<TranscodeSession> {
        self.transcode.lock().take()
    }
}
