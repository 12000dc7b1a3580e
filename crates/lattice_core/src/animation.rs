//! # Avatar Animation State
//!
//! Each avatar plays exactly one default animation (stand, fly, sit, ...)
//! plus any number of secondary animations layered on top.
//!
//! ## Locking
//!
//! The default slot is published through an `ArcSwap` and read without
//! locking, so a default change never contends with a secondary add. Writers
//! of the default serialize on their own mutex. Operations that write both
//! take the secondary lock first.
//!
//! ## Catalog
//!
//! Animation names resolve through an [`AnimationCatalog`] built once at
//! startup and shared by reference; there is no global name table.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use lattice_shared::GlobalId;
use parking_lot::Mutex;
use serde::Deserialize;

use crate::error::{SceneError, SceneResult};

/// Catalog name of the idle pose.
pub const STAND: &str = "STAND";
/// Catalog name of the seated pose.
pub const SIT: &str = "SIT";
/// Catalog name of the ground-sit pose.
pub const SIT_GROUND_CONSTRAINED: &str = "SIT_GROUND_CONSTRAINED";

/// One playing animation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Animation {
    /// Animation asset.
    pub anim_id: GlobalId,
    /// Client-side ordering number.
    pub sequence: i32,
    /// Object that started the animation, or zero for the avatar itself.
    pub object_id: GlobalId,
}

impl Animation {
    /// Creates an animation record.
    #[must_use]
    pub const fn new(anim_id: GlobalId, sequence: i32, object_id: GlobalId) -> Self {
        Self {
            anim_id,
            sequence,
            object_id,
        }
    }
}

/// Parallel arrays describing an [`AnimationSet`], default first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnimationArrays {
    /// Animation assets.
    pub anim_ids: Vec<GlobalId>,
    /// Sequence numbers.
    pub sequences: Vec<i32>,
    /// Originating objects.
    pub object_ids: Vec<GlobalId>,
}

/// Per-avatar animation state.
#[derive(Debug)]
pub struct AnimationSet {
    idle: GlobalId,
    default_animation: ArcSwap<Animation>,
    /// Serializes compare-and-replace of the default slot.
    default_writer: Mutex<()>,
    secondary: Mutex<Vec<Animation>>,
}

impl AnimationSet {
    /// Creates a set playing the catalog's idle pose.
    #[must_use]
    pub fn new(catalog: &AnimationCatalog) -> Self {
        Self::with_idle(catalog.idle())
    }

    /// Creates a set whose default resets to `idle`.
    #[must_use]
    pub fn with_idle(idle: GlobalId) -> Self {
        Self {
            idle,
            default_animation: ArcSwap::from_pointee(Self::idle_animation(idle)),
            default_writer: Mutex::new(()),
            secondary: Mutex::new(Vec::new()),
        }
    }

    fn idle_animation(idle: GlobalId) -> Animation {
        Animation::new(idle, 1, GlobalId::ZERO)
    }

    fn store_default(&self, animation: Animation) {
        self.default_animation.store(Arc::new(animation));
    }

    /// Current default animation.
    #[inline]
    #[must_use]
    pub fn default_animation(&self) -> Animation {
        **self.default_animation.load()
    }

    /// Checks the default slot, then the secondary list.
    #[must_use]
    pub fn has_animation(&self, anim_id: GlobalId) -> bool {
        let secondary = self.secondary.lock();
        self.has_animation_locked(&secondary, anim_id)
    }

    fn has_animation_locked(&self, secondary: &[Animation], anim_id: GlobalId) -> bool {
        self.default_animation().anim_id == anim_id
            || secondary.iter().any(|anim| anim.anim_id == anim_id)
    }

    /// Adds a secondary animation unless it is already playing in either slot.
    pub fn add(&self, anim_id: GlobalId, sequence: i32, object_id: GlobalId) -> bool {
        let mut secondary = self.secondary.lock();
        if self.has_animation_locked(&secondary, anim_id) {
            return false;
        }
        secondary.push(Animation::new(anim_id, sequence, object_id));
        true
    }

    /// Replaces the default animation. Returns false if it is already `anim_id`.
    pub fn set_default(&self, anim_id: GlobalId, sequence: i32, object_id: GlobalId) -> bool {
        let _writer = self.default_writer.lock();
        if self.default_animation().anim_id == anim_id {
            return false;
        }
        self.store_default(Animation::new(anim_id, sequence, object_id));
        true
    }

    /// Sets the default by catalog name.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::UnknownAnimation`] if the catalog has no such name.
    pub fn try_set_default(
        &self,
        name: &str,
        sequence: i32,
        object_id: GlobalId,
        catalog: &AnimationCatalog,
    ) -> SceneResult<bool> {
        let anim_id = catalog
            .id(name)
            .ok_or_else(|| SceneError::UnknownAnimation(name.to_owned()))?;
        Ok(self.set_default(anim_id, sequence, object_id))
    }

    /// Stops an animation. A matching default resets to the idle pose.
    pub fn remove(&self, anim_id: GlobalId) -> bool {
        let mut secondary = self.secondary.lock();
        {
            let _writer = self.default_writer.lock();
            if self.default_animation().anim_id == anim_id {
                self.store_default(Self::idle_animation(self.idle));
                return true;
            }
        }
        match secondary.iter().position(|anim| anim.anim_id == anim_id) {
            Some(index) => {
                secondary.remove(index);
                true
            }
            None => false,
        }
    }

    /// Drops every secondary animation. The default resets to idle unless
    /// the avatar is sitting.
    pub fn clear(&self, is_sitting: bool) {
        let mut secondary = self.secondary.lock();
        if !is_sitting {
            let _writer = self.default_writer.lock();
            self.store_default(Self::idle_animation(self.idle));
        }
        secondary.clear();
    }

    /// Number of secondary animations.
    #[must_use]
    pub fn secondary_count(&self) -> usize {
        self.secondary.lock().len()
    }

    /// Parallel arrays for the wire encoder, default first.
    #[must_use]
    pub fn arrays(&self) -> AnimationArrays {
        let secondary = self.secondary.lock();
        let default_animation = self.default_animation();
        let mut arrays = AnimationArrays {
            anim_ids: Vec::with_capacity(secondary.len() + 1),
            sequences: Vec::with_capacity(secondary.len() + 1),
            object_ids: Vec::with_capacity(secondary.len() + 1),
        };
        for anim in std::iter::once(&default_animation).chain(secondary.iter()) {
            arrays.anim_ids.push(anim.anim_id);
            arrays.sequences.push(anim.sequence);
            arrays.object_ids.push(anim.object_id);
        }
        arrays
    }

    /// Flattens the set for persistence: secondaries first, default last.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Animation> {
        let secondary = self.secondary.lock();
        let mut all = Vec::with_capacity(secondary.len() + 1);
        all.extend_from_slice(&secondary);
        all.push(self.default_animation());
        all
    }

    /// Restores a set flattened by [`Self::to_vec`]. The last element becomes
    /// the default; an empty slice clears the secondaries and keeps the default.
    pub fn replace_from(&self, animations: &[Animation]) {
        let mut secondary = self.secondary.lock();
        secondary.clear();
        if let Some((last, rest)) = animations.split_last() {
            secondary.extend_from_slice(rest);
            let _writer = self.default_writer.lock();
            self.store_default(*last);
        }
    }
}

/// Standard avatar poses.
const BUILTIN_ANIMATIONS: &[(&str, u128)] = &[
    (STAND, 0x2408_fe9e_df1d_1d7d_f4ff_1384_fa7b_350f),
    (SIT, 0x1a5f_e8ac_a804_8a5d_7cbd_56bd_8318_4568),
    (SIT_GROUND_CONSTRAINED, 0x1a2b_d58e_87ff_0df8_0b4c_53e0_47b0_bb6e),
    ("FLY", 0xaec4_610c_757f_bc4e_c092_c6e9_caf1_8daf),
    ("HOVER", 0x4ae8_016b_31b9_03bb_c401_b1ea_941d_b41d),
    ("WALK", 0x6ed2_4bd8_91aa_4b12_ccc7_c97c_857a_b4e0),
    ("RUN", 0x05dd_bff8_aaa9_92a1_2b74_8fe7_7a29_b445),
    ("CROUCH", 0x201f_3fdf_cb1f_dbec_201f_7333_e328_ae7c),
    ("JUMP", 0x2305_bd75_1ca9_b03b_1faa_b176_b8a8_c49e),
    ("LAND", 0x7a17_b059_12b2_41b1_570a_1863_68b6_aa6f),
];

#[derive(Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    animations: HashMap<String, GlobalId>,
}

/// Name to asset mapping for animations, built once per process.
///
/// ```toml
/// [animations]
/// STAND = "2408fe9e-df1d-1d7d-f4ff-1384fa7b350f"
/// ```
#[derive(Clone, Debug)]
pub struct AnimationCatalog {
    by_name: HashMap<String, GlobalId>,
    idle: GlobalId,
}

impl AnimationCatalog {
    /// The standard avatar poses.
    #[must_use]
    pub fn builtin() -> Self {
        let by_name = BUILTIN_ANIMATIONS
            .iter()
            .map(|(name, id)| ((*name).to_owned(), GlobalId::from_u128(*id)))
            .collect();
        Self::from_map(by_name)
    }

    fn from_map(by_name: HashMap<String, GlobalId>) -> Self {
        let idle = by_name.get(STAND).copied().unwrap_or(GlobalId::ZERO);
        Self { by_name, idle }
    }

    /// Builds the builtin catalog overlaid with the `[animations]` table.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::InvalidConfig`] on malformed TOML or identifiers.
    pub fn from_toml_str(text: &str) -> SceneResult<Self> {
        let document: CatalogDocument = toml::from_str(text)?;
        let mut catalog = Self::builtin();
        for (name, id) in document.animations {
            catalog.by_name.insert(name.to_ascii_uppercase(), id);
        }
        Ok(Self::from_map(catalog.by_name))
    }

    /// Reads a catalog file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or a parse error.
    pub fn from_file(path: impl AsRef<Path>) -> SceneResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Wraps the catalog for sharing.
    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Resolves a name (case-insensitive).
    #[must_use]
    pub fn id(&self, name: &str) -> Option<GlobalId> {
        self.by_name
            .get(name)
            .or_else(|| self.by_name.get(&name.to_ascii_uppercase()))
            .copied()
    }

    /// Asset of the idle pose.
    #[inline]
    #[must_use]
    pub const fn idle(&self) -> GlobalId {
        self.idle
    }

    /// Number of known names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Returns true if the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl Default for AnimationCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fly(catalog: &AnimationCatalog) -> GlobalId {
        catalog.id("FLY").unwrap()
    }

    #[test]
    fn test_new_set_plays_idle() {
        let catalog = AnimationCatalog::builtin();
        let set = AnimationSet::new(&catalog);
        assert_eq!(set.default_animation().anim_id, catalog.idle());
        assert!(set.has_animation(catalog.idle()));
        assert_eq!(set.secondary_count(), 0);
    }

    #[test]
    fn test_set_default_is_idempotent() {
        let catalog = AnimationCatalog::builtin();
        let set = AnimationSet::new(&catalog);
        let anim = fly(&catalog);

        assert!(set.set_default(anim, 2, GlobalId::ZERO));
        assert!(!set.set_default(anim, 3, GlobalId::ZERO));
        assert!(set.has_animation(anim));
        assert_eq!(set.default_animation().sequence, 2);
    }

    #[test]
    fn test_add_rejects_default_and_duplicates() {
        let catalog = AnimationCatalog::builtin();
        let set = AnimationSet::new(&catalog);
        let dance = GlobalId::from_u128(0xdead);

        assert!(!set.add(catalog.idle(), 1, GlobalId::ZERO));
        assert!(set.add(dance, 1, GlobalId::ZERO));
        assert!(!set.add(dance, 2, GlobalId::ZERO));
        assert_eq!(set.secondary_count(), 1);
    }

    #[test]
    fn test_add_does_not_wait_for_default_writer() {
        let catalog = AnimationCatalog::builtin();
        let set = Arc::new(AnimationSet::new(&catalog));
        let fly = fly(&catalog);
        let writer = set.default_writer.lock();

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let worker = {
            let set = Arc::clone(&set);
            std::thread::spawn(move || {
                let added = set.add(fly, 2, GlobalId::ZERO);
                let _ = done_tx.send(added);
            })
        };

        let added = done_rx.recv_timeout(std::time::Duration::from_secs(5));
        drop(writer);
        worker.join().unwrap();
        assert_eq!(added, Ok(true));
        assert!(set.has_animation(fly));
    }

    #[test]
    fn test_default_storm_alongside_adds() {
        let catalog = AnimationCatalog::builtin();
        let set = Arc::new(AnimationSet::new(&catalog));
        let poses = [catalog.id(SIT).unwrap(), catalog.idle()];

        let storm = {
            let set = Arc::clone(&set);
            std::thread::spawn(move || {
                for sequence in 0..1_000 {
                    set.set_default(poses[sequence % 2], 1, GlobalId::ZERO);
                }
            })
        };
        for raw in 1..=100_u128 {
            assert!(set.add(GlobalId::from_u128(raw), 2, GlobalId::ZERO));
        }
        storm.join().unwrap();

        assert_eq!(set.secondary_count(), 100);
        assert!(poses.contains(&set.default_animation().anim_id));
    }

    #[test]
    fn test_remove_default_resets_to_idle() {
        let catalog = AnimationCatalog::builtin();
        let set = AnimationSet::new(&catalog);
        let anim = fly(&catalog);
        set.set_default(anim, 2, GlobalId::ZERO);

        assert!(set.remove(anim));
        assert_eq!(set.default_animation().anim_id, catalog.idle());
        assert!(!set.remove(GlobalId::from_u128(0xbeef)));
    }

    #[test]
    fn test_remove_secondary() {
        let catalog = AnimationCatalog::builtin();
        let set = AnimationSet::new(&catalog);
        let dance = GlobalId::from_u128(0xdead);
        set.add(dance, 1, GlobalId::ZERO);

        assert!(set.remove(dance));
        assert!(!set.has_animation(dance));
    }

    #[test]
    fn test_clear_keeps_default_when_sitting() {
        let catalog = AnimationCatalog::builtin();
        let set = AnimationSet::new(&catalog);
        let sit = catalog.id(SIT).unwrap();
        set.set_default(sit, 1, GlobalId::ZERO);
        set.add(GlobalId::from_u128(0xdead), 1, GlobalId::ZERO);

        set.clear(true);
        assert_eq!(set.default_animation().anim_id, sit);
        assert_eq!(set.secondary_count(), 0);

        set.clear(false);
        assert_eq!(set.default_animation().anim_id, catalog.idle());
    }

    #[test]
    fn test_try_set_default_unknown_name() {
        let catalog = AnimationCatalog::builtin();
        let set = AnimationSet::new(&catalog);
        assert!(matches!(
            set.try_set_default("MOONWALK", 1, GlobalId::ZERO, &catalog),
            Err(SceneError::UnknownAnimation(_))
        ));
        assert!(set.try_set_default("fly", 1, GlobalId::ZERO, &catalog).unwrap());
    }

    #[test]
    fn test_arrays_put_default_first() {
        let catalog = AnimationCatalog::builtin();
        let set = AnimationSet::new(&catalog);
        let dance = GlobalId::from_u128(0xdead);
        let source = GlobalId::from_u128(0x42);
        set.add(dance, 7, source);

        let arrays = set.arrays();
        assert_eq!(arrays.anim_ids, vec![catalog.idle(), dance]);
        assert_eq!(arrays.sequences, vec![1, 7]);
        assert_eq!(arrays.object_ids, vec![GlobalId::ZERO, source]);
    }

    #[test]
    fn test_flatten_and_restore() {
        let catalog = AnimationCatalog::builtin();
        let set = AnimationSet::new(&catalog);
        let dance = GlobalId::from_u128(0xdead);
        set.add(dance, 7, GlobalId::ZERO);
        set.set_default(fly(&catalog), 3, GlobalId::ZERO);

        let flat = set.to_vec();
        assert_eq!(flat.last().map(|anim| anim.anim_id), Some(fly(&catalog)));

        let restored = AnimationSet::new(&catalog);
        restored.replace_from(&flat);
        assert_eq!(restored.default_animation(), set.default_animation());
        assert!(restored.has_animation(dance));

        restored.replace_from(&[]);
        assert_eq!(restored.secondary_count(), 0);
        assert_eq!(restored.default_animation().anim_id, fly(&catalog));
    }

    #[test]
    fn test_catalog_overlay_from_toml() {
        let catalog = AnimationCatalog::from_toml_str(
            "[animations]\nwave = \"c541c47f-e0c0-058b-ad1a-d6ae3a4584d9\"",
        )
        .unwrap();
        assert!(catalog.id("WAVE").is_some());
        assert!(catalog.id("STAND").is_some());
        assert!(AnimationCatalog::from_toml_str("[animations]\nwave = \"nope\"").is_err());
    }
}
