//! A sub-dataset: one placed, independently styled view of a dataset.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::dataset::mask::ValidityMask;
use crate::listeners::ListenerSet;
use crate::transfer_function::TransferFunction;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubDatasetKey {
    pub dataset_id: i32,
    pub subdataset_id: i32,
}

impl SubDatasetKey {
    pub fn new(dataset_id: i32, subdataset_id: i32) -> Self {
        Self {
            dataset_id,
            subdataset_id,
        }
    }
}

/// Who may modify a sub-dataset.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Owner {
    #[default]
    Public,
    Headset(i32),
}

impl Owner {
    /// Wire form: a negative headset id means public.
    pub fn from_id(id: i32) -> Self {
        if id < 0 {
            Owner::Public
        } else {
            Owner::Headset(id)
        }
    }

    pub fn id(self) -> i32 {
        match self {
            Owner::Public => -1,
            Owner::Headset(id) => id,
        }
    }
}

bitflags::bitflags! {
    /// Pending changes, drained by the render side
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SubDatasetChanges: u32 {
        const NAME = 1 << 0;
        const POSITION = 1 << 1;
        const ROTATION = 1 << 2;
        const SCALE = 1 << 3;
        const TRANSFER_FUNCTION = 1 << 4;
        const CLIPPING = 1 << 5;
        const VISIBILITY = 1 << 6;
        const OWNER = 1 << 7;
        const LOCK_OWNER = 1 << 8;
        const VOLUMETRIC_MASK = 1 << 9;
        const GROUP = 1 << 10;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubDatasetState {
    pub name: String,
    pub position: [f32; 3],
    /// Quaternion, `w` first.
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
    pub tf: Option<Arc<TransferFunction>>,
    /// Depth clipping planes, in `[0, 1]` of the sub-dataset's extent.
    pub depth_clipping: (f32, f32),
    pub visible: bool,
    pub owner: Owner,
    pub lock_owner: Option<i32>,
    pub volumetric_mask: Option<ValidityMask>,
    pub group: Option<i32>,
}

impl Default for SubDatasetState {
    fn default() -> Self {
        Self {
            name: String::new(),
            position: [0.0; 3],
            rotation: [1.0, 0.0, 0.0, 0.0],
            scale: [1.0; 3],
            tf: None,
            depth_clipping: (0.0, 1.0),
            visible: true,
            owner: Owner::Public,
            lock_owner: None,
            volumetric_mask: None,
            group: None,
        }
    }
}

/// Notified after every applied change, with the state as it stands after
/// the change. Must not call a setter of the same sub-dataset.
pub trait SubDatasetListener: Send + Sync {
    fn on_change(&self, key: SubDatasetKey, changes: SubDatasetChanges, state: &SubDatasetState);
}

impl<F> SubDatasetListener for F
where
    F: Fn(SubDatasetKey, SubDatasetChanges, &SubDatasetState) + Send + Sync,
{
    fn on_change(&self, key: SubDatasetKey, changes: SubDatasetChanges, state: &SubDatasetState) {
        self(key, changes, state)
    }
}

pub struct SubDataset {
    key: SubDatasetKey,
    /// Serialises "mutate, then notify" so listeners never see a torn update.
    write_lock: Mutex<()>,
    state: RwLock<SubDatasetState>,
    changes: Mutex<SubDatasetChanges>,
    listeners: ListenerSet<dyn SubDatasetListener>,
}

impl SubDataset {
    pub fn new(key: SubDatasetKey, name: impl Into<String>, owner: Owner) -> Self {
        Self {
            key,
            write_lock: Mutex::new(()),
            state: RwLock::new(SubDatasetState {
                name: name.into(),
                owner,
                ..SubDatasetState::default()
            }),
            changes: Mutex::new(SubDatasetChanges::empty()),
            listeners: ListenerSet::new(),
        }
    }

    pub fn key(&self) -> SubDatasetKey {
        self.key
    }

    pub fn add_listener(&self, listener: Arc<dyn SubDatasetListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn SubDatasetListener>) -> bool {
        self.listeners.remove(listener)
    }

    /// Read access to the current state.
    pub fn state(&self) -> RwLockReadGuard<'_, SubDatasetState> {
        self.state.read()
    }

    pub fn name(&self) -> String {
        self.state.read().name.clone()
    }

    pub fn owner(&self) -> Owner {
        self.state.read().owner
    }

    pub fn group(&self) -> Option<i32> {
        self.state.read().group
    }

    pub fn transfer_function(&self) -> Option<Arc<TransferFunction>> {
        self.state.read().tf.clone()
    }

    /// Drain the changes accumulated since the previous call.
    pub fn take_changes(&self) -> SubDatasetChanges {
        std::mem::replace(&mut *self.changes.lock(), SubDatasetChanges::empty())
    }

    /// Apply `mutate` and, if it reports a change, record `change` and
    /// notify listeners before the next writer can run.
    fn update(&self, change: SubDatasetChanges, mutate: impl FnOnce(&mut SubDatasetState) -> bool) -> bool {
        let _writer = self.write_lock.lock();
        let mut state = self.state.write();
        if !mutate(&mut state) {
            return false;
        }
        *self.changes.lock() |= change;

        let state = RwLockWriteGuard::downgrade(state);
        for listener in self.listeners.snapshot() {
            listener.on_change(self.key, change, &state);
        }
        true
    }

    pub fn set_name(&self, name: &str) -> bool {
        self.update(SubDatasetChanges::NAME, |s| replace(&mut s.name, name.to_string()))
    }

    pub fn set_position(&self, position: [f32; 3]) -> bool {
        self.update(SubDatasetChanges::POSITION, |s| replace(&mut s.position, position))
    }

    pub fn set_rotation(&self, rotation: [f32; 4]) -> bool {
        self.update(SubDatasetChanges::ROTATION, |s| replace(&mut s.rotation, rotation))
    }

    pub fn set_scale(&self, scale: [f32; 3]) -> bool {
        self.update(SubDatasetChanges::SCALE, |s| replace(&mut s.scale, scale))
    }

    /// Always recorded: an identical transfer function still means the
    /// render side must resample.
    pub fn set_transfer_function(&self, tf: Option<Arc<TransferFunction>>) -> bool {
        self.update(SubDatasetChanges::TRANSFER_FUNCTION, |s| {
            s.tf = tf;
            true
        })
    }

    pub fn set_depth_clipping(&self, min: f32, max: f32) -> bool {
        self.update(SubDatasetChanges::CLIPPING, |s| replace(&mut s.depth_clipping, (min, max)))
    }

    pub fn set_visible(&self, visible: bool) -> bool {
        self.update(SubDatasetChanges::VISIBILITY, |s| replace(&mut s.visible, visible))
    }

    pub fn set_owner(&self, owner: Owner) -> bool {
        self.update(SubDatasetChanges::OWNER, |s| replace(&mut s.owner, owner))
    }

    pub fn set_lock_owner(&self, headset: Option<i32>) -> bool {
        self.update(SubDatasetChanges::LOCK_OWNER, |s| replace(&mut s.lock_owner, headset))
    }

    pub fn set_volumetric_mask(&self, mask: Option<ValidityMask>) -> bool {
        self.update(SubDatasetChanges::VOLUMETRIC_MASK, |s| replace(&mut s.volumetric_mask, mask))
    }

    pub fn set_group(&self, group: Option<i32>) -> bool {
        self.update(SubDatasetChanges::GROUP, |s| replace(&mut s.group, group))
    }
}

/// Assign if different; true when the value changed.
fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_owner_from_wire_id() {
        assert_eq!(Owner::from_id(-1), Owner::Public);
        assert_eq!(Owner::from_id(4), Owner::Headset(4));
        assert_eq!(Owner::Headset(4).id(), 4);
        assert_eq!(Owner::Public.id(), -1);
    }

    #[test]
    fn test_changes_accumulate_until_taken() {
        let sd = SubDataset::new(SubDatasetKey::new(1, 0), "a", Owner::Public);
        assert!(sd.set_position([1.0, 0.0, 0.0]));
        assert!(sd.set_visible(false));
        assert!(!sd.set_visible(false));

        assert_eq!(
            sd.take_changes(),
            SubDatasetChanges::POSITION | SubDatasetChanges::VISIBILITY
        );
        assert!(sd.take_changes().is_empty());

        sd.set_transfer_function(None);
        assert_eq!(sd.take_changes(), SubDatasetChanges::TRANSFER_FUNCTION);
    }

    #[test]
    fn test_listeners_see_the_new_state() {
        let sd = SubDataset::new(SubDatasetKey::new(2, 3), "a", Owner::Headset(1));
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        sd.add_listener(Arc::new(
            move |key: SubDatasetKey, changes: SubDatasetChanges, state: &SubDatasetState| {
                assert_eq!(key, SubDatasetKey::new(2, 3));
                assert_eq!(changes, SubDatasetChanges::NAME);
                assert_eq!(state.name, "renamed");
                seen.fetch_add(1, Ordering::SeqCst);
            },
        ));

        sd.set_name("renamed");
        sd.set_name("renamed");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sd.name(), "renamed");
        assert_eq!(sd.owner(), Owner::Headset(1));
    }

    #[test]
    fn test_listener_may_read_state_while_notified() {
        let sd = Arc::new(SubDataset::new(SubDatasetKey::new(0, 0), "a", Owner::Public));
        let inner = Arc::clone(&sd);
        sd.add_listener(Arc::new(
            move |_: SubDatasetKey, _: SubDatasetChanges, _: &SubDatasetState| {
                assert_eq!(inner.state().scale, [2.0; 3]);
            },
        ));
        sd.set_scale([2.0; 3]);
    }

    #[test]
    fn test_concurrent_setters_notify_each_commit_once() {
        const WRITES: usize = 200;
        let sd = Arc::new(SubDataset::new(SubDatasetKey::new(0, 0), "a", Owner::Public));
        let observed = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&observed);
        sd.add_listener(Arc::new(
            move |_: SubDatasetKey, changes: SubDatasetChanges, state: &SubDatasetState| {
                assert_eq!(changes, SubDatasetChanges::POSITION);
                sink.lock().push(state.position);
            },
        ));

        let writers: Vec<_> = (0..2)
            .map(|t| {
                let sd = Arc::clone(&sd);
                std::thread::spawn(move || {
                    let mut written = Vec::new();
                    for i in 0..WRITES {
                        let position = [t as f32 + 1.0, i as f32, 0.0];
                        if sd.set_position(position) {
                            written.push(position);
                        }
                    }
                    written
                })
            })
            .collect();
        let mut written: Vec<_> = writers
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        let key = |p: &[f32; 3]| (p[0] as i32, p[1] as i32);
        let mut observed = observed.lock().clone();
        assert_eq!(written.len(), 2 * WRITES);
        assert_eq!(observed.len(), written.len());
        written.sort_by_key(key);
        observed.sort_by_key(key);
        assert_eq!(observed, written);
        assert_eq!(sd.take_changes(), SubDatasetChanges::POSITION);
    }
}
