//! Object identity across the boundary.
//!
//! The generated managed code keeps one wrapper per native handle. This
//! module is that contract expressed in Rust: an [`ObjectRegistry`] keyed by
//! handle holding weak references to [`ManagedObject`] wrappers, and the
//! [`NativeLifecycle`] capability the wrappers call into for construction,
//! reference counting and class names. A [`GarbageCollector`] sweeps the
//! registry on a schedule.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, info, trace};

/// Opaque native object pointer as seen by managed code. Zero is null.
pub type Handle = u64;

/// The native exports every destructible class provides.
pub trait NativeLifecycle: Send + Sync {
    /// `{Class}_New`: a fresh native object carrying one reference.
    fn new_instance(&self) -> Handle;
    /// `{Class}_VTKDeleteReference`
    fn delete_reference(&self, handle: Handle);
    /// `{Class}_VTKRegister`
    fn register(&self, handle: Handle);
    /// `{Class}_VTKGetClassName`
    fn class_name(&self, handle: Handle) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("cannot access disposed `{0}` wrapper")]
    Disposed(String),
}

struct Entry {
    wrapper: Weak<ManagedObject>,
    class_name: String,
}

/// Result of [`ObjectRegistry::collect_garbage`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceInformation {
    /// Entries whose wrapper is still alive.
    pub kept: usize,
    /// Entries removed because their wrapper is gone.
    pub freed: usize,
    /// Kept entries per class name, when tracking.
    pub classes_kept: Option<BTreeMap<String, usize>>,
    /// Freed entries per class name, when tracking.
    pub classes_freed: Option<BTreeMap<String, usize>>,
}

impl ReferenceInformation {
    pub fn new(track_class_names: bool) -> Self {
        Self {
            classes_kept: track_class_names.then(BTreeMap::new),
            classes_freed: track_class_names.then(BTreeMap::new),
            ..Self::default()
        }
    }

    pub fn total(&self) -> usize {
        self.kept + self.freed
    }

    fn add_kept(&mut self, class_name: &str) {
        self.kept += 1;
        if let Some(tally) = &mut self.classes_kept {
            *tally.entry(class_name.to_string()).or_insert(0) += 1;
        }
    }

    fn add_freed(&mut self, class_name: &str) {
        self.freed += 1;
        if let Some(tally) = &mut self.classes_freed {
            *tally.entry(class_name.to_string()).or_insert(0) += 1;
        }
    }

    /// One line per kept class, or an empty string when untracked or empty.
    pub fn list_kept(&self) -> String {
        list_classes("kept", self.classes_kept.as_ref())
    }

    /// One line per freed class, or an empty string when untracked or empty.
    pub fn list_freed(&self) -> String {
        list_classes("freed", self.classes_freed.as_ref())
    }
}

fn list_classes(what: &str, tally: Option<&BTreeMap<String, usize>>) -> String {
    let Some(tally) = tally.filter(|t| !t.is_empty()) else {
        return String::new();
    };
    let mut out = format!("Classes {what}:\n");
    for (class, n) in tally {
        out.push_str(&format!("  - {class}: {n}\n"));
    }
    out
}

impl fmt::Display for ReferenceInformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "freed({}) - kept({}) - total({})",
            self.freed,
            self.kept,
            self.total()
        )
    }
}

/// Thread-safe map from native handle to the managed wrapper for it.
///
/// Lookup, creation and insertion run under one lock, so concurrent
/// resolutions of the same handle always observe the same wrapper.
#[derive(Default)]
pub struct ObjectRegistry {
    entries: Mutex<HashMap<Handle, Entry>>,
}

impl ObjectRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Return the live wrapper for `handle`, or create and register a
    /// non-owning one. A null handle resolves to `None`.
    pub fn get_or_create(
        self: &Arc<Self>,
        handle: Handle,
        native: &Arc<dyn NativeLifecycle>,
    ) -> Option<Arc<ManagedObject>> {
        if handle == 0 {
            return None;
        }
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&handle).and_then(|e| e.wrapper.upgrade()) {
            trace!(handle, "reusing wrapper");
            return Some(existing);
        }

        let class_name = native.class_name(handle);
        let wrapper = Arc::new(ManagedObject {
            handle: AtomicU64::new(handle),
            disposed: AtomicBool::new(false),
            owns_reference: false,
            class_name: class_name.clone(),
            registry: Arc::clone(self),
            native: Arc::clone(native),
        });
        debug!(handle, class = %class_name, "creating wrapper for native handle");
        entries.insert(
            handle,
            Entry {
                wrapper: Arc::downgrade(&wrapper),
                class_name,
            },
        );
        Some(wrapper)
    }

    /// Record `wrapper` as the managed identity of its handle, replacing any
    /// previous entry.
    pub fn register(&self, wrapper: &Arc<ManagedObject>) {
        let handle = wrapper.raw_handle();
        if handle == 0 {
            return;
        }
        self.entries.lock().insert(
            handle,
            Entry {
                wrapper: Arc::downgrade(wrapper),
                class_name: wrapper.class_name.clone(),
            },
        );
    }

    /// Remove the entry for `handle` if it still belongs to `wrapper`. An
    /// entry already taken over by a newer wrapper is left alone.
    pub fn unregister(&self, handle: Handle, wrapper: &ManagedObject) -> bool {
        let mut entries = self.entries.lock();
        let owned = entries
            .get(&handle)
            .is_some_and(|e| std::ptr::eq(e.wrapper.as_ptr(), wrapper));
        if owned {
            entries.remove(&handle);
        }
        owned
    }

    /// Number of registered handles, live or not yet swept.
    pub fn count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Drop entries whose wrapper no longer exists, tallying what was kept
    /// and what was freed.
    pub fn collect_garbage(&self, track_class_names: bool) -> ReferenceInformation {
        let mut info = ReferenceInformation::new(track_class_names);
        // strong_count instead of upgrade: a temporary Arc dropped here could
        // run a wrapper's Drop while the lock is held.
        self.entries.lock().retain(|_, e| {
            let alive = e.wrapper.strong_count() > 0;
            if alive {
                info.add_kept(&e.class_name);
            } else {
                info.add_freed(&e.class_name);
            }
            alive
        });
        debug!(kept = info.kept, freed = info.freed, "collected wrapper registry");
        info
    }
}

/// A managed wrapper around one native object.
pub struct ManagedObject {
    handle: AtomicU64,
    disposed: AtomicBool,
    owns_reference: bool,
    class_name: String,
    registry: Arc<ObjectRegistry>,
    native: Arc<dyn NativeLifecycle>,
}

impl ManagedObject {
    /// The public zero-argument constructor: create a native object, own
    /// its reference and register the wrapper.
    pub fn create(
        registry: &Arc<ObjectRegistry>,
        native: &Arc<dyn NativeLifecycle>,
        class_name: impl Into<String>,
    ) -> Arc<Self> {
        let handle = native.new_instance();
        Self::from_handle(registry, native, handle, true, class_name)
    }

    /// The internal constructor over an existing handle.
    pub fn from_handle(
        registry: &Arc<ObjectRegistry>,
        native: &Arc<dyn NativeLifecycle>,
        handle: Handle,
        owns_reference: bool,
        class_name: impl Into<String>,
    ) -> Arc<Self> {
        let wrapper = Arc::new(Self {
            handle: AtomicU64::new(handle),
            disposed: AtomicBool::new(false),
            owns_reference,
            class_name: class_name.into(),
            registry: Arc::clone(registry),
            native: Arc::clone(native),
        });
        registry.register(&wrapper);
        wrapper
    }

    pub fn handle(&self) -> Result<Handle, IdentityError> {
        if self.is_disposed() {
            return Err(IdentityError::Disposed(self.class_name.clone()));
        }
        Ok(self.handle.load(Ordering::Acquire))
    }

    /// The handle without the disposal check; zero once disposed.
    pub fn raw_handle(&self) -> Handle {
        self.handle.load(Ordering::Acquire)
    }

    pub fn owns_reference(&self) -> bool {
        self.owns_reference
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Take a native reference on behalf of some other owner.
    pub fn register_native(&self) -> Result<(), IdentityError> {
        let handle = self.handle()?;
        self.native.register(handle);
        Ok(())
    }

    /// Unregister and release the native reference if this wrapper owns it.
    /// Later calls do nothing.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let handle = self.handle.swap(0, Ordering::AcqRel);
        if handle == 0 {
            return;
        }
        self.registry.unregister(handle, self);
        if self.owns_reference {
            self.native.delete_reference(handle);
        }
        trace!(handle, class = %self.class_name, "disposed wrapper");
    }
}

impl Drop for ManagedObject {
    // A dropped non-owning wrapper leaves its entry behind for
    // `collect_garbage` to count as freed.
    fn drop(&mut self) {
        if self.owns_reference {
            self.dispose();
        }
    }
}

impl std::fmt::Debug for ManagedObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedObject")
            .field("handle", &self.raw_handle())
            .field("class_name", &self.class_name)
            .field("owns_reference", &self.owns_reference)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

struct Schedule {
    running: bool,
    period: Duration,
    debug: bool,
    last: Option<ReferenceInformation>,
}

struct Shared {
    state: Mutex<Schedule>,
    notify: Condvar,
}

/// Periodic sweeper for an [`ObjectRegistry`].
///
/// Sweeps every `period` (one second by default) on a background thread
/// between [`start`](Self::start) and [`stop`](Self::stop). With `debug`
/// set, sweeps track class names and log their summary.
pub struct GarbageCollector {
    registry: Arc<ObjectRegistry>,
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl GarbageCollector {
    pub fn new(registry: &Arc<ObjectRegistry>) -> Self {
        Self {
            registry: Arc::clone(registry),
            shared: Arc::new(Shared {
                state: Mutex::new(Schedule {
                    running: false,
                    period: Duration::from_secs(1),
                    debug: false,
                    last: None,
                }),
                notify: Condvar::new(),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Start sweeping in the background. Does nothing if already running.
    pub fn start(&self) -> io::Result<()> {
        let mut handle = self.handle.lock();
        {
            let mut state = self.shared.state.lock();
            if state.running {
                return Ok(());
            }
            state.running = true;
        }

        let registry = Arc::clone(&self.registry);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("bnd-csharp-gc".to_string())
            .spawn(move || run_loop(&registry, &shared));
        match spawned {
            Ok(h) => {
                *handle = Some(h);
                Ok(())
            }
            Err(e) => {
                self.shared.state.lock().running = false;
                Err(e)
            }
        }
    }

    /// Stop sweeping and wait for the background thread to exit.
    pub fn stop(&self) {
        let mut handle = self.handle.lock();
        self.shared.state.lock().running = false;
        self.shared.notify.notify_all();
        if let Some(h) = handle.take() {
            let _ = h.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }

    /// Change the sweep period. A running collector picks it up at once.
    pub fn set_schedule_time(&self, period: Duration) {
        self.shared.state.lock().period = period;
        self.shared.notify.notify_all();
    }

    pub fn set_debug(&self, debug: bool) {
        self.shared.state.lock().debug = debug;
    }

    pub fn debug(&self) -> bool {
        self.shared.state.lock().debug
    }

    /// Sweep immediately.
    pub fn collect_now(&self) -> ReferenceInformation {
        collect(&self.registry, &self.shared)
    }

    /// The outcome of the most recent sweep, scheduled or not.
    pub fn last_result(&self) -> Option<ReferenceInformation> {
        self.shared.state.lock().last.clone()
    }
}

impl Drop for GarbageCollector {
    fn drop(&mut self) {
        self.stop();
    }
}

fn collect(registry: &ObjectRegistry, shared: &Shared) -> ReferenceInformation {
    let debug = shared.state.lock().debug;
    let result = registry.collect_garbage(debug);
    if debug {
        info!(%result, "swept wrapper registry");
    }
    shared.state.lock().last = Some(result.clone());
    result
}

fn run_loop(registry: &ObjectRegistry, shared: &Shared) {
    let mut state = shared.state.lock();
    while state.running {
        let period = state.period;
        // Woken early by stop or a new period: re-check and wait again.
        if !shared.notify.wait_for(&mut state, period).timed_out() {
            continue;
        }
        if !state.running {
            break;
        }
        MutexGuard::unlocked(&mut state, || {
            collect(registry, shared);
        });
    }
    trace!("garbage collector thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    /// Native side that counts references per handle.
    #[derive(Default)]
    struct FakeNative {
        next: AtomicU64,
        refs: Mutex<HashMap<Handle, i32>>,
        class_lookups: AtomicU64,
    }

    impl FakeNative {
        fn with_object(handle: Handle) -> Arc<Self> {
            let native = Self::default();
            native.next.store(handle, Ordering::SeqCst);
            native.refs.lock().insert(handle, 1);
            Arc::new(native)
        }

        fn refs(&self, handle: Handle) -> i32 {
            self.refs.lock().get(&handle).copied().unwrap_or(0)
        }
    }

    impl NativeLifecycle for FakeNative {
        fn new_instance(&self) -> Handle {
            let handle = self.next.fetch_add(16, Ordering::SeqCst) + 16;
            self.refs.lock().insert(handle, 1);
            handle
        }

        fn delete_reference(&self, handle: Handle) {
            *self.refs.lock().entry(handle).or_insert(0) -= 1;
        }

        fn register(&self, handle: Handle) {
            *self.refs.lock().entry(handle).or_insert(0) += 1;
        }

        fn class_name(&self, _handle: Handle) -> String {
            self.class_lookups.fetch_add(1, Ordering::SeqCst);
            "vtkPoints".to_string()
        }
    }

    fn as_native(fake: &Arc<FakeNative>) -> Arc<dyn NativeLifecycle> {
        Arc::clone(fake) as Arc<dyn NativeLifecycle>
    }

    #[test]
    fn same_handle_resolves_to_same_wrapper() {
        let registry = ObjectRegistry::new();
        let fake = FakeNative::with_object(0x1000);
        let native = as_native(&fake);

        let a = registry.get_or_create(0x1000, &native).unwrap();
        let b = registry.get_or_create(0x1000, &native).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!a.owns_reference());
        assert_eq!(a.class_name(), "vtkPoints");
        assert_eq!(fake.class_lookups.load(Ordering::SeqCst), 1);
        assert_eq!(registry.count(), 1);

        assert!(registry.get_or_create(0, &native).is_none());
    }

    #[test]
    fn dispose_is_idempotent_and_only_owners_release() {
        let registry = ObjectRegistry::new();
        let fake = Arc::new(FakeNative::default());
        let native = as_native(&fake);

        let owned = ManagedObject::create(&registry, &native, "vtkObject");
        let handle = owned.raw_handle();
        assert_eq!(fake.refs(handle), 1);
        assert_eq!(registry.count(), 1);

        owned.dispose();
        owned.dispose();
        assert_eq!(fake.refs(handle), 0);
        assert_eq!(registry.count(), 0);
        assert_eq!(owned.raw_handle(), 0);
        assert_eq!(
            owned.handle(),
            Err(IdentityError::Disposed("vtkObject".to_string()))
        );
        assert!(owned.register_native().is_err());

        let borrowed = registry.get_or_create(0x2000, &native).unwrap();
        borrowed.dispose();
        assert_eq!(fake.refs(0x2000), 0);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn dropped_borrowed_wrapper_is_swept_as_freed() {
        let registry = ObjectRegistry::new();
        let fake = FakeNative::with_object(0x2000);
        let native = as_native(&fake);

        let kept = ManagedObject::create(&registry, &native, "vtkPoints");
        drop(registry.get_or_create(0x2000, &native).unwrap());
        assert_eq!(fake.refs(0x2000), 1);
        assert_eq!(registry.count(), 2);

        let info = registry.collect_garbage(true);
        assert_eq!((info.kept, info.freed, info.total()), (1, 1, 2));
        assert_eq!(info.classes_kept.unwrap().get("vtkPoints"), Some(&1));
        assert_eq!(info.classes_freed.unwrap().get("vtkPoints"), Some(&1));
        assert_eq!(registry.count(), 1);

        // A fresh lookup after the sweep builds a new wrapper.
        let again = registry.get_or_create(0x2000, &native).unwrap();
        assert_eq!(again.raw_handle(), 0x2000);
        assert!(!kept.is_disposed());
    }

    #[test]
    fn stale_wrapper_does_not_unregister_its_successor() {
        let registry = ObjectRegistry::new();
        let fake = FakeNative::with_object(0x3000);
        let native = as_native(&fake);

        let first = ManagedObject::from_handle(&registry, &native, 0x3000, false, "vtkObject");
        let second = ManagedObject::from_handle(&registry, &native, 0x3000, false, "vtkObject");
        first.dispose();
        assert_eq!(registry.count(), 1);
        let resolved = registry.get_or_create(0x3000, &native).unwrap();
        assert!(Arc::ptr_eq(&resolved, &second));
    }

    #[test]
    fn collect_garbage_sweeps_dead_entries() {
        let registry = ObjectRegistry::new();
        let fake = Arc::new(FakeNative::default());
        let native = as_native(&fake);

        let kept = ManagedObject::create(&registry, &native, "vtkObject");
        let points = ManagedObject::create(&registry, &native, "vtkPoints");
        // An entry whose wrapper vanished without disposing.
        registry.entries.lock().insert(
            0x9000,
            Entry {
                wrapper: Weak::new(),
                class_name: "vtkPoints".to_string(),
            },
        );
        assert_eq!(registry.count(), 3);

        let info = registry.collect_garbage(true);
        assert_eq!(info.kept, 2);
        assert_eq!(info.freed, 1);
        let classes_kept = info.classes_kept.clone().unwrap();
        assert_eq!(classes_kept.get("vtkObject"), Some(&1));
        assert_eq!(classes_kept.get("vtkPoints"), Some(&1));
        assert_eq!(
            info.list_kept(),
            "Classes kept:\n  - vtkObject: 1\n  - vtkPoints: 1\n"
        );
        assert_eq!(info.list_freed(), "Classes freed:\n  - vtkPoints: 1\n");
        assert_eq!(info.to_string(), "freed(1) - kept(2) - total(3)");

        let untracked = registry.collect_garbage(false);
        assert!(untracked.classes_kept.is_none());
        assert!(untracked.classes_freed.is_none());
        assert_eq!(untracked.list_kept(), "");
        assert_eq!(untracked.list_freed(), "");
        assert_ne!(kept.raw_handle(), points.raw_handle());
    }

    #[test]
    fn collect_now_records_last_result() {
        let registry = ObjectRegistry::new();
        let gc = GarbageCollector::new(&registry);
        assert!(gc.last_result().is_none());

        registry.entries.lock().insert(
            0x9000,
            Entry {
                wrapper: Weak::new(),
                class_name: "vtkPoints".to_string(),
            },
        );
        gc.set_debug(true);
        assert!(gc.debug());
        let info = gc.collect_now();
        assert_eq!(info.freed, 1);
        assert_eq!(gc.last_result(), Some(info));
        assert_eq!(registry.count(), 0);

        let empty = gc.collect_now();
        assert_eq!(empty.total(), 0);
        assert_eq!(gc.last_result(), Some(empty));
    }

    #[test]
    fn scheduled_collector_sweeps_until_stopped() {
        let registry = ObjectRegistry::new();
        let gc = GarbageCollector::new(&registry);
        gc.set_schedule_time(Duration::from_millis(5));
        registry.entries.lock().insert(
            0x9000,
            Entry {
                wrapper: Weak::new(),
                class_name: "vtkPoints".to_string(),
            },
        );

        gc.start().unwrap();
        gc.start().unwrap();
        assert!(gc.is_running());
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while registry.count() > 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        gc.stop();
        assert!(!gc.is_running());
        assert_eq!(registry.count(), 0);
        assert!(gc.last_result().is_some());

        // Restartable after a stop.
        gc.start().unwrap();
        assert!(gc.is_running());
        gc.stop();
        assert!(!gc.is_running());
    }

    #[test]
    fn concurrent_resolution_creates_one_wrapper() {
        let registry = ObjectRegistry::new();
        let fake = FakeNative::with_object(0x4000);
        let native = as_native(&fake);
        let barrier = Barrier::new(8);

        let wrappers: Vec<Arc<ManagedObject>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        registry.get_or_create(0x4000, &native).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(wrappers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(fake.class_lookups.load(Ordering::SeqCst), 1);
        assert_eq!(registry.count(), 1);
    }
}
