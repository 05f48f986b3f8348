//! Integration tests for loader delegation
//!
//! Tests cover:
//! - Parent-first resolution
//! - At most one materialization per (loader, name) under contention
//! - The already-resolved fast path
//! - Deadlock freedom between parallel-capable loaders that delegate to
//!   each other
//! - Error propagation from parents

use crossbeam::channel;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Weak};
use std::thread;
use std::time::Duration;
use strata_engine::{
    ImageSource, LoadError, LoadResult, Loader, LoaderBuilder, LoaderType, Runtime, TypeHandle,
    TypeImage, TypeSource,
};

// =============================================================================
// HELPERS
// =============================================================================

/// Image source that counts materializations per call
struct CountingSource {
    images: ImageSource,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingSource {
    fn new(images: Vec<TypeImage>) -> Arc<Self> {
        Self::with_delay(images, None)
    }

    fn with_delay(images: Vec<TypeImage>, delay: Option<Duration>) -> Arc<Self> {
        let source = ImageSource::new();
        for image in images {
            source.insert(image).unwrap();
        }
        Arc::new(Self {
            images: source,
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TypeSource for CountingSource {
    fn find_type(&self, loader: &Arc<Loader>, name: &str) -> LoadResult<Option<Arc<TypeHandle>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.images.find_type(loader, name)
    }
}

/// Source that, when asked for `trigger`, first waits on a barrier and then
/// resolves `peer_name` through the peer loader
struct PeerSource {
    images: ImageSource,
    trigger: String,
    peer_name: String,
    peer: OnceCell<Weak<Loader>>,
    barrier: Arc<Barrier>,
}

impl TypeSource for PeerSource {
    fn find_type(&self, loader: &Arc<Loader>, name: &str) -> LoadResult<Option<Arc<TypeHandle>>> {
        if name == self.trigger {
            self.barrier.wait();
            let peer = self
                .peer
                .get()
                .and_then(Weak::upgrade)
                .ok_or_else(|| LoadError::not_found("peer loader"))?;
            peer.resolve(&self.peer_name)?;
        }
        self.images.find_type(loader, name)
    }
}

// =============================================================================
// DELEGATION ORDER
// =============================================================================

#[test]
fn test_parent_wins_over_local_definition() {
    let runtime = Runtime::builder().build();
    let boot_source = CountingSource::new(vec![TypeImage::class("pkg.Shared").build().unwrap()]);
    let app_source = CountingSource::new(vec![
        TypeImage::class("pkg.Shared").build().unwrap(),
        TypeImage::class("app.Main").extends("pkg.Shared").build().unwrap(),
    ]);

    let boot = LoaderBuilder::new("boot", runtime.base_loader_type())
        .source(boot_source.clone())
        .build(&runtime);
    let app = LoaderBuilder::new("app", runtime.base_loader_type())
        .parent(&boot)
        .source(app_source.clone())
        .build(&runtime);

    let main = app.resolve("app.Main").unwrap();
    assert_eq!(main.loader_id(), app.id());
    assert_eq!(main.superclass().unwrap().loader_id(), boot.id());

    let shared = app.resolve("pkg.Shared").unwrap();
    assert_eq!(shared.loader_id(), boot.id());
    // app's source was only asked for app.Main
    assert_eq!(app_source.calls(), 1);
}

#[test]
fn test_not_found_everywhere() {
    let runtime = Runtime::builder().build();
    let boot = LoaderBuilder::new("boot", runtime.base_loader_type()).build(&runtime);
    let app = LoaderBuilder::new("app", runtime.base_loader_type())
        .parent(&boot)
        .build(&runtime);

    let err = app.resolve("pkg.Missing").unwrap_err();
    assert_eq!(err, LoadError::not_found("pkg.Missing"));
    assert!(app.find_loaded("pkg.Missing").is_none());
}

#[test]
fn test_parent_failure_other_than_not_found_propagates() {
    let runtime = Runtime::builder().build();
    let boot_images = ImageSource::new();
    boot_images.insert_bytes("pkg.Broken", b"garbage".to_vec());
    let boot = LoaderBuilder::new("boot", runtime.base_loader_type())
        .source(boot_images)
        .build(&runtime);

    let app_source = CountingSource::new(vec![TypeImage::class("pkg.Broken").build().unwrap()]);
    let app = LoaderBuilder::new("app", runtime.base_loader_type())
        .parent(&boot)
        .source(app_source.clone())
        .build(&runtime);

    assert!(matches!(
        app.resolve("pkg.Broken"),
        Err(LoadError::Format { .. })
    ));
    assert_eq!(app_source.calls(), 0);
}

#[test]
fn test_local_fast_path() {
    let runtime = Runtime::builder().build();
    let source = CountingSource::new(vec![TypeImage::class("pkg.Widget").build().unwrap()]);
    let boot = LoaderBuilder::new("boot", runtime.base_loader_type())
        .source(source.clone())
        .build(&runtime);

    let first = boot.resolve("pkg.Widget").unwrap();
    for _ in 0..10 {
        let again = boot.resolve("pkg.Widget").unwrap();
        assert!(Arc::ptr_eq(&first, &again));
    }
    assert_eq!(source.calls(), 1);
}

#[test]
fn test_resolve_and_link() {
    let runtime = Runtime::builder().build();
    let source = CountingSource::new(vec![
        TypeImage::class("pkg.Base").build().unwrap(),
        TypeImage::class("pkg.Widget").extends("pkg.Base").build().unwrap(),
    ]);
    let boot = LoaderBuilder::new("boot", runtime.base_loader_type())
        .source(source)
        .build(&runtime);

    let widget = boot.resolve_and_link("pkg.Widget").unwrap();
    assert!(widget.is_linked());
    assert!(widget.superclass().unwrap().is_linked());
}

// =============================================================================
// CONCURRENCY
// =============================================================================

fn materialize_concurrently(loader_type: Option<Arc<LoaderType>>) {
    const THREADS: usize = 8;

    let runtime = Runtime::builder().build();
    let source = CountingSource::with_delay(
        vec![TypeImage::class("pkg.Slow").build().unwrap()],
        Some(Duration::from_millis(20)),
    );
    let loader_type = loader_type.unwrap_or_else(|| Arc::clone(runtime.base_loader_type()));
    let boot = LoaderBuilder::new("boot", &loader_type)
        .source(source.clone())
        .build(&runtime);

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let boot = Arc::clone(&boot);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                boot.resolve("pkg.Slow").unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(source.calls(), 1);
    assert!(results.iter().all(|t| Arc::ptr_eq(t, &results[0])));
}

#[test]
fn test_at_most_one_materialization_parallel_capable() {
    materialize_concurrently(None);
}

#[test]
fn test_at_most_one_materialization_coarse() {
    let runtime = Runtime::builder().build();
    let coarse = LoaderType::derive("Coarse", runtime.base_loader_type());
    materialize_concurrently(Some(coarse));
}

#[test]
fn test_distinct_names_resolve_in_parallel() {
    let runtime = Runtime::builder().build();
    let names: Vec<String> = (0..16).map(|i| format!("pkg.T{i}")).collect();
    let source = CountingSource::new(
        names
            .iter()
            .map(|n| TypeImage::class(n).build().unwrap())
            .collect(),
    );
    let boot = LoaderBuilder::new("boot", runtime.base_loader_type())
        .source(source.clone())
        .build(&runtime);

    thread::scope(|scope| {
        for name in &names {
            let boot = &boot;
            scope.spawn(move || boot.resolve(name).unwrap());
        }
    });
    assert_eq!(source.calls(), names.len());
    assert_eq!(boot.resolved_count(), names.len());
}

#[test]
fn test_mutual_delegation_without_deadlock() {
    let runtime = Runtime::builder().build();
    let barrier = Arc::new(Barrier::new(2));

    let left_images = ImageSource::new();
    left_images.insert(TypeImage::class("left.Start").build().unwrap());
    left_images.insert(TypeImage::class("left.Target").build().unwrap());
    let left_source = Arc::new(PeerSource {
        images: left_images,
        trigger: "left.Start".to_string(),
        peer_name: "right.Target".to_string(),
        peer: OnceCell::new(),
        barrier: Arc::clone(&barrier),
    });

    let right_images = ImageSource::new();
    right_images.insert(TypeImage::class("right.Start").build().unwrap());
    right_images.insert(TypeImage::class("right.Target").build().unwrap());
    let right_source = Arc::new(PeerSource {
        images: right_images,
        trigger: "right.Start".to_string(),
        peer_name: "left.Target".to_string(),
        peer: OnceCell::new(),
        barrier,
    });

    let left = LoaderBuilder::new("left", runtime.base_loader_type())
        .source(left_source.clone())
        .build(&runtime);
    let right = LoaderBuilder::new("right", runtime.base_loader_type())
        .source(right_source.clone())
        .build(&runtime);
    assert!(left_source.peer.set(Arc::downgrade(&right)).is_ok());
    assert!(right_source.peer.set(Arc::downgrade(&left)).is_ok());

    let (tx, rx) = channel::unbounded();
    for (loader, name) in [(Arc::clone(&left), "left.Start"), (Arc::clone(&right), "right.Start")] {
        let tx = tx.clone();
        thread::spawn(move || {
            let result = loader.resolve(name).map(|t| t.name().to_string());
            let _ = tx.send(result);
        });
    }

    for _ in 0..2 {
        let result = rx
            .recv_timeout(Duration::from_secs(10))
            .expect("mutual delegation deadlocked");
        assert!(result.is_ok());
    }
    assert!(left.find_loaded("left.Target").is_some());
    assert!(right.find_loaded("right.Target").is_some());
}

#[test]
fn test_not_found_is_not_cached() {
    let runtime = Runtime::builder().build();
    let images = Arc::new(ImageSource::new());
    let boot = LoaderBuilder::new("boot", runtime.base_loader_type())
        .source(Arc::clone(&images))
        .build(&runtime);

    assert!(boot.resolve("pkg.Later").unwrap_err().is_not_found());
    images.insert(TypeImage::class("pkg.Later").build().unwrap());
    assert_eq!(boot.resolve("pkg.Later").unwrap().name(), "pkg.Later");
}
