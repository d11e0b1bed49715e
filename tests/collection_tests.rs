//! Integration tests for collections: ordering, persistence, dispatch and
//! lifecycle against real files.

use std::path::PathBuf;

use wt5::prelude::*;

use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn scratch(file: &str) -> (TempDir, PathBuf) {
    init_tracing();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join(file);
    (dir, path)
}

#[test]
fn test_create_and_reopen_preserves_order() {
    let (dir, path) = scratch("root.wt5");

    {
        let mut root = Collection::open(&path, None, Some("root"), Attrs::new()).expect("Failed to open");
        root.create_data("d1", None, Attrs::new()).expect("Failed to create d1");
        root.create_collection("sub", None, Attrs::new()).expect("Failed to create sub");
        assert_eq!(root.item_names().unwrap(), ["d1", "sub"]);

        root.create_data("d0", Some(0), Attrs::new()).expect("Failed to insert d0");
        assert_eq!(root.item_names().unwrap(), ["d0", "d1", "sub"]);
        let cached: Vec<&str> = root.iter().map(|c| c.natural_name()).collect();
        assert_eq!(cached, ["d0", "d1", "sub"]);

        let saved = root.save(Some(dir.path().join("out").as_path())).expect("Failed to save");
        assert_eq!(saved, dir.path().join("out.wt5"));
        root.close().expect("Failed to close");
    }

    for file in [path, dir.path().join("out.wt5")] {
        let root = Collection::open(&file, None, Some("root"), Attrs::new()).expect("Failed to reopen");
        println!("{}", root);
        assert_eq!(root.item_names().unwrap(), ["d0", "d1", "sub"]);
        assert!(root.get("d0").unwrap().is_data());
        assert!(root.get("sub").unwrap().is_collection());
        assert!(root.child(2).unwrap().is_collection());
    }
}

#[test]
fn test_nested_collections_roundtrip() {
    let (_dir, path) = scratch("nested.wt5");

    {
        let mut root = Collection::open(&path, None, Some("root"), Attrs::new()).unwrap();
        let sub = root
            .create_collection("sub", None, Attrs::new().with("kind", "scan"))
            .unwrap();
        sub.create_data("a", None, Attrs::new()).unwrap();
        let leaf = sub.create_collection("leaf", None, Attrs::new()).unwrap();
        let d = leaf.create_data("signal", None, Attrs::new()).unwrap();
        d.create_dataset("y", &[3], &[1.0f64, 4.0, 9.0]).unwrap();
        root.close().unwrap();
    }

    let root = Collection::open(&path, None, Some("root"), Attrs::new()).unwrap();
    let sub = root.get("sub").unwrap().into_collection().expect("sub is a collection");
    assert_eq!(sub.attrs().unwrap().get_str("kind"), Some("scan"));
    assert_eq!(sub.item_names().unwrap(), ["a", "leaf"]);

    let leaf = sub.get_child("leaf").and_then(Child::as_collection).expect("leaf cached");
    assert_eq!(leaf.path(), "/root/sub/leaf");
    let signal = leaf.get(0usize).unwrap().into_data().expect("signal is data");
    assert_eq!(signal.dataset("y").unwrap().to_vec::<f64>().unwrap(), [1.0, 4.0, 9.0]);
}

#[test]
fn test_untagged_child_is_raw() {
    let (_dir, path) = scratch("raw.wt5");

    {
        let root = Collection::open(&path, None, Some("root"), Attrs::new()).unwrap();
        let raw = root.group().require_group("notes").unwrap();
        raw.set_attr("author", "nobody").unwrap();
        root.group()
            .set_attr("item_names", AttrValue::byte_strings(["notes"]))
            .unwrap();
        root.store().close().unwrap();
    }

    let root = Collection::open(&path, None, Some("root"), Attrs::new()).unwrap();
    let child = root.get("notes").unwrap();
    assert!(child.is_raw());
    assert_eq!(child.natural_name(), "notes");
    assert_eq!(
        child.as_raw().unwrap().attr("author").unwrap(),
        Some(AttrValue::from("nobody"))
    );
    // Raw groups are returned unconverted
    assert_eq!(child.class().unwrap(), None);
}

#[test]
fn test_get_by_index_and_name() {
    let (_dir, path) = scratch("keys.wt5");
    let mut root = Collection::open(&path, None, Some("root"), Attrs::new()).unwrap();
    root.create_data("d1", None, Attrs::new()).unwrap();
    root.create_collection("sub", None, Attrs::new()).unwrap();

    assert_eq!(root.get(1usize).unwrap(), root.get("sub").unwrap());
    assert_eq!(&root.get(0usize).unwrap(), root.child(0).unwrap());

    match root.get(2usize) {
        Err(Error::IndexOutOfRange { index, count }) => assert_eq!((index, count), (2, 2)),
        other => panic!("expected IndexOutOfRange, got {:?}", other),
    }
    assert!(matches!(root.get("nope"), Err(Error::KeyNotFound(_))));
}

#[test]
fn test_rejected_inserts_leave_no_trace() {
    let (_dir, path) = scratch("reject.wt5");
    let mut root = Collection::open(&path, None, Some("root"), Attrs::new()).unwrap();
    root.create_data("d1", None, Attrs::new()).unwrap();

    assert!(matches!(
        root.create_collection("far", Some(5), Attrs::new()),
        Err(Error::IndexOutOfRange { index: 5, count: 1 })
    ));
    assert!(matches!(
        root.create_collection("d1", None, Attrs::new()),
        Err(Error::DuplicateName(_))
    ));
    assert!(matches!(root.create_data("", None, Attrs::new()), Err(Error::InvalidName(_))));

    assert_eq!(root.item_names().unwrap(), ["d1"]);
    assert_eq!(root.group().member_names().unwrap(), ["d1"]);
    assert_eq!(root.len(), 1);
}

#[test]
fn test_dangling_item_name_fails_open() {
    let (_dir, path) = scratch("dangling.wt5");

    {
        let root = Collection::open(&path, None, Some("root"), Attrs::new()).unwrap();
        root.group()
            .set_attr("item_names", AttrValue::byte_strings(["gone"]))
            .unwrap();
        root.store().close().unwrap();
    }

    let err = Collection::open(&path, None, Some("root"), Attrs::new()).unwrap_err();
    assert!(matches!(err, Error::InconsistentState(_)), "got {:?}", err);
}

#[test]
fn test_close_twice_then_closed() {
    let (_dir, path) = scratch("close.wt5");
    let mut root = Collection::open(&path, None, Some("root"), Attrs::new()).unwrap();
    root.create_data("d1", None, Attrs::new()).unwrap();

    root.close().expect("first close");
    root.close().expect("second close is a no-op");
    assert!(root.is_empty());
    assert!(matches!(root.item_names(), Err(Error::Closed(_))));
    assert!(matches!(root.flush(), Err(Error::Closed(_))));
    assert!(matches!(
        root.create_data("d2", None, Attrs::new()),
        Err(Error::Closed(_))
    ));
}

#[test]
fn test_flush_persists_without_close() {
    let (dir, path) = scratch("flush.wt5");
    let mut root = Collection::open(&path, None, Some("root"), Attrs::new()).unwrap();
    root.create_data("d1", None, Attrs::new()).unwrap();
    root.flush().unwrap();

    // A copy of the flushed file already holds the child
    let copy = dir.path().join("copy.wt5");
    std::fs::copy(&path, &copy).unwrap();
    let reread = Collection::open(&copy, None, Some("root"), Attrs::new()).unwrap();
    assert_eq!(reread.item_names().unwrap(), ["d1"]);
}

#[test]
fn test_save_onto_itself() {
    let (_dir, path) = scratch("self.wt5");
    let mut root = Collection::open(&path, None, Some("root"), Attrs::new()).unwrap();
    root.create_data("d1", None, Attrs::new()).unwrap();

    let saved = root.save(Some(path.as_path())).unwrap();
    assert_eq!(saved, path);
    root.close().unwrap();

    let root = Collection::open(&path, None, Some("root"), Attrs::new()).unwrap();
    assert_eq!(root.item_names().unwrap(), ["d1"]);
}

#[test]
fn test_existing_version_is_kept() {
    let (_dir, path) = scratch("version.wt5");

    {
        let store = Store::open(&path).unwrap();
        store.root().set_attr("__version__", "3.1.0").unwrap();
        store.close().unwrap();
    }

    let root = Collection::open(&path, None, Some("root"), Attrs::new()).unwrap();
    assert_eq!(
        root.store().root().attr("__version__").unwrap(),
        Some(AttrValue::from("3.1.0"))
    );
    assert_eq!(root.attrs().unwrap().get_str("__version__"), Some("0.0.0"));
}

#[test]
fn test_custom_default_version() {
    let (_dir, path) = scratch("opts.wt5");
    let opts = StoreOptions::default().default_version("2.0.0").use_mmap(false);
    let root = Collection::open_opts(&path, opts, None, Some("root"), Attrs::new()).unwrap();
    assert_eq!(root.attrs().unwrap().get_str("__version__"), Some("2.0.0"));
}

#[test]
fn test_temporary_collection_is_removed() {
    init_tracing();
    let mut root = Collection::temporary(Some("scratch"), Attrs::new()).unwrap();
    let file = root.filepath().to_path_buf();
    root.create_data("d1", None, Attrs::new()).unwrap();
    assert!(file.exists());
    root.close().unwrap();
    assert!(!file.exists());
}

#[test]
fn test_unreadable_file_is_unavailable() {
    let (_dir, path) = scratch("junk.wt5");
    std::fs::write(&path, b"WTre").unwrap();
    let err = Collection::open(&path, None, None, Attrs::new()).unwrap_err();
    assert!(matches!(err, Error::StorageUnavailable { .. }));
}

#[test]
fn test_equality_is_structural() {
    let (_dir, path) = scratch("eq.wt5");
    let mut root = Collection::open(&path, None, Some("root"), Attrs::new()).unwrap();
    root.create_collection("sub", None, Attrs::new()).unwrap();

    let again = Collection::new(root.store(), None, Some("root"), Attrs::new()).unwrap();
    assert_eq!(root, again);
    assert_ne!(root.get("sub").unwrap(), Child::Collection(again));
}

#[test]
fn test_child_changed_through_fresh_proxy() {
    let (_dir, path) = scratch("proxy.wt5");
    let mut root = Collection::open(&path, None, Some("root"), Attrs::new()).unwrap();
    root.create_collection("sub", None, Attrs::new()).unwrap();

    let mut fresh = root.get("sub").unwrap().into_collection().unwrap();
    fresh.create_data("x", None, Attrs::new()).unwrap();

    let cached = root.get_child_mut("sub").and_then(Child::as_collection_mut).unwrap();
    assert_eq!(cached.len(), cached.item_names().unwrap().len());
    assert_eq!(cached.len(), 1);
    assert!(cached.to_string().contains("[\"x\"]"));

    cached.create_data("y", Some(1), Attrs::new()).expect("insert after external change");
    assert_eq!(cached.item_names().unwrap(), ["x", "y"]);
    assert_eq!(cached.children().len(), 2);
}

#[test]
fn test_nul_in_name_rejected() {
    let (_dir, path) = scratch("nul.wt5");

    {
        let mut root = Collection::open(&path, None, Some("root"), Attrs::new()).unwrap();
        assert!(matches!(
            root.create_data("a\0", None, Attrs::new()),
            Err(Error::InvalidName(_))
        ));
        assert!(matches!(
            root.create_collection("a\0b", None, Attrs::new()),
            Err(Error::InvalidName(_))
        ));
        root.create_data("a", None, Attrs::new()).unwrap();
        root.close().unwrap();
    }

    let root = Collection::open(&path, None, Some("root"), Attrs::new()).expect("reopen");
    assert_eq!(root.item_names().unwrap(), ["a"]);
}

#[test]
fn test_second_flush_changes_nothing() {
    let (_dir, path) = scratch("flush2.wt5");
    let mut root = Collection::open(&path, None, Some("root"), Attrs::new()).unwrap();
    root.create_data("d1", None, Attrs::new()).unwrap();
    root.create_collection("sub", None, Attrs::new()).unwrap();

    root.flush().unwrap();
    let first = std::fs::read(&path).unwrap();
    assert!(!root.store().is_dirty());
    root.flush().unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), first);
}

#[test]
fn test_reads_do_not_dirty_store() {
    let (_dir, path) = scratch("reads.wt5");

    {
        let mut root = Collection::open(&path, None, Some("root"), Attrs::new()).unwrap();
        root.create_data("d1", None, Attrs::new()).unwrap();
        root.create_collection("sub", None, Attrs::new())
            .unwrap()
            .create_data("inner", None, Attrs::new())
            .unwrap();
        root.close().unwrap();
    }

    // Reopening an up-to-date file rebinds every node without changes
    let root = Collection::open(&path, None, Some("root"), Attrs::new()).unwrap();
    assert!(!root.store().is_dirty());
    let before = std::fs::read(&path).unwrap();

    let sub = root.get("sub").unwrap();
    root.get(0usize).unwrap();
    assert_eq!(sub.as_collection().unwrap().item_names().unwrap(), ["inner"]);
    assert_eq!(root.len(), 2);
    println!("{}", root);
    assert!(!root.store().is_dirty());

    root.flush().unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), before);
}
