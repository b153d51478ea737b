//! Identifier store tests: stability, pruning, and invalidation.

use super::*;
use crate::transport::{ProtectionStatus, ROOT_CHILDREN, format};

fn storage(storage_id: StorageId, description: &str) -> StorageRecord {
    StorageRecord {
        storage_id,
        description: description.to_string(),
        free_space: 1024,
        total_space: 2048,
        volume_identifier: String::new(),
    }
}

fn object(handle: u32, name: &str) -> ObjectInfo {
    ObjectInfo {
        handle,
        storage_id: 1,
        parent: ROOT_CHILDREN,
        format: format::EXIF_JPEG,
        name: name.to_string(),
        modified_at: Some(1_422_716_400_000),
        size: 1024,
        protection: ProtectionStatus::None,
        thumb_compressed_size: 0,
    }
}

#[test]
fn test_put_roots_assigns_sequential_ids_in_order() {
    let mut store = DocumentStore::new();
    let ids = store.put_roots(0, "Device A", &[storage(1, "Storage A"), storage(2, "Storage B")]);
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(store.storage_root_ids(0), &[1, 2]);
}

#[test]
fn test_put_roots_reuses_ids_across_rescans() {
    let mut store = DocumentStore::new();
    let first = store.put_roots(0, "Device A", &[storage(1, "Storage A")]);

    // Same storage, updated space: same identifier, updated record.
    let mut updated = storage(1, "Storage A");
    updated.free_space = 512;
    let second = store.put_roots(0, "Device A", &[updated]);
    assert_eq!(first, second);

    let record = store.document(first[0]).unwrap();
    match &record.kind {
        DocumentKind::StorageRoot { storage } => assert_eq!(storage.free_space, 512),
        other => panic!("unexpected kind: {:?}", other),
    }
}

#[test]
fn test_put_roots_prunes_vanished_storages() {
    let mut store = DocumentStore::new();
    let ids = store.put_roots(0, "Device A", &[storage(1, "Storage A"), storage(2, "Storage B")]);

    let kept = store.put_roots(0, "Device A", &[storage(2, "Storage B")]);
    assert_eq!(kept, vec![ids[1]]);
    assert!(store.document(ids[0]).is_none());
    assert!(store.document(ids[1]).is_some());
}

#[test]
fn test_put_roots_volume_identifier_survives_storage_id_change() {
    let mut store = DocumentStore::new();
    let mut card = storage(1, "SD Card");
    card.volume_identifier = "serial-1234".to_string();
    let first = store.put_roots(0, "Device A", &[card.clone()]);

    // Reattachment reassigned the storage id; the volume identifier matches.
    card.storage_id = 7;
    let second = store.put_roots(0, "Device A", &[card]);
    assert_eq!(first, second);
}

#[test]
fn test_put_roots_without_volume_identifier_keys_on_storage_id() {
    let mut store = DocumentStore::new();
    let first = store.put_roots(0, "Device A", &[storage(1, "Storage A")]);
    let second = store.put_roots(0, "Device A", &[storage(2, "Storage A")]);
    assert_ne!(first, second);
    assert!(store.document(first[0]).is_none());
}

#[test]
fn test_empty_roots_keep_a_stable_placeholder() {
    let mut store = DocumentStore::new();
    assert!(store.put_roots(0, "Device A", &[]).is_empty());
    let placeholder = store.device_root(0).expect("placeholder root");

    // Another empty cycle keeps the same placeholder id.
    store.put_roots(0, "Device A", &[]);
    assert_eq!(store.device_root(0), Some(placeholder));

    // Storages showing up retire the placeholder.
    store.put_roots(0, "Device A", &[storage(1, "Storage A")]);
    assert_eq!(store.device_root(0), None);
    assert!(store.document(placeholder).is_none());
}

#[test]
fn test_put_child_documents_reuses_by_handle() {
    let mut store = DocumentStore::new();
    let roots = store.put_roots(0, "Device A", &[storage(1, "Storage A")]);
    let parent = roots[0];

    let first = store
        .put_child_documents(0, 1, parent, &[object(100, "a.jpg"), object(101, "b.jpg")])
        .unwrap();

    // Re-listing in a different order keeps identifiers with their handles.
    let second = store
        .put_child_documents(0, 1, parent, &[object(101, "b.jpg"), object(100, "a.jpg")])
        .unwrap();
    assert_eq!(second, vec![first[1], first[0]]);
}

#[test]
fn test_put_child_documents_prunes_absent_objects() {
    let mut store = DocumentStore::new();
    let roots = store.put_roots(0, "Device A", &[storage(1, "Storage A")]);
    let parent = roots[0];

    let first = store
        .put_child_documents(0, 1, parent, &[object(100, "a.jpg"), object(101, "b.jpg")])
        .unwrap();
    let second = store.put_child_documents(0, 1, parent, &[object(101, "b.jpg")]).unwrap();

    assert_eq!(second, vec![first[1]]);
    assert!(store.document(first[0]).is_none());
}

#[test]
fn test_put_child_documents_prunes_subtrees() {
    let mut store = DocumentStore::new();
    let roots = store.put_roots(0, "Device A", &[storage(1, "Storage A")]);

    let mut dir = object(10, "DCIM");
    dir.format = format::ASSOCIATION;
    let dirs = store.put_child_documents(0, 1, roots[0], &[dir]).unwrap();
    let nested = store.put_child_documents(0, 1, dirs[0], &[object(100, "a.jpg")]).unwrap();

    // Directory vanishes: its child mapping goes with it.
    store.put_child_documents(0, 1, roots[0], &[]).unwrap();
    assert!(store.document(dirs[0]).is_none());
    assert!(store.document(nested[0]).is_none());
}

#[test]
fn test_put_child_documents_unknown_parent() {
    let mut store = DocumentStore::new();
    assert!(store.put_child_documents(0, 1, 99, &[object(100, "a.jpg")]).is_none());
}

#[test]
fn test_same_handle_under_different_parents_gets_distinct_ids() {
    let mut store = DocumentStore::new();
    let roots = store.put_roots(0, "Device A", &[storage(1, "Storage A"), storage(2, "Storage B")]);

    let under_a = store.put_child_documents(0, 1, roots[0], &[object(100, "a.jpg")]).unwrap();
    let under_b = store.put_child_documents(0, 2, roots[1], &[object(100, "a.jpg")]).unwrap();
    assert_ne!(under_a[0], under_b[0]);
}

#[test]
fn test_parent_of() {
    let mut store = DocumentStore::new();
    let roots = store.put_roots(0, "Device A", &[storage(1, "Storage A")]);
    let children = store.put_child_documents(0, 1, roots[0], &[object(100, "a.jpg")]).unwrap();

    assert_eq!(store.parent_of(children[0]), Some(roots[0]));
    // Roots of a device have no parent; unknown ids resolve to nothing.
    assert_eq!(store.parent_of(roots[0]), None);
    assert_eq!(store.parent_of(999), None);
}

#[test]
fn test_remove_document_detaches_from_parent_listing() {
    let mut store = DocumentStore::new();
    let roots = store.put_roots(0, "Device A", &[storage(1, "Storage A")]);
    let children = store
        .put_child_documents(0, 1, roots[0], &[object(100, "a.jpg"), object(101, "b.jpg")])
        .unwrap();

    store.remove_document(children[0]);
    assert!(store.document(children[0]).is_none());

    // The surviving sibling keeps its identifier on the next listing.
    let relisted = store.put_child_documents(0, 1, roots[0], &[object(101, "b.jpg")]).unwrap();
    assert_eq!(relisted, vec![children[1]]);
}

#[test]
fn test_clear_device_is_scoped_to_one_device() {
    let mut store = DocumentStore::new();
    let roots_a = store.put_roots(0, "Device A", &[storage(1, "Storage A")]);
    let roots_b = store.put_roots(1, "Device B", &[storage(1, "Storage B")]);
    store.put_child_documents(0, 1, roots_a[0], &[object(100, "a.jpg")]).unwrap();

    store.clear_device(0);

    assert!(store.document(roots_a[0]).is_none());
    assert!(store.storage_root_ids(0).is_empty());
    assert!(store.document(roots_b[0]).is_some());
    assert_eq!(store.len(), 1);
}

#[test]
fn test_identifiers_are_never_raw_handles() {
    let mut store = DocumentStore::new();
    let roots = store.put_roots(0, "Device A", &[storage(1, "Storage A")]);
    // Handle 100 must not leak through as the identifier value.
    let children = store.put_child_documents(0, 1, roots[0], &[object(100, "a.jpg")]).unwrap();
    assert_eq!(children, vec![2]);
}
