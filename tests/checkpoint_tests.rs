use wifi_keysearch_rs::checkpoint::CheckpointStore;

#[tokio::test]
async fn missing_checkpoint_loads_as_zero() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path().join("checkpoint.txt"));
    assert_eq!(store.load().await, 0);
}

#[tokio::test]
async fn malformed_checkpoint_fails_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoint.txt");
    std::fs::write(&path, "not a number\n").unwrap();
    assert_eq!(CheckpointStore::new(&path).load().await, 0);
}

#[tokio::test]
async fn save_writes_a_single_decimal_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoint.txt");
    let store = CheckpointStore::new(&path);

    store.save(1234).await.unwrap();
    store.save(5678).await.unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "5678\n");
    assert_eq!(store.load().await, 5678);
    // Nothing left behind from the replace step.
    let names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names, vec![std::ffi::OsString::from("checkpoint.txt")]);
}

#[tokio::test]
async fn stale_tmp_does_not_affect_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoint.txt");
    std::fs::write(&path, "40\n").unwrap();
    // A save interrupted before the rename.
    std::fs::write(dir.path().join("checkpoint.txt.tmp"), "9").unwrap();
    assert_eq!(CheckpointStore::new(&path).load().await, 40);
}

#[tokio::test]
async fn save_into_missing_directory_errors() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path().join("absent").join("checkpoint.txt"));
    assert!(store.save(1).await.is_err());
}
