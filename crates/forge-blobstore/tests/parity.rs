use chrono::NaiveDate;
use forge_blobstore::{
    BlobStore, BlobStoreError, BlobStoreResult, DaySource, FsBlobStore, MemoryBlobStore,
    OrchestrationInstance, parse_key,
};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

async fn exercise_round_trip<S: BlobStore>(store: &S) -> BlobStoreResult<()> {
    let content = b"test stream content";
    let key = "20101003|testBlobName";
    store.save(key, content).await?;
    assert_eq!(store.load(key).await?, content);

    let instance = OrchestrationInstance::new("order-42", "exec-1");
    let message_key = store.build_message_storage_key(Some(&instance), DaySource::Today)?;
    store.save(&message_key, b"message body").await?;
    assert_eq!(store.load(&message_key).await?, b"message body");

    store.save(&message_key, b"rewritten").await?;
    assert_eq!(store.load(&message_key).await?, b"rewritten");
    Ok(())
}

async fn exercise_unusual_instance_ids<S: BlobStore>(store: &S) -> BlobStoreResult<()> {
    for instance_id in ["nightly.tmp", "..", ".", "tenant\\order", "100%"] {
        let instance = OrchestrationInstance::new(instance_id, "exec-1");
        let key = store.build_message_storage_key(Some(&instance), DaySource::Today)?;
        store.save(&key, instance_id.as_bytes()).await?;
        assert_eq!(store.load(&key).await?, instance_id.as_bytes());
    }
    Ok(())
}

async fn exercise_purge_expired<S: BlobStore>(store: &S) -> BlobStoreResult<Vec<String>> {
    let content = b"test stream content";
    let mut kept = Vec::new();
    for (key, date) in [
        ("20150516|a", day(2015, 5, 16)),
        ("20150517|b", day(2015, 5, 17)),
        ("20150518|c", day(2015, 5, 18)),
    ] {
        store.save(key, content).await?;
        if date >= day(2015, 5, 17) {
            kept.push(key.to_string());
        }
    }
    let session_key = store.build_session_storage_key("session123")?;
    store.save(&session_key, content).await?;
    kept.push(session_key);

    let purged = store.purge_expired(day(2015, 5, 17)).await?;
    assert_eq!(purged, 1);

    assert!(matches!(
        store.load("20150516|a").await,
        Err(BlobStoreError::NotFound { .. })
    ));
    for key in &kept {
        assert_eq!(store.load(key).await?, content);
    }

    let second = store.purge_expired(day(2015, 5, 17)).await?;
    assert_eq!(second, 0);
    Ok(kept)
}

async fn exercise_delete_all<S: BlobStore>(store: &S) -> BlobStoreResult<()> {
    store.save("blob-20150516|a", b"1").await?;
    store.save("message-20150517|x/y/b", b"2").await?;
    let deleted = store.delete_all().await?;
    assert_eq!(deleted, 2);
    assert!(matches!(
        store.load("blob-20150516|a").await,
        Err(BlobStoreError::NotFound { .. })
    ));
    assert_eq!(store.delete_all().await?, 0);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn memory_and_fs_round_trip_expected_same_behavior() {
    let memory = MemoryBlobStore::new("testhub").expect("memory store should initialize");
    exercise_round_trip(&memory)
        .await
        .expect("memory round trip should succeed");

    let tmp = tempfile::tempdir().expect("tempdir should be created");
    let fs = FsBlobStore::new(tmp.path(), "testhub").expect("fs store should initialize");
    exercise_round_trip(&fs)
        .await
        .expect("fs round trip should succeed");
}

#[tokio::test(flavor = "current_thread")]
async fn memory_and_fs_accept_same_instance_ids() {
    let memory = MemoryBlobStore::new("testhub").expect("memory store should initialize");
    exercise_unusual_instance_ids(&memory)
        .await
        .expect("memory store should accept every instance id");

    let tmp = tempfile::tempdir().expect("tempdir should be created");
    let fs = FsBlobStore::new(tmp.path(), "testhub").expect("fs store should initialize");
    exercise_unusual_instance_ids(&fs)
        .await
        .expect("fs store should accept every instance id");
    assert_eq!(fs.container_names().expect("fs names").len(), 1);
    assert_eq!(
        std::fs::read_dir(tmp.path()).expect("root should list").count(),
        1,
        "nothing may be written outside the container"
    );
}

#[tokio::test(flavor = "current_thread")]
async fn memory_and_fs_purge_expected_same_containers() {
    let memory = MemoryBlobStore::new("testhub").expect("memory store should initialize");
    exercise_purge_expired(&memory)
        .await
        .expect("memory purge should succeed");
    let memory_containers = memory.container_names().expect("memory names");

    let tmp = tempfile::tempdir().expect("tempdir should be created");
    let fs = FsBlobStore::new(tmp.path(), "testhub").expect("fs store should initialize");
    exercise_purge_expired(&fs)
        .await
        .expect("fs purge should succeed");
    let fs_containers = fs.container_names().expect("fs names");

    assert_eq!(memory_containers, fs_containers);
    assert_eq!(memory_containers.len(), 3);
    assert!(memory_containers[0].ends_with("20150517"));
    assert!(memory_containers[1].ends_with("20150518"));
    assert!(memory_containers[2].starts_with("testhub-session-"));
}

#[tokio::test(flavor = "current_thread")]
async fn memory_and_fs_delete_all_expected_same_behavior() {
    let memory = MemoryBlobStore::new("testhub").expect("memory store should initialize");
    exercise_delete_all(&memory)
        .await
        .expect("memory delete_all should succeed");

    let tmp = tempfile::tempdir().expect("tempdir should be created");
    let fs = FsBlobStore::new(tmp.path(), "testhub").expect("fs store should initialize");
    exercise_delete_all(&fs)
        .await
        .expect("fs delete_all should succeed");
}

#[tokio::test(flavor = "current_thread")]
async fn purge_never_touches_todays_container() {
    let store = MemoryBlobStore::new("testhub").expect("memory store should initialize");
    let key = store
        .build_storage_key(DaySource::Today)
        .expect("key should build");
    store.save(&key, b"fresh").await.expect("save should succeed");

    let today = chrono::Utc::now().date_naive();
    let purged = store
        .purge_expired(today)
        .await
        .expect("purge should succeed");

    assert_eq!(purged, 0);
    assert_eq!(store.load(&key).await.expect("blob should survive"), b"fresh");
    assert_eq!(
        parse_key(&key).expect("key should parse").day(),
        Some(today)
    );
}

#[tokio::test(flavor = "current_thread")]
async fn concurrent_writers_never_collide() {
    let store = MemoryBlobStore::new("testhub").expect("memory store should initialize");
    let mut tasks = Vec::new();
    for writer in 0..16u8 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let key = store.build_storage_key(DaySource::Today)?;
            store.save(&key, &[writer]).await?;
            Ok::<_, BlobStoreError>((key, writer))
        }));
    }

    let mut keys = Vec::new();
    for task in tasks {
        let (key, writer) = task
            .await
            .expect("writer task should join")
            .expect("writer should succeed");
        assert_eq!(store.load(&key).await.expect("load should succeed"), vec![writer]);
        keys.push(key);
    }
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), 16);
}
