use anyhow::Result;
use std::fs;
use tempfile::TempDir;

use myfs::attest::FixedFingerprint;
use myfs::config::Config;
use myfs::engine::MyFs;
use myfs::error::MyFsError;

const MACHINE: &str = "test-machine-01";

fn test_config(tmp: &TempDir) -> Config {
    Config::new(
        tmp.path().join("myfs.dat").to_string_lossy().to_string(),
        tmp.path().join("myfs.meta").to_string_lossy().to_string(),
    )
}

fn fingerprint() -> FixedFingerprint {
    FixedFingerprint(MACHINE.to_string())
}

async fn formatted(password: &str) -> Result<(TempDir, Config, MyFs)> {
    let tmp = TempDir::new()?;
    let cfg = test_config(&tmp);
    let fs = MyFs::format(&cfg, password, &fingerprint()).await?;
    Ok((tmp, cfg, fs))
}

#[tokio::test]
async fn plaintext_import_export_roundtrip() -> Result<()> {
    let (tmp, cfg, fs) = formatted("pw1").await?;

    fs.import_file("a.txt", b"hello", "/src/a.txt", false).await?;
    assert_eq!(fs.export_file("a.txt").await?, b"hello");

    // Unencrypted payloads are stored verbatim at the recorded offset
    let entry = fs.stat("a.txt").await?;
    let raw = fs::read(&cfg.data_path)?;
    let stored = &raw[entry.offset as usize..entry.offset as usize + 5];
    assert_eq!(stored, b"hello");

    drop(tmp);
    Ok(())
}

#[tokio::test]
async fn encrypted_import_is_transparent_but_opaque_on_disk() -> Result<()> {
    let (_tmp, cfg, fs) = formatted("pw1").await?;

    fs.import_file("b.txt", b"secret", "/src/b.txt", true).await?;
    assert_eq!(fs.export_file("b.txt").await?, b"secret");

    let entry = fs.stat("b.txt").await?;
    assert!(entry.is_encrypted);
    assert!(entry.file_key.is_some());

    // The container must not hold the plaintext at the payload offset
    let raw = fs::read(&cfg.data_path)?;
    let stored = &raw[entry.offset as usize..entry.offset as usize + entry.stored_len() as usize];
    assert_ne!(&stored[..6], b"secret");
    assert!(!raw
        .windows(b"secret".len())
        .any(|w| w == b"secret"));

    Ok(())
}

#[tokio::test]
async fn open_with_wrong_password_fails() -> Result<()> {
    let (_tmp, cfg, fs) = formatted("pw1").await?;
    drop(fs);

    let err = MyFs::open(&cfg, "pw2", &fingerprint()).await.unwrap_err();
    assert!(matches!(err, MyFsError::WrongPassword));

    assert!(MyFs::open(&cfg, "pw1", &fingerprint()).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn container_survives_reopen() -> Result<()> {
    let (_tmp, cfg, fs) = formatted("pw1").await?;
    fs.import_file("keep.txt", b"persist me", "/src/keep.txt", true).await?;
    drop(fs);

    let fs = MyFs::open(&cfg, "pw1", &fingerprint()).await?;
    assert_eq!(fs.export_file("keep.txt").await?, b"persist me");
    assert_eq!(fs.list_files().await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn format_refuses_to_overwrite() -> Result<()> {
    let (_tmp, cfg, fs) = formatted("pw1").await?;
    drop(fs);

    let err = MyFs::format(&cfg, "pw1", &fingerprint()).await.unwrap_err();
    assert!(matches!(err, MyFsError::AlreadyFormatted(_)));
    Ok(())
}

#[tokio::test]
async fn open_reports_machine_mismatch() -> Result<()> {
    let (_tmp, cfg, fs) = formatted("pw1").await?;
    drop(fs);

    let other = FixedFingerprint("some-other-machine".to_string());
    let err = MyFs::open(&cfg, "pw1", &other).await.unwrap_err();
    match err {
        MyFsError::MachineMismatch { expected, found } => {
            assert_eq!(expected, MACHINE);
            assert_eq!(found, "some-other-machine");
        }
        other => panic!("expected MachineMismatch, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn duplicate_names_are_rejected() -> Result<()> {
    let (_tmp, _cfg, fs) = formatted("pw1").await?;

    fs.import_file("dup.txt", b"first", "/src/dup.txt", false).await?;
    let err = fs
        .import_file("dup.txt", b"second", "/src/dup.txt", false)
        .await
        .unwrap_err();
    assert!(matches!(err, MyFsError::DuplicateName(_)));

    // The original content is untouched
    assert_eq!(fs.export_file("dup.txt").await?, b"first");
    assert_eq!(fs.list_files().await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn capacity_is_capped_at_99_files() -> Result<()> {
    let (_tmp, _cfg, fs) = formatted("pw1").await?;

    for i in 0..99 {
        let name = format!("file_{:02}.txt", i);
        fs.import_file(&name, b"x", "/src", false).await?;
    }
    assert_eq!(fs.list_files().await.len(), 99);

    let err = fs
        .import_file("one_too_many.txt", b"x", "/src", false)
        .await
        .unwrap_err();
    assert!(matches!(err, MyFsError::CapacityExceeded(99)));

    // The failed import must not have mutated state
    assert_eq!(fs.list_files().await.len(), 99);
    assert!(matches!(
        fs.export_file("one_too_many.txt").await.unwrap_err(),
        MyFsError::NotFound(_)
    ));
    Ok(())
}

#[tokio::test]
async fn delete_removes_reference_but_not_bytes() -> Result<()> {
    let (_tmp, cfg, fs) = formatted("pw1").await?;

    fs.import_file("gone.txt", b"doomed bytes", "/src", false).await?;
    let before = fs::metadata(&cfg.data_path)?.len();

    fs.delete_file("gone.txt").await?;
    assert!(matches!(
        fs.export_file("gone.txt").await.unwrap_err(),
        MyFsError::NotFound(_)
    ));
    assert!(fs.list_files().await.is_empty());

    // Deletion is metadata-only: the payload range becomes a hole
    assert_eq!(fs::metadata(&cfg.data_path)?.len(), before);

    // The name is free again
    fs.import_file("gone.txt", b"replacement", "/src", false).await?;
    assert_eq!(fs.export_file("gone.txt").await?, b"replacement");
    Ok(())
}

#[tokio::test]
async fn deleting_missing_file_is_a_clean_failure() -> Result<()> {
    let (_tmp, _cfg, fs) = formatted("pw1").await?;
    fs.import_file("stay.txt", b"here", "/src", false).await?;

    let err = fs.delete_file("absent.txt").await.unwrap_err();
    assert!(matches!(err, MyFsError::NotFound(_)));

    // Failed delete leaves the document unchanged
    assert_eq!(fs.list_files().await, vec![("stay.txt".to_string(), 4, false)]);
    Ok(())
}

#[tokio::test]
async fn change_fs_password_switches_which_password_opens() -> Result<()> {
    let (_tmp, cfg, fs) = formatted("pw1").await?;
    fs.import_file("doc.txt", b"contents", "/src", true).await?;

    fs.change_fs_password("pw1", "pw2").await?;
    drop(fs);

    let err = MyFs::open(&cfg, "pw1", &fingerprint()).await.unwrap_err();
    assert!(matches!(err, MyFsError::WrongPassword));

    // The document under the new password is identical
    let fs = MyFs::open(&cfg, "pw2", &fingerprint()).await?;
    assert_eq!(fs.machine_id().await, MACHINE);
    assert_eq!(fs.export_file("doc.txt").await?, b"contents");
    assert_eq!(fs.list_files().await, vec![("doc.txt".to_string(), 8, true)]);
    Ok(())
}

#[tokio::test]
async fn change_fs_password_requires_the_current_password() -> Result<()> {
    let (_tmp, cfg, fs) = formatted("pw1").await?;

    let err = fs.change_fs_password("wrong", "pw2").await.unwrap_err();
    assert!(matches!(err, MyFsError::WrongPassword));
    drop(fs);

    // Still opens with the original password
    assert!(MyFs::open(&cfg, "pw1", &fingerprint()).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn set_file_password_reencrypts_the_stored_payload() -> Result<()> {
    let (_tmp, cfg, fs) = formatted("pw1").await?;

    fs.import_file("plain.txt", b"was plaintext", "/src", false).await?;
    let old_entry = fs.stat("plain.txt").await?;

    fs.set_file_password("plain.txt", "file-pw").await?;

    let entry = fs.stat("plain.txt").await?;
    assert!(entry.is_encrypted);
    assert!(entry.file_key.is_some());
    assert_ne!(entry.offset, old_entry.offset, "rekey must append a new range");

    // New range holds ciphertext, not the plaintext
    let raw = fs::read(&cfg.data_path)?;
    let stored = &raw[entry.offset as usize..entry.offset as usize + entry.stored_len() as usize];
    assert_ne!(&stored[..13], b"was plaintext");

    // Export stays transparent, before and after reopen
    assert_eq!(fs.export_file("plain.txt").await?, b"was plaintext");
    drop(fs);
    let fs = MyFs::open(&cfg, "pw1", &fingerprint()).await?;
    assert_eq!(fs.export_file("plain.txt").await?, b"was plaintext");
    Ok(())
}

#[tokio::test]
async fn set_file_password_on_missing_file_fails() -> Result<()> {
    let (_tmp, _cfg, fs) = formatted("pw1").await?;
    let err = fs.set_file_password("nope.txt", "pw").await.unwrap_err();
    assert!(matches!(err, MyFsError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn tampered_metadata_never_loads_silently() -> Result<()> {
    let (_tmp, cfg, fs) = formatted("pw1").await?;
    fs.import_file("x.txt", b"payload", "/src", false).await?;
    drop(fs);

    let mut raw = fs::read(&cfg.metadata_path)?;
    let mid = raw.len() / 2;
    raw[mid] ^= 0x01;
    fs::write(&cfg.metadata_path, &raw)?;

    let err = MyFs::open(&cfg, "pw1", &fingerprint()).await.unwrap_err();
    assert!(matches!(
        err,
        MyFsError::WrongPassword | MyFsError::CorruptMetadata(_)
    ));
    Ok(())
}

#[tokio::test]
async fn tampered_payload_fails_authentication_not_lookup() -> Result<()> {
    let (_tmp, cfg, fs) = formatted("pw1").await?;
    fs.import_file("sealed.txt", b"tamper target", "/src", true).await?;

    let entry = fs.stat("sealed.txt").await?;
    let mut raw = fs::read(&cfg.data_path)?;
    raw[entry.offset as usize + 30] ^= 0x01;
    fs::write(&cfg.data_path, &raw)?;

    let err = fs.export_file("sealed.txt").await.unwrap_err();
    assert!(matches!(err, MyFsError::Authentication(_)));
    Ok(())
}

#[tokio::test]
async fn truncated_container_surfaces_short_read() -> Result<()> {
    let (_tmp, cfg, fs) = formatted("pw1").await?;
    fs.import_file("tail.txt", b"trailing content", "/src", false).await?;

    let len = fs::metadata(&cfg.data_path)?.len();
    let file = fs::OpenOptions::new().write(true).open(&cfg.data_path)?;
    file.set_len(len - 4)?;

    let err = fs.export_file("tail.txt").await.unwrap_err();
    assert!(matches!(err, MyFsError::TruncatedRead { .. }));
    Ok(())
}

#[tokio::test]
async fn file_count_tracks_imports_and_deletes() -> Result<()> {
    let (_tmp, _cfg, fs) = formatted("pw1").await?;

    fs.import_file("one.txt", b"1", "/src", false).await?;
    fs.import_file("two.txt", b"22", "/src", true).await?;
    fs.import_file("three.txt", b"333", "/src", false).await?;
    assert_eq!(fs.status().await?.file_count, 3);

    fs.delete_file("two.txt").await?;
    assert_eq!(fs.status().await?.file_count, 2);

    let names: Vec<String> = fs.list_files().await.into_iter().map(|(n, _, _)| n).collect();
    assert_eq!(names, vec!["one.txt", "three.txt"]);
    Ok(())
}

#[tokio::test]
async fn status_accounts_for_holes() -> Result<()> {
    let (_tmp, _cfg, fs) = formatted("pw1").await?;

    fs.import_file("a.bin", &[1u8; 100], "/src", false).await?;
    fs.import_file("b.bin", &[2u8; 50], "/src", false).await?;
    fs.delete_file("a.bin").await?;

    let status = fs.status().await?;
    assert_eq!(status.file_count, 1);
    assert_eq!(status.live_bytes, 50);
    assert_eq!(status.container_len, status.header_size + 150);
    Ok(())
}

#[tokio::test]
async fn concurrent_exports_share_the_session() -> Result<()> {
    let (_tmp, _cfg, fs) = formatted("pw1").await?;
    for i in 0..5 {
        let name = format!("c{}.txt", i);
        let data = format!("content {}", i);
        fs.import_file(&name, data.as_bytes(), "/src", i % 2 == 0).await?;
    }

    let fs = std::sync::Arc::new(fs);
    let mut handles = Vec::new();
    for i in 0..5 {
        let fs = fs.clone();
        handles.push(tokio::spawn(async move {
            fs.export_file(&format!("c{}.txt", i)).await
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let data = handle.await??;
        assert_eq!(data, format!("content {}", i).as_bytes());
    }
    Ok(())
}
