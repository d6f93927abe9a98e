//! Overlay and mirror reconciliation over tarball and directory sources

use std::fs::{self, File};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Builder, EntryType, Header};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use atomos_sync::{force_remove_all, Synchronizer};

fn header(kind: EntryType, mode: u32, size: u64) -> Header {
    let mut h = Header::new_gnu();
    h.set_entry_type(kind);
    h.set_mode(mode);
    h.set_size(size);
    h.set_uid(0);
    h.set_gid(0);
    h.set_mtime(1_700_000_000);
    h
}

/// Image-like tarball: /etc with an os-release, /var with a log file.
fn write_image(path: &Path) {
    let enc = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    let mut b = Builder::new(enc);

    let mut h = header(EntryType::Directory, 0o755, 0);
    b.append_data(&mut h, "etc", std::io::empty()).unwrap();
    let mut h = header(EntryType::Regular, 0o644, 10);
    b.append_data(&mut h, "etc/os-release", &b"ID=atomos\n"[..])
        .unwrap();
    let mut h = header(EntryType::Directory, 0o755, 0);
    b.append_data(&mut h, "var", std::io::empty()).unwrap();
    let mut h = header(EntryType::Directory, 0o755, 0);
    b.append_data(&mut h, "var/log", std::io::empty()).unwrap();
    let mut h = header(EntryType::Regular, 0o600, 5);
    b.append_data(&mut h, "var/log/messages", &b"boot\n"[..])
        .unwrap();

    b.into_inner().unwrap().finish().unwrap();
}

fn touch(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn paths(items: &[&str]) -> Vec<PathBuf> {
    items.iter().map(PathBuf::from).collect()
}

#[tokio::test]
async fn overlay_preserves_unrelated_destination_content() {
    let tmp = TempDir::new().unwrap();
    let image = tmp.path().join("image.tar.gz");
    let dest = tmp.path().join("root");
    write_image(&image);

    touch(&dest.join("etc/os-release"), "stale");
    touch(&dest.join("etc/local.conf"), "keep me");

    let sync = Synchronizer::tarball(&image);
    sync.overlay(CancellationToken::new(), &dest, &[])
        .await
        .unwrap();

    // Overwritten from the image, but untracked content survives.
    assert_eq!(
        fs::read_to_string(dest.join("etc/os-release")).unwrap(),
        "ID=atomos\n"
    );
    assert_eq!(
        fs::read_to_string(dest.join("etc/local.conf")).unwrap(),
        "keep me"
    );
    assert_eq!(
        fs::read_to_string(dest.join("var/log/messages")).unwrap(),
        "boot\n"
    );
}

#[tokio::test]
async fn overlay_exclusion_is_segment_exact() {
    let tmp = TempDir::new().unwrap();
    let image = tmp.path().join("image.tar.gz");
    let dest = tmp.path().join("root");
    write_image(&image);

    let sync = Synchronizer::tarball(&image);
    sync.overlay(CancellationToken::new(), &dest, &paths(&["etc/os"]))
        .await
        .unwrap();

    // "etc/os" must not suppress the sibling "etc/os-release".
    assert!(dest.join("etc/os-release").exists());
}

#[tokio::test]
async fn mirror_deletes_stale_content_but_not_excluded() {
    let tmp = TempDir::new().unwrap();
    let image = tmp.path().join("image.tar.gz");
    let dest = tmp.path().join("root");
    write_image(&image);

    touch(&dest.join("etc/stale.conf"), "old");
    touch(&dest.join("etc/atomos/state"), "precious");

    let sync = Synchronizer::tarball(&image);
    sync.mirror(
        CancellationToken::new(),
        &dest,
        &paths(&["/etc/atomos"]),
        &[],
    )
    .await
    .unwrap();

    assert!(!dest.join("etc/stale.conf").exists());
    assert_eq!(
        fs::read_to_string(dest.join("etc/atomos/state")).unwrap(),
        "precious"
    );
    assert_eq!(
        fs::read_to_string(dest.join("etc/os-release")).unwrap(),
        "ID=atomos\n"
    );
}

#[tokio::test]
async fn mirror_with_include_never_touches_outside_scope() {
    let tmp = TempDir::new().unwrap();
    let image = tmp.path().join("image.tar.gz");
    let dest = tmp.path().join("root");
    write_image(&image);

    touch(&dest.join("home/user/notes.txt"), "mine");
    touch(&dest.join("var/stale.log"), "old");

    let sync = Synchronizer::tarball(&image);
    sync.mirror(CancellationToken::new(), &dest, &[], &paths(&["var"]))
        .await
        .unwrap();

    // In-scope content reconciled
    assert!(dest.join("var/log/messages").exists());
    assert!(!dest.join("var/stale.log").exists());
    // Out-of-scope content untouched, and /etc from the image not extracted
    assert_eq!(
        fs::read_to_string(dest.join("home/user/notes.txt")).unwrap(),
        "mine"
    );
    assert!(!dest.join("etc/os-release").exists());
}

#[tokio::test]
async fn mirror_prunes_write_protected_trees() {
    let tmp = TempDir::new().unwrap();
    let image = tmp.path().join("image.tar.gz");
    let dest = tmp.path().join("root");
    write_image(&image);

    let locked = dest.join("var/locked");
    touch(&locked.join("inner.txt"), "sealed");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o500)).unwrap();

    let sync = Synchronizer::tarball(&image);
    sync.mirror(CancellationToken::new(), &dest, &[], &[])
        .await
        .unwrap();

    assert!(!locked.exists());
}

/// Image keeping a read-only directory with a read-only file inside
fn write_locked_image(path: &Path) {
    let enc = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    let mut b = Builder::new(enc);

    let mut h = header(EntryType::Directory, 0o755, 0);
    b.append_data(&mut h, "var", std::io::empty()).unwrap();
    let mut h = header(EntryType::Directory, 0o500, 0);
    b.append_data(&mut h, "var/locked", std::io::empty()).unwrap();
    let mut h = header(EntryType::Regular, 0o400, 4);
    b.append_data(&mut h, "var/locked/keep.txt", &b"keep"[..])
        .unwrap();

    b.into_inner().unwrap().finish().unwrap();
}

#[tokio::test]
async fn mirror_restores_kept_directory_modes_after_pruning() {
    let tmp = TempDir::new().unwrap();
    let image = tmp.path().join("image.tar.gz");
    let dest = tmp.path().join("root");
    write_locked_image(&image);

    // Stale file inside what will become a kept read-only directory; the
    // deletion pass has to widen the directory to remove it and must hand
    // the original bits back afterwards.
    touch(&dest.join("var/locked/stale.txt"), "old");

    let sync = Synchronizer::tarball(&image);
    sync.mirror(CancellationToken::new(), &dest, &[], &[])
        .await
        .unwrap();

    let locked = dest.join("var/locked");
    assert!(!locked.join("stale.txt").exists());
    assert!(locked.join("keep.txt").exists());
    let mode = fs::metadata(&locked).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o500);

    // TempDir cleanup needs the directory writable again.
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o700)).unwrap();
}

#[tokio::test]
async fn mirror_digest_is_stable_across_runs() {
    let tmp = TempDir::new().unwrap();
    let image = tmp.path().join("image.tar.gz");
    write_image(&image);

    let sync = Synchronizer::tarball(&image);
    let first = sync
        .mirror(CancellationToken::new(), &tmp.path().join("a"), &[], &[])
        .await
        .unwrap();
    let second = sync
        .mirror(CancellationToken::new(), &tmp.path().join("b"), &[], &[])
        .await
        .unwrap();
    assert_eq!(first, second);
}

fn write_dir_source(root: &Path) {
    touch(&root.join("etc/os-release"), "ID=atomos\n");
    touch(&root.join("usr/bin/tool"), "#!/bin/sh\n");
    fs::set_permissions(
        root.join("usr/bin/tool"),
        fs::Permissions::from_mode(0o755),
    )
    .unwrap();
    std::os::unix::fs::symlink("tool", root.join("usr/bin/tool-alias")).unwrap();
}

#[tokio::test]
async fn directory_source_overlay_copies_tree() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("source");
    let dest = tmp.path().join("root");
    write_dir_source(&source);

    let sync = Synchronizer::directory(&source);
    sync.overlay(CancellationToken::new(), &dest, &[])
        .await
        .unwrap();

    assert_eq!(
        fs::read_to_string(dest.join("etc/os-release")).unwrap(),
        "ID=atomos\n"
    );
    let mode = fs::metadata(dest.join("usr/bin/tool"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o755);
    assert_eq!(
        fs::read_link(dest.join("usr/bin/tool-alias")).unwrap(),
        PathBuf::from("tool")
    );
}

#[tokio::test]
async fn directory_source_mirror_reconciles_and_hashes_deterministically() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("source");
    let dest = tmp.path().join("root");
    write_dir_source(&source);

    touch(&dest.join("etc/stale.conf"), "old");

    let sync = Synchronizer::directory(&source);
    let first = sync
        .mirror(CancellationToken::new(), &dest, &[], &[])
        .await
        .unwrap();
    assert!(!dest.join("etc/stale.conf").exists());
    assert!(dest.join("usr/bin/tool").exists());

    let second = sync
        .mirror(CancellationToken::new(), &tmp.path().join("other"), &[], &[])
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn force_remove_clears_write_protected_tree() {
    let tmp = TempDir::new().unwrap();
    let doomed = tmp.path().join("doomed");
    touch(&doomed.join("deep/nested/file.txt"), "x");
    fs::set_permissions(
        doomed.join("deep/nested"),
        fs::Permissions::from_mode(0o500),
    )
    .unwrap();
    fs::set_permissions(doomed.join("deep"), fs::Permissions::from_mode(0o500)).unwrap();

    force_remove_all(&doomed).await.unwrap();
    assert!(!doomed.exists());
}
