mod common;

use std::path::{Path, PathBuf};

use asset_cache::{discover_packages, PackageStream};
use common::write_pk3;

struct Layout {
    _root: tempfile::TempDir,
    d1: PathBuf,
    d2: PathBuf,
}

fn layout() -> Layout {
    let root = tempfile::tempdir().unwrap();
    let d1 = root.path().join("d1");
    let d2 = root.path().join("d2");
    write_pk3(&d1, "02-maps.pk3", &[("maps/a.bsp", b"d1-02-a")]);
    write_pk3(
        &d1,
        "01-maps.pk3",
        &[("maps/a.bsp", b"d1-01-a"), ("maps/b.bsp", b"d1-01-b")],
    );
    write_pk3(&d2, "01-maps.pk3", &[("maps/a.bsp", b"d2-01-a")]);
    Layout { _root: root, d1, d2 }
}

fn merged(sources: &[&Path], dedup: bool) -> Vec<(PathBuf, String, Vec<u8>)> {
    let mut stream = PackageStream::new(sources.iter().copied(), dedup);
    let mut out = Vec::new();
    stream
        .for_each(|mut entry| {
            let content = entry.bytes()?.to_vec();
            out.push((entry.package().path(), entry.path().to_string(), content));
            Ok(())
        })
        .unwrap();
    out
}

#[test]
fn dedup_emits_earliest_directory_and_highest_package() {
    let layout = layout();
    let entries = merged(&[&layout.d1, &layout.d2], true);
    assert_eq!(
        entries,
        vec![
            (
                layout.d1.join("02-maps.pk3"),
                "maps/a.bsp".to_string(),
                b"d1-02-a".to_vec()
            ),
            (
                layout.d1.join("01-maps.pk3"),
                "maps/b.bsp".to_string(),
                b"d1-01-b".to_vec()
            ),
        ]
    );
}

#[test]
fn no_dedup_emits_all_occurrences_in_precedence_order() {
    let layout = layout();
    let entries: Vec<(PathBuf, String)> = merged(&[&layout.d1, &layout.d2], false)
        .into_iter()
        .map(|(package, path, _)| (package, path))
        .collect();
    assert_eq!(
        entries,
        vec![
            (layout.d1.join("02-maps.pk3"), "maps/a.bsp".to_string()),
            (layout.d1.join("01-maps.pk3"), "maps/a.bsp".to_string()),
            (layout.d1.join("01-maps.pk3"), "maps/b.bsp".to_string()),
            (layout.d2.join("01-maps.pk3"), "maps/a.bsp".to_string()),
        ]
    );
}

#[test]
fn directory_order_beats_package_names() {
    let layout = layout();
    let entries = merged(&[&layout.d2, &layout.d1], true);
    assert_eq!(entries[0].0, layout.d2.join("01-maps.pk3"));
    assert_eq!(entries[0].2, b"d2-01-a");
    assert_eq!(entries.len(), 2);
}

#[test]
fn stats_count_suppressed_duplicates() {
    let layout = layout();
    let mut stream = PackageStream::new([&layout.d1, &layout.d2], true);
    let stats = stream
        .for_each(|entry| {
            entry.ack();
            Ok(())
        })
        .unwrap();
    assert_eq!(stats.directories, 2);
    assert_eq!(stats.packages, 3);
    assert_eq!(stats.emitted, 2);
    assert_eq!(stats.duplicates, 2);
}

#[test]
fn pull_form_holds_one_entry_at_a_time() {
    let layout = layout();
    let mut stream = PackageStream::new([&layout.d1, &layout.d2], false);
    let mut log = Vec::new();
    while let Some(mut entry) = stream.next_entry().unwrap() {
        log.push(format!("emit {}", entry.path()));
        // Slow consumer: the stream cannot advance while `entry` is alive.
        std::thread::sleep(std::time::Duration::from_millis(5));
        entry.bytes().unwrap();
        log.push(format!("ack {}", entry.path()));
        entry.ack();
    }
    assert_eq!(log.len(), 8);
    for pair in log.chunks(2) {
        assert!(pair[0].starts_with("emit "));
        assert!(pair[1].starts_with("ack "));
    }
    assert!(stream.is_finished());
}

#[test]
fn discovery_lists_processing_order() {
    let layout = layout();
    let names: Vec<String> = discover_packages(&layout.d1)
        .unwrap()
        .into_iter()
        .map(|package| package.file_name)
        .collect();
    assert_eq!(names, vec!["02-maps.pk3", "01-maps.pk3"]);
}
