use std::fs;
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use depot_core::ArtifactCache;
use sha2::{Digest, Sha256};
use tiny_http::{Response, Server};

#[test]
fn caching_identical_content_is_idempotent() {
    let temp = tempfile::tempdir().unwrap();
    let cache = ArtifactCache::new(temp.path().join("cache")).unwrap();
    let source = temp.path().join("latest.zip");
    fs::write(&source, b"plugin payload").unwrap();

    let first = cache.cache_file(&source).unwrap().unwrap();
    let second = cache.cache_file(&source).unwrap().unwrap();

    let expected_hash = hex::encode(Sha256::digest(b"plugin payload"));
    assert_eq!(first.hashed_name, format!("latest.{expected_hash}.zip"));
    assert_eq!(first.hashed_name, second.hashed_name);
    assert_eq!(first.content_hash, expected_hash);
    assert_eq!(fs::read(&first.path).unwrap(), b"plugin payload");
}

#[test]
fn identical_content_from_different_paths_shares_one_name() {
    let temp = tempfile::tempdir().unwrap();
    let cache = ArtifactCache::new(temp.path().join("cache")).unwrap();
    let dir_a = temp.path().join("a");
    let dir_b = temp.path().join("b");
    fs::create_dir_all(&dir_a).unwrap();
    fs::create_dir_all(&dir_b).unwrap();
    fs::write(dir_a.join("latest.zip"), b"same bytes").unwrap();
    fs::write(dir_b.join("latest.zip"), b"same bytes").unwrap();

    let a = cache.cache_file(&dir_a.join("latest.zip")).unwrap().unwrap();
    let b = cache.cache_file(&dir_b.join("latest.zip")).unwrap().unwrap();
    assert_eq!(a.hashed_name, b.hashed_name);
    assert_eq!(a.path, b.path);
}

#[test]
fn missing_source_file_is_a_soft_skip() {
    let temp = tempfile::tempdir().unwrap();
    let cache = ArtifactCache::new(temp.path().join("cache")).unwrap();
    let record = cache.cache_file(&temp.path().join("nope.zip")).unwrap();
    assert!(record.is_none());
}

#[test]
fn download_skips_existing_and_force_refetches() {
    let temp = tempfile::tempdir().unwrap();
    let cache = ArtifactCache::new(temp.path().join("cache")).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::from_listener(listener, None).unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let server_hits = hits.clone();
    thread::spawn(move || {
        for request in server.incoming_requests() {
            let hit = server_hits.fetch_add(1, Ordering::SeqCst) + 1;
            let body = if hit == 1 { "first" } else { "second" };
            let _ = request.respond(Response::from_string(body));
        }
    });

    let url = format!("http://{addr}/files/asset.bin");
    let path = cache.download_file(&url, false).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "first");
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // Present on disk: no network call at all.
    let again = cache.download_file(&url, false).unwrap();
    assert_eq!(again, path);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(fs::read_to_string(&again).unwrap(), "first");

    // Forced: always re-fetches and overwrites.
    let forced = cache.download_file(&url, true).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(fs::read_to_string(&forced).unwrap(), "second");
}
