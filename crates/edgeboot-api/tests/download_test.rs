#![allow(clippy::unwrap_used)]
// Integration tests for `Downloader` using wiremock.

use std::io::{Cursor, Write};

use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use edgeboot_api::{Downloader, Error, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, Downloader) {
    let server = MockServer::start().await;
    let http = TransportConfig::for_downloads().build_client().unwrap();
    (server, Downloader::from_reqwest(http))
}

fn url(server: &MockServer, p: &str) -> Url {
    Url::parse(&format!("{}{p}", server.uri())).unwrap()
}

fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let opts = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, data) in entries {
        writer.start_file(*name, opts).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

// ── Plain downloads ─────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_writes_executable_file() {
    let (server, dl) = setup().await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("cloudflared");

    Mock::given(method("GET"))
        .and(path("/bin/cloudflared"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"binary-bytes".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let n = dl.fetch_to(&url(&server, "/bin/cloudflared"), &dest).await.unwrap();
    assert_eq!(n, 12);
    assert_eq!(std::fs::read(&dest).unwrap(), b"binary-bytes");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    // no staging leftovers
    let names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["cloudflared".to_owned()]);
}

#[tokio::test]
async fn test_single_redirect_is_followed() {
    let (server, dl) = setup().await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("agent");

    Mock::given(method("GET"))
        .and(path("/releases/latest/agent"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/cdn/agent"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cdn/agent"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"agent".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    dl.fetch_to(&url(&server, "/releases/latest/agent"), &dest)
        .await
        .unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), b"agent");
}

#[tokio::test]
async fn test_second_redirect_is_rejected() {
    let (server, dl) = setup().await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("agent");

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/b"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/c"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/c"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"never".to_vec()))
        .expect(0)
        .mount(&server)
        .await;

    let err = dl.fetch_to(&url(&server, "/a"), &dest).await.unwrap_err();
    assert!(matches!(err, Error::Redirect { .. }), "got {err:?}");
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_http_error_leaves_no_file() {
    let (server, dl) = setup().await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("xray");

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = dl.fetch_to(&url(&server, "/missing"), &dest).await.unwrap_err();
    assert!(matches!(err, Error::Status { status: 404, .. }));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

// ── Archives ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_zip_entry_is_extracted_and_archive_removed() {
    let (server, dl) = setup().await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("xray");

    let archive = zip_with(&[
        ("geoip.dat", b"geo"),
        ("xray", b"core-binary"),
        ("README.md", b"docs"),
    ]);
    Mock::given(method("GET"))
        .and(path("/Xray-linux-64.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .mount(&server)
        .await;

    let n = dl
        .fetch_entry(&url(&server, "/Xray-linux-64.zip"), "xray", &dest)
        .await
        .unwrap();
    assert_eq!(n, 11);
    assert_eq!(std::fs::read(&dest).unwrap(), b"core-binary");

    let names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["xray".to_owned()]);
}

#[tokio::test]
async fn test_zip_without_entry_is_an_error() {
    let (server, dl) = setup().await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("xray");

    Mock::given(method("GET"))
        .and(path("/empty.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(zip_with(&[("other", b"x")])))
        .mount(&server)
        .await;

    let err = dl
        .fetch_entry(&url(&server, "/empty.zip"), "xray", &dest)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Archive(_)));
    assert!(!dest.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
