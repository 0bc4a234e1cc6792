//! End-to-end downloads of plain HTTP links through the default extractor and
//! HTTP transfer strategies, served by a local mock server

mod common;

use common::Recorder;
use media_dl::{Config, Error, Job, JobState, MediaDownloader, TransferError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BODY: &[u8] = b"0123456789";

fn config(dir: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    config.download.target_dir = Some(dir.path().to_path_buf());
    config.retry.delay = 1;
    config.retry.tick = Duration::from_millis(10);
    config
}

async fn mount_head(server: &MockServer, route: &str) {
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(BODY)
                .insert_header("content-type", "video/mp4")
                .insert_header("accept-ranges", "bytes"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_direct_link_downloads_into_target_dir() {
    let server = MockServer::start().await;
    mount_head(&server, "/media/Trailer.mp4").await;
    Mock::given(method("GET"))
        .and(path("/media/Trailer.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(BODY))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let downloader = MediaDownloader::new(config(&dir)).unwrap();
    let recorder = Recorder::default();

    let mut job = Job::new(format!("{}/media/Trailer.mp4", server.uri()).parse().unwrap());
    downloader
        .download(&mut job, &CancellationToken::new(), &recorder)
        .await
        .unwrap();

    assert_eq!(job.state(), JobState::Done);
    assert_eq!(job.title(), "Trailer");
    assert_eq!(job.size(), Some(10));
    assert_eq!(
        std::fs::read(dir.path().join("Trailer.mp4")).unwrap(),
        BODY
    );
    assert_eq!(recorder.last().unwrap().downloaded, 10);
}

#[tokio::test]
async fn test_forced_target_resumes_with_range_request() {
    let server = MockServer::start().await;
    mount_head(&server, "/media/Trailer.mp4").await;
    Mock::given(method("GET"))
        .and(path("/media/Trailer.mp4"))
        .and(header("Range", "bytes=4-"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(&BODY[4..]))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("partial.mp4");
    std::fs::write(&target, &BODY[..4]).unwrap();

    let downloader = MediaDownloader::new(config(&dir)).unwrap();
    let mut job = Job::new(format!("{}/media/Trailer.mp4", server.uri()).parse().unwrap())
        .with_target(&target);
    downloader
        .download(&mut job, &CancellationToken::new(), &Recorder::default())
        .await
        .unwrap();

    assert_eq!(std::fs::read(&target).unwrap(), BODY);
}

#[tokio::test]
async fn test_missing_media_ends_in_error() {
    let server = MockServer::start().await;
    mount_head(&server, "/media/Gone.mp4").await;
    Mock::given(method("GET"))
        .and(path("/media/Gone.mp4"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let downloader = MediaDownloader::new(config(&dir)).unwrap();
    let mut job = Job::new(format!("{}/media/Gone.mp4", server.uri()).parse().unwrap());
    let err = downloader
        .download(&mut job, &CancellationToken::new(), &Recorder::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Transfer(TransferError::NotFound { .. })));
    assert_eq!(job.state(), JobState::Error);
}

#[tokio::test]
async fn test_html_page_is_never_saved() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/media/Clip"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"<html>sign in</html>".to_vec())
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"<html>sign in</html>".to_vec()))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let downloader = MediaDownloader::new(config(&dir)).unwrap();
    let mut job = Job::new(format!("{}/media/Clip", server.uri()).parse().unwrap());

    // Stale metadata is retried without limit, so only a timeout ends the call
    let finished = tokio::time::timeout(
        Duration::from_millis(300),
        downloader.download(&mut job, &CancellationToken::new(), &Recorder::default()),
    )
    .await;

    assert!(finished.is_err());
    assert_eq!(job.state(), JobState::Retrying);
    assert!(matches!(job.error(), Some(Error::StaleMetadata(_))));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
