use std::time::Duration;

use httpmock::Method;
use tokio::time::{sleep, timeout};

use driveshelf::ingest::TokenProvider;
use driveshelf::progress::ChannelMessage;
use driveshelf::store::models::FileStatus;

use super::*;

/// Full pipeline pass: download, parse, normalize, persist, publish.
#[tokio::test]
async fn pipeline_extracts_metadata_and_cover() {
    let server = MockServer::start_async().await;
    let store = test_store().await;
    let (processor, _progress) = test_processor(store.clone(), test_drive(&server), 3);

    let mock = mock_gdrive_content(&server, "f1", sample_epub("Dune", "Frank Herbert")).await;
    store
        .put_files(&[new_file(Provider::Gdrive, "f1", "root")])
        .await
        .unwrap();

    let records = store.files_by_folder(Provider::Gdrive, "root").await.unwrap();
    processor.add_jobs(&records, false).await;
    processor.wait_idle().await;

    mock.assert_hits_async(1).await;
    let got = store.get_file(Provider::Gdrive, "f1").await.unwrap().unwrap();
    assert_eq!(got.status, FileStatus::Ready);

    let meta = got.metadata.expect("metadata should be extracted");
    assert_eq!(meta.title, "Dune");
    assert_eq!(meta.author, vec!["Frank Herbert"]);
    assert_eq!(meta.series.as_deref(), Some("Test Saga"));
    assert_eq!(meta.series_index, Some(2.0));

    let cover_id = got.cover_id.expect("cover should be linked");
    let cover = store.get_cover(&cover_id).await.unwrap().expect("cover row");
    assert_eq!(cover.width, 40);
    assert_eq!(cover.height, 60);
    assert_eq!(&cover.data[..4], b"RIFF", "cover is stored as WebP");
    assert_eq!(&cover.data[8..12], b"WEBP");
}

/// Structural failures mark the row `error` and never take down the batch.
#[tokio::test]
async fn failures_are_isolated_per_job() {
    let server = MockServer::start_async().await;
    let store = test_store().await;
    let (processor, _progress) = test_processor(store.clone(), test_drive(&server), 3);

    mock_gdrive_content(&server, "garbage", b"this is not a zip".to_vec()).await;
    mock_gdrive_content(&server, "no-container", make_zip(&[("readme.txt", b"hi")])).await;
    mock_gdrive_content(&server, "good", coverless_epub("Ubik")).await;

    store
        .put_files(&[
            new_file(Provider::Gdrive, "garbage", "root"),
            new_file(Provider::Gdrive, "no-container", "root"),
            new_file(Provider::Gdrive, "good", "root"),
        ])
        .await
        .unwrap();

    let records = store.files_by_folder(Provider::Gdrive, "root").await.unwrap();
    processor.add_jobs(&records, false).await;
    processor.wait_idle().await;

    let garbage = store.get_file(Provider::Gdrive, "garbage").await.unwrap().unwrap();
    assert_eq!(garbage.status, FileStatus::Error);
    assert!(garbage.metadata.is_none());

    let no_container = store
        .get_file(Provider::Gdrive, "no-container")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(no_container.status, FileStatus::Error);
    assert!(no_container.metadata.is_none());

    let good = store.get_file(Provider::Gdrive, "good").await.unwrap().unwrap();
    assert_eq!(good.status, FileStatus::Ready);
    assert_eq!(good.metadata.unwrap().title, "Ubik");
    assert!(good.cover_id.is_none(), "no cover was declared");

    let progress = processor.progress().await;
    assert_eq!(progress.processed, 3, "failed jobs still count as processed");
    assert_eq!(progress.total, 3);
    assert_eq!(progress.error_count, 2);
}

/// A download rejected by the provider is a job failure, not a crash.
#[tokio::test]
async fn denied_download_is_marked_error() {
    let server = MockServer::start_async().await;
    let store = test_store().await;
    let (processor, _progress) = test_processor(store.clone(), test_drive(&server), 3);

    server
        .mock_async(|when, then| {
            when.method(Method::GET)
                .path("/drive/v3/files/locked")
                .query_param("alt", "media");
            then.status(403);
        })
        .await;

    store
        .put_files(&[new_file(Provider::Gdrive, "locked", "root")])
        .await
        .unwrap();
    let records = store.files_by_folder(Provider::Gdrive, "root").await.unwrap();
    processor.add_jobs(&records, false).await;
    processor.wait_idle().await;

    let got = store.get_file(Provider::Gdrive, "locked").await.unwrap().unwrap();
    assert_eq!(got.status, FileStatus::Error);
}

/// Already-ready books are not re-downloaded unless the caller forces it.
#[tokio::test]
async fn ready_books_are_skipped_unless_forced() {
    let server = MockServer::start_async().await;
    let store = test_store().await;
    let (processor, _progress) = test_processor(store.clone(), test_drive(&server), 3);

    let mock = mock_gdrive_content(&server, "f1", coverless_epub("Hyperion")).await;
    store
        .put_files(&[new_file(Provider::Gdrive, "f1", "root")])
        .await
        .unwrap();

    let records = store.files_by_folder(Provider::Gdrive, "root").await.unwrap();
    processor.add_jobs(&records, false).await;
    processor.wait_idle().await;
    mock.assert_hits_async(1).await;
    assert_eq!(processor.progress().await.total, 1);

    // Same rows again: everything is ready, nothing is accepted
    let records = store.files_by_folder(Provider::Gdrive, "root").await.unwrap();
    processor.add_jobs(&records, false).await;
    processor.wait_idle().await;
    mock.assert_hits_async(1).await;
    assert_eq!(processor.progress().await.total, 1, "no-op enqueue publishes no new total");

    // Forced: the ready book goes through the pipeline again
    processor.add_jobs(&records, true).await;
    processor.wait_idle().await;
    mock.assert_hits_async(2).await;
    let progress = processor.progress().await;
    assert_eq!(progress.total, 2);
    assert_eq!(progress.processed, 2);
}

/// With a pool of 2 and four queued jobs, only two rows are ever
/// `processing` at once; the rest wait in line as `pending`.
#[tokio::test]
async fn pool_limit_bounds_concurrency() {
    let server = MockServer::start_async().await;
    let store = test_store().await;
    let (processor, _progress) = test_processor(store.clone(), test_drive(&server), 2);

    let body = coverless_epub("Slow Book");
    for id in ["s1", "s2", "s3", "s4"] {
        let path = format!("/drive/v3/files/{id}");
        let body = body.clone();
        server
            .mock_async(move |when, then| {
                when.method(Method::GET).path(path).query_param("alt", "media");
                then.status(200)
                    .body(body)
                    .delay(Duration::from_millis(500));
            })
            .await;
    }

    store
        .put_files(&[
            new_file(Provider::Gdrive, "s1", "root"),
            new_file(Provider::Gdrive, "s2", "root"),
            new_file(Provider::Gdrive, "s3", "root"),
            new_file(Provider::Gdrive, "s4", "root"),
        ])
        .await
        .unwrap();

    let records = store.files_by_folder(Provider::Gdrive, "root").await.unwrap();
    processor.add_jobs(&records, false).await;

    // Mid-flight: the pool slots are full, the queue holds the overflow
    sleep(Duration::from_millis(150)).await;
    let rows = store.files_by_folder(Provider::Gdrive, "root").await.unwrap();
    let processing = rows.iter().filter(|r| r.status == FileStatus::Processing).count();
    let pending = rows.iter().filter(|r| r.status == FileStatus::Pending).count();
    assert_eq!(processing, 2, "exactly pool_size jobs in flight");
    assert_eq!(pending, 2, "overflow stays queued");

    processor.wait_idle().await;
    let rows = store.files_by_folder(Provider::Gdrive, "root").await.unwrap();
    assert!(rows.iter().all(|r| r.status == FileStatus::Ready));
}

/// Every published snapshot is complete and the counters never move
/// backwards.
#[tokio::test]
async fn progress_snapshots_are_monotonic() {
    let server = MockServer::start_async().await;
    let store = test_store().await;
    let (processor, progress) = test_processor(store.clone(), test_drive(&server), 3);

    for id in ["p1", "p2", "p3"] {
        mock_gdrive_content(&server, id, coverless_epub(id)).await;
    }
    store
        .put_files(&[
            new_file(Provider::Gdrive, "p1", "root"),
            new_file(Provider::Gdrive, "p2", "root"),
            new_file(Provider::Gdrive, "p3", "root"),
        ])
        .await
        .unwrap();

    let mut events = progress.subscribe();
    let records = store.files_by_folder(Provider::Gdrive, "root").await.unwrap();
    processor.add_jobs(&records, false).await;

    let mut last_processed = 0;
    let mut snapshots = 0;
    loop {
        let msg = timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("snapshot within deadline")
            .unwrap();
        let ChannelMessage::Progress { progress } = msg;
        assert_eq!(progress.total, 3, "total is visible from the first snapshot");
        assert!(
            progress.processed >= last_processed,
            "processed never decreases"
        );
        last_processed = progress.processed;
        snapshots += 1;
        if progress.processed == progress.total {
            break;
        }
    }
    // One publish at enqueue and one per settle
    assert_eq!(snapshots, 4);

    processor.wait_idle().await;
    let final_state = processor.progress().await;
    assert_eq!(final_state.processed, 3);
    assert_eq!(final_state.error_count, 0);
}

/// The injected token callback supplies the bearer for each download.
#[tokio::test]
async fn access_token_flows_to_the_download() {
    let server = MockServer::start_async().await;
    let store = test_store().await;
    let (processor, _progress) = test_processor(store.clone(), test_drive(&server), 3);

    let tokens: TokenProvider =
        Arc::new(|_| Box::pin(async { Some("t-secret-123".to_string()) }));
    processor.set_token_provider(tokens).await;

    let body = coverless_epub("Authorized");
    let mock = server
        .mock_async(move |when, then| {
            when.method(Method::GET)
                .path("/drive/v3/files/auth1")
                .query_param("alt", "media")
                .header("authorization", "Bearer t-secret-123");
            then.status(200).body(body);
        })
        .await;

    store
        .put_files(&[new_file(Provider::Gdrive, "auth1", "root")])
        .await
        .unwrap();
    let records = store.files_by_folder(Provider::Gdrive, "root").await.unwrap();
    processor.add_jobs(&records, false).await;
    processor.wait_idle().await;

    mock.assert_hits_async(1).await;
    let got = store.get_file(Provider::Gdrive, "auth1").await.unwrap().unwrap();
    assert_eq!(got.status, FileStatus::Ready);
}

/// An undecodable cover image downgrades to "no cover"; the book itself
/// still becomes ready.
#[tokio::test]
async fn broken_cover_still_yields_a_ready_book() {
    let server = MockServer::start_async().await;
    let store = test_store().await;
    let (processor, _progress) = test_processor(store.clone(), test_drive(&server), 3);

    let opf = br#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Broken Art</dc:title>
    <meta name="cover" content="cover-img"/>
  </metadata>
  <manifest>
    <item id="cover-img" href="cover.png" media-type="image/png"/>
  </manifest>
</package>"#;
    let epub = make_zip(&[
        ("META-INF/container.xml", CONTAINER),
        ("OEBPS/content.opf", opf),
        ("OEBPS/cover.png", b"not an image at all"),
    ]);
    mock_gdrive_content(&server, "b1", epub).await;

    store
        .put_files(&[new_file(Provider::Gdrive, "b1", "root")])
        .await
        .unwrap();
    let records = store.files_by_folder(Provider::Gdrive, "root").await.unwrap();
    processor.add_jobs(&records, false).await;
    processor.wait_idle().await;

    let got = store.get_file(Provider::Gdrive, "b1").await.unwrap().unwrap();
    assert_eq!(got.status, FileStatus::Ready);
    assert_eq!(got.metadata.unwrap().title, "Broken Art");
    assert!(got.cover_id.is_none(), "broken cover is treated as absent");
    assert_eq!(processor.progress().await.error_count, 0);
}
