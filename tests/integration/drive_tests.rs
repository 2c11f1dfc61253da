use httpmock::Method;
use serde_json::json;

use driveshelf::drive::DriveError;

use super::*;

/// Google Drive listings descend into subfolders; every hit is attributed
/// to the folder that was asked for, and non-EPUB entries are dropped.
#[tokio::test]
async fn gdrive_listing_recurses_into_subfolders() {
    let server = MockServer::start_async().await;
    let drive = test_drive(&server);

    server
        .mock_async(|when, then| {
            when.method(Method::GET)
                .path("/drive/v3/files")
                .query_param("q", "'root' in parents and trashed=false");
            then.status(200).json_body(json!({
                "files": [
                    {
                        "id": "e1",
                        "name": "dune.epub",
                        "mimeType": "application/epub+zip",
                        "size": "1000",
                        "modifiedTime": "2024-01-02T03:04:05.678Z"
                    },
                    {
                        "id": "sub",
                        "name": "More books",
                        "mimeType": "application/vnd.google-apps.folder"
                    },
                    {
                        "id": "n1",
                        "name": "notes.txt",
                        "mimeType": "text/plain"
                    }
                ]
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(Method::GET)
                .path("/drive/v3/files")
                .query_param("q", "'sub' in parents and trashed=false");
            then.status(200).json_body(json!({
                "files": [
                    {
                        "id": "e2",
                        "name": "nested",
                        "mimeType": "application/epub+zip"
                    }
                ]
            }));
        })
        .await;

    let mut files = drive
        .list_epub_files(Provider::Gdrive, "root", "tok")
        .await
        .unwrap();
    files.sort_by(|a, b| a.id.cmp(&b.id));

    assert_eq!(files.len(), 2, "text file is filtered out");
    assert_eq!(files[0].id, "e1");
    assert_eq!(files[0].size, 1000, "string size is parsed");
    assert_eq!(files[0].modified_at, 1704164645678);
    assert_eq!(files[1].id, "e2");
    assert_eq!(
        files[1].folder_id, "root",
        "nested hits belong to the requested folder"
    );
}

/// OneDrive listings follow @odata.nextLink and skip folder items; a
/// missing mime type falls back to the EPUB one.
#[tokio::test]
async fn onedrive_listing_follows_next_link() {
    let server = MockServer::start_async().await;
    let drive = test_drive(&server);

    let next = server.url("/next-page");
    server
        .mock_async(move |when, then| {
            when.method(Method::GET).path("/me/drive/items/root/children");
            then.status(200).json_body(json!({
                "value": [
                    {
                        "id": "o1",
                        "name": "hyperion.epub",
                        "size": 2048,
                        "lastModifiedDateTime": "2024-01-02T03:04:05.678Z",
                        "file": { "mimeType": "application/epub+zip" }
                    },
                    {
                        "id": "dir1",
                        "name": "A subfolder",
                        "folder": {}
                    }
                ],
                "@odata.nextLink": next
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(Method::GET).path("/next-page");
            then.status(200).json_body(json!({
                "value": [
                    {
                        "id": "o2",
                        "name": "endymion.epub",
                        "file": {}
                    }
                ]
            }));
        })
        .await;

    let files = drive
        .list_epub_files(Provider::Onedrive, "root", "tok")
        .await
        .unwrap();

    assert_eq!(files.len(), 2, "folder item is skipped");
    assert_eq!(files[0].id, "o1");
    assert_eq!(files[0].size, 2048);
    assert_eq!(files[1].id, "o2");
    assert_eq!(
        files[1].mime_type, "application/epub+zip",
        "missing mime falls back to the EPUB type"
    );
    assert!(files.iter().all(|f| f.folder_id == "root"));
}

/// Identity lookups for the same token are served from the cache; a new
/// token is a new cache entry.
#[tokio::test]
async fn identity_is_cached_per_token() {
    let server = MockServer::start_async().await;
    let drive = test_drive(&server);

    let mock = server
        .mock_async(|when, then| {
            when.method(Method::GET).path("/oauth2/v2/userinfo");
            then.status(200).json_body(json!({
                "id": "u1",
                "email": "reader@example.com",
                "name": "Reader"
            }));
        })
        .await;

    let first = drive.current_user(Provider::Gdrive, "tok-a").await.unwrap();
    assert_eq!(first.email.as_deref(), Some("reader@example.com"));

    let second = drive.current_user(Provider::Gdrive, "tok-a").await.unwrap();
    assert_eq!(second.id, "u1");
    mock.assert_hits_async(1).await;

    drive.current_user(Provider::Gdrive, "tok-b").await.unwrap();
    mock.assert_hits_async(2).await;
}

/// The Graph identity payload uses different field names; the aliases
/// absorb them.
#[tokio::test]
async fn onedrive_identity_fields_are_aliased() {
    let server = MockServer::start_async().await;
    let drive = test_drive(&server);

    server
        .mock_async(|when, then| {
            when.method(Method::GET).path("/me");
            then.status(200).json_body(json!({
                "id": "od-7",
                "userPrincipalName": "reader@contoso.com",
                "displayName": "Contoso Reader"
            }));
        })
        .await;

    let user = drive.current_user(Provider::Onedrive, "tok").await.unwrap();
    assert_eq!(user.id, "od-7");
    assert_eq!(user.email.as_deref(), Some("reader@contoso.com"));
    assert_eq!(user.name.as_deref(), Some("Contoso Reader"));
}

/// folder_info resolves the folder's display name on both providers.
#[tokio::test]
async fn folder_info_resolves_both_shapes() {
    let server = MockServer::start_async().await;
    let drive = test_drive(&server);

    server
        .mock_async(|when, then| {
            when.method(Method::GET)
                .path("/drive/v3/files/folder9")
                .query_param("fields", "id,name,mimeType,modifiedTime");
            then.status(200).json_body(json!({
                "id": "folder9",
                "name": "My Books",
                "mimeType": "application/vnd.google-apps.folder",
                "modifiedTime": "2024-01-02T03:04:05.678Z"
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(Method::GET).path("/me/drive/items/folder9");
            then.status(200).json_body(json!({
                "id": "folder9",
                "name": "Shelf",
                "lastModifiedDateTime": "2024-01-02T03:04:05.678Z"
            }));
        })
        .await;

    let gdrive = drive
        .folder_info(Provider::Gdrive, "folder9", "tok")
        .await
        .unwrap();
    assert_eq!(gdrive.name, "My Books");
    assert_eq!(gdrive.modified_at, 1704164645678);

    let onedrive = drive
        .folder_info(Provider::Onedrive, "folder9", "tok")
        .await
        .unwrap();
    assert_eq!(onedrive.name, "Shelf");
}

/// A rejected listing surfaces as a status error instead of an empty
/// result.
#[tokio::test]
async fn denied_listing_surfaces_the_status() {
    let server = MockServer::start_async().await;
    let drive = test_drive(&server);

    server
        .mock_async(|when, then| {
            when.method(Method::GET)
                .path("/drive/v3/files")
                .query_param("q", "'missing' in parents and trashed=false");
            then.status(404);
        })
        .await;

    let err = drive
        .list_epub_files(Provider::Gdrive, "missing", "tok")
        .await
        .unwrap_err();
    assert!(matches!(err, DriveError::Status { .. }));
}
