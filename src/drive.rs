use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::netcache::ResponseCache;
use crate::provider::Provider;
use crate::store::models::NewFile;
use crate::store::now_millis;

pub const EPUB_MIME: &str = "application/epub+zip";
const GDRIVE_FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const GDRIVE_PAGE_SIZE: u32 = 100;
const GDRIVE_LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType,size,modifiedTime)";

/// API roots, injectable so tests can point the client at a local server.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub gdrive_base: String,
    pub onedrive_base: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            gdrive_base: "https://www.googleapis.com".to_string(),
            onedrive_base: "https://graph.microsoft.com/v1.0".to_string(),
        }
    }
}

/// Account identity behind an access token. Field aliases absorb the two
/// providers' different identity payloads.
#[derive(Debug, Clone, Deserialize)]
pub struct DriveUser {
    pub id: String,
    #[serde(default, alias = "userPrincipalName")]
    pub email: Option<String>,
    #[serde(default, alias = "displayName")]
    pub name: Option<String>,
}

/// The folder itself, as the provider describes it.
#[derive(Debug, Clone)]
pub struct RemoteFolder {
    pub id: String,
    pub name: String,
    pub modified_at: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned status {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Read-only client for the two drive APIs. Listings and identity lookups
/// go through the response cache; content downloads never do (the store
/// itself keeps re-downloads away).
pub struct DriveClient {
    cache: Arc<ResponseCache>,
    endpoints: ProviderEndpoints,
    listing_ttl: Duration,
    identity_ttl: Duration,
}

impl DriveClient {
    pub fn new(
        cache: Arc<ResponseCache>,
        endpoints: ProviderEndpoints,
        listing_ttl: Duration,
        identity_ttl: Duration,
    ) -> Self {
        Self {
            cache,
            endpoints,
            listing_ttl,
            identity_ttl,
        }
    }

    /// URL a worker downloads one file's raw bytes from.
    pub fn content_url(&self, provider: Provider, file_id: &str) -> String {
        match provider {
            Provider::Gdrive => format!(
                "{}/drive/v3/files/{}?alt=media",
                self.endpoints.gdrive_base, file_id
            ),
            Provider::Onedrive => format!(
                "{}/me/drive/items/{}/content",
                self.endpoints.onedrive_base, file_id
            ),
        }
    }

    /// Who the token belongs to.
    pub async fn current_user(
        &self,
        provider: Provider,
        token: &str,
    ) -> Result<DriveUser, DriveError> {
        let url = match provider {
            Provider::Gdrive => format!("{}/oauth2/v2/userinfo", self.endpoints.gdrive_base),
            Provider::Onedrive => format!("{}/me", self.endpoints.onedrive_base),
        };
        let resp = self
            .cache
            .get_with_cache(&url, &bearer(token), self.identity_ttl)
            .await?;
        if !resp.status.is_success() {
            return Err(DriveError::Status {
                url,
                status: resp.status,
            });
        }
        Ok(resp.json()?)
    }

    /// Name and modification time of the folder itself.
    pub async fn folder_info(
        &self,
        provider: Provider,
        folder_id: &str,
        token: &str,
    ) -> Result<RemoteFolder, DriveError> {
        let url = match provider {
            Provider::Gdrive => format!(
                "{}/drive/v3/files/{}?fields=id,name,mimeType,modifiedTime",
                self.endpoints.gdrive_base, folder_id
            ),
            Provider::Onedrive => format!(
                "{}/me/drive/items/{}",
                self.endpoints.onedrive_base, folder_id
            ),
        };
        let resp = self
            .cache
            .get_with_cache(&url, &bearer(token), self.listing_ttl)
            .await?;
        if !resp.status.is_success() {
            return Err(DriveError::Status {
                url,
                status: resp.status,
            });
        }

        match provider {
            Provider::Gdrive => {
                let f: GdriveFile = resp.json()?;
                Ok(RemoteFolder {
                    id: f.id,
                    name: f.name,
                    modified_at: parse_rfc3339_millis(f.modified_time.as_deref()),
                })
            }
            Provider::Onedrive => {
                let item: OnedriveItem = resp.json()?;
                Ok(RemoteFolder {
                    id: item.id,
                    name: item.name,
                    modified_at: parse_rfc3339_millis(item.last_modified_date_time.as_deref()),
                })
            }
        }
    }

    /// Every EPUB under `folder_id`. All hits are attributed to the folder
    /// that was asked for, even when Google Drive recursion found them in a
    /// nested subfolder; the shelf models membership per added folder.
    pub async fn list_epub_files(
        &self,
        provider: Provider,
        folder_id: &str,
        token: &str,
    ) -> Result<Vec<NewFile>, DriveError> {
        match provider {
            Provider::Gdrive => self.list_gdrive(folder_id, token).await,
            Provider::Onedrive => self.list_onedrive(folder_id, token).await,
        }
    }

    async fn list_gdrive(&self, root: &str, token: &str) -> Result<Vec<NewFile>, DriveError> {
        let mut files = Vec::new();
        let mut pending_dirs = vec![root.to_string()];

        while let Some(dir) = pending_dirs.pop() {
            let mut page_token: Option<String> = None;
            loop {
                let url = self.gdrive_children_url(&dir, page_token.as_deref());
                let resp = self
                    .cache
                    .get_with_cache(&url, &bearer(token), self.listing_ttl)
                    .await?;
                if !resp.status.is_success() {
                    return Err(DriveError::Status {
                        url,
                        status: resp.status,
                    });
                }
                let page: GdriveFileList = resp.json()?;

                for f in page.files {
                    if f.mime_type == GDRIVE_FOLDER_MIME {
                        pending_dirs.push(f.id);
                    } else if f.mime_type == EPUB_MIME || f.name.to_lowercase().ends_with(".epub") {
                        files.push(NewFile {
                            provider: Provider::Gdrive,
                            id: f.id,
                            folder_id: root.to_string(),
                            name: f.name,
                            mime_type: f.mime_type,
                            // Drive v3 serializes int64 fields as strings
                            size: f.size.as_deref().and_then(|s| s.parse().ok()).unwrap_or(0),
                            modified_at: parse_rfc3339_millis(f.modified_time.as_deref()),
                        });
                    }
                }

                page_token = page.next_page_token;
                if page_token.is_none() {
                    break;
                }
            }
        }

        debug!(folder = root, count = files.len(), "gdrive listing done");
        Ok(files)
    }

    fn gdrive_children_url(&self, dir: &str, page_token: Option<&str>) -> String {
        let query = format!("'{dir}' in parents and trashed=false");
        let mut url = format!(
            "{}/drive/v3/files?q={}&fields={}&pageSize={}",
            self.endpoints.gdrive_base,
            urlencoding::encode(&query),
            urlencoding::encode(GDRIVE_LIST_FIELDS),
            GDRIVE_PAGE_SIZE,
        );
        if let Some(tok) = page_token {
            url.push_str("&pageToken=");
            url.push_str(&urlencoding::encode(tok));
        }
        url
    }

    async fn list_onedrive(&self, folder_id: &str, token: &str) -> Result<Vec<NewFile>, DriveError> {
        let mut files = Vec::new();
        let mut next = Some(format!(
            "{}/me/drive/items/{}/children",
            self.endpoints.onedrive_base, folder_id
        ));

        while let Some(url) = next {
            let resp = self
                .cache
                .get_with_cache(&url, &bearer(token), self.listing_ttl)
                .await?;
            if !resp.status.is_success() {
                return Err(DriveError::Status {
                    url,
                    status: resp.status,
                });
            }
            let page: OnedriveChildren = resp.json()?;

            for item in page.value {
                let mime = item
                    .file
                    .as_ref()
                    .and_then(|f| f.mime_type.clone())
                    .unwrap_or_default();
                let is_epub = mime == EPUB_MIME || item.name.to_lowercase().ends_with(".epub");
                if item.folder.is_none() && is_epub {
                    files.push(NewFile {
                        provider: Provider::Onedrive,
                        id: item.id,
                        folder_id: folder_id.to_string(),
                        name: item.name,
                        mime_type: if mime.is_empty() {
                            EPUB_MIME.to_string()
                        } else {
                            mime
                        },
                        size: item.size.unwrap_or(0),
                        modified_at: parse_rfc3339_millis(item.last_modified_date_time.as_deref()),
                    });
                }
            }

            next = page.next_link;
        }

        debug!(folder = folder_id, count = files.len(), "onedrive listing done");
        Ok(files)
    }
}

fn bearer(token: &str) -> Vec<(String, String)> {
    vec![("authorization".to_string(), format!("Bearer {token}"))]
}

fn parse_rfc3339_millis(value: Option<&str>) -> i64 {
    value
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(now_millis)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GdriveFileList {
    next_page_token: Option<String>,
    #[serde(default)]
    files: Vec<GdriveFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GdriveFile {
    id: String,
    name: String,
    mime_type: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    modified_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OnedriveChildren {
    #[serde(default)]
    value: Vec<OnedriveItem>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OnedriveItem {
    id: String,
    name: String,
    #[serde(default)]
    size: Option<i64>,
    #[serde(default)]
    last_modified_date_time: Option<String>,
    #[serde(default)]
    file: Option<OnedriveFileFacet>,
    #[serde(default)]
    folder: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OnedriveFileFacet {
    #[serde(default)]
    mime_type: Option<String>,
}
