use std::io;
use std::path::Path;

use axum::body::BodyDataStream;
use axum::http::StatusCode;
use futures::{StreamExt, TryStreamExt};
use serde_json::json;
use sha2::{Digest as _, Sha256};
use tokio::fs::{create_dir_all, remove_dir, remove_dir_all, remove_file, rename, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::io::StreamReader;

use crate::error::{ErrorCode, RegistryError, Result};
use crate::grammar::Digest;
use crate::manifest::Manifest;
use crate::storage::content::{create_layer, pickup_file_info, LayerInfo};
use crate::storage::paths::PathManager;
use crate::storage::Storage;

/// Filesystem-backed [`Storage`]. No locks: isolation comes from UUID
/// session directories, immutability of finalized blobs and the atomic
/// rename that commits a finalize.
pub struct FilesystemStorage {
    paths: PathManager,
}

impl FilesystemStorage {
    pub fn new(root: impl AsRef<Path>) -> Self {
        FilesystemStorage {
            paths: PathManager::new(root),
        }
    }
}

#[async_trait::async_trait]
impl Storage for FilesystemStorage {
    fn issue_session(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    async fn put_blob_by_reference(
        &self,
        reference: &str,
        name: &str,
        stream: BodyDataStream,
    ) -> Result<u64> {
        let dir = self.paths.blob_dir(name, reference);
        create_dir_all(&dir).await?;
        let reader = StreamReader::new(stream.map_err(io::Error::other));
        Ok(create_layer(reader, &dir).await?)
    }

    async fn append_blob_by_reference(
        &self,
        name: &str,
        reference: &str,
        stream: BodyDataStream,
        range_start: u64,
    ) -> Result<u64> {
        let dir = self.paths.blob_dir(name, reference);
        create_dir_all(&dir).await?;

        let current = pickup_file_info(&dir).await.ok();
        let current_size = current.as_ref().map(|info| info.size).unwrap_or(0);
        if current_size != range_start {
            return Err(RegistryError::from_code(ErrorCode::BlobUploadUnknown)
                .with_detail(json!({ "session": reference, "offset": current_size })));
        }

        let mut reader = StreamReader::new(stream.map_err(io::Error::other));
        match current {
            Some(info) => {
                let file = OpenOptions::new()
                    .append(true)
                    .open(dir.join(&info.file_name))
                    .await?;
                let mut writer = BufWriter::new(file);
                let appended = tokio::io::copy(&mut reader, &mut writer).await?;
                writer.flush().await?;
                Ok(range_start + appended)
            }
            None => Ok(create_layer(reader, &dir).await?),
        }
    }

    async fn check_blob_by_reference(&self, name: &str, reference: &str) -> Result<LayerInfo> {
        let dir = self.paths.blob_dir(name, reference);
        pickup_file_info(&dir).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                RegistryError::wrap(e, ErrorCode::BlobUnknown)
                    .with_detail(json!({ "name": name, "reference": reference }))
            } else {
                RegistryError::from(e)
            }
        })
    }

    async fn ensure_put_blob_by_session(
        &self,
        session_id: &str,
        name: &str,
        digest: &Digest,
    ) -> Result<()> {
        let old_dir = self.paths.blob_dir(name, session_id);
        let info = pickup_file_info(&old_dir).await.map_err(|e| {
            RegistryError::wrap(e, ErrorCode::BlobUploadUnknown)
                .with_detail(json!({ "session": session_id }))
        })?;

        let new_dir = self.paths.blob_dir(name, &digest.to_string());
        create_dir_all(&new_dir).await?;
        rename(old_dir.join(&info.file_name), new_dir.join(&info.file_name)).await?;
        let _ = remove_dir(&old_dir).await;
        Ok(())
    }

    async fn find_blob_by_image(&self, name: &str, digest: &Digest) -> Result<(File, LayerInfo)> {
        let dir = self.paths.blob_dir(name, &digest.to_string());
        let info = pickup_file_info(&dir).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                RegistryError::wrap(e, ErrorCode::BlobUnknown)
                    .with_detail(json!({ "digest": digest.to_string() }))
            } else {
                RegistryError::from(e)
            }
        })?;
        let file = File::open(dir.join(&info.file_name)).await?;
        Ok((file, info))
    }

    async fn create_manifest(
        &self,
        mut stream: BodyDataStream,
        name: &str,
        tag: &str,
    ) -> Result<(Manifest, String)> {
        // Hash while consuming so the digest is ready when decoding is.
        let mut hasher = Sha256::new();
        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            body.extend_from_slice(&chunk);
        }
        let manifest: Manifest = serde_json::from_slice(&body)
            .map_err(|e| RegistryError::wrap(e, ErrorCode::ManifestInvalid))?;
        let digest = format!("sha256:{}", hex::encode(hasher.finalize()));

        create_dir_all(self.paths.tags_dir(name)).await?;
        tokio::fs::write(self.paths.tag_path(name, tag), digest.as_bytes())
            .await
            .map_err(|e| RegistryError::wrap(e, ErrorCode::TagInvalid))?;

        let manifest_path = self.paths.manifest_path(name, &digest);
        create_dir_all(self.paths.blob_dir(name, &digest)).await?;
        let encoded = serde_json::to_vec(&manifest)
            .map_err(|e| RegistryError::wrap(e, ErrorCode::ManifestInvalid))?;
        tokio::fs::write(&manifest_path, encoded).await?;

        Ok((manifest, digest))
    }

    async fn find_manifest_by_image(
        &self,
        name: &str,
        reference: &str,
    ) -> Result<(Manifest, String)> {
        let resolved = match tokio::fs::read_to_string(self.paths.tag_path(name, reference)).await {
            Ok(digest) => digest,
            Err(_) => reference.to_string(),
        };

        let body = tokio::fs::read(self.paths.manifest_path(name, &resolved))
            .await
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    RegistryError::wrap(e, ErrorCode::ManifestUnknown)
                        .with_detail(json!({ "reference": reference }))
                } else {
                    RegistryError::from(e)
                }
            })?;
        let manifest: Manifest = serde_json::from_slice(&body)
            .map_err(|e| RegistryError::wrap(e, ErrorCode::ManifestInvalid))?;
        Ok((manifest, resolved))
    }

    async fn delete_manifest_by_image(&self, name: &str, tag: &str) -> Result<()> {
        remove_file(self.paths.tag_path(name, tag)).await.map_err(|e| {
            RegistryError::wrap(e, ErrorCode::ManifestUnknown)
                .with_status(StatusCode::BAD_REQUEST)
                .with_detail(json!({ "tag": tag }))
        })
    }

    async fn delete_blob_by_image(&self, name: &str, digest: &Digest) -> Result<()> {
        let dir = self.paths.blob_dir(name, &digest.to_string());
        match tokio::fs::metadata(&dir).await {
            Ok(_) => {
                remove_dir_all(&dir).await?;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(RegistryError::wrap(e, ErrorCode::BlobUnknown)
                    .with_detail(json!({ "digest": digest.to_string() })))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_tags(&self, name: &str) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(self.paths.tags_dir(name))
            .await
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    RegistryError::wrap(e, ErrorCode::NameUnknown)
                        .with_detail(json!({ "name": name }))
                } else {
                    RegistryError::from(e)
                }
            })?;

        let mut tags = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tags.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(tags)
    }
}
