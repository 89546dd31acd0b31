use axum::body::BodyDataStream;
use tokio::fs::File;

pub mod content;
pub mod driver;
pub mod paths;

pub use content::LayerInfo;

use crate::error::Result;
use crate::grammar::Digest;
use crate::manifest::Manifest;

/// Capability set the protocol handlers program against. The
/// filesystem-backed driver is the default; alternative backends can be
/// swapped in without touching the handlers.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    /// Issues a fresh upload session identifier.
    fn issue_session(&self) -> String;

    /// Writes a whole stream as the single layer file under
    /// `<name>/<reference>`, creating the directory tree as needed.
    /// `reference` is a session id or, for monolithic pushes, a digest.
    /// Returns the number of bytes written.
    async fn put_blob_by_reference(
        &self,
        reference: &str,
        name: &str,
        stream: BodyDataStream,
    ) -> Result<u64>;

    /// Appends a chunk to the session's layer file. The current file
    /// size must equal `range_start` (zero when no file exists yet);
    /// a mismatch fails with `BLOB_UPLOAD_UNKNOWN` and leaves the file
    /// untouched. Returns the new total size.
    async fn append_blob_by_reference(
        &self,
        name: &str,
        reference: &str,
        stream: BodyDataStream,
        range_start: u64,
    ) -> Result<u64>;

    /// Stats the layer file under `<name>/<reference>`.
    async fn check_blob_by_reference(&self, name: &str, reference: &str) -> Result<LayerInfo>;

    /// Finalizes a session: renames its layer file into the digest
    /// directory and removes the session directory.
    async fn ensure_put_blob_by_session(
        &self,
        session_id: &str,
        name: &str,
        digest: &Digest,
    ) -> Result<()>;

    /// Opens the layer file of a finalized blob.
    async fn find_blob_by_image(&self, name: &str, digest: &Digest) -> Result<(File, LayerInfo)>;

    /// Ingests a manifest: hashes the body while decoding it, points
    /// the tag file at the computed digest and stores the re-encoded
    /// document under it. Returns the manifest and its digest string.
    async fn create_manifest(
        &self,
        stream: BodyDataStream,
        name: &str,
        tag: &str,
    ) -> Result<(Manifest, String)>;

    /// Resolves `reference` (tag file first, digest otherwise) and
    /// loads the manifest. Returns the manifest and the resolved
    /// digest string.
    async fn find_manifest_by_image(&self, name: &str, reference: &str)
        -> Result<(Manifest, String)>;

    /// Drops the tag pointer. The by-digest manifest stays so other
    /// tags on the same digest remain reachable.
    async fn delete_manifest_by_image(&self, name: &str, tag: &str) -> Result<()>;

    /// Removes a blob directory recursively.
    async fn delete_blob_by_image(&self, name: &str, digest: &Digest) -> Result<()>;

    /// Tag names under `<name>/tags`, in filesystem order.
    async fn list_tags(&self, name: &str) -> Result<Vec<String>>;
}
