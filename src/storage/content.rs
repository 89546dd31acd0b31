//! Layer file creation and inspection.
//!
//! A blob directory holds exactly one file named `layer.<ext>`. The
//! extension is decided by sniffing the first bytes of the upload, so
//! pulls can predict a media type from the filename alone.

use std::io;
use std::path::Path;

use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter};

use crate::manifest::{MEDIA_TYPE_LAYER, MEDIA_TYPE_MANIFEST};

const SNIFF_LEN: usize = 8192;

/// Metadata for the sole layer file of a blob or session directory.
#[derive(Debug, Clone)]
pub struct LayerInfo {
    pub file_name: String,
    pub size: u64,
}

fn detect_ext(buf: &[u8]) -> &'static str {
    if infer::is_archive(buf) {
        ".tar.gz"
    } else {
        ".json"
    }
}

/// Writes the stream as `<dir>/layer.<ext>` and returns the total bytes
/// written. The extension comes from sniffing up to the first 8 KiB;
/// the sniffed bytes are written ahead of the remainder, never dropped.
pub async fn create_layer<R>(mut body: R, dir: &Path) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut sniff = vec![0u8; SNIFF_LEN];
    let mut filled = 0;
    while filled < SNIFF_LEN {
        let n = body.read(&mut sniff[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    sniff.truncate(filled);

    let path = dir.join(format!("layer{}", detect_ext(&sniff)));
    let mut writer = BufWriter::new(File::create(&path).await?);
    writer.write_all(&sniff).await?;
    let rest = tokio::io::copy(&mut body, &mut writer).await?;
    writer.flush().await?;
    Ok(filled as u64 + rest)
}

/// Returns metadata for the sole entry of `dir`. Fails when the
/// directory is missing or empty.
pub async fn pickup_file_info(dir: &Path) -> io::Result<LayerInfo> {
    let mut entries = fs::read_dir(dir).await?;
    let entry = entries.next_entry().await?.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no file under {}", dir.display()),
        )
    })?;
    let metadata = entry.metadata().await?;
    Ok(LayerInfo {
        file_name: entry.file_name().to_string_lossy().into_owned(),
        size: metadata.len(),
    })
}

/// Media type served for a layer file, decided by its filename.
pub fn predict_docker_content_type(filename: &str) -> &'static str {
    if filename.ends_with(".json") {
        MEDIA_TYPE_MANIFEST
    } else {
        MEDIA_TYPE_LAYER
    }
}
