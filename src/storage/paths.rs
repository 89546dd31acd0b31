// PathManager maps repository names and references onto the on-disk
// tree. Everything lives under a configurable base directory:
//
//	<base>
//	└── <name>                       // slash-separated repository name
//	    ├── <digest>
//	    │   ├── layer.<ext>          // finalized blob, exactly one file
//	    │   └── manifest.json        // canonical manifest (manifest digests only)
//	    ├── <session-uuid>
//	    │   └── layer.<ext>          // in-progress upload
//	    └── tags
//	        └── <tag>                // file body is "<algorithm>:<hex>"
//
// Session ids are UUIDs and digests contain a ':', so a subdirectory of
// <name> is unambiguously one or the other. A digest directory only
// appears once a finalize rename has committed.

use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct PathManager {
    base: PathBuf,
}

impl PathManager {
    pub fn new(base: impl AsRef<Path>) -> Self {
        PathManager {
            base: base.as_ref().to_path_buf(),
        }
    }

    /// Joins path elements onto `<base>/<name>` with OS-specific
    /// separators.
    pub fn join_with_base(&self, name: &str, parts: &[&str]) -> PathBuf {
        let mut path = self.base.join(name);
        for part in parts {
            path.push(part);
        }
        path
    }

    /// Directory of a blob or in-progress session,
    /// `<base>/<name>/<reference>`.
    pub fn blob_dir(&self, name: &str, reference: &str) -> PathBuf {
        self.join_with_base(name, &[reference])
    }

    /// Tag index directory, `<base>/<name>/tags`.
    pub fn tags_dir(&self, name: &str) -> PathBuf {
        self.join_with_base(name, &["tags"])
    }

    /// A single tag file, `<base>/<name>/tags/<tag>`.
    pub fn tag_path(&self, name: &str, tag: &str) -> PathBuf {
        self.join_with_base(name, &["tags", tag])
    }

    /// Canonical manifest, `<base>/<name>/<digest>/manifest.json`.
    pub fn manifest_path(&self, name: &str, digest: &str) -> PathBuf {
        self.join_with_base(name, &[digest, "manifest.json"])
    }
}
