//! Content-addressed object directory: `.nt/objects/<aa>/<38hex>`.
//!
//! Blobs (media bytes) and packfiles share the same fan-out layout; the
//! leading bytes of the stored file identify which is which via mime sniff.
//! Writes are atomic (temp file + rename) and idempotent — a blob that
//! already exists is never rewritten.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    attribute::Attributes,
    errors::NtError,
    internal::pack::BlobRef,
    oid::Oid,
    utils::{atomic_write, sniff_mime},
};

/// An immutable byte sequence at rest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    pub oid: Oid,
    pub mime: String,
    pub size: u64,
    /// Rendition parameters (e.g. `{thumbnail: true, width: 640}`).
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

impl Blob {
    pub fn to_ref(&self) -> BlobRef {
        BlobRef {
            oid: self.oid,
            mime: self.mime.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

/// Fan-out directory of content-addressed files.
#[derive(Clone, Debug)]
pub struct ObjectDirectory {
    root: PathBuf,
}

impl ObjectDirectory {
    pub fn new(root: &Path) -> ObjectDirectory {
        ObjectDirectory {
            root: root.to_path_buf(),
        }
    }

    pub fn path_for(&self, oid: Oid) -> PathBuf {
        let (dir, rest) = oid.split_dir();
        self.root.join(dir).join(rest)
    }

    pub fn contains(&self, oid: Oid) -> bool {
        self.path_for(oid).exists()
    }

    /// Atomically write bytes under `oid`; existing files are left alone.
    pub fn write(&self, oid: Oid, data: &[u8]) -> Result<(), NtError> {
        let path = self.path_for(oid);
        if path.exists() {
            return Ok(());
        }
        atomic_write(&path, data)
    }

    pub fn read(&self, oid: Oid) -> Result<Vec<u8>, NtError> {
        std::fs::read(self.path_for(oid)).map_err(|_| NtError::MissingBlob(oid.to_string()))
    }

    pub fn remove(&self, oid: Oid) -> Result<(), NtError> {
        let path = self.path_for(oid);
        if path.exists() {
            std::fs::remove_file(&path)?;
            // Drop the fan-out directory when it emptied.
            if let Some(parent) = path.parent() {
                let _ = std::fs::remove_dir(parent);
            }
        }
        Ok(())
    }

    /// Every OID present on disk.
    pub fn list(&self) -> Result<Vec<Oid>, NtError> {
        let mut oids = Vec::new();
        if !self.root.exists() {
            return Ok(oids);
        }
        for dir_entry in std::fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_dir() {
                continue;
            }
            let prefix = dir_entry.file_name().to_string_lossy().to_string();
            for file_entry in std::fs::read_dir(dir_entry.path())? {
                let file_entry = file_entry?;
                let rest = file_entry.file_name().to_string_lossy().to_string();
                if let Ok(oid) = format!("{prefix}{rest}").parse() {
                    oids.push(oid);
                }
            }
        }
        oids.sort();
        Ok(oids)
    }

    /// Store media bytes as a blob, sniffing the mime type from content.
    pub fn put_blob(
        &self,
        data: &[u8],
        extension: Option<&str>,
        attributes: Attributes,
    ) -> Result<Blob, NtError> {
        let oid = Oid::for_content(data);
        let mime = sniff_mime(data, extension);
        if !self.contains(oid) {
            debug!(%oid, %mime, size = data.len(), "writing blob");
            self.write(oid, data)?;
        }
        Ok(Blob {
            oid,
            mime,
            size: data.len() as u64,
            attributes,
        })
    }

    /// Read a blob's bytes back.
    pub fn read_blob(&self, oid: Oid) -> Result<Vec<u8>, NtError> {
        self.read(oid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_oid_is_content_hash() {
        let dir = tempfile::tempdir().unwrap();
        let objects = ObjectDirectory::new(dir.path());
        let blob = objects.put_blob(b"hello", None, Attributes::new()).unwrap();
        assert_eq!(blob.oid, Oid::for_content(b"hello"));
        assert_eq!(objects.read_blob(blob.oid).unwrap(), b"hello");
    }

    #[test]
    fn test_put_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let objects = ObjectDirectory::new(dir.path());
        let first = objects.put_blob(b"same", None, Attributes::new()).unwrap();
        let second = objects.put_blob(b"same", None, Attributes::new()).unwrap();
        assert_eq!(first.oid, second.oid);
        assert_eq!(objects.list().unwrap().len(), 1);
    }

    #[test]
    fn test_fan_out_layout() {
        let dir = tempfile::tempdir().unwrap();
        let objects = ObjectDirectory::new(dir.path());
        let blob = objects.put_blob(b"layout", None, Attributes::new()).unwrap();
        let (prefix, rest) = blob.oid.split_dir();
        assert!(dir.path().join(prefix).join(rest).exists());
    }

    #[test]
    fn test_missing_blob_error() {
        let dir = tempfile::tempdir().unwrap();
        let objects = ObjectDirectory::new(dir.path());
        assert!(matches!(
            objects.read(Oid::for_content(b"nothing")),
            Err(NtError::MissingBlob(_))
        ));
    }

    #[test]
    fn test_remove_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let objects = ObjectDirectory::new(dir.path());
        let a = objects.put_blob(b"a", None, Attributes::new()).unwrap();
        let b = objects.put_blob(b"b", None, Attributes::new()).unwrap();
        assert_eq!(objects.list().unwrap().len(), 2);
        objects.remove(a.oid).unwrap();
        assert_eq!(objects.list().unwrap(), vec![b.oid]);
    }

    #[test]
    fn test_mime_sniffed() {
        let dir = tempfile::tempdir().unwrap();
        let objects = ObjectDirectory::new(dir.path());
        let blob = objects
            .put_blob(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A], Some("png"), Attributes::new())
            .unwrap();
        assert_eq!(blob.mime, "image/png");
    }
}
