//! Packfile encoding and decoding.
//!
//! A packfile is an immutable bundle of serialised object records for exactly
//! one source file at a point in time. The outer layer is human-readable
//! YAML; each object entry's `data` field is zlib-compressed, base64-encoded
//! canonical YAML, so packfiles stay inspectable while staying compact.
//!
//! The packfile OID is a pure function of the canonical encoding (the OID
//! field itself held nil while hashing); reads recompute and verify it, so a
//! corrupt packfile never decodes silently.

pub mod blob;

use std::io::{Read, Write};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use flate2::{Compression, read::ZlibDecoder, write::ZlibEncoder};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    attribute::Attributes,
    clock,
    errors::NtError,
    internal::object::{NtObject, ObjectKind, State},
    oid::Oid,
};
use blob::ObjectDirectory;

/// Reference to a stored blob: content OID, sniffed mime type and optional
/// rendition attributes (e.g. `{thumbnail: true, width: 640}`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlobRef {
    pub oid: Oid,
    pub mime: String,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

/// One serialised record inside a packfile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackObject {
    pub oid: Oid,
    pub kind: ObjectKind,
    pub state: State,
    pub mtime: DateTime<Utc>,
    /// One-line human description for `nt cat` listings.
    pub desc: String,
    /// base64(zlib(canonical YAML)).
    pub data: String,
}

impl PackObject {
    /// Compress and encode an object's YAML serialisation.
    pub fn encode_data(yaml: &str) -> Result<String, NtError> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(yaml.as_bytes())?;
        let compressed = encoder.finish()?;
        Ok(BASE64.encode(compressed))
    }

    /// Decode the entry back to YAML.
    pub fn decode_data(&self) -> Result<String, NtError> {
        let compressed = BASE64
            .decode(&self.data)
            .map_err(|e| NtError::InvalidObjectData(format!("bad base64: {e}")))?;
        let mut decoder = ZlibDecoder::new(compressed.as_slice());
        let mut yaml = String::new();
        decoder
            .read_to_string(&mut yaml)
            .map_err(|e| NtError::InvalidObjectData(format!("bad zlib stream: {e}")))?;
        Ok(yaml)
    }

    /// Decode into a strongly typed object, restoring the recorded state.
    pub fn unmarshal<T>(&self) -> Result<T, NtError>
    where
        T: NtObject + DeserializeOwned,
    {
        let yaml = self.decode_data()?;
        let mut object = T::from_yaml(&yaml)?;
        object.set_state(self.state);
        Ok(object)
    }
}

/// An immutable bundle of records for one source file at a point in time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackFile {
    pub oid: Oid,
    pub file_relative_path: String,
    pub ctime: DateTime<Utc>,
    pub mtime: DateTime<Utc>,
    pub objects: Vec<PackObject>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blob_refs: Vec<BlobRef>,
}

impl PackFile {
    pub fn new(file_relative_path: &str) -> PackFile {
        let now = clock::now();
        PackFile {
            oid: Oid::nil(),
            file_relative_path: file_relative_path.to_string(),
            ctime: now,
            mtime: now,
            objects: Vec::new(),
            blob_refs: Vec::new(),
        }
    }

    /// Capture an object's current serialisation, state and description.
    pub fn append_object<T>(&mut self, object: &T) -> Result<(), NtError>
    where
        T: NtObject + Serialize,
    {
        let yaml = object.to_yaml()?;
        self.objects.push(PackObject {
            oid: object.oid(),
            kind: object.kind(),
            state: object.state(),
            mtime: object.mtime(),
            desc: object.desc(),
            data: PackObject::encode_data(&yaml)?,
        });
        Ok(())
    }

    pub fn append_blob_ref(&mut self, blob_ref: BlobRef) {
        if !self.blob_refs.iter().any(|b| b.oid == blob_ref.oid) {
            self.blob_refs.push(blob_ref);
        }
    }

    pub fn get_object(&self, oid: Oid) -> Option<&PackObject> {
        self.objects.iter().find(|o| o.oid == oid)
    }

    /// Decode one entry by OID.
    pub fn unmarshal_object<T>(&self, oid: Oid) -> Result<T, NtError>
    where
        T: NtObject + DeserializeOwned,
    {
        self.get_object(oid)
            .ok_or_else(|| NtError::ObjectNotFound(oid.to_string()))?
            .unmarshal()
    }

    /// Canonical encoding: the YAML of this packfile with a nil OID.
    fn canonical_yaml(&self) -> Result<String, NtError> {
        let mut canonical = self.clone();
        canonical.oid = Oid::nil();
        serde_yaml::to_string(&canonical)
            .map_err(|e| NtError::EncodeObjectError(self.oid.to_string(), e.to_string()))
    }

    /// Compute and set the content-derived OID. Equal content always yields
    /// an equal OID.
    pub fn finalize(&mut self) -> Result<Oid, NtError> {
        let canonical = self.canonical_yaml()?;
        self.oid = Oid::for_content(canonical.as_bytes());
        Ok(self.oid)
    }

    /// Full YAML encoding, OID included. Call [`PackFile::finalize`] first.
    pub fn encode(&self) -> Result<String, NtError> {
        serde_yaml::to_string(self)
            .map_err(|e| NtError::EncodeObjectError(self.oid.to_string(), e.to_string()))
    }

    /// Decode and verify: the recomputed content OID must match the claimed
    /// one.
    pub fn decode(data: &str) -> Result<PackFile, NtError> {
        let pack: PackFile = serde_yaml::from_str(data)
            .map_err(|e| NtError::InvalidPackFile("<decoding>".to_string(), e.to_string()))?;
        let canonical = pack.canonical_yaml()?;
        let actual = Oid::for_content(canonical.as_bytes());
        if actual != pack.oid {
            return Err(NtError::PackFileOidMismatch {
                claimed: pack.oid.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(pack)
    }

    /// Write into the object directory under the fan-out path.
    pub fn save(&self, objects: &ObjectDirectory) -> Result<(), NtError> {
        debug!(oid = %self.oid, path = %self.file_relative_path, objects = self.objects.len(), "writing packfile");
        objects.write(self.oid, self.encode()?.as_bytes())
    }

    /// Read one packfile back from the object directory.
    pub fn load(objects: &ObjectDirectory, oid: Oid) -> Result<PackFile, NtError> {
        let raw = objects
            .read(oid)
            .map_err(|_| NtError::ObjectNotFound(oid.to_string()))?;
        let text = String::from_utf8(raw)
            .map_err(|e| NtError::InvalidPackFile(oid.to_string(), e.to_string()))?;
        PackFile::decode(&text)
    }

    /// All OIDs carried by this packfile, in order.
    pub fn object_oids(&self) -> impl Iterator<Item = Oid> + '_ {
        self.objects.iter().map(|o| o.oid)
    }
}
