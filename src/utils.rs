//! Shared I/O utilities: atomic writes, the repository advisory lock,
//! human-readable duration parsing, and content-based mime sniffing.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::errors::NtError;

/// Write `data` to `path` atomically: a temp file in the same directory is
/// fully written and fsynced, then renamed over the destination. Readers
/// never observe a partial file.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), NtError> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| NtError::IOError(e.error))?;
    Ok(())
}

/// Exclusive advisory lock on the repository.
///
/// Mutating operations hold this for the duration of `stage`+`commit` or
/// `reset`. The lock is a `create_new` file carrying the holder's PID and is
/// removed on drop.
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    pub fn acquire(path: &Path) -> Result<LockFile, NtError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        match fs::OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut f) => {
                let _ = writeln!(f, "{}", std::process::id());
                Ok(LockFile {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(NtError::LockHeld(path.to_path_buf()))
            }
            Err(e) => Err(NtError::IOError(e)),
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Parse a duration such as `30s`, `15m`, `24h` or `7d`. A bare number is
/// seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, NtError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(NtError::InvalidConfig("empty duration".to_string()));
    }
    let (value, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => raw.split_at(pos),
        None => (raw, "s"),
    };
    let n: u64 = value
        .parse()
        .map_err(|_| NtError::InvalidConfig(format!("invalid duration `{raw}`")))?;
    let secs = match unit.trim() {
        "s" => n,
        "m" => n * 60,
        "h" => n * 3600,
        "d" => n * 86400,
        other => {
            return Err(NtError::InvalidConfig(format!(
                "unknown duration unit `{other}`"
            )));
        }
    };
    Ok(Duration::from_secs(secs))
}

/// Sniff a mime type from leading magic bytes, falling back to the file
/// extension, then to `application/octet-stream`.
pub fn sniff_mime(data: &[u8], extension: Option<&str>) -> String {
    if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        return "image/png".to_string();
    }
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return "image/jpeg".to_string();
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return "image/gif".to_string();
    }
    if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return "image/webp".to_string();
    }
    if data.starts_with(b"%PDF") {
        return "application/pdf".to_string();
    }
    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        return "video/mp4".to_string();
    }
    if data.starts_with(b"OggS") {
        return "audio/ogg".to_string();
    }
    if data.starts_with(b"ID3") || data.starts_with(&[0xFF, 0xFB]) {
        return "audio/mpeg".to_string();
    }
    match extension.map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("md") | Some("markdown") => "text/markdown".to_string(),
        Some("txt") => "text/plain".to_string(),
        Some("svg") => "image/svg+xml".to_string(),
        Some("wav") => "audio/wav".to_string(),
        Some("webm") => "video/webm".to_string(),
        _ if std::str::from_utf8(data).is_ok() => "text/plain".to_string(),
        _ => "application/octet-stream".to_string(),
    }
}

/// Normalise a repository-relative path to forward slashes.
pub fn normalize_rel_path(path: &Path) -> String {
    let mut out = String::new();
    for component in path.components() {
        if let std::path::Component::Normal(part) = component {
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str(&part.to_string_lossy());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index");
        atomic_write(&path, b"one").unwrap();
        atomic_write(&path, b"two").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two");
    }

    #[test]
    fn test_lock_excludes_second_holder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lock");
        let lock = LockFile::acquire(&path).unwrap();
        assert!(matches!(
            LockFile::acquire(&path),
            Err(NtError::LockHeld(_))
        ));
        drop(lock);
        assert!(LockFile::acquire(&path).is_ok());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(86400));
        assert_eq!(parse_duration("7d").unwrap(), Duration::from_secs(604800));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert!(parse_duration("7w").is_err());
    }

    #[test]
    fn test_sniff_mime() {
        assert_eq!(sniff_mime(&[0x89, b'P', b'N', b'G', 0, 0], None), "image/png");
        assert_eq!(sniff_mime(&[0xFF, 0xD8, 0xFF, 0xE0], None), "image/jpeg");
        assert_eq!(sniff_mime(b"# Heading", Some("md")), "text/markdown");
        assert_eq!(sniff_mime(&[0x00, 0x01, 0x02], Some("bin")), "application/octet-stream");
    }

    #[test]
    fn test_normalize_rel_path() {
        assert_eq!(
            normalize_rel_path(Path::new("./references/books/index.md")),
            "references/books/index.md"
        );
    }
}
