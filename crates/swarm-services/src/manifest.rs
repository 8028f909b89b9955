//! Local file manifest.
//!
//! Every file under the share directory, keyed by content hash. Rebuilt
//! from scratch whenever a caller needs a fresh view; never persisted.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use swarm_core::crypto::Hasher;
use swarm_core::wire::FileHash;

const READ_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub size: u32,
    /// Relative to the share directory.
    pub relative_path: PathBuf,
}

impl ManifestEntry {
    /// The relative path as carried in a FileDigest: `/`-separated.
    pub fn wire_name(&self) -> String {
        self.relative_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[derive(Debug, Clone, Default)]
pub struct FileManifest {
    root: PathBuf,
    entries: HashMap<FileHash, ManifestEntry>,
}

impl FileManifest {
    pub fn empty(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: HashMap::new(),
        }
    }

    /// Hash every regular file under `root`. Unreadable files are skipped
    /// with a warning; a missing root yields an empty manifest.
    pub fn scan(root: impl Into<PathBuf>) -> Self {
        let mut manifest = Self::empty(root);
        let root = manifest.root.clone();
        manifest.walk(&root);
        tracing::debug!(root = %root.display(), files = manifest.len(), "manifest scanned");
        manifest
    }

    fn walk(&mut self, dir: &Path) {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                if dir != self.root || e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(dir = %dir.display(), error = %e, "cannot read directory");
                }
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                self.walk(&path);
            } else if file_type.is_file() {
                self.add_file(&path);
            }
        }
    }

    fn add_file(&mut self, path: &Path) {
        let (hash, size) = match hash_file(path) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot hash file");
                return;
            }
        };
        let Ok(size) = u32::try_from(size) else {
            tracing::warn!(path = %path.display(), size, "file too large to share");
            return;
        };
        let Ok(relative_path) = path.strip_prefix(&self.root) else {
            return;
        };
        self.entries.insert(
            hash,
            ManifestEntry {
                size,
                relative_path: relative_path.to_path_buf(),
            },
        );
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, hash: &FileHash) -> Option<&ManifestEntry> {
        self.entries.get(hash)
    }

    pub fn contains(&self, hash: &FileHash) -> bool {
        self.entries.contains_key(hash)
    }

    /// Absolute path of a manifest entry.
    pub fn path_of(&self, entry: &ManifestEntry) -> PathBuf {
        self.root.join(&entry.relative_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All hashes, sorted.
    pub fn hashes(&self) -> Vec<FileHash> {
        let mut hashes: Vec<FileHash> = self.entries.keys().copied().collect();
        hashes.sort();
        hashes
    }

    /// How many of `remote` this manifest does not hold.
    pub fn count_missing(&self, remote: &[FileHash]) -> usize {
        remote.iter().filter(|h| !self.contains(h)).count()
    }
}

/// Stream a file through the content hasher.
pub fn hash_file(path: &Path) -> io::Result<(FileHash, u64)> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Hasher::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((hasher.finalize(), total))
}

/// Turn a wire name into a relative path, refusing anything that could
/// escape the share directory.
pub fn safe_relative_path(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_core::crypto::content_hash;

    #[test]
    fn scan_finds_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("modules/web")).unwrap();
        fs::write(dir.path().join("top.txt"), b"top").unwrap();
        fs::write(dir.path().join("modules/web/app.swm"), b"web module").unwrap();

        let manifest = FileManifest::scan(dir.path());
        assert_eq!(manifest.len(), 2);

        let entry = manifest.get(&content_hash(b"web module")).unwrap();
        assert_eq!(entry.size, 10);
        assert_eq!(entry.wire_name(), "modules/web/app.swm");
        assert_eq!(
            manifest.path_of(entry),
            dir.path().join("modules").join("web").join("app.swm")
        );
    }

    #[test]
    fn missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = FileManifest::scan(dir.path().join("nope"));
        assert!(manifest.is_empty());
    }

    #[test]
    fn identical_files_collapse_to_one_hash() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), b"same").unwrap();
        fs::write(dir.path().join("b"), b"same").unwrap();
        assert_eq!(FileManifest::scan(dir.path()).len(), 1);
    }

    #[test]
    fn count_missing_compares_hashes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), b"alpha").unwrap();
        let manifest = FileManifest::scan(dir.path());
        let remote = [content_hash(b"alpha"), content_hash(b"beta")];
        assert_eq!(manifest.count_missing(&remote), 1);
        assert_eq!(manifest.hashes(), vec![content_hash(b"alpha")]);
    }

    #[test]
    fn hash_file_streams_large_files() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let path = dir.path().join("big");
        fs::write(&path, &data).unwrap();
        assert_eq!(hash_file(&path).unwrap(), (content_hash(&data), data.len() as u64));
    }

    #[test]
    fn unsafe_names_are_refused() {
        assert_eq!(safe_relative_path("a/b.swm"), Some(PathBuf::from("a").join("b.swm")));
        assert_eq!(safe_relative_path("./x"), Some(PathBuf::from("x")));
        assert_eq!(safe_relative_path("../etc/passwd"), None);
        assert_eq!(safe_relative_path("a/../../b"), None);
        assert_eq!(safe_relative_path("/etc/passwd"), None);
        assert_eq!(safe_relative_path(""), None);
    }
}
