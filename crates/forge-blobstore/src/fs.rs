use crate::keys::{self, BLOB_NAME_DELIMITER, CONTAINER_DELIMITER};
use crate::store::{BlobStore, BlobStoreError, BlobStoreResult};
use crate::types::ContainerName;
use chrono::NaiveDate;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const TMP_EXTENSION: &str = "tmp";

/// [`BlobStore`] rooted at a local directory.
///
/// Each container is a directory `<root>/<hub>-<suffix>`; `/` segments of the
/// blob name become nested directories below it.
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
    hub_name: String,
}

impl FsBlobStore {
    pub fn new<P: AsRef<Path>>(root: P, hub_name: impl Into<String>) -> BlobStoreResult<Self> {
        let hub_name = hub_name.into();
        keys::validate_hub_name(&hub_name)?;
        fs::create_dir_all(root.as_ref()).map_err(|err| {
            BlobStoreError::Backend(format!("create fs store root failed: {err}"))
        })?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
            hub_name,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn hub_name(&self) -> &str {
        &self.hub_name
    }

    /// Container directories owned by this hub, sorted by name.
    pub fn container_names(&self) -> BlobStoreResult<Vec<ContainerName>> {
        let entries = fs::read_dir(&self.root)
            .map_err(|err| BlobStoreError::Backend(format!("list containers failed: {err}")))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|err| BlobStoreError::Backend(format!("list containers failed: {err}")))?;
            let is_dir = entry
                .file_type()
                .map_err(|err| BlobStoreError::Backend(format!("stat container failed: {err}")))?
                .is_dir();
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if is_dir && self.owns_container(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn owns_container(&self, container_name: &str) -> bool {
        container_name
            .strip_prefix(self.hub_name.as_str())
            .is_some_and(|rest| rest.starts_with(CONTAINER_DELIMITER))
    }

    fn blob_path(&self, key: &str) -> BlobStoreResult<PathBuf> {
        let parsed = keys::parse_key(key)?;
        if !is_safe_container_suffix(&parsed.container_suffix) {
            return Err(BlobStoreError::MalformedKey {
                key: key.to_string(),
                reason: "container suffix is not a valid directory name".to_string(),
            });
        }

        let mut path = self
            .root
            .join(keys::container_name(&self.hub_name, &parsed.container_suffix));
        for segment in parsed.blob_name.split(BLOB_NAME_DELIMITER) {
            path.push(encode_segment(segment));
        }
        Ok(path)
    }

    fn remove_container(&self, container_name: &str) -> BlobStoreResult<()> {
        match fs::remove_dir_all(self.root.join(container_name)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(BlobStoreError::Backend(format!(
                "delete container {container_name} failed: {err}"
            ))),
        }
    }
}

fn is_safe_container_suffix(suffix: &str) -> bool {
    suffix != "."
        && suffix != ".."
        && !suffix.contains([BLOB_NAME_DELIMITER, '\\', '\0'])
        && !suffix.ends_with(&format!(".{TMP_EXTENSION}"))
}

/// Maps one blob-name segment to a file name that stays inside its parent
/// directory and never looks like a temp file.
///
/// `%`, `\` and NUL are percent-escaped, so the mapping is injective. Names
/// that would still be special (`.`, `..`, a `.tmp` suffix) get every `.`
/// escaped as well, and an empty segment becomes a lone `%`, which escaping
/// never produces.
fn encode_segment(segment: &str) -> String {
    if segment.is_empty() {
        return "%".to_string();
    }
    let mut encoded = String::with_capacity(segment.len());
    for c in segment.chars() {
        match c {
            '%' | '\\' | '\0' => encoded.push_str(&format!("%{:02X}", c as u32)),
            _ => encoded.push(c),
        }
    }
    let special = encoded == "."
        || encoded == ".."
        || encoded.ends_with(&format!(".{TMP_EXTENSION}"));
    if special {
        encoded = encoded.replace('.', "%2E");
    }
    encoded
}

#[async_trait::async_trait]
impl BlobStore for FsBlobStore {
    async fn save(&self, key: &str, bytes: &[u8]) -> BlobStoreResult<()> {
        let path = self.blob_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                BlobStoreError::Backend(format!("create container directory failed: {err}"))
            })?;
        }
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(format!(".{TMP_EXTENSION}"));
        let tmp = path.with_file_name(tmp_name);
        fs::write(&tmp, bytes)
            .map_err(|err| BlobStoreError::Backend(format!("write blob failed: {err}")))?;
        fs::rename(&tmp, &path)
            .map_err(|err| BlobStoreError::Backend(format!("rename blob failed: {err}")))?;
        Ok(())
    }

    async fn load(&self, key: &str) -> BlobStoreResult<Vec<u8>> {
        let path = self.blob_path(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(BlobStoreError::NotFound {
                resource: "blob",
                id: key.to_string(),
            }),
            Err(err) => Err(BlobStoreError::Backend(format!("read blob failed: {err}"))),
        }
    }

    async fn purge_expired(&self, threshold: NaiveDate) -> BlobStoreResult<usize> {
        let mut expired = Vec::new();
        for name in self.container_names()? {
            if keys::is_container_expired(&name, threshold)? {
                expired.push(name);
            }
        }
        for name in &expired {
            self.remove_container(name)?;
            tracing::info!(container = %name, "purged expired container");
        }
        Ok(expired.len())
    }

    async fn delete_all(&self) -> BlobStoreResult<usize> {
        let names = self.container_names()?;
        for name in &names {
            self.remove_container(name)?;
        }
        Ok(names.len())
    }
}
