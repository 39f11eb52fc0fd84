use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use duckiestats_proto::Category;
use log::{debug, info, warn};
use serde_json::{Map, Value};

use super::{DeliveryHook, Observation, Provider};

/// Event documents carry their stamp in nanoseconds.
const NANOS_PER_SEC: f64 = 1e9;

/// A fact dropped on disk by another process, parsed once at construction.
///
/// A document that cannot be read or lacks the required fields leaves the
/// provider inert: it never becomes ready.
#[derive(Debug)]
pub struct FileProvider {
    category: Category,
    path: PathBuf,
    loaded: Option<Loaded>,
}

#[derive(Debug)]
struct Loaded {
    key: String,
    stamp: f64,
    payload: Value,
}

impl FileProvider {
    /// `{"type": <key>, "stamp": <ns>, "data": {...}}`
    pub fn event(path: impl AsRef<Path>) -> Self {
        let path = absolute(path.as_ref());
        let loaded = read_document(&path).and_then(|doc| {
            let key = doc.get("type")?.as_str()?.to_owned();
            let stamp = doc.get("stamp")?.as_f64()? / NANOS_PER_SEC;
            let payload = doc
                .get("data")
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new()));
            Some(Loaded {
                key,
                stamp,
                payload,
            })
        });
        Self::with(Category::Event, path, loaded)
    }

    /// `{"stamp": <s>, ...}`; the whole document is the payload.
    pub fn usage(key: &str, path: impl AsRef<Path>) -> Self {
        let path = absolute(path.as_ref());
        let loaded = read_document(&path).and_then(|doc| {
            let stamp = doc.get("stamp")?.as_f64()?;
            Some(Loaded {
                key: key.to_owned(),
                stamp,
                payload: Value::Object(doc),
            })
        });
        Self::with(Category::Usage, path, loaded)
    }

    fn with(category: Category, path: PathBuf, loaded: Option<Loaded>) -> Self {
        if loaded.is_none() {
            debug!("ignoring unusable {category} file {}", path.display());
        }
        Self {
            category,
            path,
            loaded,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn key(&self) -> Option<&str> {
        self.loaded.as_ref().map(|l| l.key.as_str())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn observation(&self) -> Option<Observation> {
        self.loaded.as_ref().map(|l| Observation {
            stamp: l.stamp,
            payload: l.payload.clone(),
        })
    }

    pub fn cleanup_hook(&self) -> Arc<dyn DeliveryHook> {
        Arc::new(RemoveFile(self.path.clone()))
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn read_document(path: &Path) -> Option<Map<String, Value>> {
    let content = fs::read_to_string(path)
        .inspect_err(|e| debug!("unable to read {}: {e}", path.display()))
        .ok()?;
    match serde_json::from_str(&content) {
        Ok(Value::Object(doc)) => Some(doc),
        Ok(_) => None,
        Err(e) => {
            debug!("malformed JSON in {}: {e}", path.display());
            None
        }
    }
}

/// Deletes the backing document so the same fact is not reported twice.
#[derive(Debug)]
pub struct RemoveFile(PathBuf);

impl DeliveryHook for RemoveFile {
    fn on_delivered(&self) {
        match fs::remove_file(&self.0) {
            Ok(()) => info!("removed delivered file {}", self.0.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("unable to remove {}: {e}", self.0.display()),
        }
    }
}

/// One event provider per `pattern` match in `dir`, in path order.
pub fn glob_event_providers(dir: &Path, pattern: &str) -> Vec<Provider> {
    glob_files(dir, pattern)
        .into_iter()
        .map(|path| Provider::File(FileProvider::event(path)))
        .collect()
}

/// One usage provider with the given key per `pattern` match in `dir`.
pub fn glob_usage_providers(dir: &Path, pattern: &str, key: &str) -> Vec<Provider> {
    glob_files(dir, pattern)
        .into_iter()
        .map(|path| Provider::File(FileProvider::usage(key, path)))
        .collect()
}

fn glob_files(dir: &Path, pattern: &str) -> Vec<PathBuf> {
    let pattern = dir.join(pattern.trim_start_matches('/'));
    let Some(pattern) = pattern.to_str() else {
        warn!("non UTF-8 glob pattern {}", pattern.display());
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = match glob::glob(pattern) {
        Ok(paths) => paths.filter_map(Result::ok).filter(|p| p.is_file()).collect(),
        Err(e) => {
            warn!("invalid glob pattern '{pattern}': {e}");
            return Vec::new();
        }
    };
    files.sort();
    files
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn usage_document_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");
        fs::write(&path, r#"{"stamp": 1700000000.5, "foo": "bar"}"#).unwrap();

        let mut provider = Provider::File(FileProvider::usage("disk_image", &path));
        assert!(provider.is_ready());
        assert!(provider.is_one_shot());
        assert_eq!(provider.key(), "disk_image");
        assert_eq!(provider.category(), Category::Usage);

        let observation = match &provider {
            Provider::File(f) => f.observation().unwrap(),
            _ => unreachable!(),
        };
        assert_eq!(observation.stamp, 1700000000.5);
        assert_eq!(
            observation.payload,
            json!({"stamp": 1700000000.5, "foo": "bar"})
        );
    }

    #[test]
    fn usage_document_without_stamp_is_inert() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");
        fs::write(&path, r#"{"foo": "bar"}"#).unwrap();

        let mut provider = Provider::File(FileProvider::usage("disk_image", &path));
        assert!(!provider.is_ready());
        assert!(!provider.is_ready());
    }

    #[test]
    fn garbage_and_missing_files_are_inert() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{not json").unwrap();

        assert!(!FileProvider::event(&path).is_loaded());
        assert!(!FileProvider::event(dir.path().join("missing.json")).is_loaded());
        fs::write(&path, "[1, 2]").unwrap();
        assert!(!FileProvider::usage("k", &path).is_loaded());
    }

    #[tokio::test]
    async fn event_stamp_is_converted_to_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boot.json");
        fs::write(
            &path,
            r#"{"type": "boot", "stamp": 5000000000, "data": {"ok": true}}"#,
        )
        .unwrap();

        let mut provider = Provider::File(FileProvider::event(&path));
        assert!(provider.is_ready());
        assert_eq!(provider.key(), "boot");
        assert_eq!(provider.category(), Category::Event);

        let observation = provider.observe().await.unwrap();
        assert_eq!(observation.stamp, 5.0);
        assert_eq!(observation.payload, json!({"ok": true}));
    }

    #[test]
    fn event_requires_type_and_defaults_data() {
        let dir = tempfile::tempdir().unwrap();
        let untyped = dir.path().join("untyped.json");
        fs::write(&untyped, r#"{"stamp": 1}"#).unwrap();
        assert!(!FileProvider::event(&untyped).is_loaded());

        let bare = dir.path().join("bare.json");
        fs::write(&bare, r#"{"type": "shutdown", "stamp": 2000000000}"#).unwrap();
        let provider = FileProvider::event(&bare);
        assert_eq!(provider.observation().unwrap().payload, json!({}));
    }

    #[test]
    fn cleanup_removes_backing_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boot.json");
        fs::write(&path, r#"{"type": "boot", "stamp": 1}"#).unwrap();

        let hook = FileProvider::event(&path).cleanup_hook();
        hook.on_delivered();
        assert!(!path.exists());
        // a second confirmation is harmless
        hook.on_delivered();
    }

    #[test]
    fn glob_registers_only_matching_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.json"), r#"{"type": "b", "stamp": 1}"#).unwrap();
        fs::write(dir.path().join("a.json"), r#"{"type": "a", "stamp": 1}"#).unwrap();
        fs::write(dir.path().join("c.txt"), "ignored").unwrap();

        let providers = glob_event_providers(dir.path(), "/*.json");
        let keys: Vec<_> = providers.iter().map(|p| p.key().to_owned()).collect();
        assert_eq!(keys, ["a", "b"]);

        assert!(glob_usage_providers(&dir.path().join("nope"), "*.json", "k").is_empty());
    }
}
