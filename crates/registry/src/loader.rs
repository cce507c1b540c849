//! Static manifest sources: multi-document YAML/JSON from strings, files, or directories.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use keel_core::{Manifest, ManifestSource, ResourceObject, SourceKind};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

const DEFAULT_MAX_MANIFEST_BYTES: usize = 8 * 1024 * 1024;

fn max_manifest_bytes() -> usize {
    std::env::var("KEEL_MAX_MANIFEST_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(DEFAULT_MAX_MANIFEST_BYTES)
}

/// One ingested source: its diagnostics and the documents accepted from it.
#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub source: Arc<ManifestSource>,
    pub objects: Vec<ResourceObject>,
}

impl LoadedSource {
    pub fn manifests(&self) -> impl Iterator<Item = Manifest> + '_ {
        self.objects.iter().map(|o| Manifest::new(o.clone(), Arc::clone(&self.source)))
    }
}

#[derive(Debug, Clone)]
pub struct ManifestLoader {
    max_bytes: usize,
}

impl Default for ManifestLoader {
    fn default() -> Self { Self { max_bytes: max_manifest_bytes() } }
}

impl ManifestLoader {
    pub fn new() -> Self { Self::default() }

    pub fn with_max_bytes(max_bytes: usize) -> Self { Self { max_bytes } }

    /// Parse `text` as a stream of YAML documents. Never fails; problems land in the diagnostics.
    pub fn load_str(&self, kind: SourceKind, path: &str, text: &str) -> LoadedSource {
        let mut source = ManifestSource::new(kind, path);
        let mut objects = Vec::new();
        if text.len() > self.max_bytes {
            source.success = false;
            source.errors.push(format!("input is {} bytes, limit is {}", text.len(), self.max_bytes));
            return LoadedSource { source: Arc::new(source), objects };
        }
        for (i, doc) in serde_yaml::Deserializer::from_str(text).enumerate() {
            let value = match Value::deserialize(doc) {
                Ok(v) => v,
                Err(e) => {
                    source.success = false;
                    source.errors.push(format!("document {}: {}", i, e));
                    break;
                }
            };
            if value.is_null() { continue; }
            match accept_document(value) {
                Ok(o) => objects.push(o),
                Err(reason) => source.warnings.push(format!("document {}: {}", i, reason)),
            }
        }
        debug!(path, docs = objects.len(), warnings = source.warnings.len(), errors = source.errors.len(), "loader: parsed source");
        LoadedSource { source: Arc::new(source), objects }
    }

    /// Load one file; read failures become error diagnostics.
    pub fn load_file(&self, path: &Path) -> LoadedSource {
        let label = path.display().to_string();
        match std::fs::metadata(path) {
            Ok(md) if md.len() as usize > self.max_bytes => {
                let mut source = ManifestSource::new(SourceKind::File, label);
                source.success = false;
                source.errors.push(format!("file is {} bytes, limit is {}", md.len(), self.max_bytes));
                return LoadedSource { source: Arc::new(source), objects: Vec::new() };
            }
            _ => {}
        }
        match std::fs::read_to_string(path) {
            Ok(text) => self.load_str(SourceKind::File, &label, &text),
            Err(e) => {
                warn!(path = %label, error = %e, "loader: read failed");
                let mut source = ManifestSource::new(SourceKind::File, label);
                source.success = false;
                source.errors.push(e.to_string());
                LoadedSource { source: Arc::new(source), objects: Vec::new() }
            }
        }
    }

    /// Load a file, or every `.yaml`/`.yml`/`.json` file under a directory (sorted, recursive).
    pub fn load_path(&self, path: &Path) -> Result<Vec<LoadedSource>> {
        let files = if path.is_dir() {
            let mut files = Vec::new();
            collect_manifest_files(path, &mut files)?;
            files.sort();
            files
        } else {
            vec![path.to_path_buf()]
        };
        let loaded: Vec<LoadedSource> = files.iter().map(|f| self.load_file(f)).collect();
        let docs: usize = loaded.iter().map(|l| l.objects.len()).sum();
        let failed = loaded.iter().filter(|l| !l.source.success).count();
        info!(path = %path.display(), files = loaded.len(), docs, failed, "loader: path loaded");
        Ok(loaded)
    }
}

fn accept_document(value: Value) -> std::result::Result<ResourceObject, String> {
    let object = ResourceObject::try_from(value).map_err(|e| e.to_string())?;
    if object.api_version().is_none() { return Err("missing apiVersion".into()); }
    if object.kind().is_none() { return Err("missing kind".into()); }
    if object.name().is_none() { return Err("missing metadata.name".into()); }
    Ok(object)
}

fn is_manifest_file(p: &Path) -> bool {
    matches!(p.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml") | Some("json"))
}

fn collect_manifest_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir).with_context(|| format!("reading directory {}", dir.display()))?;
    for entry in entries {
        let p = entry.with_context(|| format!("listing {}", dir.display()))?.path();
        if p.is_dir() {
            collect_manifest_files(&p, out)?;
        } else if is_manifest_file(&p) {
            out.push(p);
        }
    }
    Ok(())
}
