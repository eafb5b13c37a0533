use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::write_json_atomic;
use crate::domain::{RawCountry, RawCountryFile};
use crate::error::{Result, ScraperError};
use crate::pipeline::refine::RefinedCountry;

const RAW_DIR: &str = "raw";
const REFINED_DIR: &str = "refined";
const ANALYSIS_DIR: &str = "analysis";

/// Records read from a snapshot directory, plus the files that could not be read
#[derive(Debug)]
pub struct Loaded<T> {
    pub records: Vec<T>,
    /// Slugs (file stems) of unreadable files
    pub failed: Vec<String>,
}

/// Root directory holding one subdirectory per snapshot date
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create (or reuse) the snapshot named `name` with its subdirectories.
    pub fn create(&self, name: &str) -> Result<Snapshot> {
        check_name(name, "snapshot")?;
        let snapshot = Snapshot {
            name: name.to_string(),
            path: self.root.join(name),
        };
        for dir in [RAW_DIR, REFINED_DIR, ANALYSIS_DIR] {
            fs::create_dir_all(snapshot.path.join(dir))?;
        }
        debug!(path = %snapshot.path.display(), "Snapshot ready");
        Ok(snapshot)
    }

    /// Snapshot named after today's UTC date
    pub fn create_today(&self) -> Result<Snapshot> {
        self.create(&Utc::now().format("%Y-%m-%d").to_string())
    }

    /// Snapshot names in ascending order; hidden directories are ignored.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn latest(&self) -> Result<Option<Snapshot>> {
        Ok(self.list()?.pop().map(|name| Snapshot {
            path: self.root.join(&name),
            name,
        }))
    }

    pub fn open(&self, name: &str) -> Result<Snapshot> {
        check_name(name, "snapshot")?;
        let path = self.root.join(name);
        if !path.is_dir() {
            return Err(ScraperError::Snapshot(format!(
                "snapshot '{}' not found under {}",
                name,
                self.root.display()
            )));
        }
        Ok(Snapshot {
            name: name.to_string(),
            path,
        })
    }

    /// The named snapshot, or the latest one when no name is given.
    pub fn resolve(&self, name: Option<&str>) -> Result<Snapshot> {
        match name {
            Some(name) => self.open(name),
            None => self.latest()?.ok_or_else(|| {
                ScraperError::Snapshot(format!("no snapshots under {}", self.root.display()))
            }),
        }
    }
}

/// One dated snapshot: `raw/`, `refined/` and `analysis/`
#[derive(Debug, Clone)]
pub struct Snapshot {
    name: String,
    path: PathBuf,
}

impl Snapshot {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.path.join(RAW_DIR)
    }

    pub fn refined_dir(&self) -> PathBuf {
        self.path.join(REFINED_DIR)
    }

    pub fn analysis_dir(&self) -> PathBuf {
        self.path.join(ANALYSIS_DIR)
    }

    pub fn save_raw(&self, country: &RawCountry) -> Result<PathBuf> {
        check_name(&country.country_slug, "country slug")?;
        let path = self.raw_dir().join(format!("{}.json", country.country_slug));
        write_json_atomic(&path, &country.clone().into_file()?)?;
        debug!(path = %path.display(), "Saved raw record");
        Ok(path)
    }

    pub fn load_raw(&self) -> Result<Loaded<RawCountry>> {
        let loaded: Loaded<RawCountryFile> = load_dir(&self.raw_dir())?;
        Ok(Loaded {
            records: loaded.records.into_iter().map(RawCountry::from_file).collect(),
            failed: loaded.failed,
        })
    }

    pub fn save_refined(&self, country: &RefinedCountry) -> Result<PathBuf> {
        check_name(&country.country_slug, "country slug")?;
        let path = self
            .refined_dir()
            .join(format!("{}.json", country.country_slug));
        write_json_atomic(&path, country)?;
        debug!(path = %path.display(), "Saved refined record");
        Ok(path)
    }

    pub fn load_refined(&self) -> Result<Loaded<RefinedCountry>> {
        load_dir(&self.refined_dir())
    }

    /// Write an analysis report as `analysis/<file_name>`.
    pub fn save_analysis<T: Serialize>(&self, file_name: &str, report: &T) -> Result<PathBuf> {
        check_name(file_name, "analysis file")?;
        let path = self.analysis_dir().join(file_name);
        write_json_atomic(&path, report)?;
        info!(path = %path.display(), "Saved analysis report");
        Ok(path)
    }
}

fn check_name(name: &str, what: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        return Err(ScraperError::Snapshot(format!("invalid {} name '{}'", what, name)));
    }
    Ok(())
}

/// Every `*.json` file in `dir`, in file-name order. Unreadable files are
/// logged and listed in `failed`.
fn load_dir<T: DeserializeOwned>(dir: &Path) -> Result<Loaded<T>> {
    if !dir.is_dir() {
        return Err(ScraperError::Snapshot(format!(
            "directory {} does not exist",
            dir.display()
        )));
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut loaded = Loaded {
        records: Vec::with_capacity(paths.len()),
        failed: Vec::new(),
    };
    for path in paths {
        let slug = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let parsed = fs::read_to_string(&path)
            .map_err(ScraperError::from)
            .and_then(|contents| serde_json::from_str::<T>(&contents).map_err(ScraperError::from));
        match parsed {
            Ok(record) => loaded.records.push(record),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable record file");
                loaded.failed.push(slug);
            }
        }
    }

    info!(
        dir = %dir.display(),
        loaded = loaded.records.len(),
        failed = loaded.failed.len(),
        "Loaded records"
    );
    Ok(loaded)
}
