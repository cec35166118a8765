//! Manifest discovery across the three roots.
//!
//! Walks the Cases, Suites, and Plans roots for their manifest files, decodes
//! and validates each one, and rejects duplicate identities per entity type.
//! Discovery never aborts on the first bad manifest; it collects structured
//! errors so a caller can report all of them at once.

use crate::errors::{EngineError, ErrorKind};
use crate::identity::Identity;
use crate::manifest::{self, CaseManifest, PlanManifest, SuiteManifest};
use crate::status::RunType;
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

pub const CASE_MANIFEST: &str = "test.manifest.json";
pub const SUITE_MANIFEST: &str = "suite.manifest.json";
pub const PLAN_MANIFEST: &str = "plan.manifest.json";

/// A validated manifest together with its raw document and location.
#[derive(Debug, Clone)]
pub struct Discovered<T> {
    pub manifest: T,
    pub raw: Json,
    pub path: PathBuf,
    pub dir: PathBuf,
}

#[derive(Debug, Default)]
pub struct DiscoveryResult {
    pub cases: BTreeMap<Identity, Discovered<CaseManifest>>,
    pub suites: BTreeMap<Identity, Discovered<SuiteManifest>>,
    pub plans: BTreeMap<Identity, Discovered<PlanManifest>>,
    pub errors: Vec<EngineError>,
}

impl DiscoveryResult {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Scan all three roots. A missing root scans as empty.
pub fn discover(cases_root: &Path, suites_root: &Path, plans_root: &Path) -> DiscoveryResult {
    let mut result = DiscoveryResult::default();

    let cases = load_root(cases_root, CASE_MANIFEST, RunType::TestCase, &mut result.errors, |path, raw| {
        CaseManifest::from_raw(path, raw).map(|m| (m.identity.clone(), m))
    });
    result.cases = cases;

    let suites = load_root(suites_root, SUITE_MANIFEST, RunType::TestSuite, &mut result.errors, |path, raw| {
        SuiteManifest::from_raw(path, raw).map(|m| (m.identity.clone(), m))
    });
    result.suites = suites;

    let plans = load_root(plans_root, PLAN_MANIFEST, RunType::TestPlan, &mut result.errors, |path, raw| {
        PlanManifest::from_raw(path, raw).map(|m| (m.identity.clone(), m))
    });
    result.plans = plans;

    result
}

fn load_root<T>(
    root: &Path,
    file_name: &str,
    entity_type: RunType,
    errors: &mut Vec<EngineError>,
    parse: impl Fn(&Path, &Json) -> Result<(Identity, T), EngineError>,
) -> BTreeMap<Identity, Discovered<T>> {
    let mut by_identity: BTreeMap<Identity, Vec<Discovered<T>>> = BTreeMap::new();

    if !root.exists() {
        debug!(root = %root.display(), "root does not exist, scanning as empty");
        return BTreeMap::new();
    }

    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                errors.push(EngineError::new(
                    ErrorKind::Io,
                    format!("walking {}: {e}", root.display()),
                ));
                continue;
            }
        };
        if !entry.file_type().is_file() || entry.file_name().to_str() != Some(file_name) {
            continue;
        }
        let path = entry.path();
        debug!(path = %path.display(), "loading manifest");
        let raw = match manifest::read_raw(path) {
            Ok(raw) => raw,
            Err(e) => {
                errors.push(e);
                continue;
            }
        };
        match parse(path, &raw) {
            Ok((identity, parsed)) => {
                let dir = path.parent().unwrap_or(root).to_path_buf();
                by_identity.entry(identity).or_default().push(Discovered {
                    manifest: parsed,
                    raw,
                    path: path.to_path_buf(),
                    dir,
                });
            }
            Err(e) => errors.push(e),
        }
    }

    let mut out = BTreeMap::new();
    for (identity, mut found) in by_identity {
        if found.len() > 1 {
            let conflict_paths = found
                .iter()
                .map(|d| d.path.display().to_string())
                .collect();
            errors.push(
                EngineError::new(
                    ErrorKind::IdentityDuplicate,
                    format!("{} '{}' is declared more than once", entity_type, identity),
                )
                .with_entity_type(entity_type)
                .with_identity(identity.id(), identity.version())
                .with_conflict_paths(conflict_paths),
            );
            continue;
        }
        let single = found.remove(0);
        out.insert(identity, single);
    }
    out
}
