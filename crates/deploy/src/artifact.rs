//! Compiled artifact lookup.
//!
//! Hardhat writes artifacts to `artifacts/<source path>/<Contract>.json` with the creation
//! bytecode as a hex string under `bytecode`. Foundry writes them to
//! `out/<source file>/<Contract>.json` with the bytecode under `bytecode.object`. Both
//! layouts are recognised.

use std::path::{Path, PathBuf};

use alloy_core::primitives::Bytes;
use anyhow::{Context, Result};
use serde_json::Value;

/// Directories never searched for contract artifacts.
const SKIPPED_DIRS: &[&str] = &["build-info", "cache"];

/// A compiled contract ready to be deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub contract_name: String,
    /// The source file the contract was compiled from.
    pub source_name: String,
    /// The artifact file this was loaded from.
    pub path: PathBuf,
    /// The creation bytecode.
    pub bytecode: Bytes,
}

impl Artifact {
    /// The fully qualified name, `<source>:<contract>`.
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.contract_name)
    }
}

/// Looks up artifacts by contract name in an ordered list of directories.
///
/// Roots are searched in order and the first root containing a match wins.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    roots: Vec<PathBuf>,
}

impl ArtifactStore {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Load the artifact for `name`.
    ///
    /// `name` is either a bare contract name (`MyToken`) or a fully qualified one
    /// (`contracts/MyToken.sol:MyToken`).
    pub fn load(&self, name: &str) -> Result<Artifact> {
        let (source, contract) = match name.rsplit_once(':') {
            Some((source, contract)) => (Some(source), contract),
            None => (None, name),
        };

        if contract.is_empty() {
            anyhow::bail!("Invalid contract name: '{}'", name);
        }

        for root in &self.roots {
            if !root.is_dir() {
                tracing::trace!(root = %root.display(), "Artifacts directory does not exist, skipping");
                continue;
            }

            let mut candidates = Vec::new();
            collect_candidates(root, root, source, contract, &mut candidates)
                .with_context(|| format!("Failed to search {}", root.display()))?;

            match candidates.len() {
                0 => continue,
                1 => {
                    let (path, source_dir) = candidates.remove(0);
                    return read_artifact(&path, &source_dir, contract);
                }
                _ => {
                    let mut names: Vec<String> = candidates
                        .iter()
                        .map(|(_, source_dir)| format!("{}:{}", source_dir, contract))
                        .collect();
                    names.sort();
                    anyhow::bail!(
                        "There are multiple artifacts for contract \"{}\", please use a fully qualified name instead: {}",
                        contract,
                        names.join(", ")
                    );
                }
            }
        }

        let searched: Vec<String> = self
            .roots
            .iter()
            .map(|root| root.display().to_string())
            .collect();

        anyhow::bail!(
            "Artifact for contract \"{}\" not found in [{}]. Is the project compiled?",
            name,
            searched.join(", ")
        )
    }
}

/// Recursively collect `(artifact path, source dir relative to root)` pairs matching `contract`.
fn collect_candidates(
    root: &Path,
    dir: &Path,
    source: Option<&str>,
    contract: &str,
    out: &mut Vec<(PathBuf, String)>,
) -> Result<()> {
    let file_name = format!("{}.json", contract);

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        // Symlinked directories are not followed, so link cycles cannot recurse forever.
        if entry.file_type()?.is_dir() {
            let skipped = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| SKIPPED_DIRS.contains(&n));

            if !skipped {
                collect_candidates(root, &path, source, contract, out)?;
            }
            continue;
        }

        if path.file_name().and_then(|n| n.to_str()) != Some(file_name.as_str()) {
            continue;
        }

        let Some(parent) = path.parent() else {
            continue;
        };

        // Artifacts always live in a directory named after their source file.
        if parent.extension().and_then(|e| e.to_str()) != Some("sol") {
            continue;
        }

        let source_dir = parent
            .strip_prefix(root)
            .unwrap_or(parent)
            .to_string_lossy()
            .replace('\\', "/");

        if let Some(source) = source {
            // Foundry flattens sources to their file name.
            let source_file = Path::new(source).file_name().and_then(|n| n.to_str());
            if source_dir != source && Some(source_dir.as_str()) != source_file {
                continue;
            }
        }

        out.push((path, source_dir));
    }

    Ok(())
}

fn read_artifact(path: &Path, source_dir: &str, contract: &str) -> Result<Artifact> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let json: Value = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;

    let bytecode = extract_bytecode(&json)
        .with_context(|| format!("Invalid artifact for contract \"{}\"", contract))?;

    let source_name = json
        .get("sourceName")
        .and_then(|s| s.as_str())
        .unwrap_or(source_dir)
        .to_string();

    tracing::debug!(
        path = %path.display(),
        source = %source_name,
        bytecode_len = bytecode.len(),
        "Loaded artifact"
    );

    Ok(Artifact {
        contract_name: contract.to_string(),
        source_name,
        path: path.to_path_buf(),
        bytecode,
    })
}

/// Extract creation bytecode from a Hardhat or Foundry artifact.
fn extract_bytecode(json: &Value) -> Result<Bytes> {
    let bytecode = json.get("bytecode").context("No bytecode found in artifact")?;

    let hex_str = match bytecode {
        Value::String(s) => s.as_str(),
        Value::Object(_) => bytecode
            .get("object")
            .and_then(|o| o.as_str())
            .context("No bytecode.object found in artifact")?,
        _ => anyhow::bail!("Unexpected bytecode format in artifact"),
    };

    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);

    if hex_str.is_empty() {
        anyhow::bail!("Artifact has no bytecode; abstract contracts and interfaces cannot be deployed");
    }

    if hex_str.contains("__") {
        anyhow::bail!("Bytecode contains unlinked library references");
    }

    hex::decode(hex_str)
        .map(Bytes::from)
        .context("Invalid bytecode hex")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn write(root: &Path, rel: &str, json: Value) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_string(&json).unwrap()).unwrap();
    }

    fn hardhat_artifact(name: &str, source: &str, bytecode: &str) -> Value {
        serde_json::json!({
            "_format": "hh-sol-artifact-1",
            "contractName": name,
            "sourceName": source,
            "abi": [],
            "bytecode": bytecode,
            "deployedBytecode": "0x",
            "linkReferences": {},
            "deployedLinkReferences": {}
        })
    }

    #[test]
    fn test_load_hardhat_artifact() {
        let dir = TempDir::new("shipit-artifacts").unwrap();
        let artifacts = dir.path().join("artifacts");
        write(
            &artifacts,
            "contracts/MyToken.sol/MyToken.json",
            hardhat_artifact("MyToken", "contracts/MyToken.sol", "0x6080604052"),
        );
        // Debug files and build info must be ignored.
        write(
            &artifacts,
            "contracts/MyToken.sol/MyToken.dbg.json",
            serde_json::json!({"buildInfo": "../../build-info/x.json"}),
        );
        write(&artifacts, "build-info/MyToken.json", serde_json::json!({}));

        let store = ArtifactStore::new(vec![artifacts]);
        let artifact = store.load("MyToken").unwrap();

        assert_eq!(artifact.contract_name, "MyToken");
        assert_eq!(artifact.source_name, "contracts/MyToken.sol");
        assert_eq!(artifact.qualified_name(), "contracts/MyToken.sol:MyToken");
        assert_eq!(artifact.bytecode.to_vec(), vec![0x60, 0x80, 0x60, 0x40, 0x52]);
    }

    #[test]
    fn test_load_foundry_artifact() {
        let dir = TempDir::new("shipit-artifacts").unwrap();
        let out = dir.path().join("out");
        write(
            &out,
            "MyToken.sol/MyToken.json",
            serde_json::json!({
                "abi": [],
                "bytecode": {"object": "0x6080", "linkReferences": {}},
            }),
        );

        let store = ArtifactStore::new(vec![dir.path().join("artifacts"), out]);
        let artifact = store.load("MyToken").unwrap();

        assert_eq!(artifact.source_name, "MyToken.sol");
        assert_eq!(artifact.bytecode.to_vec(), vec![0x60, 0x80]);
    }

    #[test]
    fn test_first_root_wins() {
        let dir = TempDir::new("shipit-artifacts").unwrap();
        let artifacts = dir.path().join("artifacts");
        let out = dir.path().join("out");
        write(
            &artifacts,
            "contracts/MyToken.sol/MyToken.json",
            hardhat_artifact("MyToken", "contracts/MyToken.sol", "0x01"),
        );
        write(
            &out,
            "MyToken.sol/MyToken.json",
            serde_json::json!({"bytecode": {"object": "0x02"}}),
        );

        let store = ArtifactStore::new(vec![artifacts, out]);
        assert_eq!(store.load("MyToken").unwrap().bytecode.to_vec(), vec![0x01]);
    }

    #[test]
    fn test_ambiguous_name_requires_qualified_name() {
        let dir = TempDir::new("shipit-artifacts").unwrap();
        let artifacts = dir.path().join("artifacts");
        write(
            &artifacts,
            "contracts/MyToken.sol/MyToken.json",
            hardhat_artifact("MyToken", "contracts/MyToken.sol", "0x01"),
        );
        write(
            &artifacts,
            "contracts/legacy/MyToken.sol/MyToken.json",
            hardhat_artifact("MyToken", "contracts/legacy/MyToken.sol", "0x02"),
        );

        let store = ArtifactStore::new(vec![artifacts]);

        let err = store.load("MyToken").unwrap_err().to_string();
        assert!(err.contains("multiple artifacts"));
        assert!(err.contains("contracts/MyToken.sol:MyToken"));
        assert!(err.contains("contracts/legacy/MyToken.sol:MyToken"));

        let artifact = store.load("contracts/legacy/MyToken.sol:MyToken").unwrap();
        assert_eq!(artifact.bytecode.to_vec(), vec![0x02]);
    }

    #[test]
    fn test_missing_artifact() {
        let dir = TempDir::new("shipit-artifacts").unwrap();
        let store = ArtifactStore::new(vec![dir.path().join("artifacts")]);

        let err = store.load("MyToken").unwrap_err().to_string();
        assert!(err.contains("\"MyToken\" not found"));
    }

    #[test]
    fn test_abstract_contract_rejected() {
        let dir = TempDir::new("shipit-artifacts").unwrap();
        let artifacts = dir.path().join("artifacts");
        write(
            &artifacts,
            "contracts/IToken.sol/IToken.json",
            hardhat_artifact("IToken", "contracts/IToken.sol", "0x"),
        );

        let store = ArtifactStore::new(vec![artifacts]);
        let err = format!("{:#}", store.load("IToken").unwrap_err());
        assert!(err.contains("cannot be deployed"));
    }

    #[test]
    fn test_unlinked_library_rejected() {
        let dir = TempDir::new("shipit-artifacts").unwrap();
        let artifacts = dir.path().join("artifacts");
        write(
            &artifacts,
            "contracts/Vault.sol/Vault.json",
            hardhat_artifact(
                "Vault",
                "contracts/Vault.sol",
                "0x6080__$1234567890abcdef1234567890abcdef12$__6040",
            ),
        );

        let store = ArtifactStore::new(vec![artifacts]);
        let err = format!("{:#}", store.load("Vault").unwrap_err());
        assert!(err.contains("unlinked library"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycle_is_not_followed() {
        let dir = TempDir::new("shipit-artifacts").unwrap();
        let artifacts = dir.path().join("artifacts");
        write(
            &artifacts,
            "contracts/MyToken.sol/MyToken.json",
            hardhat_artifact("MyToken", "contracts/MyToken.sol", "0x60"),
        );
        std::os::unix::fs::symlink(&artifacts, artifacts.join("contracts/loop")).unwrap();

        let store = ArtifactStore::new(vec![artifacts]);
        let artifact = store.load("MyToken").unwrap();
        assert_eq!(artifact.qualified_name(), "contracts/MyToken.sol:MyToken");
    }
}
