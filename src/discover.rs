use crate::errors::Result;
use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// ---------------------------------------------------------------------------
// Work items
// ---------------------------------------------------------------------------

/// One exported function selected for deployment.
///
/// Identity is the (file, export name) pair. Produced by [`find`], consumed
/// once per orchestrator run, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionExport {
    pub file_path: PathBuf,
    pub export_name: String,
}

/// All matching exports of one source file.
///
/// Exports within a file share one bundle and one archive per provider, so
/// the orchestrator fans out per file first and per export second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileExports {
    pub path: PathBuf,
    pub export_names: Vec<String>,
}

impl FileExports {
    /// The individual (file, export) work items of this group.
    pub fn exports(&self) -> Vec<FunctionExport> {
        self.export_names
            .iter()
            .map(|name| FunctionExport {
                file_path: self.path.clone(),
                export_name: name.clone(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Export scanning
// ---------------------------------------------------------------------------

/// Scan `dir` for JavaScript files whose exported names match `pattern`.
///
/// Recognized export forms:
///
/// - `exports.name = ...` / `module.exports.name = ...`
/// - `module.exports = { a, b: impl, c }`
///
/// Files with no matching export are omitted; an empty result is not an
/// error. `node_modules` and hidden directories are skipped.
pub fn find(dir: impl AsRef<Path>, pattern: &Regex) -> Result<Vec<FileExports>> {
    let assignment = Regex::new(r"(?m)^\s*(?:module\.)?exports\.([A-Za-z_$][\w$]*)\s*=")
        .expect("static export regex");
    let object_literal =
        Regex::new(r"module\.exports\s*=\s*\{([^}]*)\}").expect("static export regex");

    let mut groups = Vec::new();

    for entry in WalkDir::new(dir.as_ref())
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e))
        .filter_map(std::result::Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("js") {
            continue;
        }

        let source = std::fs::read_to_string(path)?;
        let mut names: Vec<String> = Vec::new();

        for caps in assignment.captures_iter(&source) {
            push_unique(&mut names, &caps[1]);
        }
        for caps in object_literal.captures_iter(&source) {
            for field in caps[1].split(',') {
                let name = field.split(':').next().unwrap_or("").trim();
                if !name.is_empty() && is_identifier(name) {
                    push_unique(&mut names, name);
                }
            }
        }

        names.retain(|name| pattern.is_match(name));
        if names.is_empty() {
            continue;
        }

        tracing::debug!(path = %path.display(), exports = ?names, "matched exports");
        groups.push(FileExports {
            path: path.to_path_buf(),
            export_names: names,
        });
    }

    Ok(groups)
}

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    // depth 0 is the scan root itself, which may legitimately be hidden.
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name == "node_modules" || name.starts_with('.'))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn finds_assignment_exports() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "api.js",
            "exports.endpoint_hello = async (event) => event\nmodule.exports.endpoint_bye = f\n",
        );

        let pattern = Regex::new("^endpoint_").unwrap();
        let groups = find(dir.path(), &pattern).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].export_names, vec!["endpoint_hello", "endpoint_bye"]);
    }

    #[test]
    fn finds_object_literal_exports() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "fns.js",
            "function a() {}\nfunction b() {}\nmodule.exports = { endpoint_a: a, endpoint_b }\n",
        );

        let pattern = Regex::new("^endpoint_").unwrap();
        let groups = find(dir.path(), &pattern).unwrap();
        assert_eq!(groups[0].export_names, vec!["endpoint_a", "endpoint_b"]);
    }

    #[test]
    fn empty_when_nothing_matches() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "lib.js", "exports.helper = () => 1\n");

        let pattern = Regex::new("^endpoint_").unwrap();
        let groups = find(dir.path(), &pattern).unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn skips_node_modules() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("node_modules");
        std::fs::create_dir(&nested).unwrap();
        write(&nested, "dep.js", "exports.endpoint_dep = () => 1\n");

        let pattern = Regex::new("^endpoint_").unwrap();
        let groups = find(dir.path(), &pattern).unwrap();
        assert!(groups.is_empty());
    }
}
