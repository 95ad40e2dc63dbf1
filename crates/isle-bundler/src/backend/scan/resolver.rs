//! Default resolution for imports no plugin claimed.
//!
//! Relative and absolute specifiers are probed as files, then with known
//! extensions, then as directories with an index. Bare specifiers walk up the
//! `node_modules` chain and read `module`, then `main`, from `package.json`.

use std::path::{Path, PathBuf};

use path_clean::PathClean;

use crate::backend::hooks::{is_bare, split_package};

const EXTENSIONS: &[&str] = &["js", "mjs", "json"];
const INDEX_FILES: &[&str] = &["index.js", "index.mjs"];

/// Outcome of a default resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    File(PathBuf),
    /// A bare import with no installed package.
    Missing,
}

pub fn resolve(specifier: &str, resolve_dir: &Path) -> Resolved {
    if is_bare(specifier) {
        return resolve_package(specifier, resolve_dir);
    }
    let target = if Path::new(specifier).is_absolute() {
        PathBuf::from(specifier)
    } else {
        resolve_dir.join(specifier)
    };
    match probe(&target.clean()) {
        Some(found) => Resolved::File(found),
        None => Resolved::Missing,
    }
}

fn resolve_package(specifier: &str, resolve_dir: &Path) -> Resolved {
    let (name, subpath) = split_package(specifier);
    for dir in resolve_dir.ancestors() {
        let package = dir.join("node_modules").join(name);
        if !package.is_dir() {
            continue;
        }
        let found = match subpath {
            Some(sub) => probe(&package.join(sub)),
            None => package_entry(&package).or_else(|| probe_index(&package)),
        };
        if let Some(found) = found {
            return Resolved::File(found);
        }
    }
    Resolved::Missing
}

fn package_entry(package: &Path) -> Option<PathBuf> {
    let manifest = std::fs::read_to_string(package.join("package.json")).ok()?;
    let manifest: serde_json::Value = serde_json::from_str(&manifest).ok()?;
    ["module", "main"]
        .iter()
        .filter_map(|field| manifest.get(*field).and_then(|v| v.as_str()))
        .find_map(|entry| probe(&package.join(entry).clean()))
}

/// The file itself, the file with a known extension, or a directory index.
fn probe(target: &Path) -> Option<PathBuf> {
    if target.is_file() {
        return Some(target.to_path_buf());
    }
    for ext in EXTENSIONS {
        let mut with_ext = target.as_os_str().to_owned();
        with_ext.push(".");
        with_ext.push(ext);
        let with_ext = PathBuf::from(with_ext);
        if with_ext.is_file() {
            return Some(with_ext);
        }
    }
    if target.is_dir() {
        return probe_index(target);
    }
    None
}

fn probe_index(dir: &Path) -> Option<PathBuf> {
    INDEX_FILES
        .iter()
        .map(|index| dir.join(index))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn relative_imports_probe_extensions_and_indexes() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        touch(&src.join("utils/date.js"), "");
        touch(&src.join("lib/index.js"), "");

        assert_eq!(
            resolve("./utils/date", &src),
            Resolved::File(src.join("utils/date.js"))
        );
        assert_eq!(resolve("./lib", &src), Resolved::File(src.join("lib/index.js")));
        assert_eq!(resolve("./nope", &src), Resolved::Missing);
    }

    #[test]
    fn packages_are_found_up_the_tree() {
        let temp = TempDir::new().unwrap();
        let pkg = temp.path().join("node_modules/dayjs");
        touch(&pkg.join("package.json"), r#"{"main": "dayjs.min.js"}"#);
        touch(&pkg.join("dayjs.min.js"), "");
        touch(&pkg.join("plugin/utc.js"), "");
        let nested = temp.path().join("src/components");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            resolve("dayjs", &nested),
            Resolved::File(pkg.join("dayjs.min.js"))
        );
        assert_eq!(
            resolve("dayjs/plugin/utc", &nested),
            Resolved::File(pkg.join("plugin/utc.js"))
        );
        assert_eq!(resolve("left-pad", &nested), Resolved::Missing);
    }
}
