//! Module-per-file ESM emitter.
//!
//! Every reachable module is written as its own output file and its import
//! specifiers are rewritten to relative output paths, so no code is
//! concatenated and no scope analysis is needed. Modules loaded with
//! [`Loader::Css`] are not emitted; their text is collected into a
//! stylesheet written next to each entry that reaches them.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};

use super::api::{
    BuildResult, EngineOptions, EntryPoint, FILE_NAMESPACE, ImportKind, LoadArgs, LoadResult,
    Loader, Metafile, MetafileOutput, Platform, PluginBuild, PluginError, ResolveArgs, ScanPlugin,
    matches,
};
use super::resolver::{self, Resolved};
use crate::backend::hooks::is_bare;
use crate::backend::writer::{OutputFile, write_files};
use crate::layout::{SOURCE_MAP_SUFFIX, content_hash};
use crate::{Error, Result};

/// `import x from "y"`, `import "y"`, `export * from "y"` and friends.
static STATIC_IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(?:import|export)\s*(?:([\w$*{},\s]+?)\s*from\s*)?['"]([^'"\n]+)['"]\s*;?"#)
        .expect("valid regex")
});

static DYNAMIC_IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bimport\(\s*['"]([^'"\n]+)['"]\s*\)"#).expect("valid regex")
});

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_$][\w$]*$").expect("valid regex"));

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub metafile: Metafile,
    /// Absolute paths of every file written.
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ModuleKey {
    namespace: String,
    path: String,
}

impl ModuleKey {
    fn file(path: impl Into<String>) -> Self {
        Self {
            namespace: FILE_NAMESPACE.to_string(),
            path: path.into(),
        }
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace == FILE_NAMESPACE {
            f.write_str(&self.path)
        } else {
            write!(f, "{}:{}", self.namespace, self.path.trim_start_matches('\0'))
        }
    }
}

enum Target {
    External,
    Module(ModuleKey),
}

struct Module {
    key: ModuleKey,
    loader: Loader,
    /// Relative to the output directory; empty for stylesheets.
    output: String,
    source: String,
    code: String,
    imports: Vec<usize>,
    entry: Option<String>,
}

/// The engine: options plus an ordered plugin list.
#[derive(Clone)]
pub struct ScanEngine {
    options: EngineOptions,
    plugins: Vec<Arc<dyn ScanPlugin>>,
}

impl fmt::Debug for ScanEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanEngine")
            .field("options", &self.options)
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ScanEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            plugins: Vec::new(),
        }
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn ScanPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Set up plugins, link every entry, write the outputs, then run the end
    /// callbacks.
    pub fn run(&self) -> Result<EngineOutput> {
        let mut build = PluginBuild::new(self.options.clone());
        for plugin in &self.plugins {
            build.set_plugin(plugin.name());
            plugin.setup(&mut build)?;
        }
        for start in &build.start {
            (start.callback)()?;
        }

        let options = build.initial_options.clone();
        let mut linker = Linker::new(&build, &options);
        for entry in &options.entry_points {
            match linker.resolve(&entry.import, None, &options.working_dir, ImportKind::EntryPoint)? {
                Target::Module(key) => {
                    linker.visit(key, Some(entry))?;
                }
                Target::External => {
                    return Err(Error::Resolve {
                        specifier: entry.import.clone(),
                        importer: "<entry>".to_string(),
                    });
                }
            }
        }

        let emitted = linker.emit();
        let files: Vec<OutputFile> = emitted.iter().map(|e| e.file.clone()).collect();
        let written = write_files(&options.out_dir, &files)?;

        let mut metafile = Metafile::default();
        for (path, emitted) in written.iter().zip(&emitted) {
            metafile.outputs.insert(
                metafile_key(path, &options.working_dir),
                MetafileOutput {
                    entry_point: emitted.entry.clone(),
                    inputs: emitted.inputs.clone(),
                    bytes: emitted.file.contents.len(),
                },
            );
        }

        let result = BuildResult {
            metafile,
            working_dir: options.working_dir.clone(),
        };
        for end in &build.end {
            (end.callback)(&result)?;
        }

        tracing::debug!(
            modules = linker.modules.len(),
            outputs = written.len(),
            "scan engine finished"
        );
        Ok(EngineOutput {
            metafile: result.metafile,
            files: written,
        })
    }
}

struct Emitted {
    file: OutputFile,
    entry: Option<String>,
    inputs: Vec<String>,
}

struct Linker<'a> {
    build: &'a PluginBuild,
    options: &'a EngineOptions,
    modules: Vec<Module>,
    index: FxHashMap<ModuleKey, usize>,
    used_names: FxHashSet<String>,
}

impl<'a> Linker<'a> {
    fn new(build: &'a PluginBuild, options: &'a EngineOptions) -> Self {
        Self {
            build,
            options,
            modules: Vec::new(),
            index: FxHashMap::default(),
            used_names: FxHashSet::default(),
        }
    }

    fn resolve(
        &self,
        specifier: &str,
        importer: Option<&ModuleKey>,
        resolve_dir: &Path,
        kind: ImportKind,
    ) -> Result<Target> {
        let args = ResolveArgs {
            path: specifier.to_string(),
            importer: importer.map(|key| key.path.clone()),
            namespace: importer.map_or(FILE_NAMESPACE, |key| key.namespace.as_str()).to_string(),
            resolve_dir: resolve_dir.to_path_buf(),
            kind,
        };

        for hook in &self.build.resolvers {
            if !matches(&hook.options.filter, &hook.options.namespace, specifier, &args.namespace) {
                continue;
            }
            if let Some(result) = (hook.callback)(&args)? {
                if result.external {
                    return Ok(Target::External);
                }
                return Ok(Target::Module(ModuleKey {
                    namespace: result.namespace.unwrap_or_else(|| FILE_NAMESPACE.to_string()),
                    path: result.path,
                }));
            }
        }

        match resolver::resolve(specifier, resolve_dir) {
            Resolved::File(path) => Ok(Target::Module(ModuleKey::file(path.display().to_string()))),
            Resolved::Missing if self.options.platform == Platform::Node && is_bare(specifier) => {
                Ok(Target::External)
            }
            Resolved::Missing => Err(Error::Resolve {
                specifier: specifier.to_string(),
                importer: importer.map_or_else(|| "<entry>".to_string(), |key| key.to_string()),
            }),
        }
    }

    fn load(&self, key: &ModuleKey) -> Result<LoadResult> {
        let args = LoadArgs {
            path: key.path.clone(),
            namespace: key.namespace.clone(),
        };
        for hook in &self.build.loaders {
            if !matches(&hook.options.filter, &hook.options.namespace, &key.path, &key.namespace) {
                continue;
            }
            if let Some(result) = (hook.callback)(&args)? {
                return Ok(result);
            }
        }

        if key.namespace != FILE_NAMESPACE {
            return Err(PluginError::new("scan", "onLoad", format!("no loader claimed {key}")).into());
        }
        let contents = std::fs::read_to_string(&key.path)
            .map_err(|err| Error::io(format!("Failed to read {}", key.path), err))?;
        Ok(LoadResult {
            loader: Loader::for_path(&key.path),
            contents,
            resolve_dir: None,
        })
    }

    /// Load and link a module and, depth first, everything it imports.
    fn visit(&mut self, key: ModuleKey, entry: Option<&EntryPoint>) -> Result<usize> {
        if let Some(&index) = self.index.get(&key) {
            return Ok(index);
        }

        let loaded = self.load(&key)?;
        let output = match loaded.loader {
            Loader::Css => String::new(),
            _ => self.output_name(&key, entry, &loaded.contents),
        };

        let index = self.modules.len();
        self.modules.push(Module {
            key: key.clone(),
            loader: loaded.loader,
            output,
            source: loaded.contents.clone(),
            code: String::new(),
            imports: Vec::new(),
            entry: entry.map(|e| e.import.clone()),
        });
        self.index.insert(key.clone(), index);

        let code = match loaded.loader {
            Loader::Js => self.link(index, &key, &loaded)?,
            Loader::Css => loaded.contents,
            Loader::Json => format!("export default {};\n", loaded.contents.trim()),
            Loader::Text => format!(
                "export default {};\n",
                serde_json::Value::String(loaded.contents).to_string()
            ),
        };
        self.modules[index].code = code;
        Ok(index)
    }

    fn link(&mut self, index: usize, key: &ModuleKey, loaded: &LoadResult) -> Result<String> {
        let resolve_dir = loaded
            .resolve_dir
            .clone()
            .or_else(|| {
                (key.namespace == FILE_NAMESPACE)
                    .then(|| Path::new(&key.path).parent().map(Path::to_path_buf))
                    .flatten()
            })
            .unwrap_or_else(|| self.options.working_dir.clone());
        let code = loaded.contents.as_str();

        let specifiers: Vec<&str> = STATIC_IMPORT_RE
            .captures_iter(code)
            .filter_map(|c| c.get(2))
            .chain(DYNAMIC_IMPORT_RE.captures_iter(code).filter_map(|c| c.get(1)))
            .map(|m| m.as_str())
            .collect();

        let mut targets: FxHashMap<&str, Option<usize>> = FxHashMap::default();
        for specifier in specifiers {
            if targets.contains_key(specifier) {
                continue;
            }
            let target = match self.resolve(specifier, Some(key), &resolve_dir, ImportKind::Import)? {
                Target::External => None,
                Target::Module(child) => Some(self.visit(child, None)?),
            };
            targets.insert(specifier, target);
        }

        let mut imports = Vec::new();
        let from = self.modules[index].output.clone();

        let mut out = String::with_capacity(code.len());
        let mut cursor = 0;
        for captures in STATIC_IMPORT_RE.captures_iter(code) {
            let (Some(whole), Some(spec)) = (captures.get(0), captures.get(2)) else {
                continue;
            };
            let Some(&Some(target)) = targets.get(spec.as_str()) else {
                continue;
            };
            imports.push(target);
            let module = &self.modules[target];
            out.push_str(&code[cursor..whole.start()]);
            if module.loader == Loader::Css {
                let binding = captures.get(1).map(|b| b.as_str().trim());
                if let Some(binding) = binding.filter(|b| IDENTIFIER_RE.is_match(b)) {
                    out.push_str(&format!(
                        "const {binding} = {};",
                        serde_json::Value::String(module.code.clone())
                    ));
                }
            } else {
                out.push_str(&code[whole.start()..spec.start()]);
                out.push_str(&relative_specifier(&from, &module.output));
                out.push_str(&code[spec.end()..whole.end()]);
            }
            cursor = whole.end();
        }
        out.push_str(&code[cursor..]);

        let linked = DYNAMIC_IMPORT_RE
            .replace_all(&out, |captures: &regex::Captures<'_>| {
                let whole = &captures[0];
                match targets.get(&captures[1]) {
                    Some(&Some(target)) if self.modules[target].loader != Loader::Css => {
                        format!("import(\"{}\")", relative_specifier(&from, &self.modules[target].output))
                    }
                    _ => whole.to_string(),
                }
            })
            .into_owned();

        for (specifier, target) in &targets {
            let Some(target) = target else { continue };
            if !imports.contains(target) {
                tracing::trace!(specifier, importer = %key, "dynamic import");
                imports.push(*target);
            }
        }
        self.modules[index].imports = imports;
        Ok(linked)
    }

    fn output_name(&mut self, key: &ModuleKey, entry: Option<&EntryPoint>, contents: &str) -> String {
        let hash = content_hash(format!("{key}\0{contents}").as_bytes());
        let (pattern, dir, name, ext) = match entry.and_then(|e| e.name.clone()) {
            Some(name) => (&self.options.entry_names, String::new(), name, String::new()),
            None => {
                let (dir, name, ext) = split_module_path(&key.path, self.options);
                let pattern = if entry.is_some() {
                    &self.options.entry_names
                } else {
                    &self.options.chunk_names
                };
                (pattern, dir, name, ext)
            }
        };

        let rendered = pattern
            .replace("[dir]", &dir)
            .replace("[name]", &name)
            .replace("[ext]", &ext)
            .replace("[hash]", &hash);
        let mut filename = rendered
            .split('/')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("/")
            .trim_end_matches('.')
            .to_string();
        if !(filename.ends_with(".js") || filename.ends_with(".mjs")) {
            filename.push_str(".js");
        }

        let unique = unique_name(&filename, &self.used_names);
        self.used_names.insert(unique.clone());
        unique
    }

    fn emit(&self) -> Vec<Emitted> {
        let mut emitted = Vec::new();
        for module in &self.modules {
            if module.loader == Loader::Css {
                continue;
            }

            let mut code = module.code.clone();
            if self.options.sourcemap {
                let basename = module.output.rsplit('/').next().unwrap_or(&module.output);
                let map = serde_json::json!({
                    "version": 3,
                    "file": basename,
                    "sources": [module.key.to_string()],
                    "sourcesContent": [module.source],
                    "names": [],
                    "mappings": "",
                });
                if !code.ends_with('\n') {
                    code.push('\n');
                }
                code.push_str(&format!("//# sourceMappingURL={basename}{SOURCE_MAP_SUFFIX}\n"));
                emitted.push(Emitted {
                    file: OutputFile::new(format!("{}{SOURCE_MAP_SUFFIX}", module.output), map.to_string()),
                    entry: None,
                    inputs: vec![module.key.to_string()],
                });
            }
            emitted.push(Emitted {
                file: OutputFile::new(module.output.clone(), code),
                entry: module.entry.clone(),
                inputs: vec![module.key.to_string()],
            });

            if module.entry.is_some() {
                let (css, inputs) = self.collect_css(self.index[&module.key]);
                if !css.is_empty() {
                    let filename = format!(
                        "{}.css",
                        module.output.strip_suffix(".js").unwrap_or(&module.output)
                    );
                    emitted.push(Emitted {
                        file: OutputFile::new(filename, css),
                        entry: None,
                        inputs,
                    });
                }
            }
        }
        emitted
    }

    /// Stylesheets reachable from `root`, in import order.
    fn collect_css(&self, root: usize) -> (String, Vec<String>) {
        let mut seen = FxHashSet::default();
        let mut stack = vec![root];
        let mut sheets = Vec::new();
        let mut inputs = Vec::new();
        while let Some(index) = stack.pop() {
            if !seen.insert(index) {
                continue;
            }
            let module = &self.modules[index];
            if module.loader == Loader::Css {
                sheets.push(module.code.as_str());
                inputs.push(module.key.to_string());
            }
            stack.extend(module.imports.iter().rev());
        }
        (sheets.join("\n"), inputs)
    }
}

fn unique_name(filename: &str, used: &FxHashSet<String>) -> String {
    if !used.contains(filename) {
        return filename.to_string();
    }
    let (stem, ext) = filename.rsplit_once('.').unwrap_or((filename, "js"));
    (2..)
        .map(|n| format!("{stem}~{n}.{ext}"))
        .find(|candidate| !used.contains(candidate))
        .unwrap_or_else(|| filename.to_string())
}

/// `[dir]`, `[name]` and `[ext]` of a module path.
fn split_module_path(path: &str, options: &EngineOptions) -> (String, String, String) {
    let sanitized: String = path
        .chars()
        .filter(|c| *c != '\0')
        .map(|c| if c == ':' { '_' } else { c })
        .collect();
    let path = Path::new(&sanitized);
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| sanitized.clone());
    let (name, ext) = match file_name.rsplit_once('.') {
        Some((name, ext)) if !name.is_empty() => (name.to_string(), ext.to_string()),
        _ => (file_name, String::new()),
    };

    let dir = match path.parent() {
        Some(parent) if path.is_absolute() => parent
            .strip_prefix(&options.outbase)
            .or_else(|_| parent.strip_prefix(&options.working_dir))
            .map(slash_join)
            .unwrap_or_else(|_| "_external".to_string()),
        _ => String::new(),
    };
    (dir, name, ext)
}

fn slash_join(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// `./x.js` style specifier reaching `to` from the module emitted at `from`.
fn relative_specifier(from: &str, to: &str) -> String {
    let mut from_dir: Vec<&str> = from.split('/').collect();
    from_dir.pop();
    let to_parts: Vec<&str> = to.split('/').collect();

    let limit = from_dir.len().min(to_parts.len().saturating_sub(1));
    let common = from_dir
        .iter()
        .zip(&to_parts)
        .take(limit)
        .take_while(|(a, b)| a == b)
        .count();
    let ups = from_dir.len() - common;

    let mut parts: Vec<&str> = vec![".."; ups];
    parts.extend(&to_parts[common..]);
    let joined = parts.join("/");
    if ups == 0 { format!("./{joined}") } else { joined }
}

fn metafile_key(path: &Path, working_dir: &Path) -> String {
    match path.strip_prefix(working_dir) {
        Ok(relative) => slash_join(relative),
        Err(_) => path.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn options(root: &Path, entries: Vec<EntryPoint>) -> EngineOptions {
        EngineOptions {
            entry_points: entries,
            working_dir: root.to_path_buf(),
            out_dir: root.join("out"),
            outbase: root.join("src"),
            entry_names: "[dir]/[name]".to_string(),
            chunk_names: "[dir]/[name].[ext]".to_string(),
            platform: Platform::Node,
            sourcemap: false,
        }
    }

    fn touch(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn relative_specifiers_walk_between_output_dirs() {
        assert_eq!(relative_specifier("a.js", "b.js"), "./b.js");
        assert_eq!(relative_specifier("routes/Home.js", "components/C.js"), "../components/C.js");
        assert_eq!(relative_specifier("components/C.js", "components/x/D.js"), "./x/D.js");
        assert_eq!(relative_specifier("a/b.js", "a.js"), "../a.js");
    }

    #[test]
    fn module_names_follow_the_outbase() {
        let opts = options(Path::new("/p"), Vec::new());
        assert_eq!(
            split_module_path("/p/src/components/C.svelte", &opts),
            ("components".to_string(), "C".to_string(), "svelte".to_string())
        );
        assert_eq!(
            split_module_path("/p/node_modules/ui/index.js", &opts),
            ("node_modules/ui".to_string(), "index".to_string(), "js".to_string())
        );
        assert_eq!(split_module_path("/elsewhere/x.js", &opts).0, "_external");
    }

    #[test]
    fn links_modules_one_file_each() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        touch(&src.join("main.js"), "import { fmt } from './utils/fmt';\nimport 'left-pad';\nexport default fmt(1);\n");
        touch(&src.join("utils/fmt.js"), "import data from '../data.json';\nexport const fmt = (n) => data.prefix + n;\n");
        touch(&src.join("data.json"), "{\"prefix\": \"#\"}");

        let entry = EntryPoint::new(None, src.join("main.js").display().to_string());
        let output = ScanEngine::new(options(temp.path(), vec![entry])).run().unwrap();

        let out = temp.path().join("out");
        let main = fs::read_to_string(out.join("main.js")).unwrap();
        assert!(main.contains("from './utils/fmt.js';"));
        assert!(main.contains("import 'left-pad';"));
        let fmt = fs::read_to_string(out.join("utils/fmt.js")).unwrap();
        assert!(fmt.contains("from '../data.json.js';"));
        assert_eq!(
            fs::read_to_string(out.join("data.json.js")).unwrap(),
            "export default {\"prefix\": \"#\"};\n"
        );

        assert_eq!(output.files.len(), 3);
        let entry_output = &output.metafile.outputs["out/main.js"];
        assert!(entry_output.entry_point.is_some());
    }

    #[test]
    fn stylesheets_are_collected_per_entry() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        touch(&src.join("a.js"), "import './a.css';\nimport sheet from './b.css';\nexport default sheet;\n");
        touch(&src.join("a.css"), "a{}");
        touch(&src.join("b.css"), "b{}");

        let entry = EntryPoint::new(Some("islands/a".to_string()), src.join("a.js").display().to_string());
        ScanEngine::new(options(temp.path(), vec![entry])).run().unwrap();

        let out = temp.path().join("out");
        let js = fs::read_to_string(out.join("islands/a.js")).unwrap();
        assert!(!js.contains("a.css"));
        assert!(js.contains("const sheet = \"b{}\";"));
        assert_eq!(fs::read_to_string(out.join("islands/a.css")).unwrap(), "a{}\nb{}");
    }

    #[test]
    fn browser_builds_reject_missing_packages() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        touch(&src.join("a.js"), "import 'left-pad';\n");

        let mut opts = options(temp.path(), vec![EntryPoint::new(None, src.join("a.js").display().to_string())]);
        opts.platform = Platform::Browser;
        let err = ScanEngine::new(opts).run().unwrap_err();
        assert!(matches!(err, Error::Resolve { ref specifier, .. } if specifier == "left-pad"));
    }

    #[test]
    fn sourcemaps_are_written_beside_modules() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        touch(&src.join("a.js"), "export const a = 1;");

        let mut opts = options(temp.path(), vec![EntryPoint::new(None, src.join("a.js").display().to_string())]);
        opts.sourcemap = true;
        ScanEngine::new(opts).run().unwrap();

        let out = temp.path().join("out");
        let js = fs::read_to_string(out.join("a.js")).unwrap();
        assert!(js.ends_with("//# sourceMappingURL=a.js.map\n"));
        let map: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join("a.js.map")).unwrap()).unwrap();
        assert_eq!(map["sourcesContent"][0], "export const a = 1;");
    }
}
