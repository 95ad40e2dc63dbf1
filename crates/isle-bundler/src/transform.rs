//! Source rewrites shared by both backends.
//!
//! Both engines call these functions from their own hook shapes, so a
//! component module compiled by either backend has the same imports, the same
//! `_css` accessor and the same placeholder for its stylesheet text.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;

use crate::graph::is_stylesheet;
use crate::layout::BuildType;

/// Token replaced by a component's own stylesheet text after the build.
pub const COMPONENT_CSS_PLACEHOLDER: &str = "__ISLE_COMPONENT_CSS__";

/// Suffix marking an entry module that must be wrapped.
pub const ENTRY_QUERY: &str = "?isle_entry";

/// Name of the synthetic entry that imports every real entry.
pub const CSS_ENTRY_NAME: &str = "__isle_css";

const MAP_INTRO: &str = "/*# sourceMappingURL=data:application/json;charset=utf-8;base64,";

static IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"import\s+[^;\n]*(['"]([^\n;'"]+)['"])"#).expect("valid regex"));

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r#"['"]{COMPONENT_CSS_PLACEHOLDER}['"]"#)).expect("valid regex")
});

/// Rewrite stylesheet and component imports of a compiled component module.
///
/// Server modules turn each stylesheet import into a default import bound to
/// `__css{i}`, bind the `_css` accessor of every imported component, and end
/// with `export const _css = () => [...]`. Client modules drop every
/// stylesheet import. A stylesheet or component imported twice is bound
/// once; repeated stylesheet imports are removed in both modes.
pub fn rewrite_component_imports(code: &str, build_type: BuildType, extensions: &[String]) -> String {
    let is_component = |id: &str| extensions.iter().any(|ext| id.ends_with(ext.as_str()));

    let mut out = String::with_capacity(code.len() + 128);
    let mut appended = String::new();
    let mut cursor = 0;
    let mut counter = 0usize;
    let mut imported: FxHashSet<&str> = FxHashSet::default();

    for captures in IMPORT_RE.captures_iter(code) {
        let (Some(whole), Some(source), Some(importee)) =
            (captures.get(0), captures.get(1), captures.get(2))
        else {
            continue;
        };
        let importee = importee.as_str();
        let first = imported.insert(importee);

        if is_stylesheet(importee) {
            out.push_str(&code[cursor..whole.start()]);
            if first && build_type.is_ssr() {
                out.push_str(&format!("import __css{counter} from {}", source.as_str()));
            }
            cursor = whole.end();
            if first {
                counter += 1;
            }
        } else if first && is_component(importee) && build_type.is_ssr() {
            appended.push_str(&format!(
                "\nimport {{_css as __css{counter}}} from {};",
                source.as_str()
            ));
            counter += 1;
        }
    }
    out.push_str(&code[cursor..]);
    out.push_str(&appended);

    if build_type.is_ssr() {
        let names: Vec<String> = (0..counter).map(|i| format!("__css{i}")).collect();
        out.push_str(&format!("\nexport const _css = () => [{}];", names.join(", ")));
    }
    out
}

/// A stylesheet as a module whose default export is its text.
pub fn stylesheet_module(css: &str) -> String {
    format!("export default {};", json_string(css))
}

/// The module standing in for an entry component.
///
/// Re-exports the component (and the framework adapter when configured) and
/// carries the placeholder later replaced by the component's CSS text.
pub fn entry_wrapper(path: &str, adapter: Option<&str>) -> String {
    let quoted = json_string(path);
    let mut code = format!("export * from {quoted};\nexport {{ default }} from {quoted};\n");
    if let Some(adapter) = adapter {
        code.push_str(&format!("export * from {};\n", json_string(adapter)));
    }
    code.push_str(&format!(
        "export const _cssText = \"{COMPONENT_CSS_PLACEHOLDER}\";\n"
    ));
    code
}

/// The synthetic entry importing every real entry for its side effects.
pub fn css_entry<S: AsRef<str>>(entries: &[S]) -> String {
    entries
        .iter()
        .map(|entry| {
            let entry = entry.as_ref();
            if std::path::Path::new(entry).is_absolute() || entry.starts_with('.') {
                entry.to_string()
            } else {
                format!("./{entry}")
            }
        })
        .map(|entry| format!("import {};", json_string(&entry)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Side-effect import of a component's own stylesheet, prepended to its
/// compiled code.
pub fn with_stylesheet_import(code: &str, css_id: &str) -> String {
    format!("import {};\n{code}", json_string(css_id))
}

/// Literal replacement table applied to module code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Defines {
    table: IndexMap<String, String>,
}

impl Defines {
    /// The built-in defines for a build type followed by user replacements.
    pub fn for_build(
        build_type: BuildType,
        production: bool,
        replacements: &IndexMap<String, String>,
    ) -> Self {
        let mut table = IndexMap::new();
        table.insert(
            "process.env.componentType".to_string(),
            format!("'{}'", build_type.component_type()),
        );
        let node_env = if production { "production" } else { "development" };
        table.insert("process.env.NODE_ENV".to_string(), json_string(node_env));
        for (from, to) in replacements {
            table.insert(from.clone(), to.clone());
        }
        Self { table }
    }

    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.table.insert(from.into(), to.into());
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Apply every replacement in order; `None` when nothing matched.
    pub fn apply(&self, code: &str) -> Option<String> {
        let mut result: Option<String> = None;
        for (from, to) in &self.table {
            let current = result.as_deref().unwrap_or(code);
            if current.contains(from.as_str()) {
                result = Some(current.replace(from.as_str(), to));
            }
        }
        result
    }
}

/// Inline source map comment, or an empty string without a map.
pub fn encode_source_map(map: Option<&str>) -> String {
    match map {
        Some(map) if !map.is_empty() => format!("{MAP_INTRO}{} */", STANDARD.encode(map)),
        _ => String::new(),
    }
}

/// Replace the quoted placeholder with the component's CSS as a JS string.
///
/// Returns `None` when the module carries no placeholder.
pub fn inject_component_css(js: &str, css: &str) -> Option<String> {
    let found = PLACEHOLDER_RE.find(js)?;
    let mut out = String::with_capacity(js.len() + css.len());
    out.push_str(&js[..found.start()]);
    out.push_str(&json_string(css));
    out.push_str(&js[found.end()..]);
    Some(out)
}

fn json_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svelte() -> Vec<String> {
        vec![".svelte".to_string()]
    }

    const MODULE: &str = r#"import Title from './Title.svelte';
import './card.css';
import reset from "../styles/reset.css";
import './card.css';
import { onMount } from 'svelte';
export default {};"#;

    #[test]
    fn server_modules_export_css_accessor() {
        let out = rewrite_component_imports(MODULE, BuildType::Ssr, &svelte());
        insta::assert_snapshot!(out, @r#"
        import Title from './Title.svelte';
        import __css1 from './card.css';
        import __css2 from "../styles/reset.css";
        ;
        import { onMount } from 'svelte';
        export default {};
        import {_css as __css0} from './Title.svelte';
        export const _css = () => [__css0, __css1, __css2];
        "#);
    }

    #[test]
    fn client_modules_drop_stylesheets() {
        let out = rewrite_component_imports(MODULE, BuildType::Client, &svelte());
        assert!(!out.contains("reset.css"));
        assert!(!out.contains("card.css"));
        assert!(!out.contains("_css"));
        assert!(out.starts_with("import Title from './Title.svelte';\n;\n;\n;\nimport { onMount }"));
    }

    #[test]
    fn entry_wrapper_carries_placeholder() {
        let code = entry_wrapper("/p/src/components/Clock.svelte", Some("isle-adapter"));
        assert!(code.contains(r#"export { default } from "/p/src/components/Clock.svelte";"#));
        assert!(code.contains(r#"export * from "isle-adapter";"#));

        let injected = inject_component_css(&code, "p{content:\"x\"}").unwrap();
        assert!(injected.contains(r#"export const _cssText = "p{content:\"x\"}";"#));
        assert!(inject_component_css("export {}", "p{}").is_none());
    }

    #[test]
    fn css_entry_prefixes_relative_paths() {
        assert_eq!(
            css_entry(&["src/routes/Home.svelte", "/abs/Card.svelte"]),
            "import \"./src/routes/Home.svelte\";\nimport \"/abs/Card.svelte\";"
        );
    }

    #[test]
    fn defines_replace_in_order() {
        let mut replacements = IndexMap::new();
        replacements.insert("__VERSION__".to_string(), "\"1.0\"".to_string());
        let defines = Defines::for_build(BuildType::Client, true, &replacements);

        let code = "if (process.env.componentType === 'client' && process.env.NODE_ENV) log(__VERSION__)";
        assert_eq!(
            defines.apply(code).unwrap(),
            "if ('client' === 'client' && \"production\") log(\"1.0\")"
        );
        assert!(defines.apply("plain").is_none());
    }

    #[test]
    fn source_maps_are_inlined_as_base64() {
        assert_eq!(encode_source_map(None), "");
        assert_eq!(
            encode_source_map(Some("{}")),
            "/*# sourceMappingURL=data:application/json;charset=utf-8;base64,e30= */"
        );
    }
}
