//! Work done around a pass: stale output cleanup before, stylesheet
//! emission and CSS injection after.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use super::hooks::CSS_ENTRY_ID;
use super::{BackendContext, BuildSummary};
use crate::layout::{BuildType, ProjectLayout, SOURCE_MAP_SUFFIX};
use crate::transform::{CSS_ENTRY_NAME, inject_component_css};

/// Delete what earlier passes of `build_type` emitted. Missing paths are
/// fine; anything else is logged and ignored.
pub fn clean_stale_outputs(layout: &ProjectLayout, build_type: BuildType) {
    for path in layout.stale_outputs(build_type) {
        silent_delete(&path);
    }
}

fn silent_delete(path: &Path) {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => tracing::debug!(path = %path.display(), "removed stale output"),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(path = %path.display(), %err, "could not remove stale output"),
    }
}

/// The aggregated stylesheet entry and its map are never kept.
pub fn is_css_entry_output(filename: &str) -> bool {
    let name = filename.rsplit('/').next().unwrap_or(filename);
    name.strip_prefix(CSS_ENTRY_NAME)
        .is_some_and(|rest| rest.starts_with('.'))
}

/// Finish a successful pass.
///
/// Server passes write the global stylesheet into both trees and splice each
/// entry's CSS into its module. Client passes delete emitted stylesheets.
pub fn complete_pass(ctx: &BackendContext, summary: &BuildSummary) {
    match summary.build_type {
        BuildType::Ssr => {
            write_global_stylesheet(ctx);
            for entry in &summary.entries {
                let css = ctx.state.component_css(&entry.source);
                inject_into(&entry.output, &css);
            }
        }
        BuildType::Client => strip_client_stylesheets(summary),
    }
}

/// Flatten everything reachable from the aggregated entry and write it to
/// both global stylesheet paths. Nothing is written when there is no CSS.
pub fn write_global_stylesheet(ctx: &BackendContext) -> Option<String> {
    let css = ctx.state.component_css(CSS_ENTRY_ID);
    if css.is_empty() {
        tracing::debug!("no component styles, skipping global stylesheet");
        return None;
    }

    for path in ctx.layout.global_stylesheets() {
        let written = path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| fs::write(&path, &css));
        if let Err(err) = written {
            tracing::warn!(path = %path.display(), %err, "could not write global stylesheet");
        }
    }
    Some(css)
}

fn inject_into(module: &Path, css: &str) {
    let js = match fs::read_to_string(module) {
        Ok(js) => js,
        Err(err) => {
            tracing::warn!(module = %module.display(), %err, "could not read entry module");
            return;
        }
    };
    let Some(injected) = inject_component_css(&js, css) else {
        tracing::debug!(module = %module.display(), "no css placeholder");
        return;
    };
    if let Err(err) = fs::write(module, injected) {
        tracing::warn!(module = %module.display(), %err, "could not inject component css");
    }
}

/// Client bundles never ship component stylesheets.
pub fn strip_client_stylesheets(summary: &BuildSummary) {
    for file in &summary.files {
        if !file.to_string_lossy().ends_with(".css") {
            continue;
        }
        if let Err(err) = fs::remove_file(file) {
            tracing::warn!(path = %file.display(), %err, "could not remove client stylesheet");
        }
        let mut map = file.as_os_str().to_owned();
        map.push(SOURCE_MAP_SUFFIX);
        if let Err(err) = fs::remove_file(&map) {
            tracing::warn!(path = %Path::new(&map).display(), %err, "could not remove stylesheet map");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::EmittedEntry;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn context(root: &Path) -> BackendContext {
        BackendContext::new(ProjectLayout::new(root, "src", ".isle/compiled", "public/_isle"))
    }

    #[test]
    fn css_entry_outputs_are_recognized() {
        assert!(is_css_entry_output("__isle_css.js"));
        assert!(is_css_entry_output("__isle_css.js.map"));
        assert!(is_css_entry_output(".isle/compiled/__isle_css.js"));
        assert!(!is_css_entry_output("__isle_cssx.js"));
        assert!(!is_css_entry_output("components/Clock.js"));
    }

    #[test]
    fn cleanup_tolerates_missing_outputs() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());
        let stale = ctx.layout.ssr_dir.join("components/Old.js");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, "").unwrap();

        clean_stale_outputs(&ctx.layout, BuildType::Ssr);
        assert!(!ctx.layout.ssr_dir.exists());
        clean_stale_outputs(&ctx.layout, BuildType::Ssr);
        clean_stale_outputs(&ctx.layout, BuildType::Client);
    }

    #[test]
    fn server_completion_writes_and_injects() {
        let temp = TempDir::new().unwrap();
        let ctx = context(temp.path());
        let entry = temp.path().join("src/components/Clock.svelte").display().to_string();
        ctx.state.graph.record(CSS_ENTRY_ID, entry.clone());
        ctx.state.graph.record(&entry, format!("{entry}.css"));
        ctx.state.stylesheets.insert(format!("{entry}.css"), "time{}", None);

        let output = ctx.layout.ssr_dir.join("components/Clock.js");
        fs::create_dir_all(output.parent().unwrap()).unwrap();
        fs::write(&output, "export const _cssText = \"__ISLE_COMPONENT_CSS__\";").unwrap();

        let summary = BuildSummary {
            build_type: BuildType::Ssr,
            entries: vec![EmittedEntry {
                source: entry,
                output: output.clone(),
            }],
            files: vec![output.clone()],
        };
        complete_pass(&ctx, &summary);

        for path in ctx.layout.global_stylesheets() {
            assert_eq!(fs::read_to_string(path).unwrap(), "time{}");
        }
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "export const _cssText = \"time{}\";"
        );
    }

    #[test]
    fn client_completion_removes_stylesheets_even_without_maps() {
        let temp = TempDir::new().unwrap();
        let css = temp.path().join("Clock.abc.css");
        let js = temp.path().join("Clock.abc.js");
        fs::write(&css, "p{}").unwrap();
        fs::write(&js, "").unwrap();

        strip_client_stylesheets(&BuildSummary {
            build_type: BuildType::Client,
            entries: Vec::new(),
            files: vec![css.clone(), js.clone(), PathBuf::from("/missing/x.css")],
        });
        assert!(!css.exists());
        assert!(js.exists());
    }
}
