//! Built-in compiler for single-file components.
//!
//! Lifts `<script>` blocks out as module code and the `<style>` block out as
//! the component stylesheet. Whatever markup remains is served verbatim by a
//! generated render/mount pair, so components without template logic work
//! without an external toolchain.

use std::path::Path;

use memchr::memmem;

use super::{CompileError, CompiledComponent, CompiledCss, ComponentCompiler};
use crate::layout::BuildType;

/// Largest component source accepted (10 MB).
const MAX_SOURCE_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct BlockCompiler;

#[derive(Debug, PartialEq, Eq)]
struct Block<'a> {
    attributes: &'a str,
    content: &'a str,
    start: usize,
    end: usize,
}

impl ComponentCompiler for BlockCompiler {
    fn compile(
        &self,
        source: &str,
        path: &Path,
        build_type: BuildType,
    ) -> Result<CompiledComponent, CompileError> {
        if source.len() > MAX_SOURCE_SIZE {
            return Err(syntax(
                path,
                format!("file too large: {} bytes (max {MAX_SOURCE_SIZE})", source.len()),
            ));
        }

        let scripts = find_blocks(source, "script").map_err(|at| unclosed(path, "script", at))?;
        let styles = find_blocks(source, "style").map_err(|at| unclosed(path, "style", at))?;

        // module context runs before the instance script
        let (module, instance): (Vec<&Block<'_>>, Vec<&Block<'_>>) = scripts
            .iter()
            .partition(|block| block.attributes.contains("module"));

        let mut code = String::new();
        for block in module.iter().chain(instance.iter()) {
            let body = block.content.trim();
            if !body.is_empty() {
                code.push_str(body);
                code.push('\n');
            }
        }

        let markup = strip_blocks(source, scripts.iter().chain(styles.iter()));
        let markup = serde_json::to_string(markup.trim()).unwrap_or_else(|_| "\"\"".to_string());
        code.push_str(&format!("const __isle_markup = {markup};\n"));
        match build_type {
            BuildType::Ssr => code.push_str(
                "export function render(props) {\n  return { html: __isle_markup, head: \"\" };\n}\nexport default { render };\n",
            ),
            BuildType::Client => code.push_str(
                "export function mount(target, props) {\n  if (target && !target.innerHTML) target.innerHTML = __isle_markup;\n}\nexport default { mount };\n",
            ),
        }

        let css: String = styles
            .iter()
            .map(|block| block.content.trim())
            .filter(|body| !body.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        let css = (!css.is_empty()).then_some(CompiledCss { code: css, map: None });

        Ok(CompiledComponent { code, css })
    }
}

fn syntax(path: &Path, message: String) -> CompileError {
    CompileError::Syntax {
        path: path.to_path_buf(),
        message,
    }
}

fn unclosed(path: &Path, tag: &str, at: usize) -> CompileError {
    syntax(path, format!("unclosed <{tag}> starting at byte {at}"))
}

/// Top-level `<tag ...>...</tag>` blocks in document order.
///
/// Returns the byte offset of the offending tag when one is never closed.
fn find_blocks<'a>(source: &'a str, tag: &str) -> Result<Vec<Block<'a>>, usize> {
    let bytes = source.as_bytes();
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let open_finder = memmem::Finder::new(open.as_bytes());
    let close_finder = memmem::Finder::new(close.as_bytes());

    let mut blocks = Vec::new();
    let mut pointer = 0;
    while let Some(found) = open_finder.find(&bytes[pointer..]) {
        let start = pointer + found;
        let after_name = start + open.len();
        // `<scripts>` or `<styleguide>` are not ours
        if !matches!(
            bytes.get(after_name),
            Some(b' ' | b'\t' | b'\n' | b'\r' | b'>' | b'/')
        ) {
            pointer = after_name;
            continue;
        }

        let tag_end = closing_angle(bytes, after_name).ok_or(start)?;
        let attributes = &source[after_name..tag_end];
        let content_start = tag_end + 1;
        let content_end = close_finder
            .find(&bytes[content_start..])
            .map(|pos| content_start + pos)
            .ok_or(start)?;
        let end = content_end + close.len();

        blocks.push(Block {
            attributes,
            content: &source[content_start..content_end],
            start,
            end,
        });
        pointer = end;
    }
    Ok(blocks)
}

/// The `>` ending an opening tag, skipping quoted attribute values.
fn closing_angle(bytes: &[u8], start: usize) -> Option<usize> {
    let mut quote = None;
    for (i, &byte) in bytes[start..].iter().enumerate() {
        match (byte, quote) {
            (b'"' | b'\'', None) => quote = Some(byte),
            (b, Some(q)) if b == q => quote = None,
            (b'>', None) => return Some(start + i),
            _ => {}
        }
    }
    None
}

fn strip_blocks<'a, 'b: 'a>(source: &str, blocks: impl Iterator<Item = &'a Block<'b>>) -> String {
    let mut ranges: Vec<(usize, usize)> = blocks.map(|b| (b.start, b.end)).collect();
    ranges.sort_unstable();

    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for (start, end) in ranges {
        if start >= cursor {
            out.push_str(&source[cursor..start]);
            cursor = end;
        }
    }
    out.push_str(&source[cursor..]);
    out
}
