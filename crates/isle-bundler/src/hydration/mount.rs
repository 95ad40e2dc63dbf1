//! Rewriting rendered pages with hydration anchors.

use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use serde::Serialize;
use serde_json::{Map, Value};

use super::marker::{MOUNT_ATTRIBUTE, MarkerError, MarkerScanner, MountMarker, parse_payload};

/// Attribute carrying a hydration record's id on the rewritten wrapper.
pub const ANCHOR_ATTRIBUTE: &str = "isle-id";

/// Suffix of the class added to every component wrapper.
pub const COMPONENT_CLASS_SUFFIX: &str = "-component";

const DEFAULT_ELEMENT: &str = "div";

/// Emitted artifacts of one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentPaths {
    /// Module required by the server renderer.
    pub ssr: PathBuf,
    /// Public URL of the hydration bundle.
    pub client: String,
}

/// Resolves component names to their build artifacts.
pub trait ComponentLookup {
    fn lookup(&self, name: &str) -> Option<ComponentPaths>;
}

impl<F> ComponentLookup for F
where
    F: Fn(&str) -> Option<ComponentPaths>,
{
    fn lookup(&self, name: &str) -> Option<ComponentPaths> {
        self(name)
    }
}

/// Output of server-rendering one component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedComponent {
    pub html: String,
    /// Markup the component wants in the page `<head>`.
    pub head: String,
    /// Stylesheet text carried by the compiled module (its `_cssText`).
    pub css: String,
}

impl RenderedComponent {
    pub fn html(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            ..Self::default()
        }
    }

    pub fn with_css(mut self, css: impl Into<String>) -> Self {
        self.css = css.into();
        self
    }
}

/// Server-renders a component from its compiled module.
pub trait ComponentRenderer {
    fn render(&self, name: &str, ssr: &Path, props: &Value) -> anyhow::Result<RenderedComponent>;
}

impl<F> ComponentRenderer for F
where
    F: Fn(&str, &Path, &Value) -> anyhow::Result<RenderedComponent>,
{
    fn render(&self, name: &str, ssr: &Path, props: &Value) -> anyhow::Result<RenderedComponent> {
        self(name, ssr, props)
    }
}

/// One component the client runtime must hydrate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HydrationRecord {
    pub id: String,
    pub name: String,
    /// `false` when the marker carried no props.
    pub props: Value,
    pub hydrate_options: Map<String, Value>,
    pub client: String,
    pub prepared: Map<String, Value>,
}

/// A marker that could not be mounted. Its markup is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HydrationError {
    #[error("marker {id}: {source}")]
    Marker {
        id: String,
        #[source]
        source: MarkerError,
    },
    #[error("marker {id}: unknown component '{name}'")]
    UnknownComponent { id: String, name: String },
    #[error("marker {id}: rendering '{name}' failed: {message}")]
    Render {
        id: String,
        name: String,
        message: String,
    },
}

/// Per-page accumulator.
#[derive(Debug, Default, Clone)]
pub struct PageHydration {
    pub components_to_hydrate: Vec<HydrationRecord>,
    pub errors: Vec<HydrationError>,
    pub head: Vec<String>,
    /// Stylesheets of every rendered component, once each, in first-use
    /// order.
    pub css: IndexSet<String>,
    next_id: usize,
}

impl PageHydration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next ordinal id. Ids are never reused, even for skipped markers.
    fn allocate_id(&mut self) -> String {
        let id = self.next_id;
        self.next_id += 1;
        id.to_string()
    }

    /// The page's component stylesheets as one block.
    pub fn css_text(&self) -> String {
        self.css.iter().map(String::as_str).collect()
    }

    /// Records serialized for the client runtime.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.components_to_hydrate)
    }
}

/// Replace every mount marker in `html` with its server-rendered markup.
///
/// Markers are visited in document order in one pass. Each gets the next id
/// from `page`; hydrated components are appended to
/// `page.components_to_hydrate` in the same order.
pub fn mount_components_in_html(
    html: &str,
    page: &mut PageHydration,
    lookup: &dyn ComponentLookup,
    renderer: &dyn ComponentRenderer,
) -> String {
    let mut out = String::with_capacity(html.len());
    let mut copied = 0;

    for marker in MarkerScanner::new(html) {
        let id = page.allocate_id();
        let marker = match marker {
            Ok(marker) => marker,
            Err(source) => {
                tracing::warn!(%source, "skipping hydration marker");
                page.errors.push(HydrationError::Marker { id, source });
                continue;
            }
        };

        out.push_str(&html[copied..marker.start]);
        copied = marker.end;
        let nested = MarkerScanner::new(&html[marker.start + 1..marker.end])
            .filter(Result::is_ok)
            .count();
        if nested > 0 {
            tracing::debug!(id = %id, nested, "nested hydration markers are replaced by the outer component");
        }
        match mount(&marker, id, page, lookup, renderer) {
            Ok(markup) => out.push_str(&markup),
            Err(err) => {
                tracing::warn!(error = %err, "skipping hydration marker");
                out.push_str(&html[marker.start..marker.end]);
                page.errors.push(err);
            }
        }
    }

    out.push_str(&html[copied..]);
    out
}

fn mount(
    marker: &MountMarker<'_>,
    id: String,
    page: &mut PageHydration,
    lookup: &dyn ComponentLookup,
    renderer: &dyn ComponentRenderer,
) -> Result<String, HydrationError> {
    let raw = marker.attribute(MOUNT_ATTRIBUTE).unwrap_or_default();
    let payload = match parse_payload(raw) {
        Ok(payload) => payload,
        Err(source) => return Err(HydrationError::Marker { id, source }),
    };
    let name = payload.name;

    let Some(paths) = lookup.lookup(&name) else {
        return Err(HydrationError::UnknownComponent { id, name });
    };
    let rendered = match renderer.render(&name, &paths.ssr, &payload.props) {
        Ok(rendered) => rendered,
        Err(err) => {
            return Err(HydrationError::Render {
                id,
                name,
                message: format!("{err:#}"),
            });
        }
    };
    if !rendered.head.is_empty() {
        page.head.push(rendered.head);
    }
    if !rendered.css.is_empty() {
        page.css.insert(rendered.css);
    }

    let options = payload.hydrate_options;
    let element = options
        .get("element")
        .and_then(Value::as_str)
        .filter(|tag| is_tag_name(tag))
        .unwrap_or(DEFAULT_ELEMENT)
        .to_string();
    let style = marker.attribute("style");
    let class = wrapper_class(marker.attribute("class"), &name);

    if options.get("loading").and_then(Value::as_str) == Some("none") {
        return Ok(match style {
            Some(style) => format!(
                r#"<{element} style="{}" class="{class}">{}</{element}>"#,
                escape_attribute(style),
                rendered.html
            ),
            None => rendered.html,
        });
    }

    let mut markup = format!(r#"<{element} {ANCHOR_ATTRIBUTE}="{id}""#);
    if let Some(style) = style {
        markup.push_str(&format!(r#" style="{}""#, escape_attribute(style)));
    }
    markup.push_str(&format!(r#" class="{class}">{}</{element}>"#, rendered.html));

    page.components_to_hydrate.push(HydrationRecord {
        id,
        props: record_props(payload.props),
        hydrate_options: options,
        client: paths.client,
        prepared: Map::new(),
        name,
    });
    Ok(markup)
}

fn record_props(props: Value) -> Value {
    match props {
        Value::Null => Value::Bool(false),
        Value::Object(map) if map.is_empty() => Value::Bool(false),
        other => other,
    }
}

fn wrapper_class(existing: Option<&str>, name: &str) -> String {
    let own = format!("{}{COMPONENT_CLASS_SUFFIX}", name.to_lowercase());
    match existing.map(str::trim).filter(|class| !class.is_empty()) {
        Some(existing) => format!("{} {own}", escape_attribute(existing)),
        None => own,
    }
}

fn is_tag_name(tag: &str) -> bool {
    tag.starts_with(|c: char| c.is_ascii_alphabetic())
        && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn escape_attribute(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_props_become_false() {
        assert_eq!(record_props(Value::Null), Value::Bool(false));
        assert_eq!(record_props(Value::Object(Map::new())), Value::Bool(false));
        assert_eq!(
            record_props(serde_json::json!({ "a": 1 })),
            serde_json::json!({ "a": 1 })
        );
    }

    #[test]
    fn classes_are_appended() {
        assert_eq!(wrapper_class(None, "DatePicker"), "datepicker-component");
        assert_eq!(
            wrapper_class(Some("isle-component"), "DatePicker"),
            "isle-component datepicker-component"
        );
        assert_eq!(wrapper_class(Some("  "), "A"), "a-component");
    }

    #[test]
    fn only_plain_tag_names_are_accepted() {
        assert!(is_tag_name("span"));
        assert!(is_tag_name("my-widget"));
        assert!(!is_tag_name("div onclick=x"));
        assert!(!is_tag_name(""));
    }

    #[test]
    fn records_serialize_camel_case() {
        let record = HydrationRecord {
            id: "0".to_string(),
            name: "Clock".to_string(),
            props: Value::Bool(false),
            hydrate_options: Map::new(),
            client: "/_isle/islands/components/Clock.js".to_string(),
            prepared: Map::new(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("hydrateOptions").is_some());
        assert_eq!(json["props"], Value::Bool(false));
    }
}
