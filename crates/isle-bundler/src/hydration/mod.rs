//! Partial hydration of server-rendered pages.
//!
//! Pages mark interactive components with an `isle-mount` attribute. The
//! mounter renders each marked component on the server, wraps it in an
//! anchor element and records what the client runtime has to hydrate.

pub mod marker;
mod mount;

pub use marker::{MOUNT_ATTRIBUTE, MarkerError, MarkerScanner, MountMarker, MountPayload};
pub use mount::{
    ANCHOR_ATTRIBUTE, COMPONENT_CLASS_SUFFIX, ComponentLookup, ComponentPaths, ComponentRenderer,
    HydrationError, HydrationRecord, PageHydration, RenderedComponent, mount_components_in_html,
};
