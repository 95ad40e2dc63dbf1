//! Stylesheet precedence derived from where a file lives.

/// Priority of stylesheets shipped inside a dependency package.
pub const PACKAGE_PRIORITY: u8 = 6;
pub const LAYOUT_PRIORITY: u8 = 3;
pub const ROUTE_PRIORITY: u8 = 2;
pub const COMPONENT_PRIORITY: u8 = 1;
pub const UNRECOGNIZED_PRIORITY: u8 = 0;

/// Priority of the stylesheet compiled from `path`.
///
/// Checks run in a fixed order and the first match wins, so anything under
/// `node_modules` is a package stylesheet even when the package itself has a
/// `src/components` directory.
pub fn priority(path: &str) -> u8 {
    let normalized = path.replace('\\', "/");
    if normalized.contains("node_modules") {
        PACKAGE_PRIORITY
    } else if normalized.contains("src/layouts") {
        LAYOUT_PRIORITY
    } else if normalized.contains("src/routes") {
        ROUTE_PRIORITY
    } else if normalized.contains("src/components") {
        COMPONENT_PRIORITY
    } else {
        UNRECOGNIZED_PRIORITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_table() {
        assert_eq!(priority("/p/node_modules/ui/Button.svelte"), 6);
        assert_eq!(priority("/p/src/layouts/Layout.svelte"), 3);
        assert_eq!(priority("/p/src/routes/home/Home.svelte"), 2);
        assert_eq!(priority("/p/src/components/Clock.svelte.css"), 1);
        assert_eq!(priority("/p/src/styles/reset.css"), 0);
    }

    #[test]
    fn packages_win_over_nested_layers() {
        assert_eq!(priority("/p/node_modules/kit/src/layouts/Base.svelte"), 6);
        assert_eq!(priority("/p/node_modules/kit/src/components/Card.svelte"), 6);
    }

    #[test]
    fn windows_separators_are_normalized() {
        assert_eq!(priority(r"C:\p\src\routes\Home.svelte"), 2);
    }
}
