//! The same site built by both engines.

use std::fs;
use std::path::Path;

use isle_bundler::hydration::ComponentLookup;
use isle_bundler::{BackendKind, BuildInvocation, ComponentManifest, ProjectLayout, build};
use tempfile::TempDir;

const CARD: &str = r#"<script>
  export let title = "";
  import "./card.css";
</script>

<article>{title}</article>

<style>
article { padding: 1rem; }
</style>
"#;

const HOME: &str = r#"<script>
  import Card from "../components/Card.svelte";
  import "./home.css";
</script>

<main>home</main>
"#;

fn create_site() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    let src = dir.path().join("src");
    fs::create_dir_all(src.join("components")).expect("create components");
    fs::create_dir_all(src.join("routes")).expect("create routes");

    fs::write(src.join("components/Card.svelte"), CARD).expect("write card");
    fs::write(src.join("components/card.css"), ".card { border: 0; }").expect("write card css");
    fs::write(src.join("routes/Home.svelte"), HOME).expect("write home");
    fs::write(src.join("routes/home.css"), "main { margin: 0; }").expect("write home css");
    dir
}

fn layout(root: &Path) -> ProjectLayout {
    ProjectLayout::new(root, "src", ".isle/compiled", "public/_isle")
}

struct Built {
    _site: TempDir,
    layout: ProjectLayout,
}

async fn build_with(kind: BackendKind) -> Built {
    let site = create_site();
    let layout = layout(site.path());
    let session = build(BuildInvocation::new(layout.clone()).with_backend(kind))
        .await
        .expect("build");
    assert!(session.is_success(), "{kind}: {:?}", session.outcomes());
    Built { _site: site, layout }
}

#[tokio::test(flavor = "multi_thread")]
async fn rolldown_builds_the_site() {
    let built = build_with(BackendKind::Rolldown).await;
    let layout = &built.layout;

    let home = fs::read_to_string(layout.ssr_dir.join("routes/Home.js")).expect("home");
    assert!(home.contains("main { margin: 0; }"), "{home}");
    assert!(home.contains("article { padding: 1rem; }"), "{home}");
    assert!(home.contains(".card { border: 0; }"), "{home}");
    assert!(!home.contains("__ISLE_COMPONENT_CSS__"));

    let manifest = ComponentManifest::scan(layout, &[".svelte".to_string()]);
    let card = manifest.lookup("Card").expect("card in manifest");
    assert!(card.client.starts_with("/_isle/islands/components/Card."));
    assert!(card.client.ends_with(".js"));
}

#[tokio::test(flavor = "multi_thread")]
async fn both_engines_write_the_same_global_stylesheet() {
    let scan = build_with(BackendKind::Scan).await;
    let rolldown = build_with(BackendKind::Rolldown).await;

    let [scan_server, scan_client] = scan.layout.global_stylesheets();
    let [rolldown_server, rolldown_client] = rolldown.layout.global_stylesheets();

    let expected = fs::read_to_string(&scan_server).expect("scan stylesheet");
    assert!(expected.contains(".card { border: 0; }"));
    assert!(expected.contains("main { margin: 0; }"));
    assert_eq!(expected, fs::read_to_string(&scan_client).expect("scan client stylesheet"));
    assert_eq!(expected, fs::read_to_string(&rolldown_server).expect("rolldown stylesheet"));
    assert_eq!(
        expected,
        fs::read_to_string(&rolldown_client).expect("rolldown client stylesheet")
    );

    for built in [&scan, &rolldown] {
        let home = fs::read_to_string(built.layout.ssr_dir.join("routes/Home.js")).expect("home");
        assert!(home.contains("article { padding: 1rem; }"), "{home}");
    }
}
