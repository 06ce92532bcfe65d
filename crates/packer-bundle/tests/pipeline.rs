use packer_bundle::plugins::{
    staged_outputs, CleanDist, CombineCss, CombineJs, ContentHash, CopyFiles, JsEntry,
    ReplaceCode, Src,
};
use packer_bundle::SourceMap;
use packer_core::{BuildContext, PackerConfig, Plugin, Result};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: impl AsRef<[u8]>) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "src/main.js",
        "var a = require('./a');\nrequire('./style.css');\nmodule.exports = a;",
    );
    write(dir.path(), "src/a.js", "module.exports = 'a';");
    write(
        dir.path(),
        "src/style.css",
        "@import './base.css';\nbody { background: url(./dot.png); }",
    );
    write(dir.path(), "src/base.css", "html { margin: 0; }");
    write(dir.path(), "src/dot.png", [0x89u8, b'P', b'N', b'G']);
    dir
}

async fn pass(ctx: &mut BuildContext, plugins: &mut [Box<dyn Plugin>]) -> Result<()> {
    ctx.begin_pass();
    for plugin in plugins.iter_mut() {
        plugin.apply(ctx).await?;
    }
    Ok(())
}

fn bundling() -> Vec<Box<dyn Plugin>> {
    vec![
        Box::new(JsEntry::new("src/main.js")),
        Box::new(CombineJs::new("app.js")),
        Box::new(CombineCss::new("app.css")),
    ]
}

fn output_text(ctx: &BuildContext, rel: &str) -> String {
    let id = ctx.cache.lookup(ctx.normalize_dest_name(rel)).unwrap();
    ctx.cache.node(id).text().unwrap().to_string()
}

#[tokio::test]
async fn test_scripts_and_styles_are_bundled() {
    let dir = project();
    let mut ctx = BuildContext::new(PackerConfig::for_context(dir.path()).unwrap());
    let mut plugins = bundling();
    pass(&mut ctx, &mut plugins).await.unwrap();

    assert_eq!(
        staged_outputs(&ctx),
        vec!["app.js.map", "app.js", "app.css.map", "app.css"]
    );

    let js = output_text(&ctx, "app.js");
    assert!(js.starts_with("(function (__hostRequire) {"));
    assert!(js.contains("__packer(0, function(require, module, exports) {\nvar a = require(1    );"));
    assert!(js.contains("require(2            );"));
    assert!(js.contains("\n__packer(2, function() {});\nrequire(0);\n"));
    assert!(js.ends_with("\n//# sourceMappingURL=app.js.map"));

    let css = output_text(&ctx, "app.css");
    let base_at = css.find("html { margin: 0; }").unwrap();
    let body_at = css.find("body {").unwrap();
    assert!(base_at < body_at);
    assert!(!css.contains("@import"));
    assert!(css.contains("url(data:image/png;base64,iVBORw==)"));
    assert!(css.ends_with("/*# sourceMappingURL=app.css.map */"));
}

#[tokio::test]
async fn test_unchanged_second_pass_reuses_outputs() {
    let dir = project();
    let mut ctx = BuildContext::new(PackerConfig::for_context(dir.path()).unwrap());
    let mut plugins = bundling();
    pass(&mut ctx, &mut plugins).await.unwrap();
    let first: Vec<_> = ctx.stage.to_vec();
    ctx.cache.reset_updated_files();

    pass(&mut ctx, &mut plugins).await.unwrap();
    let second: Vec<_> = ctx.stage.to_vec();
    let first_outputs: Vec<_> = first.iter().filter(|&&id| ctx.in_dest_folder(id)).collect();
    let second_outputs: Vec<_> = second.iter().filter(|&&id| ctx.in_dest_folder(id)).collect();
    assert_eq!(first_outputs, second_outputs);
    assert!(second.iter().all(|&id| !ctx.cache.node(id).is_updated()));
}

#[tokio::test]
async fn test_large_assets_are_copied_and_linked() {
    let dir = project();
    write(dir.path(), "src/dot.png", vec![7u8; 64]);
    let mut config = PackerConfig::for_context(dir.path()).unwrap();
    config.inline_size_limit = 16;
    config.public_path = "/static/".to_string();
    let mut ctx = BuildContext::new(config);
    pass(&mut ctx, &mut bundling()).await.unwrap();

    assert!(output_text(&ctx, "app.css").contains("url(/static/src/dot.png)"));
    assert!(staged_outputs(&ctx).contains(&"src/dot.png".to_string()));
}

#[tokio::test]
async fn test_missing_css_import_fails_the_pass() {
    let dir = project();
    write(dir.path(), "src/base.css", "@import 'gone.css';");
    let mut ctx = BuildContext::new(PackerConfig::for_context(dir.path()).unwrap());
    let err = pass(&mut ctx, &mut bundling()).await.unwrap_err();
    assert!(err.is_source_error());
    assert!(err.to_string().contains("gone.css"));
}

#[tokio::test]
async fn test_hashed_names_are_stable_across_passes() {
    let dir = project();
    let mut ctx = BuildContext::new(PackerConfig::for_context(dir.path()).unwrap());
    let mut plugins = bundling();
    plugins.push(Box::new(ContentHash::with_filter("*.js").unwrap()));

    pass(&mut ctx, &mut plugins).await.unwrap();
    let first = staged_outputs(&ctx);
    assert!(first.contains(&"app.js.map".to_string()));
    assert!(first.contains(&"app.css".to_string()));
    let hashed: Vec<&String> = first
        .iter()
        .filter(|n| n.starts_with("app_") && n.ends_with(".js"))
        .collect();
    assert_eq!(hashed.len(), 1);
    let map = SourceMap::from_json(Path::new("app.js.map"), &output_text(&ctx, "app.js.map"))
        .unwrap();
    assert_eq!(map.file.as_deref(), Some(hashed[0].as_str()));

    ctx.cache.reset_updated_files();
    pass(&mut ctx, &mut plugins).await.unwrap();
    assert_eq!(staged_outputs(&ctx), first);
    let map_id = ctx.cache.lookup(ctx.normalize_dest_name("app.js.map")).unwrap();
    assert!(!ctx.cache.node(map_id).is_updated());
}

#[tokio::test]
async fn test_clean_dist_drops_previous_hashed_bundle() {
    let dir = project();
    let mut ctx = BuildContext::new(PackerConfig::for_context(dir.path()).unwrap());
    let mut plugins = bundling();
    plugins.push(Box::new(ContentHash::with_filter("*.js").unwrap()));
    plugins.push(Box::new(CleanDist::new()));

    pass(&mut ctx, &mut plugins).await.unwrap();
    let hashed_bundle = |ctx: &BuildContext| {
        staged_outputs(ctx)
            .into_iter()
            .find(|n| n.starts_with("app_"))
            .unwrap()
    };
    let old = hashed_bundle(&ctx);
    let dest = ctx.config.dest.clone();
    write(&dest, &old, "previous build");
    write(&dest, "notes.txt", "stray");

    ctx.cache.reset_updated_files();
    let a = dir.path().join("src/a.js");
    write(dir.path(), "src/a.js", "module.exports = 'changed';");
    let id = ctx.cache.refresh(&a).unwrap().unwrap();
    ctx.cache.invalidate_dependents(id);
    pass(&mut ctx, &mut plugins).await.unwrap();

    let new = hashed_bundle(&ctx);
    assert_ne!(new, old);
    assert!(!dest.join(&old).exists());
    assert!(!dest.join("notes.txt").exists());
    assert!(output_text(&ctx, &new).contains("'changed'"));
}

#[tokio::test]
async fn test_src_copy_and_replace() {
    let dir = project();
    write(dir.path(), "public/index.html", "<script src=app.js></script>");
    let mut ctx = BuildContext::new(PackerConfig::for_context(dir.path()).unwrap());
    let mut plugins: Vec<Box<dyn Plugin>> = vec![
        Box::new(Src::new(["src/**/*.js"])),
        Box::new(CopyFiles::new(["public/*.html"])),
        Box::new(JsEntry::new("src/main.js")),
        Box::new(CombineJs::new("app.js")),
        Box::new(ReplaceCode::new([(r"module\.exports = 'a'", "module.exports = 'b'")]).unwrap()),
    ];
    pass(&mut ctx, &mut plugins).await.unwrap();

    let outputs = staged_outputs(&ctx);
    assert!(outputs.contains(&"public/index.html".to_string()));
    assert!(output_text(&ctx, "app.js").contains("module.exports = 'b';"));

    let staged_sources: Vec<String> = ctx
        .stage
        .iter()
        .filter(|&id| !ctx.in_dest_folder(id))
        .map(|id| ctx.cache.relative_name(id))
        .collect();
    assert!(!staged_sources.contains(&"src/main.js".to_string()));
    assert!(!staged_sources.contains(&"src/a.js".to_string()));
}
