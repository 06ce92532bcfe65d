use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use packer_bundle::vlq::decode_mappings;
use packer_bundle::{combine, BundleKind, CombineOutcome, CombineRequest, SourceMap};
use packer_core::{FileCache, NodeId, Result, Stage};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn with_inline_map(code: &str, map: &str) -> String {
    format!(
        "{code}\n//# sourceMappingURL=data:application/json;charset=utf-8;base64,{}",
        STANDARD.encode(map)
    )
}

fn read(cache: &mut FileCache, id: NodeId) -> Result<String> {
    Ok(cache.read_text(id, false)?.to_string())
}

/// (source, line) of the first segment on each generated line.
fn first_origins(map: &SourceMap) -> Vec<Option<(u32, u32)>> {
    decode_mappings(&map.mappings)
        .unwrap()
        .iter()
        .map(|line| {
            line.first()
                .and_then(|s| s.original)
                .map(|o| (o.source, o.line))
        })
        .collect()
}

#[test]
fn test_two_transformed_inputs_compose_into_one_map() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("build")).unwrap();
    fs::write(
        dir.path().join("build/a.js"),
        with_inline_map(
            "var a = 1;\nvar b = 2;",
            r#"{"version":3,"sources":["../src/a.ts"],"sourcesContent":["A"],"mappings":"AAAA;AACA"}"#,
        ),
    )
    .unwrap();
    fs::write(
        dir.path().join("build/b.js"),
        with_inline_map(
            "x();\ny();",
            r#"{"version":3,"sources":["../src/b.ts","../src/a.ts"],"sourcesContent":["B","A"],"mappings":"AAAA;ACAA"}"#,
        ),
    )
    .unwrap();

    let mut cache = FileCache::new(dir.path());
    let a = cache.stat("build/a.js").unwrap().unwrap();
    let b = cache.stat("build/b.js").unwrap().unwrap();
    let outfile = dir.path().join("dist/app.js");
    let header = |_: NodeId| "// module\n".to_string();
    let request = CombineRequest {
        kind: BundleKind::Script,
        files: &[a, b],
        outfile: &outfile,
        prelude: "",
        epilogue: "",
        header: Some(&header),
        footer: None,
        source_maps: true,
    };

    let CombineOutcome::Written {
        bundle,
        map,
        warnings,
    } = combine(&mut cache, &mut Stage::new(), &request, read).unwrap()
    else {
        panic!("expected a fresh bundle");
    };
    assert!(warnings.is_empty());

    let text = cache.node(bundle).text().unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[1], "var a = 1;");
    assert_eq!(lines[4], "x();");

    let map = SourceMap::from_json(&outfile, &cache.node(map.unwrap()).text().unwrap()).unwrap();
    assert_eq!(map.file.as_deref(), Some("app.js"));
    assert_eq!(map.sources, vec!["../src/a.ts", "../src/b.ts"]);
    assert_eq!(
        map.sources_content,
        vec![Some("A".to_string()), Some("B".to_string())]
    );
    assert_eq!(
        first_origins(&map),
        vec![
            None,
            Some((0, 0)),
            Some((0, 1)),
            None,
            Some((1, 0)),
            Some((0, 0)),
            None,
        ]
    );
}

#[test]
fn test_upstream_line_mismatch_is_reported_not_fatal() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("a.js"),
        with_inline_map(
            "l1\nl2\nl3",
            r#"{"version":3,"sources":["a.ts"],"mappings":"AAAA"}"#,
        ),
    )
    .unwrap();
    fs::write(dir.path().join("b.js"), "next").unwrap();

    let mut cache = FileCache::new(dir.path());
    let a = cache.stat("a.js").unwrap().unwrap();
    let b = cache.stat("b.js").unwrap().unwrap();
    let outfile = dir.path().join("out/all.js");
    let request = CombineRequest {
        kind: BundleKind::Script,
        files: &[a, b],
        outfile: &outfile,
        prelude: "",
        epilogue: "",
        header: None,
        footer: None,
        source_maps: true,
    };

    let CombineOutcome::Written { map, warnings, .. } =
        combine(&mut cache, &mut Stage::new(), &request, read).unwrap()
    else {
        panic!("expected a fresh bundle");
    };
    assert_eq!(warnings.len(), 1);

    let map = SourceMap::from_json(Path::new("all.js.map"), &cache.node(map.unwrap()).text().unwrap())
        .unwrap();
    assert_eq!(map.sources, vec!["../a.ts", "../b.js"]);
    // "l1\nl2\nl3\n" takes four lines; b.js starts on the last of them.
    let origins = first_origins(&map);
    assert_eq!(origins[3], Some((1, 0)));
}

#[test]
fn test_disabled_maps_leave_no_map_node() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.js"), "a();\n//# sourceMappingURL=a.js.map").unwrap();
    let mut cache = FileCache::new(dir.path());
    let a = cache.stat("a.js").unwrap().unwrap();
    let outfile = dir.path().join("dist/a.js");
    let request = CombineRequest {
        kind: BundleKind::Script,
        files: &[a],
        outfile: &outfile,
        prelude: "",
        epilogue: "",
        header: None,
        footer: None,
        source_maps: false,
    };

    let CombineOutcome::Written { bundle, map, .. } =
        combine(&mut cache, &mut Stage::new(), &request, read).unwrap()
    else {
        panic!("expected a fresh bundle");
    };
    assert!(map.is_none());
    assert_eq!(
        cache.node(bundle).text().as_deref(),
        Some("a();\n//# sourceMappingURL=a.js.map")
    );
}
