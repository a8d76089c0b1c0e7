use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use crush::{CacheStatus, CompileContext, Compiler, Fingerprint, Options};

fn write(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

fn touch(path: &Path, secs: u64) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(UNIX_EPOCH + Duration::from_secs(secs)).unwrap();
}

#[test]
fn test_fixture_site() {
    let host = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/site/main.css");
    let output = Compiler::default().compile_file(&host, &Options::default());

    assert!(output.warnings.is_empty(), "{:?}", output.warnings);
    assert_eq!(
        output.css,
        "html,body{margin:0}.logo{background:url(img/logo.png) no-repeat}\
         @media print{nav{display:none}}main{color:#333}"
    );

    let requested: Vec<&str> = output.imports.iter().map(|r| r.requested_path.as_str()).collect();
    assert_eq!(requested, ["lib/base.css", "reset.css", "lib/print.css"]);
    assert_eq!(output.imports[2].media.as_deref(), Some("print"));
    assert_eq!(
        output.fingerprint.imports,
        ["lib/base.css", "lib/reset.css", "lib/print.css"]
    );
}

#[test]
fn test_nested_relative_imports_follow_their_file() {
    let dir = tempfile::tempdir().unwrap();
    let host = write(dir.path(), "main.css", "@import 'a/one.css'; main{color:red}");
    write(dir.path(), "a/one.css", "@import 'b/two.css'; one{color:red}");
    write(dir.path(), "a/b/two.css", "@import '../sibling.css'; two{color:red}");
    write(dir.path(), "a/sibling.css", "sibling{color:red}");

    let output = Compiler::default().compile_file(&host, &Options::default());
    assert!(output.warnings.is_empty(), "{:?}", output.warnings);
    assert_eq!(
        output.css,
        "sibling{color:red}two{color:red}one{color:red}main{color:red}"
    );
}

#[test]
fn test_absolute_imports_use_doc_root() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "shared/x.css", "@import 'y.css'; x{color:red}");
    write(dir.path(), "shared/y.css", "y{color:blue}");
    fs::create_dir_all(dir.path().join("css")).unwrap();

    let context = CompileContext::new(dir.path().join("css")).with_doc_root(dir.path());
    let output = Compiler::default().compile("@import '/shared/x.css';", &context, &Options::default());
    assert!(output.warnings.is_empty(), "{:?}", output.warnings);
    assert_eq!(output.css, "y{color:blue}x{color:red}");
}

#[test]
fn test_import_search_list() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("css")).unwrap();
    write(dir.path(), "vendor/grid.css", ".row{display:block}");

    let context = CompileContext::new(dir.path().join("css"))
        .with_import_paths(vec![dir.path().join("vendor")]);
    let output = Compiler::default().compile("@import 'grid.css';", &context, &Options::default());
    assert_eq!(output.css, ".row{display:block}");
}

#[test]
fn test_media_import_drops_nested_imports() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "print.css", "@import 'more.css'; .p{color:red}");
    write(dir.path(), "more.css", ".more{color:red}");

    let context = CompileContext::new(dir.path());
    let output = Compiler::default().compile("@import 'print.css' print;", &context, &Options::default());
    assert_eq!(output.css, "@media print{.p{color:red}}");
    assert_eq!(output.warnings.len(), 1);
    assert!(output.warnings[0].contains("media-scoped"));
}

#[test]
fn test_recursive_import_is_cut() {
    let dir = tempfile::tempdir().unwrap();
    let host = write(dir.path(), "a.css", "@import 'b.css'; a{color:red}");
    write(dir.path(), "b.css", "@import 'a.css'; b{color:blue}");

    let output = Compiler::default().compile_file(&host, &Options::default());
    assert_eq!(output.css, "b{color:blue}a{color:red}");
    assert_eq!(output.warnings, ["Recursive import: a.css"]);
}

#[test]
fn test_missing_and_external_imports() {
    let dir = tempfile::tempdir().unwrap();
    let context = CompileContext::new(dir.path());
    let output = Compiler::default().compile(
        "@import url(http://fonts.example.com/x.css); @import 'nope.css'; p{color:red}",
        &context,
        &Options::default(),
    );

    assert_eq!(output.css, "p{color:red}");
    assert!(output.errors.is_empty());
    assert_eq!(output.warnings.len(), 2);
    assert_eq!(output.imports.len(), 1);
    assert!(output.imports[0].is_external);
    assert!(output.fingerprint.imports.is_empty());
}

#[test]
fn test_repeated_import_is_recorded_once() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.css", "a{color:red}");

    let context = CompileContext::new(dir.path());
    let output = Compiler::default().compile("@import 'a.css'; @import \"a.css\";", &context, &Options::default());
    assert_eq!(output.css, "a{color:red}a{color:red}");
    assert_eq!(output.imports.len(), 1);
}

#[test]
fn test_commented_imports_are_not_followed() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "x.css", "x{color:blue}");

    let context = CompileContext::new(dir.path());
    let output = Compiler::default().compile("/* @import 'x.css'; */ p{color:red}", &context, &Options::default());
    assert_eq!(output.css, "p{color:red}");
    assert!(output.imports.is_empty());
}

#[test]
fn test_fingerprint_tracks_modification_times() {
    let dir = tempfile::tempdir().unwrap();
    let host = write(dir.path(), "main.css", "@import 'lib/base.css'; p{color:red}");
    let import = write(dir.path(), "lib/base.css", "b{color:blue}");
    touch(&host, 1_000_000);
    touch(&import, 1_000_000);

    let options = Options::default();
    let compiler = Compiler::default();
    let first = compiler.compile_file(&host, &options);
    let second = compiler.compile_file(&host, &options);
    assert_eq!(first.fingerprint.datem_sum, 2_000_000);
    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(first.fingerprint.validate(&host, &options), CacheStatus::Fresh);

    let stored = Fingerprint::from_json(&first.fingerprint.to_json().unwrap()).unwrap();
    assert_eq!(stored.validate(&host, &options), CacheStatus::Fresh);

    let mut other = options.clone();
    other.vars.insert("x".into(), "1".into());
    assert_eq!(stored.validate(&host, &other), CacheStatus::Stale);

    touch(&import, 1_000_500);
    let third = compiler.compile_file(&host, &options);
    assert_eq!(third.fingerprint.datem_sum, 2_000_500);
    assert_eq!(stored.validate(&host, &options), CacheStatus::Stale);

    fs::remove_file(&import).unwrap();
    assert!(matches!(
        stored.validate(&host, &options),
        CacheStatus::MissingImport(_)
    ));
}

#[test]
fn test_data_uri_in_imported_file_follows_its_file() {
    let dir = tempfile::tempdir().unwrap();
    let host = write(dir.path(), "main.css", "@import 'lib/a.css';");
    write(dir.path(), "lib/a.css", "a{background:data-uri(dot.png)} b{background:data-uri('gone.png')}");
    fs::write(dir.path().join("lib/dot.png"), [0x89, b'P', b'N', b'G']).unwrap();

    let output = Compiler::default().compile_file(&host, &Options::default());
    assert_eq!(
        output.css,
        "a{background:url(data:image/png;base64,iVBORw==)}b{background:url(lib/gone.png)}"
    );
    assert_eq!(output.warnings.len(), 1);
    assert!(output.warnings[0].contains("gone.png"));
}
