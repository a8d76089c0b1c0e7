use std::fs;

use crush::{CompileContext, CompileOutput, Compiler, Options};

fn compile_in(dir: &std::path::Path, source: &str) -> CompileOutput {
    Compiler::default().compile(source, &CompileContext::new(dir), &Options::default())
}

fn compile(source: &str) -> String {
    let output = Compiler::default().compile(source, &CompileContext::default(), &Options::default());
    output.css
}

#[test]
fn test_math_forms() {
    assert_eq!(compile("p{width:math(2 * 3, em)}"), "p{width:6em}");
    assert_eq!(compile("p{width:math((1 + 2) * 4)px}"), "p{width:12px}");
    assert_eq!(compile("p{margin:(10px / 4)px (-2 * 3)px}"), "p{margin:2.5px -6px}");
}

#[test]
fn test_invalid_math_is_zero() {
    let output = Compiler::default().compile(
        "p{width:math(1 +)}",
        &CompileContext::default(),
        &Options::default(),
    );
    assert_eq!(output.css, "p{width:0}");
    assert_eq!(output.warnings.len(), 1);
}

#[test]
fn test_rounding_functions() {
    assert_eq!(
        compile("p{margin:round(10 / 3)px floor(2.7)px ceil(2.1)px}"),
        "p{margin:3px 2px 3px}"
    );
}

#[test]
fn test_percent() {
    assert_eq!(compile("p{width:percent(1, 3)}"), "p{width:33.3333333%}");
    assert_eq!(compile("p{width:pc(1, 8, 2)}"), "p{width:12.5%}");
}

#[test]
fn test_variables_feed_functions() {
    assert_eq!(
        compile("@variables{unit:8} p{padding:math($unit * 2)px}"),
        "p{padding:16px}"
    );
}

#[test]
fn test_data_uri_inlines_local_image() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("dot.png"), [0x89, b'P', b'N', b'G']).unwrap();

    let output = compile_in(dir.path(), "p{background:data-uri(dot.png)} q{background:data-uri('dot.png')}");
    assert!(output.warnings.is_empty(), "{:?}", output.warnings);
    assert_eq!(
        output.css,
        "p{background:url(data:image/png;base64,iVBORw==)}q{background:url(data:image/png;base64,iVBORw==)}"
    );
}

#[test]
fn test_data_uri_falls_back_to_url() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("logo.svg"), "<svg/>").unwrap();

    let output = compile_in(
        dir.path(),
        "a{background:data-uri(none.png)} b{background:data-uri(logo.svg)} c{background:data-uri(http://x.com/a.png)}",
    );
    assert_eq!(
        output.css,
        "a{background:url(none.png)}b{background:url(logo.svg)}c{background:url(http://x.com/a.png)}"
    );
    assert_eq!(output.warnings.len(), 1);
    assert!(output.warnings[0].contains("none.png"));
}
