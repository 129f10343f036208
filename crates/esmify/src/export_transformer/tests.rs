use std::thread;

use anyhow::Result;
use insta::assert_snapshot;
use pretty_assertions::assert_eq;

use super::*;

fn transform(code: &str) -> Option<TransformOutput> {
    ExportTransformer::default()
        .transform(code, "./lib/index.js")
        .expect("transform should succeed")
}

fn trailer<'a>(code: &str, output: &'a TransformOutput) -> &'a str {
    output
        .code
        .strip_prefix(code)
        .expect("synthesized exports must be appended after the original text")
}

#[test]
fn test_registration_calls_become_named_exports() {
    let code = "\
import setReadOnly from '@stdlib/utils-define-nonenumerable-read-only-property';
import gamma from '@stdlib/math-base-special-gamma';
import betainc from '@stdlib/math-base-special-betainc';

var ns = {};
setReadOnly( ns, 'gamma', gamma );
setReadOnly( ns, 'incbet', betainc );

export default ns;
";
    let output = transform(code).expect("registration calls should produce exports");
    assert_eq!(
        trailer(code, &output),
        "\nexport { gamma, betainc as incbet };\n"
    );
}

#[test]
fn test_only_default_export_registrations_are_honored() {
    let code = "\
import alpha from './alpha.js';
import beta from './beta.js';
var A = {};
var B = {};
setReadOnly( A, 'alpha', alpha );
setReadOnly( B, 'beta', beta );
export default A;
";
    let output = transform(code).expect("A-targeted call should produce an export");
    assert_eq!(trailer(code, &output), "\nexport { alpha };\n");
    assert_eq!(output.exports.reexports, vec![ExportRecord::new("alpha", "alpha")]);
}

#[test]
fn test_registrations_without_default_export_are_all_honored() {
    let code = "setReadOnly( A, 'alpha', alpha );\nsetReadOnly( B, 'beta', beta );\n";
    let output = transform(code).expect("calls should produce exports");
    assert_eq!(trailer(code, &output), "\nexport { alpha, beta };\n");
}

#[test]
fn test_annotation_takes_precedence_over_registrations() {
    let code = "\
// exports: { \"foo\": \"obj.foo\" }
import bar from './bar.js';
var obj = {};
setReadOnly( obj, 'bar', bar );
export default obj;
";
    let output = transform(code).expect("annotation should produce exports");
    assert_eq!(trailer(code, &output), "\nexport const { foo: foo } = obj;\n");
    assert!(output.exports.reexports.is_empty());
}

#[test]
fn test_annotation_destructures_unbound_names() {
    let code = "// exports: {\"baz\":\"obj.baz\"}\nvar obj = require( './obj.js' );\n";
    let output = transform(code).expect("annotation should produce exports");
    assert_eq!(trailer(code, &output), "\nexport const { baz: baz } = obj;\n");
}

#[test]
fn test_annotation_reexports_imported_names() {
    let code = "// exports: {\"baz\":\"obj.baz\"}\nimport baz from './baz.js';\nimport obj from './obj.js';\n";
    let output = transform(code).expect("annotation should produce exports");
    assert_eq!(trailer(code, &output), "\nexport { baz };\n");
}

#[test]
fn test_mixed_annotation_appends_destructures_first() {
    let code = "\
// exports: {\"abs\":\"base.abs\",\"pow\":\"math.base.pow\",\"sqrt\":\"base.sqrt\"}
import { sqrt } from './sqrt.js';
import base from './base.js';
";
    let output = transform(code).expect("annotation should produce exports");
    assert_snapshot!(output.code, @r#"
    // exports: {"abs":"base.abs","pow":"math.base.pow","sqrt":"base.sqrt"}
    import { sqrt } from './sqrt.js';
    import base from './base.js';

    export const { abs: abs } = base;
    export const { pow: pow } = math.base;
    export { sqrt };
    "#);
}

#[test]
fn test_annotation_values_without_property_are_skipped() {
    let code = "// exports: {\"foo\":\"foo\",\"bar\":\"\"}\nexport default foo;\n";
    assert!(transform(code).is_none());
}

#[test]
fn test_annotation_entries_must_bind_identifiers() -> Result<()> {
    let transformer = ExportTransformer::default();
    let code = "// exports: {\"foo-bar\":\"obj.x\",\"y\":\"obj.not-a-key\",\"z\":\"obj.z\"}\nimport obj from './o.js';\n";

    let first = transformer
        .transform(code, "./lib/index.js")?
        .expect("z is still a valid entry");
    assert_eq!(trailer(code, &first), "\nexport const { z: z } = obj;\n");
    assert!(transformer.transform(&first.code, "./lib/index.js")?.is_none());

    let only_invalid = "// exports: {\"foo-bar\":\"obj.x\"}\nimport obj from './o.js';\n";
    assert!(transformer.transform(only_invalid, "./lib/index.js")?.is_none());
    Ok(())
}

#[test]
fn test_literal_registration_values_are_not_exported() {
    let code = "import gamma from './gamma.js';\nsetReadOnly( ns, 'FLAG', true );\nsetReadOnly( ns, 'gamma', gamma );\nexport default ns;\n";
    let output = transform(code).expect("gamma should still be exported");
    assert_eq!(trailer(code, &output), "\nexport { gamma };\n");
}

#[test]
fn test_malformed_annotation_is_an_error() {
    let code = "// exports: {\"foo\": obj.foo}\nexport default obj;\n";
    let err = ExportTransformer::default()
        .transform(code, "./lib/broken.js")
        .unwrap_err();
    assert!(
        format!("{err:#}").contains("Invalid exports annotation in ./lib/broken.js"),
        "unexpected error: {err:#}"
    );
}

#[test]
fn test_non_string_annotation_value_is_an_error() {
    let code = "// exports: {\"foo\": 1}\n";
    assert!(ExportTransformer::default().transform(code, "x.js").is_err());
}

#[test]
fn test_duplicate_annotation_names_keep_first() {
    let code = "// exports: {\"a\":\"x.a\"}\n// exports: {\"a\":\"y.a\",\"b\":\"y.b\"}\n";
    let output = transform(code).expect("annotations should produce exports");
    assert_eq!(
        trailer(code, &output),
        "\nexport const { a: a } = x;\nexport const { b: b } = y;\n"
    );
}

#[test]
fn test_helper_alias_is_a_registration_function() {
    let code = "\
import readOnly from './utils/set-read-only';
import gamma from './gamma.js';
export default main;
readOnly(main, 'gamma', gamma);
";
    let output = transform(code).expect("aliased helper should be recognized");
    assert_eq!(trailer(code, &output), "\nexport { gamma };\n");
}

#[test]
fn test_unknown_callee_is_not_a_registration() {
    let code = "import gamma from './gamma.js';\ndefine( ns, 'gamma', gamma );\n";
    assert!(transform(code).is_none());
}

#[test]
fn test_configured_registration_functions() -> Result<()> {
    let code = "defineReadOnly( ns, 'gamma', gamma );\nsetReadOnly( ns, 'beta', beta );\n";
    let transformer = ExportTransformer::default().with_registration_functions(["defineReadOnly"]);
    let output = transformer
        .transform(code, "ns.js")?
        .expect("configured callee should be recognized");
    assert_eq!(trailer(code, &output), "\nexport { gamma };\n");
    Ok(())
}

#[test]
fn test_already_exported_names_are_not_duplicated() {
    let code = "\
export const alpha = 1;
export { beta as b };
setReadOnly( ns, 'alpha', alpha );
setReadOnly( ns, 'b', beta );
setReadOnly( ns, 'gamma', gamma );
setReadOnly( ns, 'gamma', gamma2 );
";
    let output = transform(code).expect("gamma is still missing");
    assert_eq!(trailer(code, &output), "\nexport { gamma };\n");
}

#[test]
fn test_transform_is_idempotent() -> Result<()> {
    let transformer = ExportTransformer::default();
    let sources = [
        "import gamma from './gamma.js';\nsetReadOnly( ns, 'gamma', gamma );\nexport default ns;\n",
        "// exports: {\"baz\":\"obj.baz\",\"qux\":\"obj.qux\"}\nimport qux from './qux.js';\n",
    ];
    for code in sources {
        let first = transformer
            .transform(code, "m.js")?
            .expect("first pass should synthesize exports");
        assert!(
            transformer.transform(&first.code, "m.js")?.is_none(),
            "second pass must be a no-op for:\n{}",
            first.code
        );
    }
    Ok(())
}

#[test]
fn test_ignored_modules_are_left_alone() -> Result<()> {
    let transformer = ExportTransformer::new(["lib/index.js"]);
    let code = "setReadOnly( ns, 'gamma', gamma );\n";

    assert!(transformer.is_ignored("./lib/index.js"));
    assert!(transformer.transform(code, "./lib/index.js")?.is_none());
    assert!(transformer.transform(code, "./lib/main.js")?.is_some());
    Ok(())
}

#[test]
fn test_unrelated_module_is_no_change() {
    let code = "'use strict';\n\nfunction main( x ) {\n\treturn x;\n}\n\nexport default main;\n";
    assert!(transform(code).is_none());
}

#[test]
fn test_source_map_covers_original_lines_only() -> Result<()> {
    let code = "import gamma from './gamma.js';\nsetReadOnly( ns, 'gamma', gamma );\nexport default ns;\n";
    let output = transform(code).expect("exports expected");

    assert_eq!(output.map.sources, vec!["./lib/index.js"]);
    assert_eq!(output.map.sources_content, Some(vec![Some(code.to_owned())]));

    let lines = output.map.decoded_mappings()?;
    assert_eq!(lines.len(), output.code.split('\n').count());
    for (line_no, segments) in lines.iter().enumerate().take(3) {
        assert_eq!(segments, &vec![crate::source_map::Segment::mapped(0, 0, line_no, 0)]);
    }
    assert!(lines[3..].iter().all(Vec::is_empty));
    Ok(())
}

#[test]
fn test_transformer_is_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ExportTransformer>();

    let transformer = ExportTransformer::default();
    let modules: Vec<(String, String)> = (0..8)
        .map(|i| {
            (
                format!("./lib/m{i}.js"),
                format!("import f{i} from './f{i}.js';\nsetReadOnly( ns, 'f{i}', f{i} );\n"),
            )
        })
        .collect();

    thread::scope(|scope| {
        let handles: Vec<_> = modules
            .iter()
            .map(|(id, code)| {
                let transformer = &transformer;
                scope.spawn(move || transformer.transform(code, id))
            })
            .collect();
        for (index, handle) in handles.into_iter().enumerate() {
            let output = handle
                .join()
                .expect("worker thread panicked")
                .expect("transform should succeed")
                .expect("exports expected");
            assert!(output.code.ends_with(&format!("export {{ f{index} }};\n")));
        }
    });
}
