//! Contract Invariant Tests
//!
//! These tests verify the batch guarantees end to end, with a fake encoder
//! standing in for the external tools.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use labelforge_core::{
    colors::{convert_xml_file, ColorTable},
    palette::ColorVariant,
    pipeline::normalize_output,
    BarcodePipeline, CommandRunner, CommandSpec, FontNormalizer, HexColor, LabelforgeConfig,
    NormalizationScope, OutputLayout, PipelineError, ProcessOutput, Product, ProductCatalog,
    ProductStage,
};

/// Records every command; behaves like the encoder and rasterizer.
#[derive(Default)]
struct FakeTools {
    commands: Vec<CommandSpec>,
    reject_data: HashSet<String>,
    fail_raster: bool,
}

impl FakeTools {
    fn rejecting(data: &str) -> Self {
        Self {
            reject_data: HashSet::from([data.to_string()]),
            ..Default::default()
        }
    }

    fn encoder_calls(&self) -> Vec<&CommandSpec> {
        self.commands.iter().filter(|c| c.program == "zint").collect()
    }
}

fn flag<'a>(command: &'a CommandSpec, name: &str) -> Option<&'a str> {
    command.args.iter().find_map(|a| a.strip_prefix(name))
}

fn fake_svg(data: &str, fg: &str, bg: &str) -> String {
    let bars: String = data
        .bytes()
        .enumerate()
        .map(|(i, b)| format!("M{},0h{}v50h-{}Z ", 10 + i * 7, b % 4 + 1, b % 4 + 1))
        .collect();
    format!(
        r##"<?xml version="1.0" standalone="no"?>
<svg width="119" height="71" version="1.1" xmlns="http://www.w3.org/2000/svg">
 <desc>Zint Generated Symbol</desc>
 <g id="barcode" fill="#{fg}">
  <rect x="0" y="0" width="119" height="71" fill="#{bg}"/>
  <path d="{bars}"/>
  <text x="59.5" y="67" text-anchor="middle" font-family="OCRB, monospace" font-size="7.5">{data}</text>
 </g>
</svg>
"##
    )
}

impl CommandRunner for FakeTools {
    fn run(&mut self, command: &CommandSpec) -> io::Result<ProcessOutput> {
        self.commands.push(command.clone());

        match command.program.as_str() {
            "zint" => {
                let data = flag(command, "--data=").unwrap_or_default();
                if self.reject_data.contains(data) {
                    return Ok(ProcessOutput {
                        status: Some(6),
                        success: false,
                        stdout: String::new(),
                        stderr: format!("Error 275: Invalid data {data}"),
                    });
                }
                let svg = fake_svg(
                    data,
                    flag(command, "--fg=").unwrap_or_default(),
                    flag(command, "--bg=").unwrap_or_default(),
                );
                fs::write(flag(command, "--output=").unwrap(), svg)?;
                Ok(ProcessOutput { status: Some(0), success: true, ..Default::default() })
            }
            "magick" => {
                if self.fail_raster {
                    return Ok(ProcessOutput {
                        status: Some(1),
                        success: false,
                        stdout: String::new(),
                        stderr: "no decode delegate for this image format".into(),
                    });
                }
                fs::write(&command.args[1], b"\x89PNG")?;
                Ok(ProcessOutput { status: Some(0), success: true, ..Default::default() })
            }
            other => Err(io::Error::new(io::ErrorKind::NotFound, other.to_string())),
        }
    }
}

fn product(codename: &str, ean13: &str) -> Product {
    Product {
        codename: codename.to_string(),
        ean13: ean13.to_string(),
        variant: codename.to_string(),
    }
}

fn create_catalog() -> ProductCatalog {
    ProductCatalog::new(vec![
        product("jabsok330", "4006381333931"),
        product("sntolj100", "5901234123457"),
        product("bzgkis500", "9780201379624"),
    ])
}

fn create_pipeline(root: &Path, config: LabelforgeConfig) -> BarcodePipeline {
    BarcodePipeline::new(config, OutputLayout::new(root)).unwrap()
}

fn read(path: impl AsRef<Path>) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn invariant_scenario_invocation_and_output() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = LabelforgeConfig::default();
    config.palette.insert("amber990".into(), HexColor::try_from("270e02").unwrap());
    config.palette.insert("amber10".into(), HexColor::try_from("fffdf5").unwrap());
    config.variants.insert(
        "jabsok330".into(),
        ColorVariant { fg: "amber990".into(), bg: "amber10".into() },
    );

    let catalog = ProductCatalog::from_json(
        r#"[{"codename": "jabsok330", "ean13": "4006381333931", "variant": "jabsok330"}]"#,
    )
    .unwrap();
    let pipeline = create_pipeline(dir.path(), config);
    let mut tools = FakeTools::default();

    let report = pipeline.run(&catalog, &mut tools).unwrap();

    let calls = tools.encoder_calls();
    assert_eq!(calls.len(), 1);
    let svg_path = dir.path().join("svg").join("jabsok330.svg");
    for expected in [
        "--fg=270e02".to_string(),
        "--bg=fffdf5".to_string(),
        "--data=4006381333931".to_string(),
        format!("--output={}", svg_path.display()),
    ] {
        assert!(calls[0].has_arg(&expected), "missing {expected}");
    }

    assert!(report.all_succeeded());
    let outcome = report.outcome("jabsok330").unwrap();
    assert_eq!(outcome.stage, ProductStage::Done);
    assert_eq!(outcome.svg.as_deref(), Some(svg_path.as_path()));

    let svg = read(&svg_path);
    assert!(svg.contains(r#"font-family="OCR B" font-size="7""#));
    assert!(!svg.contains("OCRB, monospace"));
    assert!(!svg.contains(r#"font-size="7.5""#));
}

#[test]
fn invariant_every_product_resolves_to_hex_pair() {
    let pipeline = BarcodePipeline::default();
    for job in pipeline.plan(&create_catalog()).unwrap() {
        for hex in [job.colors.foreground.as_str(), job.colors.background.as_str()] {
            assert_eq!(hex.len(), 6);
            assert!(hex.bytes().all(|b| b.is_ascii_hexdigit()));
        }
    }
}

#[test]
fn invariant_bad_product_fails_alone() {
    let dir = tempfile::tempdir().unwrap();
    let mut catalog_products = create_catalog().products().to_vec();
    // wrong check digit: caught before the encoder runs
    catalog_products.insert(1, product("jabsok750", "4006381333932"));
    // valid checksum the encoder still refuses
    catalog_products.push(product("jabkis500", "4012345678901"));
    let catalog = ProductCatalog::new(catalog_products);

    let pipeline = create_pipeline(dir.path(), LabelforgeConfig::default());
    let mut tools = FakeTools::rejecting("4012345678901");
    let report = pipeline.run(&catalog, &mut tools).unwrap();

    let failed: Vec<_> = report.failed().map(|(codename, _)| codename).collect();
    assert_eq!(failed, ["jabsok750", "jabkis500"]);
    assert_eq!(report.succeeded(), 3);

    let bad_checksum = report.outcome("jabsok750").unwrap().failure().unwrap();
    assert!(bad_checksum.contains("check digit"), "{bad_checksum}");
    let rejected = report.outcome("jabkis500").unwrap().failure().unwrap();
    assert!(rejected.contains("Error 275"), "{rejected}");

    // the invalid payload never reached the encoder
    assert!(tools.encoder_calls().iter().all(|c| !c.has_arg("--data=4006381333932")));

    for codename in ["jabsok330", "sntolj100", "bzgkis500"] {
        let svg = read(dir.path().join("svg").join(format!("{codename}.svg")));
        assert!(svg.contains("OCR B"));
    }
}

#[test]
fn invariant_broken_tables_abort_before_encoding() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = LabelforgeConfig::default();
    config.variants.insert(
        "jabsok330".into(),
        ColorVariant { fg: "amber990".into(), bg: "missing10".into() },
    );
    let pipeline = create_pipeline(dir.path(), config);
    let mut tools = FakeTools::default();

    let err = pipeline.run(&create_catalog(), &mut tools).unwrap_err();

    assert!(matches!(err, PipelineError::Palette { .. }));
    assert!(err.to_string().contains("missing10"));
    assert!(tools.commands.is_empty());
    assert!(!dir.path().join("svg").exists());
}

#[test]
fn invariant_rerun_is_identical() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = create_pipeline(dir.path(), LabelforgeConfig::default());
    let catalog = create_catalog();

    let first = pipeline.run(&catalog, &mut FakeTools::default()).unwrap();
    let svg_after_first = read(dir.path().join("svg/jabsok330.svg"));
    let second = pipeline.run(&catalog, &mut FakeTools::default()).unwrap();
    let svg_after_second = read(dir.path().join("svg/jabsok330.svg"));

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.outcomes_hash, second.outcomes_hash);
    assert_eq!(svg_after_first, svg_after_second);
    for (a, b) in first.outcomes.iter().zip(&second.outcomes) {
        assert_eq!(a.job_hash, b.job_hash);
        assert!(a.geometry_hash.is_some());
        assert_eq!(a.geometry_hash, b.geometry_hash);
    }
}

#[test]
fn invariant_normalizing_twice_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let svg_dir = dir.path().join("svg");
    fs::create_dir_all(&svg_dir).unwrap();
    fs::write(svg_dir.join("a.svg"), fake_svg("4006381333931", "270e02", "fffdf5")).unwrap();
    fs::write(svg_dir.join("b.svg"), fake_svg("5901234123457", "26030b", "fffafa")).unwrap();

    let layout = OutputLayout::new(dir.path());
    let config = LabelforgeConfig::default();

    let first = normalize_output(&config, &layout).unwrap();
    let a1 = read(svg_dir.join("a.svg"));
    let b1 = read(svg_dir.join("b.svg"));

    let second = normalize_output(&config, &layout).unwrap();
    assert_eq!(read(svg_dir.join("a.svg")), a1);
    assert_eq!(read(svg_dir.join("b.svg")), b1);

    assert_eq!(first.files_rewritten, 2);
    assert_eq!(first.total_replacements(), 4);
    assert_eq!(second.files_scanned, 2);
    assert_eq!(second.files_rewritten, 0);
    assert_eq!(second.total_replacements(), 0);
}

#[test]
fn invariant_directory_scope_heals_stale_files() {
    for (scope, healed) in [
        (NormalizationScope::Directory, true),
        (NormalizationScope::Produced, false),
    ] {
        let dir = tempfile::tempdir().unwrap();
        let svg_dir = dir.path().join("svg");
        fs::create_dir_all(&svg_dir).unwrap();
        let stale = svg_dir.join("old.svg");
        fs::write(&stale, fake_svg("9780201379624", "271102", "fefef6")).unwrap();

        let mut config = LabelforgeConfig::default();
        config.normalization = scope;
        let pipeline = create_pipeline(dir.path(), config);
        let report = pipeline.run(&create_catalog(), &mut FakeTools::default()).unwrap();

        assert!(report.all_succeeded());
        assert_eq!(read(&stale).contains("OCR B"), healed);
        assert!(read(svg_dir.join("sntolj100.svg")).contains("OCR B"));
    }
}

#[test]
fn invariant_raster_is_opt_in() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = create_catalog();

    let mut tools = FakeTools::default();
    create_pipeline(dir.path(), LabelforgeConfig::default())
        .run(&catalog, &mut tools)
        .unwrap();
    assert!(tools.commands.iter().all(|c| c.program != "magick"));
    assert!(!dir.path().join("png").exists());

    let mut config = LabelforgeConfig::default();
    config.raster.enabled = true;
    let mut tools = FakeTools::default();
    let report = create_pipeline(dir.path(), config).run(&catalog, &mut tools).unwrap();

    let outcome = report.outcome("jabsok330").unwrap();
    assert_eq!(outcome.stage, ProductStage::Done);
    assert_eq!(outcome.png.as_deref(), Some(dir.path().join("png/jabsok330.png").as_path()));
    assert!(dir.path().join("png/jabsok330.png").is_file());
}

#[test]
fn invariant_raster_failure_does_not_block_svg() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = LabelforgeConfig::default();
    config.raster.enabled = true;
    let mut tools = FakeTools { fail_raster: true, ..Default::default() };

    let report = create_pipeline(dir.path(), config)
        .run(&create_catalog(), &mut tools)
        .unwrap();

    assert!(report.all_succeeded());
    for outcome in &report.outcomes {
        assert!(outcome.png.is_none());
        assert!(outcome.svg.as_ref().unwrap().is_file());
        assert!(outcome.warnings.iter().any(|w| w.contains("raster export failed")));
    }
}

#[test]
fn invariant_postprocess_failure_aborts_run() {
    for scope in [NormalizationScope::Directory, NormalizationScope::Produced] {
        let dir = tempfile::tempdir().unwrap();
        // the normalizer writes through `<name>.svg.tmp`; a directory there blocks it
        fs::create_dir_all(dir.path().join("svg/jabsok330.svg.tmp")).unwrap();

        let mut config = LabelforgeConfig::default();
        config.normalization = scope;
        let result = create_pipeline(dir.path(), config).run(&create_catalog(), &mut FakeTools::default());

        assert!(matches!(result, Err(PipelineError::PostProcess(_))), "{scope:?}");
    }
}

#[test]
fn invariant_foreign_svg_does_not_block_run() {
    let dir = tempfile::tempdir().unwrap();
    let svg_dir = dir.path().join("svg");
    fs::create_dir_all(&svg_dir).unwrap();
    let foreign = svg_dir.join("latin1.svg");
    fs::write(&foreign, b"<svg><text font-family=\"OCRB, monospace\">Caf\xe9</text></svg>").unwrap();

    let report = create_pipeline(dir.path(), LabelforgeConfig::default())
        .run(&create_catalog(), &mut FakeTools::default())
        .unwrap();

    assert!(report.all_succeeded());
    assert_eq!(fs::read(&foreign).unwrap(), b"<svg><text font-family=\"OCR B\">Caf\xe9</text></svg>".to_vec());
}

#[test]
fn invariant_custom_font_rules_are_checked() {
    let mut config = LabelforgeConfig::default();
    config.fonts = vec![labelforge_core::postprocess::TokenSubstitution::new("OCR", "OCR B")];
    let dir = tempfile::tempdir().unwrap();

    let err = BarcodePipeline::new(config, OutputLayout::new(dir.path())).err().unwrap();
    assert!(matches!(err, PipelineError::PostProcess(_)));
    assert!(FontNormalizer::new(vec![]).is_ok());
}

#[test]
fn invariant_color_xml_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let xml = dir.path().join("gaia.xml");
    fs::write(
        &xml,
        r#"<?xml version="1.0" encoding="UTF-8"?>
<SCRIBUSCOLORS>
 <COLOR NAME="slovenia_green_cmyk" C="47.77" M="3.26" Y="98.97" K="0.20"/>
</SCRIBUSCOLORS>"#,
    )
    .unwrap();

    let csv = convert_xml_file(&xml).unwrap();
    assert_eq!(csv, dir.path().join("gaia.csv"));
    assert_eq!(read(&csv), "slovenia_green,slovenia_green_cmyk,47.77,3.26,98.97,0.20\r\n");

    let table = ColorTable::load(&csv).unwrap();
    let plan = table.replacement_plan(&["slovenia_green".to_string()]);
    assert_eq!(plan.replace.len(), 1);
    assert_eq!(plan.replace[0].cmyk_name, "slovenia_green_cmyk");
}

#[cfg(feature = "test-hooks")]
#[test]
fn invariant_every_job_is_validated() {
    use labelforge_core::pipeline::{get_validation_call_count, reset_validation_call_count};

    reset_validation_call_count();
    let dir = tempfile::tempdir().unwrap();
    create_pipeline(dir.path(), LabelforgeConfig::default())
        .run(&create_catalog(), &mut FakeTools::default())
        .unwrap();
    assert_eq!(get_validation_call_count(), 3);
}
