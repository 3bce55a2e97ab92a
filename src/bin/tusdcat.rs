//! Reference tool: parse a USD file (USDA/USDC/USDZ), optionally flatten
//! its composition arcs, and print the result as USDA.

use anyhow::{Result, anyhow, bail};

use usd_forge::composition::CompositionFeatures;
use usd_forge::error::Warnings;
use usd_forge::reconstruct::{ReconstructOptions, layer_to_stage};
use usd_forge::resolver::{AssetResolver, base_dir};
use usd_forge::{LoadOptions, json, pprint};

#[derive(Debug, Clone, Default)]
struct Cli {
    flatten: bool,
    parse_only: bool,
    extract_variants: bool,
    relative: bool,
    features: Option<CompositionFeatures>,
    input: Option<String>,
}

fn print_help() {
    eprintln!(
        "Usage: tusdcat [--flatten] [--composition=STRLIST] [--relative] [--extract-variants] [--parse-only] input.usda/usdc/usdz"
    );
    eprintln!("  --flatten             Resolve composition arcs (subLayers, references, payload, inherits, variantSets, specializes)");
    eprintln!("  --composition=LIST    Comma-separated arcs to enable with --flatten:");
    eprintln!("                        l|subLayers, i|inherits, v|variantSets, r|references, p|payload, s|specializes");
    eprintln!("  --extract-variants    Dump variant information as JSON");
    eprintln!("  --relative            Accepted for compatibility; paths are printed absolute");
    eprintln!("  --parse-only          Validate the input without printing");
}

fn parse_composition_list(value: &str) -> Result<CompositionFeatures> {
    if value.is_empty() {
        bail!("no values specified to --composition");
    }
    let mut features = CompositionFeatures::none();
    for item in value.split(',') {
        match item {
            "l" | "subLayers" => features.sub_layers = true,
            "i" | "inherits" => features.inherits = true,
            "v" | "variantSets" => features.variant_sets = true,
            "r" | "references" => features.references = true,
            "p" | "payload" => features.payload = true,
            "s" | "specializes" => features.specializes = true,
            other => bail!("invalid string for --composition: {other}"),
        }
    }
    Ok(features)
}

fn parse_cli(args: &[String]) -> Result<Cli> {
    let mut cli = Cli::default();
    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(1);
            }
            "--flatten" => cli.flatten = true,
            "--parse-only" => cli.parse_only = true,
            "--extract-variants" => cli.extract_variants = true,
            "--relative" => cli.relative = true,
            _ => {
                if let Some(value) = arg.strip_prefix("--composition=") {
                    cli.features = Some(parse_composition_list(value)?);
                } else if arg.starts_with("--") {
                    bail!("unknown flag {arg}");
                } else {
                    cli.input = Some(arg.clone());
                }
            }
        }
    }
    Ok(cli)
}

fn report_warnings(warnings: &Warnings) {
    for w in warnings.iter() {
        eprintln!("WARN: {w}");
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        print_help();
        std::process::exit(1);
    }

    let cli = parse_cli(&args)?;
    let Some(input) = cli.input.clone() else {
        bail!("input USD filename missing");
    };
    if cli.relative {
        eprintln!("--relative is accepted but paths are printed absolute");
    }
    let options = LoadOptions::default();

    if cli.flatten {
        if cli.parse_only {
            bail!("--flatten and --parse-only cannot be specified at a time");
        }
        return run_flatten(&cli, &input, &options);
    }

    let (stage, warnings) = usd_forge::load_usd_from_file(&input, &options)
        .map_err(|e| anyhow!("failed to load USD file {input}: {e}"))?;
    report_warnings(&warnings);

    if cli.parse_only {
        return Ok(());
    }

    println!("{}", stage.export_to_string());

    if cli.extract_variants {
        let (layer, _) = usd_forge::load_layer_from_file(&input)?;
        println!("== Variants info ==");
        println!("{}", serde_json::to_string_pretty(&json::extract_variants(&layer))?);
    }
    Ok(())
}

fn run_flatten(cli: &Cli, input: &str, options: &LoadOptions) -> Result<()> {
    let bytes = std::fs::read(input)?;
    if usd_forge::is_usdz(&bytes) {
        // Flatten inside a container is not supported; load it directly.
        eprintln!("--flatten is ignored for USDZ");
        let (stage, warnings) = usd_forge::load_usdz_from_memory(&bytes, input, options)?;
        report_warnings(&warnings);
        println!("{}", stage.export_to_string());
        return Ok(());
    }

    let (layer, warnings) = usd_forge::load_layer_from_file(input)
        .map_err(|e| anyhow!("failed to read USD data as layer: {e}"))?;
    report_warnings(&warnings);

    println!("# input");
    println!("{}", pprint::layer_to_usda(&layer));

    let dir = base_dir(input);
    let mut resolver = AssetResolver::new();
    resolver.set_current_working_path(dir.clone());
    resolver.add_search_path(dir);

    let features = cli.features.unwrap_or_default();
    let (composed, warnings) = usd_forge::composite(&resolver, &layer, &features)
        .map_err(|e| anyhow!("failed to composite {input}: {e}"))?;
    report_warnings(&warnings);

    println!("# composited");
    println!("{}", pprint::layer_to_usda(&composed));

    if cli.extract_variants {
        println!("== Variants info ==");
        println!("{}", serde_json::to_string_pretty(&json::extract_variants(&composed))?);
    }

    let (stage, warnings) = layer_to_stage(&composed, ReconstructOptions::default())
        .map_err(|e| anyhow!("failed to reconstruct stage: {e}"))?;
    report_warnings(&warnings);
    println!("{}", stage.export_to_string());
    Ok(())
}
