#![forbid(unsafe_code)]

use std::fs;
use std::path::PathBuf;

use tm_catalog::ListKind;
use tm_conformance::{HarnessConfig, run_fixture_suite};
use tm_io::{read_records_json, read_view_query_json, write_records_csv};
use tm_runtime::{DiagnosticLedger, RuntimePolicy};
use tm_view::{ViewQuery, run_view};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut records_path: Option<PathBuf> = None;
    let mut query_path: Option<PathBuf> = None;
    let mut kind = ListKind::TestCases;
    let mut strict = false;
    let mut csv_columns: Option<Vec<String>> = None;
    let mut run_fixtures = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--records" => {
                let value = args.next().ok_or("--records requires a JSON file path")?;
                records_path = Some(PathBuf::from(value));
            }
            "--query" => {
                let value = args.next().ok_or("--query requires a JSON file path")?;
                query_path = Some(PathBuf::from(value));
            }
            "--kind" => {
                let value = args
                    .next()
                    .ok_or("--kind requires a list name (e.g. test_cases)")?;
                kind = value.parse()?;
            }
            "--strict" => {
                strict = true;
            }
            "--csv" => {
                let value = args
                    .next()
                    .ok_or("--csv requires a comma-separated column list")?;
                csv_columns = Some(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|column| !column.is_empty())
                        .map(str::to_owned)
                        .collect(),
                );
            }
            "--fixtures" => {
                run_fixtures = true;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                return Err(format!("unknown argument: {other}").into());
            }
        }
    }

    if run_fixtures {
        let mut config = HarnessConfig::default_paths();
        config.force_strict = strict;
        let report = run_fixture_suite(&config)?;
        for result in &report.results {
            println!(
                "case={} mode={:?} status={:?} diagnostics={}{}",
                result.case_id,
                result.mode,
                result.status,
                result.diagnostics,
                result
                    .mismatch
                    .as_deref()
                    .map(|mismatch| format!(" mismatch={mismatch}"))
                    .unwrap_or_default()
            );
        }
        println!(
            "suite={} fixtures={} passed={} failed={} green={}",
            report.suite,
            report.fixture_count,
            report.passed,
            report.failed,
            report.is_green()
        );
        if !report.is_green() {
            return Err("fixture suite is not green".into());
        }
        return Ok(());
    }

    let records_path = records_path.ok_or("--records is required (see --help)")?;
    let records = read_records_json(&fs::read_to_string(&records_path)?)?;
    let query = match query_path {
        Some(path) => read_view_query_json(&fs::read_to_string(path)?)?,
        None => ViewQuery::default(),
    };
    let policy = if strict {
        RuntimePolicy::strict()
    } else {
        RuntimePolicy::lenient()
    };

    let mut ledger = DiagnosticLedger::new();
    let page = run_view(kind, &records, &query, &policy, &mut ledger)?;

    match csv_columns {
        Some(columns) => print!("{}", write_records_csv(&page.records, &columns)?),
        None => println!("{}", serde_json::to_string_pretty(&page)?),
    }

    for diagnostic in ledger.records() {
        eprintln!("{}", diagnostic.render_plain());
    }
    Ok(())
}

fn print_help() {
    println!(
        "tm-view-cli\n\n\
         Usage:\n  tm-view-cli --records <file> [--kind <list>] [--query <file>] [--strict] [--csv <cols>]\n  tm-view-cli --fixtures [--strict]\n\n\
         Options:\n\
         \x20 --records <file>  JSON array of records, or an object with a `data`/`items` array\n\
         \x20 --kind <list>     test_runs | test_cases | projects | test_suites | repositories | keys\n\
         \x20                   (default: test_cases)\n\
         \x20 --query <file>    JSON view query: {{\"filters\": {{..}}, \"sort\": \"..\", \"page\": 1, \"page_size\": 25}}\n\
         \x20 --strict          Reject misconfigured filters and sort keys instead of skipping them\n\
         \x20 --csv <cols>      Print the page as CSV with the given comma-separated column paths\n\
         \x20 --fixtures        Run the bundled fixture suite\n\
         \x20 -h, --help        Show this help"
    );
}
