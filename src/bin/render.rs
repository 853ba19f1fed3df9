use std::fs::File;
use std::io::{BufRead, BufReader};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use citeview::config::AppConfig;
use citeview::models::SearchResult;
use citeview::render::render;

#[derive(Parser, Debug)]
#[command(name = "render")]
#[command(about = "Render saved search results and report citation coverage")]
struct Cli {
    #[arg(long, default_value = "cases/results.jsonl")]
    file: String,
    /// Print the rendered answer and sidebar HTML for each case.
    #[arg(long, default_value_t = false)]
    html: bool,
}

#[derive(Debug, Deserialize)]
struct RenderCase {
    id: String,
    result: SearchResult,
    #[serde(default)]
    expect_sources: Option<usize>,
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let options = AppConfig::from_env().render_options();

    let cases = load_cases(&cli.file)?;
    if cases.is_empty() {
        anyhow::bail!("no cases found in {}", cli.file);
    }

    let mut total = 0usize;
    let mut valid_citations = 0usize;
    let mut placed_citations = 0usize;
    let mut with_sidebar = 0usize;
    let mut expectations = 0usize;
    let mut expectation_hits = 0usize;

    for case in cases {
        total += 1;
        let rendered = render(&case.result, &options);
        let result = &rendered.result;

        let valid = rendered.index.citations().count();
        valid_citations += valid;
        placed_citations += valid.saturating_sub(result.unplaced_citations.len());
        if result.has_citations {
            with_sidebar += 1;
        }

        if let Some(expected) = case.expect_sources {
            expectations += 1;
            if expected == result.sidebar.len() {
                expectation_hits += 1;
            } else {
                println!(
                    "{}: expected {} sources, rendered {}",
                    case.id,
                    expected,
                    result.sidebar.len()
                );
            }
        }

        if cli.html {
            println!("--- {} ---", case.id);
            println!("{}", result.answer_html);
            println!("{}", result.sidebar_html);
            println!(
                "Placed: {}/{}  Sources: {}",
                valid.saturating_sub(result.unplaced_citations.len()),
                valid,
                result.sidebar.len()
            );
            println!();
        }
    }

    println!("Cases: {}", total);
    println!(
        "Marker placement: {:.1}% ({}/{})",
        ratio(placed_citations, valid_citations) * 100.0,
        placed_citations,
        valid_citations
    );
    println!("Cases with sources: {:.1}%", ratio(with_sidebar, total) * 100.0);
    if expectations > 0 {
        println!(
            "Source count matches: {:.1}% ({}/{})",
            ratio(expectation_hits, expectations) * 100.0,
            expectation_hits,
            expectations
        );
    }

    Ok(())
}

fn load_cases(path: &str) -> Result<Vec<RenderCase>> {
    let file = File::open(path).with_context(|| format!("failed opening {}", path))?;
    let reader = BufReader::new(file);
    let mut cases = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let parsed: RenderCase = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid JSON at {} line {}", path, idx + 1))?;
        cases.push(parsed);
    }

    Ok(cases)
}

fn ratio(n: usize, d: usize) -> f32 {
    if d == 0 {
        return 0.0;
    }
    n as f32 / d as f32
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
