use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use csvchart::{ChartRequest, ChartService, SessionId, Settings};

/// Inspect CSV files and render charts from them.
#[derive(Parser, Debug)]
#[command(name = "csvchart", version, about)]
struct Cli {
    /// JSON settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print column kinds and chart suggestions
    Inspect {
        file: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Render one chart to PNG (when OUT ends in .png) or HTML
    Render {
        file: PathBuf,

        /// line, bar, scatter, histogram, box or pie
        #[arg(long)]
        chart: String,

        #[arg(long)]
        x: Option<String>,

        #[arg(long)]
        y: Option<String>,

        /// Column that splits rows into coloured groups
        #[arg(long)]
        color: Option<String>,

        /// sum, mean, count, min or max
        #[arg(long)]
        agg: Option<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        palette: Option<String>,

        /// Output path; defaults to a timestamped PNG name
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    let service = ChartService::new(settings);

    match cli.command {
        Command::Inspect { file, json } => inspect(&service, &file, json),
        Command::Render {
            file,
            chart,
            x,
            y,
            color,
            agg,
            title,
            palette,
            out,
        } => {
            let request = ChartRequest {
                chart: Some(chart),
                x,
                y,
                color,
                agg,
                title,
                palette,
            };
            render(&service, &file, request, out)
        }
    }
}

fn upload(service: &ChartService, file: &Path) -> Result<SessionId> {
    let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    service
        .upload(&bytes)
        .with_context(|| format!("loading {}", file.display()))
}

fn inspect(service: &ChartService, file: &Path, json: bool) -> Result<()> {
    let id = upload(service, file)?;
    let kinds = service.kinds(id)?;
    let suggestions = service.suggestions(id)?;

    if json {
        let report = serde_json::json!({ "columns": kinds, "suggestions": suggestions });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let width = kinds.keys().map(|k| k.chars().count()).max().unwrap_or(0);
    println!("Columns:");
    for (name, kind) in &kinds {
        println!("  {name:<width$}  {kind}");
    }
    println!("Suggestions:");
    if suggestions.is_empty() {
        println!("  (none)");
    }
    for s in &suggestions {
        let chart = s.chart.label();
        match &s.y {
            Some(y) => println!("  {chart:<9}  x={}  y={y}", s.x),
            None => println!("  {chart:<9}  x={}", s.x),
        }
    }
    Ok(())
}

fn render(
    service: &ChartService,
    file: &Path,
    request: ChartRequest,
    out: Option<PathBuf>,
) -> Result<()> {
    let spec = request.into_spec()?;
    let id = upload(service, file)?;

    let is_png = |p: &Path| {
        p.extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
    };
    let path = match out {
        Some(path) if !is_png(&path) => {
            let html = service.render_chart(id, &spec)?;
            std::fs::write(&path, html).with_context(|| format!("writing {}", path.display()))?;
            path
        }
        out => {
            let export = service.export_chart(id, &spec)?;
            let path = out.unwrap_or_else(|| PathBuf::from(&export.filename));
            std::fs::write(&path, &export.bytes)
                .with_context(|| format!("writing {}", path.display()))?;
            path
        }
    };
    info!("wrote {}", path.display());
    println!("{}", path.display());
    Ok(())
}
