use anyhow::{bail, Context};
use clap::Parser;
use restyle_lib::{EditDelta, EditorSession};
use std::path::PathBuf;

const RESTYLE_INTRO: &str = r#"
    ┌─┐┌─┐┌─┐┌┬┐┬ ┬┬  ┌─┐
    ├┬┘├┤ └─┐ │ └┬┘│  ├┤
    ┴└─└─┘└─┘ ┴  ┴ ┴─┘└─┘

    restyle - replay style edits onto markup and export the result
"#;

#[derive(Parser)]
#[command(name = "restyle")]
#[command(about = "Apply recorded style edits to HTML/CSS files and export standalone copies")]
struct Args {
    /// Input files: at least one .html plus any number of .css files.
    inputs: Vec<PathBuf>,

    /// JSON edit script: an array of { "selector", "property", "value" }
    /// objects, applied in order. The reserved property "text-content"
    /// (or "textContent") replaces node text.
    #[arg(short, long)]
    edits: Option<PathBuf>,

    /// Output directory for the exported files.
    #[arg(short, long, default_value = "restyled")]
    out: PathBuf,

    /// Also write a JSON report of the applied modifications.
    #[arg(long)]
    report: bool,

    /// Also write a stylesheet holding only the modifications.
    #[arg(long)]
    modifications_css: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    println!("{}", RESTYLE_INTRO);

    let args: Args = Args::parse();
    if args.inputs.is_empty() {
        bail!("no input files given");
    }

    let mut session = EditorSession::new();
    let rejected = session
        .ingest_paths(&args.inputs)
        .await
        .context("upload batch failed")?;
    for rejection in &rejected {
        eprintln!("skipped: {}", rejection);
    }

    if let Some(script) = &args.edits {
        let raw = tokio::fs::read_to_string(script)
            .await
            .with_context(|| format!("failed to read {}", script.display()))?;
        let deltas: Vec<EditDelta> =
            serde_json::from_str(&raw).context("edit script is not a JSON array of edits")?;
        log::info!("applying {} edits", deltas.len());
        for delta in &deltas {
            session.apply(delta);
        }
    }

    let outcome = session.export().context("export failed")?;
    tokio::fs::create_dir_all(&args.out)
        .await
        .with_context(|| format!("cannot create {}", args.out.display()))?;
    for file in &outcome.files {
        let path = args.out.join(&file.name);
        tokio::fs::write(&path, &file.content)
            .await
            .with_context(|| format!("cannot write {}", path.display()))?;
        println!("wrote {}", path.display());
    }
    for error in &outcome.errors {
        eprintln!("export error: {}", error);
    }

    if args.report {
        let report = restyle_lib::export::export_report(session.documents());
        let path = args.out.join("restyle-report.json");
        tokio::fs::write(&path, serde_json::to_string_pretty(&report)?).await?;
        println!("wrote {}", path.display());
    }
    if args.modifications_css {
        if let Some(css) = restyle_lib::export::export_modifications_css(session.documents()) {
            let path = args.out.join("restyle-modifications.css");
            tokio::fs::write(&path, css).await?;
            println!("wrote {}", path.display());
        } else {
            println!("no modifications to export");
        }
    }

    Ok(())
}
