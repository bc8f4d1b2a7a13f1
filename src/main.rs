use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use sceneview::app::ViewerApp;
use sceneview::scene;

/// Loads a hierarchical scene document and displays it with an orbiting
/// camera and multisampled rendering.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the scene document to display
    model: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let loaded = scene::load_model(&args.model)
        .with_context(|| format!("failed to load scene `{}`", args.model.display()))?;
    log::info!(
        "loaded `{}`: {} parts, {} triangles",
        args.model.display(),
        loaded.parts.len(),
        loaded.triangle_count()
    );

    ViewerApp::new(loaded)?.run()
}
