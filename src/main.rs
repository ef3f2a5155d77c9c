use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use veo_storyboard::api::GeminiClient;
use veo_storyboard::app::App;
use veo_storyboard::config::Config;
use veo_storyboard::scene::{AspectRatio, ScriptStyle};
use veo_storyboard::video::{RenderPhase, SceneUpdate};

#[derive(Parser, Debug)]
#[command(name = "veo-storyboard")]
#[command(about = "Write a video script with Gemini and render every scene with Veo", long_about = None)]
struct Args {
    /// Script idea
    #[arg(short, long)]
    idea: Option<String>,

    /// Read the script idea from a file
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Script style (Cinematic, Documentary, Vlog, Commercial, Sci-Fi, Fantasy, Comedy)
    #[arg(short, long, default_value = "Cinematic")]
    style: ScriptStyle,

    /// Aspect ratio shared by every scene (16:9 or 9:16)
    #[arg(short, long, default_value = "16:9")]
    aspect_ratio: AspectRatio,

    /// Directory where clips are staged while rendering
    #[arg(short = 'w', long, default_value = "./output/.staging")]
    work_dir: PathBuf,

    /// Directory for the finished clips
    #[arg(short, long, default_value = "./output")]
    output_dir: PathBuf,

    /// Gemini API key (defaults to GEMINI_API_KEY / API_KEY)
    #[arg(long)]
    api_key: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    let args = Args::parse();

    let config = match args.api_key.clone() {
        Some(key) => Config::load(Some(key)),
        None => Config::from_env(),
    }
    .context("Failed to load configuration")?
    .with_work_dir(args.work_dir.clone());

    let idea = if let Some(idea) = args.idea.clone() {
        idea
    } else if let Some(path) = &args.file {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read file: {}", path.display()))?
    } else {
        anyhow::bail!("Either --idea or --file must be provided");
    };

    tokio::fs::create_dir_all(&args.output_dir)
        .await
        .context("Failed to create output directory")?;

    let failed_scenes = run(&config, &args, &idea).await?;
    if failed_scenes > 0 {
        anyhow::bail!("{} scene(s) failed to render", failed_scenes);
    }

    info!("All scenes rendered successfully!");
    Ok(())
}

/// Generate, render and save. Returns the number of failed scenes.
async fn run(config: &Config, args: &Args, idea: &str) -> anyhow::Result<usize> {
    let client = Arc::new(GeminiClient::new(config)?);
    let mut app = App::from_config(client.clone(), config);

    info!("Step 1/3: Generating {} script...", args.style);
    if let Err(e) = app.generate_script(&*client, idea, args.style).await {
        error!("Script generation failed: {}", e);
        return Err(e.into());
    }

    if let Some(script) = app.script() {
        info!("Title: {}", script.title);
        info!("Description: {}", script.description);
        for scene in &script.scenes {
            info!("Scene {} [{}]: {}", scene.scene_number, scene.setting, scene.description);
        }
    }

    info!("Step 2/3: Rendering scenes at {}...", args.aspect_ratio);
    app.session_mut()
        .context("Rendering view is not available")?
        .set_aspect_ratio(args.aspect_ratio)?;
    app.render_all()?;

    let session = app.session_mut().context("Rendering view is not available")?;
    while let Some(update) = session.next_update().await {
        match update {
            SceneUpdate::Progress { scene_number, percent } => {
                info!("Scene {} progress: {}%", scene_number, percent)
            }
            SceneUpdate::Succeeded { scene_number } => info!("Scene {} rendered", scene_number),
            SceneUpdate::Failed { scene_number, message } => {
                warn!("Scene {} failed: {}", scene_number, message)
            }
        }
    }

    info!("Step 3/3: Saving clips...");
    let rendered: Vec<u32> = session
        .jobs()
        .filter(|j| j.phase() == RenderPhase::Succeeded)
        .map(|j| j.scene_number())
        .collect();
    for scene_number in rendered {
        let dest = args.output_dir.join(format!("scene_{}.mp4", scene_number));
        match session.persist_result(scene_number, &dest).await {
            Ok(path) => info!("Scene {} saved to {}", scene_number, path.display()),
            Err(e) => error!("Failed to save scene {}: {}", scene_number, e),
        }
    }

    for err in session.errors() {
        error!("{}", err);
    }
    let failed = session.errors().len();

    // discards the session and releases anything still staged
    app.reset();
    Ok(failed)
}
