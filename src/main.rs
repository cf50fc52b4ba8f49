use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use docuforge::api::gemini::GeminiClient;
use docuforge::api::Generator;
use docuforge::config::Config;
use docuforge::language::Language;
use docuforge::pipeline;
use docuforge::script::{GenerateOutcome, ScriptController};
use docuforge::session::{SceneImageState, Session, SessionAction};
use docuforge::store::{InputMode, ProjectStore};

#[derive(Parser)]
#[command(name = "docuforge", about = "AI documentary-script studio", version)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "config.json", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a script and its derived assets from a source text file.
    Generate {
        /// File holding the source text (or the idea, with --idea).
        input: PathBuf,
        /// Treat the input as a one-line idea and expand it via a logline.
        #[arg(long)]
        idea: bool,
        /// Target language code: BR, EN or ES.
        #[arg(long, default_value = "BR")]
        lang: String,
        /// Also render the thumbnail image from the generated prompt.
        #[arg(long)]
        thumbnail_image: bool,
        /// Render images for the first N scene prompts, concurrently.
        #[arg(long, default_value_t = 0)]
        scene_images: usize,
        /// Skip saving the finished project to the store.
        #[arg(long)]
        no_save: bool,
    },
    /// Generate a one-sentence logline from an idea.
    Logline {
        idea: String,
        #[arg(long, default_value = "BR")]
        lang: String,
    },
    /// List saved projects, most recently updated first.
    List,
    /// Print a saved project's script and assets.
    Show { id: String },
    /// Translate a saved project's titles into another language.
    Translate {
        id: String,
        /// Target language code; unknown codes are an error here.
        #[arg(long)]
        lang: String,
    },
    /// Write a project's export document (title + thumbnail prompt + script).
    Export {
        id: String,
        /// Output file; defaults to stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete a saved project.
    Delete { id: String },
    /// Toggle a project between pending and completed.
    Toggle { id: String },
}

fn read_decision() -> String {
    print!("[r]etry with correction / [a]ccept as-is? ");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);
    line.trim().to_lowercase()
}

async fn run_generate(
    cfg: &Config,
    input: PathBuf,
    idea: bool,
    lang: &str,
    thumbnail_image: bool,
    scene_images: usize,
    no_save: bool,
) -> Result<()> {
    let language = Language::parse_or_default(lang);
    let client = Arc::new(GeminiClient::new(cfg)?);
    let store = ProjectStore::new(&cfg.projects_path);

    let raw = tokio::fs::read_to_string(&input)
        .await
        .with_context(|| format!("Failed to read input: {}", input.display()))?;

    let (mode, source) = if idea {
        let logline = pipeline::generate_logline(client.as_ref(), &raw, language).await?;
        println!("Logline: {logline}");
        (InputMode::Idea, logline)
    } else {
        (InputMode::SourceText, raw)
    };

    let mut session = Session::new(mode, source.clone(), language);
    let mut controller = ScriptController::new(cfg.word_band());

    let mut outcome = controller
        .generate(client.as_ref(), &source, language)
        .await?;
    loop {
        match outcome {
            GenerateOutcome::Accepted(attempt) => {
                println!("Script accepted at {} words.", attempt.word_count);
                session.apply(SessionAction::InstallScript(attempt.text));
                break;
            }
            GenerateOutcome::NeedsDecision { message, .. } => {
                println!("{message}");
                if read_decision().starts_with('r') {
                    outcome = controller
                        .retry_with_correction(client.as_ref(), &source, language)
                        .await?;
                } else {
                    let attempt = controller
                        .accept_current()
                        .context("no pending script to accept")?;
                    println!("Accepted as-is at {} words.", attempt.word_count);
                    let text = attempt.text.clone();
                    session.apply(SessionAction::InstallScript(text));
                    break;
                }
            }
        }
    }

    pipeline::generate_titles(client.as_ref(), &mut session).await?;
    println!("Titles:");
    for (i, title) in session.titles.titles.iter().enumerate() {
        println!("  {}. {title}", i + 1);
    }
    if !session.titles.titles.is_empty() {
        session.apply(SessionAction::ChooseTitle(Some(0)));
    }

    pipeline::generate_thumbnail_prompt(client.as_ref(), &mut session).await?;
    println!(
        "Thumbnail prompt:\n  {}",
        session.thumbnail_prompt.as_deref().unwrap_or_default()
    );
    if thumbnail_image {
        pipeline::generate_thumbnail_image(client.as_ref(), &mut session).await?;
        println!(
            "Thumbnail image: {} bytes",
            session.thumbnail_image.as_deref().map(|b| b.len()).unwrap_or(0)
        );
    }

    pipeline::generate_scene_prompts(client.as_ref(), &mut session, cfg.scene_count).await?;
    println!("Scene prompts: {}", session.scene_prompts.len());

    pipeline::generate_video_prompts(client.as_ref(), &mut session).await?;
    println!("Video prompts: {}", session.video_prompts.len());

    if scene_images > 0 {
        let wanted: Vec<(usize, String)> = session
            .scene_prompts
            .iter()
            .take(scene_images)
            .cloned()
            .enumerate()
            .collect();
        let client_dyn: Arc<dyn Generator> = client.clone();
        let results = pipeline::fan_out_scene_images(client_dyn, wanted).await;
        for (index, result) in results {
            let state = match result {
                Ok(bytes) => {
                    println!("Scene {index}: image {} bytes", bytes.len());
                    SceneImageState::Ready(bytes)
                }
                Err(e) => {
                    println!("Scene {index}: failed ({e})");
                    SceneImageState::Failed(e.to_string())
                }
            };
            session.apply(SessionAction::SetSceneImage(index, state));
        }
    }

    if !no_save {
        match store.save(&mut session) {
            Ok(project) => println!("Saved project {} ({})", project.id, project.title),
            Err(e) => println!("Save skipped: {e}"),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let cfg = Config::load(&cli.config).await?;

    match cli.command {
        Command::Generate {
            input,
            idea,
            lang,
            thumbnail_image,
            scene_images,
            no_save,
        } => {
            run_generate(&cfg, input, idea, &lang, thumbnail_image, scene_images, no_save).await?;
        }
        Command::Logline { idea, lang } => {
            let client = GeminiClient::new(&cfg)?;
            let language = Language::parse_or_default(&lang);
            let logline = pipeline::generate_logline(&client, &idea, language).await?;
            println!("{logline}");
        }
        Command::List => {
            let store = ProjectStore::new(&cfg.projects_path);
            let mut projects = store.list();
            projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            for p in projects {
                println!(
                    "{}  {:?}  {}  {}",
                    p.id,
                    p.status,
                    p.updated_at.format("%Y-%m-%d %H:%M"),
                    p.title
                );
            }
        }
        Command::Show { id } => {
            let store = ProjectStore::new(&cfg.projects_path);
            let project = store.get(&id).with_context(|| format!("no project '{id}'"))?;
            println!("{}", serde_json::to_string_pretty(&project)?);
        }
        Command::Translate { id, lang } => {
            let target = Language::parse(&lang)
                .with_context(|| format!("unsupported language code: {lang}"))?;
            let client = GeminiClient::new(&cfg)?;
            let store = ProjectStore::new(&cfg.projects_path);
            let mut session = Session::default();
            store.load_into(&id, &mut session)?;
            pipeline::translate_titles(&client, &mut session, target).await?;
            if let Err(e) = store.save(&mut session) {
                println!("Save skipped: {e}");
            }
            for title in &session.titles.titles {
                println!("{title}");
            }
        }
        Command::Export { id, out } => {
            let store = ProjectStore::new(&cfg.projects_path);
            let mut session = Session::default();
            store.load_into(&id, &mut session)?;
            let doc = session
                .export_document()
                .context("project needs a chosen title, a thumbnail prompt and a script")?;
            match out {
                Some(path) => {
                    tokio::fs::write(&path, doc).await?;
                    println!("Exported to {}", path.display());
                }
                None => println!("{doc}"),
            }
        }
        Command::Delete { id } => {
            let store = ProjectStore::new(&cfg.projects_path);
            let mut session = Session::default();
            store.delete(&id, &mut session)?;
            println!("Deleted {id}");
        }
        Command::Toggle { id } => {
            let store = ProjectStore::new(&cfg.projects_path);
            let status = store.toggle_status(&id)?;
            println!("{id} -> {status:?}");
        }
    }

    Ok(())
}
