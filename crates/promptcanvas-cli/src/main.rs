use std::fs;
use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use promptcanvas_contracts::catalog::{Category, PromptCatalog, StyleDescriptor};
use promptcanvas_contracts::chat::{parse_intent, Intent, SESSION_HELP_COMMANDS};
use promptcanvas_contracts::errors::{CanvasError, Severity};
use promptcanvas_contracts::events::SessionJournal;
use promptcanvas_contracts::history::DISPLAY_CAP;
use promptcanvas_contracts::request::{GenerationRequest, MAX_IMAGE_COUNT};
use promptcanvas_contracts::response::ImagePayload;
use promptcanvas_engine::media::{download_file_name, mime_for_path, upload};
use promptcanvas_engine::{
    build_backends, ActionOutcome, BackendKind, EngineConfig, PromptComposer, SessionContext,
    Studio,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "promptcanvas",
    version,
    about = "Compose, refine and generate images from short instructions"
)]
struct Cli {
    /// vertex, stability or dryrun (overrides PROMPTCANVAS_BACKEND)
    #[arg(long, global = true)]
    backend: Option<BackendKind>,
    /// JSON file merged over the built-in prompt catalog
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate images from an instruction.
    Generate(GenerateArgs),
    /// Edit an existing image.
    Edit(EditArgs),
    /// Print the composed prompt and its refined version.
    Refine(RefineArgs),
    /// List categories, styles and their templates.
    Catalog,
    /// Interactive session with history.
    Session(SessionArgs),
}

#[derive(Debug, Args)]
struct PromptArgs {
    #[arg(long, default_value = "general")]
    category: Category,
    #[arg(long, default_value = "none")]
    style: StyleDescriptor,
}

#[derive(Debug, Args)]
struct OutputArgs {
    #[arg(long, default_value = ".")]
    out: PathBuf,
    /// Append action events to this JSONL file.
    #[arg(long)]
    events: Option<PathBuf>,
    /// Refine the composed prompt with the text model first.
    #[arg(long)]
    refine: bool,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    instruction: String,
    #[command(flatten)]
    prompt: PromptArgs,
    #[arg(long, default_value_t = 1)]
    count: u8,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Debug, Args)]
struct EditArgs {
    instruction: String,
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    mask: Option<PathBuf>,
    #[command(flatten)]
    prompt: PromptArgs,
    #[arg(long, default_value_t = 1)]
    count: u8,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Debug, Args)]
struct RefineArgs {
    instruction: String,
    #[command(flatten)]
    prompt: PromptArgs,
}

#[derive(Debug, Args)]
struct SessionArgs {
    #[command(flatten)]
    prompt: PromptArgs,
    #[command(flatten)]
    output: OutputArgs,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("promptcanvas error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let mut config = EngineConfig::from_env().context("invalid configuration")?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if cli.catalog.is_some() {
        config.catalog_path = cli.catalog.clone();
    }
    tracing::debug!(
        backend = config.backend.name(),
        region = %config.region,
        image_model = %config.image_model,
        "configuration resolved"
    );
    let catalog = PromptCatalog::load(config.catalog_path.as_deref());

    match cli.command {
        Command::Generate(args) => {
            let request = GenerationRequest::new(
                args.instruction,
                args.prompt.category,
                args.prompt.style,
            );
            run_one_shot(&config, catalog, request, args.count, &args.output)
        }
        Command::Edit(args) => {
            let mut request = GenerationRequest::new(
                args.instruction,
                args.prompt.category,
                args.prompt.style,
            )
            .with_base_image(read_upload(&args.image)?);
            if let Some(mask) = args.mask.as_deref() {
                request = request.with_mask(read_upload(mask)?);
            }
            run_one_shot(&config, catalog, request, args.count, &args.output)
        }
        Command::Refine(args) => run_refine(&config, catalog, args),
        Command::Catalog => {
            print_catalog(&catalog, &mut io::stdout())?;
            Ok(0)
        }
        Command::Session(args) => run_session(&config, catalog, args),
    }
}

fn build_studio(
    config: &EngineConfig,
    catalog: PromptCatalog,
    output: &OutputArgs,
    session: &SessionContext,
) -> Result<Studio> {
    let backends = build_backends(config)
        .with_context(|| format!("failed to set up the {} backend", config.backend.name()))?;
    let journal = output
        .events
        .as_ref()
        .map(|path| SessionJournal::new(path, session.session_id.clone()));
    let mut studio = Studio::new(PromptComposer::new(catalog), backends.image)
        .with_refiner(backends.refiner)
        .with_journal(journal);
    studio.set_refine(output.refine);
    Ok(studio)
}

fn run_one_shot(
    config: &EngineConfig,
    catalog: PromptCatalog,
    request: GenerationRequest,
    count: u8,
    output: &OutputArgs,
) -> Result<i32> {
    let mut session = SessionContext::new();
    let studio = build_studio(config, catalog, output, &session)?;
    let category = request.category;
    let style = request.style;

    let outcome = match request
        .with_count(count)
        .and_then(|request| studio.generate(&mut session, request))
    {
        Ok(outcome) => outcome,
        Err(err) => return Ok(report_action_error(&err, &mut io::stderr())),
    };
    let written = write_outputs(&output.out, category, style, &outcome)?;
    print_outcome(&outcome, &written, &mut io::stdout())?;
    Ok(0)
}

fn run_refine(config: &EngineConfig, catalog: PromptCatalog, args: RefineArgs) -> Result<i32> {
    let composer = PromptComposer::new(catalog);
    let composed = composer.compose(&args.instruction, args.prompt.category, args.prompt.style);
    let composed = match composed {
        Ok(prompt) => prompt,
        Err(err) => return Ok(report_action_error(&err, &mut io::stderr())),
    };
    println!("Composed prompt:\n{composed}\n");

    let backends = build_backends(config)
        .with_context(|| format!("failed to set up the {} backend", config.backend.name()))?;
    let Some(refiner) = backends.refiner else {
        eprintln!(
            "warning: no text model is configured for the {} backend",
            config.backend.name()
        );
        return Ok(0);
    };
    match refiner.refine_text(composed.as_str()) {
        Ok(refined) => {
            println!("Refined prompt:\n{}", refined.trim());
            Ok(0)
        }
        Err(err) => Ok(report_action_error(&err, &mut io::stderr())),
    }
}

fn read_upload(path: &Path) -> Result<ImagePayload> {
    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    Ok(upload(bytes, mime_for_path(path)))
}

/// Writes every output image under `out_dir` and returns the paths in order.
fn write_outputs(
    out_dir: &Path,
    category: Category,
    style: StyleDescriptor,
    outcome: &ActionOutcome,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let stamp = Utc::now();
    let several = outcome.images.len() > 1;
    let mut written = Vec::with_capacity(outcome.images.len());
    for (idx, image) in outcome.images.iter().enumerate() {
        let index = several.then_some(idx);
        let name = download_file_name(category, style, stamp, index, &image.mime_type);
        let path = out_dir.join(name);
        fs::write(&path, &image.bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

fn print_outcome(outcome: &ActionOutcome, written: &[PathBuf], out: &mut impl Write) -> Result<()> {
    if let Some(original) = &outcome.original {
        writeln!(out, "Before: uploaded image ({} bytes)", original.len())?;
    }
    for path in written {
        writeln!(out, "Saved {}", path.display())?;
    }
    for warning in &outcome.warnings {
        writeln!(out, "warning: {warning}")?;
    }
    Ok(())
}

/// Prints the user-facing message and returns the exit code for one-shot runs.
fn report_action_error(err: &CanvasError, out: &mut impl Write) -> i32 {
    let (label, code) = match err.severity() {
        Severity::Warning => ("warning", 2),
        Severity::Error => ("error", 1),
    };
    let _ = writeln!(out, "{label}: {}", err.user_message());
    code
}

fn print_catalog(catalog: &PromptCatalog, out: &mut impl Write) -> Result<()> {
    writeln!(out, "Categories:")?;
    for category in Category::ALL {
        writeln!(out, "  {:<10} {}", category.key(), catalog.template(category))?;
    }
    writeln!(out, "Styles:")?;
    for style in StyleDescriptor::ALL {
        let clause = catalog.clause(style).unwrap_or("(no style clause)");
        writeln!(out, "  {:<18} {}", style.key(), clause)?;
    }
    Ok(())
}

/// Settings the interactive session carries between actions.
#[derive(Debug, Clone)]
struct SessionSettings {
    category: Category,
    style: StyleDescriptor,
    count: u8,
    out_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn run_session(config: &EngineConfig, catalog: PromptCatalog, args: SessionArgs) -> Result<i32> {
    let mut session = SessionContext::new();
    let mut studio = build_studio(config, catalog, &args.output, &session)?;
    let mut settings = SessionSettings {
        category: args.prompt.category,
        style: args.prompt.style,
        count: 1,
        out_dir: args.output.out.clone(),
    };
    studio.record_session_started();

    println!(
        "PromptCanvas session started ({} backend). Type /help for commands.",
        studio.backend_name()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();
    loop {
        print!("[{} · {}] > ", settings.category.label(), settings.style.label());
        stdout.flush()?;

        line.clear();
        let read = match stdin.lock().read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        let flow = handle_intent(&intent, &mut studio, &mut session, &mut settings, &mut stdout)?;
        if flow == Flow::Quit {
            break;
        }
    }
    Ok(0)
}

/// Applies one session line. Action errors are reported and never end the session.
fn handle_intent(
    intent: &Intent,
    studio: &mut Studio,
    session: &mut SessionContext,
    settings: &mut SessionSettings,
    out: &mut impl Write,
) -> Result<Flow> {
    match intent.action.as_str() {
        "noop" => {}
        "help" => writeln!(out, "Commands: {}", SESSION_HELP_COMMANDS.join(" "))?,
        "quit" => return Ok(Flow::Quit),
        "set_category" => match intent.arg("value").map(str::parse::<Category>) {
            Some(Ok(category)) => {
                settings.category = category;
                writeln!(out, "Category set to {category}")?;
            }
            Some(Err(message)) => writeln!(out, "warning: {message}")?,
            None => writeln!(out, "Category: {}", settings.category)?,
        },
        "set_style" => match intent.arg("value").map(str::parse::<StyleDescriptor>) {
            Some(Ok(style)) => {
                settings.style = style;
                writeln!(out, "Style set to {style}")?;
            }
            Some(Err(message)) => writeln!(out, "warning: {message}")?,
            None => writeln!(out, "Style: {}", settings.style)?,
        },
        "set_count" => match intent.arg("value").map(str::parse::<u8>) {
            Some(Ok(count)) if (1..=MAX_IMAGE_COUNT).contains(&count) => {
                settings.count = count;
                writeln!(out, "Images per action: {count}")?;
            }
            Some(_) => writeln!(out, "warning: /count takes a number from 1 to {MAX_IMAGE_COUNT}")?,
            None => writeln!(out, "Images per action: {}", settings.count)?,
        },
        "set_active_image" => {
            let Some(path) = intent.arg("path") else {
                writeln!(out, "/use requires a path")?;
                return Ok(Flow::Continue);
            };
            match read_upload(Path::new(path)) {
                Ok(image) => {
                    writeln!(out, "Active image set to {path} ({})", image.mime_type)?;
                    session.active_image = Some(image);
                    session.active_mask = None;
                }
                Err(err) => writeln!(out, "warning: {err:#}")?,
            }
        }
        "set_mask" => {
            let Some(path) = intent.arg("path") else {
                writeln!(out, "/mask requires a path")?;
                return Ok(Flow::Continue);
            };
            if session.active_image.is_none() {
                writeln!(out, "warning: set an image with /use before adding a mask")?;
                return Ok(Flow::Continue);
            }
            match read_upload(Path::new(path)) {
                Ok(mask) => {
                    session.active_mask = Some(mask);
                    writeln!(out, "Mask set to {path}")?;
                }
                Err(err) => writeln!(out, "warning: {err:#}")?,
            }
        }
        "clear_active_image" => {
            session.clear_active_image();
            writeln!(out, "Active image cleared; plain text now generates new images.")?;
        }
        "set_output_dir" => match intent.arg("path") {
            Some(path) => {
                settings.out_dir = PathBuf::from(path);
                writeln!(out, "Output directory set to {path}")?;
            }
            None => writeln!(out, "Output directory: {}", settings.out_dir.display())?,
        },
        "toggle_refine" => {
            if !studio.refine_available() {
                writeln!(out, "warning: no text model is configured for this backend")?;
            } else {
                let enabled = !studio.refine_enabled();
                studio.set_refine(enabled);
                writeln!(out, "Prompt refinement {}", if enabled { "on" } else { "off" })?;
            }
        }
        "show_history" => {
            let limit = match intent.arg("value") {
                Some(raw) => match raw.parse::<usize>() {
                    Ok(value) => value.min(DISPLAY_CAP),
                    Err(_) => {
                        writeln!(out, "warning: /history takes a number")?;
                        return Ok(Flow::Continue);
                    }
                },
                None => DISPLAY_CAP,
            };
            print_history(session, limit, out)?;
        }
        "list_categories" => {
            for category in Category::ALL {
                writeln!(out, "  {} ({})", category.key(), category.label())?;
            }
        }
        "list_styles" => {
            for style in StyleDescriptor::ALL {
                writeln!(out, "  {} ({})", style.key(), style.label())?;
            }
        }
        "generate" => {
            let Some(prompt) = intent.prompt.as_deref() else {
                return Ok(Flow::Continue);
            };
            run_session_action(prompt, studio, session, settings, out)?;
        }
        "unknown" => {
            let command = intent.arg("command").unwrap_or_default();
            writeln!(out, "Unknown command /{command}. Type /help for commands.")?;
        }
        other => bail!("unhandled session action '{other}'"),
    }
    Ok(Flow::Continue)
}

fn run_session_action(
    prompt: &str,
    studio: &Studio,
    session: &mut SessionContext,
    settings: &SessionSettings,
    out: &mut impl Write,
) -> Result<()> {
    let mut request = GenerationRequest::new(prompt, settings.category, settings.style);
    if let Some(image) = session.active_image.clone() {
        request = request.with_base_image(image);
        if let Some(mask) = session.active_mask.clone() {
            request = request.with_mask(mask);
        }
    }
    let result = request
        .with_count(settings.count)
        .and_then(|request| studio.generate(session, request));
    match result {
        Ok(outcome) => {
            match write_outputs(&settings.out_dir, settings.category, settings.style, &outcome) {
                Ok(written) => print_outcome(&outcome, &written, out)?,
                Err(err) => writeln!(out, "error: {err:#}")?,
            }
        }
        Err(err) => {
            report_action_error(&err, out);
        }
    }
    Ok(())
}

fn print_history(session: &SessionContext, limit: usize, out: &mut impl Write) -> Result<()> {
    if session.history.is_empty() {
        writeln!(out, "No images yet.")?;
        return Ok(());
    }
    for (idx, entry) in session.history.recent(limit).into_iter().enumerate() {
        let kind = if entry.original_image().is_some() { "edit" } else { "new" };
        let first_line = entry.prompt_used().lines().next().unwrap_or_default();
        writeln!(
            out,
            "{:>2}. {} [{}] {} bytes  {}",
            idx + 1,
            entry.timestamp().format("%H:%M:%S"),
            kind,
            entry.output_image().len(),
            first_line
        )?;
    }
    writeln!(out, "({} total)", session.history.len())?;
    Ok(())
}
