use anyhow::{Context, Result};
use clap::Parser;
use secrecy::SecretString;
use session_zero::capture::CpalCapture;
use session_zero::config::{Config, OracleProvider, STATUS_RESTORE_DELAY};
use session_zero::console::{self, Action, View};
use session_zero::deepgram_adapter::DeepgramTranscriber;
use session_zero::prompt_loader;
use session_zero_core::anthropic::{AnthropicConfig, AnthropicOracle};
use session_zero_core::oracle::{Mode, TurnOracle};
use session_zero_core::prompts::Prompts;
use session_zero_core::proxy::ProxyOracle;
use session_zero_core::recorder::RecordingController;
use session_zero_core::scene::InMemoryCharacterSheet;
use session_zero_core::session::GameSession;
use session_zero_core::{Command, Input, Status};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "Voice-driven Session Zero with an AI game master")]
struct Cli {
    /// "normal" builds the character first; "quick" drops straight into a scene
    #[arg(long, default_value = "normal")]
    mode: Mode,
    /// Input device name (overrides AUDIO_INPUT_DEVICE)
    #[arg(long)]
    device: Option<String>,
    /// List input devices and exit
    #[arg(long)]
    list_devices: bool,
    /// Directory of *.md prompt overrides
    #[arg(long)]
    prompts: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Parse Command-Line Arguments ---
    let args = Cli::parse();
    if args.list_devices {
        println!("{}", session_zero_native_utils::device::get_available_inputs()?);
        return Ok(());
    }

    // --- 2. Load Configuration ---
    let mut config = Config::from_env().context("Failed to load application configuration")?;

    // --- 3. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
    tracing::info!("Configuration loaded. Using {:?} oracle.", config.provider);

    // --- 4. Load Prompts ---
    let prompts = prompt_loader::prompt_set(args.prompts.as_deref())
        .context("Failed to load GM prompts")?;

    // --- 5. Initialize API Clients ---
    match config.provider {
        OracleProvider::Anthropic => {
            let api_key = config
                .anthropic_api_key
                .take()
                .context("ANTHROPIC_API_KEY is not set")?;
            let deepgram_key = config
                .deepgram_api_key
                .take()
                .context("DEEPGRAM_API_KEY is not set")?;
            let oracle = AnthropicOracle::new(
                AnthropicConfig::builder(api_key)
                    .with_model(&config.chat_model)
                    .with_max_tokens(config.max_tokens)
                    .build(),
                prompts.clone(),
            );
            run(Arc::new(oracle), deepgram_key, prompts, config, args).await
        }
        OracleProvider::Proxy => {
            let oracle = ProxyOracle::new(&config.oracle_url);
            let deepgram_key = match config.deepgram_api_key.take() {
                Some(key) => key,
                None => oracle
                    .recognition_key()
                    .await
                    .context("Failed to fetch the Deepgram key from the session API")?,
            };
            run(Arc::new(oracle), deepgram_key, prompts, config, args).await
        }
    }
}

async fn run<O: TurnOracle + 'static>(
    oracle: Arc<O>,
    deepgram_key: SecretString,
    prompts: Prompts,
    config: Config,
    args: Cli,
) -> Result<()> {
    // --- 6. Application Setup ---
    let (input_tx, input_rx) = mpsc::channel::<Input>(32);
    let (command_tx, mut command_rx) = mpsc::channel::<Command>(64);
    let (talk_tx, mut talk_rx) = mpsc::channel::<()>(8);
    let view = Arc::new(Mutex::new(View::default()));

    let session = GameSession::new(
        oracle,
        prompts,
        InMemoryCharacterSheet::default(),
        command_tx.clone(),
    );
    let mut recorder = RecordingController::new(
        CpalCapture,
        DeepgramTranscriber::new(deepgram_key),
        session.session_started(),
        input_tx.clone(),
        command_tx.clone(),
    )
    .with_device(args.device.or(config.audio_input_device))
    .with_grace(config.drain_grace);

    // The session owns all conversation state and handles one input at a time.
    let session_handle = tokio::spawn(async move {
        session.run(input_rx).await;
    });

    // Each Enter toggles the recorder between capturing and idle.
    let recorder_handle = tokio::spawn(async move {
        while talk_rx.recv().await.is_some() {
            if recorder.is_recording() {
                recorder.stop().await;
            } else if let Err(e) = recorder.start().await {
                tracing::warn!("Recording not started: {}", e);
            }
        }
    });

    // This task prints everything the core asks to show.
    let printer_view = view.clone();
    let printer_handle = tokio::spawn(async move {
        let mut restore_at: Option<Instant> = None;
        loop {
            let command = tokio::select! {
                command = command_rx.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
                _ = wait_until(restore_at) => Command::Status(Status::Ready),
            };
            restore_at = match &command {
                Command::Status(status) if status.is_transient() => {
                    Some(Instant::now() + STATUS_RESTORE_DELAY)
                }
                Command::Status(_) => None,
                _ => restore_at,
            };
            let text = match printer_view.lock() {
                Ok(mut view) => view.apply(&command),
                Err(e) => {
                    tracing::error!("Console view poisoned: {}", e);
                    break;
                }
            };
            if let Some(text) = text {
                println!("{}", text);
            }
        }
    });

    input_tx
        .send(Input::StartSession(args.mode))
        .await
        .context("Session stopped before it could start")?;
    let launch_mode = args.mode;
    println!("Press Enter to talk, Enter again to stop. /help lists commands.");

    // This task turns typed lines into session inputs.
    let console_handle = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Failed to read stdin: {}", e);
                    break;
                }
            };
            let action = console::parse_line(&line);
            let input = match action {
                Action::ToggleRecording => {
                    if talk_tx.send(()).await.is_err() {
                        break;
                    }
                    continue;
                }
                Action::Start(mode) => Some(Input::StartSession(mode.unwrap_or(launch_mode))),
                Action::Say(text) => Some(Input::PlayerUtterance(text)),
                Action::EndScene => Some(Input::EndScene),
                Action::FinishScene => Some(Input::FinishScene),
                Action::Choose(number) => lookup(&view, |v| v.choose(number), "No such choice."),
                Action::Accept => lookup(&view, View::accept, "No conclusion to accept."),
                Action::Retry => lookup(&view, View::retry, "No conclusion to retry."),
                Action::ListScenes => {
                    show(&view, |v| Some(v.scene_list()));
                    None
                }
                Action::ShowScene(number) => {
                    if !show(&view, |v| v.scene_log(number)) {
                        println!("Scene {} is not finished yet.", number);
                    }
                    None
                }
                Action::ShowSheet => {
                    show(&view, |v| Some(v.sheet_text()));
                    None
                }
                Action::Help => {
                    println!("{}", console::HELP);
                    None
                }
                Action::Quit => break,
                Action::Unknown(text) => {
                    println!("Unknown command '{}'. /help lists commands.", text);
                    None
                }
            };
            if let Some(input) = input {
                if input_tx.send(input).await.is_err() {
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = session_handle => {},
        _ = recorder_handle => {},
        _ = printer_handle => {},
        _ = console_handle => {},
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C, shutting down...");
        }
    }
    tracing::info!("Shutting down...");
    Ok(())
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn lookup(
    view: &Mutex<View>,
    f: impl FnOnce(&View) -> Option<Input>,
    missing: &str,
) -> Option<Input> {
    let input = view.lock().ok().and_then(|view| f(&view));
    if input.is_none() {
        println!("{}", missing);
    }
    input
}

fn show(view: &Mutex<View>, f: impl FnOnce(&View) -> Option<String>) -> bool {
    match view.lock().ok().and_then(|view| f(&view)) {
        Some(text) => {
            println!("{}", text);
            true
        }
        None => false,
    }
}
