use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use std::sync::Arc;
use voxturn::audio::Microphone;
use voxturn::cli::{Cli, Commands, ConfigAction};
use voxturn::config::Config;
use voxturn::coordinator::UserAction;
use voxturn::keywords::{KeywordClassifier, KeywordVerdict};
use voxturn::playback::SilentOutput;
use voxturn::presenter::{ConsolePresenter, NullPresenter, Presenter};
use voxturn::runtime::{RuntimeParts, TurnRuntime};
use voxturn::transport::ChannelTransport;
use voxturn::transport::stdio::{pump_inbound, pump_outbound};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    match cli.command {
        Commands::Run {
            device,
            model,
            language,
            no_auto_listen,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(device) = device {
                config.audio.device = Some(device);
            }
            if let Some(language) = language {
                config.keywords.language = language;
            }
            if no_auto_listen {
                config.listening.auto_listen = false;
            }
            config.validate()?;
            run_conversation(config, model, cli.quiet, cli.verbose).await?;
        }
        Commands::Classify { text, language } => {
            let config = load_config(cli.config.as_deref())?;
            let language = language.unwrap_or_else(|| config.keywords.language.clone());
            let classifier = KeywordClassifier::from_lists(&config.keywords.lists_for(&language));
            let matched = classifier.classify(&text);
            let verdict = match matched.verdict() {
                KeywordVerdict::Stop => "stop".red().bold().to_string(),
                KeywordVerdict::Interrupt => "interrupt".yellow().bold().to_string(),
                KeywordVerdict::None => "none".dimmed().to_string(),
            };
            println!("{}", verdict);
            if cli.verbose > 0 {
                println!(
                    "  language: {}, stop: {}, interrupt: {}",
                    language, matched.stop, matched.interrupt
                );
            }
        }
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => {
                let config = load_config(cli.config.as_deref())?;
                let rendered =
                    toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
                print!("{}", rendered);
            }
            ConfigAction::Path => match cli.config.or_else(Config::default_path) {
                Some(path) => println!("{}", path.display()),
                None => anyhow::bail!("No configuration directory on this platform"),
            },
        },
        #[cfg(feature = "cpal-audio")]
        Commands::Devices => {
            let devices = voxturn::audio::capture::list_devices()?;
            if devices.is_empty() {
                eprintln!("No audio input devices found");
                std::process::exit(1);
            }
            println!("Available audio input devices:");
            for (idx, device) in devices.iter().enumerate() {
                println!("  [{}] {}", idx, device);
            }
        }
    }

    Ok(())
}

/// Logs go to stderr; stdout carries protocol lines.
fn init_logging(quiet: bool, verbose: u8) {
    let default_filter = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "voxturn=info",
        (false, _) => "voxturn=debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/voxturn/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = match (custom_path, Config::default_path()) {
        (Some(path), _) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        (None, Some(path)) => Config::load_or_default(&path)?,
        (None, None) => Config::default(),
    };
    Ok(config.with_env_overrides())
}

fn microphone(config: &Config) -> Arc<dyn Microphone> {
    #[cfg(feature = "cpal-audio")]
    {
        Arc::new(voxturn::audio::CpalMicrophone::new(
            config.audio.device.clone(),
            config.audio.sample_rate,
        ))
    }
    #[cfg(not(feature = "cpal-audio"))]
    {
        if config.audio.device.is_some() {
            tracing::warn!("Built without cpal-audio, ignoring the configured device");
        }
        tracing::warn!("Built without cpal-audio, the microphone only hears silence");
        Arc::new(voxturn::audio::ScriptedMicrophone::silent())
    }
}

async fn run_conversation(
    config: Config,
    model: Option<String>,
    quiet: bool,
    verbose: u8,
) -> Result<()> {
    let (transport, commands) = ChannelTransport::channel();
    let writer = tokio::spawn(pump_outbound(tokio::io::stdout(), commands));

    let presenter: Box<dyn Presenter> = if quiet {
        Box::new(NullPresenter)
    } else {
        Box::new(ConsolePresenter::new(verbose > 0))
    };

    let runtime = TurnRuntime::new(
        &config,
        RuntimeParts {
            transport: Box::new(transport),
            microphone: microphone(&config),
            output: Arc::new(SilentOutput::default()),
            presenter,
        },
    );
    let handle = runtime.handle();
    let conversation = tokio::spawn(runtime.run());

    if let Some(model) = model {
        handle.user(UserAction::ChangeModel(model));
    }

    let reader_handle = handle.clone();
    tokio::spawn(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let forwarded =
            pump_inbound(stdin, reader_handle.signals(), reader_handle.cancellation()).await;
        tracing::info!("Server stream ended after {} events", forwarded);
        reader_handle.shutdown();
    });

    let interrupt_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt_handle.shutdown();
        }
    });

    let coordinator = conversation
        .await
        .context("Conversation task panicked")?;
    if !quiet {
        eprintln!(
            "{} {} messages",
            "Conversation ended:".bold(),
            coordinator.conversation().len()
        );
    }

    // Dropping the coordinator closes the command channel and lets the writer finish
    drop(coordinator);
    writer.await.context("Command writer panicked")??;
    Ok(())
}
