//! Scripted web-chat client for functional and WAF testing.
//!
//! # Usage
//!
//! ```bash
//! # A short benign conversation
//! wafprobe --server gms.example.com --service customer-support
//!
//! # Run the full payload tables, stopping at the first block
//! wafprobe --server gms.example.com --service customer-support \
//!     --mode payload --payload-type all --stop-on-block
//!
//! # Chat by hand
//! wafprobe --server gms.example.com --service customer-support \
//!     --mode interactive
//!
//! # Let an OpenAI-compatible model hold the conversation
//! wafprobe --server gms.example.com --service customer-support \
//!     --mode external --gen-url http://localhost:8000/v1 --max-turns 5
//! ```
//!
//! The API key is read from `--api-key` or the `WAFPROBE_API_KEY`
//! environment variable; the generator's bearer token from
//! `WAFPROBE_GEN_API_KEY`.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::time::Duration;

use arrrg::CommandLine;

use wafprobe::{
    ChatClient, CompletionClient, ConversationOrchestrator, Error, GeneratedSource,
    GeneratorConfig, HttpTransport, HybridSource, InteractiveSource, MessageSource,
    PayloadCategory, PayloadSelection, PayloadSource, PlainTextReporter, ProbeArgs, ProbeConfig,
    RunOutcome, RunPolicy, StaticListSource,
};

const DEFAULT_DELAY_SECS: u64 = 2;
const DEFAULT_MAX_TURNS: usize = 10;
const DEFAULT_GEN_MODEL: &str = "gpt-4o-mini";

fn generator(args: &ProbeArgs) -> Result<CompletionClient, Error> {
    let url = args.gen_url.clone().ok_or_else(|| {
        Error::validation(
            "external and hybrid modes require --gen-url",
            Some("gen_url".to_string()),
        )
    })?;
    let model = args
        .gen_model
        .clone()
        .unwrap_or_else(|| DEFAULT_GEN_MODEL.to_string());
    let mut config = GeneratorConfig::new(url, model);
    if let Ok(api_key) = std::env::var("WAFPROBE_GEN_API_KEY") {
        config = config.with_api_key(api_key);
    }
    if let Some(system) = &args.gen_system {
        config = config.with_system_prompt(system.clone());
    }
    CompletionClient::new(config)
}

fn message_file(args: &ProbeArgs) -> Result<Vec<String>, Error> {
    let path = args.file.clone().ok_or_else(|| {
        Error::validation("this mode requires --file", Some("file".to_string()))
    })?;
    wafprobe::source::read_message_file(Path::new(&path))
}

fn source_for_mode(args: &ProbeArgs) -> Result<Box<dyn MessageSource>, Error> {
    let mode = args.mode.as_deref().unwrap_or("simple");
    match mode {
        "simple" => Ok(Box::new(PayloadSource::new(
            PayloadSelection::Category(PayloadCategory::Normal),
            false,
        ))),
        "file" => Ok(Box::new(StaticListSource::new(message_file(args)?))),
        "payload" => {
            let selection: PayloadSelection =
                args.payload_type.as_deref().unwrap_or("all").parse()?;
            Ok(Box::new(PayloadSource::new(selection, args.encoded)))
        }
        "interactive" => Ok(Box::new(InteractiveSource::new()?)),
        "external" => {
            let max_turns = args
                .max_turns
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_MAX_TURNS);
            Ok(Box::new(GeneratedSource::new(
                generator(args)?,
                Vec::new(),
                max_turns,
            )))
        }
        "hybrid" => Ok(Box::new(HybridSource::new(
            generator(args)?,
            message_file(args)?,
        ))),
        other => Err(Error::validation(
            format!("unknown mode: {other}"),
            Some("mode".to_string()),
        )),
    }
}

fn policy_for(args: &ProbeArgs) -> RunPolicy {
    let mut policy = RunPolicy::default()
        .with_delay(Duration::from_secs(args.delay.unwrap_or(DEFAULT_DELAY_SECS)))
        .with_initial_delay(Duration::from_secs(args.initial_delay.unwrap_or(0)));
    if args.stop_on_block {
        policy = policy.stop_on_block();
    }
    if let Some(message) = &args.initial_message {
        policy = policy.with_initial_message(message.clone());
    }
    policy
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, free) = ProbeArgs::from_command_line_relaxed("wafprobe [OPTIONS]");
    if !free.is_empty() {
        eprintln!("unexpected arguments: {free:?}");
        std::process::exit(2);
    }

    let config = ProbeConfig::from_args(&args)?;
    let mut source = source_for_mode(&args)?;
    let transport = HttpTransport::new(&config)?;
    let client = ChatClient::new(transport, config);
    let mut orchestrator = ConversationOrchestrator::new(client, policy_for(&args));
    let mut reporter = PlainTextReporter::stdout(!args.no_color);

    let cancel = orchestrator.cancel_flag();
    ctrlc::set_handler(move || {
        cancel.store(true, Ordering::Relaxed);
    })?;

    let report = orchestrator.run(source.as_mut(), &mut reporter).await;
    println!("{report}");

    match report.outcome {
        RunOutcome::StartFailed | RunOutcome::SessionLost | RunOutcome::SourceFailed => {
            std::process::exit(1)
        }
        _ if !report.blocked.is_empty() => std::process::exit(3),
        _ => Ok(()),
    }
}
