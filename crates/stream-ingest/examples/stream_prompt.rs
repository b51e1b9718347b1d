use std::io::Write as _;
use std::time::Duration;

use clap::Parser;
use stream_ingest::init_observability;
use stream_ingest::prelude::*;

/// Streams one prompt to the chat backend and prints the reply as it arrives.
#[derive(Parser, Debug)]
struct Args {
    /// Prompt text to send.
    prompt: String,
    /// Backend URL (defaults to STREAM_INGEST_ENDPOINT or the built-in endpoint).
    #[arg(long)]
    endpoint: Option<String>,
    /// Timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Print synthesized messages in English.
    #[arg(long)]
    english: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), IngestError> {
    let _ = dotenvy::dotenv();
    init_observability();
    let args = Args::parse();

    let mut config = IngestClientConfig::from_env()?;
    if let Some(endpoint) = args.endpoint {
        config = config.endpoint(endpoint);
    }
    if let Some(secs) = args.timeout_secs {
        config = config.timeout(Duration::from_secs(secs));
    }
    if args.english {
        config = config.locale(Locale::En);
    }
    let client = StreamIngestClient::new(config)?;
    eprintln!("-> {}", client.config().endpoint);

    let mut stdout = std::io::stdout();
    client
        .send(&args.prompt, |chunk| match chunk.kind {
            ChunkKind::Delta => {
                print!("{}", chunk.text());
                let _ = stdout.flush();
            }
            ChunkKind::Completed => {
                println!();
                if let Some(tokens) = chunk.token_usage.filter(|t| *t > 0) {
                    eprintln!("[{tokens} tokens]");
                }
            }
            ChunkKind::Error => eprintln!("\n{}", chunk.text()),
        })
        .await
}
