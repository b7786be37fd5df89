use anyhow::Context;
use book_quiz::clients::{ClientType, OpenAIModel};
use book_quiz::config::AppConfig;
use book_quiz::server::{create_router, AppState};
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about = "📚 Book quiz server", long_about = None)]
#[command(after_help = "ENVIRONMENT VARIABLES:
    OPENAI_API_KEY       API key for the OpenAI client
    OPENAI_MODEL         Model id [default: gpt-5-nano]
    QUIZ_CLIENT          openai | mock [default: openai when a key is set]
    QUIZ_HOST, PORT      Bind address [default: 0.0.0.0:3000]
    QUIZ_STATIC_DIR      Front-end files [default: public]
    QUIZ_TRANSCRIPT_DIR  Record every prompt and reply as markdown
    RUST_LOG             Log filter [default: book_quiz=info,tower_http=info]")]
struct Args {
    /// Address to bind
    #[arg(long)]
    host: Option<IpAddr>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory served at `/`
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Model backend: openai, mock
    #[arg(short, long)]
    client: Option<ClientType>,

    /// Model id, e.g. gpt-4o-mini
    #[arg(short, long)]
    model: Option<String>,

    /// Record model exchanges to this directory
    #[arg(long)]
    transcript_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "book_quiz=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = AppConfig::from_env().context("Invalid configuration")?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(dir) = args.static_dir {
        config.static_dir = dir;
    }
    if let Some(client) = args.client {
        config.client = client;
    }
    if let Some(model) = args.model {
        config.model = OpenAIModel::from_id(&model);
    }
    if args.transcript_dir.is_some() {
        config.transcript_dir = args.transcript_dir;
    }

    info!(client = %config.client, model = %config.model.id(), static_dir = %config.static_dir.display(), "Starting quiz server");
    let app = create_router(AppState::from_config(&config), &config.static_dir);

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("Failed to serve application")?;

    Ok(())
}
