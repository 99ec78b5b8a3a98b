use eyre::Context;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use watchme_live::config::Config;
use watchme_live::youtube_api::{BroadcastStatus, YouTubeClient};
use watchme_live::{
    BroadcastLifecycleManager, RemoteBroadcastClient, YouTubeBroadcastClient,
    setup_youtube_client,
};

const USAGE: &str = "\
usage: watchme <command>

commands:
  auth                          authorize access to your YouTube channel
  create <title> [description]  schedule a broadcast and print where to stream
  list                          list upcoming broadcasts
  go-live <broadcast-id>        take a bound broadcast live
  end <broadcast-id>            end a broadcast";

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(std::io::stdout().is_terminal())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let config = Config::load().await.context("load configuration")?;
    let stored = read_token(&config.token_path).await?;
    let (yt, token) = setup_youtube_client(&config, stored.as_deref(), async |_, title, msg| {
        eprintln!("==> {title}: {msg}");
    })
    .await?;
    save_token(&config.token_path, &token).await?;

    let remote = Arc::new(YouTubeBroadcastClient::new(yt.clone(), &config)?);
    let lifecycle = BroadcastLifecycleManager::new(Arc::clone(&remote), config.go_live_delay());

    let result = match (command.as_str(), &args[1..]) {
        ("auth", []) => {
            eprintln!("authorized, token saved to {}", config.token_path.display());
            Ok(())
        }
        ("create", [title, rest @ ..]) if rest.len() <= 1 => {
            let description = rest.first().map(String::as_str).unwrap_or("");
            create(&lifecycle, title, description).await
        }
        ("list", []) => list(remote.as_ref()).await,
        ("go-live", [id]) => go_live(&lifecycle, id).await,
        ("end", [id]) => remote
            .transition_broadcast(id, BroadcastStatus::Complete)
            .await
            .with_context(|| format!("end broadcast {id}"))
            .map(|()| eprintln!("broadcast {id} ended")),
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    };

    // the access token may have been refreshed along the way
    persist_latest(&config.token_path, &yt).await?;
    result
}

async fn create(
    lifecycle: &BroadcastLifecycleManager<YouTubeBroadcastClient>,
    title: &str,
    description: &str,
) -> eyre::Result<()> {
    let mut event = lifecycle
        .create(description, title)
        .await
        .context("create live event")?;
    let target = lifecycle
        .bind(&mut event)
        .await
        .context("resolve ingestion target")?;

    println!("broadcast: {}", event.id);
    println!("watch at:  {}", event.watch_url());
    println!("stream to: {}", target.full_url());
    Ok(())
}

async fn list(remote: &YouTubeBroadcastClient) -> eyre::Result<()> {
    let upcoming = remote
        .list_upcoming_events()
        .await
        .context("list upcoming broadcasts")?;
    if upcoming.is_empty() {
        eprintln!("no upcoming broadcasts");
    }
    for item in upcoming {
        let event = &item.event;
        let scheduled = event
            .scheduled_start_time
            .map(|t| t.to_string())
            .unwrap_or_else(|| "unscheduled".to_string());
        println!("{:<8} {}  {}  ({scheduled})", event.status, event.id, event.title);
        if let Some(target) = &item.ingestion {
            println!("         ingest: {target}");
        }
    }
    Ok(())
}

async fn go_live(
    lifecycle: &BroadcastLifecycleManager<YouTubeBroadcastClient>,
    id: &str,
) -> eyre::Result<()> {
    let upcoming = lifecycle
        .remote()
        .list_upcoming_events()
        .await
        .context("list upcoming broadcasts")?;
    let Some(mut event) = upcoming
        .into_iter()
        .find(|item| item.event.id == id)
        .map(|item| item.event)
    else {
        eyre::bail!("no upcoming broadcast with id {id}");
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    eprintln!("going live once the stream has warmed up (ctrl-c to abort)");
    lifecycle
        .go_live(&mut event, &cancel)
        .await
        .with_context(|| format!("take broadcast {id} live"))?;
    println!("live at {}", event.watch_url());
    Ok(())
}

async fn read_token(path: &Path) -> eyre::Result<Option<String>> {
    if !tokio::fs::try_exists(path)
        .await
        .with_context(|| format!("check for {}", path.display()))?
    {
        return Ok(None);
    }
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    Ok(Some(raw))
}

async fn save_token(path: &Path, token: &oauth2::basic::BasicTokenResponse) -> eyre::Result<()> {
    let json = serde_json::to_string(token).context("serialize token")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("write {}", path.display()))
}

async fn persist_latest(path: &Path, yt: &YouTubeClient) -> eyre::Result<()> {
    save_token(path, &yt.token().await).await
}
