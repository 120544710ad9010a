use std::{path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use fake_user_agent::get_chrome_rua;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client, Url,
};
use vidlens::{
    append::AppendHandler,
    bytes::Bytes,
    event::{event_channel, EventReceiver},
    handler::{batch::BatchProcessor, FileData, Handler, InitSegmentInput, RequestOptions},
    har::replay_har,
    probe::NoProbe,
    storage::{Storage, VidlensStorage},
    util::now_millis,
    ByteRange, CancellationToken, HttpClient,
};

#[derive(Parser, Debug, Clone)]
#[clap(name = "vidlens", version, about)]
pub struct VidlensArgs {
    /// Session directory manifests, segments and appends are saved to.
    ///
    /// Defaults to a timestamped directory under the system temporary directory.
    #[clap(long, env = "VIDLENS_SESSION_DIR")]
    session_dir: Option<PathBuf>,

    /// Keep handled files in memory instead of writing them to disk
    #[clap(long)]
    memory: bool,

    /// Cookies used in requests, eg. "a=1; b=2"
    ///
    /// Scoped to the requested URL, or to --base-url for local files.
    #[clap(long)]
    cookies: Option<String>,

    /// HTTP Header used in requests
    ///
    /// Custom header. eg. "User-Agent: xxxxx".
    #[clap(short = 'H', long)]
    headers: Vec<String>,

    /// Timeout seconds for each request.
    #[clap(long, default_value = "10")]
    timeout: u64,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Fetch a manifest or segment URL and handle it
    Url {
        url: String,

        /// Byte range to request, in <start>-<end> format
        #[clap(long)]
        byterange: Option<String>,

        /// URL of the init segment to prepend to the fetched segment
        #[clap(long)]
        init_segment: Option<String>,

        /// Timeline id of the fetched segment
        #[clap(long)]
        timeline: Option<f64>,
    },
    /// Handle local manifest and segment files in the given order
    File {
        paths: Vec<PathBuf>,

        /// URL the files were downloaded from, used to resolve relative URIs
        #[clap(long)]
        base_url: Option<Url>,
    },
    /// Replay a HAR capture
    Har { path: PathBuf },
    /// Handle MediaSource appends dumped to files, in the given order
    Append {
        paths: Vec<PathBuf>,

        #[clap(long, default_value = "video/mp4")]
        mime_type: String,
    },
}

impl VidlensArgs {
    fn client(&self) -> anyhow::Result<HttpClient> {
        let mut headers = HeaderMap::new();
        for header in &self.headers {
            let Some((key, value)) = header.split_once(':') else {
                bail!("Invalid header: {header}");
            };
            headers.insert(
                HeaderName::from_str(key.trim()).context("Invalid header name")?,
                HeaderValue::from_str(value.trim()).context("Invalid header value")?,
            );
        }

        let builder = Client::builder()
            .default_headers(headers)
            .user_agent(get_chrome_rua())
            .timeout(Duration::from_secs(self.timeout));
        let client = HttpClient::new(builder)?;

        if let Some(cookies) = &self.cookies {
            match self.cookie_url() {
                Some(url) => {
                    let cookies = cookies
                        .split(';')
                        .map(str::trim)
                        .filter(|cookie| !cookie.is_empty())
                        .map(str::to_string)
                        .collect();
                    client.add_cookies(cookies, url)?;
                }
                None => log::warn!("--cookies needs a target URL, ignored for this command"),
            }
        }

        Ok(client)
    }

    /// URL the `--cookies` option is scoped to.
    fn cookie_url(&self) -> Option<&str> {
        match &self.command {
            Command::Url { url, .. } => Some(url),
            Command::File {
                base_url: Some(base_url),
                ..
            } => Some(base_url.as_str()),
            _ => None,
        }
    }

    async fn storage(&self) -> anyhow::Result<(VidlensStorage, i64)> {
        if self.memory {
            return Ok((VidlensStorage::memory(), now_millis()));
        }

        let session_dir = match &self.session_dir {
            Some(dir) => dir.clone(),
            None => std::env::temp_dir().join(format!("vidlens_{}", now_millis())),
        };
        let storage = vidlens::storage::file::FileStorage::create(&session_dir).await?;
        log::info!("Session directory: {}", session_dir.display());
        let session_id = storage.session_id();
        Ok((VidlensStorage::File(storage), session_id))
    }
}

fn parse_byterange(input: &str) -> anyhow::Result<ByteRange> {
    let Some((start, end)) = input.split_once('-') else {
        bail!("Invalid byte range: {input}");
    };
    Ok(ByteRange::new(start.trim().parse()?, end.trim().parse()?))
}

/// Print events as JSON lines until every sender is gone.
async fn print_events(mut receiver: EventReceiver) {
    while let Some(event) = receiver.recv().await {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(e) => log::error!("Failed to serialize event: {e}"),
        }
    }
}

async fn run<S: Storage>(
    command: Command,
    handler: Arc<Handler<HttpClient, S, NoProbe>>,
) -> anyhow::Result<()> {
    match command {
        Command::Url {
            url,
            byterange,
            init_segment,
            timeline,
        } => {
            let byterange = byterange.as_deref().map(parse_byterange).transpose()?;
            let options = RequestOptions {
                user_request_number: Some(1),
                init_segment: init_segment.map(|url| InitSegmentInput {
                    url,
                    byterange: None,
                    buffer: None,
                }),
                timeline,
                ..Default::default()
            };
            if handler.handle_url(&url, byterange, options).await?.is_none() {
                log::warn!("Nothing was resolved from {url}");
            }
        }
        Command::File { paths, base_url } => {
            let mut processor = BatchProcessor::new(handler);
            for (index, path) in paths.into_iter().enumerate() {
                let data = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let file_name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_default();
                let url = match &base_url {
                    Some(base) => base.join(&file_name)?.to_string(),
                    None => path.to_string_lossy().to_string(),
                };
                let file = FileData {
                    url,
                    data: Bytes::from(data),
                    number: index as u64 + 1,
                    ..Default::default()
                };
                if let Err(e) = processor.process(file).await {
                    log::error!("Failed to handle {}: {e}", path.display());
                }
            }
            if processor.pending_len() > 0 {
                log::warn!(
                    "{} files are still waiting for their init segment",
                    processor.pending_len()
                );
            }
        }
        Command::Har { path } => {
            let data = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let state = replay_har(handler, &data).await?;
            log::info!(
                "Replay finished with {} known segments",
                state.segment_details_map.len()
            );
        }
        Command::Append { paths, mime_type } => {
            let mut appends = AppendHandler::new(handler);
            for path in paths {
                let data = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                if let Err(e) = appends.handle_append(Bytes::from(data), &mime_type).await {
                    log::error!("Failed to handle append {}: {e}", path.display());
                }
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .try_from_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = VidlensArgs::parse();
    let client = args.client()?;
    let (storage, session_id) = args.storage().await?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupted, cancelling");
                cancel.cancel();
            }
        }
    });

    let (sender, receiver) = event_channel();
    let printer = tokio::spawn(print_events(receiver));

    let handler = Arc::new(
        Handler::new(client, storage, NoProbe, sender, session_id).with_cancel_token(cancel),
    );
    let result = run(args.command, handler).await;

    // All senders are dropped with the handler, the printer drains and exits
    printer.await?;
    result
}
