use std::path::PathBuf;
use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use leech::{get_peers, Config, Downloader, MetaInfo, OrderedPicker, RoundRobinPicker, TorrentInfo};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Policy {
    // Every piece from the first peer that connected.
    Ordered,
    // Pieces spread across all connected peers.
    RoundRobin,
}

#[derive(Parser)]
#[command(name = "leech", about = "Download a single-file torrent")]
struct Args {
    #[arg(help = "Path to torrent file")]
    torrent: PathBuf,

    #[arg(short, long, help = "Output path, defaults to the name in the torrent")]
    output: Option<PathBuf>,

    #[arg(short, long, default_value_t = 10, value_parser = clap::value_parser!(u16).range(1..), help = "Number of download workers")]
    concurrency: u16,

    #[arg(long, value_enum, default_value_t = Policy::RoundRobin, help = "How pieces are assigned to peers")]
    policy: Policy,

    #[arg(short, long, help = "Verbose output")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {

    let args = Args::parse();

    // Set up logging.
    let level = if args.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let sub = tracing_subscriber::fmt()
        .with_max_level(level)
        .finish();
    tracing::subscriber::set_global_default(sub)?;

    let metainfo = MetaInfo::new(&args.torrent)
        .with_context(|| format!("failed to load {}", args.torrent.display()))?;
    tracing::info!("{:?}", metainfo);

    let config = Config {
        concurrency: args.concurrency as usize,
        ..Default::default()
    };

    let torrent = TorrentInfo::new(&metainfo);
    let output = args.output.unwrap_or_else(|| PathBuf::from(&torrent.name));

    // Nothing to fetch for an empty file.
    if torrent.num_pieces == 0 {
        tokio::fs::write(&output, b"")
            .await
            .with_context(|| format!("failed to write {}", output.display()))?;
        println!("saved {} (empty) to {}", torrent.name, output.display());
        return Ok(());
    }

    let peers = get_peers(&metainfo, &config).await.context("announce failed")?;
    let downloader = Downloader::connect(&torrent, peers, &config).await?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, stopping download");
            ctrl_c.cancel();
        }
    });

    let result = match args.policy {
        Policy::Ordered => {
            let peer = downloader.peers().first().copied().context("no connected peers")?;
            let manager = OrderedPicker::new(&torrent, peer, config.max_piece_attempts);
            downloader.download(manager, cancel).await
        },
        Policy::RoundRobin => {
            let manager = RoundRobinPicker::new(&torrent, downloader.peers(), config.max_piece_attempts)?;
            downloader.download(manager, cancel).await
        },
    };
    downloader.shutdown().await;
    let buf = result?;

    tokio::fs::write(&output, &buf)
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("saved {} ({}) to {}", torrent.name, metainfo.size_fmt(), output.display());

    Ok(())
}
