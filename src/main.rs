use anyhow::{bail, Context};
use peerdrop::core::connection::WebRtcFactory;
use peerdrop::core::discovery::HttpDiscovery;
use peerdrop::utils::sos::SignalOfStop;
use peerdrop::workers::args::{Args, CONFIG_FILE};
use peerdrop::workers::console;
use peerdrop::workers::node::Node;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (args, config_error) = Args::load();

    // webrtc_ice reports late STUN responses as warnings; they are harmless.
    let filter = match args.verbose {
        0 => "warn,peerdrop=info,webrtc_ice::agent=error",
        1 => "info,webrtc_ice::agent=error",
        2 => "debug,webrtc_ice::agent=error",
        _ => "trace",
    };

    // Logs go to stderr so stdout stays readable for the console.
    tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Some(e) = config_error {
        warn!(event = "config_parse_failure", path = CONFIG_FILE, error = %format!("{e:#}"), "Ignoring config file");
    }

    let Some(server) = args.server.as_deref() else {
        bail!("no relay configured; pass --server or set `server` in peerdrop.toml");
    };

    let sos = SignalOfStop::new();

    // Ctrl+C handler
    let sos_clone = sos.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        sos_clone.cancel();
    });

    let discovery = Arc::new(HttpDiscovery::new(server)?);
    let factory = WebRtcFactory::new(&args.stun_servers()).context("initialising WebRTC")?;

    let (node, outputs) = Node::connect(
        discovery,
        factory,
        args.transfer_config(),
        args.poll_interval(),
        &sos,
    )
    .await?;

    let input = tokio::spawn(console::run_input(node.manager(), sos.clone()));
    let output = tokio::spawn(console::run_output(outputs.events, args.download_dir()));

    node.run(outputs.signals, sos.clone()).await;

    input.abort();
    // Every worker has stopped, so the event stream ends after the last save.
    let _ = output.await;

    // A pending stdin read cannot be cancelled and would hold up runtime shutdown.
    std::process::exit(0)
}
