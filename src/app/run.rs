use crate::cli::app_config::Cli;
use crate::http::handler::http_stat_requests;
use crate::response::res::StatReport;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

pub async fn main_with_error() -> Result<Vec<StatReport>, anyhow::Error> {
    let cli: Cli = Cli::parse();

    do_request(cli).await
}

fn init_logging(verbosity: u8) -> Result<(), anyhow::Error> {
    let log_level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy()
        .add_directive("hyper_util=off".parse()?);
    let subscriber = tracing_subscriber::fmt()
        .without_time()
        .with_level(false)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::NONE)
        .with_env_filter(filter)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
    Ok(())
}

async fn do_request(cli: Cli) -> Result<Vec<StatReport>, anyhow::Error> {
    init_logging(cli.verbosity)?;

    let uri: hyper::Uri = cli.url.parse()?;
    match uri.scheme_str() {
        Some("http") | Some("https") => http_stat_requests(&cli).await,
        Some(scheme) => Err(anyhow!("Unsupported scheme '{}' in the uri:{}.", scheme, uri)),
        None => Err(anyhow!("Can not find scheme in the uri:{}.", uri)),
    }
}
