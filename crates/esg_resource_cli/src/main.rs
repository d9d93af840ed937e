mod cli;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive("esg_resource=info".parse().unwrap())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = cli::start().await {
        eprintln!("{err}");
        err.chain()
            .skip(1)
            .for_each(|cause| eprintln!("because: {}", cause));
        std::process::exit(1);
    }
}
