use clap::Parser;

use uast_client::cli::{self, Cli};
use uast_client::observability::{init_logging, DEFAULT_DIRECTIVE};

#[tokio::main]
async fn main() {
    init_logging(DEFAULT_DIRECTIVE);
    let cli = Cli::parse();
    let mut stdout = std::io::stdout();
    if let Err(e) = cli::run(cli, &mut stdout).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
