use anyhow::Result;
use clap::Parser;
use fds2ascii_batch::{cli, logging};

// One session at a time by construction: no worker threads to hand exports to.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_silent = args.silent;
    logging::init(args.verbose, is_silent);

    match cli::run(args).await {
        Ok(status) => std::process::exit(status.exit_code()),
        Err(e) => {
            if is_silent {
                eprintln!("{e:#}");
                std::process::exit(1);
            } else {
                Err(e)
            }
        }
    }
}
