use bridge_service::runner::run;
use clap::Parser;
use options::run_options::RunOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = RunOptions::parse();

    run(args.start).await
}
