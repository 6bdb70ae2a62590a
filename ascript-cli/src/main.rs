use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cli = ascript_cli::Cli::parse();
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(ascript_cli::run_main(cli))
}
