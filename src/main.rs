use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mysql_dump::config::{DumpArgs, DumpConfig, DumpSettings};
use mysql_dump::dump::{self, DumpRunner};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenv::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "mysql_dump=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = DumpArgs::parse();
    let settings = DumpSettings::load(&args)?;
    let runner = DumpRunner::new(&settings);

    let outcome = match DumpConfig::from_env() {
        Ok(config) => {
            runner
                .run_until(&config, tokio::signal::ctrl_c())
                .await
        }
        Err(err) => Err(err),
    };
    dump::report(&outcome);

    Ok(ExitCode::from(dump::exit_status(&outcome, args.strict)))
}
