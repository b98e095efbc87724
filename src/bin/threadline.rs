use clap::Parser;
use threadline::{
    app::{App, cli::Cli},
    errors::AppError,
    logging,
};

#[tokio::main]
async fn main() -> anyhow::Result<(), AppError> {
    let cli = Cli::parse();
    if cli.args.print_log_dir {
        println!("Log directory: {}", logging::get_data_dir().display());
        return Ok(());
    }
    logging::init(cli.args.log_level.clone().try_into()?)?;

    let mut app = App::new(cli).await?;
    app.run().await
}
