use anyhow::Result;
use clap::Parser;
use stackenv_core::errors::StackenvError;

mod cli;
mod commands;
mod ui;

#[tokio::main]
async fn main() -> Result<()> {
    let parsed = cli::Cli::parse();

    match parsed.dispatch().await {
        Ok(()) => Ok(()),
        Err(err) => {
            // Phase failures carry a remediation hint
            if let Some(StackenvError::Init(init)) = err.downcast_ref::<StackenvError>() {
                eprintln!("Error: {}", init);
                eprintln!("Resolution: {}", init.resolution());
                std::process::exit(1);
            }

            Err(err)
        }
    }
}
