// echoline - TCP echo service and line transfer client
use clap::Parser;
use echoline::cli::{execute_command, Args};
use echoline::EchoLineError;

#[tokio::main]
async fn main() -> Result<(), EchoLineError> {
    let args = Args::parse();

    // execute_command has already reported the error
    if execute_command(args).await.is_err() {
        std::process::exit(1);
    }
    Ok(())
}
