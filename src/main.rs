use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match crowdmap::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "run failed");
            ExitCode::FAILURE
        }
    }
}
