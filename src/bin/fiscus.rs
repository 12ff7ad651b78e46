use anyhow::Result;
use fiscus::cli::{actions, actions::Action, start, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let (action, globals) = start()?;

    match action {
        Action::Server { .. } => actions::server::handle(action, &globals).await?,
    }

    telemetry::shutdown_tracer();

    Ok(())
}
