use anyhow::{Context, Result, bail};
use pressport::{
    config::Config,
    pipeline::{Pipeline, RunRequest, RunStatus},
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let Some(request_path) = args.next() else {
        bail!("usage: pressport <run-request.json>");
    };

    let raw = std::fs::read_to_string(&request_path)
        .with_context(|| format!("reading run request from {request_path}"))?;
    let request: RunRequest =
        serde_json::from_str(&raw).context("parsing run request JSON")?;

    if let Some(profile) = &request.profile {
        profile.validate().context("validating site profile")?;
        info!(profile = %profile.name, "using site profile");
    }

    let config = Config::from_env().context("loading configuration")?;
    let pipeline = Pipeline::new(config);

    // Bridge ctrl-c to the cancellation token: in-flight items finish, no new
    // items start, the run lands in a terminal state with its summary intact.
    let cancel = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling run");
            cancel.cancel();
        }
    });

    let existing = pipeline.existing_artifacts().await;
    if existing.fetched > 0 || existing.images > 0 || existing.sanitized > 0 {
        info!(
            fetched = existing.fetched,
            images = existing.images,
            sanitized = existing.sanitized,
            "existing artifacts found; pass skip flags in the run request to reuse them"
        );
    }

    let summary = pipeline.run(request).await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);

    if summary.status == RunStatus::Failed {
        error!(
            cause = summary.failure_cause.as_deref().unwrap_or("unknown"),
            "run failed"
        );
        std::process::exit(1);
    }
    Ok(())
}
