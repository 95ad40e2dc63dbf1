//! `isle build`

use std::time::Instant;

use isle_bundler::{BuildEvent, BuildOutcome, build};
use tokio::sync::broadcast::error::RecvError;

use super::load_project;
use crate::cli::BuildArgs;
use crate::error::{CliError, Result};
use crate::ui;

pub async fn execute(args: BuildArgs) -> Result<()> {
    let project = load_project(&args.project, args.production.then_some(true))?;
    let config = &project.config;
    ui::info(&format!(
        "Building {} with {}",
        config.layout().src.display(),
        config.backend
    ));

    let started = Instant::now();
    let session = build(config.invocation(args.watch)).await?;
    let failed = failures(session.outcomes());

    if !args.watch {
        if !failed.is_empty() {
            return Err(CliError::BuildFailed(failed));
        }
        ui::success(&format!("Built in {}", ui::format_duration(started.elapsed())));
        return Ok(());
    }

    for failure in &failed {
        ui::error(failure);
    }
    ui::info("Watching for changes (Ctrl-C to stop)");
    let mut events = session.subscribe();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(BuildEvent::Finished { build_type, error: None }) => {
                    ui::success(&format!("Rebuilt {build_type}"));
                }
                Ok(BuildEvent::Finished { build_type, error: Some(error) }) => {
                    ui::error(&format!("{build_type}: {error}"));
                }
                Ok(BuildEvent::Reset { .. }) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "missed build events");
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    session.stop();
    Ok(())
}

fn failures(outcomes: &[BuildOutcome]) -> Vec<String> {
    outcomes
        .iter()
        .filter_map(|outcome| {
            let error = outcome.error.as_ref()?;
            Some(format!("{}: {error}", outcome.build_type))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use isle_bundler::BuildType;

    #[test]
    fn only_failed_outcomes_are_listed() {
        let outcomes = [
            BuildOutcome {
                build_type: BuildType::Ssr,
                error: Some("unclosed <style>".into()),
            },
            BuildOutcome {
                build_type: BuildType::Client,
                error: None,
            },
        ];
        assert_eq!(failures(&outcomes), vec!["ssr: unclosed <style>"]);
    }
}
