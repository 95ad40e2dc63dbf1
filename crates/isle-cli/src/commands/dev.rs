//! `isle dev`

use isle_bundler::dev::DevSession;

use super::load_project;
use crate::cli::DevArgs;
use crate::error::{CliError, Result};
use crate::ui;

pub async fn execute(args: DevArgs) -> Result<()> {
    let project = load_project(&args.project, None)?;
    let options = project.config.dev_options(project.file.clone());
    if !options.server.entry.is_file() {
        return Err(CliError::FileNotFound(options.server.entry));
    }

    ui::info(&format!(
        "Starting dev session for {} ({} {})",
        options.invocation.layout.root.display(),
        options.server.runtime,
        options.server.entry.display()
    ));

    DevSession::new(options)
        .run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!(%err, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    ui::success("Dev session stopped");
    Ok(())
}
