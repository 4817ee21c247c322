pub mod analyze;
pub mod benchmark;
pub mod eval;
pub mod history;
pub mod improve;
pub mod judge;
pub mod mine;
pub mod prompt;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use edgar_eval::types::EvalRun;

use crate::state::AppState;

/// Load a run by id, or the newest one for `"latest"`.
pub async fn load_run(state: &AppState, run_ref: &str) -> Result<EvalRun> {
    let run_id = state.runs.resolve(run_ref).await?;
    Ok(state.runs.read(&run_id).await?)
}

/// Token cancelled on the first Ctrl-C.
pub fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing in-flight pairs");
            trigger.cancel();
        }
    });
    token
}

pub fn pct(value: f64) -> String {
    format!("{:.0}%", value * 100.0)
}
