use anyhow::Result;

use edgar_eval::eval::render_history;

use crate::cli::HistoryArgs;
use crate::state::AppState;

pub async fn run(state: &AppState, args: HistoryArgs) -> Result<()> {
    let history = state
        .history()
        .load_history(args.benchmark.as_deref())
        .await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&history)?);
    } else {
        println!("{}", render_history(&history));
    }
    Ok(())
}
