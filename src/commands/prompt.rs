use anyhow::Result;

use edgar_eval::types::prompt_hash;

use crate::cli::PromptCommand;
use crate::state::AppState;

pub async fn run(state: &AppState, command: PromptCommand) -> Result<()> {
    let prompt = state.prompts.load().await?;
    match command {
        PromptCommand::Show => println!("{}", prompt),
        PromptCommand::Hash => println!("{}", prompt_hash(&prompt)),
    }
    Ok(())
}
