//! Write and read paths around the pipeline.
//!
//! `stage_code` is what the save endpoint calls on every keystroke-ish save:
//! it refreshes the staged code and re-arms the debounce window, coalescing
//! a burst of edits into one durable write. `load_code` is the editor's
//! read-back of the last persisted version.
use crate::{
    config::Config,
    error::AutosaveError,
    keys::{self, DebounceKey},
    repository::CodeRepository,
    staging::StagingStore,
};

fn valid_language(language: &str) -> bool {
    !language.is_empty()
        && language
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

pub async fn stage_code(
    store: &dyn StagingStore,
    config: &Config,
    user_id: u64,
    problem_id: u64,
    language: &str,
    code: &str,
) -> Result<(), AutosaveError> {
    // The language token is user input and ends up inside a key name.
    if !valid_language(language) {
        return Err(AutosaveError::InvalidLanguage(language.to_string()));
    }

    let key = DebounceKey {
        user_id,
        problem_id,
        language: language.to_string(),
    };

    store
        .put(
            &keys::data_key(&config.code_save_prefix, &key),
            code,
            config.data_ttl_secs,
        )
        .await?;

    // Armed last so the code is always in place before the window can fire.
    store
        .put(
            &keys::encode(&config.code_save_prefix, &key),
            "1",
            config.debounce_ttl_secs,
        )
        .await?;

    Ok(())
}

pub async fn load_code(
    repo: &dyn CodeRepository,
    problem_id: u64,
    username: &str,
    language: &str,
) -> Result<Option<String>, AutosaveError> {
    repo.find(problem_id, username, language).await
}
