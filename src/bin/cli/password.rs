//! Interactive passphrase entry.

use offsite::PassphraseSource;
use offsite::crypto::Passphrase;
use rpassword::prompt_password;

/// Prompts for the passphrase, asking twice when `confirm` is set.
///
/// The passphrase is held in memory for the rest of the run.
pub fn prompt_passphrase(confirm: bool) -> Result<PassphraseSource, String> {
    let first = prompt_password("Enter passphrase: ").map_err(|e| e.to_string())?;
    if first.is_empty() {
        return Err("passphrase cannot be empty".into());
    }

    if confirm {
        let second = prompt_password("Confirm passphrase: ").map_err(|e| e.to_string())?;
        if first != second {
            return Err("passphrases do not match".into());
        }
    }

    Ok(PassphraseSource::Inline(Passphrase::new(first)))
}
