//! Text → phoneme ids via espeak-ng.

use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Write;
use std::process::{Command, Stdio};

use crate::error::EngineError;

/// Convert text to an IPA phoneme string via espeak-ng.
///
/// `voice` is the espeak-ng voice from the model config (e.g. `en-us`, `de`).
pub fn phonemize(text: &str, voice: &str) -> Result<String, EngineError> {
    run_espeak(text, voice)
}

/// Map an IPA phoneme string onto model ids.
///
/// Piper id sequences start with the BOS marker (`^`), end with the EOS
/// marker (`$`), and intersperse the pad id (`_`) after every phoneme.
/// Characters missing from the map are silently dropped, matching the
/// reference implementation.
pub fn phonemes_to_ids(phonemes: &str, id_map: &HashMap<String, Vec<i64>>) -> Vec<i64> {
    let marker = |key: &str, fallback: i64| {
        id_map
            .get(key)
            .and_then(|ids| ids.first().copied())
            .unwrap_or(fallback)
    };
    let bos = marker("^", 1);
    let eos = marker("$", 2);
    let pad = marker("_", 0);

    let mut ids = Vec::with_capacity(phonemes.chars().count() * 2 + 2);
    ids.push(bos);

    let mut buf = [0u8; 4];
    for ch in phonemes.chars() {
        if ch == '\n' || ch == '\r' {
            continue;
        }
        let key: &str = ch.encode_utf8(&mut buf);
        if let Some(mapped) = id_map.get(key) {
            ids.extend_from_slice(mapped);
            ids.push(pad);
        }
    }

    ids.push(eos);
    ids
}

fn run_espeak(input: &str, voice: &str) -> Result<String, EngineError> {
    let mut child = Command::new("espeak-ng")
        .args(["--ipa", "--stdin", "-q", "-v", voice])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::Phonemizer(
                    "espeak-ng not found. Install: Linux: `sudo apt-get install espeak-ng`, \
                     macOS: `brew install espeak-ng`"
                        .to_string(),
                )
            } else {
                EngineError::Io(e)
            }
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        // espeak-ng treats stdin as line-oriented input; without a final line
        // terminator the last token can be under-processed.
        let payload = newline_terminated(input);
        stdin.write_all(payload.as_bytes()).map_err(EngineError::Io)?;
    }

    let output = child.wait_with_output().map_err(EngineError::Io)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(EngineError::Phonemizer(format!(
            "espeak-ng exited with code {:?}: {stderr}",
            output.status.code()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn newline_terminated(input: &str) -> Cow<'_, str> {
    if input.ends_with('\n') {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(format!("{input}\n"))
    }
}
