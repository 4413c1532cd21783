//! Show the last raw message received from the stream

use crate::config::last_message_file;
use crate::viewer::LastMessageFile;
use anyhow::Result;
use console::style;

pub fn run() -> Result<()> {
    let path = last_message_file();

    let Some(raw) = LastMessageFile::load(&path)? else {
        println!(
            "{} No message recorded yet at {}",
            style("!").yellow().bold(),
            path.display()
        );
        return Ok(());
    };

    println!("{}", pretty(&raw));
    Ok(())
}

/// Pretty-print JSON messages, pass anything else through
fn pretty(raw: &str) -> String {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pretty() {
        assert_eq!(pretty(r#"{"id":"a"}"#), "{\n  \"id\": \"a\"\n}");
        assert_eq!(pretty("not json"), "not json");
    }
}
