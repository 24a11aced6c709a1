use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value)?;
    println!("{output}");
    Ok(())
}

pub fn format_time(time: Option<DateTime<Utc>>) -> String {
    match time {
        Some(time) => time
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => "-".to_string(),
    }
}

/// First line of `input`, cut to `max_len` characters.
pub fn preview_text(input: &str, max_len: usize) -> String {
    let line = input.lines().next().unwrap_or_default();
    if line.chars().count() <= max_len {
        return line.to_string();
    }
    let mut preview = line.chars().take(max_len).collect::<String>();
    preview.push('…');
    preview
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_text() {
        assert_eq!(preview_text("short", 10), "short");
        assert_eq!(preview_text("abcdefghij", 4), "abcd…");
        assert_eq!(preview_text("first\nsecond", 20), "first");
    }

    #[test]
    fn test_format_missing_time() {
        assert_eq!(format_time(None), "-");
    }
}
