// src/dictionary/wordlist.rs
// Reads wordlist files into raw lines. Filtering happens in generate.rs.

use crate::error::ConfigError;
use std::path::PathBuf;

pub fn read_wordlists(paths: &[PathBuf]) -> Result<Vec<String>, ConfigError> {
    let mut lines = Vec::new();

    for path in paths {
        let raw = std::fs::read(path).map_err(|source| ConfigError::WordlistLoad {
            path: path.clone(),
            source,
        })?;
        // Wordlists in the wild are not always valid UTF-8
        let text = String::from_utf8_lossy(&raw);
        lines.extend(text.lines().map(str::to_string));
    }

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_files_in_order() {
        let dir = std::env::temp_dir().join(format!("dirhound-wordlist-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let first = dir.join("first.txt");
        let second = dir.join("second.txt");
        std::fs::write(&first, "admin\nlogin\n").unwrap();
        std::fs::write(&second, b"backup/\r\n\xffodd\n").unwrap();

        let lines = read_wordlists(&[first, second]).unwrap();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "admin");
        assert_eq!(lines[2], "backup/");
        assert!(lines[3].ends_with("odd"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_file_is_a_config_error() {
        let err = read_wordlists(&[PathBuf::from("/nonexistent/dirhound.txt")]).unwrap_err();
        assert!(matches!(err, ConfigError::WordlistLoad { .. }));
    }
}
