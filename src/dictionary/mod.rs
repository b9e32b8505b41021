// src/dictionary/mod.rs
// =============================================================================
// The dictionary: the ordered, deduplicated list of paths to try, plus a
// cursor that many workers can pull from at the same time.
//
// Submodules:
// - generate: wordlist lines -> entries (expansion, escaping, dedup)
// - wordlist: reading wordlist files
//
// The entry list itself never changes while it is being consumed; the only
// moving part is the cursor. next() reads and advances it under one lock, so
// two workers can never receive the same index.
// =============================================================================

mod generate;
mod wordlist;

pub use generate::{build, entry_extension};
pub use wordlist::read_wordlists;

use crate::config::DictionaryOptions;
use parking_lot::Mutex;

#[derive(Debug)]
struct State {
    options: DictionaryOptions,
    items: Vec<String>,
    index: usize,
}

#[derive(Debug)]
pub struct Dictionary {
    lines: Vec<String>,
    state: Mutex<State>,
}

impl Dictionary {
    pub fn new(lines: Vec<String>, options: DictionaryOptions) -> Self {
        let items = build(&lines, &options);
        Self {
            lines,
            state: Mutex::new(State {
                options,
                items,
                index: 0,
            }),
        }
    }

    // Hands out the next entry with its 1-based index, or None once every
    // entry has been handed out.
    pub fn next(&self) -> Option<(usize, String)> {
        let mut state = self.state.lock();
        if state.index >= state.items.len() {
            return None;
        }
        state.index += 1;
        let index = state.index;
        Some((index, state.items[index - 1].clone()))
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reset(&self) {
        self.state.lock().index = 0;
    }

    // Number of entries handed out so far. Together with set_index this is
    // all a session checkpoint needs to resume the dictionary.
    pub fn index(&self) -> usize {
        self.state.lock().index
    }

    pub fn set_index(&self, index: usize) {
        let mut state = self.state.lock();
        state.index = index.min(state.items.len());
    }

    // Rebuilds the entries from the original lines with new options and
    // rewinds the cursor.
    pub fn regenerate(&self, options: DictionaryOptions) {
        let items = build(&self.lines, &options);
        let mut state = self.state.lock();
        state.options = options;
        state.items = items;
        state.index = 0;
    }

    // The request paths one entry stands for once prefixes and suffixes are
    // applied. Without any applicable prefix/suffix this is the entry itself.
    pub fn variants(&self, path: &str) -> Vec<String> {
        let state = self.state.lock();
        let options = &state.options;
        let mut variants = Vec::new();

        for prefix in &options.prefixes {
            if !path.starts_with('/') && !path.starts_with(prefix.as_str()) {
                variants.push(format!("{}{}", prefix, path));
            }
        }
        for suffix in &options.suffixes {
            if !path.ends_with('/')
                && !path.ends_with(suffix.as_str())
                && !path.contains(['?', '#'])
            {
                variants.push(format!("{}{}", path, suffix));
            }
        }

        if variants.is_empty() {
            variants.push(path.to_string());
        }
        variants
    }

    // False for paths carrying an excluded extension. Used to vet paths
    // that come from crawling rather than from the wordlist.
    pub fn is_valid(&self, path: &str) -> bool {
        let state = self.state.lock();
        let extension = entry_extension(path);
        extension.is_empty()
            || !state
                .options
                .exclude_extensions
                .iter()
                .any(|excluded| excluded == extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn drain(dictionary: &Dictionary) -> Vec<String> {
        std::iter::from_fn(|| dictionary.next().map(|(_, path)| path)).collect()
    }

    #[test]
    fn test_next_until_exhausted() {
        let dictionary = Dictionary::new(lines(&["a", "b", "c"]), DictionaryOptions::default());
        assert_eq!(dictionary.next(), Some((1, "a".to_string())));
        assert_eq!(dictionary.next(), Some((2, "b".to_string())));
        assert_eq!(dictionary.next(), Some((3, "c".to_string())));
        assert_eq!(dictionary.next(), None);
        assert_eq!(dictionary.next(), None);
    }

    #[test]
    fn test_reset_replays_same_sequence() {
        let dictionary = Dictionary::new(lines(&["a", "b", "a", "c"]), DictionaryOptions::default());
        let first = drain(&dictionary);
        dictionary.reset();
        assert_eq!(drain(&dictionary), first);
        assert_eq!(first, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_regenerate_matches_fresh_instance() {
        let source = lines(&["admin", "%EXT%", "backup/"]);
        let dictionary = Dictionary::new(source.clone(), DictionaryOptions::default());
        dictionary.next();

        let options = DictionaryOptions {
            extensions: vec!["php".to_string(), "txt".to_string()],
            force_extensions: true,
            ..DictionaryOptions::default()
        };
        dictionary.regenerate(options.clone());

        let fresh = Dictionary::new(source, options);
        assert_eq!(drain(&dictionary), drain(&fresh));
    }

    #[test]
    fn test_concurrent_next_hands_out_each_index_once() {
        let words: Vec<String> = (0..5000).map(|i| format!("word{}", i)).collect();
        let dictionary = Arc::new(Dictionary::new(words, DictionaryOptions::default()));
        let total = dictionary.len();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dictionary = dictionary.clone();
                std::thread::spawn(move || {
                    let mut seen = Vec::new();
                    let mut last = 0;
                    while let Some((index, _)) = dictionary.next() {
                        // Indices only grow, even within one caller
                        assert!(index > last);
                        last = index;
                        seen.push(index);
                    }
                    seen
                })
            })
            .collect();

        let mut all = HashSet::new();
        let mut count = 0;
        for handle in handles {
            for index in handle.join().unwrap() {
                assert!(all.insert(index), "index {} handed out twice", index);
                count += 1;
            }
        }
        assert_eq!(count, total);
        assert_eq!(all, (1..=total).collect::<HashSet<_>>());
    }

    #[test]
    fn test_index_roundtrip_for_sessions() {
        let dictionary = Dictionary::new(lines(&["a", "b", "c"]), DictionaryOptions::default());
        dictionary.next();
        dictionary.next();
        let saved = dictionary.index();

        let restored = Dictionary::new(lines(&["a", "b", "c"]), DictionaryOptions::default());
        restored.set_index(saved);
        assert_eq!(restored.next(), Some((3, "c".to_string())));
        restored.set_index(99);
        assert_eq!(restored.next(), None);
    }

    #[test]
    fn test_variants_apply_prefixes_and_suffixes() {
        let options = DictionaryOptions {
            prefixes: vec![".".to_string(), "_".to_string()],
            suffixes: vec!["~".to_string(), ".bak".to_string()],
            ..DictionaryOptions::default()
        };
        let dictionary = Dictionary::new(lines(&["config"]), options);

        assert_eq!(
            dictionary.variants("config"),
            vec![".config", "_config", "config~", "config.bak"]
        );
        // directories and query strings don't get suffixes, prefixed entries
        // don't get the same prefix twice
        assert_eq!(dictionary.variants("_admin/"), vec!["._admin/"]);
        assert_eq!(dictionary.variants("a?x=1"), vec![".a?x=1", "_a?x=1"]);
    }

    #[test]
    fn test_variants_without_options_is_identity() {
        let dictionary = Dictionary::new(lines(&["admin"]), DictionaryOptions::default());
        assert_eq!(dictionary.variants("admin"), vec!["admin"]);
    }

    #[test]
    fn test_is_valid_rejects_excluded_extensions() {
        let options = DictionaryOptions {
            exclude_extensions: vec!["jpg".to_string()],
            ..DictionaryOptions::default()
        };
        let dictionary = Dictionary::new(lines(&["a"]), options);
        assert!(!dictionary.is_valid("static/logo.jpg"));
        assert!(dictionary.is_valid("static/"));
        assert!(dictionary.is_valid("index.php"));
    }
}
