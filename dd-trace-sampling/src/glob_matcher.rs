// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use lru::LruCache;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// A backtracking implementation of the glob matching algorithm.
///
/// The glob pattern language supports `*` as a multiple character wildcard
/// (including empty string) and `?` as a single character wildcard. All other
/// characters match literally; the match is case sensitive.
///
/// This implementation includes an LRU cache for faster repeated matching.
pub struct GlobMatcher {
    /// The original glob pattern
    pattern: String,
    /// LRU cache of previously matched strings to their results
    cache: Mutex<LruCache<String, bool>>,
}

impl fmt::Debug for GlobMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobMatcher")
            .field("pattern", &self.pattern)
            .field("cache_size", &self.cache.lock().unwrap().len())
            .finish()
    }
}

impl GlobMatcher {
    /// Creates a new GlobMatcher with the given pattern
    pub fn new(pattern: &str) -> Self {
        let cache_size = NonZeroUsize::new(256).unwrap();
        GlobMatcher {
            pattern: pattern.to_string(),
            cache: Mutex::new(LruCache::new(cache_size)),
        }
    }

    /// Returns the original pattern
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Checks if the given subject matches the glob pattern
    pub fn matches(&self, subject: &str) -> bool {
        {
            let mut cache = self.cache.lock().unwrap();
            if let Some(&result) = cache.get(subject) {
                return result;
            }
        }

        let pattern = self.pattern.as_bytes();
        let subject_bytes = subject.as_bytes();

        let mut px = 0; // Pattern index
        let mut sx = 0; // Subject index
        let mut next_px = 0; // Next backtracking pattern index
        let mut next_sx = 0; // Next backtracking subject index

        while px < pattern.len() || sx < subject_bytes.len() {
            if px < pattern.len() {
                let char = pattern[px];

                if char == b'?' {
                    // Single character wildcard
                    if sx < subject_bytes.len() {
                        px += 1;
                        sx += 1;
                        continue;
                    }
                } else if char == b'*' {
                    // Zero-or-more characters wildcard
                    next_px = px;
                    next_sx = sx + 1;
                    px += 1;
                    continue;
                } else if sx < subject_bytes.len() && subject_bytes[sx] == char {
                    // Normal character match
                    px += 1;
                    sx += 1;
                    continue;
                }
            }

            // If we can backtrack (we've seen a * and have more characters in subject)
            if 0 < next_sx && next_sx <= subject_bytes.len() {
                px = next_px;
                sx = next_sx;
                continue;
            }

            // We've exhausted all options and no match was found
            {
                let mut cache = self.cache.lock().unwrap();
                cache.put(subject.to_string(), false);
            }
            return false;
        }

        // Both strings are consumed entirely, it's a match
        {
            let mut cache = self.cache.lock().unwrap();
            cache.put(subject.to_string(), true);
        }
        true
    }
}

impl Clone for GlobMatcher {
    fn clone(&self) -> Self {
        // Create a new matcher with the same pattern
        // This doesn't clone the cache since each instance maintains its own cache
        GlobMatcher::new(&self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_exact_match() {
        let matcher = GlobMatcher::new("hello");
        assert!(matcher.matches("hello"));
        assert!(!matcher.matches("HELLO")); // Case sensitive
        assert!(!matcher.matches("hello world"));
        assert!(!matcher.matches("hell"));
    }

    #[test]
    fn test_glob_question_mark() {
        let matcher = GlobMatcher::new("h?llo");
        assert!(matcher.matches("hello"));
        assert!(matcher.matches("hallo"));
        assert!(!matcher.matches("hlo"));
        assert!(!matcher.matches("heello"));
    }

    #[test]
    fn test_glob_asterisk() {
        let matcher = GlobMatcher::new("h*o");
        assert!(matcher.matches("hello"));
        assert!(matcher.matches("ho"));
        assert!(matcher.matches("hello world o"));
        assert!(!matcher.matches("hell"));

        let matcher = GlobMatcher::new("h*");
        assert!(matcher.matches("hello"));
        assert!(matcher.matches("h"));
        assert!(!matcher.matches("world"));
    }

    #[test]
    fn test_glob_empty_pattern_and_subject() {
        let matcher = GlobMatcher::new("");
        assert!(matcher.matches(""));
        assert!(!matcher.matches("a"));

        let matcher = GlobMatcher::new("*");
        assert!(matcher.matches(""));
        assert!(matcher.matches("anything at all"));
    }

    #[test]
    fn test_glob_complex() {
        let matcher = GlobMatcher::new("c*t?r*");
        assert!(matcher.matches("contoroller"));
        assert!(matcher.matches("cater"));
        assert!(matcher.matches("ctfr!"));
        assert!(!matcher.matches("car"));

        let matcher = GlobMatcher::new("*service*");
        assert!(matcher.matches("myservice"));
        assert!(matcher.matches("service"));
        assert!(matcher.matches("my service name"));
        assert!(!matcher.matches("svc"));
    }

    #[test]
    fn test_glob_against_reference() {
        // Reference recursive matcher, checked against the backtracking one
        fn reference(pattern: &[u8], subject: &[u8]) -> bool {
            match pattern.split_first() {
                None => subject.is_empty(),
                Some((b'*', rest)) => (0..=subject.len())
                    .any(|skip| reference(rest, &subject[skip..])),
                Some((b'?', rest)) => {
                    !subject.is_empty() && reference(rest, &subject[1..])
                }
                Some((&c, rest)) => {
                    subject.first() == Some(&c) && reference(rest, &subject[1..])
                }
            }
        }

        let patterns = ["", "*", "a*", "*a", "a?c", "a*c*e", "??", "db.*", "a**b"];
        let subjects = ["", "a", "abc", "abcde", "axcye", "db.query", "ab", "aXb"];

        for pattern in patterns {
            let matcher = GlobMatcher::new(pattern);
            for subject in subjects {
                assert_eq!(
                    matcher.matches(subject),
                    reference(pattern.as_bytes(), subject.as_bytes()),
                    "pattern {pattern:?} against {subject:?}"
                );
            }
        }
    }

    #[test]
    fn test_glob_caching() {
        let matcher = GlobMatcher::new("c*t?r*");

        // First match should populate cache
        assert!(matcher.matches("contoroller"));

        // Check the cache
        let cache = matcher.cache.lock().unwrap();
        assert!(cache.contains(&"contoroller".to_string()));
        drop(cache);

        // Add another entry to cache
        assert!(!matcher.matches("car"));

        // Verify both are in cache
        let cache = matcher.cache.lock().unwrap();
        assert!(cache.contains(&"contoroller".to_string()));
        assert!(cache.contains(&"car".to_string()));
    }
}
