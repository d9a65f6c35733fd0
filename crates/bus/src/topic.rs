// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Topic pattern matching (spec §6, §9 "Topic pattern matching").
//!
//! A two-pointer walk over the pattern's and topic's `/`-separated segments:
//! `+` consumes exactly one topic segment, a trailing `#` consumes one or
//! more remaining segments, anything else must match literally. No regex
//! engine is needed for this grammar.

/// Returns `true` if `topic` is matched by subscription `pattern`.
pub fn matches(pattern: &str, topic: &str) -> bool {
    let mut pat_segments = pattern.split('/');
    let mut topic_segments = topic.split('/');

    loop {
        match (pat_segments.next(), topic_segments.next()) {
            (Some("#"), topic_seg) => {
                // `#` must be the final pattern segment and matches one or
                // more remaining topic segments, so at least this one.
                return topic_seg.is_some();
            }
            (Some("+"), Some(_)) => continue,
            (Some("+"), None) => return false,
            (Some(p), Some(t)) => {
                if p != t {
                    return false;
                }
            }
            (Some(_), None) => return false,
            (None, Some(_)) => return false,
            (None, None) => return true,
        }
    }
}

/// Validates that a publisher's own topic string contains no wildcard
/// segments (spec §6: "A publisher's topic must be literal").
pub fn is_literal_topic(topic: &str) -> bool {
    topic.split('/').all(|seg| seg != "+" && seg != "#")
}

/// Validates that `#`, if present, only ever appears as the pattern's final
/// segment (spec §6 grammar).
pub fn is_valid_pattern(pattern: &str) -> bool {
    let segments: Vec<&str> = pattern.split('/').collect();
    let last = segments.len() - 1;
    segments
        .iter()
        .enumerate()
        .all(|(i, seg)| *seg != "#" || i == last)
}
