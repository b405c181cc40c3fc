//! Index naming and matching.
//!
//! Layout: `activities__feed_id_<unique_id>__date_<YYYY-MM-DD>__timestamp_<unix-sec>__batch_id_<10 hex>__`
//!
//! The alias itself is the literal name `activities`; only index names start
//! with the longer `activities_` prefix that [`list_indexes`][super::gateway::SearchGateway::list_indexes]
//! filters on.

use chrono::{DateTime, Utc};
use rand::Rng;

pub const ALIAS: &str = "activities";

/// Everything else generated by us shares this prefix; the bare alias name
/// never does (it has no trailing underscore).
pub const INDEX_PREFIX: &str = "activities_";

/// Generate a fresh, collision-resistant index name for `feed_id` at `now`.
pub fn new_index_name(feed_id: &str, now: DateTime<Utc>) -> String {
    let batch_id: String = {
        let mut rng = rand::thread_rng();
        (0..10)
            .map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap())
            .collect()
    };
    format!(
        "activities__feed_id_{feed_id}__date_{}__timestamp_{}__batch_id_{batch_id}__",
        now.format("%Y-%m-%d"),
        now.timestamp(),
    )
}

/// The substring that uniquely identifies an index as belonging to `feed_id`.
pub fn feed_marker(feed_id: &str) -> String {
    format!("activities__feed_id_{feed_id}__")
}

/// Does `index_name` belong to `feed_id`?
pub fn matches_feed(index_name: &str, feed_id: &str) -> bool {
    index_name.contains(&feed_marker(feed_id))
}

/// Does `index_name` belong to any of `feed_ids`?
pub fn matches_any_feed<'a>(index_name: &str, feed_ids: impl IntoIterator<Item = &'a str>) -> bool {
    feed_ids.into_iter().any(|id| matches_feed(index_name, id))
}

/// Glob-style pattern used by `alias_flip`'s remove-by-pattern action: every
/// index that could ever have been live for this feed.
pub fn feed_alias_removal_pattern(feed_id: &str) -> String {
    format!("{}*", feed_marker(feed_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 30, 12, 0, 0).unwrap()
    }

    #[test]
    fn generated_name_matches_its_own_feed() {
        let name = new_index_name("F1", fixed_time());
        assert!(matches_feed(&name, "F1"));
        assert!(!matches_feed(&name, "F2"));
    }

    #[test]
    fn generated_name_has_expected_layout() {
        let name = new_index_name("F1", fixed_time());
        assert!(name.starts_with("activities__feed_id_F1__date_2026-07-30__timestamp_"));
        assert!(name.ends_with("__"));
    }

    #[test]
    fn two_names_for_same_feed_differ() {
        let a = new_index_name("F1", fixed_time());
        let b = new_index_name("F1", fixed_time());
        assert_ne!(a, b);
    }

    #[test]
    fn feed_marker_is_not_a_substring_of_unrelated_feed_ids() {
        // F1 must not accidentally match an index for F10, F11, ...
        assert!(!matches_feed("activities__feed_id_F10__date_x__", "F1"));
    }
}
