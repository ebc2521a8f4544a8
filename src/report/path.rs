//! Date-stamped report paths

use chrono::NaiveDate;
use std::path::PathBuf;

/// Placeholder replaced by the run date in a report path template.
pub const DATESTAMP_TOKEN: &str = "__DATESTAMP__";

/// Sortable date used in report file names, e.g. `2024-03-09`.
pub fn perf_date_stamp(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Replace every occurrence of `token` in `text`.
pub fn replace_occurrence(text: &str, token: &str, replacement: &str) -> String {
    if token.is_empty() {
        return text.to_owned();
    }
    text.replace(token, replacement)
}

/// Substitute the date placeholder in `template`.
pub fn resolve_report_path(template: &str, date: NaiveDate) -> PathBuf {
    PathBuf::from(replace_occurrence(
        template,
        DATESTAMP_TOKEN,
        &perf_date_stamp(date),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    #[test]
    fn substitutes_every_placeholder() {
        let path = resolve_report_path("out/__DATESTAMP__/timings-__DATESTAMP__.csv", date());
        assert_eq!(path, PathBuf::from("out/2024-03-09/timings-2024-03-09.csv"));
        assert!(!path.to_string_lossy().contains(DATESTAMP_TOKEN));
    }

    #[test]
    fn template_without_placeholder_is_untouched() {
        assert_eq!(resolve_report_path("timings.csv", date()), PathBuf::from("timings.csv"));
    }

    #[test]
    fn empty_token_is_ignored() {
        assert_eq!(replace_occurrence("abc", "", "x"), "abc");
    }
}
