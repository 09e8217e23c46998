use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::ArgMatches;
use client::UploadParams;
use kernel::{FileFilter, SortOrder};

pub async fn upload(uri: &str, matches: &ArgMatches) {
    let Some(file) = matches.get_one::<String>("file") else {
        return;
    };
    let params = UploadParams {
        uri: uri.to_owned(),
        file: file.clone(),
        content_type: matches.get_one::<String>("type").cloned(),
    };
    client::upload_file(params).await;
}

pub async fn list(uri: &str, matches: &ArgMatches) {
    let filter = FileFilter {
        name: matches.get_one::<String>("name").cloned(),
        kind: matches.get_one::<String>("type").cloned(),
        min_size: matches.get_one::<u64>("min-size").copied(),
        max_size: matches.get_one::<u64>("max-size").copied(),
        start_date: matches.get_one::<DateTime<Utc>>("start-date").copied(),
        end_date: matches.get_one::<DateTime<Utc>>("end-date").copied(),
        ordering: matches.get_one::<SortOrder>("ordering").copied(),
    };
    client::list_files(uri, &filter).await;
}

pub async fn stats(uri: &str) {
    client::show_stats(uri).await;
}

pub async fn delete(uri: &str, matches: &ArgMatches) {
    if let Some(id) = matches.get_one::<i64>("id") {
        client::delete_file(uri, *id).await;
    }
}

pub fn parse_ordering(value: &str) -> Result<SortOrder, String> {
    value.parse()
}

/// Accepts RFC 3339 or a plain `YYYY-MM-DD`, which means the start of that day.
pub fn parse_start_date(value: &str) -> Result<DateTime<Utc>, String> {
    parse_date(value, NaiveTime::default())
}

/// Accepts RFC 3339 or a plain `YYYY-MM-DD`, which means the end of that day.
pub fn parse_end_date(value: &str) -> Result<DateTime<Utc>, String> {
    let end_of_day = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or_default();
    parse_date(value, end_of_day)
}

fn parse_date(value: &str, time: NaiveTime) -> Result<DateTime<Utc>, String> {
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Ok(date.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|date| date.and_time(time).and_utc())
        .map_err(|_| format!("'{value}' is neither RFC 3339 nor YYYY-MM-DD"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case("2024-05-01", Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())]
    #[case("2024-05-01T10:30:00Z", Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap())]
    #[case("2024-05-01T12:30:00+02:00", Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap())]
    #[trace]
    fn start_date_parsing(#[case] value: &str, #[case] expected: DateTime<Utc>) {
        // Arrange

        // Act
        let actual = parse_start_date(value);

        // Assert
        assert_eq!(actual, Ok(expected));
    }

    #[test]
    fn plain_end_date_covers_whole_day() {
        // Arrange
        let last_second = Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 59).unwrap();

        // Act
        let actual = parse_end_date("2024-05-01").unwrap();

        // Assert
        assert!(actual > last_second);
        assert!(actual < Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap());
    }

    #[rstest]
    #[case("newest", SortOrder::Newest)]
    #[case("name_asc", SortOrder::NameAsc)]
    #[case("size_desc", SortOrder::SizeDesc)]
    #[trace]
    fn ordering_parsing(#[case] value: &str, #[case] expected: SortOrder) {
        // Arrange

        // Act
        let actual = parse_ordering(value);

        // Assert
        assert_eq!(actual, Ok(expected));
    }

    #[test]
    fn unknown_ordering_lists_choices() {
        // Arrange

        // Act
        let actual = parse_ordering("biggest");

        // Assert
        let message = actual.unwrap_err();
        assert!(message.contains("size_desc"));
    }

    #[rstest]
    #[case("")]
    #[case("yesterday")]
    #[case("2024-13-01")]
    #[case("01.05.2024")]
    #[trace]
    fn invalid_dates_rejected(#[case] value: &str) {
        // Arrange

        // Act
        let actual = parse_start_date(value);

        // Assert
        assert!(actual.is_err());
    }
}
