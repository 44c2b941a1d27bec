//! Date filtering of image collections.

use lcmap_core::{AcquisitionDate, Collection, Error, Result};
use std::fmt;

/// Half-open date interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: AcquisitionDate,
    pub end: AcquisitionDate,
}

impl DateRange {
    pub fn new(start: AcquisitionDate, end: AcquisitionDate) -> Result<Self> {
        if end <= start {
            return Err(Error::InvalidParameter {
                name: "end",
                value: end.to_string(),
                reason: format!("must be after start {start}"),
            });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: AcquisitionDate) -> bool {
        self.start <= date && date < self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// `[year-01-01, (year+1)-01-01)`
pub fn calendar_year(year: i32) -> DateRange {
    DateRange {
        start: AcquisitionDate::start_of_year(year),
        end: AcquisitionDate::start_of_year(year + 1),
    }
}

/// Keep the scenes acquired inside `range` (end exclusive).
pub fn filter_date(collection: Collection, range: DateRange) -> Collection {
    collection.filter(|scene| range.contains(scene.date()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcmap_core::Scene;

    fn scene(date: &str) -> Scene {
        Scene::new(date, date.parse().unwrap())
    }

    #[test]
    fn year_bounds_are_half_open() {
        let year = calendar_year(2022);
        assert!(year.contains("2022-01-01".parse().unwrap()));
        assert!(year.contains("2022-12-31".parse().unwrap()));
        assert!(!year.contains("2023-01-01".parse().unwrap()));
        assert!(!year.contains("2021-12-31".parse().unwrap()));
    }

    #[test]
    fn filter_keeps_scenes_in_range() {
        let c = Collection::new(
            "test",
            vec![scene("2021-12-31"), scene("2022-05-04"), scene("2023-01-01")],
        );
        let kept = filter_date(c, calendar_year(2022));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.scenes()[0].id(), "2022-05-04");
        assert_eq!(kept.id(), "test");
    }

    #[test]
    fn reversed_range_is_rejected() {
        let a = AcquisitionDate::new(2022, 5, 1).unwrap();
        let b = AcquisitionDate::new(2022, 1, 1).unwrap();
        assert!(DateRange::new(a, b).is_err());
        assert!(DateRange::new(b, a).is_ok());
    }
}
