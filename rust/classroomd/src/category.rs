use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Green,
    Orange,
    Red,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    pub green: i64,
    pub orange: i64,
}

/// Cohort-relative thresholds: green is the value at the 50% rank and orange
/// at the 75% rank of the descending point totals. Cohorts too small for a
/// rank fall back to 0.
pub fn thresholds(points: &[i64]) -> Thresholds {
    let mut sorted = points.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    let n = sorted.len();

    let green = if n > 1 { sorted[n / 2 - 1] } else { 0 };
    let orange = if n > 3 { sorted[(3 * n) / 4 - 1] } else { 0 };

    Thresholds { green, orange }
}

pub fn categorize(points: i64, t: Thresholds) -> Category {
    if points >= t.green {
        Category::Green
    } else if points >= t.orange {
        Category::Orange
    } else {
        Category::Red
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_student_cohort_thresholds() {
        let t = thresholds(&[2, 8, 10, 5, 8]);
        assert_eq!(t, Thresholds { green: 8, orange: 8 });
        assert_eq!(categorize(8, t), Category::Green);
        assert_eq!(categorize(5, t), Category::Red);
        assert_eq!(categorize(2, t), Category::Red);
        assert_eq!(categorize(10, t), Category::Green);
    }

    #[test]
    fn orange_band_between_thresholds() {
        // n=8: green at rank 3, orange at rank 5.
        let t = thresholds(&[20, 15, 12, 10, 7, 5, 1, -4]);
        assert_eq!(t, Thresholds { green: 10, orange: 5 });
        assert_eq!(categorize(10, t), Category::Green);
        assert_eq!(categorize(7, t), Category::Orange);
        assert_eq!(categorize(5, t), Category::Orange);
        assert_eq!(categorize(1, t), Category::Red);
    }

    #[test]
    fn small_cohorts_use_zero_fallbacks() {
        assert_eq!(thresholds(&[]), Thresholds::default());

        let single = thresholds(&[7]);
        assert_eq!(single, Thresholds { green: 0, orange: 0 });
        assert_eq!(categorize(7, single), Category::Green);
        assert_eq!(categorize(0, single), Category::Green);
        assert_eq!(categorize(-3, single), Category::Red);

        // n=3: green from the top value, orange still 0.
        let three = thresholds(&[4, -1, 9]);
        assert_eq!(three, Thresholds { green: 9, orange: 0 });
        assert_eq!(categorize(4, three), Category::Orange);
        assert_eq!(categorize(-1, three), Category::Red);
    }

    #[test]
    fn negative_cohorts_still_rank() {
        let t = thresholds(&[-1, -2, -3, -4]);
        assert_eq!(t, Thresholds { green: -2, orange: -3 });
        assert_eq!(categorize(-1, t), Category::Green);
        assert_eq!(categorize(-3, t), Category::Orange);
        assert_eq!(categorize(-4, t), Category::Red);
    }
}
