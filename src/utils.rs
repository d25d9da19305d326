//! Utility functions for the ladder service

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique player ID
pub fn generate_player_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a new unique queue ID
pub fn generate_queue_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new unique match ID
pub fn generate_match_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Calculate the absolute difference between two ratings
pub fn rating_difference(rating1: f64, rating2: f64) -> f64 {
    (rating1 - rating2).abs()
}

/// Raise a rating to the balancing exponent.
///
/// Integral exponents use repeated multiplication so that sums over a team
/// stay exact for realistic ratings.
pub fn rating_power(rating: i32, exponent: f64) -> f64 {
    let base = rating as f64;
    if exponent.fract() == 0.0 && exponent <= i32::MAX as f64 {
        base.powi(exponent as i32)
    } else {
        base.powf(exponent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ids() {
        assert_ne!(generate_queue_id(), generate_queue_id());
        assert_ne!(generate_match_id(), generate_match_id());
        assert_ne!(generate_player_id(), generate_player_id());
    }

    #[test]
    fn test_rating_difference() {
        assert_eq!(rating_difference(1500.0, 1400.0), 100.0);
        assert_eq!(rating_difference(1400.0, 1500.0), 100.0);
        assert_eq!(rating_difference(1500.0, 1500.0), 0.0);
    }

    #[test]
    fn test_rating_power() {
        assert_eq!(rating_power(2000, 1.0), 2000.0);
        assert_eq!(rating_power(2000, 3.0), 8_000_000_000.0);
        assert!((rating_power(400, 0.5) - 20.0).abs() < 1e-9);
    }
}
