//! Points awarded for an age guess.
//!
//! Both inputs are clamped into [`MIN_AGE`]..=[`MAX_AGE`] before comparison: the
//! HTTP layer rejects out-of-range guesses, so clamping only guards the engine
//! against callers that skip validation.

/// Lowest age a guess or a candidate can carry.
pub const MIN_AGE: u8 = 1;
/// Highest age a guess or a candidate can carry.
pub const MAX_AGE: u8 = 100;
/// Points awarded for an exact match.
pub const MAX_POINTS: u8 = 10;

/// Clamp any integer into the playable age range.
pub fn clamp_age(value: i64) -> u8 {
    value.clamp(MIN_AGE as i64, MAX_AGE as i64) as u8
}

/// Absolute distance between a guess and the true age, after clamping.
pub fn age_difference(guess: u8, actual: u8) -> u8 {
    clamp_age(guess as i64).abs_diff(clamp_age(actual as i64))
}

/// Points for `guess` against `actual`.
pub fn score(guess: u8, actual: u8) -> u8 {
    points_for_difference(age_difference(guess, actual))
}

/// Points for an already computed difference.
pub fn points_for_difference(difference: u8) -> u8 {
    match difference {
        0 => MAX_POINTS,
        1 => 9,
        2 => 7,
        3 => 5,
        4 => 3,
        5 => 2,
        6 | 7 => 1,
        _ => 0,
    }
}
