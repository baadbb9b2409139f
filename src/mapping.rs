//! Filter value -> on-page option position lookups.
//!
//! The tables mirror the option order of the width and depth filter panels on
//! the comparison site. Positions are 1-based `nth-child` indices; `UNMAPPED`
//! is returned for anything not in a table.

use tracing::debug;

/// Returned for values with no known option position.
pub const UNMAPPED: u32 = 0;

static WIDTH_POSITIONS: &[(&str, u32)] = &[("50", 1), ("100", 2)];

static DEPTH_POSITIONS: &[(&str, u32)] = &[("30", 1), ("60", 2)];

fn lookup(table: &[(&str, u32)], value: &str) -> u32 {
    table
        .iter()
        .find(|(key, _)| *key == value)
        .map(|(_, position)| *position)
        .unwrap_or(UNMAPPED)
}

/// Position of `value` inside the width filter, or [`UNMAPPED`].
pub fn map_width(value: &str) -> u32 {
    let position = lookup(WIDTH_POSITIONS, value);
    debug!(value, position, "width mapping");
    position
}

/// Position of `value` inside the depth filter, or [`UNMAPPED`].
pub fn map_depth(value: &str) -> u32 {
    let position = lookup(DEPTH_POSITIONS, value);
    debug!(value, position, "depth mapping");
    position
}

pub fn is_valid_width(value: &str) -> bool {
    lookup(WIDTH_POSITIONS, value) != UNMAPPED
}

pub fn is_valid_depth(value: &str) -> bool {
    lookup(DEPTH_POSITIONS, value) != UNMAPPED
}

pub fn supported_widths() -> Vec<&'static str> {
    WIDTH_POSITIONS.iter().map(|(key, _)| *key).collect()
}

pub fn supported_depths() -> Vec<&'static str> {
    DEPTH_POSITIONS.iter().map(|(key, _)| *key).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_widths_map_to_fixed_positions() {
        assert_eq!(map_width("50"), 1);
        assert_eq!(map_width("100"), 2);
    }

    #[test]
    fn known_depths_map_to_fixed_positions() {
        assert_eq!(map_depth("30"), 1);
        assert_eq!(map_depth("60"), 2);
    }

    #[test]
    fn unknown_values_are_unmapped() {
        for value in ["", "0", "30", "60", "75", " 50", "50 ", "100cm", "abc"] {
            assert_eq!(map_width(value), UNMAPPED, "width {value:?}");
        }
        for value in ["", "50", "100", "45", "30.0", "sixty"] {
            assert_eq!(map_depth(value), UNMAPPED, "depth {value:?}");
        }
    }

    #[test]
    fn validity_follows_the_tables() {
        assert!(is_valid_width("50"));
        assert!(!is_valid_width("60"));
        assert!(is_valid_depth("60"));
        assert!(!is_valid_depth("100"));
    }

    #[test]
    fn supported_values_keep_panel_order() {
        assert_eq!(supported_widths(), vec!["50", "100"]);
        assert_eq!(supported_depths(), vec!["30", "60"]);
    }
}
