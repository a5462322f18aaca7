//! Day color palette and segment rendering defaults.

const DAY_COLORS: [&str; 10] = [
    "#4285F4", // blue
    "#EA4335", // red
    "#34A853", // green
    "#FBBC05", // yellow
    "#8E24AA", // purple
    "#00ACC1", // cyan
    "#FF7043", // deep orange
    "#5C6BC0", // indigo
    "#26A69A", // teal
    "#EC407A", // pink
];

/// Default rendered width for segments without an explicit override.
pub const DEFAULT_SEGMENT_WIDTH: f64 = 4.0;

/// Color for the day at the given position, wrapping around the palette.
pub fn day_color(index: usize) -> &'static str {
    DAY_COLORS[index % DAY_COLORS.len()]
}
