//! Braille sparklines.
//!
//! Each character cell holds two data points side by side and four vertical
//! sub-levels per row, so a plot of `rows` rows resolves `rows * 4` levels.

use std::fmt::Write;

pub const LEVELS_PER_ROW: usize = 4;

/// `GLYPHS[left][right]`, each index being the number of filled dots counted
/// from the bottom of that half of the cell.
const GLYPHS: [[char; 5]; 5] = [
    ['⠀', '⢀', '⢠', '⢰', '⢸'],
    ['⡀', '⣀', '⣠', '⣰', '⣸'],
    ['⡄', '⣄', '⣤', '⣴', '⣼'],
    ['⡆', '⣆', '⣦', '⣶', '⣾'],
    ['⡇', '⣇', '⣧', '⣷', '⣿'],
];

/// Renders `data` as `rows` lines of braille, framed by the maximum above and
/// the minimum below, both with 2 decimals.
///
/// An odd-length input repeats its last value to complete the final cell. A
/// flat input renders a one-dot baseline.
pub fn render(rows: usize, data: &[f64]) -> String {
    if rows == 0 || data.is_empty() {
        return String::new();
    }
    let (lo, hi) = min_max(data);
    let levels = rows * LEVELS_PER_ROW;
    let level = |value: f64| -> usize {
        if hi == lo {
            return 1;
        }
        let dot = (hi - lo) / levels as f64;
        let level = ((value - lo) / dot).round().max(0.0) as usize;
        level.min(levels)
    };
    let cells: Vec<(usize, usize)> = data
        .chunks(2)
        .map(|pair| (level(pair[0]), level(pair[pair.len() - 1])))
        .collect();

    let mut plot = String::new();
    let _ = writeln!(plot, "{hi:.2}");
    for row in (0..rows).rev() {
        let floor = row * LEVELS_PER_ROW;
        for &(left, right) in &cells {
            plot.push(GLYPHS[fill(left, floor)][fill(right, floor)]);
        }
        plot.push('\n');
    }
    let _ = write!(plot, "{lo:.2}");
    plot
}

fn fill(level: usize, floor: usize) -> usize {
    level.saturating_sub(floor).min(LEVELS_PER_ROW)
}

fn min_max(data: &[f64]) -> (f64, f64) {
    data.iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
            (lo.min(x), hi.max(x))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert_eq!(render(4, &[]), "");
        assert_eq!(render(0, &[1.0, 2.0]), "");
    }

    #[test]
    fn test_flat() {
        let plot = render(4, &[5.0, 5.0, 5.0, 5.0]);
        assert_eq!(plot, "5.00\n⠀⠀\n⠀⠀\n⠀⠀\n⣀⣀\n5.00");
    }

    #[test]
    fn test_ramp_with_odd_length() {
        let data: Vec<f64> = (0..9).map(f64::from).collect();
        let plot = render(2, &data);
        assert_eq!(plot, "8.00\n⠀⠀⢀⣴⣿\n⢀⣴⣿⣿⣿\n0.00");
    }

    #[test]
    fn test_negative_range() {
        assert_eq!(render(1, &[-2.0, 2.0]), "2.00\n⢸\n-2.00");
    }

    #[test]
    fn test_rounding_to_nearest_level() {
        // dot = 0.25; 0.1 rounds down, 0.15 rounds up
        let plot = render(1, &[0.0, 0.1, 0.15, 1.0]);
        assert_eq!(plot, "1.00\n⠀⣸\n0.00");
    }

    #[test]
    fn test_deterministic() {
        let data = [21.3, 22.9, 20.1, 24.4, 23.0, 19.8, 22.2];
        assert_eq!(render(3, &data), render(3, &data));
        let lines = render(3, &data).lines().count();
        assert_eq!(lines, 5);
    }
}
