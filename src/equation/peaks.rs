//! Dip detection in CEST and R1rho profiles, used to seed chemical shifts and rates

/// A local extremum of a profile relative to its baseline
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Dip {
    /// Offset in ppm
    pub position: f64,
    /// Distance from the baseline, always positive
    pub depth: f64,
    /// Full width at half depth in ppm
    pub width: f64,
}

/// Find the dips of a profile, deepest first
///
/// With `inverted` the profile is searched for maxima above the minimum instead of
/// minima below the maximum (R1rho rates rise towards resonance where CEST
/// intensities fall). Dips shallower than 5% of the deepest one are ignored.
pub(crate) fn find_dips(offsets: &[f64], values: &[f64], inverted: bool) -> Vec<Dip> {
    let mut points: Vec<(f64, f64)> = offsets
        .iter()
        .zip(values.iter())
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| (*x, if inverted { -*y } else { *y }))
        .collect();
    if points.is_empty() {
        return Vec::new();
    }
    points.sort_by(|a, b| a.0.total_cmp(&b.0));

    let baseline = points
        .iter()
        .map(|p| p.1)
        .fold(f64::NEG_INFINITY, f64::max);
    let n = points.len();
    let mut dips: Vec<Dip> = (0..n)
        .filter(|&i| {
            let y = points[i].1;
            let left = i == 0 || y <= points[i - 1].1;
            let right = i + 1 == n || y <= points[i + 1].1;
            left && right && y < baseline
        })
        .map(|i| Dip {
            position: points[i].0,
            depth: baseline - points[i].1,
            width: half_width(&points, i, baseline),
        })
        .collect();

    dips.sort_by(|a, b| b.depth.total_cmp(&a.depth));
    if let Some(deepest) = dips.first().map(|d| d.depth) {
        dips.retain(|d| d.depth >= 0.05 * deepest);
    }
    dips
}

fn half_width(points: &[(f64, f64)], center: usize, baseline: f64) -> f64 {
    let level = 0.5 * (points[center].1 + baseline);
    let crossing = |from: usize, to: usize| -> f64 {
        let (x0, y0) = points[from];
        let (x1, y1) = points[to];
        if (y1 - y0).abs() < f64::EPSILON {
            x1
        } else {
            x0 + (level - y0) * (x1 - x0) / (y1 - y0)
        }
    };

    let mut left = points[0].0;
    for i in (0..center).rev() {
        if points[i].1 >= level {
            left = crossing(i + 1, i);
            break;
        }
    }
    let mut right = points[points.len() - 1].0;
    for i in center + 1..points.len() {
        if points[i].1 >= level {
            right = crossing(i - 1, i);
            break;
        }
    }

    let width = right - left;
    if width > 0.0 {
        width
    } else {
        spacing(points)
    }
}

fn spacing(points: &[(f64, f64)]) -> f64 {
    if points.len() < 2 {
        return 1.0;
    }
    (points[points.len() - 1].0 - points[0].0) / (points.len() - 1) as f64
}
