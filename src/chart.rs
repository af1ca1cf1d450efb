/// Widest bar in the text chart, in blocks.
const BAR_WIDTH: u32 = 16;

/// Render the {name -> penalty} view as fixed-width text bars, one member
/// per line. Meant for a `<pre>` block; callers escape names for HTML.
/// Scaled to the worst offender; any non-zero penalty shows at least one
/// block.
pub fn render_penalty_bars(series: &[(String, u32)]) -> String {
    if series.is_empty() {
        return String::new();
    }

    let max = series.iter().map(|(_, p)| *p).max().unwrap_or(0);
    let name_width = series
        .iter()
        .map(|(name, _)| name.chars().count())
        .max()
        .unwrap_or(0);

    let mut lines = Vec::with_capacity(series.len());
    for (name, penalty) in series {
        let blocks = if max == 0 {
            0
        } else {
            (penalty * BAR_WIDTH).div_ceil(max)
        };
        let bar = "█".repeat(blocks as usize);
        lines.push(format!("{name:<name_width$} {bar:<bw$} {penalty}", bw = BAR_WIDTH as usize));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(rows: &[(&str, u32)]) -> Vec<(String, u32)> {
        rows.iter().map(|(n, p)| (n.to_string(), *p)).collect()
    }

    #[test]
    fn empty_series_renders_nothing() {
        assert_eq!(render_penalty_bars(&[]), "");
    }

    #[test]
    fn all_clear_shows_zeros_without_bars() {
        let out = render_penalty_bars(&series(&[("ann", 0), ("bob", 0)]));
        assert!(!out.contains('█'));
        assert_eq!(out.lines().count(), 2);
        assert!(out.lines().all(|l| l.trim_end().ends_with('0')));
    }

    #[test]
    fn worst_offender_gets_the_full_bar() {
        let out = render_penalty_bars(&series(&[("ann", 8), ("bob", 2)]));
        let ann = out.lines().next().unwrap();
        let bob = out.lines().nth(1).unwrap();
        assert_eq!(ann.matches('█').count(), BAR_WIDTH as usize);
        assert_eq!(bob.matches('█').count(), 4);
    }

    #[test]
    fn nonzero_penalty_is_always_visible() {
        let out = render_penalty_bars(&series(&[("ann", 100), ("bob", 1)]));
        let bob = out.lines().nth(1).unwrap();
        assert!(bob.contains('█'));
    }

    #[test]
    fn names_are_padded_to_a_column() {
        let out = render_penalty_bars(&series(&[("jo", 1), ("annabel", 2)]));
        let bars: Vec<usize> = out.lines().map(|l| l.find('█').unwrap()).collect();
        assert_eq!(bars[0], bars[1]);
    }
}
