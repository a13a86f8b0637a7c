use anyhow::Context;
use plotters::prelude::*;

const PLOT_SIZE: (u32, u32) = (800, 480);

pub struct PlotLabels<'a> {
    pub title: &'a str,
    pub x: &'a str,
    pub y: &'a str,
}

/// Render `metric` against `time` as an SVG line chart, with an optional
/// smoothed series overlaid in red.
pub fn render_line_plot(
    time: &[f64],
    metric: &[f64],
    smoothed: Option<&[f64]>,
    labels: &PlotLabels<'_>,
) -> anyhow::Result<Vec<u8>> {
    anyhow::ensure!(
        !time.is_empty() && time.len() == metric.len(),
        "plot needs two non-empty series of equal length"
    );
    if let Some(s) = smoothed {
        anyhow::ensure!(s.len() == time.len(), "smoothed series length mismatch");
    }

    let (x_min, x_max) = padded_bounds(time.iter().copied());
    let (y_min, y_max) =
        padded_bounds(metric.iter().chain(smoothed.unwrap_or_default()).copied());

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, PLOT_SIZE).into_drawing_area();
        root.fill(&WHITE).context("fill plot background")?;

        let mut chart = ChartBuilder::on(&root)
            .caption(labels.title, ("sans-serif", 20))
            .margin(12)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(x_min..x_max, y_min..y_max)
            .context("build plot axes")?;

        chart
            .configure_mesh()
            .x_desc(labels.x)
            .y_desc(labels.y)
            .draw()
            .context("draw plot mesh")?;

        chart
            .draw_series(LineSeries::new(
                time.iter().copied().zip(metric.iter().copied()),
                &BLUE,
            ))
            .context("draw metric series")?;

        if let Some(s) = smoothed {
            chart
                .draw_series(LineSeries::new(
                    time.iter().copied().zip(s.iter().copied()),
                    &RED,
                ))
                .context("draw smoothed series")?;
        }

        root.present().context("finish plot")?;
    }

    Ok(svg.into_bytes())
}

fn padded_bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if (hi - lo).abs() < f64::EPSILON {
        return (lo - 1.0, hi + 1.0);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad, hi + pad)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> PlotLabels<'static> {
        PlotLabels {
            title: "Reaction 1",
            x: "time",
            y: "conversion (%)",
        }
    }

    #[test]
    fn renders_svg_document() {
        let svg = render_line_plot(&[1.0, 2.0, 3.0], &[10.0, 25.0, 40.0], None, &labels()).unwrap();
        let text = String::from_utf8(svg).unwrap();
        assert!(text.contains("<svg"));
        assert!(text.contains("</svg>"));
    }

    #[test]
    fn overlays_smoothed_series() {
        let plain = render_line_plot(&[1.0, 2.0, 3.0], &[1.0, 5.0, 2.0], None, &labels()).unwrap();
        let overlay = render_line_plot(
            &[1.0, 2.0, 3.0],
            &[1.0, 5.0, 2.0],
            Some(&[2.0, 3.0, 2.5]),
            &labels(),
        )
        .unwrap();
        assert!(overlay.len() > plain.len());
    }

    #[test]
    fn rejects_mismatched_series() {
        assert!(render_line_plot(&[1.0, 2.0], &[1.0], None, &labels()).is_err());
        assert!(render_line_plot(&[], &[], None, &labels()).is_err());
    }

    #[test]
    fn flat_series_gets_non_empty_range() {
        assert_eq!(padded_bounds([4.0, 4.0].into_iter()), (3.0, 5.0));
        assert_eq!(padded_bounds(std::iter::empty()), (0.0, 1.0));
    }
}
