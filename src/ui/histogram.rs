/// Histogram plot
/// Log-scaled bin counts with the black and white levels marked
use iced::widget::canvas::{self, Path, Stroke};
use iced::{Color, Point, Rectangle};

use astro_viewer::panels::histogram::LOG_FLOOR;

use crate::Message;

#[derive(Debug, Clone, Default)]
pub struct HistogramPlot {
    /// Display counts; empty bins already sit at the log floor
    pub counts: Vec<f64>,
    /// Black level as a fraction of the histogram range
    pub black: Option<f32>,
    /// White level as a fraction of the histogram range
    pub white: Option<f32>,
}

impl HistogramPlot {
    /// Bar height in 0..=1 on a log scale
    fn scaled(count: f64, max: f64) -> f32 {
        if max <= LOG_FLOOR {
            return 0.0;
        }
        ((count / LOG_FLOOR).ln() / (max / LOG_FLOOR).ln()) as f32
    }
}

impl canvas::Program<Message> for HistogramPlot {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &iced::Renderer,
        _theme: &iced::Theme,
        bounds: Rectangle,
        _cursor: iced::mouse::Cursor,
    ) -> Vec<canvas::Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());

        if self.counts.is_empty() {
            return vec![frame.into_geometry()];
        }

        let max = self.counts.iter().copied().fold(LOG_FLOOR, f64::max);
        let width = bounds.width;
        let height = bounds.height;
        let bar_width = width / self.counts.len() as f32;

        let mut bars = canvas::path::Builder::new();
        for (i, &count) in self.counts.iter().enumerate() {
            let bar_height = Self::scaled(count, max) * height;
            if bar_height <= 0.0 {
                continue;
            }
            let x = (i as f32 + 0.5) * bar_width;
            bars.move_to(Point::new(x, height));
            bars.line_to(Point::new(x, height - bar_height));
        }
        frame.stroke(
            &bars.build(),
            Stroke::default()
                .with_color(Color::from_rgba(0.8, 0.8, 0.8, 0.8))
                .with_width(bar_width.max(1.0)),
        );

        let levels = [
            (self.black, Color::from_rgb(0.3, 0.5, 1.0)),
            (self.white, Color::from_rgb(1.0, 0.8, 0.2)),
        ];
        for (fraction, color) in levels {
            let Some(fraction) = fraction else {
                continue;
            };
            let x = fraction.clamp(0.0, 1.0) * width;
            frame.stroke(
                &Path::line(Point::new(x, 0.0), Point::new(x, height)),
                Stroke::default().with_color(color).with_width(1.5),
            );
        }

        vec![frame.into_geometry()]
    }
}
