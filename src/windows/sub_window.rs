/// MDI sub-window kinds
///
/// Every window the frame hosts is a `SubWindow` whose `WindowKind` carries
/// only the data that kind needs. Kind-specific behavior (title, type tag,
/// which image is current, whether it can save) is a `match` on the kind.

use std::rc::Rc;

use cgmath::Point2;
use chrono::{DateTime, NaiveDateTime, Utc};

use super::WindowId;
use crate::error::{Error, Result};
use crate::geometry::{Alignment, PixelPoint, Rect};
use crate::state::ImageHandle;

const MIN_ZOOM: f64 = 1.0 / 16.0;
const MAX_ZOOM: f64 = 64.0;

/// Pan and zoom of an image view
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Screen pixels per image pixel
    pub zoom: f64,
    /// Image position shown at the top-left corner of the view
    pub offset: PixelPoint,
    /// View size in screen pixels
    pub size: (f64, f64),
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            offset: Point2::new(0.0, 0.0),
            size: (800.0, 600.0),
        }
    }
}

impl Viewport {
    /// Image position under a screen position
    pub fn to_image(&self, x: f64, y: f64) -> PixelPoint {
        Point2::new(self.offset.x + x / self.zoom, self.offset.y + y / self.zoom)
    }

    /// Screen position of an image position
    pub fn to_screen(&self, point: PixelPoint) -> (f64, f64) {
        (
            (point.x - self.offset.x) * self.zoom,
            (point.y - self.offset.y) * self.zoom,
        )
    }

    /// Image region currently on screen
    pub fn visible_rect(&self) -> Rect {
        Rect::new(
            self.offset.x,
            self.offset.y,
            self.size.0 / self.zoom,
            self.size.1 / self.zoom,
        )
    }

    /// Zoom by `factor`, keeping the image point under the screen anchor fixed
    pub fn zoom_at(&mut self, factor: f64, anchor: (f64, f64)) {
        let fixed = self.to_image(anchor.0, anchor.1);
        self.zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        self.offset = Point2::new(fixed.x - anchor.0 / self.zoom, fixed.y - anchor.1 / self.zoom);
    }

    /// Move the view by a screen-space delta
    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.offset = Point2::new(self.offset.x - dx / self.zoom, self.offset.y - dy / self.zoom);
    }
}

/// A window showing one image
#[derive(Debug)]
pub struct ImageWindow {
    pub image: ImageHandle,
    pub viewport: Viewport,
}

/// Half of a comparison pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Input,
    Output,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Side::Input => Side::Output,
            Side::Output => Side::Input,
        }
    }
}

/// Two images side by side, related by an affine alignment
///
/// The focused side is the current image. Markers placed on one side are
/// mirrored onto the other.
#[derive(Debug)]
pub struct ComparisonWindow {
    pub input: ImageHandle,
    pub output: ImageHandle,
    /// Maps input pixels onto output pixels
    pub alignment: Alignment,
    pub focus: Side,
    /// Shared by both halves
    pub viewport: Viewport,
}

impl ComparisonWindow {
    pub fn image(&self, side: Side) -> &ImageHandle {
        match side {
            Side::Input => &self.input,
            Side::Output => &self.output,
        }
    }

    pub fn focused(&self) -> &ImageHandle {
        self.image(self.focus)
    }

    pub fn unfocused(&self) -> &ImageHandle {
        self.image(self.focus.other())
    }

    /// Position on the unfocused image matching a position on the focused one
    pub fn map_to_other(&self, point: PixelPoint) -> Option<PixelPoint> {
        match self.focus {
            Side::Input => Some(self.alignment.forward(point)),
            Side::Output => self.alignment.reverse(point),
        }
    }
}

const UNIX_EPOCH_JD: f64 = 2_440_587.5;
const MJD_OFFSET: f64 = 2_400_000.5;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Converts between calendar time (UTC) and Julian dates
#[derive(Debug, Clone, PartialEq)]
pub struct JulianDateCalculator {
    instant: DateTime<Utc>,
}

impl Default for JulianDateCalculator {
    fn default() -> Self {
        Self::at(Utc::now())
    }
}

impl JulianDateCalculator {
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self { instant }
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.instant
    }

    pub fn set_instant(&mut self, instant: DateTime<Utc>) {
        self.instant = instant;
    }

    /// Accepts RFC 3339 (`2024-03-01T20:15:00Z`) or `2024-03-01 20:15:00` in UTC
    pub fn set_from_text(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        let instant = DateTime::parse_from_rfc3339(text)
            .map(|t| t.with_timezone(&Utc))
            .or_else(|_| {
                NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").map(|t| t.and_utc())
            })
            .map_err(|e| Error::Unsupported(format!("cannot read date '{}': {}", text, e)))?;
        self.instant = instant;
        Ok(())
    }

    pub fn julian_day(&self) -> f64 {
        self.instant.timestamp_millis() as f64 / MILLIS_PER_DAY + UNIX_EPOCH_JD
    }

    pub fn modified_julian_day(&self) -> f64 {
        self.julian_day() - MJD_OFFSET
    }

    pub fn set_julian_day(&mut self, jd: f64) -> Result<()> {
        if !jd.is_finite() {
            return Err(Error::Unsupported(format!("invalid Julian day {}", jd)));
        }
        let millis = ((jd - UNIX_EPOCH_JD) * MILLIS_PER_DAY).round() as i64;
        self.instant = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| Error::Unsupported(format!("Julian day {} out of range", jd)))?;
        Ok(())
    }

    pub fn set_modified_julian_day(&mut self, mjd: f64) -> Result<()> {
        self.set_julian_day(mjd + MJD_OFFSET)
    }
}

#[derive(Debug)]
pub enum WindowKind {
    Image(ImageWindow),
    Comparison(ComparisonWindow),
    JulianDate(JulianDateCalculator),
}

#[derive(Debug)]
pub struct SubWindow {
    pub id: WindowId,
    pub kind: WindowKind,
}

impl SubWindow {
    pub fn image(id: WindowId, image: ImageHandle) -> Self {
        Self {
            id,
            kind: WindowKind::Image(ImageWindow {
                image,
                viewport: Viewport::default(),
            }),
        }
    }

    pub fn comparison(
        id: WindowId,
        input: ImageHandle,
        output: ImageHandle,
        alignment: Alignment,
    ) -> Self {
        Self {
            id,
            kind: WindowKind::Comparison(ComparisonWindow {
                input,
                output,
                alignment,
                focus: Side::Input,
                viewport: Viewport::default(),
            }),
        }
    }

    pub fn julian_date(id: WindowId) -> Self {
        Self {
            id,
            kind: WindowKind::JulianDate(JulianDateCalculator::default()),
        }
    }

    pub fn title(&self) -> String {
        match &self.kind {
            WindowKind::Image(window) => window.image.borrow().name(),
            WindowKind::Comparison(window) => format!(
                "{} vs {}",
                window.input.borrow().name(),
                window.output.borrow().name()
            ),
            WindowKind::JulianDate(_) => "Julian Date".to_string(),
        }
    }

    pub fn type_tag(&self) -> &'static str {
        match self.kind {
            WindowKind::Image(_) => "image",
            WindowKind::Comparison(_) => "comparison",
            WindowKind::JulianDate(_) => "julian-date",
        }
    }

    /// The image that becomes current when this window is active
    pub fn current_image(&self) -> Option<ImageHandle> {
        match &self.kind {
            WindowKind::Image(window) => Some(Rc::clone(&window.image)),
            WindowKind::Comparison(window) => Some(Rc::clone(window.focused())),
            WindowKind::JulianDate(_) => None,
        }
    }

    /// Every image the window shows
    pub fn images(&self) -> Vec<ImageHandle> {
        match &self.kind {
            WindowKind::Image(window) => vec![Rc::clone(&window.image)],
            WindowKind::Comparison(window) => {
                vec![Rc::clone(&window.input), Rc::clone(&window.output)]
            }
            WindowKind::JulianDate(_) => Vec::new(),
        }
    }

    /// Pan and zoom of the window's image view
    pub fn viewport(&self) -> Option<&Viewport> {
        match &self.kind {
            WindowKind::Image(window) => Some(&window.viewport),
            WindowKind::Comparison(window) => Some(&window.viewport),
            WindowKind::JulianDate(_) => None,
        }
    }

    pub fn viewport_mut(&mut self) -> Option<&mut Viewport> {
        match &mut self.kind {
            WindowKind::Image(window) => Some(&mut window.viewport),
            WindowKind::Comparison(window) => Some(&mut window.viewport),
            WindowKind::JulianDate(_) => None,
        }
    }

    pub fn can_save(&self) -> bool {
        match self.kind {
            WindowKind::Image(_) | WindowKind::Comparison(_) => true,
            WindowKind::JulianDate(_) => false,
        }
    }

    /// Any shown file has unsaved changes
    pub fn is_dirty(&self) -> bool {
        self.images().iter().any(|image| image.borrow().is_dirty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::astro::plane::testing::star_file;
    use crate::astro::TransferFunction;
    use crate::state::ControlImage;
    use approx::assert_relative_eq;
    use cgmath::Vector2;
    use chrono::TimeZone;
    use std::cell::RefCell;

    fn image(name: &str) -> ImageHandle {
        let file = Rc::new(RefCell::new(star_file(name, 8, 8, &[])));
        ControlImage::new(WindowId(1), file, TransferFunction::Linear, 1.0)
            .unwrap()
            .into_handle()
    }

    #[test]
    fn test_viewport_mapping() {
        let mut viewport = Viewport {
            zoom: 2.0,
            offset: Point2::new(10.0, 20.0),
            size: (100.0, 50.0),
        };
        assert_eq!(viewport.to_image(10.0, 10.0), Point2::new(15.0, 25.0));
        assert_eq!(viewport.to_screen(Point2::new(15.0, 25.0)), (10.0, 10.0));
        assert_eq!(viewport.visible_rect(), Rect::new(10.0, 20.0, 50.0, 25.0));

        let anchor = viewport.to_image(40.0, 30.0);
        viewport.zoom_at(2.0, (40.0, 30.0));
        assert_eq!(viewport.zoom, 4.0);
        assert_eq!(viewport.to_image(40.0, 30.0), anchor);

        viewport.pan(8.0, -4.0);
        assert_eq!(viewport.to_image(48.0, 26.0), anchor);
    }

    #[test]
    fn test_zoom_is_bounded() {
        let mut viewport = Viewport::default();
        viewport.zoom_at(1e6, (0.0, 0.0));
        assert_eq!(viewport.zoom, MAX_ZOOM);
        viewport.zoom_at(1e-9, (0.0, 0.0));
        assert_eq!(viewport.zoom, MIN_ZOOM);
    }

    #[test]
    fn test_kind_behavior() {
        let single = SubWindow::image(WindowId(1), image("a.png"));
        assert_eq!(single.title(), "a.png");
        assert_eq!(single.type_tag(), "image");
        assert!(single.can_save());
        assert!(single.current_image().is_some());

        let pair = SubWindow::comparison(
            WindowId(2),
            image("in.png"),
            image("out.png"),
            Alignment::identity(),
        );
        assert_eq!(pair.title(), "in.png vs out.png");
        assert_eq!(pair.images().len(), 2);

        let calculator = SubWindow::julian_date(WindowId(3));
        assert_eq!(calculator.type_tag(), "julian-date");
        assert!(!calculator.can_save());
        assert!(calculator.current_image().is_none());
        assert!(!calculator.is_dirty());
    }

    #[test]
    fn test_comparison_focus_and_mapping() {
        let mut pair = ComparisonWindow {
            input: image("in.png"),
            output: image("out.png"),
            alignment: Alignment::from_parameters(0.0, 1.0, Vector2::new(5.0, 0.0)),
            focus: Side::Input,
            viewport: Viewport::default(),
        };
        assert_eq!(pair.map_to_other(Point2::new(1.0, 1.0)), Some(Point2::new(6.0, 1.0)));
        assert!(Rc::ptr_eq(pair.unfocused(), &pair.output));

        pair.focus = Side::Output;
        let back = pair.map_to_other(Point2::new(6.0, 1.0)).unwrap();
        assert_relative_eq!(back.x, 1.0, epsilon = 1e-9);
        assert!(Rc::ptr_eq(pair.focused(), &pair.output));
    }

    #[test]
    fn test_julian_date_of_j2000() {
        let noon = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        let calculator = JulianDateCalculator::at(noon);
        assert_relative_eq!(calculator.julian_day(), 2_451_545.0);
        assert_relative_eq!(calculator.modified_julian_day(), 51_544.5);
    }

    #[test]
    fn test_julian_date_round_trip() {
        let mut calculator = JulianDateCalculator::default();
        calculator.set_modified_julian_day(60_000.25).unwrap();
        assert_eq!(
            calculator.instant(),
            Utc.with_ymd_and_hms(2023, 2, 25, 6, 0, 0).unwrap()
        );
        assert!(calculator.set_julian_day(f64::NAN).is_err());
    }

    #[test]
    fn test_julian_date_from_text() {
        let mut calculator = JulianDateCalculator::default();
        calculator.set_from_text("2000-01-01T12:00:00Z").unwrap();
        assert_relative_eq!(calculator.julian_day(), 2_451_545.0);

        calculator.set_from_text("2000-01-02 00:00:00").unwrap();
        assert_relative_eq!(calculator.julian_day(), 2_451_545.5);

        assert!(calculator.set_from_text("yesterday").is_err());
        assert_relative_eq!(calculator.julian_day(), 2_451_545.5);
    }
}
