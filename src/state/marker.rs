/// Astrometry and photometry markers
///
/// A marker is a user-placed reference point on an image. Each marker owns
/// its on-screen indicator exclusively; changing how a marker looks means
/// dropping the old indicator and creating a new one from the layer, never
/// restyling in place.

use std::cell::Cell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::astro::{Apertures, ObservationRecord, PhotometryResult};
use crate::geometry::{distance, PixelPoint, SkyCoord};

/// Which panel a marker belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    Astrometry,
    Photometry,
}

impl MarkerKind {
    /// Prefix of auto-generated marker names
    pub fn prefix(self) -> &'static str {
        match self {
            MarkerKind::Astrometry => "A",
            MarkerKind::Photometry => "P",
        }
    }

    /// Kind of a saved observation, told by its name prefix
    ///
    /// Records with a foreign name are photometry if they carry a measurement.
    pub fn of_record(record: &ObservationRecord) -> Self {
        let prefix = record.name.split(':').next().unwrap_or_default();
        if prefix == MarkerKind::Photometry.prefix() {
            MarkerKind::Photometry
        } else if prefix == MarkerKind::Astrometry.prefix() || record.photometry.is_none() {
            MarkerKind::Astrometry
        } else {
            MarkerKind::Photometry
        }
    }
}

/// Shape used to draw a marker
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorStyle {
    Cross,
    Circle,
}

/// RGB color of an indicator
pub type Rgb = [u8; 3];

/// How indicators are drawn: shape, size and the two colors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorTheme {
    pub style: IndicatorStyle,
    pub size: f64,
    pub normal: Rgb,
    pub highlight: Rgb,
}

/// The rendering surface indicators are drawn on
///
/// Tracks how many indicators are alive so leaks show up in tests and logs.
/// Cloning shares the same surface.
#[derive(Debug, Clone, Default)]
pub struct IndicatorLayer {
    live: Rc<Cell<usize>>,
    created: Rc<Cell<u64>>,
}

impl IndicatorLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new indicator on this surface
    pub fn create(&self, center: PixelPoint, theme: &IndicatorTheme, highlighted: bool) -> Indicator {
        self.live.set(self.live.get() + 1);
        self.created.set(self.created.get() + 1);
        Indicator {
            id: self.created.get(),
            center,
            style: theme.style,
            size: theme.size,
            color: if highlighted { theme.highlight } else { theme.normal },
            highlighted,
            layer: Rc::clone(&self.live),
        }
    }

    /// Number of indicators currently on the surface
    pub fn live_count(&self) -> usize {
        self.live.get()
    }
}

/// A drawn marker graphic; removed from its layer when dropped
#[derive(Debug)]
pub struct Indicator {
    /// Unique per layer; a redraw always yields a new id
    pub id: u64,
    pub center: PixelPoint,
    pub style: IndicatorStyle,
    pub size: f64,
    pub color: Rgb,
    pub highlighted: bool,
    layer: Rc<Cell<usize>>,
}

impl Drop for Indicator {
    fn drop(&mut self) {
        self.layer.set(self.layer.get().saturating_sub(1));
    }
}

/// A user-placed reference point
#[derive(Debug)]
pub struct Marker {
    /// Display label and uniqueness key within one image
    pub name: String,
    pub pixel: PixelPoint,
    /// Sky position, absent when the image has no coordinate solution
    pub sky: Option<SkyCoord>,
    /// Aperture radii used for photometry markers
    pub apertures: Option<Apertures>,
    pub photometry: Option<PhotometryResult>,
    pub indicator: Option<Indicator>,
}

impl Marker {
    pub fn new(name: impl Into<String>, pixel: PixelPoint) -> Self {
        Self {
            name: name.into(),
            pixel,
            sky: None,
            apertures: None,
            photometry: None,
            indicator: None,
        }
    }

    /// Restore a marker from a measurement saved with the file
    pub fn from_record(record: &ObservationRecord) -> Self {
        Self {
            sky: record.sky,
            photometry: record.photometry,
            ..Self::new(record.name.clone(), PixelPoint::new(record.x, record.y))
        }
    }

    /// Replace the indicator with a freshly created one
    fn redraw(&mut self, layer: &IndicatorLayer, theme: &IndicatorTheme, highlighted: bool) {
        // Old graphic goes first so the layer never holds two for one marker
        self.indicator = None;
        self.indicator = Some(layer.create(self.pixel, theme, highlighted));
    }

    pub fn is_highlighted(&self) -> bool {
        self.indicator.as_ref().is_some_and(|i| i.highlighted)
    }

    /// What gets recorded into the astronomy file
    pub fn to_record(&self) -> ObservationRecord {
        ObservationRecord {
            name: self.name.clone(),
            x: self.pixel.x,
            y: self.pixel.y,
            sky: self.sky,
            photometry: self.photometry,
        }
    }
}

/// The markers of one kind on one image, plus the highlighted one
#[derive(Debug, Default)]
pub struct MarkerSet {
    markers: Vec<Marker>,
    selected: Option<String>,
}

impl MarkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Marker> {
        self.markers.iter().find(|m| m.name == name)
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// First marker within `radius` pixels of `point`
    ///
    /// Linear scan; marker counts stay in the tens.
    pub fn find_near(&self, point: PixelPoint, radius: f64) -> Option<&Marker> {
        self.markers
            .iter()
            .find(|m| distance(m.pixel, point) <= radius)
    }

    /// Name for the next auto-named marker, e.g. `A:3`
    pub fn next_name(&self, kind: MarkerKind) -> String {
        let mut n = self.markers.len() + 1;
        loop {
            let name = format!("{}:{}", kind.prefix(), n);
            if self.get(&name).is_none() {
                return name;
            }
            n += 1;
        }
    }

    /// Append a marker; a marker with the same name is replaced
    pub fn insert(&mut self, marker: Marker) {
        if let Some(existing) = self.markers.iter_mut().find(|m| m.name == marker.name) {
            *existing = marker;
        } else {
            self.markers.push(marker);
        }
    }

    /// Insert a new marker and move the highlight onto it
    ///
    /// A marker replacing a same-named, already highlighted one is drawn
    /// highlighted straight away.
    pub fn add_selected(&mut self, marker: Marker, layer: &IndicatorLayer, theme: &IndicatorTheme) {
        let name = marker.name.clone();
        self.insert(marker);
        if self.selected.as_deref() == Some(name.as_str()) {
            if let Some(marker) = self.markers.iter_mut().find(|m| m.name == name) {
                marker.redraw(layer, theme, true);
            }
        } else {
            self.select(&name, layer, theme);
        }
    }

    /// Remove a marker (and its indicator); clears the selection if it was selected
    pub fn remove(&mut self, name: &str) -> Option<Marker> {
        let index = self.markers.iter().position(|m| m.name == name)?;
        if self.selected.as_deref() == Some(name) {
            self.selected = None;
        }
        Some(self.markers.remove(index))
    }

    /// Move the highlight to `name`
    ///
    /// Selecting the already selected marker does nothing. Otherwise the
    /// previous marker is redrawn in the normal color and the new one in the
    /// highlight color. Returns whether anything changed.
    pub fn select(&mut self, name: &str, layer: &IndicatorLayer, theme: &IndicatorTheme) -> bool {
        if self.selected.as_deref() == Some(name) || self.get(name).is_none() {
            return false;
        }

        if let Some(previous) = self.selected.take() {
            if let Some(marker) = self.markers.iter_mut().find(|m| m.name == previous) {
                marker.redraw(layer, theme, false);
            }
        }

        if let Some(marker) = self.markers.iter_mut().find(|m| m.name == name) {
            marker.redraw(layer, theme, true);
        }
        self.selected = Some(name.to_string());
        true
    }

    /// Discard every indicator and draw them all again
    pub fn rebuild_indicators(&mut self, layer: &IndicatorLayer, theme: &IndicatorTheme) {
        for marker in &mut self.markers {
            let highlighted = self.selected.as_deref() == Some(marker.name.as_str());
            marker.redraw(layer, theme, highlighted);
        }
    }

    /// Drop every indicator, keeping the markers
    pub fn clear_indicators(&mut self) {
        for marker in &mut self.markers {
            marker.indicator = None;
        }
    }
}
