use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use flexi_logger::LoggerHandle;
use iced::widget::image::Handle;
use iced::widget::{
    button, canvas, checkbox, column, container, pick_list, row, scrollable, slider, text,
    text_input, Column,
};
use iced::{Element, Length, Task, Theme};
use iced_aw::Wrap;
use image::GrayImage;
use rfd::FileDialog;

use astro_viewer::astro::{loader, AstroFile, PlaneFile, SharedFile, TransferFunction};
use astro_viewer::geometry::{Alignment, PixelPoint};
use astro_viewer::logging;
use astro_viewer::panels::MarkerOutcome;
use astro_viewer::state::{keys, MarkerKind, MemorySettings, SettingsStore, SqliteSettings};
use astro_viewer::windows::{FrameWindow, Side, Viewport, WindowId, WindowKind};
use astro_viewer::{Error, Notice};

mod ui;

use ui::canvas::{gray_handle, ImageView, IndicatorShape};
use ui::histogram::HistogramPlot;

/// Size of the magnifier and navigator views
const MAGNIFIER_SIZE: f64 = 160.0;
const NAVIGATOR_SIZE: (f64, f64) = (200.0, 150.0);

/// Renderer handle of the current bitmap, rebuilt only when the bitmap changes
struct BitmapCache {
    source: Rc<GrayImage>,
    handle: Handle,
}

/// Main application state
struct AstroViewer {
    frame: FrameWindow,
    /// One-line status (cursor position, last action)
    status: String,
    /// Last notice, shown until dismissed
    notice: Option<Notice>,
    /// Which kind of marker a click places
    marker_kind: MarkerKind,
    bitmap: Option<BitmapCache>,
    /// Opened files still shown in a window, newest last; the last two can
    /// be compared. Windows own the files, closing them releases the file.
    recent: Vec<Weak<RefCell<dyn AstroFile>>>,
    julian_input: String,
    _logger: Option<LoggerHandle>,
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    Open,
    OpenFolder,
    Loaded(Result<Arc<PlaneFile>, String>),
    Compare,
    JulianCalculator,
    JulianInput(String),
    JulianSubmit,
    Activate(WindowId),
    Close(WindowId),
    FocusSide(Side),
    BlackChanged(f32),
    WhiteChanged(f32),
    TransferSelected(TransferFunction),
    GammaChanged(f32),
    InvertToggled(bool),
    SubImageSelected(usize),
    MarkerKindSelected(MarkerKind),
    ImageClicked(PixelPoint),
    CursorMoved(PixelPoint),
    ViewChanged(Viewport),
    SelectMarker(String),
    RemoveMarker,
    Save,
    DismissNotice,
}

impl AstroViewer {
    fn new() -> (Self, Task<Message>) {
        let (settings, settings_error): (Box<dyn SettingsStore>, Option<Error>) =
            match SqliteSettings::open() {
                Ok(store) => (Box::new(store), None),
                Err(e) => (Box::new(MemorySettings::new()), Some(e)),
            };

        let level = settings.get(keys::LOG_LEVEL, keys::DEFAULT_LOG_LEVEL.to_string());
        let logger = match logging::setup_logging(&level, &logging::default_log_dir()) {
            Ok(handle) => Some(handle),
            Err(e) => {
                eprintln!("Logging disabled: {}", e);
                None
            }
        };
        if let Some(e) = settings_error {
            log::warn!("Settings will not be kept: {}", e);
        }

        log::info!("Astro Viewer started");
        (
            AstroViewer {
                frame: FrameWindow::new(settings),
                status: "Open an image to begin.".to_string(),
                notice: None,
                marker_kind: MarkerKind::Astrometry,
                bitmap: None,
                recent: Vec::new(),
                julian_input: String::new(),
                _logger: logger,
            },
            Task::none(),
        )
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        let task = match message {
            Message::Open => {
                let file = FileDialog::new()
                    .set_title("Open Image")
                    .add_filter("Images", &loader::SUPPORTED_EXTENSIONS)
                    .pick_file();
                match file {
                    Some(path) => {
                        self.status = format!("Loading {}...", path.display());
                        Task::perform(load(path), Message::Loaded)
                    }
                    None => Task::none(),
                }
            }
            Message::OpenFolder => {
                let folder = FileDialog::new()
                    .set_title("Open All Images in Folder")
                    .pick_folder();
                match folder {
                    Some(folder) => {
                        let files = loader::scan_folder(&folder);
                        self.status = format!("Loading {} file(s)...", files.len());
                        Task::batch(
                            files
                                .into_iter()
                                .map(|path| Task::perform(load(path), Message::Loaded)),
                        )
                    }
                    None => Task::none(),
                }
            }
            Message::Loaded(Ok(file)) => {
                match Arc::try_unwrap(file) {
                    Ok(file) => {
                        let shared: SharedFile = Rc::new(RefCell::new(file));
                        self.recent.push(Rc::downgrade(&shared));
                        if let Some(id) = self.frame.open_image(shared) {
                            self.status = format!("Opened window {}", id);
                        }
                    }
                    Err(_) => log::error!("Loaded file is still shared, dropping it"),
                }
                Task::none()
            }
            Message::Loaded(Err(e)) => {
                log::warn!("Open failed: {}", e);
                self.notice = Some(Notice::warning("Open image", e));
                Task::none()
            }
            Message::Compare => {
                if let Some((input, output)) = self.comparable() {
                    self.frame
                        .open_comparison(input, output, Alignment::identity());
                }
                Task::none()
            }
            Message::JulianCalculator => {
                self.frame.open_julian_calculator();
                Task::none()
            }
            Message::JulianInput(input) => {
                self.julian_input = input;
                Task::none()
            }
            Message::JulianSubmit => {
                self.submit_julian_date();
                Task::none()
            }
            Message::Activate(id) => {
                self.frame.activate(id);
                Task::none()
            }
            Message::Close(id) => {
                self.frame.close_and_focus_next(id);
                Task::none()
            }
            Message::FocusSide(side) => {
                self.frame.focus_side(side);
                Task::none()
            }
            Message::BlackChanged(value) => {
                self.frame.set_black_point(value);
                Task::none()
            }
            Message::WhiteChanged(value) => {
                self.frame.set_white_point(value);
                Task::none()
            }
            Message::TransferSelected(transfer) => {
                self.frame.set_transfer_function(transfer);
                Task::none()
            }
            Message::GammaChanged(gamma) => {
                self.frame.set_gamma(gamma);
                Task::none()
            }
            Message::InvertToggled(invert) => {
                self.frame.set_invert(invert);
                Task::none()
            }
            Message::SubImageSelected(index) => {
                self.frame.set_sub_image(index);
                Task::none()
            }
            Message::MarkerKindSelected(kind) => {
                self.marker_kind = kind;
                Task::none()
            }
            Message::ImageClicked(point) => {
                match self.frame.add_marker(self.marker_kind, point) {
                    Some(MarkerOutcome::Added(name)) => self.status = format!("Added {}", name),
                    Some(MarkerOutcome::AlreadyMarked) => {
                        self.status = "A marker already sits there.".to_string()
                    }
                    None => {}
                }
                Task::none()
            }
            Message::CursorMoved(point) => {
                self.frame.cursor_moved(point);
                self.status = match self.frame.sky_at(point) {
                    Ok(sky) => format!(
                        "x {:.1}  y {:.1}  RA {:.5}  Dec {:+.5}",
                        point.x, point.y, sky.ra, sky.dec
                    ),
                    Err(e) => format!("x {:.1}  y {:.1}  ({})", point.x, point.y, e),
                };
                Task::none()
            }
            Message::ViewChanged(viewport) => {
                self.frame.set_viewport(viewport);
                Task::none()
            }
            Message::SelectMarker(name) => {
                self.frame.select_marker(self.marker_kind, &name);
                Task::none()
            }
            Message::RemoveMarker => {
                if let Some(name) = self.frame.remove_selected_marker(self.marker_kind) {
                    self.status = format!("Removed {}", name);
                }
                Task::none()
            }
            Message::Save => {
                self.frame.save_active();
                Task::none()
            }
            Message::DismissNotice => {
                self.notice = None;
                Task::none()
            }
        };

        if let Some(notice) = self.frame.take_notices().pop() {
            self.notice = Some(notice);
        }
        self.recent.retain(|file| file.strong_count() > 0);
        self.sync_bitmap();
        task
    }

    /// The two most recently opened files that are still open
    fn comparable(&self) -> Option<(SharedFile, SharedFile)> {
        let mut live = self.recent.iter().rev().filter_map(Weak::upgrade);
        let output = live.next()?;
        let input = live.next()?;
        Some((input, output))
    }

    fn submit_julian_date(&mut self) {
        let Some(window) = self.frame.active().and_then(|id| self.frame.window_mut(id)) else {
            return;
        };
        if let WindowKind::JulianDate(calculator) = &mut window.kind {
            if let Err(e) = calculator.set_from_text(&self.julian_input) {
                self.notice = Some(e.to_notice("Julian date"));
            }
        }
    }

    /// Rebuild the renderer handle when the current bitmap was replaced
    fn sync_bitmap(&mut self) {
        let current = self
            .frame
            .current_image()
            .and_then(|image| image.borrow().bitmap());
        self.bitmap = match (current, self.bitmap.take()) {
            (Some(bitmap), Some(cache)) if Rc::ptr_eq(&bitmap, &cache.source) => Some(cache),
            (Some(bitmap), _) => Some(BitmapCache {
                handle: gray_handle(&bitmap),
                source: bitmap,
            }),
            (None, _) => None,
        };
    }

    fn indicators(&self) -> Vec<IndicatorShape> {
        let Some(image) = self.frame.current_image() else {
            return Vec::new();
        };
        let image = image.borrow();
        let mut shapes = Vec::new();
        for kind in [MarkerKind::Astrometry, MarkerKind::Photometry] {
            shapes.extend(
                image
                    .markers(kind)
                    .markers()
                    .iter()
                    .filter_map(IndicatorShape::from_marker),
            );
        }
        shapes
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        let toolbar = row![
            button("Open").on_press(Message::Open),
            button("Open Folder").on_press(Message::OpenFolder),
            button("Compare").on_press_maybe(self.comparable().map(|_| Message::Compare)),
            button("Julian Date").on_press(Message::JulianCalculator),
            button("Save").on_press_maybe(self.frame.save_enabled().then_some(Message::Save)),
        ]
        .spacing(10);

        let tabs: Vec<Element<Message>> = self
            .frame
            .windows()
            .map(|window| {
                let title = self.frame.window_title(window.id).unwrap_or_default();
                let label = if self.frame.active() == Some(window.id) {
                    format!("[{}]", title)
                } else {
                    title
                };
                row![
                    button(text(label)).on_press(Message::Activate(window.id)),
                    button("x").on_press(Message::Close(window.id)),
                ]
                .spacing(2)
                .into()
            })
            .collect();
        let window_bar = Wrap::with_elements(tabs).spacing(8.0).line_spacing(4.0);

        let mut content = column![toolbar, window_bar].spacing(10).padding(10);
        if let Some(notice) = &self.notice {
            content = content.push(
                row![
                    text(format!("{}: {}", notice.title, notice.message)),
                    button("OK").on_press(Message::DismissNotice),
                ]
                .spacing(10),
            );
        }

        let body = row![
            container(self.view_active_window())
                .width(Length::Fill)
                .height(Length::Fill),
            scrollable(self.view_panels()).width(260),
        ]
        .spacing(10);

        content
            .push(body)
            .push(text(&self.status).size(14))
            .into()
    }

    fn view_active_window(&self) -> Element<Message> {
        let Some(window) = self.frame.active_window() else {
            return text("No window open.").into();
        };

        match &window.kind {
            WindowKind::JulianDate(calculator) => column![
                text("Date and time (UTC)"),
                text_input("2024-03-01 20:15:00", &self.julian_input)
                    .on_input(Message::JulianInput)
                    .on_submit(Message::JulianSubmit),
                text(format!("{}", calculator.instant().format("%Y-%m-%d %H:%M:%S UTC"))),
                text(format!("JD  {:.5}", calculator.julian_day())),
                text(format!("MJD {:.5}", calculator.modified_julian_day())),
            ]
            .spacing(8)
            .into(),
            WindowKind::Image(_) | WindowKind::Comparison(_) => {
                let mut view = Column::new().spacing(6);
                if let WindowKind::Comparison(pair) = &window.kind {
                    view = view.push(
                        row![
                            button("Input").on_press_maybe(
                                (pair.focus != Side::Input).then_some(Message::FocusSide(Side::Input))
                            ),
                            button("Output").on_press_maybe(
                                (pair.focus != Side::Output)
                                    .then_some(Message::FocusSide(Side::Output))
                            ),
                        ]
                        .spacing(6),
                    );
                }
                if let (Some(cache), Some(viewport)) = (&self.bitmap, window.viewport()) {
                    view = view.push(
                        canvas(ImageView {
                            handle: cache.handle.clone(),
                            size: cache.source.dimensions(),
                            viewport: *viewport,
                            indicators: self.indicators(),
                            outline: None,
                            interactive: true,
                        })
                        .width(Length::Fill)
                        .height(Length::Fill),
                    );
                }
                view.into()
            }
        }
    }

    fn view_panels(&self) -> Element<Message> {
        let mut panels = Column::new().spacing(12);

        // Image info
        let info = self.frame.image_control();
        if let Some(name) = info.name() {
            let mut section = column![text(name.to_string()).size(18)].spacing(4);
            if let (Some(sub), Some(count)) = (info.sub_image(), info.sub_image_count()) {
                let selector: Element<Message> = if info.selector_enabled() {
                    let planes: Vec<usize> = (0..count).collect();
                    pick_list(planes, Some(sub), Message::SubImageSelected).into()
                } else {
                    text(format!("{} of {}", sub, count)).into()
                };
                section = section.push(row![text("Plane"), selector].spacing(6));
            }
            if let Some((width, height)) = info.dimensions() {
                section = section.push(text(format!("{} x {} px", width, height)));
            }
            if let Some(stats) = info.stats() {
                section = section.push(text(format!(
                    "min {:.1}  max {:.1}  mean {:.1}",
                    stats.min, stats.max, stats.mean
                )));
            }
            if info.has_solution() == Some(true) {
                section = section.push(text("Coordinate solution available"));
            }
            if info.is_dirty() == Some(true) {
                section = section.push(text("Unsaved changes"));
            }
            panels = panels.push(section);
        }
        drop(info);

        // Histogram and levels
        let histogram = self.frame.histogram();
        if let (Some((min, max)), Some(black), Some(white)) = (
            histogram.range(),
            histogram.black_point(),
            histogram.white_point(),
        ) {
            let span = (max - min).max(f32::EPSILON);
            let plot = HistogramPlot {
                counts: histogram.display_counts(),
                black: Some((black - min) / span),
                white: Some((white - min) / span),
            };
            let step = span / 1000.0;
            let editable = histogram.controls_enabled();
            let mut section = column![canvas(plot).width(Length::Fill).height(120)].spacing(4)
                .push(text(format!("Black {:.1}", black)));
            // Sliders have no disabled state; a disabled panel shows values only
            if editable && max > min {
                section = section.push(slider(min..=max, black, Message::BlackChanged).step(step));
            }
            section = section.push(text(format!("White {:.1}", white)));
            if editable && max > min {
                section = section.push(slider(min..=max, white, Message::WhiteChanged).step(step));
            }
            if editable {
                section = section.push(pick_list(
                    TransferFunction::ALL,
                    histogram.transfer_function(),
                    Message::TransferSelected,
                ));
            } else if let Some(transfer) = histogram.transfer_function() {
                section = section.push(text(transfer.to_string()));
            }
            if let Some(gamma) = histogram.gamma() {
                section = section.push(text(format!("Gamma {:.2}", gamma)));
                if editable {
                    section =
                        section.push(slider(0.1..=5.0, gamma, Message::GammaChanged).step(0.05));
                }
            }
            section = section.push(
                checkbox("Invert", histogram.invert().unwrap_or(false))
                    .on_toggle_maybe(editable.then_some(Message::InvertToggled)),
            );
            panels = panels.push(section);
        }
        drop(histogram);

        // Magnifier and navigator share the current bitmap
        if let Some(cache) = &self.bitmap {
            let magnifier = self.frame.magnifier();
            if let Some(center) = magnifier.center() {
                let zoom = magnifier.zoom();
                let half = MAGNIFIER_SIZE / 2.0 / zoom;
                let view = ImageView {
                    handle: cache.handle.clone(),
                    size: cache.source.dimensions(),
                    viewport: Viewport {
                        zoom,
                        offset: PixelPoint::new(center.x - half, center.y - half),
                        size: (MAGNIFIER_SIZE, MAGNIFIER_SIZE),
                    },
                    indicators: self.indicators(),
                    outline: None,
                    interactive: false,
                };
                panels = panels.push(
                    canvas(view)
                        .width(MAGNIFIER_SIZE as f32)
                        .height(MAGNIFIER_SIZE as f32),
                );
            }
            drop(magnifier);

            let navigator = self.frame.navigator();
            if let Some(scale) = navigator.scale() {
                let view = ImageView {
                    handle: cache.handle.clone(),
                    size: cache.source.dimensions(),
                    viewport: Viewport {
                        zoom: scale,
                        offset: PixelPoint::new(0.0, 0.0),
                        size: NAVIGATOR_SIZE,
                    },
                    indicators: Vec::new(),
                    outline: navigator.outline(),
                    interactive: false,
                };
                panels = panels.push(
                    canvas(view)
                        .width(NAVIGATOR_SIZE.0 as f32)
                        .height(NAVIGATOR_SIZE.1 as f32),
                );
            }
        }

        // Markers of the selected kind
        let kinds = row![
            button("Astrometry").on_press_maybe(
                (self.marker_kind != MarkerKind::Astrometry)
                    .then_some(Message::MarkerKindSelected(MarkerKind::Astrometry))
            ),
            button("Photometry").on_press_maybe(
                (self.marker_kind != MarkerKind::Photometry)
                    .then_some(Message::MarkerKindSelected(MarkerKind::Photometry))
            ),
        ]
        .spacing(6);
        let mut markers = column![kinds].spacing(4);
        let marker_panel = self.frame.marker_panel(self.marker_kind);
        let editable = marker_panel.controls_enabled();
        for marker in marker_panel.rows() {
            let mut label = format!("{}  {:.1}, {:.1}", marker.name, marker.x, marker.y);
            if let Some(sky) = marker.sky {
                label.push_str(&format!("  {:.4} {:+.4}", sky.ra, sky.dec));
            }
            if let Some(magnitude) = marker.magnitude {
                label.push_str(&format!("  m {:.2}", magnitude));
            }
            if marker.selected {
                label.insert_str(0, "> ");
            }
            markers = markers.push(
                button(text(label).size(13))
                    .on_press_maybe(
                        editable.then(|| Message::SelectMarker(marker.name.clone())),
                    )
                    .width(Length::Fill),
            );
        }
        markers = markers.push(
            button("Remove")
                .on_press_maybe(
                    (editable && marker_panel.selected().is_some()).then_some(Message::RemoveMarker),
                ),
        );
        drop(marker_panel);

        panels.push(markers).into()
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

/// Load a file in the background
async fn load(path: PathBuf) -> Result<Arc<PlaneFile>, String> {
    loader::load_planes(path).await.map(Arc::new)
}

fn main() -> iced::Result {
    iced::application("Astro Viewer", AstroViewer::update, AstroViewer::view)
        .theme(AstroViewer::theme)
        .centered()
        .run_with(AstroViewer::new)
}
