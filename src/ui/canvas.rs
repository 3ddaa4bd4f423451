/// Image view canvas
///
/// Draws a rendered bitmap under a pan/zoom viewport together with the
/// marker indicators and an optional outline. The interactive variant turns
/// mouse input into frame messages: left click places a marker, right drag
/// pans, the wheel zooms around the cursor.
use iced::mouse::{self, Cursor};
use iced::widget::canvas::{self, Path, Program, Stroke};
use iced::widget::image::{FilterMethod, Handle};
use iced::{Color, Point, Rectangle, Renderer, Size, Theme};

use astro_viewer::geometry::{PixelPoint, Rect};
use astro_viewer::state::{IndicatorStyle, Marker};
use astro_viewer::windows::Viewport;

use crate::Message;

const ZOOM_STEP: f64 = 1.2;

/// An indicator as drawn; copied out of the markers so the view owns nothing
#[derive(Debug, Clone, Copy)]
pub struct IndicatorShape {
    pub center: PixelPoint,
    pub style: IndicatorStyle,
    pub size: f64,
    pub color: [u8; 3],
}

impl IndicatorShape {
    pub fn from_marker(marker: &Marker) -> Option<Self> {
        let indicator = marker.indicator.as_ref()?;
        Some(Self {
            center: indicator.center,
            style: indicator.style,
            size: indicator.size,
            color: indicator.color,
        })
    }
}

/// Convert a gray bitmap into an image handle for the renderer
pub fn gray_handle(bitmap: &image::GrayImage) -> Handle {
    let rgba: Vec<u8> = bitmap.pixels().flat_map(|p| [p.0[0], p.0[0], p.0[0], 255]).collect();
    Handle::from_rgba(bitmap.width(), bitmap.height(), rgba)
}

pub struct ImageView {
    pub handle: Handle,
    /// Bitmap size in pixels
    pub size: (u32, u32),
    pub viewport: Viewport,
    pub indicators: Vec<IndicatorShape>,
    /// Extra rectangle in screen coordinates (navigator outline)
    pub outline: Option<Rect>,
    /// Whether mouse input produces messages
    pub interactive: bool,
}

impl Program<Message> for ImageView {
    type State = DragState;

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: Cursor,
    ) -> Vec<canvas::Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());
        frame.fill_rectangle(Point::ORIGIN, bounds.size(), Color::from_rgb8(18, 18, 18));

        let zoom = self.viewport.zoom as f32;
        // Integer image coordinates are pixel centers
        let (x, y) = self.viewport.to_screen(PixelPoint::new(-0.5, -0.5));
        let destination = Rectangle::new(
            Point::new(x as f32, y as f32),
            Size::new(self.size.0 as f32 * zoom, self.size.1 as f32 * zoom),
        );
        frame.with_clip(Rectangle::new(Point::ORIGIN, bounds.size()), |frame| {
            frame.draw_image(
                destination,
                canvas::Image::new(self.handle.clone()).filter_method(FilterMethod::Nearest),
            );

            for indicator in &self.indicators {
                let (cx, cy) = self.viewport.to_screen(indicator.center);
                let center = Point::new(cx as f32, cy as f32);
                let half = indicator.size as f32 / 2.0;
                let [r, g, b] = indicator.color;
                let stroke = Stroke::default()
                    .with_color(Color::from_rgb8(r, g, b))
                    .with_width(1.5);
                match indicator.style {
                    IndicatorStyle::Cross => {
                        frame.stroke(
                            &Path::line(
                                Point::new(center.x - half, center.y),
                                Point::new(center.x + half, center.y),
                            ),
                            stroke.clone(),
                        );
                        frame.stroke(
                            &Path::line(
                                Point::new(center.x, center.y - half),
                                Point::new(center.x, center.y + half),
                            ),
                            stroke,
                        );
                    }
                    IndicatorStyle::Circle => frame.stroke(&Path::circle(center, half), stroke),
                }
            }

            if let Some(outline) = self.outline {
                frame.stroke(
                    &Path::rectangle(
                        Point::new(outline.x as f32, outline.y as f32),
                        Size::new(outline.width as f32, outline.height as f32),
                    ),
                    Stroke::default()
                        .with_color(Color::from_rgb(1.0, 0.3, 0.3))
                        .with_width(1.0),
                );
            }
        });

        vec![frame.into_geometry()]
    }

    fn update(
        &self,
        state: &mut Self::State,
        event: canvas::Event,
        bounds: Rectangle,
        cursor: Cursor,
    ) -> (canvas::event::Status, Option<Message>) {
        if !self.interactive {
            return (canvas::event::Status::Ignored, None);
        }
        let Some(position) = cursor.position_in(bounds) else {
            return (canvas::event::Status::Ignored, None);
        };
        let screen = (position.x as f64, position.y as f64);

        // Keep the viewport in step with the widget size
        let size = (bounds.width as f64, bounds.height as f64);
        if size != self.viewport.size {
            let mut viewport = self.viewport;
            viewport.size = size;
            return (canvas::event::Status::Captured, Some(Message::ViewChanged(viewport)));
        }

        match event {
            canvas::Event::Mouse(mouse::Event::WheelScrolled { delta }) => {
                let steps = match delta {
                    mouse::ScrollDelta::Lines { y, .. } => y as f64,
                    mouse::ScrollDelta::Pixels { y, .. } => y as f64 / 40.0,
                };
                let mut viewport = self.viewport;
                viewport.zoom_at(ZOOM_STEP.powf(steps), screen);
                (canvas::event::Status::Captured, Some(Message::ViewChanged(viewport)))
            }
            canvas::Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => {
                let point = self.viewport.to_image(screen.0, screen.1);
                (canvas::event::Status::Captured, Some(Message::ImageClicked(point)))
            }
            canvas::Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Right)) => {
                state.last_position = Some(position);
                (canvas::event::Status::Captured, None)
            }
            canvas::Event::Mouse(mouse::Event::ButtonReleased(mouse::Button::Right)) => {
                state.last_position = None;
                (canvas::event::Status::Captured, None)
            }
            canvas::Event::Mouse(mouse::Event::CursorMoved { .. }) => {
                if let Some(last) = state.last_position {
                    state.last_position = Some(position);
                    let mut viewport = self.viewport;
                    viewport.pan((position.x - last.x) as f64, (position.y - last.y) as f64);
                    return (canvas::event::Status::Captured, Some(Message::ViewChanged(viewport)));
                }
                let point = self.viewport.to_image(screen.0, screen.1);
                (canvas::event::Status::Captured, Some(Message::CursorMoved(point)))
            }
            _ => (canvas::event::Status::Ignored, None),
        }
    }
}

/// State for right-button panning
#[derive(Debug, Clone, Default)]
pub struct DragState {
    pub last_position: Option<Point>,
}
