use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tiny_skia::{FillRule, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Rect, Transform};
use tracing::info;

use common::{Board, ContentKind, Corner, Direction, Rgba, SquareContent};

use crate::media::{AssetKind, MediaApi, TtlCache};
use crate::raster::Rotation;

/// Fixed outer border around the board, in pixels.
pub const BOARD_BORDER: i32 = 2;
const SQUARE_BORDER: i32 = 1;
/// Square edge used when the caller does not ask for specific dimensions.
pub const DEFAULT_SQUARE_SIZE: i32 = 20;

const COLOR_EMPTY_SQUARE: Rgba = Rgba::new(0xf0, 0xf0, 0xf0, 0xff);
const COLOR_FOOD: Rgba = Rgba::new(0xff, 0x5c, 0x75, 0xff);
const COLOR_HAZARD: Rgba = Rgba::new(0x00, 0x00, 0x00, 0x66);

const BACKGROUND_CACHE_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Pixel-space geometry for one render: square edge, offsets centring the
/// grid inside the canvas, and the y-flip from board space (origin
/// bottom-left) into raster space (origin top-left).
#[derive(Debug, Clone, Copy)]
pub struct BoardLayout {
    pub square: i32,
    pub px_width: i32,
    pub px_height: i32,
    off_x: i32,
    off_y: i32,
    board_height: i32,
}

impl BoardLayout {
    pub fn new(board_width: i32, board_height: i32, px_width: i32, px_height: i32) -> Self {
        let bw = board_width.max(1);
        let bh = board_height.max(1);

        let (square, px_width, px_height) = if px_width <= 0 || px_height <= 0 {
            (
                DEFAULT_SQUARE_SIZE,
                bw * DEFAULT_SQUARE_SIZE + BOARD_BORDER * 2,
                bh * DEFAULT_SQUARE_SIZE + BOARD_BORDER * 2,
            )
        } else {
            let square = ((px_width - BOARD_BORDER * 2) / bw)
                .min((px_height - BOARD_BORDER * 2) / bh)
                .max(1);
            (square, px_width, px_height)
        };

        // leftover pixels split evenly as extra padding on both axes
        BoardLayout {
            square,
            px_width,
            px_height,
            off_x: BOARD_BORDER + (px_width - BOARD_BORDER * 2 - bw * square) / 2,
            off_y: BOARD_BORDER + (px_height - BOARD_BORDER * 2 - bh * square) / 2,
            board_height: bh,
        }
    }

    /// Raster x of the left edge of board column `bx`.
    fn cell_x(&self, bx: i32) -> i32 {
        self.off_x + bx * self.square
    }

    /// Raster y of the top edge of board row `by`, flipping the y-axis.
    fn cell_y(&self, by: i32) -> i32 {
        self.off_y + (self.board_height - 1 - by) * self.square
    }
}

/// Paints boards onto pixel canvases. The static background layer (white
/// fill, empty squares, watermark) is cached per board/canvas geometry.
pub struct BoardRenderer {
    media: Arc<MediaApi>,
    background_cache: Arc<TtlCache<(i32, i32, i32, i32), Arc<Pixmap>>>,
}

impl BoardRenderer {
    pub fn new(media: Arc<MediaApi>) -> Self {
        BoardRenderer {
            media,
            background_cache: Arc::new(TtlCache::new(BACKGROUND_CACHE_TTL)),
        }
    }

    /// Draws the board at the requested pixel dimensions. Sprite failures
    /// degrade to plain coloured squares; only canvas allocation can fail.
    pub async fn draw(&self, board: &Board, px_width: i32, px_height: i32) -> Result<Pixmap> {
        let layout = BoardLayout::new(board.width, board.height, px_width, px_height);

        let mut canvas = self.background(board, &layout).await?.as_ref().clone();

        // deterministic paint order: bottom row first, then left to right
        let mut points: Vec<_> = board.occupied().collect();
        points.sort_by_key(|(p, _)| (p.y, p.x));

        for (point, contents) in points {
            for content in contents {
                self.draw_content(&mut canvas, &layout, point.x, point.y, content)
                    .await;
            }
        }

        Ok(canvas)
    }

    async fn draw_content(
        &self,
        canvas: &mut Pixmap,
        layout: &BoardLayout,
        bx: i32,
        by: i32,
        content: &SquareContent,
    ) {
        let color = content.color.unwrap_or(Rgba::BLACK);
        match content.kind {
            ContentKind::Food => draw_food(canvas, layout, bx, by),
            ContentKind::Hazard => draw_hazard(canvas, layout, bx, by),
            ContentKind::SnakeBody => {
                draw_snake_body(canvas, layout, bx, by, color, content.corner);
                draw_gap(canvas, layout, bx, by, content.direction, color);
            }
            ContentKind::SnakeHead => {
                self.draw_snake_sprite(canvas, layout, bx, by, AssetKind::Head, content)
                    .await;
                draw_gap(canvas, layout, bx, by, content.direction, color);
            }
            ContentKind::SnakeTail => {
                self.draw_snake_sprite(canvas, layout, bx, by, AssetKind::Tail, content)
                    .await;
            }
        }
    }

    async fn draw_snake_sprite(
        &self,
        canvas: &mut Pixmap,
        layout: &BoardLayout,
        bx: i32,
        by: i32,
        kind: AssetKind,
        content: &SquareContent,
    ) {
        let color = content.color.unwrap_or(Rgba::BLACK);
        let name = content.snake_type.as_deref().unwrap_or("default");
        let size = (layout.square - SQUARE_BORDER * 2).max(1) as u32;
        let rotation = match content.direction {
            Direction::Right => Rotation::R0,
            Direction::Up => Rotation::R90,
            Direction::Left => Rotation::R180,
            Direction::Down => Rotation::R270,
        };

        match self
            .media
            .get_snake_png(kind, name, size, size, color, rotation)
            .await
        {
            Ok(sprite) => {
                canvas.draw_pixmap(
                    layout.cell_x(bx) + SQUARE_BORDER,
                    layout.cell_y(by) + SQUARE_BORDER,
                    sprite.as_ref().as_ref(),
                    &PixmapPaint::default(),
                    Transform::identity(),
                    None,
                );
            }
            Err(err) => {
                // keep the frame going: a plain coloured square reads fine
                info!(name = name, error = %err, "unable to load snake sprite - drawing plain square");
                fill_rect(
                    canvas,
                    layout.cell_x(bx) + SQUARE_BORDER,
                    layout.cell_y(by) + SQUARE_BORDER,
                    layout.square - SQUARE_BORDER * 2,
                    layout.square - SQUARE_BORDER * 2,
                    color,
                );
            }
        }
    }

    async fn background(&self, board: &Board, layout: &BoardLayout) -> Result<Arc<Pixmap>> {
        let key = (
            board.width,
            board.height,
            layout.px_width,
            layout.px_height,
        );
        if let Some(background) = self.background_cache.get(&key) {
            return Ok(background);
        }

        let mut canvas = Pixmap::new(layout.px_width as u32, layout.px_height as u32)
            .with_context(|| {
                format!(
                    "invalid canvas dimensions {}x{}",
                    layout.px_width, layout.px_height
                )
            })?;
        canvas.fill(tiny_skia::Color::WHITE);

        for by in 0..board.height {
            for bx in 0..board.width {
                fill_rect(
                    &mut canvas,
                    layout.cell_x(bx) + SQUARE_BORDER,
                    layout.cell_y(by) + SQUARE_BORDER,
                    layout.square - SQUARE_BORDER * 2,
                    layout.square - SQUARE_BORDER * 2,
                    COLOR_EMPTY_SQUARE,
                );
            }
        }

        self.draw_watermark(&mut canvas, board, layout).await;

        let background = Arc::new(canvas);
        self.background_cache.insert(key, background.clone());
        Ok(background)
    }

    async fn draw_watermark(&self, canvas: &mut Pixmap, board: &Board, layout: &BoardLayout) {
        let width = (board.width.max(1) * layout.square * 2 / 3).max(1) as u32;
        let height = (board.height.max(1) * layout.square * 2 / 3).max(1) as u32;

        match self.media.get_watermark_png(width, height).await {
            Ok(watermark) => {
                canvas.draw_pixmap(
                    (layout.px_width - width as i32) / 2,
                    (layout.px_height - height as i32) / 2,
                    watermark.as_ref().as_ref(),
                    &PixmapPaint::default(),
                    Transform::identity(),
                    None,
                );
            }
            Err(err) => info!(error = %err, "unable to load watermark image"),
        }
    }
}

fn solid_paint(color: Rgba, anti_alias: bool) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, color.a);
    paint.anti_alias = anti_alias;
    paint
}

fn fill_rect(canvas: &mut Pixmap, x: i32, y: i32, w: i32, h: i32, color: Rgba) {
    if w <= 0 || h <= 0 {
        return;
    }
    if let Some(rect) = Rect::from_xywh(x as f32, y as f32, w as f32, h as f32) {
        canvas.fill_rect(rect, &solid_paint(color, false), Transform::identity(), None);
    }
}

fn fill_path(canvas: &mut Pixmap, path: Option<Path>, color: Rgba) {
    if let Some(path) = path {
        canvas.fill_path(
            &path,
            &solid_paint(color, true),
            FillRule::Winding,
            Transform::identity(),
            None,
        );
    }
}

fn circle_path(cx: f32, cy: f32, radius: f32) -> Option<Path> {
    let mut pb = PathBuilder::new();
    pb.push_circle(cx, cy, radius);
    pb.finish()
}

/// Rounded rectangle with the radius clamped to half the shorter side.
fn rounded_rect_path(x: f32, y: f32, w: f32, h: f32, radius: f32) -> Option<Path> {
    const K: f32 = 0.552_284_8;
    let r = radius.min(w / 2.0).min(h / 2.0);
    let k = K * r;

    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(x + w - r, y);
    pb.cubic_to(x + w - r + k, y, x + w, y + r - k, x + w, y + r);
    pb.line_to(x + w, y + h - r);
    pb.cubic_to(x + w, y + h - r + k, x + w - r + k, y + h, x + w - r, y + h);
    pb.line_to(x + r, y + h);
    pb.cubic_to(x + r - k, y + h, x, y + h - r + k, x, y + h - r);
    pb.line_to(x, y + r);
    pb.cubic_to(x, y + r - k, x + r - k, y, x + r, y);
    pb.close();
    pb.finish()
}

fn draw_food(canvas: &mut Pixmap, layout: &BoardLayout, bx: i32, by: i32) {
    fill_path(
        canvas,
        circle_path(
            (layout.cell_x(bx) + layout.square / 2) as f32,
            (layout.cell_y(by) + layout.square / 2) as f32,
            layout.square as f32 / 3.0,
        ),
        COLOR_FOOD,
    );
}

fn draw_hazard(canvas: &mut Pixmap, layout: &BoardLayout, bx: i32, by: i32) {
    fill_rect(
        canvas,
        layout.cell_x(bx) + SQUARE_BORDER,
        layout.cell_y(by) + SQUARE_BORDER,
        layout.square - SQUARE_BORDER * 2,
        layout.square - SQUARE_BORDER * 2,
        COLOR_HAZARD,
    );
}

/// Body squares are plain rectangles unless they sit on a bend, where a
/// rounded rectangle plus two overlay rectangles leaves exactly one rounded
/// corner on the outside of the turn.
fn draw_snake_body(
    canvas: &mut Pixmap,
    layout: &BoardLayout,
    bx: i32,
    by: i32,
    color: Rgba,
    corner: Corner,
) {
    let x = layout.cell_x(bx) + SQUARE_BORDER;
    let y = layout.cell_y(by) + SQUARE_BORDER;
    let inner = layout.square - SQUARE_BORDER * 2;

    if corner == Corner::None {
        fill_rect(canvas, x, y, inner, inner, color);
        return;
    }

    fill_path(
        canvas,
        rounded_rect_path(
            x as f32,
            y as f32,
            inner as f32,
            inner as f32,
            layout.square as f32 / 2.0,
        ),
        color,
    );

    // square off the quadrant horizontally opposite the corner so the
    // rounded base shows through in the corner's own quadrant
    let half = layout.square / 2;
    if corner.is_bottom() {
        // bend in the bottom half: the top half stays square
        fill_rect(canvas, x, y, inner, half, color);
        if corner.is_left() {
            fill_rect(
                canvas,
                layout.cell_x(bx) + half,
                y + half,
                half - SQUARE_BORDER * 2,
                half - SQUARE_BORDER * 2,
                color,
            );
        } else {
            fill_rect(canvas, x, y + half, half - SQUARE_BORDER * 2, half - SQUARE_BORDER * 2, color);
        }
    } else {
        fill_rect(canvas, x, y + half, inner, half, color);
        if corner.is_left() {
            fill_rect(
                canvas,
                layout.cell_x(bx) + half + SQUARE_BORDER,
                y,
                half - SQUARE_BORDER * 2,
                half - SQUARE_BORDER * 2,
                color,
            );
        } else {
            fill_rect(canvas, x, y, half - SQUARE_BORDER * 2, half - SQUARE_BORDER * 2, color);
        }
    }
}

/// Bridges the 1-pixel cell border into the neighbouring square the segment
/// points at, so adjacent pieces read as one connected snake.
fn draw_gap(canvas: &mut Pixmap, layout: &BoardLayout, bx: i32, by: i32, direction: Direction, color: Rgba) {
    let x = layout.cell_x(bx);
    let y = layout.cell_y(by);
    let sq = layout.square;
    match direction {
        Direction::Up => fill_rect(
            canvas,
            x + SQUARE_BORDER,
            y - SQUARE_BORDER,
            sq - SQUARE_BORDER * 2,
            SQUARE_BORDER * 2,
            color,
        ),
        Direction::Down => fill_rect(
            canvas,
            x + SQUARE_BORDER,
            y + sq - SQUARE_BORDER,
            sq - SQUARE_BORDER * 2,
            SQUARE_BORDER * 2,
            color,
        ),
        Direction::Left => fill_rect(
            canvas,
            x - SQUARE_BORDER,
            y + SQUARE_BORDER,
            SQUARE_BORDER * 2,
            sq - SQUARE_BORDER * 2,
            color,
        ),
        Direction::Right => fill_rect(
            canvas,
            x + sq - SQUARE_BORDER,
            y + SQUARE_BORDER,
            SQUARE_BORDER * 2,
            sq - SQUARE_BORDER * 2,
            color,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_derives_canvas_from_square_size() {
        let layout = BoardLayout::new(3, 3, 0, 0);
        assert_eq!(layout.square, DEFAULT_SQUARE_SIZE);
        assert_eq!(layout.px_width, 64);
        assert_eq!(layout.px_height, 64);
        assert_eq!(layout.cell_x(0), 2);
        // board origin is bottom-left: row 0 is the lowest band of pixels
        assert_eq!(layout.cell_y(0), 42);
        assert_eq!(layout.cell_y(2), 2);
    }

    #[test]
    fn explicit_dimensions_pick_the_limiting_axis() {
        let layout = BoardLayout::new(11, 11, 114, 114);
        assert_eq!(layout.square, 10);
        assert_eq!(layout.cell_x(0), 2);

        let layout = BoardLayout::new(11, 11, 444, 444);
        assert_eq!(layout.square, 40);
    }

    #[test]
    fn leftover_pixels_become_symmetric_padding() {
        // 3 squares at edge 20 need 64px; given 70 the extra 6 splits evenly
        let layout = BoardLayout::new(3, 3, 70, 70);
        assert_eq!(layout.square, 22);
        assert_eq!(layout.cell_x(0), 2);

        let layout = BoardLayout::new(3, 3, 71, 68);
        assert_eq!(layout.square, 21);
        assert_eq!(layout.cell_x(0), 2 + (71 - 4 - 63) / 2);
        assert_eq!(layout.cell_y(2), 2 + (68 - 4 - 63) / 2);
    }
}
