use anyhow::{Context, Result};
use tiny_skia::Pixmap;

/// Sprite rotation applied after rasterisation. `R180` is a horizontal
/// mirror rather than a true half-turn so left-moving sprites face
/// backwards instead of upside-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rotation {
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    pub fn cache_key(&self) -> u16 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 90,
            Rotation::R180 => 180,
            Rotation::R270 => 270,
        }
    }
}

/// Capability for turning SVG text into a pixel image. The renderer never
/// assumes a particular implementation; the in-process one below is the
/// default, but an out-of-process rasteriser satisfies the same contract.
pub trait SvgRasterizer: Send + Sync {
    fn rasterize(&self, svg: &[u8], width: u32, height: u32) -> Result<Pixmap>;
    fn available(&self) -> bool;
}

/// In-process rasteriser backed by usvg/resvg.
#[derive(Debug, Default)]
pub struct ResvgRasterizer;

impl SvgRasterizer for ResvgRasterizer {
    fn rasterize(&self, svg: &[u8], width: u32, height: u32) -> Result<Pixmap> {
        let options = usvg::Options::default();
        let tree = usvg::Tree::from_data(svg, &options).context("failed to parse SVG")?;

        let mut pixmap = Pixmap::new(width, height)
            .with_context(|| format!("invalid raster dimensions {width}x{height}"))?;

        let size = tree.size();
        let transform = tiny_skia::Transform::from_scale(
            width as f32 / size.width(),
            height as f32 / size.height(),
        );
        resvg::render(&tree, transform, &mut pixmap.as_mut());

        Ok(pixmap)
    }

    fn available(&self) -> bool {
        true
    }
}

/// Out-of-process rasteriser shelling out to the Inkscape CLI. Slower than
/// the in-process one but renders SVG features resvg does not support;
/// availability is probed once and remembered.
pub struct InkscapeRasterizer {
    command: String,
    available: std::sync::OnceLock<bool>,
}

const DEFAULT_INKSCAPE_COMMAND: &str = "inkscape";

impl InkscapeRasterizer {
    pub fn new() -> Self {
        Self::with_command(DEFAULT_INKSCAPE_COMMAND)
    }

    pub fn with_command(command: impl Into<String>) -> Self {
        InkscapeRasterizer {
            command: command.into(),
            available: std::sync::OnceLock::new(),
        }
    }
}

impl Default for InkscapeRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SvgRasterizer for InkscapeRasterizer {
    fn rasterize(&self, svg: &[u8], width: u32, height: u32) -> Result<Pixmap> {
        use std::io::Write;
        use std::process::{Command, Stdio};

        if width < 1 {
            anyhow::bail!("invalid width");
        }
        if height < 1 {
            anyhow::bail!("invalid height");
        }

        let mut child = Command::new(&self.command)
            .args(["--pipe", "--export-type=png", "--export-filename=-"])
            .arg("-w")
            .arg(width.to_string())
            .arg("-h")
            .arg(height.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to run {}", self.command))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(svg)
                .context("failed to stream SVG to inkscape")?;
        }

        let output = child.wait_with_output().context("inkscape did not exit")?;
        if !output.status.success() {
            anyhow::bail!("inkscape exited with {}", output.status);
        }
        // no bytes on stdout means something went wrong
        if output.stdout.is_empty() {
            anyhow::bail!("error processing SVG");
        }

        Pixmap::decode_png(&output.stdout).context("failed to decode inkscape PNG output")
    }

    fn available(&self) -> bool {
        *self.available.get_or_init(|| {
            std::process::Command::new(&self.command)
                .arg("--version")
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status()
                .map(|status| status.success())
                .unwrap_or(false)
        })
    }
}

/// Applies a rotation by pixel transpose/flip.
pub fn rotate(src: &Pixmap, rotation: Rotation) -> Pixmap {
    match rotation {
        Rotation::R0 => src.clone(),
        Rotation::R90 => rotate90(src),
        Rotation::R180 => flip_horizontal(src),
        Rotation::R270 => rotate270(src),
    }
}

/// Quarter-turn counter-clockwise: the right edge becomes the top row.
fn rotate90(src: &Pixmap) -> Pixmap {
    let (w, h) = (src.width(), src.height());
    let mut dst = match Pixmap::new(h, w) {
        Some(p) => p,
        None => return src.clone(),
    };

    let src_px = src.pixels();
    let dst_px = dst.pixels_mut();
    for y in 0..w {
        for x in 0..h {
            dst_px[(y * h + x) as usize] = src_px[(x * w + (w - 1 - y)) as usize];
        }
    }
    dst
}

/// Quarter-turn clockwise: the left edge becomes the top row.
fn rotate270(src: &Pixmap) -> Pixmap {
    let (w, h) = (src.width(), src.height());
    let mut dst = match Pixmap::new(h, w) {
        Some(p) => p,
        None => return src.clone(),
    };

    let src_px = src.pixels();
    let dst_px = dst.pixels_mut();
    for y in 0..w {
        for x in 0..h {
            dst_px[(y * h + x) as usize] = src_px[((h - 1 - x) * w + y) as usize];
        }
    }
    dst
}

pub fn flip_horizontal(src: &Pixmap) -> Pixmap {
    let (w, h) = (src.width(), src.height());
    let mut dst = match Pixmap::new(w, h) {
        Some(p) => p,
        None => return src.clone(),
    };

    let src_px = src.pixels();
    let dst_px = dst.pixels_mut();
    for y in 0..h {
        for x in 0..w {
            dst_px[(y * w + x) as usize] = src_px[(y * w + (w - 1 - x)) as usize];
        }
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixmap_from_rows(rows: &[&[u8]]) -> Pixmap {
        let h = rows.len() as u32;
        let w = rows[0].len() as u32;
        let mut pixmap = Pixmap::new(w, h).unwrap();
        let px = pixmap.pixels_mut();
        for (y, row) in rows.iter().enumerate() {
            for (x, &v) in row.iter().enumerate() {
                px[y * w as usize + x] =
                    tiny_skia::PremultipliedColorU8::from_rgba(v, 0, 0, 255).unwrap();
            }
        }
        pixmap
    }

    fn reds(pixmap: &Pixmap) -> Vec<u8> {
        pixmap.pixels().iter().map(|p| p.red()).collect()
    }

    #[test]
    fn rotate90_moves_right_edge_to_top() {
        let src = pixmap_from_rows(&[&[1, 2], &[3, 4]]);
        let dst = rotate(&src, Rotation::R90);
        assert_eq!(reds(&dst), vec![2, 4, 1, 3]);
    }

    #[test]
    fn rotate270_moves_left_edge_to_top() {
        let src = pixmap_from_rows(&[&[1, 2], &[3, 4]]);
        let dst = rotate(&src, Rotation::R270);
        assert_eq!(reds(&dst), vec![3, 1, 4, 2]);
    }

    #[test]
    fn r180_is_a_horizontal_mirror() {
        let src = pixmap_from_rows(&[&[1, 2], &[3, 4]]);
        let dst = rotate(&src, Rotation::R180);
        assert_eq!(reds(&dst), vec![2, 1, 4, 3]);
    }

    #[test]
    fn inkscape_availability_is_feature_detected() {
        let missing = InkscapeRasterizer::with_command("definitely-not-inkscape");
        assert!(!missing.available());

        let svg = b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>";
        assert!(missing.rasterize(svg, 10, 10).is_err());
    }

    #[test]
    fn inkscape_rejects_degenerate_dimensions() {
        let rasterizer = InkscapeRasterizer::new();
        let svg = b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>";
        assert!(rasterizer.rasterize(svg, 0, 10).is_err());
        assert!(rasterizer.rasterize(svg, 10, 0).is_err());
    }

    #[test]
    fn rasterizer_renders_at_requested_size() {
        let svg = br##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10"><rect width="10" height="10" fill="#ff0000"/></svg>"##;
        let pixmap = ResvgRasterizer.rasterize(svg, 24, 24).unwrap();
        assert_eq!(pixmap.width(), 24);
        assert_eq!(pixmap.height(), 24);
        // fully covered by the red rect
        let center = pixmap.pixel(12, 12).unwrap();
        assert_eq!(center.red(), 255);
        assert_eq!(center.alpha(), 255);
    }
}
