use std::collections::HashMap;

use tiny_skia::Pixmap;

/// A GIF frame can carry at most this many colours in its local palette.
pub const MAX_COLORS_PER_FRAME: usize = 256;

/// An indexed image: every pixel is an index into `palette`, which holds
/// RGB triples as the GIF wire format wants them.
#[derive(Debug, Clone)]
pub struct PalettedImage {
    pub width: u16,
    pub height: u16,
    pub pixels: Vec<u8>,
    pub palette: Vec<u8>,
}

/// Converts an RGBA canvas to an indexed image. The palette is the most
/// frequent exact RGBA values, capped at 256; pixels outside the palette map
/// to the nearest entry by squared RGB distance. Images with at most 256
/// distinct colours convert losslessly.
pub fn quantize(image: &Pixmap) -> PalettedImage {
    let mut counts: HashMap<[u8; 4], u32> = HashMap::new();
    for pixel in image.pixels() {
        let c = pixel.demultiply();
        *counts
            .entry([c.red(), c.green(), c.blue(), c.alpha()])
            .or_insert(0) += 1;
    }

    // most used colours first; colour value as a deterministic tie-break
    let mut ordered: Vec<([u8; 4], u32)> = counts.into_iter().collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let palette_colors: Vec<[u8; 4]> = ordered
        .iter()
        .take(MAX_COLORS_PER_FRAME)
        .map(|(color, _)| *color)
        .collect();

    let mut index_of: HashMap<[u8; 4], u8> = HashMap::with_capacity(palette_colors.len());
    for (i, color) in palette_colors.iter().enumerate() {
        index_of.insert(*color, i as u8);
    }

    // colours that didn't make the palette resolve once, then memoise
    let mut substitutes: HashMap<[u8; 4], u8> = HashMap::new();
    let mut pixels = Vec::with_capacity((image.width() * image.height()) as usize);
    for pixel in image.pixels() {
        let c = pixel.demultiply();
        let key = [c.red(), c.green(), c.blue(), c.alpha()];
        let index = match index_of.get(&key) {
            Some(&index) => index,
            None => *substitutes
                .entry(key)
                .or_insert_with(|| nearest_index(&palette_colors, key)),
        };
        pixels.push(index);
    }

    let mut palette = Vec::with_capacity(palette_colors.len() * 3);
    for [r, g, b, _] in &palette_colors {
        palette.extend_from_slice(&[*r, *g, *b]);
    }

    PalettedImage {
        width: image.width() as u16,
        height: image.height() as u16,
        pixels,
        palette,
    }
}

fn nearest_index(palette: &[[u8; 4]], color: [u8; 4]) -> u8 {
    let mut best = 0usize;
    let mut best_distance = u32::MAX;
    for (i, candidate) in palette.iter().enumerate() {
        let distance = (0..3).fold(0u32, |acc, ch| {
            let d = candidate[ch] as i32 - color[ch] as i32;
            acc + (d * d) as u32
        });
        if distance < best_distance {
            best_distance = distance;
            best = i;
        }
    }
    best as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixmap_from_colors(width: u32, height: u32, colors: &[[u8; 4]]) -> Pixmap {
        let mut pixmap = Pixmap::new(width, height).unwrap();
        let px = pixmap.pixels_mut();
        for (i, c) in colors.iter().enumerate() {
            px[i] = tiny_skia::ColorU8::from_rgba(c[0], c[1], c[2], c[3]).premultiply();
        }
        pixmap
    }

    #[test]
    fn few_colors_quantize_losslessly() {
        let red = [255u8, 0, 0, 255];
        let blue = [0u8, 0, 255, 255];
        let image = pixmap_from_colors(2, 2, &[red, blue, red, red]);

        let paletted = quantize(&image);

        assert_eq!(paletted.palette.len(), 2 * 3);
        // red is the most frequent, so it takes index 0
        assert_eq!(&paletted.palette[..3], &[255, 0, 0]);
        assert_eq!(paletted.pixels, vec![0, 1, 0, 0]);
    }

    #[test]
    fn palette_never_exceeds_256_entries() {
        // 20x20 = 400 distinct colors
        let colors: Vec<[u8; 4]> = (0..400u32)
            .map(|i| [(i % 256) as u8, (i / 256) as u8 * 50 + 10, 0, 255])
            .collect();
        let image = pixmap_from_colors(20, 20, &colors);

        let paletted = quantize(&image);

        assert_eq!(paletted.palette.len(), MAX_COLORS_PER_FRAME * 3);
        assert_eq!(paletted.pixels.len(), 400);
    }

    #[test]
    fn excess_colors_map_to_the_nearest_entry() {
        // 255 copies of near-black plus enough filler to push one colour out
        let mut colors = Vec::new();
        for i in 0..256u32 {
            colors.push([(i % 256) as u8, 100, 100, 255]);
            colors.push([(i % 256) as u8, 100, 100, 255]);
        }
        // a single orphan colour, very close to [10, 100, 100]
        colors.push([10, 101, 100, 255]);
        let side = 27; // 27*27 = 729 >= 513
        while colors.len() < side * side {
            colors.push([0, 100, 100, 255]);
        }
        let image = pixmap_from_colors(side as u32, side as u32, &colors);

        let paletted = quantize(&image);
        assert!(paletted.palette.len() <= MAX_COLORS_PER_FRAME * 3);

        // the orphan pixel resolved to some in-palette index
        let orphan_index = paletted.pixels[512] as usize;
        assert!(orphan_index < paletted.palette.len() / 3);
        let rgb = &paletted.palette[orphan_index * 3..orphan_index * 3 + 3];
        assert_eq!(rgb, &[10, 100, 100]);
    }
}
