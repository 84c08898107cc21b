use glam::Vec2;

use crate::device::{AddressMode, BindingId, GpuDevice, ImageFormat, SamplerDesc};
use crate::error::{RenderError, Result};
use crate::heap::StagingHeap;
use crate::texture::{ImageDecoder, Texture, TextureDesc, TextureKind};

pub const FIRST_GLYPH: char = ' ';
pub const LAST_GLYPH: char = '~';

const ATLAS_WIDTH: u32 = 512;
const GLYPH_PADDING: u32 = 1;

/// Screen-space quad of one glyph, in the quad vertex order
/// (top-left, top-right, bottom-left, bottom-right).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GlyphQuad {
    pub positions: [Vec2; 4],
    pub uvs: [Vec2; 4],
}

/// Font / glyph service consumed by text drawables.
///
/// Pen and quad coordinates are pixels with +Y down; the pen sits on the
/// baseline.
pub trait GlyphSource {
    /// Builds the quad of `c` at `pen` and advances the pen. Returns `None`
    /// (pen untouched) for characters the source cannot draw.
    fn fill_glyph(&self, c: char, pen: &mut Vec2) -> Option<GlyphQuad>;

    /// Texture binding sampled by the quads.
    fn binding(&self) -> BindingId;

    /// Baseline-to-baseline distance in pixels.
    fn line_height(&self) -> f32;
}

/// Rasterized glyph before packing.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphBitmap {
    pub width: u32,
    pub height: u32,
    /// Left bearing in pixels.
    pub xmin: f32,
    /// Bottom edge relative to the baseline, +Y up.
    pub ymin: f32,
    pub advance: f32,
    pub coverage: Vec<u8>,
}

#[derive(Debug, Copy, Clone, PartialEq)]
struct PackedGlyph {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    xmin: f32,
    ymin: f32,
    advance: f32,
}

struct AtlasLayout {
    width: u32,
    height: u32,
    glyphs: Vec<PackedGlyph>,
    pixels: Vec<u8>,
}

/// Shelf packer: left to right, new row when the current one is full.
fn pack(bitmaps: &[GlyphBitmap], width: u32) -> Result<AtlasLayout> {
    let mut glyphs = Vec::with_capacity(bitmaps.len());
    let (mut x, mut y, mut row_height) = (GLYPH_PADDING, GLYPH_PADDING, 0);

    for bitmap in bitmaps {
        if bitmap.width + 2 * GLYPH_PADDING > width {
            return Err(RenderError::invalid(format!(
                "glyph of width {} does not fit a {width} px atlas",
                bitmap.width
            )));
        }
        if x + bitmap.width + GLYPH_PADDING > width {
            x = GLYPH_PADDING;
            y += row_height + GLYPH_PADDING;
            row_height = 0;
        }
        glyphs.push(PackedGlyph {
            x,
            y,
            width: bitmap.width,
            height: bitmap.height,
            xmin: bitmap.xmin,
            ymin: bitmap.ymin,
            advance: bitmap.advance,
        });
        x += bitmap.width + GLYPH_PADDING;
        row_height = row_height.max(bitmap.height);
    }

    let height = (y + row_height + GLYPH_PADDING).next_power_of_two();
    let mut pixels = vec![0u8; (width * height) as usize];
    for (glyph, bitmap) in glyphs.iter().zip(bitmaps) {
        let w = glyph.width as usize;
        for row in 0..glyph.height as usize {
            let dst = (glyph.y as usize + row) * width as usize + glyph.x as usize;
            pixels[dst..dst + w].copy_from_slice(&bitmap.coverage[row * w..(row + 1) * w]);
        }
    }

    Ok(AtlasLayout { width, height, glyphs, pixels })
}

/// Printable ASCII rasterized once into a single-channel atlas texture.
#[derive(Debug)]
pub struct FontAtlas {
    texture: Texture,
    glyphs: Vec<PackedGlyph>,
    atlas_size: Vec2,
    line_height: f32,
}

impl FontAtlas {
    /// Rasterizes `FIRST_GLYPH..=LAST_GLYPH` from TrueType / OpenType bytes.
    pub fn new<D: GpuDevice + ?Sized>(
        device: &mut D,
        staging: &mut StagingHeap,
        decoder: &dyn ImageDecoder,
        font_bytes: &[u8],
        pixel_size: f32,
    ) -> Result<Self> {
        let font = fontdue::Font::from_bytes(
            font_bytes,
            fontdue::FontSettings { scale: pixel_size, ..fontdue::FontSettings::default() },
        )
        .map_err(|e| RenderError::invalid(format!("font: {e}")))?;

        let bitmaps: Vec<GlyphBitmap> = (FIRST_GLYPH..=LAST_GLYPH)
            .map(|c| {
                let (metrics, coverage) = font.rasterize(c, pixel_size);
                GlyphBitmap {
                    width: metrics.width as u32,
                    height: metrics.height as u32,
                    xmin: metrics.xmin as f32,
                    ymin: metrics.ymin as f32,
                    advance: metrics.advance_width,
                    coverage,
                }
            })
            .collect();

        let line_height = font
            .horizontal_line_metrics(pixel_size)
            .map_or(pixel_size * 1.2, |m| m.new_line_size);

        Self::from_bitmaps(device, staging, decoder, &bitmaps, line_height)
    }

    /// Packs pre-rasterized glyphs, one per character from `FIRST_GLYPH` on.
    pub fn from_bitmaps<D: GpuDevice + ?Sized>(
        device: &mut D,
        staging: &mut StagingHeap,
        decoder: &dyn ImageDecoder,
        bitmaps: &[GlyphBitmap],
        line_height: f32,
    ) -> Result<Self> {
        let layout = pack(bitmaps, ATLAS_WIDTH)?;
        let desc = TextureDesc {
            kind: TextureKind::Compute,
            ..TextureDesc::from_data(&layout.pixels, layout.width, layout.height, ImageFormat::R8Unorm)
        };
        let texture = Texture::create(device, staging, decoder, &TextureDesc {
            sampler: SamplerDesc {
                address_mode: AddressMode::ClampToEdge,
                ..SamplerDesc::default()
            },
            ..desc
        })?;

        Ok(Self {
            texture,
            glyphs: layout.glyphs,
            atlas_size: Vec2::new(layout.width as f32, layout.height as f32),
            line_height,
        })
    }

    #[inline]
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn destroy<D: GpuDevice + ?Sized>(self, device: &mut D) {
        self.texture.destroy(device);
    }

    fn glyph(&self, c: char) -> Option<&PackedGlyph> {
        let index = (c as u32).checked_sub(FIRST_GLYPH as u32)?;
        self.glyphs.get(index as usize)
    }
}

impl GlyphSource for FontAtlas {
    fn fill_glyph(&self, c: char, pen: &mut Vec2) -> Option<GlyphQuad> {
        let g = self.glyph(c)?;
        let (w, h) = (g.width as f32, g.height as f32);

        let p0 = Vec2::new(pen.x + g.xmin, pen.y - (g.ymin + h));
        let p1 = p0 + Vec2::new(w, h);
        let uv0 = Vec2::new(g.x as f32, g.y as f32) / self.atlas_size;
        let uv1 = Vec2::new((g.x + g.width) as f32, (g.y + g.height) as f32) / self.atlas_size;

        pen.x += g.advance;

        Some(GlyphQuad {
            positions: [p0, Vec2::new(p1.x, p0.y), Vec2::new(p0.x, p1.y), p1],
            uvs: [uv0, Vec2::new(uv1.x, uv0.y), Vec2::new(uv0.x, uv1.y), uv1],
        })
    }

    #[inline]
    fn binding(&self) -> BindingId {
        self.texture.binding()
    }

    #[inline]
    fn line_height(&self) -> f32 {
        self.line_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;
    use crate::texture::tests::MapDecoder;

    fn bitmap(width: u32, height: u32, fill: u8) -> GlyphBitmap {
        GlyphBitmap {
            width,
            height,
            xmin: 1.0,
            ymin: -2.0,
            advance: width as f32 + 2.0,
            coverage: vec![fill; (width * height) as usize],
        }
    }

    fn ascii_bitmaps() -> Vec<GlyphBitmap> {
        (FIRST_GLYPH..=LAST_GLYPH).map(|c| bitmap(6, 10, c as u8)).collect()
    }

    // ── packing ───────────────────────────────────────────────────────────

    #[test]
    fn packed_glyphs_stay_inside_and_apart() {
        let layout = pack(&ascii_bitmaps(), 64).unwrap();
        assert!(layout.height.is_power_of_two());

        for (i, a) in layout.glyphs.iter().enumerate() {
            assert!(a.x + a.width <= layout.width && a.y + a.height <= layout.height);
            for b in &layout.glyphs[i + 1..] {
                let apart = a.x + a.width <= b.x
                    || b.x + b.width <= a.x
                    || a.y + a.height <= b.y
                    || b.y + b.height <= a.y;
                assert!(apart, "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn coverage_is_copied_into_place() {
        let layout = pack(&ascii_bitmaps(), 64).unwrap();
        let g = layout.glyphs[('A' as u32 - FIRST_GLYPH as u32) as usize];
        let texel = layout.pixels[(g.y * layout.width + g.x) as usize];
        assert_eq!(texel, b'A');
    }

    #[test]
    fn oversized_glyph_is_rejected() {
        assert!(pack(&[bitmap(70, 4, 0)], 64).is_err());
    }

    // ── glyph quads ───────────────────────────────────────────────────────

    fn atlas(device: &mut MemoryDevice) -> FontAtlas {
        let mut staging = StagingHeap::new(device, 1024).unwrap();
        FontAtlas::from_bitmaps(device, &mut staging, &MapDecoder::default(), &ascii_bitmaps(), 14.0).unwrap()
    }

    #[test]
    fn fill_glyph_places_quad_and_advances_pen() {
        let mut device = MemoryDevice::new();
        let font = atlas(&mut device);
        let mut pen = Vec2::new(10.0, 20.0);

        let quad = font.fill_glyph('B', &mut pen).unwrap();

        // xmin 1, ymin -2, 6×10: top-left at (11, 20 - 8).
        assert_eq!(quad.positions[0], Vec2::new(11.0, 12.0));
        assert_eq!(quad.positions[3], Vec2::new(17.0, 22.0));
        assert_eq!(quad.positions[1], Vec2::new(17.0, 12.0));
        assert_eq!(quad.positions[2], Vec2::new(11.0, 22.0));
        assert_eq!(pen, Vec2::new(18.0, 20.0));

        assert!(quad.uvs[0].x < quad.uvs[3].x && quad.uvs[0].y < quad.uvs[3].y);
        assert_eq!(quad.uvs[1], Vec2::new(quad.uvs[3].x, quad.uvs[0].y));
    }

    #[test]
    fn unknown_glyph_leaves_pen() {
        let mut device = MemoryDevice::new();
        let font = atlas(&mut device);
        let mut pen = Vec2::ZERO;
        assert!(font.fill_glyph('\u{e9}', &mut pen).is_none());
        assert!(font.fill_glyph('\n', &mut pen).is_none());
        assert_eq!(pen, Vec2::ZERO);
    }

    #[test]
    fn atlas_texture_is_single_level_r8() {
        let mut device = MemoryDevice::new();
        let font = atlas(&mut device);
        assert_eq!(font.texture().format(), ImageFormat::R8Unorm);
        assert_eq!(font.texture().mip_levels(), 1);
        assert_eq!(font.line_height(), 14.0);
    }
}
