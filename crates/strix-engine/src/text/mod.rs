//! Glyph sources for text drawables.

mod font;

pub use font::{FontAtlas, GlyphBitmap, GlyphQuad, GlyphSource, FIRST_GLYPH, LAST_GLYPH};
