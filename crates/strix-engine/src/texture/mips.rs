//! CPU mip chain generation.

use crate::device::mip_extent;

/// Number of mip levels of a full chain: `floor(log2(max(w, h))) + 1`.
#[inline]
pub fn full_chain_len(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Builds `levels` mip levels from `base` with a 2×2 box filter.
///
/// `bpp` is the channel count; every channel is 8-bit. Odd edges clamp, so
/// the last row / column is reused when a level has an odd extent.
pub fn build_chain(base: &[u8], width: u32, height: u32, bpp: u32, levels: u32) -> Vec<Vec<u8>> {
    let mut chain = Vec::with_capacity(levels.max(1) as usize);
    chain.push(base.to_vec());

    for mip in 1..levels {
        let (sw, sh) = mip_extent(width, height, mip - 1);
        let (dw, dh) = mip_extent(width, height, mip);
        let src = &chain[(mip - 1) as usize];
        let next = downsample(src, sw, sh, dw, dh, bpp as usize);
        chain.push(next);
    }
    chain
}

fn downsample(src: &[u8], sw: u32, sh: u32, dw: u32, dh: u32, bpp: usize) -> Vec<u8> {
    let mut out = vec![0u8; dw as usize * dh as usize * bpp];
    let texel = |x: u32, y: u32, c: usize| -> u32 {
        let x = x.min(sw - 1) as usize;
        let y = y.min(sh - 1) as usize;
        src[(y * sw as usize + x) * bpp + c] as u32
    };

    for y in 0..dh {
        for x in 0..dw {
            for c in 0..bpp {
                let sum = texel(2 * x, 2 * y, c)
                    + texel(2 * x + 1, 2 * y, c)
                    + texel(2 * x, 2 * y + 1, c)
                    + texel(2 * x + 1, 2 * y + 1, c);
                out[(y as usize * dw as usize + x as usize) * bpp + c] = ((sum + 2) / 4) as u8;
            }
        }
    }
    out
}
