//! Semi-planar 4:2:0 kernels.
//!
//! Scaling runs the luma plane as `U8` pixels and the interleaved chroma
//! plane as `U8x2` pixels through a bilinear convolution, each with the crop
//! window expressed in its own plane's coordinates.

use super::ImagingError;
use crate::types::{FrameDescriptor, PixelFormat, Rect, Rotation};
use fast_image_resize as fir;
use fir::images::{TypedImage, TypedImageRef};
use fir::pixels::{U8x2, U8};
use fir::{ResizeOptions, Resizer};
use std::borrow::Cow;

/// Bytes occupied by a `stride` x `height` semi-planar frame
pub fn frame_len(stride: u32, height: u32) -> usize {
    let luma = stride as usize * height as usize;
    luma + luma / 2
}

/// Crop `crop` out of `src`, scale it bilinearly to fill `dst`, then rotate.
///
/// `dst_desc` describes the final (post-rotation) geometry.
pub fn crop_scale(
    src: &[u8],
    src_desc: &FrameDescriptor,
    crop: Rect,
    dst: &mut [u8],
    dst_desc: &FrameDescriptor,
    rotation: Rotation,
) -> Result<(), ImagingError> {
    check_semi_planar(src_desc)?;
    check_semi_planar(dst_desc)?;
    check_len(src, frame_len(src_desc.stride, src_desc.height))?;
    check_len(dst, frame_len(dst_desc.stride, dst_desc.height))?;
    if crop.is_empty() || !crop.fits_within(src_desc.width, src_desc.height) {
        return Err(ImagingError::InvalidCrop {
            left: crop.left,
            top: crop.top,
            width: crop.width,
            height: crop.height,
            frame_width: src_desc.width,
            frame_height: src_desc.height,
        });
    }

    let (tw, th) = if rotation.swaps_axes() {
        (dst_desc.height, dst_desc.width)
    } else {
        (dst_desc.width, dst_desc.height)
    };

    let src_packed = packed(src, src_desc);
    let mut resizer = Resizer::new();

    if rotation == Rotation::None && dst_desc.stride == dst_desc.width {
        return scale_planes(&mut resizer, &src_packed, src_desc, crop, dst, tw, th);
    }

    let mut staging = vec![0u8; frame_len(tw, th)];
    scale_planes(&mut resizer, &src_packed, src_desc, crop, &mut staging, tw, th)?;
    rotate(&staging, tw, th, dst, dst_desc, rotation);
    Ok(())
}

fn scale_planes(
    resizer: &mut Resizer,
    src: &[u8],
    src_desc: &FrameDescriptor,
    crop: Rect,
    dst: &mut [u8],
    tw: u32,
    th: u32,
) -> Result<(), ImagingError> {
    let (sw, sh) = (src_desc.width, src_desc.height);
    let src_luma = sw as usize * sh as usize;
    let dst_luma = tw as usize * th as usize;
    let (src_y, src_uv) = src.split_at(src_luma);
    let (dst_y, dst_uv) = dst.split_at_mut(dst_luma);

    let alg = fir::ResizeAlg::Convolution(fir::FilterType::Bilinear);

    let src_view = TypedImageRef::<U8>::from_buffer(sw, sh, src_y)?;
    let mut dst_view = TypedImage::<U8>::from_buffer(tw, th, dst_y)?;
    let opts = ResizeOptions::new().resize_alg(alg).use_alpha(false).crop(
        crop.left as f64,
        crop.top as f64,
        crop.width as f64,
        crop.height as f64,
    );
    resizer.resize_typed::<U8>(&src_view, &mut dst_view, &opts)?;

    let src_view = TypedImageRef::<U8x2>::from_buffer(sw / 2, sh / 2, &src_uv[..src_luma / 2])?;
    let mut dst_view = TypedImage::<U8x2>::from_buffer(tw / 2, th / 2, &mut dst_uv[..dst_luma / 2])?;
    let opts = ResizeOptions::new().resize_alg(alg).use_alpha(false).crop(
        (crop.left / 2) as f64,
        (crop.top / 2) as f64,
        (crop.width / 2) as f64,
        (crop.height / 2) as f64,
    );
    resizer.resize_typed::<U8x2>(&src_view, &mut dst_view, &opts)?;
    Ok(())
}

/// Tightly packed copy of a strided frame, borrowed when already packed.
pub fn packed<'a>(src: &'a [u8], desc: &FrameDescriptor) -> Cow<'a, [u8]> {
    if desc.stride == desc.width {
        return Cow::Borrowed(&src[..frame_len(desc.width, desc.height)]);
    }
    let (w, h, stride) = (
        desc.width as usize,
        desc.height as usize,
        desc.stride as usize,
    );
    let mut out = Vec::with_capacity(frame_len(desc.width, desc.height));
    for row in 0..h + h / 2 {
        out.extend_from_slice(&src[row * stride..row * stride + w]);
    }
    Cow::Owned(out)
}

/// Rotate a packed `w` x `h` frame clockwise into `dst`.
pub fn rotate(src: &[u8], w: u32, h: u32, dst: &mut [u8], dst_desc: &FrameDescriptor, rotation: Rotation) {
    let (w, h) = (w as usize, h as usize);
    let luma = w * h;
    let dst_stride = dst_desc.stride as usize;
    let dst_luma = dst_stride * dst_desc.height as usize;
    let (dst_y, dst_uv) = dst.split_at_mut(dst_luma);

    rotate_plane::<1>(&src[..luma], w, h, dst_y, dst_stride, rotation);
    rotate_plane::<2>(&src[luma..luma + luma / 2], w / 2, h / 2, dst_uv, dst_stride, rotation);
}

fn rotate_plane<const BPP: usize>(
    src: &[u8],
    w: usize,
    h: usize,
    dst: &mut [u8],
    dst_stride: usize,
    rotation: Rotation,
) {
    for y in 0..h {
        for x in 0..w {
            let (dx, dy) = match rotation {
                Rotation::None => (x, y),
                Rotation::Deg90 => (h - 1 - y, x),
                Rotation::Deg180 => (w - 1 - x, h - 1 - y),
                Rotation::Deg270 => (y, w - 1 - x),
            };
            let s = (y * w + x) * BPP;
            let d = dy * dst_stride + dx * BPP;
            dst[d..d + BPP].copy_from_slice(&src[s..s + BPP]);
        }
    }
}

/// Convert a semi-planar frame to packed RGB8 (BT.601 full range).
pub fn to_rgb(src: &[u8], desc: &FrameDescriptor) -> Result<Vec<u8>, ImagingError> {
    check_semi_planar(desc)?;
    check_len(src, frame_len(desc.stride, desc.height))?;

    let (w, h, stride) = (
        desc.width as usize,
        desc.height as usize,
        desc.stride as usize,
    );
    let uv_base = stride * h;
    let swap = desc.format == PixelFormat::Nv21;
    let mut rgb = Vec::with_capacity(w * h * 3);

    for y in 0..h {
        let uv_row = uv_base + (y / 2) * stride;
        for x in 0..w {
            let luma = src[y * stride + x] as i32;
            let pair = uv_row + (x & !1);
            let (mut cb, mut cr) = (src[pair] as i32 - 128, src[pair + 1] as i32 - 128);
            if swap {
                std::mem::swap(&mut cb, &mut cr);
            }
            let r = luma + ((91_881 * cr) >> 16);
            let g = luma - ((22_554 * cb + 46_802 * cr) >> 16);
            let b = luma + ((116_130 * cb) >> 16);
            rgb.push(r.clamp(0, 255) as u8);
            rgb.push(g.clamp(0, 255) as u8);
            rgb.push(b.clamp(0, 255) as u8);
        }
    }
    Ok(rgb)
}

fn check_semi_planar(desc: &FrameDescriptor) -> Result<(), ImagingError> {
    if desc.format.is_semi_planar() {
        Ok(())
    } else {
        Err(ImagingError::UnsupportedFormat(desc.format))
    }
}

fn check_len(buf: &[u8], needed: usize) -> Result<(), ImagingError> {
    if buf.len() < needed {
        Err(ImagingError::BufferTooSmall {
            needed,
            actual: buf.len(),
        })
    } else {
        Ok(())
    }
}
