use std::fmt;

const HEADER_LEN: usize = 18;
const DESCRIPTOR_RIGHT_TO_LEFT: u8 = 0x10;
const DESCRIPTOR_TOP_TO_BOTTOM: u8 = 0x20;

#[derive(Debug, PartialEq, Eq)]
pub enum TgaError {
    TooShort,
    UnsupportedImageType(u8),
    UnsupportedPixelDepth { image_type: u8, depth: u8 },
    InvalidDimensions { width: u32, height: u32 },
    PixelCountOverflow,
    MissingColorMap,
    ColorMapIndexOutOfRange { index: usize },
    DataTooShort { expected: usize, actual: usize },
}

impl fmt::Display for TgaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TgaError::TooShort => write!(f, "tga data too short for header"),
            TgaError::UnsupportedImageType(kind) => {
                write!(f, "unsupported tga image type {}", kind)
            }
            TgaError::UnsupportedPixelDepth { image_type, depth } => write!(
                f,
                "unsupported tga pixel depth {} for image type {}",
                depth, image_type
            ),
            TgaError::InvalidDimensions { width, height } => {
                write!(f, "invalid tga dimensions: {}x{}", width, height)
            }
            TgaError::PixelCountOverflow => write!(f, "tga pixel count overflow"),
            TgaError::MissingColorMap => write!(f, "color-mapped tga has no usable color map"),
            TgaError::ColorMapIndexOutOfRange { index } => {
                write!(f, "tga color map index out of range: {}", index)
            }
            TgaError::DataTooShort { expected, actual } => write!(
                f,
                "tga data too short: expected {} bytes, got {}",
                expected, actual
            ),
        }
    }
}

impl std::error::Error for TgaError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
    ColorMapped,
    TrueColor,
    Grayscale,
}

#[derive(Debug, Clone, Copy)]
struct TgaHeader {
    id_length: u8,
    color_map_first: u16,
    color_map_length: u16,
    color_map_depth: u8,
    width: u32,
    height: u32,
    pixel_depth: u8,
    descriptor: u8,
    format: PixelFormat,
    rle: bool,
}

/// Decoded image, rows top to bottom, 8-bit RGBA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

pub fn parse_tga(data: &[u8]) -> Result<RgbaImage, TgaError> {
    let header = parse_header(data)?;
    let pixel_count = (header.width as usize)
        .checked_mul(header.height as usize)
        .ok_or(TgaError::PixelCountOverflow)?;

    let mut cursor = HEADER_LEN + header.id_length as usize;
    let palette = if header.color_map_length > 0 {
        let entry_bytes = usize::from(header.color_map_depth).div_ceil(8);
        let len = entry_bytes * header.color_map_length as usize;
        let end = cursor + len;
        if data.len() < end {
            return Err(TgaError::DataTooShort {
                expected: end,
                actual: data.len(),
            });
        }
        let palette = decode_palette(&data[cursor..end], header.color_map_depth)?;
        cursor = end;
        palette
    } else {
        Vec::new()
    };
    if header.format == PixelFormat::ColorMapped && palette.is_empty() {
        return Err(TgaError::MissingColorMap);
    }

    let bytes_per_pixel = usize::from(header.pixel_depth / 8);
    let packed_len = pixel_count
        .checked_mul(bytes_per_pixel)
        .ok_or(TgaError::PixelCountOverflow)?;
    let body = &data[cursor.min(data.len())..];
    let packed = if header.rle {
        decode_rle(body, bytes_per_pixel, packed_len)?
    } else {
        if body.len() < packed_len {
            return Err(TgaError::DataTooShort {
                expected: cursor + packed_len,
                actual: data.len(),
            });
        }
        body[..packed_len].to_vec()
    };

    let mut rgba = Vec::with_capacity(pixel_count * 4);
    for pixel in packed.chunks_exact(bytes_per_pixel) {
        let color = match header.format {
            PixelFormat::TrueColor => truecolor_rgba(pixel),
            PixelFormat::Grayscale => grayscale_rgba(pixel),
            PixelFormat::ColorMapped => {
                let index = usize::from(pixel[0]);
                let slot = index
                    .checked_sub(usize::from(header.color_map_first))
                    .ok_or(TgaError::ColorMapIndexOutOfRange { index })?;
                *palette
                    .get(slot)
                    .ok_or(TgaError::ColorMapIndexOutOfRange { index })?
            }
        };
        rgba.extend_from_slice(&color);
    }

    reorient(&mut rgba, header.width as usize, header.height as usize, header.descriptor);
    Ok(RgbaImage {
        width: header.width,
        height: header.height,
        rgba,
    })
}

fn parse_header(data: &[u8]) -> Result<TgaHeader, TgaError> {
    if data.len() < HEADER_LEN {
        return Err(TgaError::TooShort);
    }
    let image_type = data[2];
    let (format, rle) = match image_type {
        1 => (PixelFormat::ColorMapped, false),
        2 => (PixelFormat::TrueColor, false),
        3 => (PixelFormat::Grayscale, false),
        9 => (PixelFormat::ColorMapped, true),
        10 => (PixelFormat::TrueColor, true),
        11 => (PixelFormat::Grayscale, true),
        other => return Err(TgaError::UnsupportedImageType(other)),
    };
    let pixel_depth = data[16];
    let depth_ok = match format {
        PixelFormat::ColorMapped => pixel_depth == 8,
        PixelFormat::TrueColor => pixel_depth == 24 || pixel_depth == 32,
        PixelFormat::Grayscale => pixel_depth == 8 || pixel_depth == 16,
    };
    if !depth_ok {
        return Err(TgaError::UnsupportedPixelDepth {
            image_type,
            depth: pixel_depth,
        });
    }
    let width = u32::from(read_u16_le(&data[12..14]));
    let height = u32::from(read_u16_le(&data[14..16]));
    if width == 0 || height == 0 {
        return Err(TgaError::InvalidDimensions { width, height });
    }
    Ok(TgaHeader {
        id_length: data[0],
        color_map_first: read_u16_le(&data[3..5]),
        color_map_length: read_u16_le(&data[5..7]),
        color_map_depth: data[7],
        width,
        height,
        pixel_depth,
        descriptor: data[17],
        format,
        rle,
    })
}

fn decode_palette(data: &[u8], depth: u8) -> Result<Vec<[u8; 4]>, TgaError> {
    match depth {
        24 => Ok(data.chunks_exact(3).map(truecolor_rgba).collect()),
        32 => Ok(data.chunks_exact(4).map(truecolor_rgba).collect()),
        other => Err(TgaError::UnsupportedPixelDepth {
            image_type: 1,
            depth: other,
        }),
    }
}

fn decode_rle(body: &[u8], bytes_per_pixel: usize, packed_len: usize) -> Result<Vec<u8>, TgaError> {
    let mut out = Vec::with_capacity(packed_len);
    let mut pos = 0;
    let too_short = |pos: usize| TgaError::DataTooShort {
        expected: pos + 1,
        actual: body.len(),
    };
    while out.len() < packed_len {
        let packet = *body.get(pos).ok_or_else(|| too_short(pos))?;
        pos += 1;
        let count = usize::from(packet & 0x7f) + 1;
        if packet & 0x80 != 0 {
            let pixel = body
                .get(pos..pos + bytes_per_pixel)
                .ok_or_else(|| too_short(pos + bytes_per_pixel - 1))?;
            pos += bytes_per_pixel;
            for _ in 0..count {
                out.extend_from_slice(pixel);
            }
        } else {
            let len = count * bytes_per_pixel;
            let pixels = body
                .get(pos..pos + len)
                .ok_or_else(|| too_short(pos + len - 1))?;
            pos += len;
            out.extend_from_slice(pixels);
        }
    }
    // A run may straddle the last scanline; anything past the image is dropped.
    out.truncate(packed_len);
    Ok(out)
}

fn truecolor_rgba(pixel: &[u8]) -> [u8; 4] {
    let alpha = pixel.get(3).copied().unwrap_or(255);
    [pixel[2], pixel[1], pixel[0], alpha]
}

fn grayscale_rgba(pixel: &[u8]) -> [u8; 4] {
    let alpha = pixel.get(1).copied().unwrap_or(255);
    [pixel[0], pixel[0], pixel[0], alpha]
}

fn reorient(rgba: &mut [u8], width: usize, height: usize, descriptor: u8) {
    let stride = width * 4;
    if descriptor & DESCRIPTOR_TOP_TO_BOTTOM == 0 {
        for row in 0..height / 2 {
            let (top, bottom) = rgba.split_at_mut((height - 1 - row) * stride);
            top[row * stride..(row + 1) * stride].swap_with_slice(&mut bottom[..stride]);
        }
    }
    if descriptor & DESCRIPTOR_RIGHT_TO_LEFT != 0 {
        for row in rgba.chunks_exact_mut(stride) {
            for col in 0..width / 2 {
                let mirror = width - 1 - col;
                for channel in 0..4 {
                    row.swap(col * 4 + channel, mirror * 4 + channel);
                }
            }
        }
    }
}

fn read_u16_le(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}
