use compat_quake::bsp_q3::{parse_bsp, Bsp};
use compat_quake::shader::{parse_shader_script, Shader};
use compat_quake::tga::parse_tga;

use crate::error::IngestError;

/// Format conversions used while building the cache. `context` names the
/// entry being converted and ends up in error messages.
pub trait AssetConverter {
    /// Parses a binary map and returns the document written to `maps/<name>.json`.
    fn convert_map(&mut self, context: &str, data: &[u8]) -> Result<String, IngestError>;

    /// Converts a TGA image to PNG bytes.
    fn convert_image(&mut self, context: &str, data: &[u8]) -> Result<Vec<u8>, IngestError>;

    fn parse_shaders(&mut self, context: &str, text: &str) -> Result<Vec<Shader>, IngestError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct QuakeConverter;

impl AssetConverter for QuakeConverter {
    fn convert_map(&mut self, context: &str, data: &[u8]) -> Result<String, IngestError> {
        let bsp = parse_bsp(data).map_err(|err| IngestError::format(context, err))?;
        map_document(context, &bsp)
    }

    fn convert_image(&mut self, context: &str, data: &[u8]) -> Result<Vec<u8>, IngestError> {
        let image = parse_tga(data).map_err(|err| IngestError::format(context, err))?;
        encode_png(image.width, image.height, &image.rgba)
            .map_err(|err| IngestError::format(context, err))
    }

    fn parse_shaders(&mut self, context: &str, text: &str) -> Result<Vec<Shader>, IngestError> {
        parse_shader_script(text).map_err(|err| IngestError::format(context, err))
    }
}

/// Serializes a parsed map. Maps with NaN or infinite floats are rejected
/// since JSON would store them as `null` and the document could not be
/// read back.
pub fn map_document(context: &str, bsp: &Bsp) -> Result<String, IngestError> {
    if let Some(lump) = bsp.non_finite_lump() {
        return Err(IngestError::format(
            context,
            format!("non-finite float in {} lump", lump.name()),
        ));
    }
    serde_json::to_string_pretty(bsp).map_err(|err| IngestError::format(context, err))
}

/// Encodes an 8-bit RGBA buffer as PNG.
pub fn encode_png(width: u32, height: u32, rgba: &[u8]) -> Result<Vec<u8>, png::EncodingError> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(rgba)?;
        writer.finish()?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::{bsp_with_nan_plane, minimal_bsp, truecolor_tga};
    use std::io::Cursor;

    fn decode_png(bytes: &[u8]) -> (u32, u32, Vec<u8>) {
        let decoder = png::Decoder::new(Cursor::new(bytes));
        let mut reader = decoder.read_info().unwrap();
        let mut buf = vec![0; reader.output_buffer_size()];
        let output = reader.next_frame(&mut buf).unwrap();
        assert_eq!(output.color_type, png::ColorType::Rgba);
        assert_eq!(output.bit_depth, png::BitDepth::Eight);
        buf.truncate(output.buffer_size());
        (output.width, output.height, buf)
    }

    #[test]
    fn tga_converts_to_matching_png_pixels() {
        // 3x2 image, rows top to bottom, pixels stored as BGR.
        let bgr = [
            0, 0, 255, 0, 255, 0, 255, 0, 0, //
            10, 20, 30, 40, 50, 60, 70, 80, 90,
        ];
        let tga = truecolor_tga(3, 2, &bgr);
        let png = QuakeConverter.convert_image("textures/a.tga", &tga).unwrap();
        let (width, height, rgba) = decode_png(&png);
        assert_eq!((width, height), (3, 2));
        let expected: Vec<u8> = bgr
            .chunks_exact(3)
            .flat_map(|p| [p[2], p[1], p[0], 255])
            .collect();
        assert_eq!(rgba, expected);
    }

    #[test]
    fn truncated_tga_is_format_error() {
        let mut tga = truecolor_tga(4, 4, &[0; 48]);
        tga.truncate(30);
        let err = QuakeConverter
            .convert_image("textures/bad.tga", &tga)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(err.to_string().contains("textures/bad.tga"));
    }

    #[test]
    fn map_document_is_pretty_json_that_reads_back() {
        let json = QuakeConverter
            .convert_map("maps/a.bsp", &minimal_bsp())
            .unwrap();
        assert!(json.contains("\n  \"header\""));
        let bsp: Bsp = serde_json::from_str(&json).unwrap();
        assert_eq!(bsp, parse_bsp(&minimal_bsp()).unwrap());
    }

    #[test]
    fn map_with_nan_is_rejected() {
        let err = QuakeConverter
            .convert_map("maps/nan.bsp", &bsp_with_nan_plane())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(err.to_string().contains("non-finite float in planes lump"));
    }

    #[test]
    fn bad_map_is_format_error() {
        let err = QuakeConverter
            .convert_map("maps/a.bsp", b"not a map")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn shader_scripts_parse_every_definition() {
        let text = "textures/a/one\n{\n surfaceparm nodraw\n}\ntextures/a/two\n{\n {\n  map $lightmap\n }\n}\n";
        let shaders = QuakeConverter
            .parse_shaders("scripts/a.shader", text)
            .unwrap();
        let names: Vec<&str> = shaders.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["textures/a/one", "textures/a/two"]);
    }
}
