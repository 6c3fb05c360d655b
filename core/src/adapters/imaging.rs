//! Image conversion and single-page PDF composition.
//!
//! Every scan ends up here: the native payload is turned into a JPEG (or
//! passed through when it already is one) and placed on an A4 portrait page
//! at (10mm, 10mm), 190mm wide, height following the aspect ratio.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, ImageDecoder, ImageFormat, ImageReader, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use crate::domain::{FrameFormat, FrameParameters};
use crate::error::{EncodingStage, Error, Result};

const JPEG_QUALITY: u8 = 90;

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const IMAGE_OFFSET_MM: f32 = 10.0;
const IMAGE_WIDTH_MM: f32 = 190.0;
const POINTS_PER_MM: f32 = 72.0 / 25.4;

/// Image data as acquired from a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawImage {
    /// A complete image file (JPEG, PNG, BMP, TIFF).
    Encoded(Vec<u8>),
    /// Uncompressed samples described by frame parameters.
    Frame {
        params: FrameParameters,
        data: Vec<u8>,
    },
}

impl RawImage {
    /// The bytes as the device produced them.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Encoded(data) => data,
            Self::Frame { data, .. } => data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorSpace {
    Gray,
    Rgb,
}

impl ColorSpace {
    fn pdf_name(self) -> &'static str {
        match self {
            Self::Gray => "DeviceGray",
            Self::Rgb => "DeviceRGB",
        }
    }
}

/// A baseline JPEG ready to be embedded with `DCTDecode`.
#[derive(Debug, Clone)]
struct JpegImage {
    data: Vec<u8>,
    width: u32,
    height: u32,
    color: ColorSpace,
}

/// Convert a raw scan into a serialized single-page PDF.
pub fn render_pdf(image: &RawImage) -> Result<Vec<u8>> {
    let jpeg = to_jpeg(image)?;
    compose_pdf(&jpeg)
}

fn to_jpeg(image: &RawImage) -> Result<JpegImage> {
    match image {
        RawImage::Encoded(data) => {
            if matches!(image::guess_format(data), Ok(ImageFormat::Jpeg)) {
                return passthrough_jpeg(data);
            }
            let decoded = image::load_from_memory(data).map_err(|e| {
                Error::encoding(EncodingStage::Decode, "could not decode scanned image", e)
            })?;
            encode_jpeg(&decoded)
        }
        RawImage::Frame { params, data } => encode_jpeg(&frame_to_image(params, data)?),
    }
}

/// Read the JPEG header only; the bytes are embedded untouched.
fn passthrough_jpeg(data: &[u8]) -> Result<JpegImage> {
    let decoder = ImageReader::with_format(Cursor::new(data), ImageFormat::Jpeg)
        .into_decoder()
        .map_err(|e| Error::encoding(EncodingStage::Decode, "could not read JPEG header", e))?;
    let (width, height) = decoder.dimensions();
    let color = if decoder.color_type().has_color() {
        ColorSpace::Rgb
    } else {
        ColorSpace::Gray
    };

    Ok(JpegImage {
        data: data.to_vec(),
        width,
        height,
        color,
    })
}

fn encode_jpeg(image: &DynamicImage) -> Result<JpegImage> {
    let mut data = Vec::new();
    let color = {
        let mut encoder = JpegEncoder::new_with_quality(&mut data, JPEG_QUALITY);
        if image.color().has_color() {
            encoder.encode_image(&image.to_rgb8()).map(|_| ColorSpace::Rgb)
        } else {
            encoder.encode_image(&image.to_luma8()).map(|_| ColorSpace::Gray)
        }
    }
    .map_err(|e| Error::encoding(EncodingStage::JpegEncode, "could not encode JPEG", e))?;

    Ok(JpegImage {
        data,
        width: image.width(),
        height: image.height(),
        color,
    })
}

/// Build an image from the complete lines contained in `data`.
///
/// A short read yields a shorter image; a trailing partial line is dropped.
fn frame_to_image(params: &FrameParameters, data: &[u8]) -> Result<DynamicImage> {
    let decode_error = |message: String| {
        Error::encoding(EncodingStage::Decode, message.clone(), message)
    };

    let lines = params.complete_lines(data.len());
    if lines == 0 {
        return Err(decode_error(format!(
            "frame holds no complete scan line ({} bytes, {} per line)",
            data.len(),
            params.bytes_per_line
        )));
    }
    let width = params.pixels_per_line;
    let channels = params.format.channels();
    if matches!(
        params.format,
        FrameFormat::Red | FrameFormat::Green | FrameFormat::Blue
    ) {
        return Err(decode_error("three-pass colour frames are not supported".to_string()));
    }

    let row_len = match (params.depth, channels) {
        (1, 1) => width.div_ceil(8),
        (8, _) => width * channels,
        (16, _) => width * channels * 2,
        (depth, _) => {
            return Err(decode_error(format!(
                "unsupported sample depth {depth} for {:?} frames",
                params.format
            )))
        }
    };
    if row_len > params.bytes_per_line {
        return Err(decode_error(format!(
            "line of {} pixels does not fit in {} bytes",
            width, params.bytes_per_line
        )));
    }

    let mut samples = Vec::with_capacity(width * channels * lines);
    for row in data.chunks_exact(params.bytes_per_line).take(lines) {
        let row = &row[..row_len];
        match params.depth {
            // Lineart: one bit per pixel, set bits are black.
            1 => samples.extend((0..width).map(|x| {
                if row[x / 8] & (0x80 >> (x % 8)) != 0 {
                    0u8
                } else {
                    255u8
                }
            })),
            8 => samples.extend_from_slice(row),
            _ => samples.extend(
                row.chunks_exact(2)
                    .map(|pair| (u16::from_ne_bytes([pair[0], pair[1]]) >> 8) as u8),
            ),
        }
    }

    let (width, height) = (width as u32, lines as u32);
    let image = if channels == 3 {
        RgbImage::from_raw(width, height, samples).map(DynamicImage::ImageRgb8)
    } else {
        GrayImage::from_raw(width, height, samples).map(DynamicImage::ImageLuma8)
    };
    image.ok_or_else(|| decode_error(format!("could not build a {width}x{height} image")))
}

fn compose_pdf(jpeg: &JpegImage) -> Result<Vec<u8>> {
    let pdf_error =
        |e: lopdf::Error| Error::encoding(EncodingStage::PdfSerialize, "could not build PDF", e);

    let page_width = PAGE_WIDTH_MM * POINTS_PER_MM;
    let page_height = PAGE_HEIGHT_MM * POINTS_PER_MM;
    let image_width = IMAGE_WIDTH_MM * POINTS_PER_MM;
    let image_height = image_width * jpeg.height as f32 / jpeg.width.max(1) as f32;
    let x = IMAGE_OFFSET_MM * POINTS_PER_MM;
    // PDF space grows upwards from the bottom edge.
    let y = page_height - IMAGE_OFFSET_MM * POINTS_PER_MM - image_height;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => jpeg.width as i64,
            "Height" => jpeg.height as i64,
            "ColorSpace" => jpeg.color.pdf_name(),
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg.data.clone(),
    )
    .with_compression(false);
    let image_id = doc.add_object(image);

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    image_width.into(),
                    0.into(),
                    0.into(),
                    image_height.into(),
                    x.into(),
                    y.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().map_err(pdf_error)?));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), page_width.into(), page_height.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).map_err(|e| {
        Error::encoding(EncodingStage::PdfSerialize, "could not serialize PDF", e)
    })?;
    Ok(out)
}


#[cfg(test)]
mod tests {
    use super::testing::embedded_image;
    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 7) as u8, (y * 5) as u8, 128])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn gray_params(width: usize, lines: usize) -> FrameParameters {
        FrameParameters {
            format: FrameFormat::Gray,
            last_frame: true,
            bytes_per_line: width,
            pixels_per_line: width,
            lines,
            depth: 8,
        }
    }

    #[test]
    fn test_png_round_trip_keeps_dimensions() {
        let pdf = render_pdf(&RawImage::Encoded(png(64, 48))).unwrap();
        assert!(pdf.starts_with(b"%PDF-1.5"));

        let (jpeg, width, height) = embedded_image(&pdf);
        assert_eq!((width, height), (64, 48));
        let decoded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn test_jpeg_is_embedded_untouched() {
        let jpeg = encode_jpeg(&image::load_from_memory(&png(20, 10)).unwrap())
            .unwrap()
            .data;
        let pdf = render_pdf(&RawImage::Encoded(jpeg.clone())).unwrap();
        let (embedded, width, height) = embedded_image(&pdf);
        assert_eq!(embedded, jpeg);
        assert_eq!((width, height), (20, 10));
    }

    #[test]
    fn test_single_a4_page_with_fixed_placement() {
        let pdf = render_pdf(&RawImage::Encoded(png(100, 50))).unwrap();
        let doc = Document::load_mem(&pdf).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);

        let page_id = *pages.values().next().unwrap();
        let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        let cm = content
            .operations
            .iter()
            .find(|op| op.operator == "cm")
            .expect("placement matrix");
        let values: Vec<f32> = cm.operands.iter().map(|o| o.as_float().unwrap()).collect();

        let width = IMAGE_WIDTH_MM * POINTS_PER_MM;
        assert!((values[0] - width).abs() < 0.01);
        assert!((values[3] - width / 2.0).abs() < 0.01);
        assert!((values[4] - IMAGE_OFFSET_MM * POINTS_PER_MM).abs() < 0.01);
        let top = values[5] + values[3];
        assert!((top - (PAGE_HEIGHT_MM - IMAGE_OFFSET_MM) * POINTS_PER_MM).abs() < 0.01);
    }

    #[test]
    fn test_frame_uses_complete_lines_only() {
        let params = gray_params(16, 10);
        let data = vec![200u8; 16 * 4 + 5];
        let pdf = render_pdf(&RawImage::Frame { params, data }).unwrap();
        let (_, width, height) = embedded_image(&pdf);
        assert_eq!((width, height), (16, 4));
    }

    #[test]
    fn test_frame_strips_line_padding() {
        let params = FrameParameters {
            bytes_per_line: 12,
            pixels_per_line: 3,
            format: FrameFormat::Rgb,
            ..gray_params(12, 2)
        };
        let image = frame_to_image(&params, &[10u8; 24]).unwrap();
        assert_eq!((image.width(), image.height()), (3, 2));
        assert!(image.color().has_color());
    }

    #[test]
    fn test_lineart_frame() {
        let params = FrameParameters {
            bytes_per_line: 1,
            pixels_per_line: 8,
            depth: 1,
            ..gray_params(1, 1)
        };
        let image = frame_to_image(&params, &[0b1000_0001]).unwrap().to_luma8();
        assert_eq!(image.get_pixel(0, 0).0, [0]);
        assert_eq!(image.get_pixel(1, 0).0, [255]);
        assert_eq!(image.get_pixel(7, 0).0, [0]);
    }

    #[test]
    fn test_sixteen_bit_frame_keeps_high_byte() {
        let params = FrameParameters {
            bytes_per_line: 4,
            pixels_per_line: 2,
            depth: 16,
            ..gray_params(4, 1)
        };
        let mut data = Vec::new();
        data.extend_from_slice(&0xAB00u16.to_ne_bytes());
        data.extend_from_slice(&0x1200u16.to_ne_bytes());
        let image = frame_to_image(&params, &data).unwrap().to_luma8();
        assert_eq!(image.get_pixel(0, 0).0, [0xAB]);
        assert_eq!(image.get_pixel(1, 0).0, [0x12]);
    }

    #[test]
    fn test_empty_frame_is_decode_error() {
        let err = render_pdf(&RawImage::Frame {
            params: gray_params(16, 10),
            data: vec![0; 8],
        })
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Encoding {
                stage: EncodingStage::Decode,
                ..
            }
        ));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let err = render_pdf(&RawImage::Encoded(b"not an image".to_vec())).unwrap_err();
        assert!(matches!(
            err,
            Error::Encoding {
                stage: EncodingStage::Decode,
                ..
            }
        ));
    }

    #[test]
    fn test_into_bytes() {
        let raw = RawImage::Frame {
            params: gray_params(2, 1),
            data: vec![1, 2],
        };
        assert_eq!(raw.into_bytes(), vec![1, 2]);
    }
}
