// This is free and unencumbered software released into the public domain.

use super::staging_dir;
use crate::shared::{CameraError, CameraResult, SessionConfig};
use derive_more::Display;
use image::{
    DynamicImage, GrayImage, ImageDecoder, ImageFormat, ImageReader, RgbImage,
    codecs::jpeg::JpegEncoder, metadata::Orientation,
};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// Clockwise rotation applied to a decoded still.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    #[display("0")]
    None,
    #[display("90")]
    Cw90,
    #[display("180")]
    Cw180,
    #[display("270")]
    Cw270,
}

impl Rotation {
    /// Maps an EXIF orientation tag. Only the pure rotations are honoured;
    /// mirrored and unknown values leave the image as is.
    pub fn from_exif(tag: u16) -> Self {
        match tag {
            6 => Rotation::Cw90,
            3 => Rotation::Cw180,
            8 => Rotation::Cw270,
            _ => Rotation::None,
        }
    }

    pub fn from_degrees(degrees: u32) -> Self {
        match degrees % 360 {
            90 => Rotation::Cw90,
            180 => Rotation::Cw180,
            270 => Rotation::Cw270,
            _ => Rotation::None,
        }
    }

    fn from_orientation(orientation: Orientation) -> Self {
        match orientation {
            Orientation::Rotate90 => Rotation::Cw90,
            Orientation::Rotate180 => Rotation::Cw180,
            Orientation::Rotate270 => Rotation::Cw270,
            _ => Rotation::None,
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Cw180 => 180,
            Rotation::Cw270 => 270,
        }
    }

    pub fn apply(self, image: DynamicImage) -> DynamicImage {
        match self {
            Rotation::None => image,
            Rotation::Cw90 => image.rotate90(),
            Rotation::Cw180 => image.rotate180(),
            Rotation::Cw270 => image.rotate270(),
        }
    }
}

/// Turns a raw encoded still into a bounded, upright JPEG.
#[derive(Clone, Copy, Debug)]
pub struct ImagePostProcessor {
    max_edge_pixels: u32,
    quality: u8,
}

impl Default for ImagePostProcessor {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

impl ImagePostProcessor {
    pub fn new(max_edge_pixels: u32, quality: u8) -> Self {
        Self {
            max_edge_pixels: max_edge_pixels.max(1),
            quality: quality.clamp(1, 100),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.max_edge_pixels, config.jpeg_quality)
    }

    pub fn max_edge_pixels(&self) -> u32 {
        self.max_edge_pixels
    }

    pub fn process(&self, input: &Path, output: &Path) -> CameraResult<PathBuf> {
        self.process_with_hint(input, output, Rotation::None)
    }

    /// Like [`Self::process`], using `fallback` when the image has no EXIF block.
    ///
    /// A missing `input` is not an error: its path is returned unchanged and
    /// nothing is written.
    pub fn process_with_hint(
        &self,
        input: &Path,
        output: &Path,
        fallback: Rotation,
    ) -> CameraResult<PathBuf> {
        if !input.exists() {
            warn!(input = %input.display(), "no image to process, passing path through");
            return Ok(input.to_path_buf());
        }

        let probe = open_reader(input)?;
        let format = probe.format();
        let (width, height) = probe
            .into_dimensions()
            .map_err(|e| CameraError::processing("reading image header", e))?;
        let subsample = width.max(height) > self.max_edge_pixels;
        let target = ((width / 2).max(1), (height / 2).max(1));
        debug!(width, height, subsample, "decoding still");

        let mut decoder = open_reader(input)?
            .into_decoder()
            .map_err(|e| CameraError::processing("creating decoder", e))?;
        let rotation = read_rotation(&mut decoder, fallback);

        let scaled = match format {
            Some(ImageFormat::Jpeg) if subsample => decode_jpeg_scaled(input, target)?,
            _ => None,
        };
        let image = match scaled {
            Some(image) => image,
            None => {
                let image = DynamicImage::from_decoder(decoder)
                    .map_err(|e| CameraError::processing("decoding image", e))?;
                if subsample {
                    image.thumbnail_exact(target.0, target.1)
                } else {
                    image
                }
            },
        };
        let image = rotation.apply(image);
        debug!(
            width = image.width(),
            height = image.height(),
            rotation = rotation.degrees(),
            "encoding still"
        );

        self.write_jpeg(&image, output)?;
        Ok(output.to_path_buf())
    }

    fn write_jpeg(&self, image: &DynamicImage, output: &Path) -> CameraResult {
        let mut staged = tempfile::Builder::new()
            .prefix(".still-")
            .suffix(".tmp")
            .tempfile_in(staging_dir(output))
            .map_err(|e| CameraError::io("creating output for", output, e))?;

        {
            let mut writer = BufWriter::new(&mut staged);
            let encoder = JpegEncoder::new_with_quality(&mut writer, self.quality);
            image
                .to_rgb8()
                .write_with_encoder(encoder)
                .map_err(|e| CameraError::processing("encoding JPEG", e))?;
            writer
                .flush()
                .map_err(|e| CameraError::io("writing", output, e))?;
        }

        staged
            .persist(output)
            .map_err(|e| CameraError::io("finalizing", output, e.error))?;
        Ok(())
    }
}

fn open_reader(path: &Path) -> CameraResult<ImageReader<std::io::BufReader<std::fs::File>>> {
    ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| CameraError::io("opening", path, e))
}

/// Decodes a JPEG straight at roughly `target` size using DCT scaling, so the
/// full-resolution raster is never allocated. Returns `None` for inputs the
/// scaled decoder cannot handle; the caller then takes the full decode path.
fn decode_jpeg_scaled(input: &Path, target: (u32, u32)) -> CameraResult<Option<DynamicImage>> {
    let file = File::open(input).map_err(|e| CameraError::io("opening", input, e))?;
    let mut decoder = jpeg_decoder::Decoder::new(BufReader::new(file));

    let decoded = decoder.read_info().and_then(|()| {
        let requested = (
            u16::try_from(target.0).unwrap_or(u16::MAX),
            u16::try_from(target.1).unwrap_or(u16::MAX),
        );
        let (width, height) = decoder.scale(requested.0, requested.1)?;
        let pixels = decoder.decode()?;
        Ok((u32::from(width), u32::from(height), pixels))
    });
    let (width, height, pixels) = match decoded {
        Ok(decoded) => decoded,
        Err(err) => {
            debug!(%err, "scaled JPEG decode unavailable, decoding at full size");
            return Ok(None);
        },
    };

    let image = match decoder.info().map(|info| info.pixel_format) {
        Some(jpeg_decoder::PixelFormat::RGB24) => {
            RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
        },
        Some(jpeg_decoder::PixelFormat::L8) => {
            GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8)
        },
        _ => None,
    };
    Ok(image.map(|image| {
        if (image.width(), image.height()) == target {
            image
        } else {
            image.thumbnail_exact(target.0, target.1)
        }
    }))
}

fn read_rotation(decoder: &mut impl ImageDecoder, fallback: Rotation) -> Rotation {
    match decoder.exif_metadata() {
        Ok(None) => fallback,
        Ok(Some(chunk)) => Orientation::from_exif_chunk(&chunk)
            .map(Rotation::from_orientation)
            .unwrap_or_default(),
        Err(err) => {
            warn!(%err, "unreadable orientation metadata, leaving image unrotated");
            Rotation::None
        },
    }
}
