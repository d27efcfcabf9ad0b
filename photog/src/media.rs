use {
    anyhow::{Context, Result},
    image::{imageops::FilterType, DynamicImage, GenericImageView, ImageOutputFormat},
    mime::Mime,
    photog_shared::Error,
    std::{io::Cursor, path::Path},
};

/// Box which thumbnails are scaled to fit within
pub const THUMBNAIL_BOUNDS: (u32, u32) = (300, 300);

/// Canonical encoding quality.  The `image` JPEG encoder never subsamples chroma, so this is effectively 4:4:4.
const FULL_QUALITY: u8 = 100;

const THUMBNAIL_QUALITY: u8 = 90;

/// Full-size and thumbnail renditions of one source image, both JPEG-encoded
pub struct Variants {
    pub full: Vec<u8>,
    pub thumbnail: Vec<u8>,
}

/// Guess the MIME type of `path` from its extension, failing with `Error::UnsupportedMedia` unless it is an image
/// type.
///
/// The file contents are not examined.
pub fn classify(path: &Path) -> Result<Mime, Error> {
    mime_guess::from_path(path)
        .first()
        .filter(|mime| mime.type_() == mime::IMAGE)
        .ok_or_else(|| Error::UnsupportedMedia(path.to_owned()))
}

/// Scale `native` dimensions down to fit within `bounds`, preserving the aspect ratio.
///
/// Images which already fit are left at their native size.
fn bound(
    (native_width, native_height): (u32, u32),
    (bound_width, bound_height): (u32, u32),
) -> (u32, u32) {
    // Scale `length` by `numerator / denominator`, rounding down but never to zero.
    let scale = |length: u32, numerator: u32, denominator: u32| {
        ((u64::from(length) * u64::from(numerator)) / u64::from(denominator)).max(1) as u32
    };

    if native_width <= bound_width && native_height <= bound_height {
        (native_width, native_height)
    } else if u64::from(native_width) * u64::from(bound_height)
        > u64::from(bound_width) * u64::from(native_height)
    {
        (bound_width, scale(native_height, bound_width, native_width))
    } else {
        (scale(native_width, bound_height, native_height), bound_height)
    }
}

fn encode(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());

    image.write_to(&mut buffer, ImageOutputFormat::Jpeg(quality))?;

    Ok(buffer.into_inner())
}

/// Decode `original` and re-encode it as a canonical full-size JPEG and a thumbnail bounded by `THUMBNAIL_BOUNDS`.
///
/// This is CPU-bound and should be run on a blocking thread.  Fails with `Error::Decode` if `original` cannot be
/// parsed as an image.
pub fn transcode(original: &[u8]) -> Result<Variants> {
    let image = DynamicImage::ImageRgb8(
        image::load_from_memory(original)
            .context(Error::Decode)?
            .to_rgb8(),
    );

    let (width, height) = bound(image.dimensions(), THUMBNAIL_BOUNDS);

    let thumbnail = if (width, height) == image.dimensions() {
        encode(&image, THUMBNAIL_QUALITY)?
    } else {
        encode(
            &image.resize_exact(width, height, FilterType::Lanczos3),
            THUMBNAIL_QUALITY,
        )?
    };

    Ok(Variants {
        full: encode(&image, FULL_QUALITY)?,
        thumbnail,
    })
}
