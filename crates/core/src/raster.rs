//! Raster image handling.
//!
//! The actual pixel-to-bytes codec is an external collaborator behind
//! [`ImageEncoder`]; this module only moves images through it, in parallel
//! when there are many independent ones (a wafer of raster tiles, say).

use std::thread;

use crate::parallel::jobs_by_chunks;
use crate::Result;

/// Resampling method requested from the image encoder collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScalingMethod {
    #[default]
    Near,
    Bilinear,
    Bicubic,
    Gaussian,
    Lanczos,
}

/// An in-memory raster: dimensions plus pixel bytes whose layout is an
/// agreement between the producer and the encoder collaborator.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Opaque "encode raster to bytes" service.
///
/// Implementations reject formats or representations they cannot handle
/// with [`crate::Error::UnsupportedImageType`]; there is no silent
/// fallback.
pub trait ImageEncoder: Sync {
    fn encode(&self, image: &RasterImage, format: &str, scaling: ScalingMethod) -> Result<Vec<u8>>;
}

/// Encode many independent images, chunked across worker threads.
///
/// Output order matches input order regardless of which worker finishes
/// first: each chunk owns its own output slot. Per-image failures stay in
/// their slot and do not abort sibling chunks.
pub fn encode_images_parallel<K: Send>(
    images: Vec<(K, RasterImage)>,
    encoder: &dyn ImageEncoder,
    format: &str,
    scaling: ScalingMethod,
) -> Vec<(K, Result<Vec<u8>>)> {
    let total = images.len();
    if total == 0 {
        return Vec::new();
    }

    let jobs = jobs_by_chunks(total, 0);
    if jobs == 1 {
        return images
            .into_iter()
            .map(|(key, img)| {
                let encoded = encoder.encode(&img, format, scaling);
                (key, encoded)
            })
            .collect();
    }

    let chunk_size = total.div_ceil(jobs);
    thread::scope(|s| {
        let mut handles = Vec::with_capacity(jobs);
        let mut iter = images.into_iter();
        loop {
            let chunk: Vec<(K, RasterImage)> = iter.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            handles.push(s.spawn(move || {
                chunk
                    .into_iter()
                    .map(|(key, img)| {
                        let encoded = encoder.encode(&img, format, scaling);
                        (key, encoded)
                    })
                    .collect::<Vec<_>>()
            }));
        }
        handles
            .into_iter()
            .flat_map(|h| h.join().expect("image encode worker panicked"))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    /// Byte-reverses the pixel data; rejects anything but "png".
    struct StubEncoder;

    impl ImageEncoder for StubEncoder {
        fn encode(
            &self,
            image: &RasterImage,
            format: &str,
            _scaling: ScalingMethod,
        ) -> Result<Vec<u8>> {
            if format != "png" {
                return Err(Error::UnsupportedImageType(format.to_string()));
            }
            Ok(image.data.iter().rev().copied().collect())
        }
    }

    fn image(seed: u8) -> RasterImage {
        RasterImage {
            width: 4,
            height: 4,
            data: (0..16).map(|i| i ^ seed).collect(),
        }
    }

    #[test]
    fn test_encode_preserves_input_order() {
        let images: Vec<(usize, RasterImage)> = (0..64).map(|i| (i, image(i as u8))).collect();
        let results = encode_images_parallel(images, &StubEncoder, "png", ScalingMethod::Near);

        assert_eq!(results.len(), 64);
        for (i, (key, encoded)) in results.iter().enumerate() {
            assert_eq!(*key, i);
            let expected: Vec<u8> = (0..16u8).map(|b| b ^ i as u8).rev().collect();
            assert_eq!(encoded.as_ref().unwrap(), &expected);
        }
    }

    #[test]
    fn test_unsupported_format_fails_per_image() {
        let images = vec![(1, image(0)), (2, image(1))];
        let results = encode_images_parallel(images, &StubEncoder, "tiff", ScalingMethod::Near);
        for (_, encoded) in &results {
            assert!(matches!(encoded, Err(Error::UnsupportedImageType(_))));
        }
    }

    #[test]
    fn test_empty_input() {
        let results =
            encode_images_parallel::<u32>(Vec::new(), &StubEncoder, "png", ScalingMethod::Near);
        assert!(results.is_empty());
    }
}
