use image::{imageops, GrayImage};

/// Gaussian sigma roughly equivalent to a 21x21 smoothing kernel.
const BLUR_SIGMA: f32 = 3.5;
const DILATE_ITERATIONS: usize = 2;
/// Motion area at which confidence saturates at 1.0.
const CONFIDENCE_SCALE: f64 = 10_000.0;

/// Frame-difference motion detector for a single cabin.
///
/// Holds the previous blurred frame and compares each new frame against it
/// (sliding window, not a fixed baseline). The comparison thresholds the
/// per-pixel difference into a binary mask, dilates it to merge nearby blobs,
/// and sums the area of connected regions large enough to not be sensor
/// noise.
pub struct MotionDetector {
    threshold: u8,
    min_area: u32,
    previous: Option<GrayImage>,
}

impl MotionDetector {
    pub fn new(threshold: u8, min_area: u32) -> Self {
        Self {
            threshold,
            min_area,
            previous: None,
        }
    }

    /// Returns `(motion_detected, confidence)` for the new frame.
    ///
    /// The first observation only seeds the baseline and can never be
    /// classified as motion. A resolution change also reseeds.
    pub fn detect(&mut self, frame: &GrayImage) -> (bool, f64) {
        let blurred = imageops::blur(frame, BLUR_SIGMA);

        let result = match self.previous.take() {
            Some(previous) if previous.dimensions() == blurred.dimensions() => {
                let (width, height) = blurred.dimensions();
                let mut mask = diff_mask(&previous, &blurred, self.threshold);
                for _ in 0..DILATE_ITERATIONS {
                    mask = dilate(&mask, width as usize, height as usize);
                }
                let total_area =
                    qualifying_area(&mut mask, width as usize, self.min_area);

                let motion_detected = total_area > self.min_area as u64;
                let confidence = (total_area as f64 / CONFIDENCE_SCALE).min(1.0);
                (motion_detected, confidence)
            }
            _ => (false, 0.0),
        };

        self.previous = Some(blurred);
        result
    }
}

/// Binary mask of pixels whose absolute difference exceeds the threshold.
fn diff_mask(previous: &GrayImage, current: &GrayImage, threshold: u8) -> Vec<u8> {
    previous
        .as_raw()
        .iter()
        .zip(current.as_raw())
        .map(|(a, b)| u8::from(a.abs_diff(*b) > threshold))
        .collect()
}

/// 3x3 morphological dilation.
fn dilate(mask: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = vec![0u8; mask.len()];
    for y in 0..height {
        for x in 0..width {
            let y_lo = y.saturating_sub(1);
            let y_hi = (y + 1).min(height - 1);
            let x_lo = x.saturating_sub(1);
            let x_hi = (x + 1).min(width - 1);

            'search: for ny in y_lo..=y_hi {
                for nx in x_lo..=x_hi {
                    if mask[ny * width + nx] != 0 {
                        out[y * width + x] = 1;
                        break 'search;
                    }
                }
            }
        }
    }
    out
}

/// Total area of 4-connected regions at least `min_area` pixels large.
/// Consumes the mask (visited pixels are cleared).
fn qualifying_area(mask: &mut [u8], width: usize, min_area: u32) -> u64 {
    let height = mask.len() / width;
    let mut total = 0u64;
    let mut stack = Vec::new();

    for start in 0..mask.len() {
        if mask[start] == 0 {
            continue;
        }

        let mut area = 0u64;
        mask[start] = 0;
        stack.push(start);

        while let Some(idx) = stack.pop() {
            area += 1;
            let x = idx % width;
            let y = idx / width;

            if x > 0 && mask[idx - 1] != 0 {
                mask[idx - 1] = 0;
                stack.push(idx - 1);
            }
            if x + 1 < width && mask[idx + 1] != 0 {
                mask[idx + 1] = 0;
                stack.push(idx + 1);
            }
            if y > 0 && mask[idx - width] != 0 {
                mask[idx - width] = 0;
                stack.push(idx - width);
            }
            if y + 1 < height && mask[idx + width] != 0 {
                mask[idx + width] = 0;
                stack.push(idx + width);
            }
        }

        if area >= min_area as u64 {
            total += area;
        }
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_frame(width: u32, height: u32, luma: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, image::Luma([luma]))
    }

    fn frame_with_block(
        width: u32,
        height: u32,
        background: u8,
        block: u8,
        block_size: u32,
    ) -> GrayImage {
        let mut frame = uniform_frame(width, height, background);
        for y in 0..block_size {
            for x in 0..block_size {
                frame.put_pixel(20 + x, 20 + y, image::Luma([block]));
            }
        }
        frame
    }

    #[test]
    fn first_frame_is_never_motion() {
        let mut detector = MotionDetector::new(40, 2000);
        let (detected, confidence) = detector.detect(&uniform_frame(200, 200, 255));
        assert!(!detected);
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn identical_frames_produce_no_motion() {
        let mut detector = MotionDetector::new(40, 2000);
        detector.detect(&uniform_frame(200, 200, 120));
        let (detected, confidence) = detector.detect(&uniform_frame(200, 200, 120));
        assert!(!detected);
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn large_appearing_block_is_motion_with_saturated_confidence() {
        let mut detector = MotionDetector::new(40, 2000);
        detector.detect(&uniform_frame(200, 200, 0));
        let (detected, confidence) =
            detector.detect(&frame_with_block(200, 200, 0, 255, 120));
        assert!(detected);
        assert_eq!(confidence, 1.0);
    }

    #[test]
    fn tiny_blob_below_min_area_is_ignored() {
        let mut detector = MotionDetector::new(40, 2000);
        detector.detect(&uniform_frame(200, 200, 0));
        let (detected, confidence) =
            detector.detect(&frame_with_block(200, 200, 0, 255, 6));
        assert!(!detected);
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn comparison_is_sliding_window_not_fixed_baseline() {
        let mut detector = MotionDetector::new(40, 2000);
        detector.detect(&uniform_frame(200, 200, 0));
        detector.detect(&frame_with_block(200, 200, 0, 255, 120));
        // Same block again: previous frame already contains it.
        let (detected, _) = detector.detect(&frame_with_block(200, 200, 0, 255, 120));
        assert!(!detected);
    }

    #[test]
    fn resolution_change_reseeds_baseline() {
        let mut detector = MotionDetector::new(40, 2000);
        detector.detect(&uniform_frame(200, 200, 0));
        let (detected, confidence) = detector.detect(&uniform_frame(160, 120, 255));
        assert!(!detected);
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn qualifying_area_filters_small_regions() {
        // Two regions: 3x3 and 2x1, min_area 5 keeps only the first.
        let width = 8;
        let mut mask = vec![0u8; width * 6];
        for y in 0..3 {
            for x in 0..3 {
                mask[y * width + x] = 1;
            }
        }
        mask[5 * width + 6] = 1;
        mask[5 * width + 7] = 1;

        assert_eq!(qualifying_area(&mut mask, width, 5), 9);
    }
}
