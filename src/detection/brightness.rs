use image::GrayImage;

/// Mean luma of the frame, normalized to [0, 1].
pub fn score(frame: &GrayImage) -> f64 {
    let pixels = frame.as_raw();
    if pixels.is_empty() {
        return 0.0;
    }

    let sum: u64 = pixels.iter().map(|p| u64::from(*p)).sum();
    (sum as f64 / pixels.len() as f64) / 255.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn black_frame_scores_zero() {
        let frame = GrayImage::from_pixel(64, 48, Luma([0]));
        assert_eq!(score(&frame), 0.0);
    }

    #[test]
    fn white_frame_scores_one() {
        let frame = GrayImage::from_pixel(64, 48, Luma([255]));
        assert_eq!(score(&frame), 1.0);
    }

    #[test]
    fn mid_gray_scores_near_half() {
        let frame = GrayImage::from_pixel(64, 48, Luma([128]));
        let value = score(&frame);
        assert!((value - 128.0 / 255.0).abs() < 1e-9);
    }

    #[test]
    fn empty_frame_scores_zero() {
        let frame = GrayImage::new(0, 0);
        assert_eq!(score(&frame), 0.0);
    }
}
