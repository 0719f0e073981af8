//! Affine matrices and the bilinear warp used by the shift and rotate
//! augmentations.
//!
//! Coordinate convention: pixel `(x, y)` is column `x`, row `y`, with the
//! origin at the centre of the top-left pixel and `y` pointing down. An
//! [`AffineTransform`] maps *source* coordinates to *destination* coordinates:
//!
//! ```text
//! [x_dst]   [a b c]   [x_src]
//! [y_dst] = [d e f] · [y_src]
//!                     [  1  ]
//! ```
//!
//! Warping inverts the matrix and samples the source at `M⁻¹ · (x_dst, y_dst)`.

use crate::data::buffer::Image;
use crate::error::{ClassifierError, Result};

/// Value taken by source pixels outside the frame.
pub const BORDER_VALUE: f32 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub m: [[f64; 3]; 2],
}

impl AffineTransform {
    pub fn new(m: [[f64; 3]; 2]) -> Self {
        Self { m }
    }

    pub fn identity() -> Self {
        Self::new([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])
    }

    /// Moves content by `dx` pixels right and `dy` pixels down.
    pub fn translation(dx: f64, dy: f64) -> Self {
        Self::new([[1.0, 0.0, dx], [0.0, 1.0, dy]])
    }

    /// Rotation by `angle_deg` about `center`, counter-clockwise on screen for
    /// positive angles, combined with isotropic `scale`.
    pub fn rotation(center: (f64, f64), angle_deg: f64, scale: f64) -> Self {
        let (cx, cy) = center;
        let theta = angle_deg.to_radians();
        let alpha = scale * theta.cos();
        let beta = scale * theta.sin();

        Self::new([
            [alpha, beta, (1.0 - alpha) * cx - beta * cy],
            [-beta, alpha, beta * cx + (1.0 - alpha) * cy],
        ])
    }

    pub fn determinant(&self) -> f64 {
        let [[a, b, _], [d, e, _]] = self.m;
        a * e - b * d
    }

    pub fn inverse(&self) -> Result<Self> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return Err(ClassifierError::invalid(
                "transform",
                format!("matrix {:?} is not invertible", self.m),
            ));
        }

        let [[a, b, c], [d, e, f]] = self.m;
        Ok(Self::new([
            [e / det, -b / det, (b * f - e * c) / det],
            [-d / det, a / det, (d * c - a * f) / det],
        ]))
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let [[a, b, c], [d, e, f]] = self.m;
        (a * x + b * y + c, d * x + e * y + f)
    }
}

/// Warp one `height×width` row-major plane through `transform`.
///
/// Bilinear interpolation; neighbours outside the frame read as
/// [`BORDER_VALUE`], so edges fade into black instead of being cut.
pub fn warp_plane(
    src: &[f32],
    width: usize,
    height: usize,
    transform: &AffineTransform,
) -> Result<Vec<f32>> {
    if src.len() != width * height {
        return Err(ClassifierError::Shape(format!(
            "plane of {} values does not match {}x{}",
            src.len(),
            width,
            height
        )));
    }

    let inverse = transform.inverse()?;
    let mut dst = Vec::with_capacity(src.len());

    for y in 0..height {
        for x in 0..width {
            let (sx, sy) = inverse.apply(x as f64, y as f64);
            dst.push(sample_bilinear(src, width, height, sx, sy));
        }
    }

    Ok(dst)
}

fn sample_bilinear(src: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    if !x.is_finite() || !y.is_finite() {
        return BORDER_VALUE;
    }

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let fetch = |xi: i64, yi: i64| -> f64 {
        if xi < 0 || yi < 0 || xi >= width as i64 || yi >= height as i64 {
            BORDER_VALUE as f64
        } else {
            src[yi as usize * width + xi as usize] as f64
        }
    };

    let mut value = 0.0;
    for (dy, wy) in [(0, 1.0 - fy), (1, fy)] {
        for (dx, wx) in [(0, 1.0 - fx), (1, fx)] {
            let weight = wx * wy;
            if weight != 0.0 {
                value += weight * fetch(x0 + dx, y0 + dy);
            }
        }
    }

    value as f32
}

/// Apply `transform` to each of the three channels through [`warp_plane`].
pub fn warp_affine(image: &Image, transform: &AffineTransform) -> Result<Image> {
    image.ensure_rgb()?;

    let mut planes = Vec::with_capacity(image.channels());
    for channel in 0..image.channels() {
        planes.push(warp_plane(
            image.plane(channel),
            image.width(),
            image.height(),
            transform,
        )?);
    }

    image.with_planes(planes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(shape: [usize; 3]) -> Image {
        Image::from_fn(shape, |c, y, x| ((c * 31 + y * 7 + x) % 17) as f32 / 17.0).unwrap()
    }

    #[test]
    fn test_identity_warp_is_exact() {
        let img = ramp([3, 6, 5]);
        let out = warp_affine(&img, &AffineTransform::identity()).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn test_rotation_matrix_at_zero_is_identity() {
        let m = AffineTransform::rotation((2.0, 3.0), 0.0, 1.0);
        assert_eq!(m, AffineTransform::identity());
    }

    #[test]
    fn test_inverse_of_translation() {
        let inv = AffineTransform::translation(3.0, -2.0).inverse().unwrap();
        assert_eq!(inv.apply(5.0, 5.0), (2.0, 7.0));
    }

    #[test]
    fn test_singular_matrix_is_rejected() {
        let singular = AffineTransform::new([[1.0, 2.0, 0.0], [2.0, 4.0, 0.0]]);
        assert!(matches!(
            singular.inverse(),
            Err(ClassifierError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_translation_moves_content_right_and_down() {
        let img = Image::from_fn([3, 4, 4], |_, y, x| if y == 1 && x == 1 { 1.0 } else { 0.0 })
            .unwrap();
        let out = warp_affine(&img, &AffineTransform::translation(2.0, 1.0)).unwrap();

        for c in 0..3 {
            assert_eq!(out.get(c, 2, 3), 1.0);
            assert_eq!(out.get(c, 1, 1), 0.0);
        }
    }

    #[test]
    fn test_out_of_frame_is_black() {
        let img = Image::filled([3, 3, 3], 1.0).unwrap();
        let out = warp_affine(&img, &AffineTransform::translation(-1.0, 0.0)).unwrap();

        for c in 0..3 {
            for y in 0..3 {
                assert_eq!(out.get(c, y, 2), 0.0);
                assert_eq!(out.get(c, y, 0), 1.0);
            }
        }
    }

    #[test]
    fn test_half_pixel_shift_interpolates() {
        let img = Image::from_fn([3, 1, 3], |_, _, x| x as f32).unwrap();
        let out = warp_affine(&img, &AffineTransform::translation(0.5, 0.0)).unwrap();

        // x=1 samples source x=0.5, x=0 samples -0.5 and blends with the border
        assert!((out.get(0, 0, 1) - 0.5).abs() < 1e-6);
        assert!((out.get(0, 0, 2) - 1.5).abs() < 1e-6);
        assert!((out.get(0, 0, 0) - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_positive_angle_rotates_counter_clockwise() {
        // centre (2, 2); a dot right of centre ends up above it
        let img = Image::from_fn([3, 5, 5], |_, y, x| if y == 2 && x == 4 { 1.0 } else { 0.0 })
            .unwrap();
        let out = warp_affine(&img, &AffineTransform::rotation((2.0, 2.0), 90.0, 1.0)).unwrap();

        for c in 0..3 {
            assert!((out.get(c, 0, 2) - 1.0).abs() < 1e-4);
            assert!(out.get(c, 2, 4).abs() < 1e-4);
        }
    }

    #[test]
    fn test_channels_warped_independently() {
        let img = Image::from_fn([3, 4, 4], |c, _, x| if x == c { 1.0 } else { 0.0 }).unwrap();
        let out = warp_affine(&img, &AffineTransform::translation(1.0, 0.0)).unwrap();

        for c in 0..3 {
            assert_eq!(out.get(c, 0, c + 1), 1.0);
            assert_eq!(out.get(c, 0, c), 0.0);
        }
    }

    #[test]
    fn test_rejects_non_rgb() {
        let gray = Image::zeros([1, 4, 4]).unwrap();
        assert!(matches!(
            warp_affine(&gray, &AffineTransform::identity()),
            Err(ClassifierError::Shape(_))
        ));
    }
}
