//! Five-point face alignment for ArcFace.
//!
//! Fits a similarity transform (scale, rotation, translation) taking the
//! detected landmarks onto the InsightFace 112×112 reference positions, then
//! warps the RGB frame through it with bilinear sampling.

use image::{Rgb, RgbImage};

/// InsightFace reference landmarks for a 112×112 crop.
pub const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth corner
    (70.7299, 92.2041), // right mouth corner
];

pub const ALIGNED_SIZE: u32 = 112;

/// Similarity transform `dst = [a -b; b a] · src + t`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Least-squares fit of `src` onto `dst`.
    ///
    /// Returns `None` when the source points are (nearly) coincident.
    fn fit(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Option<Self> {
        let mean = |pts: &[(f32, f32); 5]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(x, y), p| (x + p.0, y + p.1));
            (sx / 5.0, sy / 5.0)
        };
        let (scx, scy) = mean(src);
        let (dcx, dcy) = mean(dst);

        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        let mut norm = 0.0f32;
        for (s, d) in src.iter().zip(dst) {
            let (px, py) = (s.0 - scx, s.1 - scy);
            let (qx, qy) = (d.0 - dcx, d.1 - dcy);
            dot += px * qx + py * qy;
            cross += px * qy - py * qx;
            norm += px * px + py * py;
        }
        if norm < 1e-6 {
            return None;
        }

        let a = dot / norm;
        let b = cross / norm;
        Some(Self {
            a,
            b,
            tx: dcx - (a * scx - b * scy),
            ty: dcy - (b * scx + a * scy),
        })
    }

    fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (self.a * x - self.b * y + self.tx, self.b * x + self.a * y + self.ty)
    }

    /// Map a destination point back into source coordinates.
    fn invert(&self, (x, y): (f32, f32)) -> (f32, f32) {
        let det = self.a * self.a + self.b * self.b;
        let (dx, dy) = (x - self.tx, y - self.ty);
        ((self.a * dx + self.b * dy) / det, (self.a * dy - self.b * dx) / det)
    }
}

/// Bilinear sample of `image` at a sub-pixel position; black outside the frame.
fn sample(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let pixel = |px: f32, py: f32| -> [f32; 3] {
        if px < 0.0 || py < 0.0 || px >= image.width() as f32 || py >= image.height() as f32 {
            return [0.0; 3];
        }
        let p = image.get_pixel(px as u32, py as u32);
        [p[0] as f32, p[1] as f32, p[2] as f32]
    };

    let p00 = pixel(x0, y0);
    let p10 = pixel(x0 + 1.0, y0);
    let p01 = pixel(x0, y0 + 1.0);
    let p11 = pixel(x0 + 1.0, y0 + 1.0);

    Rgb(std::array::from_fn(|c| {
        let v = p00[c] * (1.0 - fx) * (1.0 - fy)
            + p10[c] * fx * (1.0 - fy)
            + p01[c] * (1.0 - fx) * fy
            + p11[c] * fx * fy;
        v.round().clamp(0.0, 255.0) as u8
    }))
}

/// Warp the face described by `landmarks` into a canonical 112×112 crop.
///
/// Returns `None` if the landmarks are degenerate.
pub fn align_face(image: &RgbImage, landmarks: &[(f32, f32); 5]) -> Option<RgbImage> {
    let transform = Similarity::fit(landmarks, &REFERENCE_LANDMARKS_112)?;
    Some(RgbImage::from_fn(ALIGNED_SIZE, ALIGNED_SIZE, |ox, oy| {
        let (sx, sy) = transform.invert((ox as f32, oy as f32));
        sample(image, sx, sy)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_identity() {
        let t = Similarity::fit(&REFERENCE_LANDMARKS_112, &REFERENCE_LANDMARKS_112).unwrap();
        assert!((t.a - 1.0).abs() < 1e-4, "a = {}", t.a);
        assert!(t.b.abs() < 1e-4, "b = {}", t.b);
        assert!(t.tx.abs() < 1e-3 && t.ty.abs() < 1e-3, "t = ({}, {})", t.tx, t.ty);
    }

    #[test]
    fn test_fit_recovers_scale_rotation_and_shift() {
        // Reference points rotated 90°, doubled and shifted.
        let src = REFERENCE_LANDMARKS_112.map(|(x, y)| (-2.0 * y + 300.0, 2.0 * x + 50.0));
        let t = Similarity::fit(&src, &REFERENCE_LANDMARKS_112).unwrap();

        for (s, d) in src.iter().zip(&REFERENCE_LANDMARKS_112) {
            let (x, y) = t.apply(*s);
            assert!((x - d.0).abs() < 1e-2 && (y - d.1).abs() < 1e-2, "{s:?} -> ({x}, {y})");
        }
        assert!(t.a.abs() < 1e-4);
        assert!((t.b + 0.5).abs() < 1e-4, "b = {}", t.b);
    }

    #[test]
    fn test_invert_undoes_apply() {
        let t = Similarity { a: 0.8, b: -0.3, tx: 12.0, ty: -4.0 };
        let (x, y) = t.invert(t.apply((17.0, 42.0)));
        assert!((x - 17.0).abs() < 1e-3 && (y - 42.0).abs() < 1e-3);
    }

    #[test]
    fn test_degenerate_landmarks() {
        let image = RgbImage::new(64, 64);
        assert!(align_face(&image, &[(10.0, 10.0); 5]).is_none());
    }

    #[test]
    fn test_align_moves_landmark_to_reference() {
        let mut image = RgbImage::new(200, 200);
        let landmarks: [(f32, f32); 5] =
            [(80.0, 60.0), (120.0, 60.0), (100.0, 85.0), (85.0, 110.0), (115.0, 110.0)];

        // Red patch on the left eye.
        for y in 58..=62 {
            for x in 78..=82 {
                image.put_pixel(x, y, Rgb([255, 0, 0]));
            }
        }

        let aligned = align_face(&image, &landmarks).unwrap();
        assert_eq!(aligned.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));

        let (rx, ry) = REFERENCE_LANDMARKS_112[0];
        let eye = aligned.get_pixel(rx.round() as u32, ry.round() as u32);
        assert!(eye[0] > 100, "left eye pixel {eye:?}");
        assert_eq!(eye[1], 0);

        let corner = aligned.get_pixel(0, 0);
        assert_eq!(corner[0], 0);
    }
}
