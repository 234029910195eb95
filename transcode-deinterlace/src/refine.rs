//! Motion-compensated refinement of deinterlaced frames.
//!
//! Runs after the line filter on each produced estimate. For every rebuilt
//! pixel it looks for the same content in the previous refined frame,
//! shifted horizontally by a few pixels, using the untouched rows above and
//! below to score each shift. When a shift matches well, the rebuilt pixel
//! is blended with its motion-compensated counterpart.

use crate::config::RefineConfig;
use transcode_core::{Buffer, Plane};

/// Refinement pass with a one-frame history.
#[derive(Debug)]
pub struct MotionRefiner {
    config: RefineConfig,
    history: Option<Buffer>,
}

#[inline]
fn at(plane: &Plane, x: isize, y: usize) -> i32 {
    let x = x.clamp(0, plane.width as isize - 1) as usize;
    i32::from(plane.data[y * plane.stride + x])
}

impl MotionRefiner {
    /// Create a refiner.
    pub fn new(config: RefineConfig) -> Self {
        Self {
            config,
            history: None,
        }
    }

    /// Refine `estimate`, whose rows with `(y ^ parity) & 1 == 1` were
    /// rebuilt by the line filter. The result becomes the next history.
    pub fn refine(&mut self, estimate: &Buffer, parity: usize) -> Buffer {
        let mut out = estimate.dup();
        if let Some(prev) = self.history.as_ref().filter(|h| h.same_geometry(estimate)) {
            for (index, (cur, past)) in estimate.planes().iter().zip(prev.planes()).enumerate() {
                if let Some(dst) = out.plane_mut(index) {
                    self.refine_plane(dst, cur, past, parity);
                }
            }
        }
        self.history = Some(out.dup());
        out
    }

    fn refine_plane(&self, dst: &mut Plane, cur: &Plane, past: &Plane, parity: usize) {
        let radius = self.config.search_radius();
        let max_cost = self.config.max_cost();

        for y in 1..cur.height.saturating_sub(1) {
            if (y ^ parity) & 1 == 0 {
                continue;
            }
            for x in 0..cur.width {
                let xi = x as isize;

                // zero shift first, then nearest shifts, left before right
                let mut best = (i32::MAX, 0isize);
                for step in 0..=radius {
                    for dx in [-step, step] {
                        let cost: i32 = (-1..=1)
                            .map(|k| {
                                (at(cur, xi + k, y - 1) - at(past, xi + k + dx, y - 1)).abs()
                                    + (at(cur, xi + k, y + 1) - at(past, xi + k + dx, y + 1)).abs()
                            })
                            .sum();
                        if cost < best.0 {
                            best = (cost, dx);
                        }
                    }
                }

                let (cost, dx) = best;
                if cost > max_cost {
                    continue;
                }
                let above = at(cur, xi, y - 1);
                let below = at(cur, xi, y + 1);
                let blended = (at(cur, xi, y) + at(past, xi + dx, y) + 1) >> 1;
                dst.row_mut(y)[x] = blended.clamp(above.min(below), above.max(below)) as u8;
            }
        }
    }

    /// Forget the history.
    pub fn reset(&mut self) {
        self.history = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transcode_core::PixelLayout;

    fn frame(fill: impl Fn(usize, usize) -> u8) -> Buffer {
        let mut buf = Buffer::picture(PixelLayout::Gray8, 16, 8);
        if let Some(plane) = buf.plane_mut(0) {
            for y in 0..plane.height {
                for (x, px) in plane.row_mut(y).iter_mut().enumerate() {
                    *px = fill(x, y);
                }
            }
        }
        buf
    }

    #[test]
    fn test_first_frame_unchanged() {
        let mut refiner = MotionRefiner::new(RefineConfig::default());
        let est = frame(|x, y| (x * 7 + y * 3) as u8);
        let out = refiner.refine(&est, 0);
        assert_eq!(out.plane(0).unwrap().data, est.plane(0).unwrap().data);
    }

    #[test]
    fn test_static_content_stable() {
        let mut refiner = MotionRefiner::new(RefineConfig::default());
        let est = frame(|x, _| (x * 10) as u8);
        refiner.refine(&est, 0);
        let out = refiner.refine(&est, 0);
        assert_eq!(out.plane(0).unwrap().data, est.plane(0).unwrap().data);
    }

    #[test]
    fn test_blend_stays_between_neighbours() {
        let mut refiner = MotionRefiner::new(RefineConfig { quality: 3 });
        refiner.refine(&frame(|_, _| 100), 0);
        let est = frame(|_, y| if y % 2 == 1 { 200 } else { 100 });
        let out = refiner.refine(&est, 0);
        let plane = out.plane(0).unwrap();
        // rebuilt rows are pulled back inside the band of their neighbours
        for y in (1..7).step_by(2) {
            assert!(plane.row(y).iter().all(|&v| v == 100));
        }
        // preserved rows untouched
        assert!(plane.row(2).iter().all(|&v| v == 100));
    }

    #[test]
    fn test_reset_clears_history() {
        let mut refiner = MotionRefiner::new(RefineConfig::default());
        refiner.refine(&frame(|_, _| 0), 1);
        refiner.reset();
        let est = frame(|_, _| 50);
        assert_eq!(refiner.refine(&est, 1).plane(0).unwrap().data, est.plane(0).unwrap().data);
    }
}
