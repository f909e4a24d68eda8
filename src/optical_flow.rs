use image::RgbImage;
use nalgebra as na;
use tracing::{debug, trace};

use crate::bounding_box::BoundingBox;
use crate::error::{TrackError, TrackResult};
use crate::frame::PyramidFrame;
use crate::image::*;
use crate::my_types::*;

type Range = [[i16; 2]; 2];

/// Brings the spatial gradient eigenvalue, normalised by window area, to the
/// scale of unnormalised 8-bit Scharr derivatives in 20-bit fixed point.
const MIN_EIG_SCALE: f64 = 1. / 1024.;

/// Sparse pyramidal Lucas-Kanade flow between two pyramid frames.
#[derive(Debug)]
pub struct OpticalFlow {
    lk_iters: usize,
    lk_levels: usize,
    lk_win_size: usize,
    lk_term: f64,
    lk_min_eig: f64,
    ix: Matrixd,
    iy: Matrixd,
    it: Matrixd,
    grid: Matrixd,
}

impl OpticalFlow {
    pub fn new() -> OpticalFlow {
        let lk_levels = 3;
        let lk_iters = 30;
        let lk_win_size = 30;
        let lk_term = 0.01;
        let lk_min_eig = 0.001;

        OpticalFlow {
            lk_iters,
            lk_levels,
            lk_win_size,
            lk_term,
            lk_min_eig,
            ix: na::DMatrix::zeros(0, 0),
            iy: na::DMatrix::zeros(0, 0),
            it: na::DMatrix::zeros(0, 0),
            grid: na::DMatrix::zeros(0, 0),
        }
    }

    /// Pyramid depth, full resolution included
    pub fn levels(&self) -> usize {
        self.lk_levels
    }

    /// Find where `point0` of `pyramid_frame0` moved to in `pyramid_frame1`.
    /// None when the point has too little texture or leaves the image.
    ///
    /// ref http://robots.stanford.edu/cs223b04/algo_tracking.pdf
    pub fn process_feature(
        &mut self,
        pyramid_frame0: &PyramidFrame,
        pyramid_frame1: &PyramidFrame,
        point0: Vector2d,
    ) -> Option<Vector2d> {
        let lk_term2 = self.lk_term.powi(2);
        let r = self.lk_win_size / 2;
        let levels = self
            .lk_levels
            .min(pyramid_frame0.level_count())
            .min(pyramid_frame1.level_count());
        if levels == 0 {
            return None;
        }

        // displacement guess, in units of the current level
        let mut g = Vector2d::zeros();
        let mut d = Vector2d::zeros();
        for level in (0..levels).rev() {
            if level + 1 < levels {
                g = 2. * (g + d);
            }
            d = Vector2d::zeros();

            let level0 = pyramid_frame0.get_image_at_level(level);
            let level1 = pyramid_frame1.get_image_at_level(level);
            let u = point0 / u32::pow(2, level as u32) as f64;

            // coarse levels may cut off points near the far border; only the
            // full resolution level decides
            let range = match integration_range(level0, u, r, 1) {
                Some(range) => range,
                None if level == 0 => return None,
                None => continue,
            };
            // compute the derivative
            scharr(level0, u, range, &mut self.ix, &mut self.iy, &mut self.grid);
            let gradient = spatial_gradient(&self.ix, &self.iy);
            let area = (self.ix.nrows() * self.ix.ncols()) as f64;
            if min_eigenvalue(&gradient) * MIN_EIG_SCALE / area < self.lk_min_eig {
                if level == 0 {
                    return None;
                }
                continue;
            }

            let mut nu = Vector2d::zeros();
            for _ in 0..self.lk_iters {
                let center1 = u + g + nu;
                if !level1.contains(center1) {
                    if level == 0 {
                        return None;
                    }
                    break;
                }
                image_difference(range, &self.grid, &mut self.it, level1, center1);
                let eta = flow_vector(&gradient, &self.ix, &self.iy, &self.it)?;
                nu += eta;
                if eta.norm_squared() < lk_term2 {
                    break;
                }
            }
            d = nu;
        }

        let point1 = point0 + g + d;
        if pyramid_frame1.image.contains(point1) {
            Some(point1)
        } else {
            None
        }
    }
}

impl Default for OpticalFlow {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowState {
    Uninitialized,
    Initialized,
}

/// Moves bounding boxes from one frame to the next.
///
/// Holds the pyramids of the previous and the current frame. `init` fills the
/// previous one, every `track` fills the current one and then swaps the two,
/// so consecutive calls walk a video without rebuilding or reallocating.
#[derive(Debug)]
pub struct OpticalFlowTracker {
    flow: OpticalFlow,
    state: FlowState,
    previous: PyramidFrame,
    current: PyramidFrame,
    points_per_dimension: usize,
    bbox_border_width: usize,
}

impl OpticalFlowTracker {
    pub fn new() -> Self {
        Self {
            flow: OpticalFlow::new(),
            state: FlowState::Uninitialized,
            previous: PyramidFrame::empty(),
            current: PyramidFrame::empty(),
            points_per_dimension: 11,
            bbox_border_width: 1,
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state == FlowState::Initialized
    }

    pub fn init(&mut self, image: &RgbImage) {
        self.previous.rebuild(image, self.flow.levels());
        self.state = FlowState::Initialized;
    }

    /// Forget the previous frame. Buffers stay allocated.
    pub fn reset(&mut self) {
        self.state = FlowState::Uninitialized;
    }

    /// Track `boxes` from the previous frame into `image`. The result has one
    /// slot per input box, None where the box was absent or got lost.
    pub fn track(
        &mut self,
        image: &RgbImage,
        boxes: &[Option<BoundingBox>],
    ) -> TrackResult<Vec<Option<BoundingBox>>> {
        if self.state != FlowState::Initialized {
            return Err(TrackError::NotInitialized);
        }
        if boxes.iter().all(Option::is_none) {
            return Err(TrackError::NoPoints);
        }

        self.current.rebuild(image, self.flow.levels());

        let mut result = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            result.push(bbox.and_then(|bbox| self.track_box(&bbox)));
        }

        // Swap current and previous pyramids, buffer re-use
        std::mem::swap(&mut self.previous, &mut self.current);

        Ok(result)
    }

    fn track_box(&mut self, bbox: &BoundingBox) -> Option<BoundingBox> {
        let mut pairs = Vec::with_capacity(self.points_per_dimension.pow(2));
        for point0 in bbox.sample_grid(self.points_per_dimension) {
            if let Some(point1) = self
                .flow
                .process_feature(&self.previous, &self.current, point0)
            {
                pairs.push((point0, point1));
            }
        }
        trace!("{} of {} points tracked", pairs.len(), self.points_per_dimension.pow(2));

        let translation = match estimate_translation(&pairs) {
            Some(translation) => translation,
            None => {
                debug!(?bbox, "no valid flow inside box, tracking lost");
                return None;
            }
        };
        let tracked = bbox.translated_within(
            translation,
            self.current.image.width,
            self.current.image.height,
            self.bbox_border_width,
        );
        if tracked.is_none() {
            debug!(?bbox, "box left the image");
        }
        tracked
    }
}

impl Default for OpticalFlowTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Least squares translation between point pairs, the mean displacement
pub fn estimate_translation(pairs: &[(Vector2d, Vector2d)]) -> Option<Vector2d> {
    if pairs.is_empty() {
        return None;
    }
    let sum = pairs
        .iter()
        .fold(Vector2d::zeros(), |sum, (before, after)| sum + (after - before));
    Some(sum / pairs.len() as f64)
}

fn flow_vector(gradient: &Matrix2d, ix: &Matrixd, iy: &Matrixd, it: &Matrixd) -> Option<Vector2d> {
    let mut b = Vector2d::zeros();

    for y in 0..iy.nrows() {
        for x in 0..ix.ncols() {
            b[0] += it[(y, x)] * ix[(y, x)];
            b[1] += it[(y, x)] * iy[(y, x)];
        }
    }

    gradient.try_inverse().map(|inv_g| inv_g * b)
}

/// Difference between the window of the previous level (`i0`, padded by one
/// pixel) and the same window around `center` in `level`.
fn image_difference(range: Range, i0: &Matrixd, it: &mut Matrixd, level: &Image, center: Vector2d) {
    fill_grid(level, range, center, it);
    *it *= -1.;
    *it += i0.view((1, 1), (it.nrows(), it.ncols()));
}

fn spatial_gradient(ix: &Matrixd, iy: &Matrixd) -> Matrix2d {
    debug_assert_eq!(ix.shape(), iy.shape());

    let mut x2 = 0.;
    let mut y2 = 0.;
    let mut xy = 0.;

    for y in 0..iy.nrows() {
        for x in 0..ix.ncols() {
            x2 += ix[(y, x)] * ix[(y, x)];
            y2 += iy[(y, x)] * iy[(y, x)];
            xy += ix[(y, x)] * iy[(y, x)];
        }
    }

    Matrix2d::new(x2, xy, xy, y2)
}

/// Smaller eigenvalue of a symmetric 2x2 matrix
fn min_eigenvalue(m: &Matrix2d) -> f64 {
    let a = m[(0, 0)];
    let b = m[(0, 1)];
    let c = m[(1, 1)];
    0.5 * (a + c - ((a - c).powi(2) + 4. * b * b).sqrt())
}

/// ref https://theailearner.com/tag/scharr-operator/
fn scharr(
    level: &Image,
    center: Vector2d,
    range: Range,
    out_x: &mut Matrixd,
    out_y: &mut Matrixd,
    grid: &mut Matrixd,
) {
    let grange = [
        [range[0][0] - 1, range[0][1] + 1],
        [range[1][0] - 1, range[1][1] + 1],
    ];
    fill_grid(level, grange, center, grid);

    let shape = (grid.nrows() - 2, grid.ncols() - 2);
    if out_x.shape() != shape {
        *out_x = Matrixd::zeros(shape.0, shape.1);
        *out_y = Matrixd::zeros(shape.0, shape.1);
    }
    for y in 1..(grid.nrows() - 1) {
        for x in 1..(grid.ncols() - 1) {
            out_x[(y - 1, x - 1)] =
                (10. * grid[(y, x + 1)] + 3. * grid[(y + 1, x + 1)] + 3. * grid[(y - 1, x + 1)]
                    - 10. * grid[(y, x - 1)]
                    - 3. * grid[(y + 1, x - 1)]
                    - 3. * grid[(y - 1, x - 1)])
                    / 32.;
            out_y[(y - 1, x - 1)] =
                (10. * grid[(y + 1, x)] + 3. * grid[(y + 1, x + 1)] + 3. * grid[(y + 1, x - 1)]
                    - 10. * grid[(y - 1, x)]
                    - 3. * grid[(y - 1, x + 1)]
                    - 3. * grid[(y - 1, x - 1)])
                    / 32.;
        }
    }
}

fn fill_grid(level: &Image, range: Range, center: Vector2d, grid: &mut Matrixd) {
    let rows = (range[1][1] - range[1][0] + 1) as usize;
    let cols = (range[0][1] - range[0][0] + 1) as usize;
    if grid.shape() != (rows, cols) {
        *grid = na::DMatrix::zeros(rows, cols);
    }

    for (y_ind, y) in (range[1][0]..=range[1][1]).enumerate() {
        for (x_ind, x) in (range[0][0]..=range[0][1]).enumerate() {
            grid[(y_ind, x_ind)] = bilinear(level, center + Vector2d::new(x as f64, y as f64));
        }
    }
}

/// Returns closed range of integer steps that can be taken without going outside
/// the image borders. Returns None if the center point is outside the level
/// boundaries.
fn integration_range(level: &Image, center: Vector2d, r: usize, padding: i16) -> Option<Range> {
    let r = r as i16;
    let mut range = [[0, 0], [0, 0]];
    for i in 0..2 {
        let s = if i == 0 { level.width } else { level.height };
        if center[i] < 0. || center[i] > (s as f64 - 1.) {
            return None;
        }
        let n = center[i] as i16;
        let fract = if center[i].fract() > 0. { 1 } else { 0 };
        range[i] = [
            i16::max(-r, -n + padding),
            i16::min(r, s as i16 - n - padding - 1 - fract),
        ];
        if range[i][0] > range[i][1] {
            return None;
        }
    }
    Some(range)
}
