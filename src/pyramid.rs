use crate::image::Image;

const NAIVE_DOWNSCALE: bool = false;

/// Successively halved copies of a parent image. Level buffers are kept
/// between `compute` calls so a reused pyramid does not reallocate.
#[derive(Debug)]
pub struct Pyramid {
    pub levels: Vec<Image>,
    /// Number of valid entries in `levels` after the last `compute`
    pub level_count: usize,
    pub parent_size: [usize; 2],
}

impl Pyramid {
    pub fn empty() -> Self {
        Self {
            levels: vec![],
            level_count: 0,
            parent_size: [0; 2],
        }
    }

    /// Build up to `level_count` downscaled levels of `frame`. Stops early
    /// once a level would shrink below 2 x 2 pixels.
    pub fn compute(&mut self, frame: &Image, level_count: usize) {
        while self.levels.len() < level_count {
            self.levels.push(Image::empty())
        }
        self.parent_size = [frame.width, frame.height];
        self.level_count = 0;
        if level_count == 0 || !can_downscale(frame) {
            return;
        }
        downscale(frame, &mut self.levels[0]);
        self.level_count = 1;
        for i in 0..(level_count - 1) {
            let rest = &mut self.levels[i..];
            // split_first_mut Returns the first and all the rest of the elements of the slice, or None if it is empty
            if let Some((parent, rest)) = rest.split_first_mut() {
                if !can_downscale(parent) {
                    break;
                }
                downscale(parent, &mut rest[0]);
                self.level_count += 1;
            }
        }
    }

    pub fn level(&self, index: usize) -> Option<&Image> {
        if index < self.level_count {
            self.levels.get(index)
        } else {
            None
        }
    }
}

fn can_downscale(image: &Image) -> bool {
    image.width >= 4 && image.height >= 4
}

/// downscale the parent image and store the result in child
fn downscale(parent: &Image, child: &mut Image) {
    let w = parent.width as i64;
    let h = parent.height as i64;

    let w_half = w / 2;
    let h_half = h / 2;
    child.data.clear();
    child.width = w_half as usize;
    child.height = h_half as usize;

    // prevent pixel out of bounds
    let v = |x: i64, y: i64| -> u16 { parent.value_clamped(x, y) as u16 };

    for y in 0..h_half {
        let y2 = 2 * y;
        for x in 0..w_half {
            let x2 = 2 * x;
            let value = if NAIVE_DOWNSCALE {
                (v(x2, y2) + v(x2 + 1, y2) + v(x2, y2 + 1) + v(x2 + 1, y2 + 1)) / 4
            } else {
                v(x2, y2) / 4
                    + (v(x2 + 1, y2) + v(x2 - 1, y2) + v(x2, y2 + 1) + v(x2, y2 - 1)) / 8
                    + (v(x2 + 1, y2 + 1)
                        + v(x2 - 1, y2 - 1)
                        + v(x2 - 1, y2 + 1)
                        + v(x2 + 1, y2 - 1))
                        / 16
            };
            child.data.push(value as u8);
        }
    }
}
