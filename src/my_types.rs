use nalgebra as na;
use serde::{Deserialize, Serialize};

pub type Vector2d = na::Vector2<f64>;
pub type Matrix2d = na::Matrix2<f64>;

pub type Matrixd = nalgebra::DMatrix<f64>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub usize);
