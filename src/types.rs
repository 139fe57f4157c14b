// Eigen-like aliases.
pub type Vector2d = nalgebra::Vector2::<f64>;
pub type Vector3d = nalgebra::Vector3::<f64>;
pub type Matrix3d = nalgebra::Matrix3::<f64>;
pub type Pixel = nalgebra::Vector2::<i32>;
