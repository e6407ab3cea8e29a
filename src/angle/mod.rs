mod calculator;
mod filter;
mod geometry;

pub use calculator::AngleCalculator;
pub use filter::{AngleFilter, AngleSample, FilterSettings};
pub use geometry::{bend_orientation, interior_angle, reflex_angle, Orientation};
