pub mod coord;
pub mod oriented;
pub mod point;
pub mod polygon;
pub mod polyline;
pub mod rect;
pub mod rtree;
pub mod segment;
