pub mod concretize;
pub mod inline;
pub mod parallel_map;
